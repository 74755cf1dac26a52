use std::collections::BTreeSet;

use chrono::NaiveDate;

use super::common::*;
use crate::pipeline::alerts::domain::{EducationLevel, Opportunity};
use crate::pipeline::alerts::matching::{explain, is_eligible, rank_matches};

#[test]
fn delhi_profile_matches_open_opportunity() {
    assert!(is_eligible(&delhi_profile(), &open_opportunity("opp-1"), today()));
}

#[test]
fn location_restriction_excludes_other_cities() {
    let profile = delhi_profile();
    let opportunity = mumbai_only_opportunity("opp-1");

    assert!(!is_eligible(&profile, &opportunity, today()));
    let breakdown = explain(&profile, &opportunity, today());
    assert!(!breakdown.location);
    assert!(breakdown.age && breakdown.education && breakdown.categories);
}

#[test]
fn past_deadline_excludes_even_when_all_rules_pass() {
    let profile = delhi_profile();
    let opportunity = expired_opportunity("opp-1");

    assert!(!is_eligible(&profile, &opportunity, today()));
    let breakdown = explain(&profile, &opportunity, today());
    assert!(breakdown.expired);
    assert!(
        breakdown.age && breakdown.education && breakdown.location && breakdown.categories,
        "expiry is the only failing criterion"
    );
}

#[test]
fn age_bounds_are_inclusive() {
    let mut profile = delhi_profile();
    let opportunity = open_opportunity("opp-1");

    profile.age = 18;
    assert!(is_eligible(&profile, &opportunity, today()));
    profile.age = 30;
    assert!(is_eligible(&profile, &opportunity, today()));
    profile.age = 17;
    assert!(!is_eligible(&profile, &opportunity, today()));
    profile.age = 31;
    assert!(!is_eligible(&profile, &opportunity, today()));
}

#[test]
fn education_rank_must_meet_minimum() {
    let mut profile = delhi_profile();
    let mut opportunity = open_opportunity("opp-1");
    opportunity.min_education = EducationLevel::Graduate;

    profile.education = EducationLevel::Undergraduate;
    assert!(!is_eligible(&profile, &opportunity, today()));
    profile.education = EducationLevel::Graduate;
    assert!(is_eligible(&profile, &opportunity, today()));
    profile.education = EducationLevel::Postgraduate;
    assert!(is_eligible(&profile, &opportunity, today()));
}

#[test]
fn empty_location_set_means_unrestricted() {
    let profile = delhi_profile();
    let mut opportunity = open_opportunity("opp-1");
    opportunity.eligible_locations = BTreeSet::new();

    assert!(is_eligible(&profile, &opportunity, today()));
}

#[test]
fn wildcard_token_is_case_insensitive() {
    let profile = delhi_profile();
    let mut opportunity = mumbai_only_opportunity("opp-1");
    opportunity.eligible_locations.insert("All".to_string());

    assert!(is_eligible(&profile, &opportunity, today()));
}

#[test]
fn disjoint_categories_never_match() {
    let mut profile = delhi_profile();
    profile.preferences = BTreeSet::from(["housing".to_string()]);

    assert!(!is_eligible(&profile, &open_opportunity("opp-1"), today()));
}

#[test]
fn deadline_today_still_matches() {
    let profile = delhi_profile();
    let opportunity = opportunity_with_deadline("opp-1", today());

    assert!(is_eligible(&profile, &opportunity, today()));
}

#[test]
fn rank_matches_returns_exactly_the_eligible_subset() {
    let profile = delhi_profile();
    let pool = vec![
        open_opportunity("opp-a"),
        mumbai_only_opportunity("opp-b"),
        expired_opportunity("opp-c"),
        open_opportunity("opp-d"),
    ];

    let ranked = rank_matches(&profile, pool, today());
    let ids: Vec<&str> = ranked.iter().map(|o| o.opportunity_id.0.as_str()).collect();
    assert_eq!(ids, vec!["opp-a", "opp-d"]);
}

#[test]
fn ranking_orders_by_deadline_then_id() {
    let profile = delhi_profile();
    let june = NaiveDate::from_ymd_opt(2026, 6, 1).expect("valid date");
    let march = NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date");
    let pool = vec![
        opportunity_with_deadline("opp-z", march),
        opportunity_with_deadline("opp-m", june),
        opportunity_with_deadline("opp-a", june),
        opportunity_with_deadline("opp-b", march),
    ];

    let ranked = rank_matches(&profile, pool, today());
    let ids: Vec<&str> = ranked.iter().map(|o| o.opportunity_id.0.as_str()).collect();
    assert_eq!(ids, vec!["opp-b", "opp-z", "opp-a", "opp-m"]);

    for pair in ranked.windows(2) {
        assert!(pair[0].deadline <= pair[1].deadline);
    }
}

#[test]
fn ranking_keeps_duplicates_single_counted() {
    let profile = delhi_profile();
    let pool: Vec<Opportunity> = (0..5).map(|i| open_opportunity(&format!("opp-{i}"))).collect();

    let ranked = rank_matches(&profile, pool, today());
    assert_eq!(ranked.len(), 5);
    let mut ids: Vec<String> = ranked.iter().map(|o| o.opportunity_id.0.clone()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 5, "every input evaluated exactly once");
}
