//! Pure eligibility predicate and ranking over profiles and opportunities.
//!
//! Shared by the publish fan-out and the on-demand query surface. Evaluation
//! time is always passed in, never read from a clock.

mod rules;

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{Opportunity, UserProfile};

/// Full four-rule predicate, preceded by the unconditional deadline check.
pub fn is_eligible(profile: &UserProfile, opportunity: &Opportunity, today: NaiveDate) -> bool {
    if opportunity.deadline < today {
        return false;
    }
    rules::age_eligible(profile, opportunity)
        && rules::education_eligible(profile, opportunity)
        && rules::location_eligible(profile, opportunity)
        && rules::category_eligible(profile, opportunity)
}

/// Evaluates every opportunity exactly once, keeps the matches, and orders
/// them by deadline ascending with ascending id as the tiebreak. The full
/// list is returned; truncation belongs to the presentation layer.
pub fn rank_matches(
    profile: &UserProfile,
    mut opportunities: Vec<Opportunity>,
    today: NaiveDate,
) -> Vec<Opportunity> {
    opportunities.retain(|opportunity| is_eligible(profile, opportunity, today));
    opportunities.sort_by(|a, b| {
        a.deadline
            .cmp(&b.deadline)
            .then_with(|| a.opportunity_id.cmp(&b.opportunity_id))
    });
    opportunities
}

/// Per-rule verdicts for one (profile, opportunity) evaluation, so callers can
/// surface why a candidate missed. Does not alter the predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchBreakdown {
    pub expired: bool,
    pub age: bool,
    pub education: bool,
    pub location: bool,
    pub categories: bool,
}

impl MatchBreakdown {
    pub fn matched(&self) -> bool {
        !self.expired && self.age && self.education && self.location && self.categories
    }
}

/// Evaluates all rules without short-circuiting, for diagnostics.
pub fn explain(profile: &UserProfile, opportunity: &Opportunity, today: NaiveDate) -> MatchBreakdown {
    MatchBreakdown {
        expired: opportunity.deadline < today,
        age: rules::age_eligible(profile, opportunity),
        education: rules::education_eligible(profile, opportunity),
        location: rules::location_eligible(profile, opportunity),
        categories: rules::category_eligible(profile, opportunity),
    }
}
