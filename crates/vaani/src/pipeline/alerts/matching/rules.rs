use super::super::domain::{Opportunity, UserProfile, LOCATION_WILDCARD};

pub(crate) fn age_eligible(profile: &UserProfile, opportunity: &Opportunity) -> bool {
    opportunity.min_age <= profile.age && profile.age <= opportunity.max_age
}

pub(crate) fn education_eligible(profile: &UserProfile, opportunity: &Opportunity) -> bool {
    profile.education.rank() >= opportunity.min_education.rank()
}

pub(crate) fn location_eligible(profile: &UserProfile, opportunity: &Opportunity) -> bool {
    if opportunity.eligible_locations.is_empty() {
        return true;
    }
    if opportunity
        .eligible_locations
        .iter()
        .any(|token| token.eq_ignore_ascii_case(LOCATION_WILDCARD))
    {
        return true;
    }
    opportunity
        .eligible_locations
        .iter()
        .any(|token| token.eq_ignore_ascii_case(&profile.location))
}

pub(crate) fn category_eligible(profile: &UserProfile, opportunity: &Opportunity) -> bool {
    profile
        .preferences
        .intersection(&opportunity.categories)
        .next()
        .is_some()
}
