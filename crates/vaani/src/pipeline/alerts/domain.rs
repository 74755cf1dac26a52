use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for registered users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for ingested opportunities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpportunityId(pub String);

/// Identifier wrapper for notification tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

/// Location token accepted by an opportunity to mean "no restriction".
pub const LOCATION_WILDCARD: &str = "all";

/// Ordered education levels; the derived `Ord` drives eligibility ranking.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    #[default]
    HighSchool,
    Undergraduate,
    Graduate,
    Postgraduate,
}

impl EducationLevel {
    /// Parses a wire token; anything unrecognized falls back to `HighSchool`.
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "undergraduate" | "bachelors" => Self::Undergraduate,
            "graduate" | "masters" => Self::Graduate,
            "postgraduate" | "phd" | "doctorate" => Self::Postgraduate,
            _ => Self::HighSchool,
        }
    }

    pub const fn rank(self) -> u8 {
        match self {
            EducationLevel::HighSchool => 1,
            EducationLevel::Undergraduate => 2,
            EducationLevel::Graduate => 3,
            EducationLevel::Postgraduate => 4,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EducationLevel::HighSchool => "high_school",
            EducationLevel::Undergraduate => "undergraduate",
            EducationLevel::Graduate => "graduate",
            EducationLevel::Postgraduate => "postgraduate",
        }
    }
}

/// Demographic and preference record for one registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub phone: String,
    pub name: String,
    pub age: u8,
    pub education: EducationLevel,
    pub location: String,
    pub preferences: BTreeSet<String>,
    pub language: String,
}

/// Unvalidated profile payload as received on the wire. Also serves as the
/// partial-profile container inside call sessions, so it serializes too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub phone: Option<String>,
    pub name: Option<String>,
    pub age: Option<u8>,
    pub education: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub preferences: BTreeSet<String>,
    pub language: Option<String>,
}

impl ProfileDraft {
    /// Validates the draft into a complete profile, reporting every missing or
    /// malformed field rather than stopping at the first.
    pub fn into_profile(self, user_id: UserId) -> Result<UserProfile, ValidationError> {
        let mut missing = Vec::new();

        let phone = match self.phone.as_deref().map(str::trim) {
            Some(value) if is_e164(value) => Some(value.to_string()),
            _ => {
                missing.push("phone");
                None
            }
        };
        let name = match self.name.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => {
                missing.push("name");
                None
            }
        };
        let age = match self.age {
            Some(value) => Some(value),
            None => {
                missing.push("age");
                None
            }
        };
        let education = match self.education.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(EducationLevel::parse_or_default(value)),
            _ => {
                missing.push("education");
                None
            }
        };
        let location = match self.location.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => {
                missing.push("location");
                None
            }
        };
        if self.preferences.is_empty() {
            missing.push("preferences");
        }
        let language = match self.language.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(value.to_ascii_lowercase()),
            _ => {
                missing.push("language");
                None
            }
        };

        if !missing.is_empty() {
            return Err(ValidationError::new("profile", missing));
        }

        Ok(UserProfile {
            user_id,
            phone: phone.unwrap_or_default(),
            name: name.unwrap_or_default(),
            age: age.unwrap_or_default(),
            education: education.unwrap_or_default(),
            location: location.unwrap_or_default(),
            preferences: self.preferences,
            language: language.unwrap_or_default(),
        })
    }
}

/// Loose E.164 shape check: leading `+` then 8 to 15 digits.
pub fn is_e164(value: &str) -> bool {
    let Some(rest) = value.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&rest.len()) && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Time-bounded public program with eligibility criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_id: OpportunityId,
    pub title: String,
    pub description: String,
    pub deadline: NaiveDate,
    pub application_url: String,
    pub min_age: u8,
    pub max_age: u8,
    pub min_education: EducationLevel,
    pub eligible_locations: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub source: String,
    pub published_at: DateTime<Utc>,
}

impl Opportunity {
    /// True once the retention period after the deadline has elapsed and the
    /// record may be purged from storage.
    pub fn purgeable(&self, today: NaiveDate, retention_days: i64) -> bool {
        self.deadline + chrono::Duration::days(retention_days) < today
    }
}

/// Unvalidated opportunity payload as received from ingestion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpportunityDraft {
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    pub deadline: Option<NaiveDate>,
    pub application_url: Option<String>,
    pub min_age: Option<u8>,
    pub max_age: Option<u8>,
    pub min_education: Option<String>,
    #[serde(default)]
    pub eligible_locations: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub source: String,
}

impl OpportunityDraft {
    /// Validates the draft into a publishable opportunity, applying the
    /// documented defaults for absent criteria fields.
    pub fn into_opportunity(
        self,
        opportunity_id: OpportunityId,
        published_at: DateTime<Utc>,
    ) -> Result<Opportunity, ValidationError> {
        let mut missing = Vec::new();

        let title = match self.title.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => {
                missing.push("title");
                None
            }
        };
        let deadline = match self.deadline {
            Some(value) => Some(value),
            None => {
                missing.push("deadline");
                None
            }
        };
        let application_url = match self.application_url.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => {
                missing.push("application_url");
                None
            }
        };
        if self.categories.is_empty() {
            missing.push("categories");
        }

        if !missing.is_empty() {
            return Err(ValidationError::new("opportunity", missing));
        }

        Ok(Opportunity {
            opportunity_id,
            title: title.unwrap_or_default(),
            description: self.description,
            deadline: deadline.unwrap_or_default(),
            application_url: application_url.unwrap_or_default(),
            min_age: self.min_age.unwrap_or(0),
            max_age: self.max_age.unwrap_or(150),
            min_education: self
                .min_education
                .as_deref()
                .map(EducationLevel::parse_or_default)
                .unwrap_or_default(),
            eligible_locations: self.eligible_locations,
            categories: self.categories,
            source: self.source,
            published_at,
        })
    }
}

/// Opt-in record for future opportunity notifications, one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRegistration {
    pub user_id: UserId,
    pub registered_at: DateTime<Utc>,
    pub active: bool,
}

/// Unit of delivery work for one (user, opportunity) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTask {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub opportunity_id: OpportunityId,
    pub attempt: u32,
    pub status: TaskStatus,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Delivery state of a notification task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    RetryScheduled,
    Delivered,
    Exhausted,
}

impl TaskStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Delivered | TaskStatus::Exhausted)
    }

    pub const fn label(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::RetryScheduled => "retry_scheduled",
            TaskStatus::Delivered => "delivered",
            TaskStatus::Exhausted => "exhausted",
        }
    }
}

/// Immutable notification log entry written on every task transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub user_id: UserId,
    pub opportunity_id: OpportunityId,
    pub status: TaskStatus,
    pub attempt: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Rejected input with the full list of offending fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {entity}: missing or malformed fields [{}]", missing.join(", "))]
pub struct ValidationError {
    pub entity: &'static str,
    pub missing: Vec<&'static str>,
}

impl ValidationError {
    pub fn new(entity: &'static str, missing: Vec<&'static str>) -> Self {
        Self { entity, missing }
    }
}
