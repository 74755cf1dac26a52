use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::alerts::domain::ProfileDraft;

/// Identifier wrapper for call sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Position in the voice conversation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStep {
    Greeting,
    LanguageSelection,
    CollectName,
    CollectAge,
    CollectEducation,
    CollectLocation,
    CollectPreferences,
    ConfirmRegistration,
    DeliverMatches,
    WrapUp,
}

impl ConversationStep {
    pub const fn label(self) -> &'static str {
        match self {
            ConversationStep::Greeting => "greeting",
            ConversationStep::LanguageSelection => "language_selection",
            ConversationStep::CollectName => "collect_name",
            ConversationStep::CollectAge => "collect_age",
            ConversationStep::CollectEducation => "collect_education",
            ConversationStep::CollectLocation => "collect_location",
            ConversationStep::CollectPreferences => "collect_preferences",
            ConversationStep::ConfirmRegistration => "confirm_registration",
            ConversationStep::DeliverMatches => "deliver_matches",
            ConversationStep::WrapUp => "wrap_up",
        }
    }
}

/// Ephemeral per-call state; exists only while the call is active or within
/// the resume window after a disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    pub session_id: SessionId,
    pub phone: String,
    pub step: ConversationStep,
    pub partial: ProfileDraft,
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub revision: u64,
}

/// Incremental change applied to a session on one conversation step.
/// Absent fields leave the current value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionDelta {
    pub step: Option<ConversationStep>,
    pub language: Option<String>,
    pub name: Option<String>,
    pub age: Option<u8>,
    pub education: Option<String>,
    pub location: Option<String>,
    pub preferences: Option<BTreeSet<String>>,
}

impl SessionDelta {
    pub fn apply(self, session: &mut CallSession) {
        if let Some(step) = self.step {
            session.step = step;
        }
        if let Some(language) = self.language {
            session.partial.language = Some(language.clone());
            session.language = Some(language);
        }
        if let Some(name) = self.name {
            session.partial.name = Some(name);
        }
        if let Some(age) = self.age {
            session.partial.age = Some(age);
        }
        if let Some(education) = self.education {
            session.partial.education = Some(education);
        }
        if let Some(location) = self.location {
            session.partial.location = Some(location);
        }
        if let Some(preferences) = self.preferences {
            session.partial.preferences = preferences;
        }
    }
}

/// How a completed call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    ProfileRegistered,
    MatchesDelivered,
    Abandoned,
}

impl SessionOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            SessionOutcome::ProfileRegistered => "profile_registered",
            SessionOutcome::MatchesDelivered => "matches_delivered",
            SessionOutcome::Abandoned => "abandoned",
        }
    }
}

/// Completion log entry; supersedes the session it records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub session_id: SessionId,
    pub phone: String,
    pub outcome: SessionOutcome,
    pub duration_secs: i64,
    pub final_step: ConversationStep,
    pub completed_at: DateTime<Utc>,
}
