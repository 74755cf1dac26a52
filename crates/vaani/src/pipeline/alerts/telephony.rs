use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::TaskId;

/// Outbound call attributes handed to the telephony provider.
///
/// `dedup_key` is the task identity; the attempt number completes the key.
/// Gateways must treat a repeated (dedup_key, attempt) pair as already placed
/// and report the prior outcome instead of dialing the user again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub dedup_key: TaskId,
    pub attempt: u32,
    pub phone: String,
    pub title: String,
    pub deadline: NaiveDate,
    pub application_url: String,
    pub language: String,
}

/// Result of a placed call as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Answered,
    NoAnswer,
    Busy,
}

/// Provider-side failure to place the call at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("telephony gateway unavailable: {0}")]
    Unavailable(String),
    #[error("telephony gateway timed out after {0} seconds")]
    Timeout(u64),
}

/// Outbound voice seam so the scheduler can be exercised against fakes.
pub trait TelephonyGateway: Send + Sync {
    fn place_call(&self, request: &CallRequest) -> Result<CallOutcome, GatewayError>;
}
