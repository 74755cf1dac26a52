//! Opportunity alerting: profile directory, ingestion, eligibility matching,
//! publish fan-out, and bounded-retry voice delivery.

pub mod directory;
pub mod dispatch;
pub mod domain;
pub mod ingest;
pub mod matching;
pub mod memory;
pub mod queue;
pub mod repository;
pub mod retry;
pub mod router;
pub mod scheduler;
pub mod telephony;

#[cfg(test)]
mod tests;

pub use directory::{DirectoryError, DirectoryService};
pub use dispatch::{DispatchOutcome, NotificationDispatcher};
pub use domain::{
    AlertRegistration, DeliveryRecord, EducationLevel, NotificationTask, Opportunity,
    OpportunityDraft, OpportunityId, ProfileDraft, TaskId, TaskStatus, UserId, UserProfile,
    ValidationError, LOCATION_WILDCARD,
};
pub use ingest::{IngestError, IngestReport, IngestService, RejectedRecord};
pub use matching::{explain, is_eligible, rank_matches, MatchBreakdown};
pub use memory::{
    InMemoryAlertRegistry, InMemoryNotificationLog, InMemoryOpportunityStore, InMemoryProfileStore,
};
pub use queue::{InMemoryTaskIntake, TaskIntake};
pub use repository::{
    AlertRegistryStore, NotificationLogStore, OpportunityStore, ProfileStore, StoreError,
};
pub use retry::{with_retries, BackoffPolicy};
pub use router::{alert_router, AlertServices};
pub use scheduler::{run_worker, DeliveryScheduler, SchedulerConfig, SchedulerTick};
pub use telephony::{CallOutcome, CallRequest, GatewayError, TelephonyGateway};
