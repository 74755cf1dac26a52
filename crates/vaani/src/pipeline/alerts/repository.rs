use std::time::Duration;

use chrono::NaiveDate;

use super::domain::{
    AlertRegistration, DeliveryRecord, Opportunity, OpportunityId, UserId, UserProfile,
};

/// Profile storage abstraction so services and tests can swap backends.
pub trait ProfileStore: Send + Sync {
    fn get(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError>;
    fn get_by_phone(&self, phone: &str) -> Result<Option<UserProfile>, StoreError>;
    fn put(&self, profile: UserProfile) -> Result<(), StoreError>;
    fn delete(&self, user_id: &UserId) -> Result<(), StoreError>;
}

/// Opportunity storage abstraction with deadline-bounded querying.
pub trait OpportunityStore: Send + Sync {
    fn get(&self, opportunity_id: &OpportunityId) -> Result<Option<Opportunity>, StoreError>;
    fn put(&self, opportunity: Opportunity) -> Result<(), StoreError>;
    /// Returns opportunities whose deadline falls within `[from, to]`,
    /// ordered by (deadline, id) ascending.
    fn query_by_deadline_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Opportunity>, StoreError>;
}

/// Opt-in registry abstraction; one registration per user, upsert overwrites.
pub trait AlertRegistryStore: Send + Sync {
    fn list_active(&self) -> Result<Vec<UserId>, StoreError>;
    fn upsert(&self, registration: AlertRegistration) -> Result<(), StoreError>;
    fn delete(&self, user_id: &UserId) -> Result<(), StoreError>;
}

/// Append-only notification log; entries are never mutated.
pub trait NotificationLogStore: Send + Sync {
    fn append(&self, record: DeliveryRecord) -> Result<(), StoreError>;
    fn query_by_user(&self, user_id: &UserId) -> Result<Vec<DeliveryRecord>, StoreError>;
    /// Most recent terminal (delivered or exhausted) record for the pair, if
    /// one exists. Lets the dispatcher skip pairs already carried to term.
    fn terminal_record(
        &self,
        user_id: &UserId,
        opportunity_id: &OpportunityId,
    ) -> Result<Option<DeliveryRecord>, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call exceeded {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// Transient failures are worth a bounded local retry; conflicts and
    /// missing records are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}
