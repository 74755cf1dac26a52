use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{AlertRegistration, ProfileDraft, UserId, UserProfile, ValidationError};
use super::repository::{AlertRegistryStore, ProfileStore, StoreError};
use super::retry::{with_retries, BackoffPolicy};

static USER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_user_id() -> UserId {
    let id = USER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    UserId(format!("user-{id:06}"))
}

/// Profile and alert-registration lifecycle service.
///
/// Stored profiles are always complete: drafts are validated at this boundary
/// and never persisted partially. Registration therefore only has to check
/// that the profile exists.
pub struct DirectoryService<P, R> {
    profiles: Arc<P>,
    registry: Arc<R>,
    retry: BackoffPolicy,
}

impl<P, R> DirectoryService<P, R>
where
    P: ProfileStore + 'static,
    R: AlertRegistryStore + 'static,
{
    pub fn new(profiles: Arc<P>, registry: Arc<R>) -> Self {
        Self::with_retry_policy(profiles, registry, BackoffPolicy::default())
    }

    pub fn with_retry_policy(profiles: Arc<P>, registry: Arc<R>, retry: BackoffPolicy) -> Self {
        Self {
            profiles,
            registry,
            retry,
        }
    }

    pub fn create_profile(&self, draft: ProfileDraft) -> Result<UserProfile, DirectoryError> {
        let profile = draft.into_profile(next_user_id())?;
        with_retries(self.retry, "profile_put", || {
            self.profiles.put(profile.clone())
        })?;
        info!(user_id = %profile.user_id.0, "profile created");
        Ok(profile)
    }

    /// Full-replacement update; the draft must validate as a complete profile.
    pub fn update_profile(
        &self,
        user_id: &UserId,
        draft: ProfileDraft,
    ) -> Result<UserProfile, DirectoryError> {
        let existing = with_retries(self.retry, "profile_get", || self.profiles.get(user_id))?;
        if existing.is_none() {
            return Err(DirectoryError::Store(StoreError::NotFound));
        }
        let profile = draft.into_profile(user_id.clone())?;
        with_retries(self.retry, "profile_put", || {
            self.profiles.put(profile.clone())
        })?;
        Ok(profile)
    }

    pub fn get_profile(&self, user_id: &UserId) -> Result<UserProfile, DirectoryError> {
        let profile = with_retries(self.retry, "profile_get", || self.profiles.get(user_id))?;
        profile.ok_or(DirectoryError::Store(StoreError::NotFound))
    }

    pub fn find_by_phone(&self, phone: &str) -> Result<UserProfile, DirectoryError> {
        let profile = with_retries(self.retry, "profile_get_by_phone", || {
            self.profiles.get_by_phone(phone)
        })?;
        profile.ok_or(DirectoryError::Store(StoreError::NotFound))
    }

    /// Deletes the profile and cascades to the alert registry. Historical
    /// notification logs are left untouched. The dispatcher tolerates the
    /// window where the registry entry outlives the profile.
    pub fn delete_profile(&self, user_id: &UserId) -> Result<(), DirectoryError> {
        with_retries(self.retry, "profile_delete", || {
            self.profiles.delete(user_id)
        })?;
        with_retries(self.retry, "registry_delete", || {
            self.registry.delete(user_id)
        })?;
        info!(user_id = %user_id.0, "profile deleted with registry cascade");
        Ok(())
    }

    /// Opts the user into future notifications; re-registering overwrites.
    pub fn register_alerts(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<AlertRegistration, DirectoryError> {
        let profile = with_retries(self.retry, "profile_get", || self.profiles.get(user_id))?;
        if profile.is_none() {
            return Err(DirectoryError::Store(StoreError::NotFound));
        }

        let registration = AlertRegistration {
            user_id: user_id.clone(),
            registered_at: now,
            active: true,
        };
        with_retries(self.retry, "registry_upsert", || {
            self.registry.upsert(registration.clone())
        })?;
        info!(user_id = %user_id.0, "alert registration active");
        Ok(registration)
    }

    /// Deactivates the registration, keeping the record for audit.
    pub fn unregister_alerts(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        let registration = AlertRegistration {
            user_id: user_id.clone(),
            registered_at: now,
            active: false,
        };
        with_retries(self.retry, "registry_upsert", || {
            self.registry.upsert(registration.clone())
        })?;
        info!(user_id = %user_id.0, "alert registration deactivated");
        Ok(())
    }
}

/// Error raised by the directory service.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
