//! Reference in-memory store adapters.
//!
//! These back the service wiring in small deployments and double as the
//! storage fixtures for integration tests. Each adapter serializes access
//! through a single mutex, which is sufficient for the claim/update atomicity
//! the pipeline needs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use chrono::NaiveDate;

use super::domain::{
    AlertRegistration, DeliveryRecord, Opportunity, OpportunityId, UserId, UserProfile,
};
use super::repository::{
    AlertRegistryStore, NotificationLogStore, OpportunityStore, ProfileStore, StoreError,
};

/// Profile storage backed by a mutex-guarded map with a phone index.
#[derive(Default)]
pub struct InMemoryProfileStore {
    inner: Mutex<ProfileState>,
}

#[derive(Default)]
struct ProfileState {
    records: HashMap<UserId, UserProfile>,
    by_phone: HashMap<String, UserId>,
}

impl ProfileStore for InMemoryProfileStore {
    fn get(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        let state = self.inner.lock().expect("profile store mutex poisoned");
        Ok(state.records.get(user_id).cloned())
    }

    fn get_by_phone(&self, phone: &str) -> Result<Option<UserProfile>, StoreError> {
        let state = self.inner.lock().expect("profile store mutex poisoned");
        Ok(state
            .by_phone
            .get(phone)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    fn put(&self, profile: UserProfile) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("profile store mutex poisoned");
        if let Some(owner) = state.by_phone.get(&profile.phone) {
            if owner != &profile.user_id {
                return Err(StoreError::Conflict);
            }
        }
        if let Some(previous) = state.records.get(&profile.user_id) {
            if previous.phone != profile.phone {
                let stale = previous.phone.clone();
                state.by_phone.remove(&stale);
            }
        }
        state
            .by_phone
            .insert(profile.phone.clone(), profile.user_id.clone());
        state.records.insert(profile.user_id.clone(), profile);
        Ok(())
    }

    fn delete(&self, user_id: &UserId) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("profile store mutex poisoned");
        match state.records.remove(user_id) {
            Some(profile) => {
                state.by_phone.remove(&profile.phone);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

/// Opportunity storage with a (deadline, id) index for bounded range queries.
#[derive(Default)]
pub struct InMemoryOpportunityStore {
    inner: Mutex<OpportunityState>,
}

#[derive(Default)]
struct OpportunityState {
    records: HashMap<OpportunityId, Opportunity>,
    by_deadline: BTreeMap<(NaiveDate, OpportunityId), ()>,
}

impl InMemoryOpportunityStore {
    /// Removes opportunities past their retention window, returning how many
    /// were purged.
    pub fn purge_expired(&self, today: NaiveDate, retention_days: i64) -> usize {
        let mut state = self.inner.lock().expect("opportunity store mutex poisoned");
        let expired: Vec<OpportunityId> = state
            .records
            .values()
            .filter(|opportunity| opportunity.purgeable(today, retention_days))
            .map(|opportunity| opportunity.opportunity_id.clone())
            .collect();
        for id in &expired {
            if let Some(opportunity) = state.records.remove(id) {
                state
                    .by_deadline
                    .remove(&(opportunity.deadline, opportunity.opportunity_id));
            }
        }
        expired.len()
    }
}

impl OpportunityStore for InMemoryOpportunityStore {
    fn get(&self, opportunity_id: &OpportunityId) -> Result<Option<Opportunity>, StoreError> {
        let state = self.inner.lock().expect("opportunity store mutex poisoned");
        Ok(state.records.get(opportunity_id).cloned())
    }

    fn put(&self, opportunity: Opportunity) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("opportunity store mutex poisoned");
        if let Some(previous) = state.records.get(&opportunity.opportunity_id) {
            let stale = (previous.deadline, previous.opportunity_id.clone());
            state.by_deadline.remove(&stale);
        }
        state.by_deadline.insert(
            (opportunity.deadline, opportunity.opportunity_id.clone()),
            (),
        );
        state
            .records
            .insert(opportunity.opportunity_id.clone(), opportunity);
        Ok(())
    }

    fn query_by_deadline_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Opportunity>, StoreError> {
        let state = self.inner.lock().expect("opportunity store mutex poisoned");
        let lower = (from, OpportunityId(String::new()));
        let results = state
            .by_deadline
            .range(lower..)
            .take_while(|((deadline, _), _)| *deadline <= to)
            .filter_map(|((_, id), _)| state.records.get(id).cloned())
            .collect();
        Ok(results)
    }
}

/// Registry storage maintaining a dedicated active-user index so publish
/// fan-out queries the opted-in set rather than scanning every registration.
#[derive(Default)]
pub struct InMemoryAlertRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<UserId, AlertRegistration>,
    active: HashSet<UserId>,
}

impl AlertRegistryStore for InMemoryAlertRegistry {
    fn list_active(&self) -> Result<Vec<UserId>, StoreError> {
        let state = self.inner.lock().expect("alert registry mutex poisoned");
        let mut users: Vec<UserId> = state.active.iter().cloned().collect();
        users.sort();
        Ok(users)
    }

    fn upsert(&self, registration: AlertRegistration) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("alert registry mutex poisoned");
        if registration.active {
            state.active.insert(registration.user_id.clone());
        } else {
            state.active.remove(&registration.user_id);
        }
        state
            .records
            .insert(registration.user_id.clone(), registration);
        Ok(())
    }

    fn delete(&self, user_id: &UserId) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("alert registry mutex poisoned");
        state.active.remove(user_id);
        state.records.remove(user_id);
        Ok(())
    }
}

/// Append-only notification log.
#[derive(Default)]
pub struct InMemoryNotificationLog {
    records: Mutex<Vec<DeliveryRecord>>,
}

impl NotificationLogStore for InMemoryNotificationLog {
    fn append(&self, record: DeliveryRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .expect("notification log mutex poisoned")
            .push(record);
        Ok(())
    }

    fn query_by_user(&self, user_id: &UserId) -> Result<Vec<DeliveryRecord>, StoreError> {
        let records = self.records.lock().expect("notification log mutex poisoned");
        Ok(records
            .iter()
            .filter(|record| &record.user_id == user_id)
            .cloned()
            .collect())
    }

    fn terminal_record(
        &self,
        user_id: &UserId,
        opportunity_id: &OpportunityId,
    ) -> Result<Option<DeliveryRecord>, StoreError> {
        let records = self.records.lock().expect("notification log mutex poisoned");
        Ok(records
            .iter()
            .rev()
            .find(|record| {
                record.status.is_terminal()
                    && &record.user_id == user_id
                    && &record.opportunity_id == opportunity_id
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::*;
    use crate::pipeline::alerts::domain::{EducationLevel, TaskStatus};

    fn profile(id: &str, phone: &str) -> UserProfile {
        UserProfile {
            user_id: UserId(id.to_string()),
            phone: phone.to_string(),
            name: "Asha".to_string(),
            age: 22,
            education: EducationLevel::Undergraduate,
            location: "Delhi".to_string(),
            preferences: BTreeSet::from(["jobs".to_string()]),
            language: "hi".to_string(),
        }
    }

    fn opportunity(id: &str, deadline: NaiveDate) -> Opportunity {
        Opportunity {
            opportunity_id: OpportunityId(id.to_string()),
            title: format!("Opportunity {id}"),
            description: String::new(),
            deadline,
            application_url: "https://example.gov/apply".to_string(),
            min_age: 0,
            max_age: 150,
            min_education: EducationLevel::HighSchool,
            eligible_locations: BTreeSet::new(),
            categories: BTreeSet::from(["jobs".to_string()]),
            source: "seed".to_string(),
            published_at: Utc::now(),
        }
    }

    #[test]
    fn profile_round_trip_preserves_fields() {
        let store = InMemoryProfileStore::default();
        let stored = profile("user-1", "+911234567890");
        store.put(stored.clone()).expect("put succeeds");

        let fetched = store
            .get(&UserId("user-1".to_string()))
            .expect("get succeeds")
            .expect("profile present");
        assert_eq!(fetched, stored);

        let by_phone = store
            .get_by_phone("+911234567890")
            .expect("lookup succeeds")
            .expect("profile present");
        assert_eq!(by_phone.user_id, stored.user_id);
    }

    #[test]
    fn duplicate_phone_rejected_across_users() {
        let store = InMemoryProfileStore::default();
        store
            .put(profile("user-1", "+911234567890"))
            .expect("first put succeeds");

        let err = store
            .put(profile("user-2", "+911234567890"))
            .expect_err("phone already claimed");
        assert_eq!(err, StoreError::Conflict);
    }

    #[test]
    fn phone_index_follows_updates() {
        let store = InMemoryProfileStore::default();
        store
            .put(profile("user-1", "+911234567890"))
            .expect("put succeeds");
        store
            .put(profile("user-1", "+919999999999"))
            .expect("update succeeds");

        assert!(store
            .get_by_phone("+911234567890")
            .expect("lookup succeeds")
            .is_none());
        assert!(store
            .get_by_phone("+919999999999")
            .expect("lookup succeeds")
            .is_some());
    }

    #[test]
    fn deadline_range_query_is_bounded_and_ordered() {
        let store = InMemoryOpportunityStore::default();
        let march = NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date");
        let april = NaiveDate::from_ymd_opt(2026, 4, 1).expect("valid date");
        let may = NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid date");
        store.put(opportunity("opp-b", april)).expect("put");
        store.put(opportunity("opp-a", april)).expect("put");
        store.put(opportunity("opp-c", may)).expect("put");
        store.put(opportunity("opp-d", march)).expect("put");

        let results = store
            .query_by_deadline_range(april, april)
            .expect("query succeeds");
        let ids: Vec<&str> = results
            .iter()
            .map(|o| o.opportunity_id.0.as_str())
            .collect();
        assert_eq!(ids, vec!["opp-a", "opp-b"]);
    }

    #[test]
    fn purge_removes_past_retention_only() {
        let store = InMemoryOpportunityStore::default();
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).expect("valid date");
        store
            .put(opportunity(
                "opp-old",
                NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date"),
            ))
            .expect("put");
        store
            .put(opportunity(
                "opp-recent",
                NaiveDate::from_ymd_opt(2026, 5, 15).expect("valid date"),
            ))
            .expect("put");

        let purged = store.purge_expired(today, 90);
        assert_eq!(purged, 1);
        assert!(store
            .get(&OpportunityId("opp-old".to_string()))
            .expect("get")
            .is_none());
        assert!(store
            .get(&OpportunityId("opp-recent".to_string()))
            .expect("get")
            .is_some());
    }

    #[test]
    fn registry_tracks_active_set() {
        let registry = InMemoryAlertRegistry::default();
        let now = Utc::now();
        registry
            .upsert(AlertRegistration {
                user_id: UserId("user-1".to_string()),
                registered_at: now,
                active: true,
            })
            .expect("upsert");
        registry
            .upsert(AlertRegistration {
                user_id: UserId("user-2".to_string()),
                registered_at: now,
                active: true,
            })
            .expect("upsert");
        registry
            .upsert(AlertRegistration {
                user_id: UserId("user-2".to_string()),
                registered_at: now,
                active: false,
            })
            .expect("deactivate");

        let active = registry.list_active().expect("list");
        assert_eq!(active, vec![UserId("user-1".to_string())]);
    }

    #[test]
    fn terminal_record_ignores_non_terminal_entries() {
        let log = InMemoryNotificationLog::default();
        let user = UserId("user-1".to_string());
        let opp = OpportunityId("opp-1".to_string());
        let now = Utc::now();
        log.append(DeliveryRecord {
            user_id: user.clone(),
            opportunity_id: opp.clone(),
            status: TaskStatus::Queued,
            attempt: 1,
            recorded_at: now,
        })
        .expect("append");

        assert!(log
            .terminal_record(&user, &opp)
            .expect("query")
            .is_none());

        log.append(DeliveryRecord {
            user_id: user.clone(),
            opportunity_id: opp.clone(),
            status: TaskStatus::Delivered,
            attempt: 2,
            recorded_at: now,
        })
        .expect("append");

        let terminal = log
            .terminal_record(&user, &opp)
            .expect("query")
            .expect("terminal present");
        assert_eq!(terminal.status, TaskStatus::Delivered);
        assert_eq!(terminal.attempt, 2);
    }
}
