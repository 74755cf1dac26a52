use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::pipeline::alerts::dispatch::NotificationDispatcher;
use crate::pipeline::alerts::domain::{
    AlertRegistration, EducationLevel, Opportunity, OpportunityId, ProfileDraft, TaskId, UserId,
    UserProfile,
};
use crate::pipeline::alerts::memory::{
    InMemoryAlertRegistry, InMemoryNotificationLog, InMemoryOpportunityStore, InMemoryProfileStore,
};
use crate::pipeline::alerts::queue::InMemoryTaskIntake;
use crate::pipeline::alerts::repository::{
    AlertRegistryStore, OpportunityStore, ProfileStore, StoreError,
};
use crate::pipeline::alerts::retry::BackoffPolicy;
use crate::pipeline::alerts::scheduler::{DeliveryScheduler, SchedulerConfig};
use crate::pipeline::alerts::telephony::{CallOutcome, CallRequest, GatewayError, TelephonyGateway};

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 1).expect("valid date")
}

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 1, 9, 0, 0)
        .single()
        .expect("valid time")
}

pub(super) fn delhi_profile() -> UserProfile {
    UserProfile {
        user_id: UserId("user-delhi".to_string()),
        phone: "+911234567890".to_string(),
        name: "Asha".to_string(),
        age: 22,
        education: EducationLevel::Undergraduate,
        location: "Delhi".to_string(),
        preferences: BTreeSet::from(["jobs".to_string()]),
        language: "hi".to_string(),
    }
}

pub(super) fn complete_draft(phone: &str) -> ProfileDraft {
    ProfileDraft {
        phone: Some(phone.to_string()),
        name: Some("Asha".to_string()),
        age: Some(22),
        education: Some("undergraduate".to_string()),
        location: Some("Delhi".to_string()),
        preferences: BTreeSet::from(["jobs".to_string()]),
        language: Some("hi".to_string()),
    }
}

/// The reference open-to-all opportunity: ages 18-30, any education, any
/// location, jobs and exams categories, deadline 2026-01-01.
pub(super) fn open_opportunity(id: &str) -> Opportunity {
    Opportunity {
        opportunity_id: OpportunityId(id.to_string()),
        title: "Railway recruitment drive".to_string(),
        description: "State recruitment for junior roles".to_string(),
        deadline: NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date"),
        application_url: "https://example.gov/railway".to_string(),
        min_age: 18,
        max_age: 30,
        min_education: EducationLevel::HighSchool,
        eligible_locations: BTreeSet::from(["all".to_string()]),
        categories: BTreeSet::from(["jobs".to_string(), "exams".to_string()]),
        source: "gazette".to_string(),
        published_at: base_time(),
    }
}

pub(super) fn mumbai_only_opportunity(id: &str) -> Opportunity {
    Opportunity {
        eligible_locations: BTreeSet::from(["Mumbai".to_string()]),
        ..open_opportunity(id)
    }
}

pub(super) fn expired_opportunity(id: &str) -> Opportunity {
    Opportunity {
        deadline: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date"),
        ..open_opportunity(id)
    }
}

pub(super) fn opportunity_with_deadline(id: &str, deadline: NaiveDate) -> Opportunity {
    Opportunity {
        deadline,
        ..open_opportunity(id)
    }
}

/// Gateway scripted per call. Outcomes are consumed in order; once the script
/// runs dry every further call answers. Repeated (task, attempt) pairs are
/// absorbed and replay the recorded outcome without placing a new call.
#[derive(Default)]
pub(super) struct ScriptedGateway {
    script: Mutex<VecDeque<Result<CallOutcome, GatewayError>>>,
    placed: Mutex<Vec<CallRequest>>,
    outcomes: Mutex<HashMap<(TaskId, u32), Result<CallOutcome, GatewayError>>>,
}

impl ScriptedGateway {
    pub(super) fn push_outcome(&self, outcome: Result<CallOutcome, GatewayError>) {
        self.script
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(outcome);
    }

    pub(super) fn placed(&self) -> Vec<CallRequest> {
        self.placed.lock().expect("gateway mutex poisoned").clone()
    }
}

impl TelephonyGateway for ScriptedGateway {
    fn place_call(&self, request: &CallRequest) -> Result<CallOutcome, GatewayError> {
        let key = (request.dedup_key.clone(), request.attempt);
        let mut outcomes = self.outcomes.lock().expect("gateway mutex poisoned");
        if let Some(previous) = outcomes.get(&key) {
            return previous.clone();
        }

        self.placed
            .lock()
            .expect("gateway mutex poisoned")
            .push(request.clone());
        let outcome = self
            .script
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(CallOutcome::Answered));
        outcomes.insert(key, outcome.clone());
        outcome
    }
}

/// Profile store that fails a set number of reads before recovering.
pub(super) struct FlakyProfiles {
    inner: InMemoryProfileStore,
    remaining_failures: AtomicU32,
}

impl FlakyProfiles {
    pub(super) fn failing(times: u32) -> Self {
        Self {
            inner: InMemoryProfileStore::default(),
            remaining_failures: AtomicU32::new(times),
        }
    }

    fn maybe_fail(&self) -> Result<(), StoreError> {
        let remaining = self.remaining_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::Relaxed);
            return Err(StoreError::Unavailable("profile store flapping".to_string()));
        }
        Ok(())
    }
}

impl ProfileStore for FlakyProfiles {
    fn get(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        self.maybe_fail()?;
        self.inner.get(user_id)
    }

    fn get_by_phone(&self, phone: &str) -> Result<Option<UserProfile>, StoreError> {
        self.maybe_fail()?;
        self.inner.get_by_phone(phone)
    }

    fn put(&self, profile: UserProfile) -> Result<(), StoreError> {
        self.inner.put(profile)
    }

    fn delete(&self, user_id: &UserId) -> Result<(), StoreError> {
        self.inner.delete(user_id)
    }
}

/// Fully wired in-memory pipeline for dispatcher and scheduler tests.
pub(super) struct Pipeline {
    pub(super) profiles: Arc<InMemoryProfileStore>,
    pub(super) opportunities: Arc<InMemoryOpportunityStore>,
    pub(super) registry: Arc<InMemoryAlertRegistry>,
    pub(super) intake: Arc<InMemoryTaskIntake>,
    pub(super) log: Arc<InMemoryNotificationLog>,
    pub(super) gateway: Arc<ScriptedGateway>,
}

impl Pipeline {
    pub(super) fn dispatcher(
        &self,
    ) -> NotificationDispatcher<
        InMemoryAlertRegistry,
        InMemoryProfileStore,
        InMemoryTaskIntake,
        InMemoryNotificationLog,
    > {
        NotificationDispatcher::with_retry_policy(
            self.registry.clone(),
            self.profiles.clone(),
            self.intake.clone(),
            self.log.clone(),
            BackoffPolicy::immediate(),
        )
    }

    pub(super) fn scheduler(
        &self,
        config: SchedulerConfig,
    ) -> DeliveryScheduler<
        InMemoryTaskIntake,
        ScriptedGateway,
        InMemoryProfileStore,
        InMemoryOpportunityStore,
        InMemoryNotificationLog,
    > {
        DeliveryScheduler::with_retry_policy(
            self.intake.clone(),
            self.gateway.clone(),
            self.profiles.clone(),
            self.opportunities.clone(),
            self.log.clone(),
            config,
            BackoffPolicy::immediate(),
        )
    }

    /// Stores the profile, activates its registration, and stores the
    /// opportunity so a publish will fan out to it.
    pub(super) fn seed_member(&self, profile: &UserProfile, opportunity: &Opportunity) {
        self.profiles.put(profile.clone()).expect("profile stored");
        self.registry
            .upsert(AlertRegistration {
                user_id: profile.user_id.clone(),
                registered_at: base_time(),
                active: true,
            })
            .expect("registration stored");
        self.opportunities
            .put(opportunity.clone())
            .expect("opportunity stored");
    }
}

pub(super) fn pipeline() -> Pipeline {
    Pipeline {
        profiles: Arc::new(InMemoryProfileStore::default()),
        opportunities: Arc::new(InMemoryOpportunityStore::default()),
        registry: Arc::new(InMemoryAlertRegistry::default()),
        intake: Arc::new(InMemoryTaskIntake::default()),
        log: Arc::new(InMemoryNotificationLog::default()),
        gateway: Arc::new(ScriptedGateway::default()),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
