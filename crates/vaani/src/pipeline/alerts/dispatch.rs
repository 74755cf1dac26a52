use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::domain::{DeliveryRecord, NotificationTask, Opportunity, TaskId, TaskStatus};
use super::matching;
use super::queue::TaskIntake;
use super::repository::{
    AlertRegistryStore, NotificationLogStore, ProfileStore, StoreError,
};
use super::retry::{with_retries, BackoffPolicy};

static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> TaskId {
    let id = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TaskId(format!("task-{id:06}"))
}

/// Fan-out from one published opportunity to per-user notification tasks.
pub struct NotificationDispatcher<R, P, Q, L> {
    registry: Arc<R>,
    profiles: Arc<P>,
    intake: Arc<Q>,
    log: Arc<L>,
    retry: BackoffPolicy,
}

/// Counters describing one fan-out run; informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub matched: usize,
    pub tasks_created: usize,
    pub skipped_active: usize,
    pub skipped_completed: usize,
    pub missing_profiles: usize,
}

impl<R, P, Q, L> NotificationDispatcher<R, P, Q, L>
where
    R: AlertRegistryStore + 'static,
    P: ProfileStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    pub fn new(registry: Arc<R>, profiles: Arc<P>, intake: Arc<Q>, log: Arc<L>) -> Self {
        Self::with_retry_policy(registry, profiles, intake, log, BackoffPolicy::default())
    }

    pub fn with_retry_policy(
        registry: Arc<R>,
        profiles: Arc<P>,
        intake: Arc<Q>,
        log: Arc<L>,
        retry: BackoffPolicy,
    ) -> Self {
        Self {
            registry,
            profiles,
            intake,
            log,
            retry,
        }
    }

    /// Handles one opportunity-published event. Safe to invoke more than once
    /// for the same opportunity: pairs with an active task or a terminal
    /// delivery record are skipped, never re-notified.
    pub fn dispatch(
        &self,
        opportunity: &Opportunity,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, StoreError> {
        let today = now.date_naive();
        let mut outcome = DispatchOutcome::default();

        let active = with_retries(self.retry, "registry_list_active", || {
            self.registry.list_active()
        })?;

        for user_id in active {
            let profile = with_retries(self.retry, "profile_get", || {
                self.profiles.get(&user_id)
            })?;
            let Some(profile) = profile else {
                warn!(
                    user_id = %user_id.0,
                    opportunity_id = %opportunity.opportunity_id.0,
                    "registered profile missing, skipping"
                );
                outcome.missing_profiles += 1;
                continue;
            };

            if !matching::is_eligible(&profile, opportunity, today) {
                continue;
            }
            outcome.matched += 1;

            let pair_active = with_retries(self.retry, "intake_pair_lookup", || {
                self.intake
                    .active_pair_exists(&user_id, &opportunity.opportunity_id)
            })?;
            if pair_active {
                outcome.skipped_active += 1;
                continue;
            }

            let already_terminal = with_retries(self.retry, "log_terminal_lookup", || {
                self.log
                    .terminal_record(&user_id, &opportunity.opportunity_id)
            })?;
            if already_terminal.is_some() {
                outcome.skipped_completed += 1;
                continue;
            }

            let task = NotificationTask {
                task_id: next_task_id(),
                user_id: user_id.clone(),
                opportunity_id: opportunity.opportunity_id.clone(),
                attempt: 1,
                status: TaskStatus::Queued,
                next_attempt_at: now,
                created_at: now,
            };

            with_retries(self.retry, "log_append", || {
                self.log.append(DeliveryRecord {
                    user_id: task.user_id.clone(),
                    opportunity_id: task.opportunity_id.clone(),
                    status: TaskStatus::Queued,
                    attempt: task.attempt,
                    recorded_at: now,
                })
            })?;

            match with_retries(self.retry, "intake_enqueue", || {
                self.intake.enqueue(task.clone(), now)
            }) {
                Ok(()) => outcome.tasks_created += 1,
                // A concurrent publish for the same opportunity won the pair.
                Err(StoreError::Conflict) => {
                    warn!(
                        user_id = %user_id.0,
                        opportunity_id = %opportunity.opportunity_id.0,
                        "task already queued for pair, skipping"
                    );
                    outcome.skipped_active += 1;
                }
                Err(error) => return Err(error),
            }
        }

        info!(
            opportunity_id = %opportunity.opportunity_id.0,
            matched = outcome.matched,
            tasks_created = outcome.tasks_created,
            skipped_active = outcome.skipped_active,
            skipped_completed = outcome.skipped_completed,
            missing_profiles = outcome.missing_profiles,
            "publish fan-out complete"
        );
        Ok(outcome)
    }
}
