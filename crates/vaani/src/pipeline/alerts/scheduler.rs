use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use super::domain::{DeliveryRecord, NotificationTask, TaskStatus};
use super::queue::TaskIntake;
use super::repository::{NotificationLogStore, OpportunityStore, ProfileStore, StoreError};
use super::retry::{with_retries, BackoffPolicy};
use super::telephony::{CallOutcome, CallRequest, TelephonyGateway};

/// Delivery state-machine tunables. Defaults carry the production constants;
/// tests inject tighter ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub total_window: Duration,
    pub claim_batch: usize,
    pub poll_interval: StdDuration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::hours(1),
            backoff_cap: Duration::hours(12),
            total_window: Duration::hours(24),
            claim_batch: 16,
            poll_interval: StdDuration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    /// Delay before the attempt after `failed_attempt`, capped.
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        let doubled = self.backoff_base * 2_i32.saturating_pow(failed_attempt.saturating_sub(1));
        doubled.min(self.backoff_cap)
    }
}

/// Counters for one scheduler pass; informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerTick {
    pub claimed: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub exhausted: usize,
}

/// Owns notification task retry state: claims due tasks, attempts delivery
/// through the telephony gateway, and either finalizes or reschedules with
/// bounded exponential backoff.
pub struct DeliveryScheduler<Q, G, P, O, L> {
    intake: Arc<Q>,
    gateway: Arc<G>,
    profiles: Arc<P>,
    opportunities: Arc<O>,
    log: Arc<L>,
    config: SchedulerConfig,
    retry: BackoffPolicy,
}

enum FailureDisposition {
    Rescheduled,
    Exhausted,
}

impl<Q, G, P, O, L> DeliveryScheduler<Q, G, P, O, L>
where
    Q: TaskIntake + 'static,
    G: TelephonyGateway + 'static,
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    L: NotificationLogStore + 'static,
{
    pub fn new(
        intake: Arc<Q>,
        gateway: Arc<G>,
        profiles: Arc<P>,
        opportunities: Arc<O>,
        log: Arc<L>,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_retry_policy(
            intake,
            gateway,
            profiles,
            opportunities,
            log,
            config,
            BackoffPolicy::default(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_retry_policy(
        intake: Arc<Q>,
        gateway: Arc<G>,
        profiles: Arc<P>,
        opportunities: Arc<O>,
        log: Arc<L>,
        config: SchedulerConfig,
        retry: BackoffPolicy,
    ) -> Self {
        Self {
            intake,
            gateway,
            profiles,
            opportunities,
            log,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Claims and processes every task due at `now`. Each task ends the pass
    /// either terminal (acked) or released with a future visibility time.
    pub fn run_due(&self, now: DateTime<Utc>) -> Result<SchedulerTick, StoreError> {
        let claimed = with_retries(self.retry, "intake_claim_due", || {
            self.intake.claim_due(now, self.config.claim_batch)
        })?;

        let mut tick = SchedulerTick {
            claimed: claimed.len(),
            ..SchedulerTick::default()
        };

        for task in claimed {
            match self.process(task, now)? {
                TaskStatus::Delivered => tick.delivered += 1,
                TaskStatus::RetryScheduled => tick.rescheduled += 1,
                TaskStatus::Exhausted => tick.exhausted += 1,
                TaskStatus::Queued => {}
            }
        }
        Ok(tick)
    }

    fn process(
        &self,
        mut task: NotificationTask,
        now: DateTime<Utc>,
    ) -> Result<TaskStatus, StoreError> {
        // A claimed retry_scheduled task re-enters queued before the attempt.
        if task.status == TaskStatus::RetryScheduled {
            task.status = TaskStatus::Queued;
            self.append_record(&task, TaskStatus::Queued, now)?;
        }

        let profile = with_retries(self.retry, "profile_get", || {
            self.profiles.get(&task.user_id)
        })?;
        let opportunity = with_retries(self.retry, "opportunity_get", || {
            self.opportunities.get(&task.opportunity_id)
        })?;
        let (Some(profile), Some(opportunity)) = (profile, opportunity) else {
            warn!(
                task_id = %task.task_id.0,
                user_id = %task.user_id.0,
                opportunity_id = %task.opportunity_id.0,
                "task references a missing record, finalizing"
            );
            self.finalize(&task, TaskStatus::Exhausted, now)?;
            return Ok(TaskStatus::Exhausted);
        };

        let request = CallRequest {
            dedup_key: task.task_id.clone(),
            attempt: task.attempt,
            phone: profile.phone,
            title: opportunity.title,
            deadline: opportunity.deadline,
            application_url: opportunity.application_url,
            language: profile.language,
        };

        match self.gateway.place_call(&request) {
            Ok(CallOutcome::Answered) => {
                self.finalize(&task, TaskStatus::Delivered, now)?;
                Ok(TaskStatus::Delivered)
            }
            Ok(outcome) => {
                info!(
                    task_id = %task.task_id.0,
                    attempt = task.attempt,
                    outcome = ?outcome,
                    "call not delivered"
                );
                self.handle_failure(task, now)
            }
            Err(gateway_error) => {
                warn!(
                    task_id = %task.task_id.0,
                    attempt = task.attempt,
                    error = %gateway_error,
                    "telephony gateway failure"
                );
                self.handle_failure(task, now)
            }
        }
    }

    fn handle_failure(
        &self,
        mut task: NotificationTask,
        now: DateTime<Utc>,
    ) -> Result<TaskStatus, StoreError> {
        let disposition = if task.attempt >= self.config.max_attempts {
            FailureDisposition::Exhausted
        } else {
            let next_attempt_at = now + self.config.backoff_delay(task.attempt);
            if next_attempt_at > task.created_at + self.config.total_window {
                FailureDisposition::Exhausted
            } else {
                task.attempt += 1;
                task.status = TaskStatus::RetryScheduled;
                task.next_attempt_at = next_attempt_at;
                FailureDisposition::Rescheduled
            }
        };

        match disposition {
            FailureDisposition::Exhausted => {
                self.finalize(&task, TaskStatus::Exhausted, now)?;
                Ok(TaskStatus::Exhausted)
            }
            FailureDisposition::Rescheduled => {
                self.append_record(&task, TaskStatus::RetryScheduled, now)?;
                let visible_after = task.next_attempt_at;
                with_retries(self.retry, "intake_release", || {
                    self.intake.release_with_delay(task.clone(), visible_after)
                })?;
                Ok(TaskStatus::RetryScheduled)
            }
        }
    }

    /// Terminal transition: the record outlives the task, which leaves the
    /// pending index entirely.
    fn finalize(
        &self,
        task: &NotificationTask,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.append_record(task, status, now)?;
        with_retries(self.retry, "intake_ack", || self.intake.ack(&task.task_id))?;
        info!(
            task_id = %task.task_id.0,
            user_id = %task.user_id.0,
            opportunity_id = %task.opportunity_id.0,
            attempt = task.attempt,
            status = status.label(),
            "notification task finalized"
        );
        Ok(())
    }

    fn append_record(
        &self,
        task: &NotificationTask,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        with_retries(self.retry, "log_append", || {
            self.log.append(DeliveryRecord {
                user_id: task.user_id.clone(),
                opportunity_id: task.opportunity_id.clone(),
                status,
                attempt: task.attempt,
                recorded_at: now,
            })
        })
    }
}

/// Polls the task intake on the configured interval and drives the delivery
/// state machine. Store failures are logged and the loop keeps going.
pub async fn run_worker<Q, G, P, O, L>(scheduler: Arc<DeliveryScheduler<Q, G, P, O, L>>)
where
    Q: TaskIntake + 'static,
    G: TelephonyGateway + 'static,
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    L: NotificationLogStore + 'static,
{
    let poll_interval = scheduler.config().poll_interval;
    loop {
        match scheduler.run_due(Utc::now()) {
            Ok(tick) if tick.claimed > 0 => {
                info!(
                    claimed = tick.claimed,
                    delivered = tick.delivered,
                    rescheduled = tick.rescheduled,
                    exhausted = tick.exhausted,
                    "delivery pass complete"
                );
            }
            Ok(_) => {}
            Err(store_error) => {
                error!(error = %store_error, "delivery pass failed");
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}
