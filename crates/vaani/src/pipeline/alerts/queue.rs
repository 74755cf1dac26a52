use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::domain::{NotificationTask, OpportunityId, TaskId, UserId};
use super::repository::StoreError;

/// Delivery work queue with delayed visibility.
///
/// Tasks become claimable once their `visible_after` time has passed. A
/// claimed task stays invisible until it is acked (terminal) or released with
/// a new visibility time (retry). Claiming is conditional on the task being
/// unclaimed, so concurrent workers never process the same task twice.
pub trait TaskIntake: Send + Sync {
    fn enqueue(
        &self,
        task: NotificationTask,
        visible_after: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Claims up to `limit` due tasks, oldest visibility first.
    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationTask>, StoreError>;
    /// Drops a task from the pending index. Acking an unknown task is a no-op
    /// so at-least-once scheduler invocations stay safe.
    fn ack(&self, task_id: &TaskId) -> Result<(), StoreError>;
    /// Stores the updated task back and makes it claimable after
    /// `visible_after`.
    fn release_with_delay(
        &self,
        task: NotificationTask,
        visible_after: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// True while a non-terminal task exists for the pair; backs the fan-out
    /// dedup rule.
    fn active_pair_exists(
        &self,
        user_id: &UserId,
        opportunity_id: &OpportunityId,
    ) -> Result<bool, StoreError>;
}

#[derive(Clone)]
struct QueueEntry {
    task: NotificationTask,
    visible_after: DateTime<Utc>,
    claimed: bool,
}

/// Mutex-guarded reference queue; the single lock makes claims atomic.
#[derive(Default)]
pub struct InMemoryTaskIntake {
    inner: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    entries: HashMap<TaskId, QueueEntry>,
    by_pair: HashMap<(UserId, OpportunityId), TaskId>,
}

impl InMemoryTaskIntake {
    /// Number of tasks currently pending (claimed or waiting).
    pub fn pending_count(&self) -> usize {
        self.inner.lock().expect("task intake mutex poisoned").entries.len()
    }
}

impl TaskIntake for InMemoryTaskIntake {
    fn enqueue(
        &self,
        task: NotificationTask,
        visible_after: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("task intake mutex poisoned");
        let pair = (task.user_id.clone(), task.opportunity_id.clone());
        if let Some(existing) = state.by_pair.get(&pair) {
            if existing != &task.task_id {
                return Err(StoreError::Conflict);
            }
        }
        state.by_pair.insert(pair, task.task_id.clone());
        state.entries.insert(
            task.task_id.clone(),
            QueueEntry {
                task,
                visible_after,
                claimed: false,
            },
        );
        Ok(())
    }

    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationTask>, StoreError> {
        let mut state = self.inner.lock().expect("task intake mutex poisoned");
        let mut due: Vec<(DateTime<Utc>, TaskId)> = state
            .entries
            .values()
            .filter(|entry| !entry.claimed && entry.visible_after <= now)
            .map(|entry| (entry.visible_after, entry.task.task_id.clone()))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, task_id) in due {
            if let Some(entry) = state.entries.get_mut(&task_id) {
                entry.claimed = true;
                claimed.push(entry.task.clone());
            }
        }
        Ok(claimed)
    }

    fn ack(&self, task_id: &TaskId) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("task intake mutex poisoned");
        if let Some(entry) = state.entries.remove(task_id) {
            let pair = (entry.task.user_id, entry.task.opportunity_id);
            state.by_pair.remove(&pair);
        }
        Ok(())
    }

    fn release_with_delay(
        &self,
        task: NotificationTask,
        visible_after: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("task intake mutex poisoned");
        let pair = (task.user_id.clone(), task.opportunity_id.clone());
        state.by_pair.insert(pair, task.task_id.clone());
        state.entries.insert(
            task.task_id.clone(),
            QueueEntry {
                task,
                visible_after,
                claimed: false,
            },
        );
        Ok(())
    }

    fn active_pair_exists(
        &self,
        user_id: &UserId,
        opportunity_id: &OpportunityId,
    ) -> Result<bool, StoreError> {
        let state = self.inner.lock().expect("task intake mutex poisoned");
        Ok(state
            .by_pair
            .contains_key(&(user_id.clone(), opportunity_id.clone())))
    }
}
