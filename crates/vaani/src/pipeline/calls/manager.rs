use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::pipeline::alerts::repository::StoreError;
use crate::pipeline::alerts::retry::{with_retries, BackoffPolicy};

use super::domain::{CallRecord, CallSession, ConversationStep, SessionDelta, SessionId, SessionOutcome};
use super::repository::CallLogStore;

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("call-{id:06}"))
}

/// Session lifecycle tunables; defaults carry the documented windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub resume_window: Duration,
    pub long_call_threshold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_window: Duration::minutes(30),
            long_call_threshold: Duration::minutes(10),
        }
    }
}

/// Session state as reported to callers, with the derived long-call signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: CallSession,
    pub long_call: bool,
}

/// Error raised by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found or expired")]
    NotFound,
    #[error("session revision conflict, current revision is {current}")]
    RevisionConflict { current: u64 },
    #[error(transparent)]
    Log(#[from] StoreError),
}

/// Tracks per-call conversational state so interrupted calls can resume.
///
/// All mutation happens under one lock, which serializes access per session;
/// callers additionally pass the revision they read so a stale writer fails
/// with a conflict instead of clobbering progress.
pub struct SessionManager<L> {
    sessions: Mutex<HashMap<SessionId, CallSession>>,
    log: Arc<L>,
    config: SessionConfig,
    retry: BackoffPolicy,
}

impl<L> SessionManager<L>
where
    L: CallLogStore + 'static,
{
    pub fn new(log: Arc<L>) -> Self {
        Self::with_config(log, SessionConfig::default(), BackoffPolicy::default())
    }

    pub fn with_config(log: Arc<L>, config: SessionConfig, retry: BackoffPolicy) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            log,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn create_session(&self, phone: &str, now: DateTime<Utc>) -> SessionView {
        let session = CallSession {
            session_id: next_session_id(),
            phone: phone.to_string(),
            step: ConversationStep::Greeting,
            partial: Default::default(),
            language: None,
            created_at: now,
            last_active_at: now,
            revision: 1,
        };
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        sessions.insert(session.session_id.clone(), session.clone());
        info!(session_id = %session.session_id.0, "call session created");
        self.view(session, now)
    }

    /// Fetches a session; one past its resume window reports absent.
    pub fn get(&self, session_id: &SessionId, now: DateTime<Utc>) -> Option<SessionView> {
        let sessions = self.sessions.lock().expect("session mutex poisoned");
        let session = sessions.get(session_id)?;
        if self.expired(session, now) {
            return None;
        }
        Some(self.view(session.clone(), now))
    }

    /// Applies a delta if the caller's revision is current, bumping the
    /// revision and touching the activity timestamp.
    pub fn update(
        &self,
        session_id: &SessionId,
        expected_revision: u64,
        delta: SessionDelta,
        now: DateTime<Utc>,
    ) -> Result<SessionView, SessionError> {
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        let session = sessions.get_mut(session_id).ok_or(SessionError::NotFound)?;
        if now - session.last_active_at >= self.config.resume_window {
            return Err(SessionError::NotFound);
        }
        if session.revision != expected_revision {
            return Err(SessionError::RevisionConflict {
                current: session.revision,
            });
        }
        delta.apply(session);
        session.last_active_at = now;
        session.revision += 1;
        Ok(self.view(session.clone(), now))
    }

    /// Most recently active resumable session for the number, if any. Every
    /// other session for the same number is superseded and dropped.
    pub fn find_resumable(&self, phone: &str, now: DateTime<Utc>) -> Option<SessionView> {
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        let mut candidates: Vec<(DateTime<Utc>, SessionId)> = sessions
            .values()
            .filter(|session| session.phone == phone)
            .map(|session| (session.last_active_at, session.session_id.clone()))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort();
        let (_, newest) = candidates.pop()?;
        for (_, superseded) in candidates {
            sessions.remove(&superseded);
            info!(session_id = %superseded.0, "superseded call session expired");
        }

        let expired = sessions
            .get(&newest)
            .map(|session| self.expired(session, now))?;
        if expired {
            sessions.remove(&newest);
            return None;
        }
        let session = sessions.get(&newest)?.clone();
        Some(self.view(session, now))
    }

    /// Removes the session and appends exactly one completion record. If the
    /// log append fails the session is restored, so completion is all or
    /// nothing from the caller's view.
    pub fn complete(
        &self,
        session_id: &SessionId,
        outcome: SessionOutcome,
        now: DateTime<Utc>,
    ) -> Result<CallRecord, SessionError> {
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        let session = sessions.remove(session_id).ok_or(SessionError::NotFound)?;
        if self.expired(&session, now) {
            return Err(SessionError::NotFound);
        }

        let record = CallRecord {
            session_id: session.session_id.clone(),
            phone: session.phone.clone(),
            outcome,
            duration_secs: (now - session.created_at).num_seconds(),
            final_step: session.step,
            completed_at: now,
        };

        if let Err(error) = with_retries(self.retry, "call_log_append", || {
            self.log.append(record.clone())
        }) {
            sessions.insert(session.session_id.clone(), session);
            return Err(SessionError::Log(error));
        }

        info!(
            session_id = %record.session_id.0,
            outcome = record.outcome.label(),
            duration_secs = record.duration_secs,
            "call session completed"
        );
        Ok(record)
    }

    /// Explicitly drops a session. Returns whether one was present.
    pub fn expire(&self, session_id: &SessionId) -> bool {
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        sessions.remove(session_id).is_some()
    }

    /// Sweeps sessions beyond the resume window, returning how many dropped.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        let before = sessions.len();
        sessions.retain(|_, session| now - session.last_active_at < self.config.resume_window);
        before - sessions.len()
    }

    pub fn active_count(&self, now: DateTime<Utc>) -> usize {
        let sessions = self.sessions.lock().expect("session mutex poisoned");
        sessions
            .values()
            .filter(|session| !self.expired(session, now))
            .count()
    }

    fn expired(&self, session: &CallSession, now: DateTime<Utc>) -> bool {
        now - session.last_active_at >= self.config.resume_window
    }

    fn view(&self, session: CallSession, now: DateTime<Utc>) -> SessionView {
        let long_call = now - session.created_at > self.config.long_call_threshold;
        SessionView { session, long_call }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::pipeline::calls::repository::{CallLogStore, InMemoryCallLog};

    fn manager() -> SessionManager<InMemoryCallLog> {
        SessionManager::with_config(
            Arc::new(InMemoryCallLog::default()),
            SessionConfig::default(),
            BackoffPolicy::immediate(),
        )
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 14, 0, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn created_session_is_fetchable() {
        let manager = manager();
        let now = base_time();
        let created = manager.create_session("+911234567890", now);

        let fetched = manager
            .get(&created.session.session_id, now)
            .expect("session present");
        assert_eq!(fetched.session.phone, "+911234567890");
        assert_eq!(fetched.session.step, ConversationStep::Greeting);
        assert_eq!(fetched.session.revision, 1);
        assert!(!fetched.long_call);
    }

    #[test]
    fn resumable_at_twenty_nine_minutes_not_thirty_one() {
        let manager = manager();
        let now = base_time();
        let created = manager.create_session("+911234567890", now);

        let resumable = manager.find_resumable("+911234567890", now + Duration::minutes(29));
        assert_eq!(
            resumable.map(|view| view.session.session_id),
            Some(created.session.session_id.clone())
        );

        let gone = manager.find_resumable("+911234567890", now + Duration::minutes(31));
        assert!(gone.is_none());
        assert!(manager
            .get(&created.session.session_id, now + Duration::minutes(31))
            .is_none());
    }

    #[test]
    fn find_resumable_supersedes_older_sessions() {
        let manager = manager();
        let now = base_time();
        let older = manager.create_session("+911234567890", now);
        let newer = manager.create_session("+911234567890", now + Duration::minutes(5));

        let resumed = manager
            .find_resumable("+911234567890", now + Duration::minutes(10))
            .expect("newest session resumable");
        assert_eq!(resumed.session.session_id, newer.session.session_id);
        assert!(manager
            .get(&older.session.session_id, now + Duration::minutes(10))
            .is_none());
    }

    #[test]
    fn stale_revision_update_conflicts() {
        let manager = manager();
        let now = base_time();
        let created = manager.create_session("+911234567890", now);

        let delta = SessionDelta {
            step: Some(ConversationStep::CollectName),
            ..SessionDelta::default()
        };
        let updated = manager
            .update(&created.session.session_id, 1, delta, now + Duration::seconds(10))
            .expect("current revision accepted");
        assert_eq!(updated.session.revision, 2);

        let stale = SessionDelta {
            step: Some(ConversationStep::CollectAge),
            ..SessionDelta::default()
        };
        match manager.update(
            &created.session.session_id,
            1,
            stale,
            now + Duration::seconds(20),
        ) {
            Err(SessionError::RevisionConflict { current: 2 }) => {}
            other => panic!("expected revision conflict, got {other:?}"),
        }
    }

    #[test]
    fn delta_accumulates_partial_profile() {
        let manager = manager();
        let now = base_time();
        let created = manager.create_session("+911234567890", now);
        let id = created.session.session_id;

        manager
            .update(
                &id,
                1,
                SessionDelta {
                    step: Some(ConversationStep::CollectAge),
                    language: Some("hi".to_string()),
                    name: Some("Asha".to_string()),
                    ..SessionDelta::default()
                },
                now + Duration::minutes(1),
            )
            .expect("first update");
        let view = manager
            .update(
                &id,
                2,
                SessionDelta {
                    age: Some(22),
                    ..SessionDelta::default()
                },
                now + Duration::minutes(2),
            )
            .expect("second update");

        assert_eq!(view.session.partial.name.as_deref(), Some("Asha"));
        assert_eq!(view.session.partial.age, Some(22));
        assert_eq!(view.session.language.as_deref(), Some("hi"));
        assert_eq!(view.session.step, ConversationStep::CollectAge);
    }

    #[test]
    fn complete_removes_session_and_logs_once() {
        let log = Arc::new(InMemoryCallLog::default());
        let manager = SessionManager::with_config(
            log.clone(),
            SessionConfig::default(),
            BackoffPolicy::immediate(),
        );
        let now = base_time();
        let created = manager.create_session("+911234567890", now);
        let id = created.session.session_id;

        let record = manager
            .complete(&id, SessionOutcome::ProfileRegistered, now + Duration::minutes(4))
            .expect("completion succeeds");
        assert_eq!(record.duration_secs, 240);
        assert_eq!(record.final_step, ConversationStep::Greeting);

        assert!(manager.get(&id, now + Duration::minutes(4)).is_none());
        let records = log.query_by_phone("+911234567890").expect("query log");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, SessionOutcome::ProfileRegistered);
    }

    #[test]
    fn failed_completion_log_restores_session() {
        struct RefusingLog;
        impl CallLogStore for RefusingLog {
            fn append(&self, _record: CallRecord) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("log offline".to_string()))
            }
            fn query_by_phone(&self, _phone: &str) -> Result<Vec<CallRecord>, StoreError> {
                Ok(Vec::new())
            }
        }

        let manager = SessionManager::with_config(
            Arc::new(RefusingLog),
            SessionConfig::default(),
            BackoffPolicy::immediate(),
        );
        let now = base_time();
        let created = manager.create_session("+911234567890", now);
        let id = created.session.session_id;

        match manager.complete(&id, SessionOutcome::Abandoned, now + Duration::minutes(1)) {
            Err(SessionError::Log(StoreError::Unavailable(_))) => {}
            other => panic!("expected log failure, got {other:?}"),
        }
        assert!(
            manager.get(&id, now + Duration::minutes(1)).is_some(),
            "session restored after failed completion"
        );
    }

    #[test]
    fn long_call_flag_tracks_created_at() {
        let manager = manager();
        let now = base_time();
        let created = manager.create_session("+911234567890", now);
        let id = created.session.session_id;

        let touched = manager
            .update(
                &id,
                1,
                SessionDelta::default(),
                now + Duration::minutes(11),
            )
            .expect("still within resume window");
        assert!(touched.long_call);
    }

    #[test]
    fn purge_drops_only_expired_sessions() {
        let manager = manager();
        let now = base_time();
        manager.create_session("+911111111111", now);
        manager.create_session("+922222222222", now + Duration::minutes(20));

        let purged = manager.purge_expired(now + Duration::minutes(35));
        assert_eq!(purged, 1);
        assert_eq!(manager.active_count(now + Duration::minutes(35)), 1);
    }
}
