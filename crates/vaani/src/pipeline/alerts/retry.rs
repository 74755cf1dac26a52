use std::thread;
use std::time::Duration;

use tracing::warn;

use super::repository::StoreError;

/// Bounded local retry policy for transient store failures.
///
/// Distinct from the delivery scheduler's backoff: this covers individual
/// store calls inside a single invocation, not cross-invocation task retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Policy with no sleep between attempts, for tests.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retrying after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2_u32.saturating_pow(attempt)
    }

    pub fn should_retry(&self, attempt: u32, error: &StoreError) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }
}

/// Runs `op` under the policy, retrying transient store failures with
/// exponential delay. Every recovered failure is logged before the retry.
pub fn with_retries<T, F>(policy: BackoffPolicy, label: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(error) if policy.should_retry(attempt, &error) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient store failure, retrying"
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(error) => {
                warn!(operation = label, attempt, error = %error, "store call failed");
                return Err(error);
            }
        }
    }
}
