//! Exponential backoff for transient store failures.
//!
//! Neo4j signals retryable failures through its `TransientError` status
//! classes and through dropped connections; constraint violations come back
//! as `ConstraintValidationFailed`. Classification works on the rendered
//! error message because the driver does not expose the status class as a
//! stable type.

use std::future::Future;
use std::time::Duration;

use strata_core::config::RetrySettings;

use crate::client::GraphError;

/// How a store failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Safe to repeat the whole transaction.
    Transient,
    /// A uniqueness or node-key constraint rejected the write.
    Constraint,
    /// Anything else; surfaces to the caller unchanged.
    Permanent,
}

const TRANSIENT_MARKERS: [&str; 10] = [
    "transienterror",
    "deadlockdetected",
    "leaderswitch",
    "notaleader",
    "serviceunavailable",
    "sessionexpired",
    "connection reset",
    "connection refused",
    "broken pipe",
    "io error",
];

const CONSTRAINT_MARKERS: [&str; 3] = [
    "constraintvalidationfailed",
    "already exists with label",
    "constraintviolation",
];

/// Classify a store error message.
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if CONSTRAINT_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorClass::Constraint
    } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            base_delay: Duration::from_millis(s.base_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, for `attempt >= 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    /// Run `work` until it succeeds, fails permanently, or the attempt budget
    /// is spent. Each call to `work` must start a fresh transaction.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut work: F) -> Result<T, GraphError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match work().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(op, attempt, "Store call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.class() == ErrorClass::Transient => {
                    if attempt >= self.max_attempts {
                        tracing::error!(op, attempt, error = %err, "Store retries exhausted");
                        return Err(GraphError::Unavailable {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
