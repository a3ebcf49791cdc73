//! Retry decision: redeliver vs terminal.
//!
//! The policy is a pure function of the failure, the event time and "now".
//! Executing the decision (re-throwing to the platform or persisting the
//! failure) is the runtime's job.

use super::errors::EventError;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default redelivery window (12 hours).
pub const DEFAULT_MAX_EVENT_AGE: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// The failure was not a retry signal.
    NotRequested,
    WithinWindow { age_ms: i64 },
    TooOld { age_ms: i64, max_age_ms: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub reason: RetryReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_age: Duration,
}

impl RetryPolicy {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn max_age_ms(&self) -> i64 {
        i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX)
    }

    /// Retry only when the failure is a retry signal and the event is at most
    /// `max_age` old (`now - event_time <= max_age`).
    pub fn decide(
        &self,
        error: &EventError,
        event_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        if !error.is_retry_signal() {
            return RetryDecision {
                should_retry: false,
                reason: RetryReason::NotRequested,
            };
        }
        let age_ms = (now - event_time).num_milliseconds();
        let max_age_ms = self.max_age_ms();
        if age_ms <= max_age_ms {
            RetryDecision {
                should_retry: true,
                reason: RetryReason::WithinWindow { age_ms },
            }
        } else {
            RetryDecision {
                should_retry: false,
                reason: RetryReason::TooOld { age_ms, max_age_ms },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENT_AGE)
    }
}
