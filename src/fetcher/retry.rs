//! Request retry state machine
//!
//! Every logical request walks through explicit states:
//!
//! ```text
//! Fetching{n} --2xx--> Done
//! Fetching{n} --429--> RateLimited{n} --sleep--> Fetching{n}
//! Fetching{n} --err, n < max--> Retrying{n} --sleep--> Fetching{n+1}
//! Fetching{n} --err, n = max--> Exhausted{n}
//! ```
//!
//! Rate limiting never consumes the attempt budget, so a throttled request is retried
//! until the server lets it through.

use std::time::Duration;

/// Classified result of one HTTP attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx response received
    Success,
    /// 429 response received
    RateLimited,
    /// Any other status, or no response at all
    Failed,
}

impl AttemptOutcome {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => AttemptOutcome::Success,
            429 => AttemptOutcome::RateLimited,
            _ => AttemptOutcome::Failed,
        }
    }
}

/// State of a single logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// About to issue attempt `attempt` (1-based)
    Fetching {
        /// Attempt number
        attempt: u32,
    },
    /// Throttled; wait and re-issue the same attempt
    RateLimited {
        /// Attempt number, unchanged by the wait
        attempt: u32,
    },
    /// Failed attempt with budget remaining; wait and issue the next attempt
    Retrying {
        /// Attempt that just failed
        attempt: u32,
    },
    /// Budget spent; the request failed
    Exhausted {
        /// Attempts made
        attempts: u32,
    },
    /// Response received
    Done,
}

impl RequestState {
    /// Whether no further transitions follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Exhausted { .. } | RequestState::Done)
    }
}

/// Retry budget and wait interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_interval: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_retries` is the total attempt count per URL (at least 1)
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            retry_interval,
        }
    }

    /// Total attempts allowed for non rate-limit failures
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait applied before re-issuing a request
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Starting state of every request
    pub fn initial(&self) -> RequestState {
        RequestState::Fetching { attempt: 1 }
    }

    /// Transition taken after attempt `attempt` produced `outcome`
    pub fn on_outcome(&self, attempt: u32, outcome: AttemptOutcome) -> RequestState {
        match outcome {
            AttemptOutcome::Success => RequestState::Done,
            AttemptOutcome::RateLimited => RequestState::RateLimited { attempt },
            AttemptOutcome::Failed if attempt < self.max_retries => {
                RequestState::Retrying { attempt }
            }
            AttemptOutcome::Failed => RequestState::Exhausted { attempts: attempt },
        }
    }

    /// Sleep required before leaving `state`, if any
    pub fn delay_for(&self, state: RequestState) -> Option<Duration> {
        match state {
            RequestState::RateLimited { .. } | RequestState::Retrying { .. } => {
                Some(self.retry_interval)
            }
            _ => None,
        }
    }

    /// State entered once the wait for `state` has elapsed
    pub fn after_wait(&self, state: RequestState) -> RequestState {
        match state {
            RequestState::RateLimited { attempt } => RequestState::Fetching { attempt },
            RequestState::Retrying { attempt } => RequestState::Fetching {
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}
