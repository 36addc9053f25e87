use std::fmt;
use std::time::Duration;
use thiserror::Error;

use rivulet_core::error::LogError;

/// Classification of a computation failure, the retry policy matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Backend or network failure, usually worth retrying.
    Io,
    /// Encoding or decoding failure.
    Codec,
    /// The computation found its own state inconsistent.
    State,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Io => write!(f, "io"),
            ErrorKind::Codec => write!(f, "codec"),
            ErrorKind::State => write!(f, "state"),
            ErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Failure reported by a computation callback.
#[derive(Debug, Clone, Error)]
#[error("computation failure ({kind}): {message}")]
pub struct ComputationError {
    kind: ErrorKind,
    message: String,
}

impl ComputationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Codec, message)
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<LogError> for ComputationError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::Codec(e) => Self::codec(e.to_string()),
            other => Self::io(other.to_string()),
        }
    }
}

/// Retry schedule: a predicate over error kinds plus an exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    // None retries every kind
    retry_on: Option<Vec<ErrorKind>>,
    delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_on: None,
            delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }

    /// Restrict retries to a kind, can be called several times.
    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        self.retry_on.get_or_insert_with(Vec::new).push(kind);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn accepts(&self, kind: ErrorKind) -> bool {
        match &self.retry_on {
            None => true,
            Some(kinds) => kinds.contains(&kind),
        }
    }

    /// Backoff before the given attempt (1-based), doubling up to the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

/// Failure and batching behavior of one computation.
#[derive(Debug, Clone)]
pub struct ComputationPolicy {
    retry: RetryPolicy,
    continue_on_failure: bool,
    skip_first_failures: u32,
    batch_capacity: usize,
    batch_threshold: Duration,
}

impl ComputationPolicy {
    pub fn builder() -> ComputationPolicyBuilder {
        ComputationPolicyBuilder::default()
    }

    /// No retry, no skip, abort on failure.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn continue_on_failure(&self) -> bool {
        self.continue_on_failure
    }

    pub fn skip_first_failures(&self) -> u32 {
        self.skip_first_failures
    }

    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }

    pub fn batch_threshold(&self) -> Duration {
        self.batch_threshold
    }
}

impl Default for ComputationPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::no_retry(),
            continue_on_failure: false,
            skip_first_failures: 0,
            batch_capacity: 1,
            batch_threshold: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default)]
pub struct ComputationPolicyBuilder {
    policy: ComputationPolicy,
}

impl ComputationPolicyBuilder {
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.policy.retry = retry;
        self
    }

    pub fn continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.policy.continue_on_failure = continue_on_failure;
        self
    }

    /// Treat the first N failures as transient bootstrap noise: skip them
    /// without aborting even when continue-on-failure is off.
    pub fn skip_first_failures(mut self, skip: u32) -> Self {
        self.policy.skip_first_failures = skip;
        self
    }

    pub fn batch_policy(mut self, capacity: usize, threshold: Duration) -> Self {
        self.policy.batch_capacity = capacity.max(1);
        self.policy.batch_threshold = threshold;
        self
    }

    pub fn build(self) -> ComputationPolicy {
        self.policy
    }
}
