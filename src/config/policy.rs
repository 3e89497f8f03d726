//! Wait policy: how long, how often and how many times to probe.

use crate::error::{Error, Result};
use crate::probe::CommandTemplate;
use std::time::Duration;

/// Default overall timeout per target (15 seconds).
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default spacing between probe attempts (1 second).
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// Default upper bound for a single probe attempt (5 seconds).
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the timeout clock starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeadlineScope {
    /// Each target gets its own clock, started at its first attempt.
    /// In sequential mode the total wall time can exceed `timeout`.
    #[default]
    PerTarget,
    /// One deadline shared by every target, started when the wait begins.
    Global,
}

/// Timeout, retry and strategy settings for one wait.
///
/// `max_retries == 0` means unlimited attempts; otherwise it is the maximum
/// number of probe attempts per target. An `interval` larger than `timeout`
/// is legal and yields a single attempt.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
    pub max_retries: u32,
    pub parallel: bool,
    pub strict: bool,
    pub custom_check: Option<CommandTemplate>,
    pub attempt_timeout: Duration,
    pub deadline_scope: DeadlineScope,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            interval: DEFAULT_WAIT_INTERVAL,
            max_retries: 0,
            parallel: false,
            strict: false,
            custom_check: None,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            deadline_scope: DeadlineScope::PerTarget,
        }
    }
}

impl WaitPolicy {
    /// Check the invariants `timeout > 0`, `interval > 0` and
    /// `attempt_timeout > 0`.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(Error::InvalidArgument(
                "interval must be greater than zero".to_string(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "attempt timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_custom_check(mut self, template: Option<CommandTemplate>) -> Self {
        self.custom_check = template;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn with_deadline_scope(mut self, scope: DeadlineScope) -> Self {
        self.deadline_scope = scope;
        self
    }

    /// Whether the attempt counter has reached the retry cap.
    pub fn retries_exhausted(&self, attempts: u32) -> bool {
        self.max_retries != 0 && attempts >= self.max_retries
    }
}
