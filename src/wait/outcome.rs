use crate::config::ServiceTarget;
use crate::error::{Error, EXIT_CANCELLED, EXIT_CONNECTION_FAILED, EXIT_OK, EXIT_TIMEOUT};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Why a target's probing loop gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The deadline passed before any attempt succeeded.
    Timeout,
    /// `max_retries` attempts were made before the deadline.
    RetriesExhausted,
    /// A shutdown request interrupted the loop.
    Cancelled,
}

impl FailureKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            FailureKind::Timeout => EXIT_TIMEOUT,
            FailureKind::RetriesExhausted => EXIT_CONNECTION_FAILED,
            FailureKind::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Higher ranks dominate when several targets fail differently.
    fn rank(&self) -> u8 {
        match self {
            FailureKind::RetriesExhausted => 1,
            FailureKind::Timeout => 2,
            FailureKind::Cancelled => 3,
        }
    }
}

/// Result of one target's probing loop. Never mutated once produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub target: ServiceTarget,
    pub succeeded: bool,
    pub attempts: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub last_error: Option<String>,
    pub failure: Option<FailureKind>,
}

impl ProbeOutcome {
    pub(crate) fn success(target: &ServiceTarget, attempts: u32, elapsed: Duration) -> Self {
        Self {
            target: target.clone(),
            succeeded: true,
            attempts,
            elapsed,
            last_error: None,
            failure: None,
        }
    }

    pub(crate) fn failed(
        target: &ServiceTarget,
        kind: FailureKind,
        attempts: u32,
        elapsed: Duration,
        last_error: Option<String>,
    ) -> Self {
        let last_error = match kind {
            FailureKind::Cancelled => Some("cancelled".to_string()),
            _ => last_error,
        };
        Self {
            target: target.clone(),
            succeeded: false,
            attempts,
            elapsed,
            last_error,
            failure: Some(kind),
        }
    }

    /// The error this outcome stands for, if it failed.
    pub fn to_error(&self) -> Option<Error> {
        let target = self.target.to_string();
        match self.failure? {
            FailureKind::Timeout => Some(Error::ConnectionTimeout {
                target,
                elapsed: self.elapsed,
            }),
            FailureKind::RetriesExhausted => Some(Error::ConnectionFailed {
                target,
                attempts: self.attempts,
                reason: self
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
            FailureKind::Cancelled => Some(Error::Cancelled(target)),
        }
    }
}

/// Verdict of a whole wait plus the per-target diagnostics, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct WaitReport {
    pub all_succeeded: bool,
    pub outcomes: Vec<ProbeOutcome>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl WaitReport {
    pub(crate) fn new(outcomes: Vec<ProbeOutcome>, elapsed: Duration) -> Self {
        Self {
            all_succeeded: outcomes.iter().all(|o| o.succeeded),
            outcomes,
            elapsed,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    /// The most significant failure: cancelled, then timeout, then retries
    /// exhausted. Ties go to the earliest target.
    pub fn dominant_failure(&self) -> Option<&ProbeOutcome> {
        self.failures().fold(None, |best: Option<&ProbeOutcome>, o| match (best, o.failure) {
            (Some(b), Some(kind)) if b.failure.map_or(0, |k| k.rank()) >= kind.rank() => Some(b),
            _ => Some(o),
        })
    }

    /// `0` on success, otherwise the code of the dominant failure.
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded {
            return EXIT_OK;
        }
        self.dominant_failure()
            .and_then(|o| o.failure)
            .map(|k| k.exit_code())
            .unwrap_or(EXIT_TIMEOUT)
    }

    /// Convert into a `Result`, surfacing the dominant failure as an error.
    pub fn into_result(self) -> crate::Result<WaitReport> {
        let error = self.dominant_failure().and_then(ProbeOutcome::to_error);
        match error {
            Some(err) if !self.all_succeeded => Err(err),
            _ => Ok(self),
        }
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
