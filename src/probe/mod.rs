//! Single-attempt reachability probes.
//!
//! A [`Prober`] makes exactly one attempt against one target and reports why
//! it failed. Retrying, spacing and deadlines belong to
//! [`crate::wait::WaitCoordinator`].

mod command;
mod network;

pub use command::*;
pub use network::*;

use crate::config::{ServiceTarget, WaitPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a single probe attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("refused")]
    Refused,

    #[error("timeout")]
    Timeout,

    #[error("unresolved-host: {0}")]
    UnresolvedHost(String),

    #[error("tool-unavailable: {0}")]
    ToolUnavailable(String),

    #[error("check-failed: {}", .0.map(|c| format!("exit code {}", c)).unwrap_or_else(|| "terminated by signal".to_string()))]
    CheckFailed(Option<i32>),

    #[error("cancelled")]
    Cancelled,

    #[error("io: {0}")]
    Io(String),
}

pub type ProbeResult = std::result::Result<(), ProbeFailure>;

/// One reachability attempt against a target.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Attempt to reach `target`, giving up after `attempt_timeout`.
    async fn probe(&self, target: &ServiceTarget, attempt_timeout: Duration) -> ProbeResult;
}

/// Choose the prober a policy calls for: the custom check when one is
/// configured, otherwise a plain network probe.
pub fn prober_for(policy: &WaitPolicy) -> Arc<dyn Prober> {
    match &policy.custom_check {
        Some(template) => Arc::new(CommandProber::new(template.clone())),
        None => Arc::new(NetworkProber),
    }
}
