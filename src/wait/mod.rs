//! The Wait Coordinator: drives a [`Prober`] across targets until they are
//! reachable, the policy's deadline passes, or retries run out.
//!
//! # Strategies
//!
//! - **Sequential**: targets are probed in list order. The first target that
//!   fails ends the wait; later targets are never probed.
//! - **Parallel**: one probing loop per target runs concurrently, each with
//!   its own attempt counter and clock. Outcomes come back in input order.
//!
//! # Timing
//!
//! With [`DeadlineScope::PerTarget`] the clock starts at a target's first
//! attempt, so a sequential wait over N targets may take up to N timeouts.
//! [`DeadlineScope::Global`] uses one deadline for the whole call.
//! Attempt K+1 starts no earlier than `interval` after attempt K began, and
//! an attempt is never started when it would begin at or past the deadline.
//!
//! # Cancellation
//!
//! Every loop watches the [`ShutdownSignal`]. Once it fires, in-flight
//! attempts are abandoned and unfinished targets report
//! [`FailureKind::Cancelled`].

mod outcome;

pub use outcome::*;

use crate::config::{deadline_after, DeadlineScope, ServiceTarget, WaitPolicy};
use crate::error::Result;
use crate::probe::{prober_for, ProbeFailure, Prober};
use crate::signals::ShutdownSignal;
use std::sync::Arc;
use tokio::time::Instant;

pub struct WaitCoordinator {
    prober: Arc<dyn Prober>,
    shutdown: ShutdownSignal,
}

impl WaitCoordinator {
    pub fn new(prober: Arc<dyn Prober>, shutdown: ShutdownSignal) -> Self {
        Self { prober, shutdown }
    }

    /// Coordinator using the prober the policy calls for.
    pub fn for_policy(policy: &WaitPolicy, shutdown: ShutdownSignal) -> Self {
        Self::new(prober_for(policy), shutdown)
    }

    /// Block until every target is reachable or the policy gives up.
    ///
    /// Only an invalid policy is returned as `Err`; unreachable targets are
    /// reported through [`WaitReport`].
    #[tracing::instrument(skip_all, fields(targets = targets.len(), parallel = policy.parallel))]
    pub async fn wait(&self, targets: &[ServiceTarget], policy: &WaitPolicy) -> Result<WaitReport> {
        policy.validate()?;

        let started = Instant::now();
        let global_deadline = match policy.deadline_scope {
            DeadlineScope::Global => Some(deadline_after(started, policy.timeout)),
            DeadlineScope::PerTarget => None,
        };

        let outcomes = if policy.parallel {
            let loops = targets
                .iter()
                .map(|target| self.probe_until_ready(target, policy, global_deadline));
            futures::future::join_all(loops).await
        } else {
            let mut outcomes = Vec::with_capacity(targets.len());
            for target in targets {
                let outcome = self.probe_until_ready(target, policy, global_deadline).await;
                let succeeded = outcome.succeeded;
                outcomes.push(outcome);
                if !succeeded {
                    break;
                }
            }
            outcomes
        };

        Ok(WaitReport::new(outcomes, started.elapsed()))
    }

    /// One target's loop: probe, then sleep until the next interval boundary.
    async fn probe_until_ready(
        &self,
        target: &ServiceTarget,
        policy: &WaitPolicy,
        global_deadline: Option<Instant>,
    ) -> ProbeOutcome {
        let started = Instant::now();
        let deadline =
            global_deadline.unwrap_or_else(|| deadline_after(started, policy.timeout));
        let mut attempts: u32 = 0;
        let mut last_error: Option<String> = None;

        tracing::info!(endpoint = %target, "Waiting for {} (timeout {:?})", target, policy.timeout);

        let give_up = |kind: FailureKind, attempts: u32, last_error: Option<String>| {
            let outcome =
                ProbeOutcome::failed(target, kind, attempts, started.elapsed(), last_error);
            tracing::warn!(
                endpoint = %target,
                attempts,
                reason = outcome.last_error.as_deref().unwrap_or("none"),
                "Giving up on {}: {:?}",
                target,
                kind
            );
            outcome
        };

        loop {
            if self.shutdown.is_triggered() {
                return give_up(FailureKind::Cancelled, attempts, last_error);
            }
            let attempt_started = Instant::now();
            if attempt_started >= deadline {
                return give_up(FailureKind::Timeout, attempts, last_error);
            }

            attempts += 1;
            let budget = policy.attempt_timeout.min(deadline - attempt_started);
            let result = tokio::select! {
                result = self.prober.probe(target, budget) => result,
                _ = self.shutdown.triggered() => Err(ProbeFailure::Cancelled),
            };

            match result {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    tracing::info!(
                        endpoint = %target,
                        attempts,
                        "{} is available after {:?}",
                        target,
                        elapsed
                    );
                    return ProbeOutcome::success(target, attempts, elapsed);
                }
                Err(ProbeFailure::Cancelled) => {
                    return give_up(FailureKind::Cancelled, attempts, last_error);
                }
                Err(failure) => {
                    tracing::debug!(endpoint = %target, attempt = attempts, "Probe failed: {}", failure);
                    last_error = Some(failure.to_string());
                }
            }

            if policy.retries_exhausted(attempts) {
                return give_up(FailureKind::RetriesExhausted, attempts, last_error);
            }

            let next_attempt = deadline_after(attempt_started, policy.interval);
            if next_attempt >= deadline {
                return give_up(FailureKind::Timeout, attempts, last_error);
            }

            tokio::select! {
                _ = tokio::time::sleep_until(next_attempt) => {}
                _ = self.shutdown.triggered() => {
                    return give_up(FailureKind::Cancelled, attempts, last_error);
                }
            }
        }
    }
}
