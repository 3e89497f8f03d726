//! The Process Supervisor: owns every child entrygate starts and drains them
//! on shutdown.
//!
//! Children are tracked in a pid-keyed registry behind a short-lived mutex.
//! Natural exits are reaped by [`Supervisor::reap`] (driven by the monitor
//! task or by [`Supervisor::wait_for_exit`]); a crash is logged and recorded
//! but never stops the other children.
//!
//! # Drain
//!
//! [`Supervisor::shutdown`] runs the drain cascade exactly once, however
//! many callers race on it:
//!
//! 1. Reap children that already exited; they count as natural exits. Then
//!    SIGTERM every child still running (its process group when it leads
//!    one), which moves to `Terminating`.
//! 2. Poll every `poll_interval` and reap what exited.
//! 3. At `grace_period`, SIGKILL whatever is left (`ForceKilled`).
//! 4. After a further `kill_timeout`, give up on stragglers and log them.

mod command;
mod handle;
mod registry;

pub use command::*;
pub use handle::*;

use crate::config::{deadline_after, Settings, DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL};
use crate::error::{validate_pid, Error, Result, EXIT_OK};
use crate::signals::ShutdownSignal;
use nix::errno::Errno;
use nix::sys::signal::{self, killpg, Signal};
use parking_lot::Mutex;
use registry::Registry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long to wait for SIGKILLed children to be reaped before giving up.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub grace_period: Duration,
    pub poll_interval: Duration,
    pub kill_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
        }
    }
}

impl SupervisorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            grace_period: settings.grace_period,
            poll_interval: settings.poll_interval,
            ..Self::default()
        }
    }
}

/// What the drain did with each child, by logical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub graceful: Vec<String>,
    pub force_killed: Vec<String>,
    pub abandoned: Vec<String>,
    pub elapsed: Duration,
}

impl DrainReport {
    /// True when no child had to be killed or abandoned.
    pub fn is_clean(&self) -> bool {
        self.force_killed.is_empty() && self.abandoned.is_empty()
    }

    fn record(&mut self, exit: ExitRecord) {
        match exit.observed_in {
            ProcessState::ForceKilled => {
                tracing::info!(
                    pid = exit.pid,
                    process = %exit.logical_name,
                    "Process {} killed",
                    exit.logical_name
                );
                self.force_killed.push(exit.logical_name);
            }
            _ => {
                tracing::info!(
                    pid = exit.pid,
                    process = %exit.logical_name,
                    code = exit.code,
                    "Process {} exited",
                    exit.logical_name
                );
                self.graceful.push(exit.logical_name);
            }
        }
    }
}

/// How a primary child run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child exited on its own.
    Exited(ExitRecord),
    /// Shutdown was requested while the child was running.
    Stopped(DrainReport),
}

impl RunOutcome {
    /// The child's own code, `0` for a clean drain, `1` when anything had to
    /// be killed or abandoned.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Exited(exit) => exit.code,
            RunOutcome::Stopped(report) if report.is_clean() => EXIT_OK,
            RunOutcome::Stopped(_) => 1,
        }
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    shutdown: ShutdownSignal,
    registry: Mutex<Registry>,
    exits: Mutex<Vec<ExitRecord>>,
    drain: OnceCell<DrainReport>,
    drain_cycles: AtomicUsize,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            shutdown,
            registry: Mutex::new(Registry::default()),
            exits: Mutex::new(Vec::new()),
            drain: OnceCell::new(),
            drain_cycles: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Start a child and track it under `name`. Returns its pid.
    pub fn spawn(&self, name: &str, spec: &CommandSpec) -> Result<u32> {
        if self.shutdown.is_triggered() {
            return Err(refused(name));
        }
        let child = spec.to_command().spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::Process(format!("command not found: '{}'", spec.program))
            }
            _ => Error::Process(format!("failed to start '{}': {}", spec, e)),
        })?;
        let pid = self.register(name, child, spec.own_process_group)?;
        tracing::info!(pid, process = name, "Started {}: {}", name, spec);
        Ok(pid)
    }

    /// Track a child started elsewhere. Once shutdown has been requested the
    /// child is killed instead of registered.
    pub fn register(&self, name: &str, mut child: Child, signal_group: bool) -> Result<u32> {
        let pid = child.id().ok_or_else(|| {
            Error::Process(format!("'{}' exited before it could be registered", name))
        })?;

        let mut registry = self.registry.lock();
        if self.shutdown.is_triggered() {
            drop(registry);
            let _ = child.start_kill();
            return Err(refused(name));
        }
        registry.insert(ProcessHandle::new(pid, name, signal_group), child);
        Ok(pid)
    }

    /// Children still in `Running`.
    pub fn running_count(&self) -> usize {
        self.registry.lock().count_in(ProcessState::Running)
    }

    /// Children not yet reaped, in any state.
    pub fn tracked_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn processes(&self) -> Vec<ProcessHandle> {
        self.registry.lock().snapshot()
    }

    /// Children that exited on their own, oldest first.
    pub fn exits(&self) -> Vec<ExitRecord> {
        self.exits.lock().clone()
    }

    pub fn exit_of(&self, pid: u32) -> Option<ExitRecord> {
        self.exits.lock().iter().find(|e| e.pid == pid).cloned()
    }

    /// Number of times the drain cascade has run. Never more than one.
    pub fn drain_cycles(&self) -> usize {
        self.drain_cycles.load(Ordering::SeqCst)
    }

    /// Collect children that exited on their own.
    ///
    /// Does nothing once shutdown is requested; the drain does its own
    /// reaping from then on.
    pub fn reap(&self) -> Vec<ExitRecord> {
        if self.shutdown.is_triggered() {
            return Vec::new();
        }
        let finished = self.registry.lock().reap();
        self.record_natural_exits(&finished);
        finished
    }

    fn record_natural_exits(&self, finished: &[ExitRecord]) {
        for exit in finished {
            if exit.code == 0 {
                tracing::info!(
                    pid = exit.pid,
                    process = %exit.logical_name,
                    "Process {} exited",
                    exit.logical_name
                );
            } else {
                tracing::warn!(
                    pid = exit.pid,
                    process = %exit.logical_name,
                    code = exit.code,
                    "Process {} exited unexpectedly with code {}",
                    exit.logical_name,
                    exit.code
                );
            }
        }
        if !finished.is_empty() {
            self.exits.lock().extend(finished.iter().cloned());
        }
    }

    /// Reap natural exits every `poll_interval` until shutdown is requested.
    pub fn spawn_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(supervisor.config.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = supervisor.shutdown.triggered() => break,
                    _ = tick.tick() => {
                        supervisor.reap();
                    }
                }
            }
        })
    }

    /// Wait for `pid` to exit on its own.
    ///
    /// Returns `None` if shutdown is requested first, or if `pid` is neither
    /// tracked nor known to have exited.
    pub async fn wait_for_exit(&self, pid: u32) -> Option<ExitRecord> {
        loop {
            self.reap();
            if let Some(exit) = self.exit_of(pid) {
                return Some(exit);
            }
            if self.shutdown.is_triggered() {
                return None;
            }
            let tracked = self.registry.lock().contains(pid);
            if !tracked {
                return None;
            }
            tokio::select! {
                _ = self.shutdown.triggered() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Run `spec` as the primary child until it exits or shutdown is
    /// requested, then drain whatever else is tracked.
    pub async fn run_primary(self: &Arc<Self>, name: &str, spec: &CommandSpec) -> Result<RunOutcome> {
        let pid = self.spawn(name, spec)?;
        let monitor = self.spawn_monitor();
        let exit = self.wait_for_exit(pid).await;
        let report = self.shutdown().await;
        monitor.abort();
        // The drain collects exits that beat the signal; those still count.
        let exit = exit.or_else(|| self.exit_of(pid));
        Ok(match exit {
            Some(exit) => RunOutcome::Exited(exit),
            None => RunOutcome::Stopped(report),
        })
    }

    /// Request shutdown and drain every child. Concurrent and repeated
    /// callers all get the report of the single drain.
    pub async fn shutdown(&self) -> DrainReport {
        self.shutdown.trigger("supervisor shutdown");
        self.drain.get_or_init(|| self.drain()).await.clone()
    }

    async fn drain(&self) -> DrainReport {
        self.drain_cycles.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let mut report = DrainReport::default();

        let (exited_first, signalled) = {
            let mut registry = self.registry.lock();
            let exited_first = registry.reap();
            let mut signalled = 0;
            for handle in registry
                .handles_mut()
                .filter(|h| h.state == ProcessState::Running)
            {
                send_signal(handle, Signal::SIGTERM);
                handle.transition(ProcessState::Terminating);
                signalled += 1;
            }
            (exited_first, signalled)
        };
        self.record_natural_exits(&exited_first);

        if signalled > 0 {
            tracing::info!(
                "Stopping {} process(es) (grace period {:?})",
                signalled,
                self.config.grace_period
            );
        }

        let grace_deadline = deadline_after(started, self.config.grace_period);
        let give_up_at = deadline_after(grace_deadline, self.config.kill_timeout);
        let mut escalated = false;

        loop {
            let finished = self.registry.lock().reap();
            for exit in finished {
                report.record(exit);
            }

            let remaining = self.registry.lock().len();
            if remaining == 0 {
                break;
            }

            let now = Instant::now();
            if !escalated && now >= grace_deadline {
                escalated = true;
                let mut registry = self.registry.lock();
                for handle in registry
                    .handles_mut()
                    .filter(|h| h.state == ProcessState::Terminating)
                {
                    let waited = handle
                        .terminating_since
                        .map(|since| since.elapsed())
                        .unwrap_or(self.config.grace_period);
                    tracing::warn!(
                        pid = handle.pid,
                        process = %handle.logical_name,
                        "Process {} did not exit {:?} after SIGTERM, sending SIGKILL",
                        handle.logical_name,
                        waited
                    );
                    send_signal(handle, Signal::SIGKILL);
                    handle.transition(ProcessState::ForceKilled);
                }
                continue;
            }

            if now >= give_up_at {
                let stragglers = self.registry.lock().abandon_all();
                for handle in stragglers {
                    tracing::error!(
                        pid = handle.pid,
                        process = %handle.logical_name,
                        "Process {} still running {:?} after SIGKILL, abandoning it",
                        handle.logical_name,
                        self.config.kill_timeout
                    );
                    report.abandoned.push(handle.logical_name);
                }
                break;
            }

            let next_deadline = if escalated { give_up_at } else { grace_deadline };
            let wake = deadline_after(now, self.config.poll_interval).min(next_deadline);
            tokio::time::sleep_until(wake).await;
        }

        report.elapsed = started.elapsed();
        if signalled > 0 {
            tracing::info!(
                graceful = report.graceful.len(),
                force_killed = report.force_killed.len(),
                abandoned = report.abandoned.len(),
                "Shutdown complete in {:?}",
                report.elapsed
            );
        }
        report
    }
}

fn refused(name: &str) -> Error {
    Error::Process(format!(
        "refusing to start '{}': shutdown already in progress",
        name
    ))
}

/// Signal a child, or its whole group when it leads one. A child that is
/// already gone is not an error.
fn send_signal(handle: &ProcessHandle, sig: Signal) {
    let pid = match validate_pid(handle.pid, &handle.logical_name) {
        Ok(pid) => pid,
        Err(e) => {
            tracing::warn!("Not signalling {}: {}", handle.logical_name, e);
            return;
        }
    };

    let result = if handle.signal_group {
        killpg(pid, sig).or_else(|_| signal::kill(pid, sig))
    } else {
        signal::kill(pid, sig)
    };

    match result {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(
            pid = handle.pid,
            process = %handle.logical_name,
            "Failed to send {} to {}: {}",
            sig,
            handle.logical_name,
            e
        ),
    }
}
