#![allow(unused_assignments)]

//! # entrygate
//!
//! Container entrypoint plumbing: wait for the services a process depends on,
//! start it, and stop it cleanly when the container is told to stop.
//!
//! ## Features
//!
//! - **Readiness probing**: TCP connect, UDP send, or a custom check command
//!   rendered from a `{host}`/`{port}` template and run without a shell
//! - **Wait strategies**: sequential (short-circuit on first failure) or
//!   parallel, with timeout, interval and retry policy
//! - **Supervision**: children are tracked by pid and drained with SIGTERM,
//!   then SIGKILL once the grace period runs out
//! - **Mode dispatch**: `app`, `worker`, `beat`, `shell`, `migrate`, ... each
//!   with its own dependency set
//!
//! ## Quick Start
//!
//! ```no_run
//! use entrygate::{ServiceTarget, ShutdownSignal, WaitCoordinator, WaitPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> entrygate::Result<()> {
//! let targets = vec![ServiceTarget::parse("db:5432")?, ServiceTarget::parse("cache:6379")?];
//! let policy = WaitPolicy::default()
//!     .with_timeout(Duration::from_secs(30))
//!     .with_parallel(true);
//!
//! let coordinator = WaitCoordinator::for_policy(&policy, ShutdownSignal::new());
//! let report = coordinator.wait(&targets, &policy).await?;
//! if !report.all_succeeded {
//!     std::process::exit(report.exit_code());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - One [`ShutdownSignal`] is shared by the signal bridge, every wait loop
//!   and the supervisor; it is set at most once
//! - Parallel waits run one future per target and join them; nothing is shared
//! - The supervisor's registry sits behind a mutex that is never held across
//!   an `.await`
//! - [`Supervisor::shutdown`] drains exactly once, however many callers race

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod probe;
pub mod signals;
pub mod supervisor;
pub mod wait;

pub use config::{DeadlineScope, Dependency, Protocol, ServiceTarget, Settings, WaitPolicy};
pub use dispatch::{CommandModeEntry, Dispatcher, ModeHandler, ModeKind, ModeTable};
pub use error::{Error, Result};
pub use probe::{CommandTemplate, NetworkProber, ProbeFailure, Prober};
pub use signals::{InterruptPolicy, ShutdownSignal};
pub use supervisor::{CommandSpec, DrainReport, ProcessState, RunOutcome, Supervisor, SupervisorConfig};
pub use wait::{FailureKind, ProbeOutcome, WaitCoordinator, WaitReport};
