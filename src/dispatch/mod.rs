//! The Command Dispatcher: resolves a mode name, waits for the mode's
//! dependencies, then hands over to the mode's handler.
//!
//! A mode whose dependencies are not reachable never reaches its handler;
//! the wait's exit code is returned through [`Error::DependencyUnavailable`].
//! Names that are not in the table but exist on `PATH` are run as-is under
//! the Supervisor.

mod handlers;
mod table;

pub use crate::config::Dependency;
pub use handlers::*;
pub use table::*;

use crate::config::{ServiceTarget, Settings};
use crate::error::{Error, Result};
use crate::probe::Prober;
use crate::signals::{self, InterruptPolicy, ShutdownSignal};
use crate::supervisor::{CommandSpec, Supervisor, SupervisorConfig};
use std::sync::Arc;

pub struct Dispatcher {
    table: ModeTable,
    settings: Settings,
    shutdown: ShutdownSignal,
    supervisor: Arc<Supervisor>,
    prober: Option<Arc<dyn Prober>>,
    install_signal_bridge: bool,
}

impl Dispatcher {
    pub fn new(settings: Settings, shutdown: ShutdownSignal) -> Self {
        let supervisor = Arc::new(Supervisor::new(
            SupervisorConfig::from_settings(&settings),
            shutdown.clone(),
        ));
        Self {
            table: ModeTable::builtin(),
            settings,
            shutdown,
            supervisor,
            prober: None,
            install_signal_bridge: true,
        }
    }

    pub fn with_table(mut self, table: ModeTable) -> Self {
        self.table = table;
        self
    }

    /// Probe with `prober` instead of the one the wait policy selects.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Leave OS signal handling to the caller.
    pub fn without_signal_bridge(mut self) -> Self {
        self.install_signal_bridge = false;
        self
    }

    pub fn table(&self) -> &ModeTable {
        &self.table
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Run `mode` and return the exit code for the process.
    pub async fn dispatch(&self, mode: &str, args: &[String]) -> Result<i32> {
        match self.table.resolve(mode) {
            Some(entry) => self.run_entry(entry, args).await,
            None => self.run_external(mode, args).await,
        }
    }

    async fn run_entry(&self, entry: &CommandModeEntry, args: &[String]) -> Result<i32> {
        tracing::debug!(mode = %entry.name, kind = %entry.kind, "Resolved mode");
        self.settings.check_required(&entry.dependencies)?;

        match entry.kind {
            ModeKind::Utility => {}
            ModeKind::Interactive => self.install_bridge(InterruptPolicy::Passthrough),
            ModeKind::LongRunning | ModeKind::OneShot => {
                self.install_bridge(InterruptPolicy::Shutdown)
            }
        }

        let targets = self.dependency_targets(entry);
        if !targets.is_empty() {
            self.wait_for_dependencies(&entry.name, &targets).await?;
        }

        let ctx = ModeContext {
            mode: &entry.name,
            settings: &self.settings,
            supervisor: &self.supervisor,
            table: &self.table,
            shutdown: &self.shutdown,
            prober: self.prober.clone(),
        };
        let code = entry.handler.run(&ctx, args).await?;
        if code != 0 && entry.kind != ModeKind::Utility {
            tracing::warn!(mode = %entry.name, code, "Mode {} finished with exit code {}", entry.name, code);
        }
        Ok(code)
    }

    async fn run_external(&self, command: &str, args: &[String]) -> Result<i32> {
        if which::which(command).is_err() {
            return Err(Error::InvalidArgument(format!(
                "unknown mode '{}' (expected one of: {}, or an executable on PATH)",
                command,
                self.table.names().join(", ")
            )));
        }

        self.install_bridge(InterruptPolicy::Shutdown);
        tracing::info!("Running external command: {}", command);
        let spec = CommandSpec::new(command).args(args.iter().cloned());
        let outcome = self.supervisor.run_primary(command, &spec).await?;
        Ok(outcome.exit_code())
    }

    /// Targets the mode must wait for: enabled dependencies with a configured
    /// target, deduplicated.
    fn dependency_targets(&self, entry: &CommandModeEntry) -> Vec<ServiceTarget> {
        let mut targets: Vec<ServiceTarget> = Vec::new();
        for dependency in &entry.dependencies {
            if !self.settings.should_wait_for(*dependency) {
                tracing::debug!("Skipping wait for {}", dependency);
                continue;
            }
            match self.settings.target_for(*dependency) {
                Some(target) if !targets.contains(target) => targets.push(target.clone()),
                Some(_) => {}
                None => tracing::debug!("No {} configured, nothing to wait for", dependency),
            }
        }
        targets
    }

    async fn wait_for_dependencies(&self, mode: &str, targets: &[ServiceTarget]) -> Result<()> {
        let policy = &self.settings.wait_policy;
        let listed = targets
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!(mode, "Waiting for {} (timeout {:?})", listed, policy.timeout);

        let ctx = ModeContext {
            mode,
            settings: &self.settings,
            supervisor: &self.supervisor,
            table: &self.table,
            shutdown: &self.shutdown,
            prober: self.prober.clone(),
        };
        let report = ctx.coordinator(policy).wait(targets, policy).await?;

        if report.all_succeeded {
            tracing::info!(mode, "Dependencies ready after {:?}", report.elapsed);
            return Ok(());
        }

        for failed in report.failures() {
            tracing::warn!(
                endpoint = %failed.target,
                attempts = failed.attempts,
                "{} unavailable: {}",
                failed.target,
                failed.last_error.as_deref().unwrap_or("unknown")
            );
        }
        Err(Error::DependencyUnavailable {
            mode: mode.to_string(),
            targets: report.failures().map(|o| o.target.to_string()).collect(),
            exit_code: report.exit_code(),
        })
    }

    fn install_bridge(&self, policy: InterruptPolicy) {
        if self.install_signal_bridge {
            signals::install(self.shutdown.clone(), policy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn dispatcher(vars: &[(&str, &str)]) -> Dispatcher {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let settings = Settings::from_lookup(|key| map.get(key).cloned()).unwrap();
        Dispatcher::new(settings, ShutdownSignal::new()).without_signal_bridge()
    }

    #[test]
    fn targets_honour_toggles_and_dedupe() {
        let d = dispatcher(&[
            ("DATABASE_URL", "postgres://db:5432/app"),
            ("REDIS_URL", "redis://cache:6379"),
        ]);
        let worker = d.table().resolve("worker").unwrap();
        let targets: Vec<String> = d.dependency_targets(worker).iter().map(|t| t.to_string()).collect();
        assert_eq!(targets, vec!["db:5432", "cache:6379"]);

        let d = dispatcher(&[
            ("DATABASE_URL", "postgres://db:5432/app"),
            ("REDIS_URL", "redis://cache:6379"),
            ("WAIT_FOR_DB", "false"),
        ]);
        let worker = d.table().resolve("worker").unwrap();
        let targets: Vec<String> = d.dependency_targets(worker).iter().map(|t| t.to_string()).collect();
        assert_eq!(targets, vec!["cache:6379"]);
    }

    #[test]
    fn skip_wait_clears_every_target() {
        let d = dispatcher(&[
            ("DATABASE_URL", "postgres://db:5432/app"),
            ("SKIP_WAIT", "true"),
        ]);
        let app = d.table().resolve("app").unwrap();
        assert!(d.dependency_targets(app).is_empty());
    }

    #[tokio::test]
    async fn unknown_mode_without_executable_is_invalid() {
        let d = dispatcher(&[]);
        let err = d
            .dispatch("entrygate-definitely-not-a-mode", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn production_without_database_fails_before_waiting() {
        let d = dispatcher(&[("APP_ENV", "production")]);
        let err = d.dispatch("migrate", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(d.supervisor().drain_cycles(), 0);
    }

    #[tokio::test]
    async fn external_command_runs_supervised() {
        let d = dispatcher(&[]);
        let code = d
            .dispatch("sh", &["-c".to_string(), "exit 5".to_string()])
            .await
            .unwrap();
        assert_eq!(code, 5);
    }
}
