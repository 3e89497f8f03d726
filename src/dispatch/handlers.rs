use super::ModeTable;
use crate::config::{Dependency, ServiceTarget, Settings, WaitPolicy};
use crate::error::{Error, Result, EXIT_OK};
use crate::probe::{prober_for, Prober};
use crate::signals::ShutdownSignal;
use crate::supervisor::{CommandSpec, Supervisor};
use crate::wait::{WaitCoordinator, WaitReport};
use async_trait::async_trait;
use std::sync::Arc;

/// What a handler gets to work with.
pub struct ModeContext<'a> {
    /// Canonical mode name (never an alias).
    pub mode: &'a str,
    pub settings: &'a Settings,
    pub supervisor: &'a Arc<Supervisor>,
    pub table: &'a ModeTable,
    pub shutdown: &'a ShutdownSignal,
    pub(crate) prober: Option<Arc<dyn Prober>>,
}

impl ModeContext<'_> {
    /// A coordinator sharing the dispatcher's shutdown signal.
    pub fn coordinator(&self, policy: &WaitPolicy) -> WaitCoordinator {
        let prober = self.prober.clone().unwrap_or_else(|| prober_for(policy));
        WaitCoordinator::new(prober, self.shutdown.clone())
    }
}

/// The startup routine behind a mode. Runs only after the mode's
/// dependencies are reachable; returns the process exit code.
#[async_trait]
pub trait ModeHandler: Send + Sync {
    async fn run(&self, ctx: &ModeContext<'_>, args: &[String]) -> Result<i32>;
}

/// Runs the mode's command line under the Supervisor, with any arguments
/// appended. `<MODE>_COMMAND` replaces the default command line.
#[derive(Debug, Clone)]
pub struct SupervisedCommand {
    default_command: String,
    interactive: bool,
}

impl SupervisedCommand {
    pub fn new(default_command: impl Into<String>) -> Self {
        Self {
            default_command: default_command.into(),
            interactive: false,
        }
    }

    /// Keep the child in the terminal's foreground process group.
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn command_for(&self, ctx: &ModeContext<'_>, args: &[String]) -> Result<CommandSpec> {
        let line = ctx
            .settings
            .command_override(ctx.mode)
            .unwrap_or(&self.default_command);
        let spec = CommandSpec::parse(line)?.args(args.iter().cloned());
        Ok(if self.interactive { spec.interactive() } else { spec })
    }
}

#[async_trait]
impl ModeHandler for SupervisedCommand {
    async fn run(&self, ctx: &ModeContext<'_>, args: &[String]) -> Result<i32> {
        let spec = self.command_for(ctx, args)?;
        let outcome = ctx.supervisor.run_primary(ctx.mode, &spec).await?;
        Ok(outcome.exit_code())
    }
}

/// Probe every configured dependency once, in parallel, and print the
/// result. Accepts `--json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCheck;

impl HealthCheck {
    fn targets(settings: &Settings) -> Vec<(String, ServiceTarget)> {
        let mut targets: Vec<(String, ServiceTarget)> = Vec::new();
        for dependency in Dependency::all() {
            let Some(target) = settings.target_for(dependency) else {
                continue;
            };
            match targets.iter().position(|(_, t)| t == target) {
                Some(i) => targets[i].0.push_str(&format!("+{}", dependency)),
                None => targets.push((dependency.to_string(), target.clone())),
            }
        }
        targets
    }

    fn print_plain(labels: &[String], report: &WaitReport) {
        if report.outcomes.is_empty() {
            println!("no dependencies configured");
            return;
        }
        for (label, outcome) in labels.iter().zip(&report.outcomes) {
            if outcome.succeeded {
                println!("{:<16} {:<28} ok ({} ms)", label, outcome.target, outcome.elapsed.as_millis());
            } else {
                println!(
                    "{:<16} {:<28} FAILED ({})",
                    label,
                    outcome.target,
                    outcome.last_error.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
}

#[async_trait]
impl ModeHandler for HealthCheck {
    async fn run(&self, ctx: &ModeContext<'_>, args: &[String]) -> Result<i32> {
        let mut json = false;
        for arg in args {
            match arg.as_str() {
                "--json" => json = true,
                other => {
                    return Err(Error::InvalidArgument(format!(
                        "unexpected argument for health: '{}'",
                        other
                    )))
                }
            }
        }

        let configured = Self::targets(ctx.settings);
        let (labels, targets): (Vec<String>, Vec<ServiceTarget>) = configured.into_iter().unzip();

        let base = &ctx.settings.wait_policy;
        let policy = WaitPolicy::default()
            .with_timeout(base.attempt_timeout)
            .with_attempt_timeout(base.attempt_timeout)
            .with_max_retries(1)
            .with_parallel(true)
            .with_custom_check(base.custom_check.clone());

        let report = ctx.coordinator(&policy).wait(&targets, &policy).await?;

        if json {
            let rendered = serde_json::to_string_pretty(&report).map_err(|e| Error::Io(e.into()))?;
            println!("{}", rendered);
        } else {
            Self::print_plain(&labels, &report);
        }
        Ok(report.exit_code())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Help;

impl Help {
    pub fn render(table: &ModeTable) -> String {
        let mut out = String::new();
        out.push_str("Usage: entrygate <MODE> [ARGS...]\n\n");
        out.push_str("Waits for the mode's dependencies, then starts it under supervision.\n");
        out.push_str("Any other executable on PATH is run as-is.\n\nModes:\n");
        for entry in table.entries() {
            let aliases = if entry.aliases.is_empty() {
                String::new()
            } else {
                format!(" (aliases: {})", entry.aliases.join(", "))
            };
            out.push_str(&format!("  {:<10} {}{}\n", entry.name, entry.summary, aliases));
        }
        out.push_str(
            "\nEnvironment:\n\
             \x20 APP_ENV                  development | staging | production\n\
             \x20 DATABASE_URL             primary datastore (or DB_HOST / DB_PORT)\n\
             \x20 REDIS_URL                cache\n\
             \x20 CELERY_BROKER_URL        broker (defaults to REDIS_URL)\n\
             \x20 WAIT_FOR_DB|CACHE|BROKER set to false to skip one dependency\n\
             \x20 SKIP_WAIT                set to true to skip every dependency\n\
             \x20 WAIT_TIMEOUT             dependency wait timeout (default 60s)\n\
             \x20 WAIT_INTERVAL            delay between probe attempts (default 1s)\n\
             \x20 WAIT_RETRIES             attempts per dependency, 0 = unlimited\n\
             \x20 WAIT_PARALLEL            probe dependencies concurrently (default true)\n\
             \x20 WAIT_GLOBAL_DEADLINE     one deadline for all dependencies\n\
             \x20 SHUTDOWN_GRACE_PERIOD    time between SIGTERM and SIGKILL (default 30s)\n\
             \x20 SHUTDOWN_POLL_INTERVAL   supervisor poll tick (default 100ms)\n\
             \x20 <MODE>_COMMAND           replace a mode's command line\n\
             \x20 LOG_LEVEL                log verbosity when RUST_LOG is unset\n\
             \x20 ENTRYGATE_ENV_FILE       dotenv file merged under the environment\n",
        );
        out
    }
}

#[async_trait]
impl ModeHandler for Help {
    async fn run(&self, ctx: &ModeContext<'_>, _args: &[String]) -> Result<i32> {
        print!("{}", Self::render(ctx.table));
        Ok(EXIT_OK)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Version;

#[async_trait]
impl ModeHandler for Version {
    async fn run(&self, _ctx: &ModeContext<'_>, _args: &[String]) -> Result<i32> {
        println!("entrygate {}", env!("CARGO_PKG_VERSION"));
        Ok(EXIT_OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::SupervisorConfig;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned()).unwrap()
    }

    #[test]
    fn shared_targets_are_probed_once() {
        let settings = settings(&[
            ("DATABASE_URL", "postgres://u:p@db:5432/app"),
            ("REDIS_URL", "redis://cache:6379/0"),
        ]);
        let targets = HealthCheck::targets(&settings);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].0, "cache+broker");
        assert_eq!(targets[1].1.to_string(), "cache:6379");
    }

    #[test]
    fn command_override_replaces_default() {
        let settings = settings(&[("WORKER_COMMAND", "rq worker --burst")]);
        let supervisor = Arc::new(Supervisor::new(SupervisorConfig::default(), ShutdownSignal::new()));
        let table = ModeTable::builtin();
        let shutdown = ShutdownSignal::new();
        let ctx = ModeContext {
            mode: "worker",
            settings: &settings,
            supervisor: &supervisor,
            table: &table,
            shutdown: &shutdown,
            prober: None,
        };

        let handler = SupervisedCommand::new("celery worker");
        let spec = handler.command_for(&ctx, &["high".to_string()]).unwrap();
        assert_eq!(spec.program, "rq");
        assert_eq!(spec.args, vec!["worker", "--burst", "high"]);
        assert!(spec.own_process_group);

        let ctx = ModeContext { mode: "shell", ..ctx };
        let spec = SupervisedCommand::new("flask shell")
            .interactive()
            .command_for(&ctx, &[])
            .unwrap();
        assert_eq!(spec.to_string(), "flask shell");
        assert!(!spec.own_process_group);
    }

    #[test]
    fn help_lists_modes_and_aliases() {
        let help = Help::render(&ModeTable::builtin());
        assert!(help.contains("worker"));
        assert!(help.contains("aliases: server, webapp, web"));
        assert!(help.contains("SHUTDOWN_GRACE_PERIOD"));
    }
}
