//! `wait-for`: block until services accept connections, then optionally run a
//! command.
//!
//! Exit codes: 0 ready, 1 timeout, 2 invalid arguments, 3 retries exhausted,
//! 4 command failed (with `--strict`), 130 interrupted.

use clap::{ArgAction, Parser};
use entrygate::config::parse_duration_string;
use entrygate::{
    logging, signals, CommandSpec, CommandTemplate, DeadlineScope, Error, InterruptPolicy, Protocol,
    ServiceTarget, ShutdownSignal, Supervisor, SupervisorConfig, WaitCoordinator, WaitPolicy,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "wait-for")]
#[command(version)]
#[command(about = "Wait for TCP/UDP services to become reachable, then run a command")]
#[command(disable_help_flag = true)]
#[command(after_help = "Examples:\n  \
    wait-for db:5432 cache:6379 -P -t 60 -- gunicorn wsgi:app\n  \
    wait-for -h db -p 5432 -c 'pg_isready -h {host} -p {port}'")]
struct Args {
    /// Targets to wait for
    #[arg(value_name = "HOST:PORT")]
    targets: Vec<String>,

    /// Host of a single target (requires --port)
    #[arg(short = 'h', long, value_name = "HOST", requires = "port")]
    host: Option<String>,

    /// Port of a single target (requires --host)
    #[arg(short = 'p', long, value_name = "PORT", requires = "host")]
    port: Option<u32>,

    /// Give up on a target after this long (seconds, or 500ms/30s/2m)
    #[arg(short, long, value_name = "SECONDS", default_value = "15", value_parser = parse_seconds)]
    timeout: Duration,

    /// Delay between attempts against the same target
    #[arg(short, long, value_name = "SECONDS", default_value = "1", value_parser = parse_seconds)]
    interval: Duration,

    /// Maximum attempts per target (0 = unlimited)
    #[arg(short, long, value_name = "N", default_value_t = 0)]
    retries: u32,

    /// Fail with code 4 when the command exits non-zero
    #[arg(short, long)]
    strict: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Probe all targets concurrently
    #[arg(short = 'P', long)]
    parallel: bool,

    /// Custom check run instead of a network probe; {host} and {port} are substituted
    #[arg(short, long, value_name = "COMMAND_TEMPLATE")]
    check: Option<String>,

    /// Transport used by the network probe
    #[arg(long, value_name = "tcp|udp", default_value = "tcp")]
    protocol: Protocol,

    /// Measure the timeout once for all targets instead of per target
    #[arg(long)]
    global_deadline: bool,

    /// Upper bound for a single attempt
    #[arg(long, value_name = "SECONDS", default_value = "5", value_parser = parse_seconds)]
    attempt_timeout: Duration,

    /// Time the command gets to exit after SIGTERM before it is killed
    #[arg(long, value_name = "SECONDS", default_value = "30", value_parser = parse_seconds)]
    grace_period: Duration,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Command to run once every target is ready
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Args {
    fn service_targets(&self) -> entrygate::Result<Vec<ServiceTarget>> {
        let mut targets = self
            .targets
            .iter()
            .map(|token| Ok(ServiceTarget::parse(token)?.with_protocol(self.protocol)))
            .collect::<entrygate::Result<Vec<_>>>()?;

        if let (Some(host), Some(port)) = (&self.host, self.port) {
            targets.push(ServiceTarget::new(host.as_str(), port, self.protocol)?);
        }

        if targets.is_empty() {
            return Err(Error::InvalidArgument(
                "no targets given (use HOST:PORT or --host/--port)".to_string(),
            ));
        }
        Ok(targets)
    }

    fn policy(&self) -> entrygate::Result<WaitPolicy> {
        let custom_check = self
            .check
            .as_deref()
            .map(CommandTemplate::parse)
            .transpose()?;
        let scope = if self.global_deadline {
            DeadlineScope::Global
        } else {
            DeadlineScope::PerTarget
        };

        let policy = WaitPolicy::default()
            .with_timeout(self.timeout)
            .with_interval(self.interval)
            .with_max_retries(self.retries)
            .with_parallel(self.parallel)
            .with_strict(self.strict)
            .with_custom_check(custom_check)
            .with_attempt_timeout(self.attempt_timeout)
            .with_deadline_scope(scope);
        policy.validate()?;
        Ok(policy)
    }
}

fn parse_seconds(raw: &str) -> Result<Duration, String> {
    parse_duration_string(raw).ok_or_else(|| format!("invalid duration '{}'", raw))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(
        args.quiet.then_some("error"),
        std::env::var("LOG_LEVEL").ok().as_deref(),
    );

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<Error>() {
            Some(err) => logging::fatal(err),
            None => {
                tracing::error!(kind = "internal", "{:#}", e);
                1
            }
        },
    };
    std::process::exit(code);
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let targets = args.service_targets()?;
    let policy = args.policy()?;

    let shutdown = ShutdownSignal::new();
    signals::install(shutdown.clone(), InterruptPolicy::Shutdown);

    let coordinator = WaitCoordinator::for_policy(&policy, shutdown.clone());
    let report = coordinator.wait(&targets, &policy).await?.into_result()?;
    tracing::info!(
        "{} target(s) ready in {:?}",
        report.outcomes.len(),
        report.elapsed
    );

    let Some((program, rest)) = args.command.split_first() else {
        return Ok(0);
    };

    let spec = CommandSpec::new(program.as_str()).args(rest.iter().cloned());
    let config = SupervisorConfig {
        grace_period: args.grace_period,
        ..SupervisorConfig::default()
    };
    let supervisor = Arc::new(Supervisor::new(config, shutdown));

    let code = match supervisor.run_primary(program, &spec).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            tracing::warn!(kind = e.kind(), "{}", e);
            127
        }
    };

    if code == 0 {
        return Ok(0);
    }
    if policy.strict {
        return Err(Error::DownstreamCommandFailed {
            command: spec.to_string(),
            exit_code: code,
        }
        .into());
    }
    tracing::warn!(
        "Command '{}' exited with code {}; ignoring without --strict",
        spec,
        code
    );
    Ok(0)
}
