//! Runtime settings read from environment variables.
//!
//! Every variable is optional. [`Settings::from_env`] reads the process
//! environment, merged over an optional dotenv file named by
//! `ENTRYGATE_ENV_FILE` (process variables win). Tests build settings from a
//! plain map through [`Settings::from_lookup`].

use super::{parse_duration_string, DeadlineScope, Environment, ServiceTarget, WaitPolicy};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default dispatcher wait timeout (60 seconds).
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Default shutdown grace period before SIGKILL (30 seconds).
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Default supervisor poll tick (100 milliseconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Names of the per-mode command override variables, minus the `_COMMAND` suffix.
const COMMAND_OVERRIDE_MODES: &[&str] = &[
    "app", "worker", "beat", "flower", "shell", "migrate", "seed", "test", "backup", "restore",
];

/// A backing service a mode can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    Database,
    Cache,
    Broker,
}

impl Dependency {
    pub fn all() -> [Dependency; 3] {
        [Dependency::Database, Dependency::Cache, Dependency::Broker]
    }

    /// Name of the variable that disables waiting for this dependency.
    pub fn toggle_var(&self) -> &'static str {
        match self {
            Dependency::Database => "WAIT_FOR_DB",
            Dependency::Cache => "WAIT_FOR_CACHE",
            Dependency::Broker => "WAIT_FOR_BROKER",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Database => write!(f, "database"),
            Dependency::Cache => write!(f, "cache"),
            Dependency::Broker => write!(f, "broker"),
        }
    }
}

/// Everything the dispatcher reads from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: Environment,
    pub database: Option<ServiceTarget>,
    pub cache: Option<ServiceTarget>,
    pub broker: Option<ServiceTarget>,
    pub skip_wait: bool,
    disabled: Vec<Dependency>,
    pub wait_policy: WaitPolicy,
    pub grace_period: Duration,
    pub poll_interval: Duration,
    pub log_level: Option<String>,
    command_overrides: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            database: None,
            cache: None,
            broker: None,
            skip_wait: false,
            disabled: Vec::new(),
            wait_policy: WaitPolicy::default()
                .with_timeout(DEFAULT_DISPATCH_TIMEOUT)
                .with_parallel(true),
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_level: None,
            command_overrides: HashMap::new(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment and the optional dotenv file.
    pub fn from_env() -> Result<Self> {
        let file_vars = match std::env::var("ENTRYGATE_ENV_FILE") {
            Ok(path) if !path.trim().is_empty() => load_env_file(Path::new(path.trim()))?,
            _ => HashMap::new(),
        };
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file_vars.get(key).cloned()))
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(env) = get("APP_ENV") {
            settings.environment = env.parse().map_err(Error::Config)?;
        }

        settings.database = match (get("DATABASE_URL"), get("DB_HOST")) {
            (Some(url), _) => Some(ServiceTarget::from_url(&url).map_err(|e| {
                Error::Config(format!("DATABASE_URL: {}", strip_prefix(&e)))
            })?),
            (None, Some(host)) => {
                let port = match get("DB_PORT") {
                    Some(p) => p.trim().parse::<u32>().map_err(|_| {
                        Error::Config(format!("DB_PORT '{}' is not a port number", p))
                    })?,
                    None => 5432,
                };
                Some(
                    ServiceTarget::new(host.trim(), port, Default::default())
                        .map_err(|e| Error::Config(format!("DB_HOST: {}", strip_prefix(&e))))?,
                )
            }
            (None, None) => None,
        };

        settings.cache = get("REDIS_URL")
            .map(|url| {
                ServiceTarget::from_url(&url)
                    .map_err(|e| Error::Config(format!("REDIS_URL: {}", strip_prefix(&e))))
            })
            .transpose()?;

        settings.broker = match get("CELERY_BROKER_URL") {
            Some(url) => Some(ServiceTarget::from_url(&url).map_err(|e| {
                Error::Config(format!("CELERY_BROKER_URL: {}", strip_prefix(&e)))
            })?),
            None => settings.cache.clone(),
        };

        settings.skip_wait = parse_bool_var(&get, "SKIP_WAIT", false)?;
        for dependency in Dependency::all() {
            if !parse_bool_var(&get, dependency.toggle_var(), true)? {
                settings.disabled.push(dependency);
            }
        }

        let mut policy = settings.wait_policy.clone();
        if let Some(timeout) = parse_duration_var(&get, "WAIT_TIMEOUT")? {
            policy.timeout = timeout;
        }
        if let Some(interval) = parse_duration_var(&get, "WAIT_INTERVAL")? {
            policy.interval = interval;
        }
        if let Some(retries) = get("WAIT_RETRIES") {
            policy.max_retries = retries.trim().parse().map_err(|_| {
                Error::Config(format!("WAIT_RETRIES '{}' is not a whole number", retries))
            })?;
        }
        policy.parallel = parse_bool_var(&get, "WAIT_PARALLEL", true)?;
        if parse_bool_var(&get, "WAIT_GLOBAL_DEADLINE", false)? {
            policy.deadline_scope = DeadlineScope::Global;
        }
        policy
            .validate()
            .map_err(|e| Error::Config(strip_prefix(&e)))?;
        settings.wait_policy = policy;

        if let Some(grace) = parse_duration_var(&get, "SHUTDOWN_GRACE_PERIOD")? {
            settings.grace_period = grace;
        }
        if let Some(poll) = parse_duration_var(&get, "SHUTDOWN_POLL_INTERVAL")? {
            if poll.is_zero() {
                return Err(Error::Config(
                    "SHUTDOWN_POLL_INTERVAL must be greater than zero".to_string(),
                ));
            }
            settings.poll_interval = poll;
        }

        settings.log_level = get("LOG_LEVEL");

        for mode in COMMAND_OVERRIDE_MODES {
            let key = format!("{}_COMMAND", mode.to_uppercase());
            if let Some(command) = get(&key) {
                settings.command_overrides.insert(mode.to_string(), command);
            }
        }

        Ok(settings)
    }

    /// The target configured for a dependency, if any.
    pub fn target_for(&self, dependency: Dependency) -> Option<&ServiceTarget> {
        match dependency {
            Dependency::Database => self.database.as_ref(),
            Dependency::Cache => self.cache.as_ref(),
            Dependency::Broker => self.broker.as_ref(),
        }
    }

    /// Whether waiting for this dependency is enabled.
    pub fn should_wait_for(&self, dependency: Dependency) -> bool {
        !self.skip_wait && !self.disabled.contains(&dependency)
    }

    /// Command line override for a mode (`APP_COMMAND`, `WORKER_COMMAND`, ...).
    pub fn command_override(&self, mode: &str) -> Option<&str> {
        self.command_overrides.get(mode).map(String::as_str)
    }

    /// Fail fast when a production deployment lacks a required dependency.
    pub fn check_required(&self, dependencies: &[Dependency]) -> Result<()> {
        if self.environment.is_production()
            && dependencies.contains(&Dependency::Database)
            && self.database.is_none()
        {
            return Err(Error::Config(
                "DATABASE_URL (or DB_HOST) is required when APP_ENV=production".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load variables from a dotenv file.
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Environment file not found: {}",
            path.display()
        )));
    }

    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read environment file {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            Error::Config(format!(
                "Failed to parse environment file {}: {}",
                path.display(),
                e
            ))
        })?;
        vars.insert(key, value);
    }
    Ok(vars)
}

fn parse_bool_var<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!(
                "{} must be a boolean (true/false), got '{}'",
                key, raw
            ))),
        },
    }
}

fn parse_duration_var<G>(get: &G, key: &str) -> Result<Option<Duration>>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            parse_duration_string(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "{} has invalid duration '{}'. Use formats like '5s', '30s', '1m', '500ms'",
                    key, raw
                ))
            })
        })
        .transpose()
}

/// Inner message of an error, without the variant's display prefix.
fn strip_prefix(err: &Error) -> String {
    match err {
        Error::InvalidArgument(msg) | Error::Config(msg) => msg.clone(),
        other => other.to_string(),
    }
}
