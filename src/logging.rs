//! tracing-subscriber setup shared by both binaries.

use crate::error::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// Install the global subscriber, writing to stderr.
///
/// An explicit `cli_level` (`-q`, `-v`) wins. Otherwise the filter comes from
/// `RUST_LOG`, then `log_level` (the `LOG_LEVEL` setting), then `info`.
/// Calling this twice is harmless; the second call does nothing.
pub fn init(cli_level: Option<&str>, log_level: Option<&str>) {
    let filter = build_filter(
        cli_level,
        || EnvFilter::try_from_default_env().ok(),
        log_level,
    );

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Emit the single fatal line for `err` and return its exit code.
pub fn fatal(err: &Error) -> i32 {
    match err.suggestion() {
        Some(hint) => tracing::error!(kind = err.kind(), hint = %hint, "{}", err),
        None => tracing::error!(kind = err.kind(), "{}", err),
    }
    err.exit_code()
}

fn build_filter(
    cli_level: Option<&str>,
    from_env: impl FnOnce() -> Option<EnvFilter>,
    log_level: Option<&str>,
) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level);
    }
    from_env().unwrap_or_else(|| fallback_filter(log_level, DEFAULT_LEVEL))
}

fn fallback_filter(log_level: Option<&str>, default_level: &str) -> EnvFilter {
    log_level
        .and_then(normalize_level)
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

/// Accept the level names other tooling in the container tends to use.
fn normalize_level(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" | "fatal" => Some("error"),
        "off" | "none" => Some("off"),
        _ => None,
    }
}
