// thiserror's expansion of struct variants trips unused_assignments.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use thiserror::Error;

/// Exit code for a successful run.
pub const EXIT_OK: i32 = 0;
/// Exit code when a dependency never became reachable before its deadline.
pub const EXIT_TIMEOUT: i32 = 1;
/// Exit code for malformed arguments or configuration.
pub const EXIT_INVALID: i32 = 2;
/// Exit code when probe attempts ran out before the deadline.
pub const EXIT_CONNECTION_FAILED: i32 = 3;
/// Exit code when the post-wait command failed in strict mode.
pub const EXIT_DOWNSTREAM_FAILED: i32 = 4;
/// Exit code when waiting was interrupted by a termination signal.
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(entrygate::argument::invalid),
        help("Run with --help to see the accepted arguments")
    )]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(entrygate::config::invalid),
        help("Check the environment variables documented in `entrygate help`")
    )]
    Config(String),

    #[error("Timed out after {elapsed:?} waiting for {target}")]
    #[diagnostic(
        code(entrygate::wait::timeout),
        help("The service may be slow to start. Increase the timeout or check that {target} is reachable")
    )]
    ConnectionTimeout {
        target: String,
        elapsed: std::time::Duration,
    },

    #[error("Gave up on {target} after {attempts} attempts: {reason}")]
    #[diagnostic(
        code(entrygate::wait::connection_failed),
        help("Raise --retries or check that {target} accepts connections")
    )]
    ConnectionFailed {
        target: String,
        attempts: u32,
        reason: String,
    },

    #[error("Wait for {0} was cancelled by a shutdown request")]
    Cancelled(String),

    #[error("Command '{command}' exited with code {exit_code}")]
    #[diagnostic(code(entrygate::command::failed))]
    DownstreamCommandFailed { command: String, exit_code: i32 },

    #[error("Mode '{mode}' dependencies are unavailable: {}", .targets.join(", "))]
    #[diagnostic(
        code(entrygate::dispatch::dependency_unavailable),
        help("Set WAIT_FOR_<DEPENDENCY>=false to skip a dependency, or fix its connection settings")
    )]
    DependencyUnavailable {
        mode: String,
        targets: Vec<String>,
        exit_code: i32,
    },

    #[error("Process error: {0}")]
    #[diagnostic(
        code(entrygate::process::error),
        help("Check that the command exists and is executable")
    )]
    Process(String),

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) | Error::Config(_) => EXIT_INVALID,
            Error::ConnectionTimeout { .. } => EXIT_TIMEOUT,
            Error::ConnectionFailed { .. } => EXIT_CONNECTION_FAILED,
            Error::Cancelled(_) => EXIT_CANCELLED,
            Error::DownstreamCommandFailed { .. } => EXIT_DOWNSTREAM_FAILED,
            Error::DependencyUnavailable { exit_code, .. } => *exit_code,
            Error::Process(_) | Error::InvalidPid { .. } | Error::Io(_) => 1,
        }
    }

    /// Stable tag used as the `kind` field of fatal log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Config(_) => "invalid_configuration",
            Error::ConnectionTimeout { .. } => "connection_timeout",
            Error::ConnectionFailed { .. } => "connection_failed",
            Error::Cancelled(_) => "cancelled",
            Error::DownstreamCommandFailed { .. } => "downstream_command_failed",
            Error::DependencyUnavailable { .. } => "dependency_unavailable",
            Error::Process(_) => "process_error",
            Error::InvalidPid { .. } => "invalid_pid",
            Error::Io(_) => "io_error",
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ConnectionTimeout { target, .. } => Some(format!(
                "Check that {} is running and reachable from this container, or raise the timeout.",
                target
            )),
            Error::ConnectionFailed { target, .. } => Some(format!(
                "All attempts against {} failed. Raise the retry limit or verify the port.",
                target
            )),
            Error::DependencyUnavailable { mode, .. } => Some(format!(
                "Mode '{}' was not started. Set SKIP_WAIT=true to bypass dependency checks.",
                mode
            )),
            Error::Config(msg) if msg.contains("DATABASE_URL") => Some(
                "Production mode requires DATABASE_URL (or DB_HOST) to be set".to_string(),
            ),
            Error::Process(_) => Some("Check that the command exists and is executable".to_string()),
            _ => None,
        }
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
pub fn validate_pid(pid: u32, process_name: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID 0 is invalid for process '{}' (refers to process group, not a process)",
                process_name
            ),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "refusing to signal PID 1 (init) for process '{}'",
                process_name
            ),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID {} exceeds i32::MAX for process '{}', cannot convert safely",
                pid, process_name
            ),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(Error::InvalidArgument("x".into()).exit_code(), 2);
        assert_eq!(Error::Config("x".into()).exit_code(), 2);
        assert_eq!(
            Error::ConnectionTimeout {
                target: "db:5432".into(),
                elapsed: Duration::from_secs(3),
            }
            .exit_code(),
            1
        );
        assert_eq!(
            Error::ConnectionFailed {
                target: "db:5432".into(),
                attempts: 3,
                reason: "refused".into(),
            }
            .exit_code(),
            3
        );
        assert_eq!(
            Error::DownstreamCommandFailed {
                command: "false".into(),
                exit_code: 1,
            }
            .exit_code(),
            4
        );
        assert_eq!(Error::Cancelled("db:5432".into()).exit_code(), 130);
    }

    #[test]
    fn dependency_unavailable_carries_wait_exit_code() {
        let err = Error::DependencyUnavailable {
            mode: "worker".into(),
            targets: vec!["cache:6379".into()],
            exit_code: 3,
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.kind(), "dependency_unavailable");
        assert!(err.to_string().contains("cache:6379"));
    }

    #[test]
    fn suggestion_only_where_actionable() {
        let err = Error::Config("DATABASE_URL is required in production".into());
        assert!(err.suggestion().is_some());
        assert_eq!(Error::Io(io::Error::other("boom")).suggestion(), None);
    }

    #[test]
    fn validate_pid_rejects_special_values() {
        assert!(validate_pid(0, "app").is_err());
        assert!(validate_pid(1, "app").is_err());
        assert!(validate_pid(u32::MAX, "app").is_err());
        assert_eq!(validate_pid(4242, "app").unwrap().as_raw(), 4242);
    }
}
