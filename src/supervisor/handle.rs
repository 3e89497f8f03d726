use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// Lifecycle state of a supervised child.
///
/// ```text
/// Running ──► Terminating ──► Exited
///    │             │            ▲
///    │             ▼            │
///    │        ForceKilled ──────┘
///    └──────────────────────────┘  (exited on its own)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    Terminating,
    ForceKilled,
    Exited,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Running => write!(f, "running"),
            ProcessState::Terminating => write!(f, "terminating"),
            ProcessState::ForceKilled => write!(f, "force_killed"),
            ProcessState::Exited => write!(f, "exited"),
        }
    }
}

impl ProcessState {
    /// Check a transition against the state machine. `ForceKilled` is only
    /// reachable through `Terminating`.
    ///
    /// ```
    /// use entrygate::supervisor::ProcessState;
    ///
    /// assert!(ProcessState::Running.is_valid_transition(ProcessState::Terminating));
    /// assert!(ProcessState::Running.is_valid_transition(ProcessState::Exited));
    /// assert!(!ProcessState::Running.is_valid_transition(ProcessState::ForceKilled));
    /// ```
    pub fn is_valid_transition(&self, to: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, to),
            (Running, Terminating)
                | (Running, Exited)
                | (Terminating, Exited)
                | (Terminating, ForceKilled)
                | (ForceKilled, Exited)
        )
    }
}

/// Supervisor-owned record of one child process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessHandle {
    pub pid: u32,
    pub logical_name: String,
    pub started_at: DateTime<Utc>,
    pub state: ProcessState,
    /// Whether signals go to the child's process group instead of the pid.
    #[serde(skip)]
    pub(crate) signal_group: bool,
    #[serde(skip)]
    pub(crate) terminating_since: Option<Instant>,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32, logical_name: impl Into<String>, signal_group: bool) -> Self {
        Self {
            pid,
            logical_name: logical_name.into(),
            started_at: Utc::now(),
            state: ProcessState::Running,
            signal_group,
            terminating_since: None,
        }
    }

    /// Move to `to`, refusing transitions the state machine does not allow.
    pub(crate) fn transition(&mut self, to: ProcessState) -> bool {
        if !self.state.is_valid_transition(to) {
            tracing::debug!(
                pid = self.pid,
                process = %self.logical_name,
                "Ignoring invalid transition {} -> {}",
                self.state,
                to
            );
            return false;
        }
        if to == ProcessState::Terminating {
            self.terminating_since = Some(Instant::now());
        }
        self.state = to;
        true
    }
}

/// How a child finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitRecord {
    pub pid: u32,
    pub logical_name: String,
    /// Exit code, or `128 + signal` when the child was killed by a signal.
    pub code: i32,
    /// State the child was in when its exit was observed.
    pub observed_in: ProcessState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_kill_requires_terminating_first() {
        let mut handle = ProcessHandle::new(42, "app", true);
        assert!(!handle.transition(ProcessState::ForceKilled));
        assert_eq!(handle.state, ProcessState::Running);

        assert!(handle.transition(ProcessState::Terminating));
        assert!(handle.terminating_since.is_some());
        assert!(handle.transition(ProcessState::ForceKilled));
        assert!(handle.transition(ProcessState::Exited));
        assert_eq!(handle.state, ProcessState::Exited);
    }

    #[test]
    fn exited_is_final() {
        use ProcessState::*;
        for to in [Running, Terminating, ForceKilled, Exited] {
            assert!(!Exited.is_valid_transition(to));
        }
    }

    #[test]
    fn no_way_back_to_running() {
        use ProcessState::*;
        for from in [Terminating, ForceKilled, Exited] {
            assert!(!from.is_valid_transition(Running));
        }
    }
}
