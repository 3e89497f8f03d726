use super::{ExitRecord, ProcessHandle, ProcessState};
use std::collections::HashMap;
use tokio::process::Child;

struct Tracked {
    handle: ProcessHandle,
    child: Child,
}

/// pid → handle map. Lives behind the Supervisor's mutex; nothing in here
/// awaits, so the lock is never held across a suspension point.
#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<u32, Tracked>,
}

impl Registry {
    pub fn insert(&mut self, handle: ProcessHandle, child: Child) {
        self.entries.insert(handle.pid, Tracked { handle, child });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.entries.contains_key(&pid)
    }

    pub fn count_in(&self, state: ProcessState) -> usize {
        self.entries
            .values()
            .filter(|t| t.handle.state == state)
            .count()
    }

    pub fn snapshot(&self) -> Vec<ProcessHandle> {
        let mut handles: Vec<ProcessHandle> =
            self.entries.values().map(|t| t.handle.clone()).collect();
        handles.sort_by_key(|h| h.started_at);
        handles
    }

    pub fn handles_mut(&mut self) -> impl Iterator<Item = &mut ProcessHandle> {
        self.entries.values_mut().map(|t| &mut t.handle)
    }

    /// Remove every child whose process has exited. Each removal moves the
    /// handle to `Exited`; the returned records carry the state it was in.
    pub fn reap(&mut self) -> Vec<ExitRecord> {
        let mut finished = Vec::new();
        for (pid, tracked) in self.entries.iter_mut() {
            match tracked.child.try_wait() {
                Ok(Some(status)) => finished.push((*pid, exit_code(&status))),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        pid = *pid,
                        process = %tracked.handle.logical_name,
                        "Failed to query child status: {}",
                        e
                    );
                }
            }
        }

        finished
            .into_iter()
            .filter_map(|(pid, code)| {
                let mut tracked = self.entries.remove(&pid)?;
                let observed_in = tracked.handle.state;
                tracked.handle.transition(ProcessState::Exited);
                Some(ExitRecord {
                    pid,
                    logical_name: tracked.handle.logical_name,
                    code,
                    observed_in,
                })
            })
            .collect()
    }

    /// Drop every remaining entry, returning the handles.
    pub fn abandon_all(&mut self) -> Vec<ProcessHandle> {
        self.entries.drain().map(|(_, t)| t.handle).collect()
    }
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
