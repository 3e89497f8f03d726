//! Signal bridge: turns SIGINT, SIGTERM and SIGQUIT into one shutdown request.
//!
//! [`ShutdownSignal`] is a set-once flag backed by a [`CancellationToken`].
//! Clones share state, so every blocking loop that holds a clone observes the
//! request at its next poll tick. Only the first trigger counts; later
//! triggers (a second Ctrl+C, SIGTERM after SIGINT) are reported as no-ops.

use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Process-wide shutdown request, set at most once.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns `true` only for the call that actually set
    /// the flag.
    pub fn trigger(&self, reason: &str) -> bool {
        let first = self.reason.set(reason.to_string()).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// What caused the shutdown (`"SIGTERM"`, `"SIGINT"`, ...), once set.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Resolves once shutdown has been requested.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}

/// What the bridge does with keyboard-generated signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptPolicy {
    /// SIGINT and SIGQUIT request shutdown like SIGTERM does.
    #[default]
    Shutdown,
    /// SIGINT and SIGQUIT are swallowed. An interactive child sharing the
    /// terminal's foreground group receives them directly; only SIGTERM
    /// stops the session.
    Passthrough,
}

/// Spawn the bridge task. Every received signal is routed to
/// `shutdown.trigger`; repeats are logged and otherwise ignored.
pub fn install(shutdown: ShutdownSignal, policy: InterruptPolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let (mut sigint, mut sigterm, mut sigquit) = match (
                signal(SignalKind::interrupt()),
                signal(SignalKind::terminate()),
                signal(SignalKind::quit()),
            ) {
                (Ok(i), Ok(t), Ok(q)) => (i, t, q),
                (i, t, q) => {
                    let err = [i.err(), t.err(), q.err()]
                        .into_iter()
                        .flatten()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ");
                    tracing::warn!(
                        "Failed to install signal handlers ({}); the process can only be stopped externally",
                        err
                    );
                    return;
                }
            };

            loop {
                let name = tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigquit.recv() => "SIGQUIT",
                };
                if policy == InterruptPolicy::Passthrough && name != "SIGTERM" {
                    tracing::debug!(signal = name, "Leaving {} to the foreground child", name);
                    continue;
                }
                route(&shutdown, name);
            }
        }

        #[cfg(not(unix))]
        let _ = policy;
        #[cfg(not(unix))]
        loop {
            match tokio::signal::ctrl_c().await {
                Ok(()) => route(&shutdown, "CTRL_C"),
                Err(e) => {
                    tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
            }
        }
    })
}

fn route(shutdown: &ShutdownSignal, name: &str) {
    if shutdown.trigger(name) {
        tracing::info!(signal = name, "Received {}, shutting down", name);
    } else {
        tracing::warn!(
            signal = name,
            "Received {} but shutdown is already in progress",
            name
        );
    }
}
