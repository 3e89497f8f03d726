use async_trait::async_trait;
use entrygate::dispatch::ModeContext;
use entrygate::{
    CommandModeEntry, Dependency, Dispatcher, Error, ModeHandler, ModeKind, ModeTable, Settings,
    ShutdownSignal,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Counts invocations and records the arguments it was given.
#[derive(Default)]
struct SpyHandler {
    calls: AtomicUsize,
    last_args: parking_lot::Mutex<Vec<String>>,
}

#[async_trait]
impl ModeHandler for SpyHandler {
    async fn run(&self, _ctx: &ModeContext<'_>, args: &[String]) -> entrygate::Result<i32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock() = args.to_vec();
        Ok(0)
    }
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn settings(vars: &[(&str, String)]) -> Settings {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Settings::from_lookup(|key| map.get(key).cloned()).unwrap()
}

fn dispatcher_with_spy(settings: Settings, spy: Arc<SpyHandler>) -> Dispatcher {
    let mut table = ModeTable::builtin();
    table.insert(
        CommandModeEntry::new("worker", ModeKind::LongRunning, spy)
            .aliases(["celery"])
            .depends_on([Dependency::Database, Dependency::Broker]),
    );
    Dispatcher::new(settings, ShutdownSignal::new())
        .with_table(table)
        .without_signal_bridge()
}

#[tokio::test]
async fn worker_handler_never_runs_when_its_dependency_is_down() {
    let port = closed_port().await;
    let spy = Arc::new(SpyHandler::default());
    let dispatcher = dispatcher_with_spy(
        settings(&[
            ("DATABASE_URL", format!("postgres://app@127.0.0.1:{}/app", port)),
            ("WAIT_TIMEOUT", "600ms".to_string()),
            ("WAIT_INTERVAL", "200ms".to_string()),
        ]),
        spy.clone(),
    );

    let err = dispatcher.dispatch("worker", &[]).await.unwrap_err();

    assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    match &err {
        Error::DependencyUnavailable { mode, targets, exit_code } => {
            assert_eq!(mode, "worker");
            assert_eq!(targets, &vec![format!("127.0.0.1:{}", port)]);
            assert_eq!(*exit_code, 1);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn retry_exhaustion_propagates_code_three() {
    let port = closed_port().await;
    let spy = Arc::new(SpyHandler::default());
    let dispatcher = dispatcher_with_spy(
        settings(&[
            ("DATABASE_URL", format!("postgres://127.0.0.1:{}/app", port)),
            ("WAIT_RETRIES", "2".to_string()),
            ("WAIT_INTERVAL", "100ms".to_string()),
        ]),
        spy.clone(),
    );

    let err = dispatcher.dispatch("celery", &[]).await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn handler_runs_once_dependencies_are_ready() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let spy = Arc::new(SpyHandler::default());
    let dispatcher = dispatcher_with_spy(
        settings(&[("REDIS_URL", format!("redis://127.0.0.1:{}/0", port))]),
        spy.clone(),
    );

    let code = dispatcher
        .dispatch("worker", &["-Q".to_string(), "high".to_string()])
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*spy.last_args.lock(), vec!["-Q", "high"]);
    acceptor.abort();
}

#[tokio::test]
async fn disabled_dependency_is_not_waited_for() {
    let port = closed_port().await;
    let spy = Arc::new(SpyHandler::default());
    let dispatcher = dispatcher_with_spy(
        settings(&[
            ("DATABASE_URL", format!("postgres://127.0.0.1:{}/app", port)),
            ("WAIT_FOR_DB", "false".to_string()),
        ]),
        spy.clone(),
    );

    assert_eq!(dispatcher.dispatch("worker", &[]).await.unwrap(), 0);
    assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn health_reports_failure_without_retrying() {
    let port = closed_port().await;
    let dispatcher = Dispatcher::new(
        settings(&[("DATABASE_URL", format!("postgres://127.0.0.1:{}/app", port))]),
        ShutdownSignal::new(),
    )
    .without_signal_bridge();

    let code = dispatcher.dispatch("health", &["--json".to_string()]).await.unwrap();
    assert_eq!(code, 3);

    let err = dispatcher
        .dispatch("healthcheck", &["--yaml".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn version_mode_needs_no_dependencies() {
    let dispatcher = Dispatcher::new(settings(&[]), ShutdownSignal::new()).without_signal_bridge();
    assert_eq!(dispatcher.dispatch("--version", &[]).await.unwrap(), 0);
    assert_eq!(dispatcher.supervisor().tracked_count(), 0);
}
