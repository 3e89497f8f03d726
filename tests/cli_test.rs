use std::net::TcpListener;
use std::process::{Command, Output};
use std::thread;

fn wait_for_binary() -> &'static str {
    env!("CARGO_BIN_EXE_wait-for")
}

fn entrygate_binary() -> &'static str {
    env!("CARGO_BIN_EXE_entrygate")
}

fn wait_for(args: &[&str]) -> Output {
    Command::new(wait_for_binary())
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("LOG_LEVEL")
        .output()
        .expect("Failed to run wait-for")
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// A listener that keeps accepting on a background thread for the life of the test.
fn open_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            drop(stream);
        }
    });
    port
}

#[test]
fn invalid_target_exits_two() {
    let output = wait_for(&["db:99999"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("kind=\"invalid_argument\"") || stderr.contains("invalid_argument"), "{}", stderr);
}

#[test]
fn host_without_port_exits_two() {
    let output = wait_for(&["-h", "db"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn missing_targets_exit_two() {
    let output = wait_for(&[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn help_is_long_only() {
    let output = wait_for(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--host"));
    assert!(stdout.contains("--parallel"));
}

#[test]
fn unreachable_target_times_out_with_exit_one() {
    let target = format!("127.0.0.1:{}", closed_port());
    let output = wait_for(&[&target, "-t", "1", "-i", "0.25"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connection_timeout"), "{}", stderr);
    assert!(stderr.contains(&target), "{}", stderr);
}

#[test]
fn exhausted_retries_exit_three() {
    let target = format!("127.0.0.1:{}", closed_port());
    let output = wait_for(&[&target, "-r", "2", "-i", "0.1"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn ready_target_runs_command() {
    let target = format!("127.0.0.1:{}", open_port());
    let output = wait_for(&[&target, "-q", "--", "sh", "-c", "echo started"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("started"));
}

#[test]
fn failing_command_is_ignored_unless_strict() {
    let target = format!("127.0.0.1:{}", open_port());

    let relaxed = wait_for(&[&target, "-q", "--", "sh", "-c", "exit 3"]);
    assert_eq!(relaxed.status.code(), Some(0));

    let strict = wait_for(&[&target, "-q", "-s", "--", "sh", "-c", "exit 3"]);
    assert_eq!(strict.status.code(), Some(4));
    let stderr = String::from_utf8_lossy(&strict.stderr);
    assert!(stderr.contains("downstream_command_failed"), "{}", stderr);
}

#[test]
fn quiet_success_writes_nothing() {
    let target = format!("127.0.0.1:{}", open_port());
    let output = wait_for(&[&target, "-q"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty(), "{}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn quiet_flag_overrides_log_level_env() {
    let target = format!("127.0.0.1:{}", open_port());
    for (key, value) in [("LOG_LEVEL", "info"), ("RUST_LOG", "debug")] {
        let output = Command::new(wait_for_binary())
            .args([target.as_str(), "-q"])
            .env_remove("RUST_LOG")
            .env_remove("LOG_LEVEL")
            .env(key, value)
            .output()
            .expect("Failed to run wait-for");
        assert_eq!(output.status.code(), Some(0));
        assert!(
            output.stderr.is_empty(),
            "{}={} leaked logs: {}",
            key,
            value,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

#[test]
fn entrygate_version_mode() {
    let output = Command::new(entrygate_binary())
        .arg("version")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run entrygate");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("entrygate "), "{}", stdout);
}

#[test]
fn entrygate_unknown_mode_exits_two() {
    let output = Command::new(entrygate_binary())
        .arg("entrygate-not-a-mode")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run entrygate");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn entrygate_bad_setting_exits_two() {
    let output = Command::new(entrygate_binary())
        .arg("health")
        .env("WAIT_PARALLEL", "sometimes")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run entrygate");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn entrygate_runs_executables_as_fallback() {
    let output = Command::new(entrygate_binary())
        .args(["-q", "sh", "-c", "exit 6"])
        .env_remove("RUST_LOG")
        .env("SKIP_WAIT", "true")
        .output()
        .expect("Failed to run entrygate");
    assert_eq!(output.status.code(), Some(6));
}
