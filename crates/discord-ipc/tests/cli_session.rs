#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/dipc-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("mock socket did not appear at {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
    // bind and listen happen back to back; give listen a moment.
    thread::sleep(Duration::from_millis(50));
}

/// A mock endpoint serving a single client.
struct Mock {
    child: Child,
    dir: PathBuf,
    path: PathBuf,
}

impl Mock {
    fn start(tag: &str, extra: &[&str]) -> Self {
        let dir = unique_temp_dir(tag);
        let path = dir.join("discord-ipc-0");

        let child = Command::new(env!("CARGO_BIN_EXE_discord-ipc"))
            .args(["--log-level", "error", "mock"])
            .arg(&path)
            .arg("--once")
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("mock command should start");

        wait_for_socket(&path, Duration::from_secs(3));
        Self { child, dir, path }
    }

    fn client(&self, args: &[&str]) -> Output {
        self.client_with_timeout(args, "3s")
    }

    fn client_with_timeout(&self, args: &[&str], timeout: &str) -> Output {
        let (command, rest) = args.split_first().expect("a subcommand");
        Command::new(env!("CARGO_BIN_EXE_discord-ipc"))
            .args(["--log-level", "error", "--format", "json", "--client-id", "1234"])
            .arg(command)
            .arg(&self.path)
            .args(["--timeout", timeout])
            .args(rest)
            .env_remove("DISCORD_CLIENT_ID")
            .output()
            .expect("client command should run")
    }
}

impl Drop for Mock {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn handshake_prints_ready_payload() {
    let mock = Mock::start("ready", &[]);
    let output = mock.client(&["handshake"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("\"kind\":\"handshake\""));
    assert!(out.contains("\"evt\":\"READY\""));
}

#[test]
fn rejected_client_id_exits_10() {
    let mock = Mock::start("reject", &["--reject-id"]);
    let output = mock.client(&["handshake"]);

    assert_eq!(output.status.code(), Some(10));
    assert!(stderr(&output).contains("1234"));
}

#[test]
fn handshake_error_record_exits_10() {
    let mock = Mock::start(
        "errcode",
        &["--error-code", "4001", "--error-message", "Try later"],
    );
    let output = mock.client(&["handshake"]);

    assert_eq!(output.status.code(), Some(10));
    let err = stderr(&output);
    assert!(err.contains("4001"));
    assert!(err.contains("Try later"));
}

#[test]
fn send_wait_prints_the_reply() {
    let mock = Mock::start("echo", &[]);
    let output = mock.client(&[
        "send",
        "--json",
        r#"{"cmd":"SUBSCRIBE","nonce":"1","args":{},"evt":"GUILD_STATUS"}"#,
        "--wait",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("\"opcode_name\":\"FRAME\""));
    assert!(out.contains("\"cmd\":\"SUBSCRIBE\""));
    assert!(out.contains("\"evt\":\"GUILD_STATUS\""));
}

#[test]
fn strip_nulls_removes_members_before_sending() {
    let mock = Mock::start("strip", &[]);
    let output = mock.client(&[
        "send",
        "--json",
        r#"{"cmd":"SET_ACTIVITY","nonce":"2","args":{"pid":1,"activity":null}}"#,
        "--strip-nulls",
        "--wait",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("\"pid\":1"));
    assert!(!out.contains("activity"));
}

#[test]
fn error_event_exits_11() {
    let mock = Mock::start("errevt", &["--error-event", "Unknown command"]);
    let output = mock.client(&["send", "--json", r#"{"cmd":"BOGUS","nonce":"3"}"#, "--wait"]);

    assert_eq!(output.status.code(), Some(11));
    assert!(stderr(&output).contains("Unknown command"));
}

#[test]
fn listen_stops_after_count() {
    let mock = Mock::start("listen", &["--emit", "3"]);
    let output = mock.client(&["listen", "--count", "2"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert_eq!(out.lines().count(), 2);
    assert!(out.lines().all(|line| line.contains("\"evt\":\"MOCK_EVENT\"")));
}

#[test]
fn listen_with_zero_count_prints_nothing() {
    let mock = Mock::start("listen-zero", &["--emit", "1"]);
    let output = mock.client(&["listen", "--count", "0"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).is_empty());
}

#[test]
fn huge_timeout_still_connects() {
    let mock = Mock::start("huge-timeout", &[]);
    let output = mock.client_with_timeout(&["handshake"], "18446744073709551615s");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("\"evt\":\"READY\""));
}
