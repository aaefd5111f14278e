//! Exit status and stderr of the `zknode` binary.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

mod common;

fn zknode() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_zknode"));
    command.env_remove("RUST_LOG").env_remove("ZKNODE_LOG");
    command
}

#[test]
fn test_port_conflict_prints_trace_and_exits_zero() {
    let holder = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let output = zknode()
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("startup failed"), "stderr: {}", stderr);
    assert!(stderr.contains("caused by"), "stderr: {}", stderr);
}

#[test]
fn test_fail_on_error_exits_nonzero() {
    let holder = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let output = zknode()
        .args(["--host", "127.0.0.1", "--port", &port.to_string(), "--fail-on-error"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("startup failed"));
}

#[test]
fn test_missing_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = zknode()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not load configuration"), "stderr: {}", stderr);
}

#[test]
fn test_happy_path_serves_without_diagnostic() {
    let port = common::free_port();
    let mut child = zknode()
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let reply = loop {
        if let Ok(mut stream) = TcpStream::connect(("127.0.0.1", port)) {
            use std::io::Write;
            stream.write_all(b"ruok").unwrap();
            let mut reply = String::new();
            let _ = stream.read_to_string(&mut reply);
            break reply;
        }
        assert!(Instant::now() < deadline, "server never came up");
        std::thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(reply, "imok");

    child.kill().unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.stderr.is_empty(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}
