//! Integration tests for `agent-channel listen`

#![cfg(unix)]

use assert_cmd::cargo;
use predicates::prelude::*;
use std::io::Write;
use std::os::unix::net::UnixListener;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn listen_cmd(dir: &TempDir) -> assert_cmd::Command {
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "connect_retries = 0\n").unwrap();

    let mut cmd = cargo::cargo_bin_cmd!("agent-channel");
    cmd.env("AGENT_CHANNEL_HOME", dir.path())
        .arg("--config")
        .arg(&config_path)
        .arg("--peer-socket")
        .arg(dir.path().join("agent.sock"))
        .arg("--client-base")
        .arg(format!("{}/client.sock-", dir.path().display()))
        .arg("listen");
    cmd
}

#[test]
fn test_listen_reports_connect_and_agent_hangup() {
    let dir = TempDir::new().unwrap();
    let listener = UnixListener::bind(dir.path().join("agent.sock")).unwrap();
    let agent = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(b"ok\x1e").unwrap();
        thread::sleep(Duration::from_millis(100));
    });

    listen_cmd(&dir)
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::eq("connected\ndisconnected\n"));

    agent.join().unwrap();
}

#[test]
fn test_listen_stops_after_duration() {
    let dir = TempDir::new().unwrap();
    let listener = UnixListener::bind(dir.path().join("agent.sock")).unwrap();
    let agent = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(b"ok\x1e").unwrap();
        // Hold the connection open until the client leaves
        let mut sink = Vec::new();
        std::io::Read::read_to_end(&mut stream, &mut sink).unwrap();
    });

    listen_cmd(&dir)
        .args(["--duration-secs", "1"])
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::eq("connected\ndisconnected\n"));

    agent.join().unwrap();
}
