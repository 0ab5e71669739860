//! Connect retry and backoff behaviour when the agent is not listening

#![cfg(unix)]

use agent_channel_core::{
    AgentChannel, AttemptStatus, ChannelConfig, ChannelError, ConnectionState, PollEventSource,
    Sleeper,
};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Sleeper that records requested waits instead of blocking.
#[derive(Debug, Default)]
struct RecordingSleeper {
    waits: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.waits.push(duration);
    }
}

/// Sleeper that brings the agent up after a number of failed attempts.
struct StartAgentAfter<'a> {
    remaining: usize,
    peer_path: &'a Path,
    listener: Option<UnixListener>,
}

impl Sleeper for StartAgentAfter<'_> {
    fn sleep(&mut self, _duration: Duration) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 && self.listener.is_none() {
            self.listener = Some(UnixListener::bind(self.peer_path).unwrap());
        }
    }
}

fn config_in(dir: &Path) -> ChannelConfig {
    ChannelConfig {
        peer_socket_path: dir.join("agent.sock"),
        client_socket_base: format!("{}/client.sock-", dir.display()),
        ..ChannelConfig::default()
    }
}

fn client_path(config: &ChannelConfig) -> PathBuf {
    config.client_socket_path(std::process::id())
}

#[test]
fn test_connect_gives_up_after_five_retries() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let expected_client_path = client_path(&config);
    let mut channel = AgentChannel::new(PollEventSource::new(), config);
    let mut sleeper = RecordingSleeper::default();

    let err = channel.connect_with(&mut sleeper).unwrap_err();

    assert!(matches!(
        err,
        ChannelError::ConnectRetriesExhausted { retries: 5, .. }
    ));
    let waits_ms: Vec<u128> = sleeper.waits.iter().map(Duration::as_millis).collect();
    assert_eq!(waits_ms, vec![500, 1000, 2000, 4000, 8000]);
    assert_eq!(
        sleeper.waits.iter().sum::<Duration>(),
        Duration::from_millis(15_500)
    );

    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert!(!expected_client_path.exists());
    assert!(channel.event_source().fds().is_empty());
}

#[test]
fn test_connect_succeeds_once_agent_appears() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let peer_path = config.peer_socket_path.clone();
    let mut channel = AgentChannel::new(PollEventSource::new(), config);
    let mut sleeper = StartAgentAfter {
        remaining: 2,
        peer_path: &peer_path,
        listener: None,
    };

    channel.connect_with(&mut sleeper).unwrap();

    assert_eq!(channel.state(), ConnectionState::Connecting);
    assert_eq!(channel.event_source().fds(), &[channel.raw_fd().unwrap()]);
    assert!(sleeper.listener.is_some());
}

#[test]
fn test_custom_backoff_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = ChannelConfig {
        connect_retries: 3,
        initial_backoff_ms: 10,
        ..config_in(temp_dir.path())
    };
    let mut channel = AgentChannel::new(PollEventSource::new(), config);
    let mut sleeper = RecordingSleeper::default();

    assert!(channel.connect_with(&mut sleeper).is_err());
    assert_eq!(
        sleeper.waits,
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(40),
        ]
    );
}

#[test]
fn test_bind_failure_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config = ChannelConfig {
        client_socket_base: format!("{}/missing-dir/client.sock-", temp_dir.path().display()),
        ..config_in(temp_dir.path())
    };
    let mut channel = AgentChannel::new(PollEventSource::new(), config);
    let mut sleeper = RecordingSleeper::default();

    let err = channel.connect_with(&mut sleeper).unwrap_err();
    assert!(matches!(err, ChannelError::Bind { .. }));
    assert!(sleeper.waits.is_empty());
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[test]
fn test_overlong_peer_path_is_not_retried() {
    let temp_dir = TempDir::new().unwrap();
    let config = ChannelConfig {
        peer_socket_path: PathBuf::from(format!("/tmp/{}", "x".repeat(200))),
        ..config_in(temp_dir.path())
    };
    let expected_client_path = client_path(&config);
    let mut channel = AgentChannel::new(PollEventSource::new(), config);
    let mut sleeper = RecordingSleeper::default();

    let err = channel.connect_with(&mut sleeper).unwrap_err();

    assert!(matches!(err, ChannelError::PathTooLong { len: 205, .. }));
    assert!(sleeper.waits.is_empty());
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert!(!expected_client_path.exists());
}

#[test]
fn test_host_driven_attempt() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let peer_path = config.peer_socket_path.clone();
    let mut channel = AgentChannel::new(PollEventSource::new(), config);

    let mut attempt = channel.begin_connect().unwrap().expect("disconnected");
    assert_eq!(
        attempt.attempt().unwrap(),
        AttemptStatus::RetryAfter(Duration::from_millis(500))
    );

    // The channel has not taken the socket yet
    assert_eq!(channel.state(), ConnectionState::Disconnected);

    let _listener = UnixListener::bind(&peer_path).unwrap();
    assert_eq!(attempt.attempt().unwrap(), AttemptStatus::Connected);
    channel.complete_connect(attempt).unwrap();
    assert_eq!(channel.state(), ConnectionState::Connecting);

    // Already active: nothing new to drive
    assert!(channel.begin_connect().unwrap().is_none());
}

#[test]
fn test_second_outstanding_attempt_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let expected_client_path = client_path(&config);
    let _listener = UnixListener::bind(&config.peer_socket_path).unwrap();
    let mut channel = AgentChannel::new(PollEventSource::new(), config);

    let mut attempt = channel.begin_connect().unwrap().expect("disconnected");
    let err = channel.begin_connect().unwrap_err();
    assert!(matches!(err, ChannelError::ConnectPending));
    // The blocking connect is refused too
    assert!(matches!(
        channel.connect_with(&mut RecordingSleeper::default()),
        Err(ChannelError::ConnectPending)
    ));

    assert_eq!(attempt.attempt().unwrap(), AttemptStatus::Connected);
    channel.complete_connect(attempt).unwrap();

    assert_eq!(channel.state(), ConnectionState::Connecting);
    assert_eq!(channel.client_socket_path(), Some(expected_client_path.as_path()));
    assert!(expected_client_path.exists());
}

#[test]
fn test_dropped_attempt_frees_the_slot() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let _listener = UnixListener::bind(&config.peer_socket_path).unwrap();
    let mut channel = AgentChannel::new(PollEventSource::new(), config);

    let abandoned = channel.begin_connect().unwrap().expect("disconnected");
    drop(abandoned);

    let mut attempt = channel.begin_connect().unwrap().expect("slot is free");
    assert_eq!(attempt.attempt().unwrap(), AttemptStatus::Connected);
    channel.complete_connect(attempt).unwrap();
    assert_eq!(channel.state(), ConnectionState::Connecting);
}

#[test]
fn test_complete_connect_rejects_unconnected_attempt() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let expected_client_path = client_path(&config);
    let mut channel = AgentChannel::new(PollEventSource::new(), config);

    let attempt = channel.begin_connect().unwrap().expect("disconnected");
    let err = channel.complete_connect(attempt).unwrap_err();

    assert!(matches!(err, ChannelError::NotConnected));
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert!(!expected_client_path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_connect_async_backs_off_on_tokio_timers() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let expected_client_path = client_path(&config);
    let mut channel = AgentChannel::new(PollEventSource::new(), config);

    let start = tokio::time::Instant::now();
    let err = channel.connect_async().await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, ChannelError::ConnectRetriesExhausted { .. }));
    assert!(elapsed >= Duration::from_millis(15_500));
    assert!(elapsed < Duration::from_millis(16_000));
    assert!(!expected_client_path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_connect_async_connects_to_listening_agent() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let _listener = UnixListener::bind(&config.peer_socket_path).unwrap();
    let mut channel = AgentChannel::new(PollEventSource::new(), config);

    channel.connect_async().await.unwrap();
    assert_eq!(channel.state(), ConnectionState::Connecting);

    channel.connect_async().await.unwrap();
    assert_eq!(channel.event_source().fds().len(), 1);
}
