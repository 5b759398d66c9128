//! Launcher behavior against real child processes.
//!
//! Shell one-liners stand in for plugin binaries: printing a line to stdout
//! is the whole handshake contract.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::time::{sleep, Duration, Instant};

use groundwork_foundation::{DiagSink, HostError, LogEntry};
use groundwork_host::launcher::{launch, LaunchOptions};

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingSink {
    fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }
}

impl DiagSink for RecordingSink {
    fn log(&self, entry: LogEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

fn shell(name: &str, script: &str) -> LaunchOptions {
    LaunchOptions {
        name: name.to_string(),
        path: PathBuf::from("/bin/sh"),
        args: vec!["-c".to_string(), script.to_string()],
        env: HashMap::new(),
        handshake_timeout: Duration::from_millis(500),
        shutdown_timeout: Duration::from_millis(300),
    }
}

#[tokio::test]
async fn handshake_line_becomes_the_address() {
    let sink = Arc::new(RecordingSink::default());
    let plugin = launch(shell("fake", "echo 45991; exec sleep 30"), sink)
        .await
        .unwrap();
    assert_eq!(plugin.address(), "127.0.0.1:45991");
    plugin.close().await.unwrap();
}

#[tokio::test]
async fn close_kills_a_lingering_process_and_is_idempotent() {
    let sink = Arc::new(RecordingSink::default());
    let plugin = launch(shell("fake", "echo 45992; exec sleep 600"), sink)
        .await
        .unwrap();

    let start = Instant::now();
    plugin.close().await.unwrap();
    // Graceful wait (300ms) plus the kill, with margin.
    assert!(start.elapsed() < Duration::from_secs(5));

    plugin.close().await.unwrap();
}

#[tokio::test]
async fn missing_binary_is_a_start_failure() {
    let sink = Arc::new(RecordingSink::default());
    let mut options = shell("ghost", "true");
    options.path = PathBuf::from("/nonexistent/plugin-binary");
    let err = launch(options, sink).await.unwrap_err();
    assert!(matches!(err, HostError::PluginStartFailed { .. }));
}

#[tokio::test]
async fn early_exit_is_a_crash() {
    let sink = Arc::new(RecordingSink::default());
    let err = launch(shell("fake", "exit 3"), sink).await.unwrap_err();
    assert!(matches!(err, HostError::PluginCrashed { .. }));
}

#[tokio::test]
async fn silent_plugin_fails_the_handshake() {
    let sink = Arc::new(RecordingSink::default());
    let err = launch(shell("fake", "exec sleep 30"), sink)
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::HandshakeFailed { .. }));
}

#[tokio::test]
async fn malformed_handshake_line_fails() {
    let sink = Arc::new(RecordingSink::default());
    let err = launch(shell("fake", "echo not-a-port; exec sleep 30"), sink)
        .await
        .unwrap_err();
    match err {
        HostError::HandshakeFailed { reason, .. } => assert!(reason.contains("not-a-port")),
        other => panic!("expected handshake failure, got {other:?}"),
    }
}

#[tokio::test]
async fn output_streams_are_forwarded_with_the_plugin_name() {
    let sink = Arc::new(RecordingSink::default());
    let plugin = launch(
        shell(
            "chatty",
            "echo 45993; echo making progress; echo oops >&2; exec sleep 30",
        ),
        sink.clone(),
    )
    .await
    .unwrap();

    // Forwarding runs on background tasks; poll for it.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let messages = sink.messages();
        if messages.iter().any(|m| m == "chatty: making progress")
            && messages.iter().any(|m| m == "chatty: oops")
        {
            break;
        }
        assert!(Instant::now() < deadline, "forwarded output never arrived: {messages:?}");
        sleep(Duration::from_millis(20)).await;
    }

    plugin.close().await.unwrap();
}
