//! Integration tests for the tool session.
//!
//! These tests drive a real child process (the mock MCP server binary)
//! through the full protocol flow.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use caravel_mcp::{McpError, ToolSession, ToolSessionConfig};
use serde_json::json;

/// Get the path to the mock MCP server binary.
fn mock_server_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates
    path.pop(); // workspace root
    path.push("target");
    path.push(if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    });
    path.push("mock-mcp-server");
    path
}

fn mock_server_exists() -> bool {
    mock_server_path().exists()
}

fn mock_config() -> ToolSessionConfig {
    ToolSessionConfig::new("mock", mock_server_path().to_string_lossy().to_string())
        .with_launch_timeout(Duration::from_secs(10))
        .with_call_timeout(Duration::from_secs(5))
        .with_shutdown_grace(Duration::from_millis(500))
}

#[tokio::test]
async fn open_completes_the_handshake() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built. Run `cargo build -p caravel-mcp` first.");
        return;
    }

    let session = ToolSession::open(mock_config()).await.expect("open failed");

    let info = session.server_info().expect("no server info");
    assert_eq!(info.name, "mock-mcp-server");
    assert_eq!(info.version, "1.0.0");

    // The tool set is negotiated once, during the handshake.
    let names: Vec<_> = session.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "add", "never", "crash"]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn call_tool_round_trips() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let session = ToolSession::open(mock_config()).await.unwrap();

    let result = session
        .call_tool("echo", Some(json!({"message": "Hello, MCP!"})))
        .await
        .unwrap();
    assert!(!result.is_error());
    assert_eq!(result.text(), "Hello, MCP!");

    let result = session
        .call_tool("add", Some(json!({"a": 5, "b": 7})))
        .await
        .unwrap();
    assert_eq!(result.text(), "12");

    session.close().await.unwrap();
}

#[tokio::test]
async fn unknown_tool_is_an_error_result_not_a_crash() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let session = ToolSession::open(mock_config()).await.unwrap();

    let result = session.call_tool("nonexistent", Some(json!({}))).await.unwrap();
    assert!(result.is_error());
    assert!(result.text().contains("Unknown tool"));

    // The session is still healthy afterwards.
    let result = session
        .call_tool("echo", Some(json!({"message": "still here"})))
        .await
        .unwrap();
    assert_eq!(result.text(), "still here");

    session.close().await.unwrap();
}

#[tokio::test]
async fn unresponsive_tool_times_out_and_session_survives() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let config = mock_config().with_call_timeout(Duration::from_millis(500));
    let session = ToolSession::open(config).await.unwrap();

    let started = Instant::now();
    let err = session
        .call_tool("never", Some(json!({})))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, McpError::Timeout));
    assert!(!err.is_fatal());
    assert!(
        elapsed >= Duration::from_millis(400) && elapsed < Duration::from_secs(3),
        "timeout fired at {elapsed:?}"
    );

    // Subsequent invocations on the same session still work.
    let result = session
        .call_tool("echo", Some(json!({"message": "alive"})))
        .await
        .unwrap();
    assert_eq!(result.text(), "alive");

    session.close().await.unwrap();
}

#[tokio::test]
async fn server_crash_is_fatal() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let session = ToolSession::open(mock_config()).await.unwrap();

    let err = session.call_tool("crash", Some(json!({}))).await.unwrap_err();
    assert!(err.is_fatal(), "expected fatal error, got {err:?}");

    session.close().await.unwrap();
}

#[tokio::test]
async fn close_is_idempotent() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let session = ToolSession::open(mock_config()).await.unwrap();
    assert!(session.is_connected().await);

    session.close().await.unwrap();
    assert!(session.is_closed());
    assert!(!session.is_connected().await);

    // Second close is a no-op, not an error.
    session.close().await.unwrap();

    // Invocations after close are rejected cleanly.
    let err = session.call_tool("echo", Some(json!({}))).await.unwrap_err();
    assert!(matches!(err, McpError::Closed));
}

#[cfg(unix)]
#[tokio::test]
async fn launch_timeout_bounds_a_silent_process() {
    // `sleep` never speaks MCP, so the handshake can only time out.
    let config = ToolSessionConfig::new("silent", "sleep")
        .with_arg("30")
        .with_launch_timeout(Duration::from_millis(300))
        .with_call_timeout(Duration::from_millis(200))
        .with_shutdown_grace(Duration::from_millis(200));

    let started = Instant::now();
    let err = ToolSession::open(config).await.unwrap_err();

    assert!(matches!(err, McpError::Handshake(_)));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "launch timeout did not bound the handshake"
    );
}
