//! Tool session lifecycle and correlated request/response handling.
//!
//! A [`ToolSession`] owns exactly one external tool process. Opening it
//! spawns the process and completes the MCP handshake under a launch
//! timeout; closing it is idempotent and guarantees the process is gone.
//!
//! A dedicated reader task owns the process's stdout and routes every framed
//! response to the pending call with the matching correlation id, so
//! responses may arrive in any order. Each call waits on its own oneshot
//! under the per-call timeout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerInfo, ToolInfo,
};
use crate::transport;

/// In-flight requests awaiting their correlated response.
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for a tool session.
#[derive(Debug, Clone)]
pub struct ToolSessionConfig {
    /// Display name for this server.
    pub name: String,
    /// Command to spawn.
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables to set.
    pub env: Vec<(String, String)>,
    /// Bound on spawn + handshake.
    pub launch_timeout: Duration,
    /// Bound on a single call.
    pub call_timeout: Duration,
    /// How long to wait for a graceful exit before killing.
    pub shutdown_grace: Duration,
}

impl ToolSessionConfig {
    /// Create a new config for the given command.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            launch_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(2),
        }
    }

    /// Set the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the launch timeout.
    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A session over one external tool process.
pub struct ToolSession {
    config: ToolSessionConfig,
    child: tokio::sync::Mutex<Option<Child>>,
    stdin: tokio::sync::Mutex<Option<BufWriter<ChildStdin>>>,
    pending: Pending,
    reader: Mutex<Option<JoinHandle<()>>>,
    request_id: AtomicU64,
    server_info: Option<ServerInfo>,
    tools: Vec<ToolInfo>,
    closed: AtomicBool,
}

impl ToolSession {
    /// Spawn the tool process and complete the handshake.
    ///
    /// The whole sequence — spawn, `initialize`, `notifications/initialized`,
    /// `tools/list` — is bounded by the launch timeout. On any failure the
    /// process is torn down before the error is returned, so the caller
    /// never holds a half-open session.
    pub async fn open(config: ToolSessionConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            McpError::spawn_failed(format!("failed to spawn '{}': {}", config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(BufReader::new(stdout), Arc::clone(&pending)));

        let launch_timeout = config.launch_timeout;
        let mut session = Self {
            config,
            child: tokio::sync::Mutex::new(Some(child)),
            stdin: tokio::sync::Mutex::new(Some(BufWriter::new(stdin))),
            pending,
            reader: Mutex::new(Some(reader)),
            request_id: AtomicU64::new(1),
            server_info: None,
            tools: Vec::new(),
            closed: AtomicBool::new(false),
        };

        match tokio::time::timeout(launch_timeout, session.handshake()).await {
            Ok(Ok(())) => Ok(session),
            Ok(Err(e)) => {
                let _ = session.close().await;
                Err(McpError::Handshake(e.to_string()))
            }
            Err(_) => {
                let _ = session.close().await;
                Err(McpError::Handshake(format!(
                    "did not complete within {launch_timeout:?}"
                )))
            }
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        let params = InitializeParams::default();
        let result = self
            .send_request("initialize", Some(serde_json::to_value(&params)?))
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        self.send_notification("notifications/initialized", None)
            .await?;

        let listed = self.send_request("tools/list", None).await?;
        let list: ListToolsResult = serde_json::from_value(listed)?;

        tracing::info!(
            server = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            tool_count = list.tools.len(),
            "tool session initialized"
        );

        self.server_info = Some(init.server_info);
        self.tools = list.tools;
        Ok(())
    }

    /// Display name of this session.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Server identity from the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Tools negotiated during the handshake.
    pub fn tools(&self) -> &[ToolInfo] {
        &self.tools
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the process is still running.
    pub async fn is_connected(&self) -> bool {
        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Invoke a tool and wait for its correlated result.
    ///
    /// A timeout yields [`McpError::Timeout`] and leaves the session open;
    /// the invocation is not retried here — surfacing the failure is the
    /// caller's job.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result = self
            .send_request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;
        let call_result: CallToolResult = serde_json::from_value(result)?;

        if call_result.is_error() {
            tracing::warn!(server = %self.config.name, tool = %name, "tool call returned error");
        } else {
            tracing::debug!(server = %self.config.name, tool = %name, "tool call succeeded");
        }

        Ok(call_result)
    }

    /// Send a request and wait for its correlated response.
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().unwrap();
            if pending.contains_key(&id) {
                return Err(McpError::CorrelationConflict(id));
            }
            pending.insert(id, tx);
        }

        let request = JsonRpcRequest::new(id, method, params);
        if let Err(e) = self.write_message(&serde_json::to_value(&request)?).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.call_timeout, rx).await {
            Ok(Ok(response)) => response
                .into_result()
                .map_err(|e| McpError::server_error(e.code, e.message, e.data)),
            // The reader dropped our sender: stdout closed underneath us.
            Ok(Err(_)) => Err(McpError::ConnectionClosed),
            Err(_) => {
                // Expired calls leave no trace in the table; the id is free
                // for the reader to ignore if a late response shows up.
                self.pending.lock().unwrap().remove(&id);
                Err(McpError::Timeout)
            }
        }
    }

    /// Send a notification (no response expected).
    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        let notification = JsonRpcNotification::new(method, params);
        self.write_message(&serde_json::to_value(&notification)?)
            .await
    }

    async fn write_message(&self, message: &Value) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(McpError::Closed)?;
        transport::write_frame(stdin, message).await
    }

    /// Shut the session down.
    ///
    /// Idempotent: the first call tears the process down, every later call
    /// is a no-op. Closing drops stdin so a well-behaved server exits on
    /// EOF, waits up to the grace period, then kills.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::info!(server = %self.config.name, "closing tool session");

        if let Some(handle) = self.reader.lock().unwrap().take() {
            handle.abort();
        }
        self.pending.lock().unwrap().clear();

        self.stdin.lock().await.take();

        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(
                        server = %self.config.name,
                        grace_ms = self.config.shutdown_grace.as_millis() as u64,
                        "process did not exit in time, killing"
                    );
                    let _ = child.kill().await;
                }
            }
        }
        *guard = None;

        Ok(())
    }
}

/// Route framed responses to their pending calls until stdout closes.
///
/// On EOF or a transport fault every pending sender is dropped, which every
/// waiting call observes as [`McpError::ConnectionClosed`].
async fn read_loop<R>(mut reader: BufReader<R>, pending: Pending)
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        match transport::read_frame(&mut reader).await {
            Ok(Some(body)) => match serde_json::from_str::<JsonRpcResponse>(&body) {
                Ok(response) => {
                    let sender = pending.lock().unwrap().remove(&response.id);
                    match sender {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => {
                            tracing::debug!(id = response.id, "response for expired request");
                        }
                    }
                }
                // Server-initiated requests and notifications are not
                // responses; this client has nothing to do with them.
                Err(_) => tracing::debug!("skipping non-response message"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "transport read failed");
                break;
            }
        }
    }

    pending.lock().unwrap().clear();
}
