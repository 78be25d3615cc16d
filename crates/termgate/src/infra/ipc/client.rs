#![expect(
    clippy::print_stderr,
    reason = "CLI status messages during daemon autostart"
)]

//! IPC client implementation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::common::Colors;
use crate::common::error_codes;
use crate::infra::ipc::error::ClientError;
use crate::infra::ipc::transport::{ClientConnection, is_daemon_running, start_daemon_background};

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct DaemonClientConfig {
    read_timeout: Duration,
    write_timeout: Duration,
    max_retries: u32,
    initial_retry_delay: Duration,
}

impl Default for DaemonClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(100),
        }
    }
}

impl DaemonClientConfig {
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn initial_retry_delay(&self) -> Duration {
        self.initial_retry_delay
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }
}

#[derive(Debug, Serialize)]
struct Request {
    jsonrpc: String,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(rename = "jsonrpc")]
    _jsonrpc: String,
    #[serde(rename = "id")]
    _id: u64,
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

fn response_to_result(response: Response) -> Result<Value, ClientError> {
    if let Some(rpc_error) = response.error {
        let (category, retryable, suggestion) = match rpc_error.data.as_ref() {
            Some(data) => (
                data.get("category")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<error_codes::ErrorCategory>().ok()),
                data.get("retryable")
                    .and_then(Value::as_bool)
                    .unwrap_or_else(|| error_codes::is_retryable(rpc_error.code)),
                data.get("suggestion")
                    .and_then(Value::as_str)
                    .map(String::from),
            ),
            None => (
                Some(error_codes::category_for_code(rpc_error.code)),
                error_codes::is_retryable(rpc_error.code),
                None,
            ),
        };

        return Err(ClientError::RpcError {
            code: rpc_error.code,
            message: rpc_error.message,
            category,
            retryable,
            suggestion,
        });
    }

    response.result.ok_or(ClientError::InvalidResponse)
}

fn read_response(connection: &mut ClientConnection) -> Result<Value, ClientError> {
    let line = connection
        .read_message()?
        .ok_or(ClientError::InvalidResponse)?;
    trace!(bytes = line.len(), "RPC response received");
    let response: Response = serde_json::from_str(&line)?;
    response_to_result(response)
}

/// A request whose answers keep arriving on the same connection.
///
/// The first result has already been read. Later reads block without a timeout:
/// for `activate` the second answer only comes when the session ends.
pub struct StreamResponse {
    connection: ClientConnection,
    first: Value,
}

impl StreamResponse {
    pub fn first(&self) -> &Value {
        &self.first
    }

    /// Next result, or `None` once the daemon closed the connection.
    pub fn next_result(&mut self) -> Result<Option<Value>, ClientError> {
        let Some(line) = self.connection.read_message()? else {
            return Ok(None);
        };
        let response: Response = serde_json::from_str(&line)?;
        response_to_result(response).map(Some)
    }
}

impl Drop for StreamResponse {
    fn drop(&mut self) {
        let _ = self.connection.shutdown();
    }
}

pub struct DaemonClient {
    socket: PathBuf,
    config: DaemonClientConfig,
}

impl DaemonClient {
    /// Checks that the daemon answers before handing out a client.
    pub fn connect(socket: &Path) -> Result<Self, ClientError> {
        let connection = ClientConnection::connect(socket)?;
        drop(connection);
        Ok(Self {
            socket: socket.to_path_buf(),
            config: DaemonClientConfig::default(),
        })
    }

    pub fn with_config(mut self, config: DaemonClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn config(&self) -> &DaemonClientConfig {
        &self.config
    }

    fn send(&self, method: &str, params: Option<Value>) -> Result<ClientConnection, ClientError> {
        let request_id = REQUEST_ID.fetch_add(1, Ordering::SeqCst);
        let mut connection = ClientConnection::connect(&self.socket)?;
        connection.set_read_timeout(Some(self.config.read_timeout()))?;
        connection.set_write_timeout(Some(self.config.write_timeout()))?;

        let request = Request {
            jsonrpc: "2.0".to_string(),
            id: request_id,
            method: method.to_string(),
            params,
        };
        let request_json = serde_json::to_string(&request)?;
        trace!(
            request_id,
            bytes = request_json.len(),
            "RPC request serialized"
        );
        connection.send_message(&request_json)?;
        Ok(connection)
    }

    pub fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let start = Instant::now();
        debug!(method = %method, "RPC call started");
        let mut connection = self.send(method, params)?;
        let result = read_response(&mut connection);
        debug!(
            method = %method,
            elapsed_ms = start.elapsed().as_millis(),
            "RPC call finished"
        );
        result
    }

    pub fn call_stream(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<StreamResponse, ClientError> {
        debug!(method = %method, "RPC stream started");
        let mut connection = self.send(method, params)?;
        let first = read_response(&mut connection)?;
        connection.set_read_timeout(None)?;
        Ok(StreamResponse { connection, first })
    }
}

/// Connects to the daemon at `socket`, starting one in the background when none answers.
pub fn ensure_daemon(socket: &Path) -> Result<DaemonClient, ClientError> {
    debug!(socket = %socket.display(), "Ensuring daemon is running");
    if !is_daemon_running(socket) {
        debug!("Daemon not running, attempting autostart");
        eprintln!("{} Starting daemon in background...", Colors::dim("Note:"));
        start_daemon_background(socket)?;
    }
    DaemonClient::connect(socket)
}
