//! Daemon server runtime.
//!
//! Layout: the main thread runs the event loop, an accept thread hands each
//! connection to its own thread, and connection threads only talk to the loop
//! through [`LoopSender`].

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{debug, error, info, warn};

use crate::adapters::rpc::{self, RpcRequest, RpcResponse, methods};
use crate::adapters::{ChannelExitSink, SinkMessage};
use crate::app::daemon::event_loop::{self, LoopExit, LoopSettings};
use crate::app::daemon::transport::{TransportError, UnixSocketConnection, UnixSocketListener};
use crate::common::error_codes;
use crate::common::telemetry;
use crate::common::DaemonError;
use crate::infra::daemon::{DaemonConfig, LockFile, SignalHandler, lock_path_for, remove_lock_file};
use crate::infra::ipc::socket_path;
use crate::infra::terminal::PtyTerminalHost;
use crate::usecases::Application;
use crate::usecases::ports::{LoopEvent, LoopSender, Query, loop_channel};

static CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const LOOP_REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// State shared by the accept thread and every connection thread.
struct ServerContext {
    events: LoopSender,
    started: Instant,
    max_connections: usize,
    active_connections: AtomicUsize,
    stopping: AtomicBool,
}

/// One unit of the connection cap, returned on drop.
struct ConnectionSlot<'a> {
    active: &'a AtomicUsize,
}

impl Drop for ConnectionSlot<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ServerContext {
    fn new(events: LoopSender, max_connections: usize) -> Self {
        Self {
            events,
            started: Instant::now(),
            max_connections,
            active_connections: AtomicUsize::new(0),
            stopping: AtomicBool::new(false),
        }
    }

    /// Posts a query and waits for the loop's answer. `None` once the loop is gone.
    fn ask<T>(&self, make: impl FnOnce(Sender<T>) -> LoopEvent) -> Option<T> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if !self.events.post(make(tx)) {
            return None;
        }
        rx.recv_timeout(LOOP_REPLY_TIMEOUT).ok()
    }

    fn route(&self, request: &RpcRequest) -> RpcResponse {
        let id = request.id;
        match request.method.as_str() {
            methods::PING => rpc::ping_response(id),
            methods::SESSIONS => match self.ask(|reply| LoopEvent::Query(Query::Sessions(reply))) {
                Some(sessions) => rpc::sessions_response(id, sessions),
                None => rpc::shutting_down_response(id),
            },
            methods::STATUS => match self.ask(|reply| LoopEvent::Query(Query::Status(reply))) {
                Some(snapshot) => {
                    let uptime_ms =
                        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    rpc::status_response(id, snapshot, uptime_ms)
                }
                None => rpc::shutting_down_response(id),
            },
            methods::CLOSE => {
                let (session, answer) = match rpc::parse_close_input(request) {
                    Ok(input) => input,
                    Err(response) => return response,
                };
                let target = session.clone();
                match self.ask(|reply| LoopEvent::CloseRequested {
                    session: target,
                    prompt: Box::new(answer),
                    reply,
                }) {
                    Some(outcome) => rpc::close_outcome_to_response(id, &session, outcome),
                    None => rpc::shutting_down_response(id),
                }
            }
            methods::SHUTDOWN => {
                if !self.events.post(LoopEvent::Shutdown) {
                    debug!("Shutdown requested after loop exit");
                }
                rpc::shutdown_response(id)
            }
            other => RpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                &format!("Method not found: {other}"),
            ),
        }
    }

    /// Serves `activate`: acceptance as soon as the session exists, then the exit
    /// status once it is torn down. Both answers go to the same connection.
    ///
    /// An accepted session gives its connection slot back, so the cap bounds
    /// pending requests and not open sessions.
    fn serve_activation(
        &self,
        conn: &mut UnixSocketConnection,
        request: &RpcRequest,
        slot: ConnectionSlot<'_>,
    ) {
        let id = request.id;
        let invocation = match rpc::parse_activate_input(request) {
            Ok(invocation) => invocation,
            Err(response) => {
                let _ = conn.write_response(&response);
                return;
            }
        };

        let (sink, replies) = ChannelExitSink::new();
        let posted = self.events.post(LoopEvent::Invocation {
            request: invocation,
            sink: Box::new(sink),
        });
        if !posted {
            let _ = conn.write_response(&rpc::shutting_down_response(id));
            return;
        }

        let session = match replies.recv() {
            Ok(SinkMessage::Accepted(session)) => session,
            Ok(SinkMessage::Exited(status)) => {
                warn!(exit_status = status.code(), "Exit status arrived before acceptance");
                let _ = conn.write_response(&rpc::exit_status_response(id, status));
                return;
            }
            Err(_) => {
                debug!("Invocation dropped by a stopping loop");
                let _ = conn.write_response(&rpc::shutting_down_response(id));
                return;
            }
        };

        drop(slot);
        if let Err(err) = conn.write_response(&rpc::accepted_response(id, &session)) {
            debug!(session = %session, error = %err, "Client left before acceptance");
            return;
        }

        let status = loop {
            match replies.recv() {
                Ok(SinkMessage::Exited(status)) => break Some(status),
                Ok(SinkMessage::Accepted(_)) => continue,
                Err(_) => break None,
            }
        };
        let response = match status {
            Some(status) => rpc::exit_status_response(id, status),
            None => RpcResponse::error(
                id,
                error_codes::GENERIC_ERROR,
                "Session ended without an exit status",
            ),
        };
        if let Err(err) = conn.write_response(&response) {
            debug!(session = %session, error = %err, "Client left before exit status");
        }
    }

    fn handle_client(&self, mut conn: UnixSocketConnection, slot: ConnectionSlot<'_>) {
        let conn_id = CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let conn_span = tracing::info_span!("daemon_connection", conn_id);
        let _conn_guard = conn_span.enter();
        debug!("Client connected");

        if let Err(err) = conn.set_read_timeout(Some(IDLE_TIMEOUT)) {
            warn!(error = %err, "Failed to set read timeout");
        }
        if let Err(err) = conn.set_write_timeout(Some(WRITE_TIMEOUT)) {
            warn!(error = %err, "Failed to set write timeout");
        }

        loop {
            let request = match conn.read_request() {
                Ok(req) => req,
                Err(TransportError::ConnectionClosed) | Err(TransportError::Timeout) => break,
                Err(TransportError::SizeLimit { max_bytes }) => {
                    warn!(max_bytes, "Request size limit exceeded");
                    let response = RpcResponse::error(
                        0,
                        error_codes::PARSE_ERROR,
                        &format!("Parse error: request size limit exceeded ({max_bytes} bytes max)"),
                    );
                    let _ = conn.write_response(&response);
                    break;
                }
                Err(TransportError::Parse(err)) => {
                    debug!(error = %err, "Request parse error");
                    let response = RpcResponse::error(
                        0,
                        error_codes::PARSE_ERROR,
                        &format!("Parse error: {err}"),
                    );
                    let _ = conn.write_response(&response);
                    continue;
                }
                Err(TransportError::Io(err)) => {
                    error!(error = %err, "Client connection error");
                    break;
                }
            };

            let request_span = tracing::debug_span!(
                "rpc_request",
                request_id = request.id,
                method = %request.method
            );
            let _request_guard = request_span.enter();
            let start = Instant::now();

            if request.method == methods::ACTIVATE {
                self.serve_activation(&mut conn, &request, slot);
                break;
            }

            let response = self.route(&request);
            debug!(
                elapsed_ms = start.elapsed().as_millis(),
                "RPC request handled"
            );
            if let Err(err) = conn.write_response(&response) {
                if !matches!(err, TransportError::ConnectionClosed) {
                    error!(error = %err, "Client write error");
                }
                break;
            }
        }

        debug!("Client disconnected");
    }
}

fn spawn_connection(ctx: &Arc<ServerContext>, mut conn: UnixSocketConnection) {
    let active = ctx.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
    if active > ctx.max_connections {
        ctx.active_connections.fetch_sub(1, Ordering::Relaxed);
        warn!(max = ctx.max_connections, "Connection limit reached");
        let response = RpcResponse::domain_error(
            0,
            error_codes::DAEMON_ERROR,
            "Too many connections",
            Some(format!(
                "Retry shortly or raise {}",
                crate::infra::daemon::MAX_CONNECTIONS_ENV
            )),
        );
        let _ = conn.write_response(&response);
        return;
    }

    let ctx_for_thread = Arc::clone(ctx);
    let spawned = thread::Builder::new()
        .name("daemon-conn".to_string())
        .spawn(move || {
            let slot = ConnectionSlot {
                active: &ctx_for_thread.active_connections,
            };
            ctx_for_thread.handle_client(conn, slot);
        });
    if let Err(err) = spawned {
        // The closure, and with it the connection, was dropped.
        ctx.active_connections.fetch_sub(1, Ordering::Relaxed);
        error!(error = %err, "Failed to spawn connection thread");
    }
}

fn run_accept_loop(listener: UnixSocketListener, ctx: Arc<ServerContext>) {
    loop {
        let accepted = listener.accept();
        if ctx.stopping.load(Ordering::Relaxed) {
            break;
        }
        match accepted {
            Ok(conn) => spawn_connection(&ctx, conn),
            Err(TransportError::ConnectionClosed | TransportError::Timeout) => {}
            Err(err) => {
                error!(error = %err, "Error accepting connection");
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }
    debug!("Accept loop stopped");
}

fn bind_socket(socket: &Path, max_request_bytes: usize) -> Result<UnixSocketListener, DaemonError> {
    if socket.exists() {
        std::fs::remove_file(socket)
            .map_err(|e| DaemonError::SocketBind(format!("remove stale socket: {e}")))?;
    }
    UnixSocketListener::bind(socket, max_request_bytes)
        .map_err(|e| DaemonError::SocketBind(format!("bind {}: {e}", socket.display())))
}

fn stop_accept_loop(socket: &Path, ctx: &ServerContext, handle: JoinHandle<()>) {
    ctx.stopping.store(true, Ordering::Relaxed);
    // Wake the blocking accept so it sees the flag.
    let _ = UnixStream::connect(socket);
    if handle.join().is_err() {
        warn!("Accept thread panicked");
    }
}

fn cleanup(socket: &Path, lock_path: &Path) {
    if socket.exists() {
        let _ = std::fs::remove_file(socket);
    }
    remove_lock_file(lock_path);
}

/// A daemon bound to one socket path. Holds the lock file for its lifetime.
pub struct DaemonServer {
    socket: PathBuf,
    lock_path: PathBuf,
    config: DaemonConfig,
    handle_signals: bool,
}

impl DaemonServer {
    pub fn new(socket: PathBuf, config: DaemonConfig) -> Self {
        let lock_path = lock_path_for(&socket);
        Self {
            socket,
            lock_path,
            config,
            handle_signals: true,
        }
    }

    /// Leaves SIGINT/SIGTERM alone, for daemons embedded in a test process.
    pub fn without_signal_handler(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    pub fn run(self) -> Result<LoopExit, DaemonError> {
        let _lock = LockFile::acquire(&self.lock_path)?;
        let listener = bind_socket(&self.socket, self.config.max_request_bytes())?;
        info!(
            socket = %self.socket.display(),
            pid = std::process::id(),
            "Daemon started"
        );

        let (events, rx) = loop_channel();
        let _signal_handler = if self.handle_signals {
            Some(SignalHandler::setup(events.clone())?)
        } else {
            None
        };

        let ctx = Arc::new(ServerContext::new(
            events.clone(),
            self.config.max_connections(),
        ));
        let accept_ctx = Arc::clone(&ctx);
        let accept_handle = thread::Builder::new()
            .name("daemon-accept".to_string())
            .spawn(move || run_accept_loop(listener, accept_ctx))
            .map_err(|e| DaemonError::Thread(e.to_string()))?;

        let host = PtyTerminalHost::new(self.config.cols(), self.config.rows());
        let mut app = Application::new(host, events);
        let exit = event_loop::run(
            &mut app,
            &rx,
            LoopSettings {
                linger: self.config.linger(),
                shutdown_grace: self.config.shutdown_grace(),
            },
        );
        info!(?exit, "Event loop finished");

        stop_accept_loop(&self.socket, &ctx, accept_handle);
        cleanup(&self.socket, &self.lock_path);
        // Queued invocations are dropped with the receiver; their clients get a retryable error.
        drop(rx);
        drop(app);

        info!("Daemon shutdown complete");
        Ok(exit)
    }
}

pub fn start_daemon() -> Result<(), DaemonError> {
    let _telemetry = telemetry::init_tracing("info");
    DaemonServer::new(socket_path(), DaemonConfig::from_env()).run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rpc::{ActivateAccepted, CloseResult, ExitReport, SessionsResult};
    use crate::infra::ipc::{ClientError, DaemonClient};
    use serde_json::json;
    use tempfile::TempDir;

    struct TestDaemon {
        _dir: TempDir,
        socket: PathBuf,
        handle: JoinHandle<Result<LoopExit, DaemonError>>,
    }

    fn start(config: DaemonConfig) -> TestDaemon {
        let dir = TempDir::new_in("/tmp").unwrap();
        let socket = dir.path().join("termgate.sock");
        let server = DaemonServer::new(socket.clone(), config).without_signal_handler();
        let handle = thread::spawn(move || server.run());
        let deadline = Instant::now() + Duration::from_secs(5);
        while !crate::infra::ipc::is_daemon_running(&socket) {
            assert!(Instant::now() < deadline, "daemon did not start");
            thread::sleep(Duration::from_millis(10));
        }
        TestDaemon {
            _dir: dir,
            socket,
            handle,
        }
    }

    fn config() -> DaemonConfig {
        DaemonConfig::from_env()
            .with_linger(Duration::ZERO)
            .with_shutdown_grace(Duration::from_secs(2))
    }

    fn activate_params(command: &str) -> serde_json::Value {
        json!({
            "command": command,
            "env": {"PATH": "/usr/bin:/bin", "SHELL": "/bin/sh"},
            "cwd": "/tmp",
        })
    }

    #[test]
    fn ping_and_status_answer() {
        let daemon = start(config());
        let client = DaemonClient::connect(&daemon.socket).unwrap();

        assert_eq!(client.call(methods::PING, None).unwrap()["pong"], true);
        let status = client.call(methods::STATUS, None).unwrap();
        assert_eq!(status["session_count"], 0);
        assert_eq!(status["pid"], std::process::id());

        client.call(methods::SHUTDOWN, None).unwrap();
        assert_eq!(daemon.handle.join().unwrap().unwrap(), LoopExit::Shutdown);
        assert!(!daemon.socket.exists());
    }

    #[test]
    fn activation_reports_child_exit_then_daemon_goes_idle() {
        let daemon = start(config());
        let client = DaemonClient::connect(&daemon.socket).unwrap();

        let mut stream = client
            .call_stream(methods::ACTIVATE, Some(activate_params("exit 3")))
            .unwrap();
        let accepted: ActivateAccepted = serde_json::from_value(stream.first().clone()).unwrap();
        assert!(accepted.accepted);
        assert_eq!(accepted.session_id.len(), 8);

        let report: ExitReport =
            serde_json::from_value(stream.next_result().unwrap().unwrap()).unwrap();
        assert_eq!(report.exit_status, 3);

        assert_eq!(daemon.handle.join().unwrap().unwrap(), LoopExit::Idle);
        assert!(!daemon.socket.exists());
        assert!(!lock_path_for(&daemon.socket).exists());
    }

    #[test]
    fn missing_program_reports_127() {
        let daemon = start(config());
        let client = DaemonClient::connect(&daemon.socket).unwrap();

        let mut stream = client
            .call_stream(
                methods::ACTIVATE,
                Some(json!({"env": {"PATH": "/usr/bin:/bin"}, "cwd": "/tmp"})),
            )
            .unwrap();
        let report: ExitReport =
            serde_json::from_value(stream.next_result().unwrap().unwrap()).unwrap();
        assert_eq!(report.exit_status, 127);
        daemon.handle.join().unwrap().unwrap();
    }

    #[test]
    fn close_with_yes_hangs_up_the_child() {
        let daemon = start(config());
        let client = DaemonClient::connect(&daemon.socket).unwrap();

        let mut stream = client
            .call_stream(methods::ACTIVATE, Some(activate_params("sleep 30")))
            .unwrap();
        let accepted: ActivateAccepted = serde_json::from_value(stream.first().clone()).unwrap();

        let listed: SessionsResult =
            serde_json::from_value(client.call(methods::SESSIONS, None).unwrap()).unwrap();
        assert_eq!(listed.sessions.len(), 1);
        assert_eq!(listed.sessions[0].id.as_str(), accepted.session_id);

        let closed: CloseResult = serde_json::from_value(
            client
                .call(
                    methods::CLOSE,
                    Some(json!({"session": accepted.session_id, "yes": true})),
                )
                .unwrap(),
        )
        .unwrap();
        assert_eq!(closed.outcome, "proceeding");

        let report: ExitReport =
            serde_json::from_value(stream.next_result().unwrap().unwrap()).unwrap();
        assert_eq!(report.exit_status, 129);
        daemon.handle.join().unwrap().unwrap();
    }

    #[test]
    fn open_sessions_do_not_count_against_the_connection_cap() {
        let daemon = start(config().with_max_connections(3));
        let client = DaemonClient::connect(&daemon.socket).unwrap();

        let mut streams = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let stream = client
                .call_stream(methods::ACTIVATE, Some(activate_params("sleep 30")))
                .unwrap();
            let accepted: ActivateAccepted =
                serde_json::from_value(stream.first().clone()).unwrap();
            ids.push(accepted.session_id);
            streams.push(stream);
        }

        let listed: SessionsResult =
            serde_json::from_value(client.call(methods::SESSIONS, None).unwrap()).unwrap();
        assert_eq!(listed.sessions.len(), 4);

        for id in &ids {
            client
                .call(methods::CLOSE, Some(json!({"session": id, "yes": true})))
                .unwrap();
        }
        for mut stream in streams {
            let report: ExitReport =
                serde_json::from_value(stream.next_result().unwrap().unwrap()).unwrap();
            assert_eq!(report.exit_status, 129);
        }
        daemon.handle.join().unwrap().unwrap();
    }

    #[test]
    fn unknown_session_and_method_are_errors() {
        let daemon = start(config());
        let client = DaemonClient::connect(&daemon.socket).unwrap();

        let err = client
            .call(methods::CLOSE, Some(json!({"session": "nope"})))
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::RpcError { code, .. } if code == error_codes::SESSION_NOT_FOUND
        ));

        let err = client.call("bogus", None).unwrap_err();
        assert!(matches!(
            err,
            ClientError::RpcError { code, .. } if code == error_codes::METHOD_NOT_FOUND
        ));

        client.call(methods::SHUTDOWN, None).unwrap();
        daemon.handle.join().unwrap().unwrap();
    }

    #[test]
    fn second_daemon_on_same_socket_is_refused() {
        let daemon = start(config());
        let second = DaemonServer::new(daemon.socket.clone(), config()).without_signal_handler();
        assert!(matches!(second.run(), Err(DaemonError::AlreadyRunning)));

        let client = DaemonClient::connect(&daemon.socket).unwrap();
        client.call(methods::SHUTDOWN, None).unwrap();
        daemon.handle.join().unwrap().unwrap();
    }
}
