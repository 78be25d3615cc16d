#![expect(clippy::print_stdout, reason = "CLI output is emitted here")]
#![expect(clippy::print_stderr, reason = "CLI output is emitted here")]

//! CLI application layer and composition root wiring.

use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap_complete::generate;
use serde_json::json;
use tracing::debug;

pub mod commands;
pub mod daemon;

use crate::adapters::rpc::params::{ActivateParams, CloseParams};
use crate::adapters::rpc::{ActivateAccepted, CloseResult, ExitReport, SessionsResult, StatusResult, methods};
use crate::adapters::{ClientErrorView, OutputFormat, Presenter, create_presenter};
use crate::app::commands::{Cli, Commands, DaemonCommand};
use crate::app::daemon::start_daemon;
use crate::common::{Colors, DaemonError, color_init, telemetry};
use crate::domain::InvocationRequest;
use crate::infra::daemon::{lock_path_for, read_lock_pid};
use crate::infra::ipc::{
    ClientError, DaemonClient, ensure_daemon, is_daemon_running, socket_path,
    start_daemon_background,
};

const PROGRAM_NAME: &str = "termgate";

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Exit codes following sysexits.h and LSB init script conventions.
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    /// LSB: program is not running (for `daemon status`)
    pub const NOT_RUNNING: i32 = 3;
    pub const IOERR: i32 = 74;
}

pub struct Program;

impl Program {
    pub fn new() -> Self {
        Self
    }

    /// Parses the command line, runs it and returns the process exit code.
    pub fn run(&self) -> Result<i32> {
        let cli = Cli::parse();
        color_init(cli.no_color);

        // The foreground daemon installs its own subscriber at `info`.
        let _telemetry = if cli.is_foreground_daemon() {
            None
        } else {
            Some(telemetry::init_tracing(if cli.verbose {
                "debug"
            } else {
                "warn"
            }))
        };

        let format = cli.effective_format();
        match self.execute(&cli) {
            Ok(code) => Ok(code),
            Err(e) => Ok(self.handle_error(e, format)),
        }
    }

    fn execute(&self, cli: &Cli) -> Result<i32> {
        let presenter = create_presenter(cli.effective_format());
        match &cli.command {
            None => self.invoke(cli.run.clone()),
            Some(Commands::Sessions) => self.list_sessions(presenter.as_ref()),
            Some(Commands::Close { session, yes }) => {
                self.close_session(presenter.as_ref(), session, *yes)
            }
            Some(Commands::Daemon(DaemonCommand::Start { foreground: true })) => {
                start_daemon()?;
                Ok(exit_codes::SUCCESS)
            }
            Some(Commands::Daemon(DaemonCommand::Start { foreground: false })) => {
                let socket = socket_path();
                if is_daemon_running(&socket) {
                    presenter.present_info("Daemon is already running");
                } else {
                    start_daemon_background(&socket)?;
                    presenter.present_success("Daemon started in background");
                }
                Ok(exit_codes::SUCCESS)
            }
            Some(Commands::Daemon(DaemonCommand::Status)) => self.daemon_status(cli, presenter.as_ref()),
            Some(Commands::Daemon(DaemonCommand::Stop)) => self.daemon_stop(presenter.as_ref()),
            Some(Commands::Completions { shell }) => {
                let mut cmd = Cli::command();
                generate(*shell, &mut cmd, PROGRAM_NAME, &mut io::stdout());
                Ok(exit_codes::SUCCESS)
            }
            Some(Commands::Version) => {
                self.print_version(cli.effective_format());
                Ok(exit_codes::SUCCESS)
            }
        }
    }

    /// Hands this launch to the daemon and waits for the session's exit status.
    ///
    /// A daemon that is on its way out refuses new invocations with a retryable
    /// error; the retry then autostarts a fresh one.
    fn invoke(&self, command: Option<String>) -> Result<i32> {
        let (request, skipped) = InvocationRequest::capture(command)
            .context("failed to read the current working directory")?;
        for name in &skipped {
            debug!(variable = %name, "Not forwarding non-UTF-8 environment variable");
        }
        let params = serde_json::to_value(ActivateParams::from(&request))?;
        let socket = socket_path();

        let mut attempt = 0;
        loop {
            let client = ensure_daemon(&socket)?;
            let config = client.config().clone();
            match activate(&client, params.clone()) {
                Ok(status) => return Ok(status),
                Err(err) if err.is_retryable() && attempt < config.max_retries() => {
                    let delay = config.initial_retry_delay() * 2u32.pow(attempt);
                    debug!(attempt, delay_ms = delay.as_millis(), error = %err, "Retrying invocation");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn list_sessions(&self, presenter: &dyn Presenter) -> Result<i32> {
        let client = match DaemonClient::connect(&socket_path()) {
            Ok(client) => client,
            Err(ClientError::DaemonNotRunning) => {
                presenter.present_sessions(&[]);
                return Ok(exit_codes::SUCCESS);
            }
            Err(e) => return Err(e.into()),
        };
        let result: SessionsResult = serde_json::from_value(client.call(methods::SESSIONS, None)?)?;
        presenter.present_sessions(&result.sessions);
        Ok(exit_codes::SUCCESS)
    }

    fn close_session(&self, presenter: &dyn Presenter, session: &str, yes: bool) -> Result<i32> {
        let client = DaemonClient::connect(&socket_path())?;
        let params = serde_json::to_value(CloseParams {
            session: session.to_string(),
            yes,
        })?;
        let result: CloseResult = serde_json::from_value(client.call(methods::CLOSE, Some(params))?)?;
        presenter.present_close(&result);
        if result.outcome == "cancelled" {
            return Ok(exit_codes::GENERAL_ERROR);
        }
        Ok(exit_codes::SUCCESS)
    }

    fn daemon_status(&self, cli: &Cli, presenter: &dyn Presenter) -> Result<i32> {
        let socket = socket_path();
        let status = DaemonClient::connect(&socket).and_then(|c| c.call(methods::STATUS, None));
        match status {
            Ok(value) => {
                let status: StatusResult = serde_json::from_value(value)?;
                presenter.present_status(&status);
                Ok(exit_codes::SUCCESS)
            }
            Err(ClientError::DaemonNotRunning) => {
                let stale_pid = read_lock_pid(&lock_path_for(&socket));
                print_daemon_not_running(cli.effective_format(), &socket, stale_pid);
                Ok(exit_codes::NOT_RUNNING)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn daemon_stop(&self, presenter: &dyn Presenter) -> Result<i32> {
        let socket = socket_path();
        let client = match DaemonClient::connect(&socket) {
            Ok(client) => client,
            Err(ClientError::DaemonNotRunning) => {
                presenter.present_success("Daemon is not running (already stopped)");
                return Ok(exit_codes::SUCCESS);
            }
            Err(e) => return Err(e.into()),
        };
        client.call(methods::SHUTDOWN, None)?;

        let deadline = Instant::now() + STOP_WAIT;
        while is_daemon_running(&socket) {
            if Instant::now() >= deadline {
                eprintln!(
                    "{} Daemon is still closing its sessions",
                    Colors::warning("Warning:")
                );
                return Ok(exit_codes::SUCCESS);
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }
        presenter.present_success("Daemon stopped");
        Ok(exit_codes::SUCCESS)
    }

    fn print_version(&self, format: OutputFormat) {
        let cli_version = env!("TERMGATE_VERSION");
        let cli_commit = env!("TERMGATE_GIT_SHA");
        let daemon = DaemonClient::connect(&socket_path())
            .and_then(|c| c.call(methods::STATUS, None))
            .ok()
            .and_then(|value| serde_json::from_value::<StatusResult>(value).ok());

        match format {
            OutputFormat::Json => {
                let output = json!({
                    "cli_version": cli_version,
                    "cli_commit": cli_commit,
                    "daemon_version": daemon.as_ref().map(|s| s.version.as_str()),
                    "daemon_commit": daemon.as_ref().map(|s| s.commit.as_str()),
                });
                println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            }
            OutputFormat::Text => {
                println!("{} {} ({})", PROGRAM_NAME, cli_version, cli_commit);
                match daemon {
                    Some(status) => {
                        println!("daemon {} ({})", status.version, status.commit);
                        if status.version != cli_version {
                            eprintln!(
                                "{} Run '{}' and relaunch to update the daemon.",
                                Colors::dim("Hint:"),
                                Colors::info("termgate daemon stop")
                            );
                        }
                    }
                    None => println!("daemon {}", Colors::dim("not running")),
                }
            }
        }
    }

    fn handle_error(&self, e: anyhow::Error, format: OutputFormat) -> i32 {
        let presenter = create_presenter(format);
        if let Some(client_error) = find_error::<ClientError>(&e) {
            presenter.present_client_error(&ClientErrorView {
                message: client_error.to_string(),
                suggestion: client_error.suggestion().map(str::to_string),
                retryable: client_error.is_retryable(),
            });
            client_error.exit_code()
        } else if let Some(daemon_error) = find_error::<DaemonError>(&e) {
            presenter.present_client_error(&ClientErrorView {
                message: daemon_error.to_string(),
                suggestion: Some(daemon_error.suggestion()),
                retryable: daemon_error.is_retryable(),
            });
            exit_codes::IOERR
        } else {
            eprintln!("{}: {} {:#}", PROGRAM_NAME, Colors::error("Error:"), e);
            exit_codes::GENERAL_ERROR
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

/// One activation round trip: acceptance, then the blocking wait for the exit status.
fn activate(client: &DaemonClient, params: serde_json::Value) -> Result<i32, ClientError> {
    let mut stream = client.call_stream(methods::ACTIVATE, Some(params))?;
    let accepted: ActivateAccepted = serde_json::from_value(stream.first().clone())?;
    if !accepted.accepted {
        return Err(ClientError::UnexpectedResponse {
            message: "invocation was not accepted".to_string(),
        });
    }
    debug!(session = %accepted.session_id, "Invocation accepted");

    match stream.next_result()? {
        Some(value) => {
            let report: ExitReport = serde_json::from_value(value)?;
            debug!(session = %accepted.session_id, exit_status = report.exit_status, "Session ended");
            Ok(report.exit_status)
        }
        None => Err(ClientError::SessionLost {
            session: accepted.session_id,
        }),
    }
}

fn print_daemon_not_running(format: OutputFormat, socket: &Path, stale_pid: Option<u32>) {
    let cli_version = env!("TERMGATE_VERSION");
    match format {
        OutputFormat::Json => {
            let output = json!({
                "running": false,
                "socket": socket.display().to_string(),
                "stale_pid": stale_pid,
                "cli_version": cli_version,
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!(
                "{} {}",
                Colors::bold("Daemon status:"),
                Colors::error("not running")
            );
            println!("  socket: {}", socket.display());
            if let Some(pid) = stale_pid {
                println!("  {}", Colors::dim(&format!("lock file names pid {pid}")));
            }
            println!("  CLI version: {}", cli_version);
        }
    }
}

fn find_error<T: std::error::Error + 'static>(error: &anyhow::Error) -> Option<&T> {
    error.chain().find_map(|source| source.downcast_ref::<T>())
}
