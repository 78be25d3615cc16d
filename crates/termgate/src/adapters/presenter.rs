#![expect(clippy::print_stdout, reason = "CLI output is emitted here")]
#![expect(clippy::print_stderr, reason = "CLI output is emitted here")]

//! CLI output presenter.

use clap::ValueEnum;
use serde_json::json;

use crate::adapters::rpc::{CloseResult, StatusResult};
use crate::common::Colors;
use crate::domain::{SessionInfo, SessionPhase};

const PROGRAM_NAME: &str = "termgate";

/// Output format for CLI commands
#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct ClientErrorView {
    pub message: String,
    pub suggestion: Option<String>,
    pub retryable: bool,
}

pub trait Presenter {
    fn present_success(&self, message: &str);

    fn present_info(&self, message: &str);

    fn present_client_error(&self, error: &ClientErrorView);

    fn present_sessions(&self, sessions: &[SessionInfo]);

    fn present_status(&self, status: &StatusResult);

    fn present_close(&self, result: &CloseResult);
}

pub fn create_presenter(format: OutputFormat) -> Box<dyn Presenter> {
    match format {
        OutputFormat::Json => Box::new(JsonPresenter),
        OutputFormat::Text => Box::new(TextPresenter),
    }
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

pub fn session_line(session: &SessionInfo) -> String {
    let phase = match session.phase {
        SessionPhase::Running => Colors::success(session.phase.as_str()),
        SessionPhase::Pending => Colors::warning(session.phase.as_str()),
        SessionPhase::TornDown => Colors::dim(session.phase.as_str()),
    };
    let pid = session
        .pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} - {} [{}] pid:{} cwd:{} since {}",
        Colors::session_id(session.id.as_str()),
        session.command,
        phase,
        pid,
        session.cwd,
        session.started_at.format("%H:%M:%S")
    )
}

pub struct TextPresenter;

impl Presenter for TextPresenter {
    fn present_success(&self, message: &str) {
        println!("{} {}", Colors::success("✓"), message);
    }

    fn present_info(&self, message: &str) {
        println!("{}", Colors::dim(message));
    }

    fn present_client_error(&self, error: &ClientErrorView) {
        eprintln!(
            "{}: {} {}",
            PROGRAM_NAME,
            Colors::error("Error:"),
            error.message
        );
        if let Some(suggestion) = error.suggestion.as_deref() {
            eprintln!("{} {}", Colors::dim("Suggestion:"), suggestion);
        }
        if error.retryable {
            eprintln!(
                "{}",
                Colors::dim("(This error may be transient - retry may succeed)")
            );
        }
    }

    fn present_sessions(&self, sessions: &[SessionInfo]) {
        if sessions.is_empty() {
            self.present_info("No open sessions");
            return;
        }
        println!("{}", Colors::bold("Open sessions:"));
        for session in sessions {
            println!("  {}", session_line(session));
        }
    }

    fn present_status(&self, status: &StatusResult) {
        println!("{}", Colors::bold("Daemon status:"));
        println!("  pid: {}", status.pid);
        println!("  version: {} ({})", status.version, status.commit);
        println!("  uptime: {}s", status.uptime_ms / 1000);
        println!("  sessions: {}", status.session_count);
        println!("  holds: {}", status.hold_count);
        if status.shutting_down {
            println!("  {}", Colors::warning("shutting down"));
        }
    }

    fn present_close(&self, result: &CloseResult) {
        match result.outcome.as_str() {
            "cancelled" => println!(
                "{} Close of {} cancelled",
                Colors::warning("Note:"),
                Colors::session_id(&result.session_id)
            ),
            _ => self.present_success(&format!(
                "Closing session {}",
                Colors::session_id(&result.session_id)
            )),
        }
    }
}

pub struct JsonPresenter;

impl Presenter for JsonPresenter {
    fn present_success(&self, message: &str) {
        print_json(&json!({ "success": true, "message": message }));
    }

    fn present_info(&self, message: &str) {
        print_json(&json!({ "info": message }));
    }

    fn present_client_error(&self, error: &ClientErrorView) {
        let mut output = json!({
            "success": false,
            "error": error.message,
            "retryable": error.retryable,
        });
        if let Some(suggestion) = error.suggestion.as_ref() {
            output["suggestion"] = json!(suggestion);
        }
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    }

    fn present_sessions(&self, sessions: &[SessionInfo]) {
        print_json(&json!({ "sessions": sessions }));
    }

    fn present_status(&self, status: &StatusResult) {
        print_json(&serde_json::to_value(status).unwrap_or_default());
    }

    fn present_close(&self, result: &CloseResult) {
        print_json(&serde_json::to_value(result).unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SessionId, WindowId};

    fn info(phase: SessionPhase, pid: Option<u32>) -> SessionInfo {
        SessionInfo {
            id: SessionId::new("ab12cd34"),
            window: WindowId(1),
            phase,
            pid,
            command: "/bin/sh -c 'ls -la'".to_string(),
            cwd: "/tmp".to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn session_line_shows_pid_or_dash() {
        crate::common::color_init(true);
        let running = session_line(&info(SessionPhase::Running, Some(4242)));
        assert!(running.contains("ab12cd34"));
        assert!(running.contains("pid:4242"));
        assert!(running.contains("running"));

        let pending = session_line(&info(SessionPhase::Pending, None));
        assert!(pending.contains("pid:-"));
    }

    #[test]
    fn presenters_do_not_panic() {
        let sessions = vec![info(SessionPhase::Running, Some(1))];
        let status = StatusResult {
            pid: 1,
            version: "0.1.0".into(),
            commit: "abc".into(),
            uptime_ms: 10,
            hold_count: 1,
            session_count: 1,
            shutting_down: true,
        };
        let close = CloseResult {
            session_id: "ab12cd34".into(),
            outcome: "cancelled".into(),
        };
        for format in [OutputFormat::Text, OutputFormat::Json] {
            let presenter = create_presenter(format);
            presenter.present_sessions(&sessions);
            presenter.present_sessions(&[]);
            presenter.present_status(&status);
            presenter.present_close(&close);
            presenter.present_client_error(&ClientErrorView {
                message: "boom".into(),
                suggestion: Some("try again".into()),
                retryable: true,
            });
        }
    }
}
