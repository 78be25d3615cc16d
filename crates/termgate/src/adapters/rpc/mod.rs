//! JSON-RPC methods served by the daemon, their parameters and result shapes.

pub mod params;
pub mod types;

pub use types::{ErrorData, RpcRequest, RpcResponse, RpcServerError};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::common::error_codes;
use crate::domain::{ExitStatus, InvocationRequest, SessionId, SessionInfo};
use crate::usecases::ports::{CloseOutcome, PresetAnswer, StatusSnapshot};

pub mod methods {
    /// Two answers on one connection: acceptance, then the session's exit status.
    pub const ACTIVATE: &str = "activate";
    pub const SESSIONS: &str = "sessions";
    pub const CLOSE: &str = "close";
    pub const STATUS: &str = "status";
    pub const SHUTDOWN: &str = "shutdown";
    pub const PING: &str = "ping";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateAccepted {
    pub accepted: bool,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExitReport {
    pub exit_status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResult {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub pid: u32,
    pub version: String,
    pub commit: String,
    pub uptime_ms: u64,
    pub hold_count: usize,
    pub session_count: usize,
    pub shutting_down: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseResult {
    pub session_id: String,
    pub outcome: String,
}

fn invalid_params(id: u64, err: impl std::fmt::Display) -> RpcResponse {
    RpcResponse::error(
        id,
        error_codes::INVALID_PARAMS,
        &format!("Invalid params: {err}"),
    )
}

#[allow(clippy::result_large_err)]
pub fn parse_activate_input(request: &RpcRequest) -> Result<InvocationRequest, RpcResponse> {
    let rpc_params: params::ActivateParams = request
        .params
        .as_ref()
        .ok_or_else(|| RpcResponse::error(request.id, error_codes::INVALID_PARAMS, "Missing params"))
        .and_then(|p| serde_json::from_value(p.clone()).map_err(|e| invalid_params(request.id, e)))?;

    if rpc_params.cwd.trim().is_empty() {
        return Err(invalid_params(request.id, "cwd must not be empty"));
    }
    Ok(rpc_params.into())
}

#[allow(clippy::result_large_err)]
pub fn parse_close_input(request: &RpcRequest) -> Result<(SessionId, PresetAnswer), RpcResponse> {
    let rpc_params: params::CloseParams = request
        .params
        .as_ref()
        .ok_or_else(|| RpcResponse::error(request.id, error_codes::INVALID_PARAMS, "Missing params"))
        .and_then(|p| serde_json::from_value(p.clone()).map_err(|e| invalid_params(request.id, e)))?;

    let session = rpc_params.session.trim();
    if session.is_empty() {
        return Err(invalid_params(request.id, "session must not be empty"));
    }
    let answer = PresetAnswer::from_flag(rpc_params.yes.then_some(true));
    Ok((SessionId::new(session), answer))
}

pub fn accepted_response(id: u64, session: &SessionId) -> RpcResponse {
    RpcResponse::success_json(
        id,
        &ActivateAccepted {
            accepted: true,
            session_id: session.to_string(),
        },
    )
}

pub fn exit_status_response(id: u64, status: ExitStatus) -> RpcResponse {
    RpcResponse::success_json(
        id,
        &ExitReport {
            exit_status: status.code(),
        },
    )
}

pub fn sessions_response(id: u64, sessions: Vec<SessionInfo>) -> RpcResponse {
    RpcResponse::success_json(id, &SessionsResult { sessions })
}

pub fn status_response(id: u64, snapshot: StatusSnapshot, uptime_ms: u64) -> RpcResponse {
    RpcResponse::success_json(
        id,
        &StatusResult {
            pid: std::process::id(),
            version: env!("TERMGATE_VERSION").to_string(),
            commit: env!("TERMGATE_GIT_SHA").to_string(),
            uptime_ms,
            hold_count: snapshot.hold_count,
            session_count: snapshot.session_count,
            shutting_down: snapshot.shutting_down,
        },
    )
}

pub fn close_outcome_to_response(id: u64, session: &SessionId, outcome: CloseOutcome) -> RpcResponse {
    match outcome {
        CloseOutcome::NotFound => session_not_found_response(id, session),
        CloseOutcome::Proceeding | CloseOutcome::Cancelled => RpcResponse::success_json(
            id,
            &CloseResult {
                session_id: session.to_string(),
                outcome: outcome.as_str().to_string(),
            },
        ),
    }
}

pub fn session_not_found_response(id: u64, session: &SessionId) -> RpcResponse {
    RpcResponse::domain_error(
        id,
        error_codes::SESSION_NOT_FOUND,
        &format!("Session not found: {session}"),
        Some("Run 'termgate sessions' to list open sessions.".to_string()),
    )
}

pub fn shutting_down_response(id: u64) -> RpcResponse {
    RpcResponse::domain_error(
        id,
        error_codes::SHUTTING_DOWN,
        "Daemon is shutting down",
        Some("Retry; a new daemon starts on the next launch.".to_string()),
    )
}

pub fn shutdown_response(id: u64) -> RpcResponse {
    RpcResponse::success(id, json!({ "acknowledged": true }))
}

pub fn ping_response(id: u64) -> RpcResponse {
    RpcResponse::success(id, json!({ "pong": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::ports::{ConfirmAnswer, ConfirmPrompt};
    use serde_json::Value;

    fn make_request(method: &str, params: Option<Value>) -> RpcRequest {
        RpcRequest::new(1, method.to_string(), params)
    }

    fn parsed(response: &RpcResponse) -> Value {
        serde_json::from_str(&response.to_line()).unwrap()
    }

    #[test]
    fn parse_activate_keeps_client_environment() {
        let request = make_request(
            methods::ACTIVATE,
            Some(json!({"command": "ls -la", "env": {"SHELL": "/bin/zsh"}, "cwd": "/tmp"})),
        );
        let input = parse_activate_input(&request).unwrap();
        assert_eq!(input.command.as_deref(), Some("ls -la"));
        assert_eq!(input.shell(), Some("/bin/zsh"));
        assert_eq!(input.cwd, std::path::PathBuf::from("/tmp"));
    }

    #[test]
    fn parse_activate_without_command_or_env() {
        let request = make_request(methods::ACTIVATE, Some(json!({"cwd": "/"})));
        let input = parse_activate_input(&request).unwrap();
        assert_eq!(input.command, None);
        assert!(input.env.is_empty());
    }

    #[test]
    fn parse_activate_rejects_missing_params() {
        let err = parse_activate_input(&make_request(methods::ACTIVATE, None)).unwrap_err();
        assert_eq!(parsed(&err)["error"]["code"], error_codes::INVALID_PARAMS);

        let err = parse_activate_input(&make_request(methods::ACTIVATE, Some(json!({"cwd": ""}))))
            .unwrap_err();
        assert_eq!(parsed(&err)["error"]["code"], error_codes::INVALID_PARAMS);
    }

    #[test]
    fn parse_close_maps_yes_flag_to_answer() {
        let request = make_request(methods::CLOSE, Some(json!({"session": "s1", "yes": true})));
        let (session, mut answer) = parse_close_input(&request).unwrap();
        assert_eq!(session.as_str(), "s1");
        assert_eq!(answer.ask("close?"), ConfirmAnswer::Yes);

        let request = make_request(methods::CLOSE, Some(json!({"session": "s1"})));
        let (_, mut answer) = parse_close_input(&request).unwrap();
        assert_eq!(answer.ask("close?"), ConfirmAnswer::Dismissed);
    }

    #[test]
    fn activate_answers_have_wire_shape() {
        let accepted = parsed(&accepted_response(3, &SessionId::new("ab12cd34")));
        assert_eq!(accepted["result"]["accepted"], true);
        assert_eq!(accepted["result"]["session_id"], "ab12cd34");

        let exited = parsed(&exit_status_response(3, ExitStatus::new(127)));
        assert_eq!(exited["id"], 3);
        assert_eq!(exited["result"]["exit_status"], 127);
    }

    #[test]
    fn close_not_found_is_an_error() {
        let session = SessionId::new("gone");
        let resp = close_outcome_to_response(1, &session, CloseOutcome::NotFound);
        assert!(!resp.is_success());
        assert_eq!(parsed(&resp)["error"]["data"]["category"], "not_found");

        let resp = close_outcome_to_response(1, &session, CloseOutcome::Cancelled);
        assert_eq!(parsed(&resp)["result"]["outcome"], "cancelled");
    }

    #[test]
    fn shutting_down_is_retryable_on_the_wire() {
        let resp = parsed(&shutting_down_response(9));
        assert_eq!(resp["error"]["code"], error_codes::SHUTTING_DOWN);
        assert_eq!(resp["error"]["data"]["retryable"], true);
    }

    #[test]
    fn status_reports_counts() {
        let snapshot = StatusSnapshot {
            hold_count: 2,
            session_count: 2,
            shutting_down: false,
        };
        let resp = parsed(&status_response(1, snapshot, 1500));
        let status: StatusResult = serde_json::from_value(resp["result"].clone()).unwrap();
        assert_eq!(status.hold_count, 2);
        assert_eq!(status.uptime_ms, 1500);
        assert_eq!(status.pid, std::process::id());
    }
}
