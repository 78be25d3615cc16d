use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::common::error_codes;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(rename = "jsonrpc")]
    _jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: String, params: Option<Value>) -> Self {
        Self {
            _jsonrpc: "2.0".to_string(),
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    #[serde(rename = "jsonrpc")]
    _jsonrpc: String,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcServerError>,
}

#[derive(Debug, Serialize)]
pub struct RpcServerError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorData {
    pub category: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            _jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn success_json<T: Serialize>(id: u64, result: &T) -> Self {
        let value = serde_json::to_value(result).unwrap_or_else(|_| json!({}));
        Self::success(id, value)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(id: u64, code: i32, message: &str) -> Self {
        Self {
            _jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcServerError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Error carrying the category and retry hint that the client maps to an exit code.
    pub fn domain_error(id: u64, code: i32, message: &str, suggestion: Option<String>) -> Self {
        let data = ErrorData {
            category: error_codes::category_for_code(code).as_str().to_string(),
            retryable: error_codes::is_retryable(code),
            suggestion,
        };
        let mut response = Self::error(id, code, message);
        if let Some(error) = response.error.as_mut() {
            error.data = serde_json::to_value(data).ok();
        }
        response
    }

    /// One JSON line, newline included.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"jsonrpc":"2.0","id":{},"error":{{"code":{},"message":"Failed to serialize response"}}}}"#,
                self.id,
                error_codes::GENERIC_ERROR
            )
        });
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_from_wire() {
        let req: RpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":4,"method":"close","params":{"session":"ab12cd34"}}"#,
        )
        .unwrap();
        assert_eq!(req.id, 4);
        assert_eq!(req.method, "close");
        assert_eq!(req.params.unwrap()["session"], "ab12cd34");
    }

    #[test]
    fn request_without_params() {
        let req: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(req.params.is_none());
    }

    #[test]
    fn plain_error_has_no_data() {
        let resp = RpcResponse::error(2, error_codes::METHOD_NOT_FOUND, "Method not found: x");
        let parsed: Value = serde_json::from_str(&resp.to_line()).unwrap();
        assert_eq!(parsed["error"]["code"], error_codes::METHOD_NOT_FOUND);
        assert!(parsed["error"].get("data").is_none());
        assert!(parsed.get("result").is_none());
    }

    #[test]
    fn success_line_shape() {
        let line = RpcResponse::success(42, json!({"pong": true})).to_line();
        assert!(line.ends_with('\n'));
        let parsed: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["id"], 42);
        assert_eq!(parsed["result"]["pong"], true);
        assert!(parsed.get("error").is_none());
    }

    #[test]
    fn domain_error_carries_category_and_retry() {
        let resp = RpcResponse::domain_error(
            1,
            error_codes::SHUTTING_DOWN,
            "Daemon is shutting down",
            Some("Retry the launch".to_string()),
        );
        assert!(!resp.is_success());
        let parsed: Value = serde_json::from_str(&resp.to_line()).unwrap();
        assert_eq!(parsed["error"]["data"]["category"], "busy");
        assert_eq!(parsed["error"]["data"]["retryable"], true);
        assert_eq!(parsed["error"]["data"]["suggestion"], "Retry the launch");
    }
}
