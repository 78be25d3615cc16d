//! JSON-RPC error codes and process exit codes.

pub const GENERIC_ERROR: i32 = -32000;
pub const SESSION_NOT_FOUND: i32 = -32001;
pub const SHUTTING_DOWN: i32 = -32002;
pub const DAEMON_ERROR: i32 = -32016;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// sysexits.h values used for infrastructure failures on the client side.
pub mod exit {
    pub const USAGE: i32 = 64;
    pub const UNAVAILABLE: i32 = 69;
    pub const SOFTWARE: i32 = 70;
    pub const IOERR: i32 = 74;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    InvalidInput,
    Busy,
    Internal,
    External,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Busy => "busy",
            ErrorCategory::Internal => "internal",
            ErrorCategory::External => "external",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_found" => Ok(ErrorCategory::NotFound),
            "invalid_input" => Ok(ErrorCategory::InvalidInput),
            "busy" => Ok(ErrorCategory::Busy),
            "internal" => Ok(ErrorCategory::Internal),
            "external" => Ok(ErrorCategory::External),
            _ => Err(()),
        }
    }
}

/// A daemon that is on its way out refuses new work; the client may start a fresh one.
pub fn is_retryable(code: i32) -> bool {
    code == SHUTTING_DOWN
}

pub fn category_for_code(code: i32) -> ErrorCategory {
    match code {
        SESSION_NOT_FOUND | METHOD_NOT_FOUND => ErrorCategory::NotFound,
        PARSE_ERROR | INVALID_REQUEST | INVALID_PARAMS => ErrorCategory::InvalidInput,
        SHUTTING_DOWN => ErrorCategory::Busy,
        DAEMON_ERROR => ErrorCategory::External,
        _ => ErrorCategory::Internal,
    }
}
