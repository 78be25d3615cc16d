use serde::{Deserialize, Serialize};

use crate::domain::{Environment, InvocationRequest};

/// `activate`: the client's command option, environment and working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub env: Environment,
    pub cwd: String,
}

impl From<&InvocationRequest> for ActivateParams {
    fn from(request: &InvocationRequest) -> Self {
        Self {
            command: request.command.clone(),
            env: request.env.clone(),
            cwd: request.cwd.display().to_string(),
        }
    }
}

impl From<ActivateParams> for InvocationRequest {
    fn from(params: ActivateParams) -> Self {
        InvocationRequest::new(params.command, params.env, params.cwd)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseParams {
    pub session: String,
    /// Pre-answers the confirmation with "yes".
    #[serde(default)]
    pub yes: bool,
}
