//! Agent error taxonomy and its HTTP envelope mapping.
//!
//! Every fallible path in the agent funnels into [`AgentError`]. The
//! query server wraps it in [`ApiError`], which renders the uniform
//! `{code, msg, body}` envelope with the historical numeric code
//! strings the control plane expects.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use edgerun_channel::ChannelError;
use serde::Serialize;
use thiserror::Error;

/// Envelope code for a successful response.
pub const CODE_SUCCESS: &str = "1000";
/// Envelope message for a successful response.
pub const MSG_SUCCESS: &str = "success";

/// Errors raised by the agent's components.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Malformed or missing request input.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transport or timeout error talking to the metadata authority.
    #[error("remote query failed: {0}")]
    RemoteQuery(#[from] ChannelError),

    /// Payload could not be parsed into the expected shape.
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// A valid payload could not be rendered into the response shape.
    #[error("format failed: {0}")]
    Format(String),

    /// No running process matches the target.
    #[error("no running process matches {0}")]
    ProcessNotFound(String),

    /// Executable missing, unresolvable, or exited non-zero.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// Sending a termination/kill signal failed at the OS level.
    #[error("signal delivery failed: {0}")]
    Signal(String),

    /// Read/write/rename of local configuration failed.
    #[error("file io failed: {0}")]
    FileIo(#[from] std::io::Error),
}

impl AgentError {
    /// HTTP status for the envelope.
    pub fn status(&self) -> StatusCode {
        match self {
            AgentError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            AgentError::ProcessNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Historical numeric code string for the envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::InvalidParameter(_) => "1002",
            AgentError::Decode(_) => "1107",
            AgentError::Format(_) => "1108",
            _ => "1001",
        }
    }
}

/// Uniform response envelope of the config query server.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: String,
    pub msg: String,
    pub body: serde_json::Value,
}

impl Envelope {
    /// Success envelope wrapping `body`.
    pub fn success(body: serde_json::Value) -> Self {
        Self {
            code: CODE_SUCCESS.to_string(),
            msg: MSG_SUCCESS.to_string(),
            body,
        }
    }
}

/// [`AgentError`] wrapper that renders as an envelope response.
#[derive(Debug)]
pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            code: self.0.code().to_string(),
            msg: self.0.to_string(),
            body: serde_json::Value::Null,
        };
        (self.0.status(), Json(envelope)).into_response()
    }
}
