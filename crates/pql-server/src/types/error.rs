//! Server errors and their machine-readable wire codes.

use std::time::Duration;

use pql::{ExecError, LexError, ParseError, PlanError, RegistryError};

use super::message::{RequestId, ServerEnvelope, ServerFrame};

/// Codes carried by `error` frames.
pub mod error_codes {
    pub const LEX_ERROR: &str = "lex_error";
    pub const PARSE_ERROR: &str = "parse_error";
    pub const PLAN_ERROR: &str = "plan_error";
    pub const NOT_FOUND: &str = "not_found";
    pub const EXECUTION_ERROR: &str = "execution_error";
    pub const CANCELLED: &str = "cancelled";
    pub const TIMEOUT: &str = "timeout";
    pub const BUSY: &str = "busy";
    pub const READ_ONLY: &str = "read_only";
    pub const INVALID_MESSAGE: &str = "invalid_message";
    pub const SESSION_EXPIRED: &str = "session_expired";
    pub const INTERNAL: &str = "internal";
}

/// All errors that can occur in the server.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    Lex(String),

    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Execution(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution exceeded {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("a statement is already executing in this session")]
    Busy,

    #[error("session is read-only; '{0}' is not allowed")]
    ReadOnly(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("session '{0}' has expired or does not exist")]
    SessionExpired(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl ServerError {
    pub fn code(&self) -> &'static str {
        use error_codes::*;
        match self {
            ServerError::Lex(_) => LEX_ERROR,
            ServerError::Parse(_) => PARSE_ERROR,
            ServerError::Plan(_) => PLAN_ERROR,
            ServerError::NotFound(_) => NOT_FOUND,
            ServerError::Execution(_) => EXECUTION_ERROR,
            ServerError::Cancelled => CANCELLED,
            ServerError::Timeout(_) => TIMEOUT,
            ServerError::Busy => BUSY,
            ServerError::ReadOnly(_) => READ_ONLY,
            ServerError::InvalidMessage(_) | ServerError::Json(_) => INVALID_MESSAGE,
            ServerError::SessionExpired(_) => SESSION_EXPIRED,
            ServerError::Internal(_) | ServerError::Io(_) | ServerError::Registry(_) => INTERNAL,
        }
    }

    pub fn to_frame(&self, id: RequestId) -> ServerEnvelope {
        ServerEnvelope::new(
            id,
            ServerFrame::Error {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        )
    }

    /// Collapse every lex error in a statement into one message.
    pub fn from_lex_errors(errors: &[LexError]) -> Self {
        ServerError::Lex(join(errors))
    }

    pub fn from_parse_errors(errors: &[ParseError]) -> Self {
        ServerError::Parse(join(errors))
    }
}

fn join<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ExecError> for ServerError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::NotFound { .. } => ServerError::NotFound(e.to_string()),
            ExecError::Cancelled => ServerError::Cancelled,
            ExecError::ReadOnly { .. } | ExecError::Adaptor(_) | ExecError::InvalidTransition { .. } => {
                ServerError::Execution(e.to_string())
            }
            ExecError::MissingAdaptor(_) | ExecError::Unsupported(_) => {
                ServerError::Internal(e.to_string())
            }
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
