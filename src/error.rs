//! Error types for Symfold

use thiserror::Error;

use crate::infra::lsp::client::SessionState;
use crate::infra::lsp::protocol::error_codes;

pub type SymfoldResult<T> = std::result::Result<T, SymfoldError>;

#[derive(Debug, Error)]
pub enum SymfoldError {
    #[error("{0}")]
    Lsp(#[from] LspError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LspError {
    #[error("Failed to start server: {0}")]
    ServerStart(String),

    /// Header block was malformed or the stream lost frame alignment.
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Server error [{code}]: {message}")]
    Rpc { code: i32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("'{operation}' is not valid in state {state:?}")]
    InvalidState {
        operation: String,
        state: SessionState,
    },

    #[error("{0}")]
    Timeout(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SymfoldError {
    /// JSON-RPC style code reported in the error envelope
    pub fn error_code(&self) -> i32 {
        match self {
            Self::Lsp(e) => e.error_code(),
            Self::Config(_) | Self::Io(_) => error_codes::CLIENT_FAILURE,
        }
    }
}

impl LspError {
    pub fn error_code(&self) -> i32 {
        match self {
            Self::Rpc { code, .. } => *code,
            Self::Framing(_) => error_codes::PARSE_ERROR,
            Self::Protocol(_) => error_codes::INVALID_REQUEST,
            Self::SessionClosed => error_codes::SESSION_CLOSED,
            Self::InvalidState { .. } => error_codes::SERVER_NOT_INITIALIZED,
            Self::Timeout(_) => error_codes::REQUEST_TIMEOUT,
            Self::ServerStart(_) | Self::Io(_) | Self::Json(_) => error_codes::CLIENT_FAILURE,
        }
    }

    pub fn invalid_state(operation: &str, state: SessionState) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            state,
        }
    }
}

impl From<crate::infra::lsp::protocol::ResponseError> for LspError {
    fn from(err: crate::infra::lsp::protocol::ResponseError) -> Self {
        LspError::Rpc {
            code: err.code,
            message: err.message,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::lsp::protocol::ResponseError;

    #[test]
    fn test_rpc_error_from_response_error() {
        let err: LspError = ResponseError {
            code: -32601,
            message: "Method not found".to_string(),
            data: None,
        }
        .into();
        assert_eq!(err.error_code(), -32601);
        assert_eq!(err.to_string(), "Server error [-32601]: Method not found");
    }

    #[test]
    fn test_reported_codes() {
        assert_eq!(LspError::Framing("bad".into()).error_code(), -32700);
        assert_eq!(SymfoldError::from(LspError::SessionClosed).error_code(), -32099);
        assert_eq!(
            SymfoldError::from(LspError::Timeout("slow".into())).error_code(),
            -32001
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.py");
        assert_eq!(SymfoldError::from(io).error_code(), -32000);
    }

    #[test]
    fn test_invalid_state_message() {
        let err = LspError::invalid_state("textDocument/foldingRange", SessionState::Ready);
        assert_eq!(err.error_code(), -32002);
        assert_eq!(
            err.to_string(),
            "'textDocument/foldingRange' is not valid in state Ready"
        );
    }
}
