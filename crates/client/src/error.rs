//! Classified remote failures

use passvault_core::{ErrorKind, OperationError};
use thiserror::Error;

/// Why a remote call failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Unauthorized{}", suffix(.0))]
    Unauthorized(Option<String>),

    #[error("Not found{}", suffix(.0))]
    NotFound(Option<String>),

    #[error("Invalid request: {0}")]
    Validation(String),

    /// Transport-level fault: connect, TLS, timeout, broken body
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}){}", suffix(.detail))]
    Server { status: u16, detail: Option<String> },
}

fn suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

impl ClientError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        match status {
            401 | 403 => ClientError::Unauthorized(detail),
            404 => ClientError::NotFound(detail),
            400 | 409 | 422 => ClientError::Validation(
                detail.unwrap_or_else(|| format!("request rejected with status {}", status)),
            ),
            _ => ClientError::Server { status, detail },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Unauthorized(_) => ErrorKind::Unauthorized,
            ClientError::NotFound(_) => ErrorKind::NotFound,
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::Network(_) => ErrorKind::Network,
            ClientError::Server { .. } => ErrorKind::ServerError,
        }
    }

    /// The message supplied by the server or transport, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Unauthorized(detail) | ClientError::NotFound(detail) => detail.as_deref(),
            ClientError::Validation(detail) | ClientError::Network(detail) => Some(detail),
            ClientError::Server { detail, .. } => detail.as_deref(),
        }
    }

    /// Convert into an operation failure, using `fallback` when the remote
    /// side did not explain itself
    pub fn into_operation_error(self, fallback: &str) -> OperationError {
        OperationError::with_fallback(self.kind(), self.detail(), fallback)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}
