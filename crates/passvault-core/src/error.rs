//! Error taxonomy shared by every operation
//!
//! Remote and storage failures are classified into a closed set of kinds.
//! Operations never hand an error to their caller; they publish an
//! [`OperationError`] into their state slot instead.

use serde::Serialize;
use thiserror::Error;

/// Message used when an authorized call is attempted without a session token
pub const MISSING_TOKEN_MESSAGE: &str = "No authentication token found";

/// Classification of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No token in the session; no network call was attempted
    MissingToken,
    Unauthorized,
    NotFound,
    Validation,
    Network,
    ServerError,
    /// The session store could not be read or written
    StorageUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingToken => "missing_token",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::ServerError => "server_error",
            ErrorKind::StorageUnavailable => "storage_unavailable",
        }
    }

    /// Whether re-invoking the same operation can succeed.
    ///
    /// A broken session store ends the session: the user has to
    /// authenticate again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorKind::StorageUnavailable)
    }

    /// Whether the user has to log in (again) before retrying makes sense
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingToken | ErrorKind::Unauthorized | ErrorKind::StorageUnavailable
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with a human-readable message
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Use `detail` when the failing layer supplied one, otherwise the
    /// operation's own fallback message
    pub fn with_fallback(kind: ErrorKind, detail: Option<&str>, fallback: &str) -> Self {
        let message = detail
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(fallback);
        Self::new(kind, message)
    }

    pub fn missing_token() -> Self {
        Self::new(ErrorKind::MissingToken, MISSING_TOKEN_MESSAGE)
    }

    pub fn storage(detail: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::StorageUnavailable,
            format!("Session storage unavailable: {}", detail),
        )
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}
