//! passvault-session - The authenticated identity context
//!
//! A session is just two values, the bearer token and the username it was
//! issued to. It outlives any single command: it is written on successful
//! login or registration, read by every authorized vault call, and cleared
//! on logout.
//!
//! Stores are asynchronous and every write replaces the whole session, so a
//! reader never sees a token without its username (or the reverse).

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use async_trait::async_trait;
use passvault_core::OperationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Session store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for OperationError {
    fn from(err: StoreError) -> Self {
        OperationError::storage(err)
    }
}

/// The current authentication token and username
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            username: Some(username.into()),
        }
    }

    /// The token to authorize with, if there is a usable one
    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.username.is_none()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .finish()
    }
}

/// Key-value persistence for the session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the current session (may hit storage on first read)
    async fn get(&self) -> Result<Session, StoreError>;

    async fn set_token(&self, token: &str) -> Result<(), StoreError>;

    async fn set_username(&self, username: &str) -> Result<(), StoreError>;

    /// Replace token and username in one write
    async fn save(&self, session: Session) -> Result<(), StoreError>;

    /// Remove token and username together
    async fn clear(&self) -> Result<(), StoreError>;
}
