//! In-memory session store

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Session, SessionStore, StoreError};

/// Session store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self) -> Result<Session, StoreError> {
        Ok(self.session.read().await.clone())
    }

    async fn set_token(&self, token: &str) -> Result<(), StoreError> {
        self.session.write().await.token = Some(token.to_string());
        Ok(())
    }

    async fn set_username(&self, username: &str) -> Result<(), StoreError> {
        self.session.write().await.username = Some(username.to_string());
        Ok(())
    }

    async fn save(&self, session: Session) -> Result<(), StoreError> {
        *self.session.write().await = session;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.session.write().await = Session::default();
        Ok(())
    }
}
