//! Registration, login and logout
//!
//! One observable state covers both register and login. A new call
//! supersedes a pending one: if the older call resolves later, its result
//! is dropped and its token is never persisted.
//!
//! Session writes are serialized. A login whose call is superseded while its
//! session is being written puts the previous session back, so a logout or a
//! newer login always has the last word in the store.

use passvault_client::{AuthResponse, ClientError, VaultClient};
use passvault_core::{OperationError, OperationState, Slot, Ticket, WritePolicy};
use passvault_session::{Session, SessionStore, StoreError};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::policy;
use crate::tasks::TaskSet;

const REGISTER_FAILED: &str = "Registration failed";
const LOGIN_FAILED: &str = "Login failed";

struct Inner {
    client: Arc<dyn VaultClient>,
    store: Arc<dyn SessionStore>,
    state: Slot<String>,
    /// Held across every session write
    persist: Mutex<()>,
}

impl Inner {
    /// Persist the session and publish the server's message, unless a newer
    /// call has started in the meantime
    async fn establish(
        &self,
        ticket: Ticket,
        op: &'static str,
        fallback: &str,
        result: Result<AuthResponse, ClientError>,
    ) {
        if !self.state.is_current(ticket) {
            debug!(op, "superseded, discarding result");
            return;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                let err = err.into_operation_error(fallback);
                warn!(op, kind = err.kind.as_str(), "authentication failed");
                self.state.finish(ticket, OperationState::Error(err));
                return;
            }
        };

        let _gate = self.persist.lock().await;
        if !self.state.is_current(ticket) {
            debug!(op, "superseded, discarding result");
            return;
        }

        let previous = match self.store.get().await {
            Ok(previous) => previous,
            Err(err) => {
                warn!(op, error = %err, "could not read session");
                self.state.finish(ticket, OperationState::Error(err.into()));
                return;
            }
        };

        let session = Session::new(response.token, response.username.clone());
        if let Err(err) = self.store.save(session).await {
            warn!(op, error = %err, "could not persist session");
            self.state.finish(ticket, OperationState::Error(err.into()));
            return;
        }

        if !self.state.is_current(ticket) {
            debug!(op, "superseded while persisting, restoring previous session");
            if let Err(err) = self.restore(previous).await {
                warn!(op, error = %err, "could not restore session");
            }
            return;
        }

        info!(op, username = %response.username, "authenticated");
        self.state
            .finish(ticket, OperationState::Success(response.message));
    }

    async fn restore(&self, previous: Session) -> Result<(), StoreError> {
        if previous.is_empty() {
            self.store.clear().await
        } else {
            self.store.save(previous).await
        }
    }
}

/// Drives register/login and owns the session's lifecycle
pub struct AuthController {
    inner: Arc<Inner>,
    tasks: TaskSet,
}

impl AuthController {
    pub fn new(client: Arc<dyn VaultClient>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                state: Slot::new(WritePolicy::LatestInitiated),
                persist: Mutex::new(()),
            }),
            tasks: TaskSet::new(),
        }
    }

    /// Create an account. The master password is checked locally first; a
    /// weak one never reaches the server.
    pub fn register(&self, username: &str, email: &str, master_password: &str) {
        let ticket = self.inner.state.begin();
        debug!(username, "register");

        if let Err(err) = policy::validate(master_password) {
            debug!("master password rejected by policy");
            self.inner.state.finish(ticket, OperationState::Error(err));
            return;
        }

        let inner = Arc::clone(&self.inner);
        let username = username.to_string();
        let email = email.to_string();
        let master_password = Zeroizing::new(master_password.to_string());

        self.tasks.spawn(async move {
            let result = inner
                .client
                .register(&username, &email, &master_password)
                .await;
            inner
                .establish(ticket, "register", REGISTER_FAILED, result)
                .await;
        });
    }

    pub fn login(&self, username: &str, master_password: &str) {
        let ticket = self.inner.state.begin();
        debug!(username, "login");

        let inner = Arc::clone(&self.inner);
        let username = username.to_string();
        let master_password = Zeroizing::new(master_password.to_string());

        self.tasks.spawn(async move {
            let result = inner.client.login(&username, &master_password).await;
            inner.establish(ticket, "login", LOGIN_FAILED, result).await;
        });
    }

    /// Forget the session. Token and username are removed in one write.
    /// A login still in flight is superseded and never persists.
    pub async fn logout(&self) {
        self.inner.state.reset();
        let _gate = self.inner.persist.lock().await;
        match self.inner.store.clear().await {
            Ok(()) => {
                info!("logged out");
                self.inner.state.reset();
            }
            Err(err) => {
                warn!(error = %err, "could not clear session");
                self.inner
                    .state
                    .publish(OperationState::Error(OperationError::from(err)));
            }
        }
    }

    /// Acknowledge a terminal state; also discards any pending call
    pub fn reset_state(&self) {
        self.inner.state.reset();
    }

    pub fn state(&self) -> OperationState<String> {
        self.inner.state.state()
    }

    pub fn slot(&self) -> &Slot<String> {
        &self.inner.state
    }

    pub fn subscribe(&self) -> watch::Receiver<OperationState<String>> {
        self.inner.state.subscribe()
    }

    /// Wait for the pending call to reach a terminal state
    pub async fn settled(&self) -> OperationState<String> {
        self.inner.state.settled().await
    }

    pub async fn session(&self) -> Result<Session, OperationError> {
        Ok(self.inner.store.get().await?)
    }

    /// Username of the stored session, if anyone is logged in
    pub async fn current_user(&self) -> Option<String> {
        match self.inner.store.get().await {
            Ok(session) if session.is_authenticated() => session.username,
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "could not read session");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passvault_client::{InMemoryVaultClient, Operation};
    use passvault_core::ErrorKind;
    use async_trait::async_trait;
    use passvault_session::MemorySessionStore;
    use std::time::Duration;

    /// Session store whose writes take a while
    struct SlowStore(MemorySessionStore);

    #[async_trait]
    impl SessionStore for SlowStore {
        async fn get(&self) -> Result<Session, StoreError> {
            self.0.get().await
        }

        async fn set_token(&self, token: &str) -> Result<(), StoreError> {
            self.0.set_token(token).await
        }

        async fn set_username(&self, username: &str) -> Result<(), StoreError> {
            self.0.set_username(username).await
        }

        async fn save(&self, session: Session) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_millis(40)).await;
            self.0.save(session).await
        }

        async fn clear(&self) -> Result<(), StoreError> {
            self.0.clear().await
        }
    }

    fn slow_setup() -> (Arc<SlowStore>, AuthController) {
        let client = Arc::new(InMemoryVaultClient::new().with_user(
            "alice",
            "alice@example.com",
            "secret",
        ));
        let store = Arc::new(SlowStore(MemorySessionStore::new()));
        let auth = AuthController::new(client, store.clone());
        (store, auth)
    }

    fn setup() -> (Arc<InMemoryVaultClient>, Arc<MemorySessionStore>, AuthController) {
        let client = Arc::new(InMemoryVaultClient::new().with_user(
            "alice",
            "alice@example.com",
            "secret",
        ));
        let store = Arc::new(MemorySessionStore::new());
        let auth = AuthController::new(client.clone(), store.clone());
        (client, store, auth)
    }

    #[tokio::test]
    async fn test_login_persists_session() {
        let (_client, store, auth) = setup();

        auth.login("alice", "secret");
        assert!(auth.state().is_loading());

        assert!(matches!(auth.settled().await, OperationState::Success(_)));
        let session = store.get().await.unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.username.as_deref(), Some("alice"));
        assert_eq!(auth.current_user().await.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let (_client, store, auth) = setup();

        auth.login("alice", "wrong");
        let err = auth.settled().await.error().cloned().unwrap();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert!(store.get().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_weak_master_password_skips_network() {
        let (client, _store, auth) = setup();

        auth.register("bob", "bob@example.com", "weak");
        let err = auth.state().error().cloned().unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("at least 8 characters"));
        assert_eq!(client.calls(Operation::Register), 0);
    }

    #[tokio::test]
    async fn test_register_then_logout() {
        let (_client, store, auth) = setup();

        auth.register("bob", "bob@example.com", "Str0ng!pass");
        assert!(matches!(auth.settled().await, OperationState::Success(_)));
        assert_eq!(auth.current_user().await.as_deref(), Some("bob"));

        auth.logout().await;
        assert!(auth.state().is_idle());
        assert!(store.get().await.unwrap().is_empty());
        assert!(auth.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_superseded_login_is_discarded() {
        let (client, store, auth) = setup();
        client.delay_next(Operation::Login, Duration::from_millis(50));

        auth.login("alice", "secret");
        auth.login("alice", "wrong");

        let err = auth.settled().await.error().cloned().unwrap();
        assert_eq!(err.kind, ErrorKind::Unauthorized);

        // let the slow first call resolve; it must not win
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(auth.state().error().is_some());
        assert!(store.get().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logout_during_session_write_wins() {
        let (store, auth) = slow_setup();

        auth.login("alice", "secret");
        tokio::time::sleep(Duration::from_millis(10)).await;
        auth.logout().await;
        auth.tasks.wait_idle().await;

        assert!(auth.state().is_idle());
        assert!(!store.get().await.unwrap().is_authenticated());
        assert!(auth.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_newer_login_during_session_write_wins() {
        let (store, auth) = slow_setup();

        auth.login("alice", "secret");
        tokio::time::sleep(Duration::from_millis(10)).await;
        auth.login("alice", "wrong");
        auth.tasks.wait_idle().await;

        let err = auth.state().error().cloned().unwrap();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert!(!store.get().await.unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_reset_state_is_idempotent() {
        let (_client, _store, auth) = setup();

        auth.login("alice", "secret");
        auth.settled().await;
        auth.reset_state();
        auth.reset_state();
        assert!(auth.state().is_idle());
    }
}
