//! Wiring: one client, one session store, both controllers, a notifier

use anyhow::{Context, Result};
use passvault_client::{HttpVaultClient, VaultClient};
use passvault_core::{Config, OperationState, Paths, Slot};
use passvault_notify::{ConsoleSink, NotificationCoordinator, NotificationSink, RetryAction};
use passvault_session::{FileSessionStore, SessionStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::auth::AuthController;
use crate::vault::VaultController;

pub struct App {
    pub auth: AuthController,
    pub vault: VaultController,
    pub notifier: NotificationCoordinator,
    store: Arc<dyn SessionStore>,
}

impl App {
    /// Assemble from explicit parts. Must be called inside a tokio runtime.
    pub fn new(
        client: Arc<dyn VaultClient>,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn NotificationSink>,
        history_limit: usize,
    ) -> Self {
        Self {
            auth: AuthController::new(Arc::clone(&client), Arc::clone(&store)),
            vault: VaultController::new(client, Arc::clone(&store)),
            notifier: NotificationCoordinator::new(sink, history_limit),
            store,
        }
    }

    /// The HTTP client, the session file and console notifications
    pub fn from_config(config: &Config, paths: &Paths) -> Result<Self> {
        let client = HttpVaultClient::new(&config.server_url, config.request_timeout())
            .with_context(|| format!("Failed to create client for {}", config.server_url))?;
        let store = FileSessionStore::new(config.session_path(paths));
        debug!(server = %config.server_url, session = %store.path().display(), "starting");

        Ok(Self::new(
            Arc::new(client),
            Arc::new(store),
            Arc::new(ConsoleSink::detect()),
            config.notification_history,
        ))
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run an operation to a terminal state and report it. If the user takes
    /// the offered retry, the operation runs again.
    pub async fn perform<T, F>(
        &self,
        slot: &Slot<T>,
        start: F,
        success_message: &str,
    ) -> OperationState<T>
    where
        T: Clone,
        F: Fn(),
    {
        loop {
            start();
            let state = slot.settled().await;

            let again = Arc::new(AtomicBool::new(false));
            let retry: RetryAction = {
                let again = Arc::clone(&again);
                Arc::new(move || again.store(true, Ordering::SeqCst))
            };

            self.notifier.report(&state, success_message, Some(retry));
            self.notifier.flush().await;

            if !again.load(Ordering::SeqCst) {
                return state;
            }
            debug!("retrying");
        }
    }
}
