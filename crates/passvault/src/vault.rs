//! The vault's operation state machines
//!
//! Six independent slots: list, detail, reveal, generate, save and delete.
//! Every operation method writes `Loading` into its slot before returning,
//! then resolves on a task owned by the controller. Failures never escape
//! as errors; they land in the slot as `OperationState::Error`.
//!
//! Record metadata and plaintext are kept apart. Listing and detail never
//! carry a secret; plaintext only exists in the reveal slot, after an
//! explicit [`VaultController::decrypt`], and is dropped on
//! [`VaultController::hide`].

use passvault_client::{
    ClientResult, PasswordPolicy, PinPolicy, RecordId, RecordInput, SecretRecord, VaultClient,
    DEFAULT_CATEGORIES,
};
use passvault_core::{OperationError, OperationState, Slot, StateCell, Ticket, WritePolicy};
use passvault_session::SessionStore;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::tasks::TaskSet;

const LOAD_FAILED: &str = "Failed to load passwords";
const LOAD_ONE_FAILED: &str = "Failed to load password";
const DECRYPT_FAILED: &str = "Failed to decrypt password";
const GENERATE_PASSWORD_FAILED: &str = "Failed to generate password";
const GENERATE_PIN_FAILED: &str = "Failed to generate PIN";
const SAVE_FAILED: &str = "Failed to save password";
const UPDATE_FAILED: &str = "Failed to update password";
const DELETE_FAILED: &str = "Failed to delete password";

/// Plaintext of one record, held only while it is being shown
#[derive(Clone)]
pub struct RevealedSecret {
    pub id: RecordId,
    secret: Arc<SecretString>,
}

impl RevealedSecret {
    fn new(id: RecordId, plaintext: String) -> Self {
        Self {
            id,
            secret: Arc::new(SecretString::from(plaintext)),
        }
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl fmt::Debug for RevealedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevealedSecret")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Output of the generate slot. Password and PIN results share the slot,
/// so at most one is current.
#[derive(Clone, PartialEq, Eq)]
pub enum Generated {
    Password(String),
    Pin(String),
}

impl Generated {
    pub fn value(&self) -> &str {
        match self {
            Generated::Password(value) | Generated::Pin(value) => value,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Generated::Password(_) => "password",
            Generated::Pin(_) => "pin",
        }
    }
}

impl fmt::Debug for Generated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Generated::{}(<redacted>)", self.as_str())
    }
}

/// Create (no id) or update (with id)
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub id: Option<RecordId>,
    pub input: RecordInput,
}

impl SaveRequest {
    pub fn create(input: RecordInput) -> Self {
        Self { id: None, input }
    }

    pub fn update(id: RecordId, input: RecordInput) -> Self {
        Self {
            id: Some(id),
            input,
        }
    }
}

struct Inner {
    client: Arc<dyn VaultClient>,
    store: Arc<dyn SessionStore>,
    list: Slot<Vec<SecretRecord>>,
    detail: Slot<SecretRecord>,
    reveal: Slot<RevealedSecret>,
    generate: Slot<Generated>,
    save: Slot<SecretRecord>,
    delete: Slot<RecordId>,
    categories: StateCell<Vec<String>>,
    /// Record whose plaintext is being fetched or shown
    revealing: Mutex<Option<RecordId>>,
}

/// Log the outcome and publish it
fn conclude<T>(
    slot: &Slot<T>,
    ticket: Ticket,
    op: &'static str,
    result: Result<T, OperationError>,
) -> bool {
    match &result {
        Ok(_) => info!(op, "completed"),
        Err(err) => warn!(op, kind = err.kind.as_str(), message = %err.message, "failed"),
    }

    let published = slot.finish(ticket, result.into());
    if !published {
        debug!(op, "superseded, result discarded");
    }
    published
}

fn classify<T>(result: ClientResult<T>, fallback: &str) -> Result<T, OperationError> {
    result.map_err(|err| err.into_operation_error(fallback))
}

impl Inner {
    /// The bearer token of the current session. No session store, no token,
    /// no call.
    async fn token(&self) -> Result<String, OperationError> {
        let session = self.store.get().await?;
        session
            .bearer()
            .map(str::to_string)
            .ok_or_else(OperationError::missing_token)
    }

    async fn fetch_list(&self) -> Result<Vec<SecretRecord>, OperationError> {
        let token = self.token().await?;
        classify(self.client.list_records(&token).await, LOAD_FAILED)
    }

    async fn fetch_record(&self, id: RecordId) -> Result<SecretRecord, OperationError> {
        let token = self.token().await?;
        classify(self.client.get_record(&token, id).await, LOAD_ONE_FAILED)
    }

    async fn fetch_plaintext(&self, id: RecordId) -> Result<RevealedSecret, OperationError> {
        let token = self.token().await?;
        let plaintext = classify(self.client.reveal_record(&token, id).await, DECRYPT_FAILED)?;
        Ok(RevealedSecret::new(id, plaintext))
    }

    async fn store_record(&self, request: &SaveRequest) -> Result<SecretRecord, OperationError> {
        let token = self.token().await?;
        match request.id {
            None => classify(
                self.client.create_record(&token, &request.input).await,
                SAVE_FAILED,
            ),
            Some(id) => classify(
                self.client.update_record(&token, id, &request.input).await,
                UPDATE_FAILED,
            ),
        }
    }

    async fn remove_record(&self, id: RecordId) -> Result<RecordId, OperationError> {
        let token = self.token().await?;
        classify(self.client.delete_record(&token, id).await, DELETE_FAILED)?;
        Ok(id)
    }

    async fn refresh_list(&self, ticket: Ticket) {
        let result = self.fetch_list().await;
        conclude(&self.list, ticket, "refresh", result);
    }

    fn revealing(&self) -> Option<RecordId> {
        *self.revealing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_revealing(&self, id: Option<RecordId>) {
        *self.revealing.lock().unwrap_or_else(PoisonError::into_inner) = id;
    }
}

/// Owns the vault's operation states and the tasks that resolve them
pub struct VaultController {
    inner: Arc<Inner>,
    tasks: TaskSet,
}

impl VaultController {
    pub fn new(client: Arc<dyn VaultClient>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                list: Slot::new(WritePolicy::LastWrite),
                detail: Slot::new(WritePolicy::LastWrite),
                // a hidden or superseded reveal must never come back
                reveal: Slot::new(WritePolicy::LatestInitiated),
                generate: Slot::new(WritePolicy::LastWrite),
                save: Slot::new(WritePolicy::LastWrite),
                delete: Slot::new(WritePolicy::LastWrite),
                categories: StateCell::new(Vec::new()),
                revealing: Mutex::new(None),
            }),
            tasks: TaskSet::new(),
        }
    }

    /// Fetch every record for the current session. Replaces prior content.
    pub fn load(&self) {
        let ticket = self.inner.list.begin();
        debug!("load records");

        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let result = inner.fetch_list().await;
            conclude(&inner.list, ticket, "load", result);
        });
    }

    /// Fetch one record's metadata. Navigating to a different record hides
    /// any plaintext revealed (or still being fetched) for the previous one.
    pub fn load_by_id(&self, id: RecordId) {
        if self.inner.revealing().is_some_and(|revealing| revealing != id) {
            self.hide();
        }

        let ticket = self.inner.detail.begin();
        debug!(id, "load record");

        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let result = inner.fetch_record(id).await;
            conclude(&inner.detail, ticket, "load_by_id", result);
        });
    }

    /// Ask the server for one record's plaintext. Only ever called on an
    /// explicit user action; replaces any earlier reveal.
    pub fn decrypt(&self, id: RecordId) {
        let ticket = self.inner.reveal.begin();
        self.inner.set_revealing(Some(id));
        debug!(id, "reveal record");

        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let result = inner.fetch_plaintext(id).await;
            conclude(&inner.reveal, ticket, "decrypt", result);
        });
    }

    /// Drop the revealed plaintext. Showing it again goes back to the server.
    pub fn hide(&self) {
        debug!("hide revealed secret");
        self.inner.set_revealing(None);
        self.inner.reveal.reset();
    }

    pub fn generate_password(&self, policy: PasswordPolicy) {
        let ticket = self.inner.generate.begin();
        debug!(length = policy.length, "generate password");

        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let result = classify(
                inner.client.generate_password(&policy).await,
                GENERATE_PASSWORD_FAILED,
            )
            .map(Generated::Password);
            conclude(&inner.generate, ticket, "generate_password", result);
        });
    }

    pub fn generate_pin(&self, policy: PinPolicy) {
        let ticket = self.inner.generate.begin();
        debug!(length = policy.length, "generate pin");

        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let result = classify(inner.client.generate_pin(&policy).await, GENERATE_PIN_FAILED)
                .map(Generated::Pin);
            conclude(&inner.generate, ticket, "generate_pin", result);
        });
    }

    /// Create or update a record. On success the list is refreshed; the
    /// refresh reports through the list slot, never through this one.
    pub fn save(&self, request: SaveRequest) {
        let ticket = self.inner.save.begin();
        debug!(id = ?request.id, "save record");

        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let result = inner.store_record(&request).await;
            match result {
                Ok(record) => {
                    // list goes Loading before anyone can observe the save succeed
                    let refresh = inner.list.begin();
                    conclude(&inner.save, ticket, "save", Ok(record));
                    inner.refresh_list(refresh).await;
                }
                Err(err) => {
                    conclude(&inner.save, ticket, "save", Err(err));
                }
            }
        });
    }

    pub fn create(&self, input: RecordInput) {
        self.save(SaveRequest::create(input));
    }

    pub fn update(&self, id: RecordId, input: RecordInput) {
        self.save(SaveRequest::update(id, input));
    }

    /// Delete a record, then refresh the list
    pub fn delete(&self, id: RecordId) {
        let ticket = self.inner.delete.begin();
        debug!(id, "delete record");

        if self.inner.revealing() == Some(id) {
            self.hide();
        }

        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            match inner.remove_record(id).await {
                Ok(id) => {
                    let refresh = inner.list.begin();
                    conclude(&inner.delete, ticket, "delete", Ok(id));
                    inner.refresh_list(refresh).await;
                }
                Err(err) => {
                    conclude(&inner.delete, ticket, "delete", Err(err));
                }
            }
        });
    }

    /// Fetch the category vocabulary, falling back to the built-in one
    pub fn load_categories(&self) {
        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let categories = match inner.client.categories().await {
                Ok(categories) if !categories.is_empty() => categories,
                Ok(_) => {
                    debug!("empty category list, using defaults");
                    default_categories()
                }
                Err(err) => {
                    debug!(error = %err, "categories unavailable, using defaults");
                    default_categories()
                }
            };
            inner.categories.set(categories);
        });
    }

    pub fn list(&self) -> &Slot<Vec<SecretRecord>> {
        &self.inner.list
    }

    pub fn detail(&self) -> &Slot<SecretRecord> {
        &self.inner.detail
    }

    pub fn reveal(&self) -> &Slot<RevealedSecret> {
        &self.inner.reveal
    }

    pub fn generated(&self) -> &Slot<Generated> {
        &self.inner.generate
    }

    pub fn save_state(&self) -> &Slot<SecretRecord> {
        &self.inner.save
    }

    pub fn delete_state(&self) -> &Slot<RecordId> {
        &self.inner.delete
    }

    pub fn categories(&self) -> Vec<String> {
        self.inner.categories.get()
    }

    pub fn subscribe_categories(&self) -> watch::Receiver<Vec<String>> {
        self.inner.categories.subscribe()
    }

    /// Wait for every operation started so far, including follow-up list
    /// refreshes
    pub async fn wait_idle(&self) {
        self.tasks.wait_idle().await;
    }
}

fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use passvault_client::{ClientError, InMemoryVaultClient, Operation};
    use passvault_core::ErrorKind;
    use passvault_session::{MemorySessionStore, Session};
    use std::time::Duration;

    fn setup() -> (Arc<InMemoryVaultClient>, VaultController) {
        let client = Arc::new(InMemoryVaultClient::new());
        let token = client.issue_token("alice");
        client.seed_record("alice", 3, RecordInput::new("GitHub", "gh-secret"));
        client.seed_record("alice", 7, RecordInput::new("Bank", "p@ss1"));

        let store = Arc::new(MemorySessionStore::with_session(Session::new(token, "alice")));
        let vault = VaultController::new(client.clone(), store);
        (client, vault)
    }

    #[tokio::test]
    async fn test_operations_enter_loading_synchronously() {
        let (_client, vault) = setup();

        vault.load();
        vault.load_by_id(3);
        vault.decrypt(3);
        vault.generate_pin(PinPolicy::default());
        vault.create(RecordInput::new("Mail", "m41l!"));
        vault.delete(3);

        assert!(vault.list().with(OperationState::is_loading));
        assert!(vault.detail().with(OperationState::is_loading));
        assert!(vault.reveal().with(OperationState::is_loading));
        assert!(vault.generated().with(OperationState::is_loading));
        assert!(vault.save_state().with(OperationState::is_loading));
        assert!(vault.delete_state().with(OperationState::is_loading));
    }

    #[tokio::test]
    async fn test_missing_token_makes_no_call() {
        let client = Arc::new(InMemoryVaultClient::new());
        let vault = VaultController::new(client.clone(), Arc::new(MemorySessionStore::new()));

        vault.load();
        let err = vault.list().settled().await.error().cloned().unwrap();
        assert_eq!(err.kind, ErrorKind::MissingToken);
        assert_eq!(client.calls(Operation::ListRecords), 0);
    }

    #[tokio::test]
    async fn test_fallback_message_when_server_is_silent() {
        let (client, vault) = setup();
        client.fail_next(
            Operation::ListRecords,
            ClientError::Server {
                status: 500,
                detail: None,
            },
        );

        vault.load();
        let err = vault.list().settled().await.error().cloned().unwrap();
        assert_eq!(err.kind, ErrorKind::ServerError);
        assert_eq!(err.message, "Failed to load passwords");
    }

    #[tokio::test]
    async fn test_detail_starts_idle() {
        let (_client, vault) = setup();
        assert!(vault.detail().with(OperationState::is_idle));
        assert!(vault.reveal().with(OperationState::is_idle));
        assert!(vault.list().with(OperationState::is_idle));
    }

    #[tokio::test]
    async fn test_hide_then_reveal_fetches_again() {
        let (client, vault) = setup();

        vault.decrypt(7);
        let revealed = vault.reveal().settled().await.success().cloned().unwrap();
        assert_eq!(revealed.expose(), "p@ss1");

        vault.hide();
        assert!(vault.reveal().with(OperationState::is_idle));

        vault.decrypt(7);
        vault.reveal().settled().await;
        assert_eq!(client.calls(Operation::RevealRecord), 2);
    }

    #[tokio::test]
    async fn test_hide_discards_in_flight_reveal() {
        let (client, vault) = setup();
        client.delay_next(Operation::RevealRecord, Duration::from_millis(30));

        vault.decrypt(7);
        vault.hide();
        vault.wait_idle().await;

        assert!(vault.reveal().with(OperationState::is_idle));
    }

    #[tokio::test]
    async fn test_navigating_away_hides_plaintext() {
        let (_client, vault) = setup();

        vault.decrypt(7);
        vault.reveal().settled().await;

        vault.load_by_id(7);
        assert!(vault.reveal().with(|s| s.success().is_some()));

        vault.load_by_id(3);
        assert!(vault.reveal().with(OperationState::is_idle));
    }

    #[tokio::test]
    async fn test_navigating_away_drops_pending_reveal() {
        let (client, vault) = setup();
        client.delay_next(Operation::RevealRecord, Duration::from_millis(30));

        vault.decrypt(7);
        vault.load_by_id(3);
        vault.wait_idle().await;

        assert_eq!(vault.detail().with(|s| s.success().map(|r| r.id)), Some(3));
        assert!(vault.reveal().with(OperationState::is_idle));
    }

    #[tokio::test]
    async fn test_deleting_drops_pending_reveal() {
        let (client, vault) = setup();
        client.delay_next(Operation::RevealRecord, Duration::from_millis(30));

        vault.decrypt(7);
        vault.delete(7);
        vault.wait_idle().await;

        assert!(vault.reveal().with(OperationState::is_idle));
    }

    #[test]
    fn test_revealed_secret_debug_is_redacted() {
        let revealed = RevealedSecret::new(7, "p@ss1".to_string());
        let rendered = format!("{:?}", revealed);
        assert!(!rendered.contains("p@ss1"));
        assert!(rendered.contains('7'));
    }

    #[tokio::test]
    async fn test_update_uses_update_fallback() {
        let (client, vault) = setup();
        client.fail_next(
            Operation::UpdateRecord,
            ClientError::Server {
                status: 503,
                detail: None,
            },
        );

        vault.update(3, RecordInput::new("GitHub", "new-secret"));
        let err = vault.save_state().settled().await.error().cloned().unwrap();
        assert_eq!(err.message, "Failed to update password");
        // no refresh after a failed save
        assert!(vault.list().with(OperationState::is_idle));
    }

    #[tokio::test]
    async fn test_refresh_failure_stays_in_list_slot() {
        let (client, vault) = setup();
        client.fail_next(Operation::ListRecords, ClientError::Network("offline".to_string()));

        vault.create(RecordInput::new("Mail", "m41l!"));
        vault.wait_idle().await;

        assert!(vault.save_state().with(|s| s.success().is_some()));
        let err = vault.list().with(|s| s.error().cloned()).unwrap();
        assert_eq!(err.kind, ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_categories_fall_back_to_defaults() {
        let (client, vault) = setup();
        client.set_categories(vec!["Personal".to_string(), "Gaming".to_string()]);

        vault.load_categories();
        vault.wait_idle().await;
        assert_eq!(vault.categories(), vec!["Personal", "Gaming"]);

        client.fail_next(Operation::Categories, ClientError::Network("offline".to_string()));
        vault.load_categories();
        vault.wait_idle().await;
        assert_eq!(vault.categories(), DEFAULT_CATEGORIES.to_vec());
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let (_client, vault) = setup();

        vault.generate_password(PasswordPolicy::default());
        vault.generated().settled().await;
        vault.generated().reset();
        vault.generated().reset();
        assert!(vault.generated().with(OperationState::is_idle));
    }
}
