//! passvault - Client-side session manager for a remote password vault
//!
//! Sits between a user interface and the vault service. It holds the
//! authentication session, models every remote operation as an observable
//! state machine, keeps secrets encrypted until a record is explicitly
//! revealed, and turns failures into classified, retryable states.
//!
//! [`AuthController`] and [`VaultController`] take their collaborators
//! (a [`VaultClient`] and a [`SessionStore`]) as constructor arguments, so
//! any of them can be swapped for a fake.

pub mod app;
pub mod auth;
pub mod policy;
mod tasks;
pub mod vault;

pub use app::App;
pub use auth::AuthController;
pub use vault::{Generated, RevealedSecret, SaveRequest, VaultController};

pub use passvault_client::{
    HttpVaultClient, InMemoryVaultClient, PasswordPolicy, PinPolicy, RecordId, RecordInput,
    SecretRecord, VaultClient, DEFAULT_CATEGORIES,
};
pub use passvault_core::{Config, ErrorKind, OperationError, OperationState, Paths, Slot};
pub use passvault_notify::{NotificationCoordinator, NotificationSink};
pub use passvault_session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
