//! passvault-client - Typed boundary to the remote vault service
//!
//! [`VaultClient`] has one method per remote capability. It is stateless:
//! authorized calls take the bearer token from the caller instead of
//! looking it up, which keeps the session out of this crate and makes the
//! trait trivial to fake.
//!
//! Expected failures (401, 404, validation, 5xx, transport faults) come back
//! as a classified [`ClientError`]; nothing here panics on a bad status.

mod error;
mod http;
mod memory;
mod types;

pub use error::ClientError;
pub use http::HttpVaultClient;
pub use memory::{InMemoryVaultClient, Operation};
pub use types::{
    AuthResponse, EncryptedValue, PasswordPolicy, PinPolicy, RecordId, RecordInput, SecretRecord,
    DEFAULT_CATEGORIES,
};

use async_trait::async_trait;

pub type ClientResult<T> = Result<T, ClientError>;

/// Format the `Authorization` header value for a token
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// The remote password vault
#[async_trait]
pub trait VaultClient: Send + Sync {
    async fn register(
        &self,
        username: &str,
        email: &str,
        master_password: &str,
    ) -> ClientResult<AuthResponse>;

    async fn login(&self, username: &str, master_password: &str) -> ClientResult<AuthResponse>;

    async fn generate_password(&self, policy: &PasswordPolicy) -> ClientResult<String>;

    async fn generate_pin(&self, policy: &PinPolicy) -> ClientResult<String>;

    /// Category vocabulary, in display order
    async fn categories(&self) -> ClientResult<Vec<String>>;

    async fn list_records(&self, token: &str) -> ClientResult<Vec<SecretRecord>>;

    async fn create_record(&self, token: &str, input: &RecordInput) -> ClientResult<SecretRecord>;

    async fn get_record(&self, token: &str, id: RecordId) -> ClientResult<SecretRecord>;

    async fn update_record(
        &self,
        token: &str,
        id: RecordId,
        input: &RecordInput,
    ) -> ClientResult<SecretRecord>;

    async fn delete_record(&self, token: &str, id: RecordId) -> ClientResult<()>;

    /// Decrypt one record server-side and return its plaintext
    async fn reveal_record(&self, token: &str, id: RecordId) -> ClientResult<String>;
}
