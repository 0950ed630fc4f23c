//! In-memory vault service
//!
//! Behaves like the remote service (accounts, tokens, per-user records,
//! server-side reveal and generation) without any transport. Used for
//! tests and offline runs. Per-operation failures and delays can be
//! injected to exercise error and concurrency paths.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::types::{
    AuthResponse, EncryptedValue, PasswordPolicy, PinPolicy, RecordId, RecordInput, SecretRecord,
    DEFAULT_CATEGORIES,
};
use crate::{ClientError, ClientResult, VaultClient};

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const NUMBERS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()-_=+[]{}|;:,.<>?";

/// Remote capabilities, for call counting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    Login,
    GeneratePassword,
    GeneratePin,
    Categories,
    ListRecords,
    CreateRecord,
    GetRecord,
    UpdateRecord,
    DeleteRecord,
    RevealRecord,
}

struct Account {
    email: String,
    master_password: String,
}

struct StoredRecord {
    owner: String,
    record: SecretRecord,
    plaintext: String,
}

struct State {
    accounts: HashMap<String, Account>,
    /// token -> username
    tokens: HashMap<String, String>,
    records: BTreeMap<RecordId, StoredRecord>,
    next_id: RecordId,
    issued: u64,
    generated: u64,
    categories: Vec<String>,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, VecDeque<ClientError>>,
    delays: HashMap<Operation, VecDeque<Duration>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            tokens: HashMap::new(),
            records: BTreeMap::new(),
            next_id: 1,
            issued: 0,
            generated: 0,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            calls: HashMap::new(),
            failures: HashMap::new(),
            delays: HashMap::new(),
        }
    }
}

impl State {
    fn issue_token(&mut self, username: &str) -> String {
        self.issued += 1;
        let token = format!("mem-{}-{}", username, self.issued);
        self.tokens.insert(token.clone(), username.to_string());
        token
    }

    fn user_for(&self, token: &str) -> ClientResult<String> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ClientError::Unauthorized(Some("Invalid or expired token".to_string())))
    }

    fn owned(&self, username: &str, id: RecordId) -> ClientResult<&StoredRecord> {
        self.records
            .get(&id)
            .filter(|stored| stored.owner == username)
            .ok_or_else(|| ClientError::NotFound(Some("Password not found".to_string())))
    }

    fn insert(&mut self, owner: &str, id: RecordId, input: &RecordInput) -> SecretRecord {
        let now = Utc::now().naive_utc();
        let record = SecretRecord {
            id,
            label: input.label.clone(),
            encrypted_value: seal(&input.secret),
            username: input.username.clone(),
            url: input.url.clone(),
            category: input.category.clone(),
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        self.records.insert(
            id,
            StoredRecord {
                owner: owner.to_string(),
                record: record.clone(),
                plaintext: input.secret.clone(),
            },
        );
        self.next_id = self.next_id.max(id + 1);
        record
    }
}

/// Stand-in for server-side encryption; only has to be opaque
fn seal(plaintext: &str) -> EncryptedValue {
    let hex: String = plaintext
        .bytes()
        .map(|b| format!("{:02x}", b ^ 0x5a))
        .collect();
    EncryptedValue::new(format!("enc:{}", hex))
}

fn validate_input(input: &RecordInput) -> ClientResult<()> {
    if input.label.trim().is_empty() {
        return Err(ClientError::Validation("Label is required".to_string()));
    }
    if input.secret.is_empty() {
        return Err(ClientError::Validation("Password is required".to_string()));
    }
    Ok(())
}

/// Fake vault service held entirely in memory
#[derive(Default)]
pub struct InMemoryVaultClient {
    state: Mutex<State>,
}

impl InMemoryVaultClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an account
    pub fn with_user(self, username: &str, email: &str, master_password: &str) -> Self {
        self.lock().accounts.insert(
            username.to_string(),
            Account {
                email: email.to_string(),
                master_password: master_password.to_string(),
            },
        );
        self
    }

    /// Issue a token for an existing or implicit user without a login call
    pub fn issue_token(&self, username: &str) -> String {
        self.lock().issue_token(username)
    }

    /// Store a record with a chosen id
    pub fn seed_record(&self, owner: &str, id: RecordId, input: RecordInput) -> SecretRecord {
        self.lock().insert(owner, id, &input)
    }

    pub fn set_categories(&self, categories: Vec<String>) {
        self.lock().categories = categories;
    }

    /// Make the next call of `op` fail with `err` (queued, one per call)
    pub fn fail_next(&self, op: Operation, err: ClientError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Delay the next call of `op` (queued, one per call)
    pub fn delay_next(&self, op: Operation, delay: Duration) {
        self.lock().delays.entry(op).or_default().push_back(delay);
    }

    /// How many times `op` has been called
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Count the call, then apply any injected delay and failure
    async fn enter(&self, op: Operation) -> ClientResult<()> {
        let (delay, failure) = {
            let mut state = self.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            let delay = state.delays.get_mut(&op).and_then(VecDeque::pop_front);
            let failure = state.failures.get_mut(&op).and_then(VecDeque::pop_front);
            (delay, failure)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VaultClient for InMemoryVaultClient {
    async fn register(
        &self,
        username: &str,
        email: &str,
        master_password: &str,
    ) -> ClientResult<AuthResponse> {
        self.enter(Operation::Register).await?;
        let mut state = self.lock();

        if username.trim().is_empty() {
            return Err(ClientError::Validation("Username is required".to_string()));
        }
        if state.accounts.contains_key(username) {
            return Err(ClientError::Validation("Username already exists".to_string()));
        }

        state.accounts.insert(
            username.to_string(),
            Account {
                email: email.to_string(),
                master_password: master_password.to_string(),
            },
        );
        let token = state.issue_token(username);

        Ok(AuthResponse {
            token,
            username: username.to_string(),
            email: email.to_string(),
            message: "User registered successfully".to_string(),
        })
    }

    async fn login(&self, username: &str, master_password: &str) -> ClientResult<AuthResponse> {
        self.enter(Operation::Login).await?;
        let mut state = self.lock();

        let email = match state.accounts.get(username) {
            Some(account) if account.master_password == master_password => account.email.clone(),
            _ => {
                return Err(ClientError::Unauthorized(Some(
                    "Invalid username or password".to_string(),
                )))
            }
        };
        let token = state.issue_token(username);

        Ok(AuthResponse {
            token,
            username: username.to_string(),
            email,
            message: "Login successful".to_string(),
        })
    }

    async fn generate_password(&self, policy: &PasswordPolicy) -> ClientResult<String> {
        self.enter(Operation::GeneratePassword).await?;

        if policy.length < 8 {
            return Err(ClientError::Validation(
                "Password length must be at least 8 characters".to_string(),
            ));
        }

        let classes: Vec<&str> = [
            (policy.include_uppercase, UPPERCASE),
            (policy.include_lowercase, LOWERCASE),
            (policy.include_numbers, NUMBERS),
            (policy.include_symbols, SYMBOLS),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, chars)| chars)
        .collect();

        if classes.is_empty() {
            return Err(ClientError::Validation(
                "At least one character type must be selected".to_string(),
            ));
        }

        let mut state = self.lock();
        state.generated += 1;
        let seed = state.generated as usize;

        // One character from every enabled class, then cycle through the pool
        let pool: Vec<char> = classes.concat().chars().collect();
        let password: String = (0..policy.length as usize)
            .map(|i| match classes.get(i) {
                Some(class) => {
                    let chars: Vec<char> = class.chars().collect();
                    chars[(seed + i) % chars.len()]
                }
                None => pool[(seed * 13 + i * 7) % pool.len()],
            })
            .collect();

        Ok(password)
    }

    async fn generate_pin(&self, policy: &PinPolicy) -> ClientResult<String> {
        self.enter(Operation::GeneratePin).await?;

        if policy.length < 4 {
            return Err(ClientError::Validation(
                "PIN length must be at least 4 digits".to_string(),
            ));
        }
        if policy.length > 12 {
            return Err(ClientError::Validation(
                "PIN length cannot exceed 12 digits".to_string(),
            ));
        }

        let mut state = self.lock();
        state.generated += 1;
        let seed = state.generated as usize;
        let digits: Vec<char> = NUMBERS.chars().collect();

        Ok((0..policy.length as usize)
            .map(|i| digits[(seed * 3 + i * 7) % digits.len()])
            .collect())
    }

    async fn categories(&self) -> ClientResult<Vec<String>> {
        self.enter(Operation::Categories).await?;
        Ok(self.lock().categories.clone())
    }

    async fn list_records(&self, token: &str) -> ClientResult<Vec<SecretRecord>> {
        self.enter(Operation::ListRecords).await?;
        let state = self.lock();
        let username = state.user_for(token)?;

        Ok(state
            .records
            .values()
            .filter(|stored| stored.owner == username)
            .map(|stored| stored.record.clone())
            .collect())
    }

    async fn create_record(&self, token: &str, input: &RecordInput) -> ClientResult<SecretRecord> {
        self.enter(Operation::CreateRecord).await?;
        let mut state = self.lock();
        let username = state.user_for(token)?;
        validate_input(input)?;

        let id = state.next_id;
        Ok(state.insert(&username, id, input))
    }

    async fn get_record(&self, token: &str, id: RecordId) -> ClientResult<SecretRecord> {
        self.enter(Operation::GetRecord).await?;
        let state = self.lock();
        let username = state.user_for(token)?;
        Ok(state.owned(&username, id)?.record.clone())
    }

    async fn update_record(
        &self,
        token: &str,
        id: RecordId,
        input: &RecordInput,
    ) -> ClientResult<SecretRecord> {
        self.enter(Operation::UpdateRecord).await?;
        let mut state = self.lock();
        let username = state.user_for(token)?;
        let created_at = state.owned(&username, id)?.record.created_at;
        validate_input(input)?;

        let mut record = state.insert(&username, id, input);
        record.created_at = created_at;
        if let Some(stored) = state.records.get_mut(&id) {
            stored.record.created_at = created_at;
        }
        Ok(record)
    }

    async fn delete_record(&self, token: &str, id: RecordId) -> ClientResult<()> {
        self.enter(Operation::DeleteRecord).await?;
        let mut state = self.lock();
        let username = state.user_for(token)?;
        state.owned(&username, id)?;
        state.records.remove(&id);
        Ok(())
    }

    async fn reveal_record(&self, token: &str, id: RecordId) -> ClientResult<String> {
        self.enter(Operation::RevealRecord).await?;
        let state = self.lock();
        let username = state.user_for(token)?;
        Ok(state.owned(&username, id)?.plaintext.clone())
    }
}
