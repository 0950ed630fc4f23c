//! Observable operation state
//!
//! Each asynchronous capability owns one [`Slot`]. A slot moves through
//! `Idle -> Loading -> Success | Error`, goes back to `Idle` on reset, and
//! may re-enter `Loading` straight from a terminal state. Every transition
//! replaces the previous value; nothing is merged.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use crate::error::OperationError;

/// Lifecycle of one asynchronous operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState<T> {
    Idle,
    Loading,
    Success(T),
    Error(OperationError),
}

impl<T> Default for OperationState<T> {
    fn default() -> Self {
        Self::Idle
    }
}

/// Discriminant of an [`OperationState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Idle,
    Loading,
    Success,
    Error,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::Idle => "idle",
            StateKind::Loading => "loading",
            StateKind::Success => "success",
            StateKind::Error => "error",
        }
    }
}

impl<T> OperationState<T> {
    pub fn kind(&self) -> StateKind {
        match self {
            OperationState::Idle => StateKind::Idle,
            OperationState::Loading => StateKind::Loading,
            OperationState::Success(_) => StateKind::Success,
            OperationState::Error(_) => StateKind::Error,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, OperationState::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, OperationState::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationState::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OperationState::Error(_))
    }

    /// Success or Error
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Success(_) | OperationState::Error(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            OperationState::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&OperationError> {
        match self {
            OperationState::Error(err) => Some(err),
            _ => None,
        }
    }

    /// The outcome, if the operation has finished
    pub fn into_result(self) -> Option<Result<T, OperationError>> {
        match self {
            OperationState::Success(value) => Some(Ok(value)),
            OperationState::Error(err) => Some(Err(err)),
            OperationState::Idle | OperationState::Loading => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationState<U> {
        match self {
            OperationState::Idle => OperationState::Idle,
            OperationState::Loading => OperationState::Loading,
            OperationState::Success(value) => OperationState::Success(f(value)),
            OperationState::Error(err) => OperationState::Error(err),
        }
    }
}

impl<T> From<Result<T, OperationError>> for OperationState<T> {
    fn from(result: Result<T, OperationError>) -> Self {
        match result {
            Ok(value) => OperationState::Success(value),
            Err(err) => OperationState::Error(err),
        }
    }
}

/// A value cell that notifies subscribers whenever it is replaced
pub struct StateCell<T> {
    tx: watch::Sender<T>,
}

impl<T> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Snapshot of the current value
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.tx.borrow().clone()
    }

    /// Inspect the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the value, returning the previous one
    pub fn set(&self, value: T) -> T {
        self.tx.send_replace(value)
    }

    /// Modify in place; subscribers are notified only when `f` returns true
    pub fn set_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("value", &*self.tx.borrow())
            .finish()
    }
}

/// How a slot resolves overlapping invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Whichever invocation resolves last determines the terminal state
    LastWrite,
    /// Results of invocations superseded by a newer one are discarded
    LatestInitiated,
}

/// Identifies one invocation of a slot's operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// The state slot of a single operation
pub struct Slot<T> {
    cell: StateCell<OperationState<T>>,
    epoch: AtomicU64,
    policy: WritePolicy,
}

impl<T> Slot<T> {
    pub fn new(policy: WritePolicy) -> Self {
        Self {
            cell: StateCell::new(OperationState::Idle),
            epoch: AtomicU64::new(0),
            policy,
        }
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Enter `Loading` for a new invocation.
    ///
    /// The transition is visible to readers before this returns.
    pub fn begin(&self) -> Ticket {
        let mut ticket = Ticket(0);
        self.cell.tx.send_modify(|state| {
            ticket = Ticket(self.epoch.fetch_add(1, Ordering::SeqCst) + 1);
            *state = OperationState::Loading;
        });
        ticket
    }

    /// Publish the outcome of an invocation. Returns false when the result
    /// was discarded because a newer invocation (or a reset) superseded it.
    pub fn finish(&self, ticket: Ticket, outcome: OperationState<T>) -> bool {
        let policy = self.policy;
        let epoch = &self.epoch;
        self.cell.set_if(move |state| {
            if policy == WritePolicy::LatestInitiated && epoch.load(Ordering::SeqCst) != ticket.0 {
                return false;
            }
            *state = outcome;
            true
        })
    }

    /// Whether `ticket` still belongs to the most recent invocation
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.epoch.load(Ordering::SeqCst) == ticket.0
    }

    /// Back to `Idle`. Idempotent, no side effects beyond the slot itself.
    pub fn reset(&self) {
        self.publish(OperationState::Idle);
    }

    /// Overwrite the state directly, superseding anything in flight
    pub fn publish(&self, state: OperationState<T>) {
        self.cell.tx.send_modify(|current| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *current = state;
        });
    }

    pub fn state(&self) -> OperationState<T>
    where
        T: Clone,
    {
        self.cell.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&OperationState<T>) -> R) -> R {
        self.cell.with(f)
    }

    pub fn subscribe(&self) -> watch::Receiver<OperationState<T>> {
        self.cell.subscribe()
    }

    /// Wait for the next terminal state (returns immediately if the slot is
    /// already terminal). Never resolves while the slot sits at `Idle`.
    pub async fn settled(&self) -> OperationState<T>
    where
        T: Clone,
    {
        let mut rx = self.subscribe();
        settle(&mut rx).await
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("state", &*self.cell.tx.borrow())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Wait on a receiver until it holds a terminal state
pub async fn settle<T: Clone>(rx: &mut watch::Receiver<OperationState<T>>) -> OperationState<T> {
    let settled = rx
        .wait_for(|state| state.is_terminal())
        .await
        .map(|state| (*state).clone());

    match settled {
        Ok(state) => state,
        Err(_) => rx.borrow().clone(),
    }
}
