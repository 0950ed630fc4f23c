//! passvault-core - Shared building blocks for the passvault client
//!
//! Holds the pieces every other crate leans on: where files live, how the
//! client is configured, the error taxonomy, and the observable state slot
//! each asynchronous operation publishes into.

pub mod config;
pub mod error;
pub mod paths;
pub mod state;

pub use config::Config;
pub use error::{ErrorKind, OperationError};
pub use paths::Paths;
pub use state::{OperationState, Slot, StateCell, StateKind, Ticket, WritePolicy};
