//! Core domain types, errors, configuration and persistence contracts for the
//! chat relay.

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::{CompletionPolicy, RelayConfig};
pub use error::{RelayError, Result, StoreError};
pub use store::{IdentityCache, SessionStore, StoreCapabilities, StoreResult};
pub use types::*;
