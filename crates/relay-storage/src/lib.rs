//! Relay Storage crate - SQLite persistence for identities and sessions.
//!
//! Provides a WAL-mode SQLite database with migrations, an identity cache
//! (users, platform bindings, grants, configures) and a session store
//! (dedup ledger, immutable history, daily usage counters).

pub mod db;
pub mod identity;
pub mod keys;
mod kv;
pub mod migrations;
pub mod sessions;

pub use db::Database;
pub use identity::SqliteIdentityCache;
pub use sessions::SqliteSessionStore;
