//! Persistence contracts for identities, configures and sessions.
//!
//! Backends are expected to be safe for concurrent access to independent
//! keys. No multi-key transactions are offered: a read followed by a write
//! on another key is two separate operations.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::types::{Configure, Session, SessionId, SessionStatus, User, UserUid};

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Optional features a backend may or may not provide.
///
/// Callers feature-detect with these flags instead of relying on a
/// `NotImplemented` error at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCapabilities {
    /// `get_history` narrows results to the requested time range.
    pub history_range: bool,
    /// `get_balance` returns real balances.
    pub balance: bool,
    /// `record_error` / `get_error` persist failure details.
    pub error_detail: bool,
}

/// Maps platform identities to users, and holds grants and configures.
pub trait IdentityCache: Send + Sync {
    /// Resolve `(platform, external_id)` to a uid. `NotFound` when unbound.
    fn resolve_uid(&self, platform: &str, external_id: &str) -> StoreResult<UserUid>;

    /// Load a user record. Absence is `Ok(None)`.
    fn get_user(&self, uid: &UserUid) -> StoreResult<Option<User>>;

    /// Create a user record. `AlreadyExists` if the uid is taken.
    fn create_user(&self, user: &User) -> StoreResult<()>;

    /// Bind a platform identity to an existing user. Last write wins.
    fn bind_identity(&self, platform: &str, external_id: &str, uid: &UserUid) -> StoreResult<()>;

    /// Add answer ids to the user's entitlement set.
    fn grant_entitlement(&self, uid: &UserUid, answer_ids: &[String]) -> StoreResult<()>;

    /// Add answer ids to the default-answer set.
    ///
    /// Fails with `AccessDenied` if any id is not already entitled; nothing
    /// is written in that case.
    fn set_default_answers(&self, uid: &UserUid, answer_ids: &[String]) -> StoreResult<()>;

    fn get_entitlements(&self, uid: &UserUid) -> StoreResult<Vec<String>>;

    fn get_default_answers(&self, uid: &UserUid) -> StoreResult<Vec<String>>;

    /// Store a configure blob, replacing any previous value wholesale.
    fn put_configure(&self, id: &str, configure: &Configure) -> StoreResult<()>;

    /// Load a configure blob. `NotFound` when absent.
    fn get_configure(&self, id: &str) -> StoreResult<Configure>;

    /// Remaining balance of a user.
    fn get_balance(&self, _uid: &UserUid) -> StoreResult<f64> {
        Err(StoreError::NotImplemented("balance"))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }
}

/// Dedup ledger and session history.
pub trait SessionStore: Send + Sync {
    /// Unconditionally overwrite the ledger entry for a session.
    fn set_status(&self, id: &SessionId, status: SessionStatus) -> StoreResult<()>;

    /// Read the ledger entry; `SessionStatus::None` if never set.
    fn get_status(&self, id: &SessionId) -> StoreResult<SessionStatus>;

    /// Atomically mark a session `Processing` if it is absent or `Error`.
    ///
    /// Returns `true` when this caller won the claim. Concurrent callers for
    /// the same id see exactly one `true`.
    fn try_claim(&self, id: &SessionId) -> StoreResult<bool>;

    /// Persist an immutable history record and bump the daily usage counter.
    fn save_session(&self, session: &Session) -> StoreResult<()>;

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    /// Sessions of a user recorded within `[start, end]`.
    fn get_history(
        &self,
        uid: &UserUid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Session>>;

    /// Number of sessions saved for a user on a given day.
    fn usage(&self, uid: &UserUid, day: NaiveDate) -> StoreResult<u64>;

    fn record_error(&self, _id: &SessionId, _detail: &str) -> StoreResult<()> {
        Err(StoreError::NotImplemented("error_detail"))
    }

    fn get_error(&self, _id: &SessionId) -> StoreResult<Option<String>> {
        Err(StoreError::NotImplemented("error_detail"))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }
}
