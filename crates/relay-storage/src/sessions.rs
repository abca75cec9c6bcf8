//! SQLite-backed session store: dedup ledger, history records, usage counters.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use tracing::debug;

use relay_core::error::StoreError;
use relay_core::store::{SessionStore, StoreCapabilities, StoreResult};
use relay_core::types::{Session, SessionId, SessionStatus, UserUid};

use crate::db::Database;
use crate::keys;
use crate::kv::{self, unavailable, OptionalExt};

/// Session store over the shared [`Database`].
pub struct SqliteSessionStore {
    db: Arc<Database>,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SessionStore for SqliteSessionStore {
    fn set_status(&self, id: &SessionId, status: SessionStatus) -> StoreResult<()> {
        let key = keys::session_status(id);
        self.db.with_conn(|conn| {
            if status == SessionStatus::None {
                conn.execute("DELETE FROM ledger WHERE key = ?1", params![key])
                    .map_err(unavailable)?;
            } else {
                conn.execute(
                    "INSERT INTO ledger (key, status, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE
                     SET status = excluded.status, updated_at = excluded.updated_at",
                    params![key, status.to_string(), Utc::now().timestamp()],
                )
                .map_err(unavailable)?;
            }
            Ok(())
        })
    }

    fn get_status(&self, id: &SessionId) -> StoreResult<SessionStatus> {
        let key = keys::session_status(id);
        self.db.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT status FROM ledger WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(unavailable)?;

            match raw {
                Some(raw) => raw.parse().map_err(StoreError::Unavailable),
                None => Ok(SessionStatus::None),
            }
        })
    }

    fn try_claim(&self, id: &SessionId) -> StoreResult<bool> {
        let key = keys::session_status(id);
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "INSERT INTO ledger (key, status, updated_at) VALUES (?1, 'processing', ?2)
                     ON CONFLICT(key) DO UPDATE
                     SET status = 'processing', updated_at = excluded.updated_at
                     WHERE ledger.status = 'error'",
                    params![key, Utc::now().timestamp()],
                )
                .map_err(unavailable)?;
            Ok(changed == 1)
        })
    }

    fn save_session(&self, session: &Session) -> StoreResult<()> {
        let user = session
            .user
            .as_ref()
            .ok_or_else(|| StoreError::NotFound(format!("user of session [{}]", session.id)))?;
        let now = Utc::now();
        let day = now.date_naive();
        let record_key = keys::session_record(day, &user.uid, &session.id);
        let raw = serde_json::to_string(session)?;

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(unavailable)?;
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO session_records (key, session_id, uid, recorded_at, value)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record_key,
                        session.id.as_str(),
                        user.uid.as_str(),
                        now.timestamp(),
                        raw
                    ],
                )
                .map_err(unavailable)?;
            if inserted == 0 {
                return Err(StoreError::AlreadyExists(format!(
                    "session record [{}]",
                    session.id
                )));
            }
            let used = kv::counter_incr(&tx, &keys::used(day, &user.uid))?;
            tx.commit().map_err(unavailable)?;
            debug!(session_id = %session.id, uid = %user.uid, used, "Session saved");
            Ok(())
        })
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        self.db.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM session_records WHERE session_id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(unavailable)?;

            match raw {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
    }

    fn get_history(
        &self,
        uid: &UserUid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Session>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT value FROM session_records
                     WHERE uid = ?1 AND recorded_at >= ?2 AND recorded_at <= ?3
                     ORDER BY recorded_at ASC, key ASC",
                )
                .map_err(unavailable)?;

            let rows = stmt
                .query_map(
                    params![uid.as_str(), start.timestamp(), end.timestamp()],
                    |row| row.get::<_, String>(0),
                )
                .map_err(unavailable)?;

            let mut sessions = Vec::new();
            for row in rows {
                let raw = row.map_err(unavailable)?;
                sessions.push(serde_json::from_str(&raw)?);
            }
            Ok(sessions)
        })
    }

    fn usage(&self, uid: &UserUid, day: NaiveDate) -> StoreResult<u64> {
        self.db
            .with_conn(|conn| kv::counter_get(conn, &keys::used(day, uid)))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            history_range: true,
            ..StoreCapabilities::default()
        }
    }
}
