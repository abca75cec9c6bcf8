//! Database schema migrations.
//!
//! The schema mirrors a key-value layout: every row is addressed by a
//! namespaced logical key (see [`crate::keys`]). Scalar values, sets,
//! counters, the status ledger and history records get their own tables so
//! that each operation is a single statement.

use rusqlite::Connection;
use tracing::info;

use relay_core::error::StoreError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| StoreError::Unavailable(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        -- Scalar values (JSON): user:info, user:uid, configure.
        CREATE TABLE IF NOT EXISTS kv (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL
        );

        -- Set members: user:smart, user:question.
        CREATE TABLE IF NOT EXISTS kv_set (
            key         TEXT NOT NULL,
            member      TEXT NOT NULL,
            PRIMARY KEY (key, member)
        );

        -- Counters: used.
        CREATE TABLE IF NOT EXISTS counters (
            key         TEXT PRIMARY KEY NOT NULL,
            value       INTEGER NOT NULL DEFAULT 0
        );

        -- Dedup ledger: session:status.
        CREATE TABLE IF NOT EXISTS ledger (
            key         TEXT PRIMARY KEY NOT NULL,
            status      TEXT NOT NULL
                        CHECK (status IN ('processing', 'completion', 'error')),
            updated_at  INTEGER NOT NULL
        );

        -- Immutable history: session:record.
        CREATE TABLE IF NOT EXISTS session_records (
            key         TEXT PRIMARY KEY NOT NULL,
            session_id  TEXT NOT NULL UNIQUE,
            uid         TEXT NOT NULL,
            recorded_at INTEGER NOT NULL,
            value       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_session_records_uid_time
            ON session_records (uid, recorded_at ASC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| StoreError::Unavailable(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}
