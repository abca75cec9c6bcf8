//! Key-value primitives over the SQLite tables.
//!
//! Each helper is a single statement against one logical key.

use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use relay_core::error::StoreError;

pub(crate) fn unavailable(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Read and decode a JSON value. `Ok(None)` when the key is absent.
pub(crate) fn get_json<T: DeserializeOwned>(
    conn: &Connection,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(unavailable)?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Write a JSON value, replacing any previous one.
pub(crate) fn put_json<T: Serialize>(
    conn: &Connection,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, raw],
    )
    .map_err(unavailable)?;
    Ok(())
}

/// Write a JSON value only if the key is absent. Returns whether it was written.
pub(crate) fn put_json_if_absent<T: Serialize>(
    conn: &Connection,
    key: &str,
    value: &T,
) -> Result<bool, StoreError> {
    let raw = serde_json::to_string(value)?;
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, raw],
        )
        .map_err(unavailable)?;
    Ok(changed == 1)
}

pub(crate) fn set_add(conn: &Connection, key: &str, member: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO kv_set (key, member) VALUES (?1, ?2)",
        params![key, member],
    )
    .map_err(unavailable)?;
    Ok(())
}

pub(crate) fn set_contains(conn: &Connection, key: &str, member: &str) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM kv_set WHERE key = ?1 AND member = ?2",
            params![key, member],
            |row| row.get(0),
        )
        .optional()
        .map_err(unavailable)?;
    Ok(found.is_some())
}

/// Members of a set in lexical order.
pub(crate) fn set_members(conn: &Connection, key: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT member FROM kv_set WHERE key = ?1 ORDER BY member ASC")
        .map_err(unavailable)?;
    let rows = stmt
        .query_map(params![key], |row| row.get::<_, String>(0))
        .map_err(unavailable)?;

    let mut members = Vec::new();
    for row in rows {
        members.push(row.map_err(unavailable)?);
    }
    Ok(members)
}

pub(crate) fn counter_incr(conn: &Connection, key: &str) -> Result<u64, StoreError> {
    let value: i64 = conn
        .query_row(
            "INSERT INTO counters (key, value) VALUES (?1, 1)
             ON CONFLICT(key) DO UPDATE SET value = value + 1
             RETURNING value",
            params![key],
            |row| row.get(0),
        )
        .map_err(unavailable)?;
    Ok(value as u64)
}

pub(crate) fn counter_get(conn: &Connection, key: &str) -> Result<u64, StoreError> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT value FROM counters WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(unavailable)?;
    Ok(value.unwrap_or(0) as u64)
}

/// Extension trait for rusqlite to support optional query results.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_json_put_get() {
        let conn = conn();
        assert_eq!(get_json::<String>(&conn, "k").unwrap(), None);
        put_json(&conn, "k", &"v1".to_string()).unwrap();
        put_json(&conn, "k", &"v2".to_string()).unwrap();
        assert_eq!(get_json::<String>(&conn, "k").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn test_put_if_absent() {
        let conn = conn();
        assert!(put_json_if_absent(&conn, "k", &1).unwrap());
        assert!(!put_json_if_absent(&conn, "k", &2).unwrap());
        assert_eq!(get_json::<i32>(&conn, "k").unwrap(), Some(1));
    }

    #[test]
    fn test_corrupt_json_is_unavailable() {
        let conn = conn();
        conn.execute("INSERT INTO kv (key, value) VALUES ('k', '{nope')", [])
            .unwrap();
        let err = get_json::<String>(&conn, "k").unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_sets() {
        let conn = conn();
        set_add(&conn, "s", "b").unwrap();
        set_add(&conn, "s", "a").unwrap();
        set_add(&conn, "s", "a").unwrap();
        assert_eq!(set_members(&conn, "s").unwrap(), vec!["a", "b"]);
        assert!(set_contains(&conn, "s", "a").unwrap());
        assert!(!set_contains(&conn, "s", "c").unwrap());
        assert!(set_members(&conn, "other").unwrap().is_empty());
    }

    #[test]
    fn test_counters() {
        let conn = conn();
        assert_eq!(counter_get(&conn, "c").unwrap(), 0);
        assert_eq!(counter_incr(&conn, "c").unwrap(), 1);
        assert_eq!(counter_incr(&conn, "c").unwrap(), 2);
        assert_eq!(counter_get(&conn, "c").unwrap(), 2);
    }
}
