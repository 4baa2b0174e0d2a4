//! SQLite storage for the key-value backend
//!
//! This module handles:
//! - Database initialization and migrations
//! - Reading and replacing blobs in the `kv` table

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use crate::backend::Backend;

/// Migrations compiled into the binary, applied in order
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema",
    include_str!("../db/migrations/001_initial_schema.sql"),
)];

/// Open the database at the given path, running any pending migrations
pub fn init_db(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let count = run_migrations(&conn)?;
    if count > 0 {
        info!(count = count, "Applied migrations");
    }

    Ok(conn)
}

/// Apply every embedded migration not yet recorded in `schema_migrations`
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let mut applied = 0;

    for (version, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
            [version],
            |row| row.get(0),
        )?;

        if already_applied {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("Failed to apply migration: {}", version))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            [version],
        )?;
        tx.commit()?;

        debug!(version = %version, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

/// Backend storing each key as a row of the `kv` table
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            conn: init_db(db_path)?,
        })
    }

    #[cfg(test)]
    pub fn from_connection(conn: Connection) -> Result<Self> {
        run_migrations(&conn)?;
        Ok(Self { conn })
    }
}

impl Backend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("Failed to read key {}", key))?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value],
            )
            .with_context(|| format!("Failed to write key {}", key))?;

        debug!(key = %key, bytes = value.len(), "Blob saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_db() -> (TempDir, SqliteBackend) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let backend = SqliteBackend::open(&db_path).unwrap();
        (temp_dir, backend)
    }

    // ========== init_db tests ==========

    #[test]
    fn test_init_db_creates_tables() {
        let (_temp_dir, backend) = setup_test_db();

        let table_exists: bool = backend
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='kv'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(table_exists);
    }

    #[test]
    fn test_init_db_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn1 = init_db(&db_path).unwrap();
        drop(conn1);
        let conn2 = init_db(&db_path).unwrap();

        assert_eq!(run_migrations(&conn2).unwrap(), 0);
    }

    #[test]
    fn test_init_db_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("kiroku.db");
        init_db(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_in_memory_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let mut backend = SqliteBackend::from_connection(conn).unwrap();
        backend.set("k", "v").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("v"));
    }

    // ========== Backend tests ==========

    #[test]
    fn test_get_missing_key() {
        let (_temp_dir, backend) = setup_test_db();
        assert!(backend.get("learningRecords").unwrap().is_none());
    }

    #[test]
    fn test_set_replaces_value() {
        let (_temp_dir, mut backend) = setup_test_db();
        backend.set("learningRecords", "[]").unwrap();
        backend.set("learningRecords", "[1]").unwrap();

        assert_eq!(
            backend.get("learningRecords").unwrap().as_deref(),
            Some("[1]")
        );

        let rows: i64 = backend
            .conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        SqliteBackend::open(&db_path)
            .unwrap()
            .set("k", "persisted")
            .unwrap();

        let reopened = SqliteBackend::open(&db_path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("persisted"));
    }
}
