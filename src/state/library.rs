use chrono::DateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::{Path, PathBuf};
use tracing::info;

use super::data::{HistoryItem, HistoryRecord};
use crate::error::Result;

/// The Library manages the SQLite database.
/// It stores colorization history and a small key-value settings table.
pub struct Library {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl Library {
    /// Open (or create) the database at `db_path` and initialize the schema.
    ///
    /// The parent directory is created if needed.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        info!("Database opened at {}", db_path.display());

        let mut library = Library {
            conn,
            db_path: Some(db_path.to_path_buf()),
        };
        library.init_schema()?;

        Ok(library)
    }

    /// Private in-memory database, used by tests
    pub fn open_in_memory() -> SqlResult<Self> {
        let mut library = Library {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&mut self) -> SqlResult<()> {
        // Both blobs and the timestamp are optional, matching HistoryItem
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS history_items (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                input_image     BLOB,
                result_image    BLOB,
                created_at      INTEGER
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_created_at
             ON history_items(created_at DESC)",
            [],
        )?;

        // Key-value settings (e.g. where the downloaded model lives)
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Path to the database file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Number of saved history items
    pub fn history_count(&self) -> SqlResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM history_items", [], |row| row.get(0))
    }

    /// Save a history item
    /// Returns the new item ID
    pub fn save_history_item(&self, item: &HistoryItem) -> SqlResult<i64> {
        let created_at = item.timestamp.map(|t| t.timestamp_millis());

        self.conn.execute(
            "INSERT INTO history_items (input_image, result_image, created_at) VALUES (?1, ?2, ?3)",
            params![item.input_image, item.result_image, created_at],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Get all history items, newest first
    /// Items without a timestamp come last
    pub fn history_items(&self) -> SqlResult<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, input_image, result_image, created_at FROM history_items
             ORDER BY created_at IS NULL, created_at DESC, id DESC",
        )?;

        let records = stmt.query_map([], record_from_row)?;
        records.collect()
    }

    /// Get one history item by ID
    pub fn history_item(&self, id: i64) -> SqlResult<Option<HistoryRecord>> {
        self.conn
            .query_row(
                "SELECT id, input_image, result_image, created_at FROM history_items WHERE id = ?1",
                params![id],
                record_from_row,
            )
            .optional()
    }

    /// Read a setting
    pub fn setting(&self, key: &str) -> SqlResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    /// Write a setting, replacing any previous value
    pub fn set_setting(&self, key: &str, value: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> SqlResult<HistoryRecord> {
    let created_at: Option<i64> = row.get(3)?;
    Ok(HistoryRecord {
        id: row.get(0)?,
        item: HistoryItem {
            input_image: row.get(1)?,
            result_image: row.get(2)?,
            timestamp: created_at.and_then(DateTime::from_timestamp_millis),
        },
    })
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
