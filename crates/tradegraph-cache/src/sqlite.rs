use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, Row};
use tradegraph_models::cache_schema::{CacheCategory, CacheRow, CACHE_TABLE_DDL};

use crate::error::CacheError;

const SELECT_COLUMNS: &str = "SELECT key, category, value_json, source, symbol, fetched_at FROM cache_entries";

/// SQLite store of historical data-source payloads.
///
/// Runs read it through [`crate::CacheReader`]; population is done by whatever
/// tooling downloads the data, using [`SqliteCache::put`].
pub struct SqliteCache {
    conn: Connection,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CacheRow> {
    Ok(CacheRow {
        key: row.get(0)?,
        category: row.get(1)?,
        value_json: row.get(2)?,
        source: row.get(3)?,
        symbol: row.get(4)?,
        fetched_at: row.get(5)?,
    })
}

impl SqliteCache {
    /// Open an existing cache file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open (or create) a writable cache file and make sure the schema exists.
    pub fn open_writable(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// In-memory database with the schema applied, for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<CacheRow>, CacheError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{SELECT_COLUMNS} WHERE key = ?1"))?;

        match stmt.query_row(rusqlite::params![key], map_row) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CacheError::Sqlite(e)),
        }
    }

    /// Insert or replace a payload under `key`.
    pub fn put(
        &self,
        key: &str,
        category: CacheCategory,
        symbol: &str,
        source: &str,
        value: &serde_json::Value,
    ) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries \
             (key, category, value_json, source, symbol, fetched_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                key,
                category.as_str(),
                serde_json::to_string(value)?,
                source,
                symbol,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
