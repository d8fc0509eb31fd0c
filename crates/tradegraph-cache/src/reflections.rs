use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::Connection;
use tradegraph_models::agent_message::AgentRole;
use tradegraph_models::cache_schema::REFLECTIONS_TABLE_DDL;
use tradegraph_models::memory::MemoryRecord;

use crate::error::CacheError;

/// Persistent memory of past outcomes, consulted by later runs.
pub trait MemoryStore: Send + Sync {
    fn record(&self, records: &[MemoryRecord]) -> Result<(), CacheError>;

    /// Most recent lessons for a role on a ticker from trade dates strictly
    /// before `before`, newest first.
    fn recall(
        &self,
        ticker: &str,
        role: AgentRole,
        before: NaiveDate,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, CacheError>;
}

/// SQLite-backed [`MemoryStore`].
pub struct SqliteReflectionStore {
    conn: Mutex<Connection>,
}

impl SqliteReflectionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(REFLECTIONS_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("reflection store mutex poisoned: {e}")))
    }
}

impl MemoryStore for SqliteReflectionStore {
    fn record(&self, records: &[MemoryRecord]) -> Result<(), CacheError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO reflections (ticker, role, trade_date, record_json, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                stmt.execute(rusqlite::params![
                    record.ticker,
                    record.role.as_str(),
                    record.trade_date.to_string(),
                    serde_json::to_string(record)?,
                    record.recorded_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn recall(
        &self,
        ticker: &str,
        role: AgentRole,
        before: NaiveDate,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, CacheError> {
        let conn = self.lock()?;
        // ISO dates compare correctly as text
        let mut stmt = conn.prepare_cached(
            "SELECT record_json FROM reflections \
             WHERE ticker = ?1 AND role = ?2 AND trade_date < ?3 \
             ORDER BY trade_date DESC, id DESC LIMIT ?4",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(
                rusqlite::params![ticker, role.as_str(), before.to_string(), limit],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(CacheError::from))
            .collect()
    }
}

/// Process-local [`MemoryStore`], for tests and runs that should not persist.
#[derive(Default)]
pub struct InMemoryReflectionStore {
    records: Mutex<Vec<MemoryRecord>>,
}

impl InMemoryReflectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryStore for InMemoryReflectionStore {
    fn record(&self, records: &[MemoryRecord]) -> Result<(), CacheError> {
        let mut stored = self
            .records
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("reflection store mutex poisoned: {e}")))?;
        stored.extend_from_slice(records);
        Ok(())
    }

    fn recall(
        &self,
        ticker: &str,
        role: AgentRole,
        before: NaiveDate,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, CacheError> {
        let stored = self
            .records
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("reflection store mutex poisoned: {e}")))?;
        let mut matching: Vec<&MemoryRecord> = stored
            .iter()
            .rev()
            .filter(|r| r.ticker == ticker && r.role == role && r.trade_date < before)
            .collect();
        // stable: newest insert first within a date
        matching.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));
        Ok(matching.into_iter().take(limit).cloned().collect())
    }
}
