//! DuckDB-backed archive of generation winners.

use duckdb::{Connection, params};
use flotilla_core::{ArtifactError, ArtifactStore, Cohort, Genome, WinnerRecord};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_FLUSH_THRESHOLD: usize = 4;

/// Storage error wrapper.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("genome encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown cohort label {0:?}")]
    UnknownCohort(String),
    #[error("storage lock poisoned")]
    Poisoned,
}

impl From<StorageError> for ArtifactError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Json(inner) => ArtifactError::Encode {
                name: "genome".to_string(),
                reason: inner.to_string(),
            },
            other => ArtifactError::Backend(other.to_string()),
        }
    }
}

/// Row staged for the `winners` table.
#[derive(Debug, Clone)]
struct WinnerRow {
    name: String,
    cohort: &'static str,
    generation: i64,
    points: f64,
    genome: String,
}

impl WinnerRow {
    fn encode(record: &WinnerRecord) -> Result<Self, StorageError> {
        Ok(Self {
            name: record.name.clone(),
            cohort: record.cohort.label(),
            generation: i64::from(record.generation),
            points: f64::from(record.points),
            genome: serde_json::to_string(&record.genome)?,
        })
    }
}

/// Ranked entry returned by [`WinnerStore::leaderboard`].
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub cohort: Cohort,
    pub generation: u32,
    pub points: f64,
}

/// DuckDB-backed winner archive with buffered writes.
pub struct WinnerStore {
    conn: Connection,
    pending: Vec<WinnerRow>,
    flush_threshold: usize,
}

impl WinnerStore {
    /// Open or create a DuckDB database at the provided path.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::with_threshold(path, DEFAULT_FLUSH_THRESHOLD)
    }

    /// Open with a custom number of buffered winners per flush.
    pub fn with_threshold(path: &str, flush_threshold: usize) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open(path)?, flush_threshold)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?, DEFAULT_FLUSH_THRESHOLD)
    }

    fn from_connection(conn: Connection, flush_threshold: usize) -> Result<Self, StorageError> {
        let mut store = Self {
            conn,
            pending: Vec::new(),
            flush_threshold: flush_threshold.max(1),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&mut self) -> Result<(), StorageError> {
        self.conn.execute(
            "create table if not exists winners (
                name text primary key,
                cohort text,
                generation bigint,
                points double,
                genome text
            )",
            [],
        )?;
        Ok(())
    }

    /// Stage a winner, flushing once the buffer reaches its threshold.
    pub fn record(&mut self, record: &WinnerRecord) -> Result<(), StorageError> {
        let row = WinnerRow::encode(record)?;
        self.pending.retain(|staged| staged.name != row.name);
        self.pending.push(row);
        if self.pending.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Write every staged winner in one transaction.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "insert or replace into winners (name, cohort, generation, points, genome)
                 values (?, ?, ?, ?, ?)",
            )?;
            for row in &self.pending {
                stmt.execute(params![
                    row.name,
                    row.cohort,
                    row.generation,
                    row.points,
                    row.genome
                ])?;
            }
        }
        tx.commit()?;
        debug!(rows = self.pending.len(), "flushed winners");
        self.pending.clear();
        Ok(())
    }

    /// Every archived winner of `cohort`, oldest generation first.
    pub fn winners(&mut self, cohort: Cohort) -> Result<Vec<WinnerRecord>, StorageError> {
        self.flush()?;
        let mut stmt = self.conn.prepare(
            "select name, generation, points, genome
             from winners
             where cohort = ?
             order by generation asc",
        )?;
        let mut rows = stmt.query(params![cohort.label()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let genome: String = row.get(3)?;
            records.push(WinnerRecord {
                name: row.get(0)?,
                cohort,
                generation: row.get::<_, i64>(1)? as u32,
                points: row.get::<_, f64>(2)? as f32,
                genome: serde_json::from_str(&genome)?,
            });
        }
        Ok(records)
    }

    /// Genome stored under `name`, if any.
    pub fn load_genome(&mut self, name: &str) -> Result<Option<Genome>, StorageError> {
        self.flush()?;
        let mut stmt = self
            .conn
            .prepare("select genome from winners where name = ?")?;
        let mut rows = stmt.query(params![name])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let genome: String = row.get(0)?;
        Ok(Some(serde_json::from_str(&genome)?))
    }

    /// Highest scoring winners across all cohorts.
    pub fn leaderboard(&mut self, limit: usize) -> Result<Vec<LeaderboardEntry>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.flush()?;
        let mut stmt = self.conn.prepare(
            "select name, cohort, generation, points
             from winners
             order by points desc, generation asc, name asc
             limit ?",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut entries = Vec::with_capacity(limit.min(16));
        while let Some(row) = rows.next()? {
            let label: String = row.get(1)?;
            let cohort = Cohort::from_label(&label).ok_or(StorageError::UnknownCohort(label))?;
            entries.push(LeaderboardEntry {
                name: row.get(0)?,
                cohort,
                generation: row.get::<_, i64>(2)? as u32,
                points: row.get(3)?,
            });
        }
        Ok(entries)
    }
}

impl Drop for WinnerStore {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(error = %err, "failed to flush winner buffer on drop");
        }
    }
}

impl ArtifactStore for WinnerStore {
    fn save(&mut self, record: &WinnerRecord) -> Result<(), ArtifactError> {
        self.record(record).map_err(ArtifactError::from)
    }
}

/// Shareable handle so the archive can be queried while a simulation owns it.
#[derive(Clone)]
pub struct SharedWinnerStore {
    inner: Arc<Mutex<WinnerStore>>,
}

impl SharedWinnerStore {
    #[must_use]
    pub fn new(store: WinnerStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Access the underlying store handle.
    #[must_use]
    pub fn storage(&self) -> Arc<Mutex<WinnerStore>> {
        Arc::clone(&self.inner)
    }

    /// Run `f` with exclusive access to the store.
    pub fn with<T>(
        &self,
        f: impl FnOnce(&mut WinnerStore) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
        f(&mut *guard)
    }
}

impl ArtifactStore for SharedWinnerStore {
    fn save(&mut self, record: &WinnerRecord) -> Result<(), ArtifactError> {
        self.with(|store| store.record(record))
            .map_err(ArtifactError::from)
    }
}
