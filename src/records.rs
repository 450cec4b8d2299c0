//! Record store boundary: best-effort persistence of completed runs.
//!
//! The store is strictly a side channel. Appending a [`RunRecord`] happens
//! after a run computes its outcome, and a store failure is logged and
//! reported as a diagnostic; it never changes the run's externally visible
//! result. See [`api::submit`](crate::api::submit) for the degradation site.
//!
//! Two implementations ship: [`InMemoryRecordStore`] for tests and demos, and
//! [`JsonFileRecordStore`], a newest-first JSON file capped at
//! [`MAX_RECORDS`] entries with substring filtering over query and report.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Upper bound on retained records; the oldest fall off first.
pub const MAX_RECORDS: usize = 100;

/// Opaque identifier of a stored run record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Summary of one completed run.
///
/// `duration_ms` stays `None` for runs that started without a timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RecordId,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub effort: String,
    pub model: Option<String>,
    pub report: String,
    pub queries: Vec<String>,
    pub source_count: usize,
    pub duration_ms: Option<u64>,
}

impl RunRecord {
    #[must_use]
    pub fn new(query: &str, report: &str) -> Self {
        Self {
            id: RecordId::new(),
            query: query.to_string(),
            created_at: Utc::now(),
            effort: "medium".to_string(),
            model: None,
            report: report.to_string(),
            queries: Vec::new(),
            source_count: 0,
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn with_effort(mut self, effort: &str) -> Self {
        self.effort = effort.to_string();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_queries(mut self, queries: Vec<String>) -> Self {
        self.queries = queries;
        self
    }

    #[must_use]
    pub fn with_source_count(mut self, count: usize) -> Self {
        self.source_count = count;
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Case-insensitive substring match over query and report text.
    #[must_use]
    pub fn matches_filter(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.query.to_lowercase().contains(&needle)
            || self.report.to_lowercase().contains(&needle)
    }
}

/// Record store failures. Callers treat these as diagnostics, not run errors.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("record store I/O failure at {path}")]
    #[diagnostic(
        code(delvegraph::records::io),
        help("the run result is unaffected; only the stored history entry is lost")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("record store encoding failure")]
    #[diagnostic(code(delvegraph::records::encode))]
    Encode(#[from] serde_json::Error),
}

/// Best-effort persistence of completed runs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Appends a record, newest first. Returns the record's id.
    async fn append(&self, record: RunRecord) -> Result<RecordId, PersistenceError>;

    /// Newest records, optionally filtered by substring, at most `limit`.
    async fn recent(
        &self,
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<RunRecord>, PersistenceError>;

    async fn get(&self, id: RecordId) -> Result<Option<RunRecord>, PersistenceError>;

    /// Removes one record; `false` when the id was not present.
    async fn remove(&self, id: RecordId) -> Result<bool, PersistenceError>;

    /// Removes everything, returning how many records were dropped.
    async fn clear(&self) -> Result<usize, PersistenceError>;
}

/// Volatile store backed by a mutex-guarded vector.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<RunRecord>>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(&self, record: RunRecord) -> Result<RecordId, PersistenceError> {
        let id = record.id;
        let mut records = self.records.lock();
        records.insert(0, record);
        records.truncate(MAX_RECORDS);
        Ok(id)
    }

    async fn recent(
        &self,
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<RunRecord>, PersistenceError> {
        let records = self.records.lock();
        Ok(records
            .iter()
            .filter(|r| filter.is_none_or(|needle| r.matches_filter(needle)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: RecordId) -> Result<Option<RunRecord>, PersistenceError> {
        Ok(self.records.lock().iter().find(|r| r.id == id).cloned())
    }

    async fn remove(&self, id: RecordId) -> Result<bool, PersistenceError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }

    async fn clear(&self) -> Result<usize, PersistenceError> {
        let mut records = self.records.lock();
        let dropped = records.len();
        records.clear();
        Ok(dropped)
    }
}

/// Durable store: one pretty-printed JSON array, newest record first.
///
/// A missing file reads as an empty store. Each mutation rewrites the whole
/// file; record volume is capped well below where that matters.
#[derive(Debug, Clone)]
pub struct JsonFileRecordStore {
    path: PathBuf,
}

impl JsonFileRecordStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn load(&self) -> Result<Vec<RunRecord>, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, records: &[RunRecord]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }
        let bytes = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| self.io_error(e))
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn append(&self, record: RunRecord) -> Result<RecordId, PersistenceError> {
        let id = record.id;
        let mut records = self.load().await?;
        records.insert(0, record);
        records.truncate(MAX_RECORDS);
        self.save(&records).await?;
        Ok(id)
    }

    async fn recent(
        &self,
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<RunRecord>, PersistenceError> {
        let records = self.load().await?;
        Ok(records
            .into_iter()
            .filter(|r| filter.is_none_or(|needle| r.matches_filter(needle)))
            .take(limit)
            .collect())
    }

    async fn get(&self, id: RecordId) -> Result<Option<RunRecord>, PersistenceError> {
        Ok(self.load().await?.into_iter().find(|r| r.id == id))
    }

    async fn remove(&self, id: RecordId) -> Result<bool, PersistenceError> {
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| r.id != id);
        let removed = records.len() < before;
        if removed {
            self.save(&records).await?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize, PersistenceError> {
        let records = self.load().await?;
        let dropped = records.len();
        if dropped > 0 {
            self.save(&[]).await?;
        }
        Ok(dropped)
    }
}
