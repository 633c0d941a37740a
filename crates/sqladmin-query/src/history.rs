//! Query history with write-through persistence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::HistoryError;
use crate::json_file::{self, Loaded};
use crate::executor::QueryOutcome;

/// A single query history entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// The query text as submitted
    pub query: String,

    /// When the query finished executing
    pub executed_at: DateTime<Utc>,

    /// Database the query ran against, if known
    #[serde(default)]
    pub database: Option<String>,

    /// Execution duration in milliseconds
    #[serde(default)]
    pub duration_ms: u64,

    pub success: bool,

    /// Error message if failed
    #[serde(default)]
    pub error: Option<String>,

    /// Rows returned by the query
    #[serde(default)]
    pub rows_affected: Option<u64>,
}

impl HistoryEntry {
    /// Build the record of one execution attempt
    pub fn from_outcome(query: &str, database: Option<&str>, outcome: &QueryOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.to_string(),
            executed_at: Utc::now(),
            database: database.map(String::from),
            duration_ms: outcome.duration.as_millis() as u64,
            success: outcome.success,
            error: outcome.error.clone(),
            rows_affected: outcome.row_count,
        }
    }
}

/// Bounded, newest-first log of execution attempts
///
/// Every mutation is written to disk before it returns. Persistence failures
/// are logged and never surfaced: a disk fault must not block execution.
pub struct HistoryStore {
    /// History entries (most recent first)
    entries: VecDeque<HistoryEntry>,

    /// Maximum entries to keep
    cap: usize,

    /// Backing file, `None` for a store that is never persisted
    path: Option<PathBuf>,
}

impl HistoryStore {
    /// Create a store that lives only in memory
    pub fn in_memory(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
            path: None,
        }
    }

    /// Open the store backed by `path`, loading whatever it holds
    pub async fn open(path: impl Into<PathBuf>, cap: usize) -> Self {
        let path = path.into();
        let cap = cap.max(1);
        let entries = Self::load_all(&path, cap).await;
        Self {
            entries: entries.into(),
            cap,
            path: Some(path),
        }
    }

    /// Read the persisted list, newest first
    ///
    /// A missing file yields an empty list. A malformed file is logged and the
    /// backup copy is tried instead; if that fails too the list starts empty.
    #[tracing::instrument(skip(path), fields(path = %path.display()))]
    pub async fn load_all(path: &Path, cap: usize) -> Vec<HistoryEntry> {
        let mut entries = match json_file::load::<Vec<HistoryEntry>>(path).await {
            Loaded::Found(entries) => entries,
            Loaded::Missing => {
                tracing::debug!("no history file, starting empty");
                Vec::new()
            }
            Loaded::Unusable => {
                tracing::error!("history unreadable, starting empty");
                Vec::new()
            }
        };

        if entries.len() > cap {
            tracing::debug!(
                loaded = entries.len(),
                cap,
                "truncating history to cap"
            );
            entries.truncate(cap);
        }

        tracing::debug!(count = entries.len(), "history loaded");
        entries
    }

    /// Add an entry at the front, evicting from the back beyond the cap
    pub async fn append(&mut self, entry: HistoryEntry) {
        tracing::debug!(
            entry_id = %entry.id,
            success = entry.success,
            duration_ms = entry.duration_ms,
            "adding query to history"
        );
        self.entries.push_front(entry);
        while self.entries.len() > self.cap {
            if let Some(evicted) = self.entries.pop_back() {
                tracing::trace!(entry_id = %evicted.id, "evicted oldest history entry");
            }
        }
        self.persist().await;
    }

    /// Remove every entry and persist the empty list
    pub async fn clear(&mut self) {
        let count = self.entries.len();
        tracing::info!(entries_cleared = count, "clearing query history");
        self.entries.clear();
        self.persist().await;
    }

    /// Get all entries, newest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Search history by query text, case-insensitively
    pub fn search(&self, text: &str) -> impl Iterator<Item = &HistoryEntry> {
        let needle = text.to_lowercase();
        self.entries
            .iter()
            .filter(move |e| e.query.to_lowercase().contains(&needle))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self) {
        if let Err(e) = self.save().await {
            tracing::error!(error = %e, "failed to persist query history");
        }
    }

    /// Rewrite the backing file with the current list
    ///
    /// The previous file is copied to `.bak` and the new list is written to
    /// `.tmp` and renamed into place, so an interrupted write never leaves a
    /// malformed history file behind.
    pub async fn save(&self) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        json_file::save(path, &self.entries).await?;
        tracing::debug!(count = self.entries.len(), path = %path.display(), "history saved");
        Ok(())
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("len", &self.entries.len())
            .field("cap", &self.cap)
            .field("path", &self.path)
            .finish()
    }
}
