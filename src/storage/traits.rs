//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::PassReport;
use crate::graph::ProjectGraph;
use crate::storage::{PassRecord, SessionRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all persistence the crawl driver needs: the graph
/// snapshot, session cursors and the pass log.
pub trait Storage {
    // ===== Graph Snapshot =====

    /// Replaces the stored graph with `graph`
    ///
    /// Either the whole snapshot is written or nothing changes.
    fn save_graph(&mut self, graph: &ProjectGraph) -> StorageResult<()>;

    /// Loads the stored graph; an empty graph if nothing was saved yet
    fn load_graph(&self) -> StorageResult<ProjectGraph>;

    /// Removes every node and edge
    fn clear_graph(&mut self) -> StorageResult<()>;

    // ===== Sessions =====

    /// Gets a session cursor by key
    fn load_session(&self, key: &str) -> StorageResult<Option<SessionRecord>>;

    /// Inserts or updates a session cursor
    fn save_session(&mut self, session: &SessionRecord) -> StorageResult<()>;

    /// Forgets a session cursor
    fn delete_session(&mut self, key: &str) -> StorageResult<()>;

    // ===== Pass Log =====

    /// Appends a finished pass to the log
    ///
    /// # Returns
    ///
    /// The ID of the new log entry
    fn record_pass(
        &mut self,
        session_key: &str,
        report: &PassReport,
        started_at: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Lists logged passes, oldest first, optionally for one session only
    fn list_passes(&self, session_key: Option<&str>) -> StorageResult<Vec<PassRecord>>;
}
