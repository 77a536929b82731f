//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Graph snapshots (nodes with their attributes, typed edges)
//! - Session cursors keyed by source and listing
//! - The pass log

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::SourceConfig;
use crate::source::Listing;
use crate::state::{CrawlCursor, PassStatus};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(CrawlError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> crate::Result<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Computes the key a session cursor is stored under
///
/// Hex SHA-256 of the source kind, base URL, query and `since`, so that a
/// different query never picks up another query's offset.
pub fn session_key(source: &SourceConfig, listing: &Listing) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(source.base_url.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(listing.query.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"|");
    if let Some(since) = listing.since {
        hasher.update(since.to_rfc3339().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Represents a saved session cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub key: String,
    pub source: String,
    pub query: Option<String>,
    pub since: Option<String>,
    pub cursor: CrawlCursor,
    pub remaining: Option<u64>,
    pub updated_at: String,
}

impl SessionRecord {
    /// Builds the record for a session over `listing`, stamped now
    pub fn for_listing(
        key: &str,
        source: &str,
        listing: &Listing,
        cursor: CrawlCursor,
        remaining: Option<u64>,
    ) -> Self {
        Self {
            key: key.to_string(),
            source: source.to_string(),
            query: listing.query.clone(),
            since: listing.since.map(|s| s.to_rfc3339()),
            cursor,
            remaining,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Represents a logged crawl pass
#[derive(Debug, Clone)]
pub struct PassRecord {
    pub id: i64,
    pub session_key: String,
    pub status: PassStatus,
    pub analyzed: u64,
    pub added: u64,
    pub offset: u64,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}
