//! Repograph: an incremental repository/person graph crawler
//!
//! This crate pages through a code-hosting platform's repository listing under
//! its rate limit and grows a bipartite graph of repositories and the people
//! who own, contribute to, or commit to them. Crawls are resumable: a session
//! keeps its offset into the listing so that a long crawl can be split across
//! many short invocations.

pub mod config;
pub mod crawler;
pub mod graph;
pub mod output;
pub mod source;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Repograph operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote source error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Repograph operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlEngine, CrawlSession, PassReport};
pub use graph::{NodeKind, ProjectGraph, Relation, SharedGraph};
pub use source::{Listing, RemoteSource};
pub use state::{CrawlCursor, PassStatus};
