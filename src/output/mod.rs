//! Output module for crawl results
//!
//! This module handles:
//! - Graph statistics (counts, relation breakdown, connected components)
//! - Printing statistics and the pass log
//! - Exporting the graph as GEXF and reading it back

mod gexf;
pub mod stats;

pub use gexf::{format_gexf, parse_gexf, read_gexf, write_gexf};
pub use stats::{compute_statistics, load_statistics, print_pass_log, print_statistics, GraphStatistics};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to format output: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed GEXF: {0}")]
    Malformed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
