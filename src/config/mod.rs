//! Configuration module for Repograph
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use repograph::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("repograph.toml")).unwrap();
//! println!("Importing up to {} repositories at once", config.crawler.max_concurrent_imports);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, Credentials, OutputConfig, SourceConfig, SourceKind};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
