//! Crawler module: the incremental, resumable crawl engine
//!
//! This module contains the core crawling logic, including:
//! - One-pass crawling over a paged listing (`CrawlEngine::find`)
//! - Per-repository import tasks with rollback on failure
//! - Limit budgeting and the in-progress set guarding fork recursion
//! - Multi-pass sessions that resume from a saved offset (`CrawlSession`)

mod engine;
mod import;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{CrawlEngine, Interrupter, PassReport, DEFAULT_MAX_CONCURRENT_IMPORTS};
pub use import::ImportOutcome;
pub use session::{next_wake_time, CrawlSession};
