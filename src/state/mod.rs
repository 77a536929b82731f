//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PassStatus`: How a single crawl pass ended
//! - `CrawlCursor`: The resumable position of a session inside its listing

mod cursor;
mod pass_status;

// Re-export main types
pub use crate::source::Listing;
pub use cursor::CrawlCursor;
pub use pass_status::PassStatus;
