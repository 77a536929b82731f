//! Resumable multi-pass crawl sessions
//!
//! A session owns the cursor into one listing together with the remaining
//! limit, so that repeated passes continue where the previous one stopped.
//! Between passes it sleeps until `max(now + wait_time, quota reset)`.

use crate::crawler::{CrawlEngine, PassReport};
use crate::graph::SharedGraph;
use crate::source::{Listing, RateLimitState, RepositoryCursor};
use crate::state::CrawlCursor;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use std::time::Duration;

/// Earliest time the next pass may start
///
/// The reset time only counts when the quota is actually exhausted.
pub fn next_wake_time(
    now: DateTime<Utc>,
    wait_time: Duration,
    quota: &RateLimitState,
) -> DateTime<Utc> {
    let earliest = now + chrono::Duration::from_std(wait_time).unwrap_or_else(|_| chrono::Duration::zero());
    match quota.reset_at.filter(|_| quota.is_exhausted()) {
        Some(reset_at) if reset_at > earliest => reset_at,
        _ => earliest,
    }
}

/// Resumable crawl over one listing
pub struct CrawlSession {
    engine: CrawlEngine,
    cursor: RepositoryCursor,
    progress: CrawlCursor,
    remaining: Option<u64>,
    wait_time: Duration,
    next_wake: Option<DateTime<Utc>>,
}

impl CrawlSession {
    /// Starts a session at the beginning of `listing`
    ///
    /// # Arguments
    ///
    /// * `engine` - Engine bound to the platform to crawl
    /// * `listing` - Query and activity cutoff
    /// * `limit` - Total number of repositories the session may add, None for no limit
    pub fn new(engine: CrawlEngine, listing: Listing, limit: Option<u64>) -> Self {
        Self::resume(engine, listing, CrawlCursor::default(), limit)
    }

    /// Continues a session from a saved cursor
    pub fn resume(
        engine: CrawlEngine,
        listing: Listing,
        cursor: CrawlCursor,
        remaining: Option<u64>,
    ) -> Self {
        let source = std::sync::Arc::clone(engine.source());
        Self {
            engine,
            cursor: RepositoryCursor::new(source, listing, cursor.offset),
            progress: cursor,
            remaining,
            wait_time: Duration::ZERO,
            next_wake: None,
        }
    }

    /// Sets the minimum pause between two passes
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn engine(&self) -> &CrawlEngine {
        &self.engine
    }

    pub fn listing(&self) -> &Listing {
        self.cursor.listing()
    }

    /// Current position, suitable for persisting
    pub fn cursor(&self) -> CrawlCursor {
        CrawlCursor {
            offset: self.cursor.offset(),
            ..self.progress
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    pub fn is_completed(&self) -> bool {
        self.progress.completed
    }

    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.next_wake
    }

    /// Rewinds to the start of the listing and clears the completion flag
    pub fn reset(&mut self) {
        self.cursor.rewind();
        self.progress.reset();
        self.next_wake = None;
    }

    /// Points the session at a (possibly different) listing and limit
    ///
    /// The cursor is only meaningful for the listing it was recorded against,
    /// so a changed listing restarts from offset zero.
    pub fn retarget(&mut self, listing: Listing, limit: Option<u64>) {
        if &listing != self.cursor.listing() {
            let source = std::sync::Arc::clone(self.engine.source());
            self.cursor = RepositoryCursor::new(source, listing, 0);
            self.progress.reset();
            self.next_wake = None;
        }
        self.remaining = limit;
    }

    /// Runs the next pass, or returns None once the session is complete
    pub async fn next_pass(&mut self, graph: &SharedGraph) -> Option<PassReport> {
        if self.progress.completed || self.engine.is_interrupted() {
            return None;
        }
        if self.remaining == Some(0) {
            self.progress.completed = true;
            return None;
        }

        if let Some(wake) = self.next_wake {
            if let Ok(wait) = (wake - Utc::now()).to_std() {
                if !wait.is_zero() {
                    tracing::info!("Next pass at {}", wake.to_rfc3339());
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let report = self.engine.find(&mut self.cursor, self.remaining, graph).await;

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(report.added);
        }
        self.progress.record(report.status, report.offset);
        if self.remaining == Some(0) {
            self.progress.completed = true;
        }
        self.next_wake = Some(next_wake_time(
            Utc::now(),
            self.wait_time,
            &self.engine.source().quota(),
        ));

        Some(report)
    }

    /// Lazy sequence of passes until the session completes or is interrupted
    ///
    /// The graph is mutated in place; each item reports what its pass did.
    pub fn find_all<'a>(
        &'a mut self,
        graph: &'a SharedGraph,
    ) -> impl Stream<Item = PassReport> + 'a {
        stream::unfold(self, move |session| async move {
            let report = session.next_pass(graph).await?;
            Some((report, session))
        })
    }
}
