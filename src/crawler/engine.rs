//! Crawl engine - one pass over a repository listing
//!
//! A pass pages through the listing from the cursor's offset and dispatches
//! one import task per unseen repository onto a bounded worker pool. Pages are
//! processed strictly in order: page N+1 is only fetched once every task of
//! page N has finished. The cursor only moves past the prefix of a page whose
//! items were fully handled, so an aborted page is fetched again on the next
//! pass starting at its first unhandled item.

use crate::crawler::import::{Budget, ImportContext, ImportOutcome};
use crate::graph::SharedGraph;
use crate::source::{wait_for_reset, RemoteSource, RepositoryCursor, RepositoryRef, SourceError};
use crate::state::PassStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default width of the import worker pool
pub const DEFAULT_MAX_CONCURRENT_IMPORTS: usize = 20;

/// Summary of one crawl pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// How the pass ended
    pub status: PassStatus,

    /// Listing items consumed during the pass
    pub analyzed: u64,

    /// Net number of repository nodes the pass added
    pub added: u64,

    /// Cursor offset after the pass
    pub offset: u64,

    /// Message of the error that ended the pass, if any
    pub error: Option<String>,
}

/// Handle that asks a running engine to stop after the current tasks
#[derive(Debug, Clone)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Drives crawl passes against one remote source
pub struct CrawlEngine {
    source: Arc<dyn RemoteSource>,
    max_concurrent_imports: usize,
    interrupted: Arc<AtomicBool>,
}

impl CrawlEngine {
    /// Creates an engine
    ///
    /// # Arguments
    ///
    /// * `source` - The platform to crawl
    /// * `max_concurrent_imports` - Width of the import worker pool
    pub fn new(source: Arc<dyn RemoteSource>, max_concurrent_imports: usize) -> Self {
        Self {
            source,
            max_concurrent_imports: max_concurrent_imports.max(1),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn source(&self) -> &Arc<dyn RemoteSource> {
        &self.source
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            flag: Arc::clone(&self.interrupted),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Runs one pass: pages through the listing until it is exhausted, `limit`
    /// new repositories were added, or a pass-level error occurs
    ///
    /// The graph is mutated in place. Errors never escape; they end the pass
    /// and are reflected in the report's status.
    pub async fn find(
        &self,
        cursor: &mut RepositoryCursor,
        limit: Option<u64>,
        graph: &SharedGraph,
    ) -> PassReport {
        let start_count = graph.repository_count();
        let start_offset = cursor.offset();
        let budget = Arc::new(Budget::new(limit));
        let ctx = Arc::new(ImportContext::new(
            Arc::clone(&self.source),
            graph.clone(),
            cursor.listing().since,
            Arc::clone(&budget),
            Arc::clone(&self.interrupted),
        ));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_imports));

        tracing::info!(
            "Starting pass for \"{}\" at offset {}",
            cursor.listing().describe(),
            start_offset
        );

        let mut error: Option<SourceError> = None;
        let status = loop {
            if self.is_interrupted() {
                break PassStatus::Interrupted;
            }
            if budget.is_exhausted() {
                break PassStatus::LimitReached;
            }

            wait_for_reset(self.source.as_ref()).await;

            let page = match cursor.next_page().await {
                Ok(page) => page,
                Err(e) => {
                    let status = status_for(&e);
                    error = Some(e);
                    break status;
                }
            };
            if page.is_empty() {
                break PassStatus::Exhausted;
            }

            let page_len = page.len();
            let result = self.run_page(&ctx, &semaphore, page).await;
            cursor.advance(result.consumed);
            tracing::debug!(
                "Page done: {}/{} consumed, offset {}",
                result.consumed,
                page_len,
                cursor.offset()
            );

            if let Some(e) = result.error {
                let status = status_for(&e);
                error = Some(e);
                break status;
            }
            if self.is_interrupted() {
                break PassStatus::Interrupted;
            }
        };

        let report = PassReport {
            status,
            analyzed: cursor.offset() - start_offset,
            added: graph.repository_count().saturating_sub(start_count) as u64,
            offset: cursor.offset(),
            error: error.as_ref().map(ToString::to_string),
        };

        match &error {
            Some(e) => tracing::error!(
                "Pass ended with {}: {} ({} analyzed, {} added)",
                report.status,
                e,
                report.analyzed,
                report.added
            ),
            None => tracing::info!(
                "Pass ended with {} ({} analyzed, {} added, offset {})",
                report.status,
                report.analyzed,
                report.added,
                report.offset
            ),
        }
        report
    }

    /// Imports one page concurrently and reports how much of it was consumed
    async fn run_page(
        &self,
        ctx: &Arc<ImportContext>,
        semaphore: &Arc<Semaphore>,
        page: Vec<RepositoryRef>,
    ) -> PageResult {
        let mut outcomes: Vec<Option<ImportOutcome>> = vec![None; page.len()];
        let available = ctx.budget.available();
        let mut dispatched = 0u64;
        let mut tasks = JoinSet::new();

        for (idx, repo) in page.into_iter().enumerate() {
            let Some(key) = repo.key() else {
                tracing::debug!("Skipping listing item {} without a name", idx);
                outcomes[idx] = Some(ImportOutcome::Skipped);
                continue;
            };
            if ctx.graph.contains(key) {
                tracing::debug!("{} already in graph", key);
                outcomes[idx] = Some(ImportOutcome::AlreadyPresent);
                continue;
            }
            // The rest of the page is fetched again once slots are known to be free
            if available.map_or(false, |left| dispatched >= left) {
                break;
            }

            dispatched += 1;
            let ctx = Arc::clone(ctx);
            let semaphore = Arc::clone(semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, Ok(ImportOutcome::Aborted));
                };
                let result = ctx.import_repository(repo).await;
                if result.is_err() {
                    ctx.halt();
                }
                (idx, result)
            });
        }

        let mut error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(outcome))) => outcomes[idx] = Some(outcome),
                Ok((_, Err(e))) => {
                    if error.is_none() {
                        error = Some(e);
                    }
                }
                Err(join_error) => {
                    ctx.halt();
                    tracing::error!("Import task failed: {}", join_error);
                    if error.is_none() {
                        error = Some(SourceError::Communication {
                            resource: "import task".to_string(),
                            message: join_error.to_string(),
                        });
                    }
                }
            }
        }

        let consumed = outcomes
            .iter()
            .take_while(|o| o.map_or(false, |o| o.is_consumed()))
            .count() as u64;

        PageResult {
            consumed,
            error,
        }
    }
}

struct PageResult {
    consumed: u64,
    error: Option<SourceError>,
}

fn status_for(error: &SourceError) -> PassStatus {
    match error {
        SourceError::QuotaExceeded { .. } => PassStatus::QuotaExceeded,
        SourceError::Communication { .. } => PassStatus::CommunicationError,
        SourceError::Unavailable { .. } | SourceError::Decode { .. } => PassStatus::Rejected,
    }
}
