//! Per-repository import task
//!
//! One task owns one repository id from the moment its node is created until
//! it is fully linked or rolled back. Everything shared between tasks lives in
//! `ImportContext`: the graph, the limit budget, the in-progress set and the
//! halt flag raised by a pass-ending error.

use crate::graph::{Relation, SharedGraph, UNKNOWN_LANGUAGE};
use crate::source::{PersonRef, RemoteSource, RepositoryRef, SourceResult};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// What happened to one item of the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The repository node was created and linked
    Added,

    /// The repository was already in the graph or being imported
    AlreadyPresent,

    /// The reference carried no usable key
    Skipped,

    /// A scoped failure removed everything the task had added
    RolledBack,

    /// The limit budget was spent before the node could be created
    Deferred,

    /// The pass was halted before the task started
    Aborted,
}

impl ImportOutcome {
    /// Returns true if the cursor may move past this item
    pub fn is_consumed(&self) -> bool {
        matches!(
            self,
            Self::Added | Self::AlreadyPresent | Self::Skipped | Self::RolledBack
        )
    }
}

/// Count of repositories a pass may still add
///
/// Slots are reserved under the graph lock together with node creation, so
/// concurrent tasks can never overshoot the limit.
#[derive(Debug)]
pub struct Budget {
    limit: Option<u64>,
    used: AtomicU64,
}

impl Budget {
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    /// Takes one slot, returns false if none is left
    pub fn try_reserve(&self) -> bool {
        match self.limit {
            None => {
                self.used.fetch_add(1, Ordering::SeqCst);
                true
            }
            Some(limit) => self
                .used
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                    (used < limit).then_some(used + 1)
                })
                .is_ok(),
        }
    }

    /// Gives back a slot after a rollback
    pub fn release(&self) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| used.checked_sub(1));
    }

    /// Slots still available, None when unlimited
    pub fn available(&self) -> Option<u64> {
        self.limit
            .map(|limit| limit.saturating_sub(self.used.load(Ordering::SeqCst)))
    }

    pub fn is_exhausted(&self) -> bool {
        self.available() == Some(0)
    }
}

/// Repository ids currently owned by a running import task
#[derive(Debug, Clone, Default)]
pub struct InProgress {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InProgress {
    /// Claims `id`, returns None if another task already holds it
    pub fn claim(&self, id: &str) -> Option<InProgressGuard> {
        let inserted = self
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        inserted.then(|| InProgressGuard {
            ids: Arc::clone(&self.ids),
            id: id.to_string(),
        })
    }
}

/// Releases a claimed repository id when dropped
#[derive(Debug)]
pub struct InProgressGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Everything an import task shares with its siblings
pub struct ImportContext {
    pub source: Arc<dyn RemoteSource>,
    pub graph: SharedGraph,
    pub since: Option<DateTime<Utc>>,
    pub budget: Arc<Budget>,
    pub in_progress: InProgress,
    halted: AtomicBool,
    interrupted: Arc<AtomicBool>,
}

impl ImportContext {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        graph: SharedGraph,
        since: Option<DateTime<Utc>>,
        budget: Arc<Budget>,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            graph,
            since,
            budget,
            in_progress: InProgress::default(),
            halted: AtomicBool::new(false),
            interrupted,
        }
    }

    /// Stops tasks that have not started yet
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.halted.load(Ordering::SeqCst) || self.interrupted.load(Ordering::SeqCst)
    }

    /// Imports one repository and, for forks, its parent
    ///
    /// Scoped failures are rolled back and reported as `RolledBack`. Only
    /// pass-ending errors (quota, transport) are returned as `Err`, after the
    /// repository has been rolled back.
    pub fn import_repository(&self, repo: RepositoryRef) -> BoxFuture<'_, SourceResult<ImportOutcome>> {
        async move {
            let Some(key) = repo.key().map(str::to_string) else {
                tracing::debug!("Skipping repository reference without a name");
                return Ok(ImportOutcome::Skipped);
            };

            if self.is_stopping() {
                return Ok(ImportOutcome::Aborted);
            }

            if self.graph.contains(&key) {
                tracing::debug!("{} already in graph", key);
                return Ok(ImportOutcome::AlreadyPresent);
            }

            let Some(_claim) = self.in_progress.claim(&key) else {
                tracing::debug!("{} is being imported by another task", key);
                return Ok(ImportOutcome::AlreadyPresent);
            };

            let language = match self.source.primary_language(&repo).await {
                Ok(language) => language
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
                Err(e) if e.is_pass_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", key, e);
                    return Ok(ImportOutcome::RolledBack);
                }
            };

            {
                let mut graph = self.graph.lock();
                if graph.contains(&key) {
                    return Ok(ImportOutcome::AlreadyPresent);
                }
                if !self.budget.try_reserve() {
                    return Ok(ImportOutcome::Deferred);
                }
                graph.add_repository(&key, &language, repo.weight.unwrap_or(0));
            }

            let mut created = Vec::new();
            match self.enrich(&repo, &key, &mut created).await {
                Ok(()) => {
                    tracing::info!("Imported {} ({})", key, language);
                    Ok(ImportOutcome::Added)
                }
                Err(e) => {
                    self.rollback(&key, &created);
                    if e.is_pass_fatal() {
                        tracing::warn!("Rolled back {}: {}", key, e);
                        Err(e)
                    } else {
                        tracing::warn!("Rolled back {} after scoped failure: {}", key, e);
                        Ok(ImportOutcome::RolledBack)
                    }
                }
            }
        }
        .boxed()
    }

    async fn enrich(
        &self,
        repo: &RepositoryRef,
        key: &str,
        created: &mut Vec<String>,
    ) -> SourceResult<()> {
        if repo.fork {
            self.import_fork_parent(repo, key).await?;
        }

        match self.since {
            None => {
                if let Some(owner) = self.source.get_owner(repo).await? {
                    self.link(&owner, key, Relation::Owner, created);
                }
                for contributor in self.source.get_contributors(repo).await? {
                    self.link(&contributor, key, Relation::Contributor, created);
                }
            }
            Some(since) => {
                let mut seen = HashSet::new();
                for author in self.source.get_commit_authors(repo, since).await? {
                    let fresh = author.key().map_or(false, |k| seen.insert(k.to_string()));
                    if fresh {
                        self.link(&author, key, Relation::Committer, created);
                    }
                }
            }
        }
        Ok(())
    }

    /// Best-effort import of the parent of a fork; draws no edge
    async fn import_fork_parent(&self, repo: &RepositoryRef, key: &str) -> SourceResult<()> {
        let parent = match self.source.get_fork_parent(repo).await {
            Ok(Some(parent)) => parent,
            Ok(None) => return Ok(()),
            Err(e) if e.is_pass_fatal() => return Err(e),
            Err(e) => {
                tracing::debug!("Parent of {} unavailable: {}", key, e);
                return Ok(());
            }
        };

        let parent_key = parent.key().unwrap_or("?").to_string();
        let outcome = self.import_repository(parent).await?;
        tracing::debug!("Fork parent {} of {}: {:?}", parent_key, key, outcome);
        Ok(())
    }

    fn link(&self, person: &PersonRef, repository: &str, relation: Relation, created: &mut Vec<String>) {
        let Some(id) = person.key() else {
            tracing::debug!("Skipping {} without login or email on {}", relation, repository);
            return;
        };

        let mut graph = self.graph.lock();
        let is_new = !graph.contains(id);
        if graph.link(id, repository, relation) && is_new {
            created.push(id.to_string());
        }
    }

    /// Removes the repository node and the people only it introduced
    fn rollback(&self, key: &str, created: &[String]) {
        let mut graph = self.graph.lock();
        if graph.remove_node(key).is_some() {
            self.budget.release();
        }
        for person in created {
            if graph.degree(person) == 0 {
                graph.remove_node(person);
            }
        }
    }
}
