//! In-memory remote source for engine and session tests

use crate::source::{
    Listing, PersonRef, RateLimitState, RemoteSource, RepositoryRef, SourceError, SourceResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
struct ScriptedRepository {
    reference: RepositoryRef,
    owner: Option<PersonRef>,
    contributors: Vec<PersonRef>,
    commit_authors: Vec<PersonRef>,
    parent: Option<RepositoryRef>,
}

/// A listing served from memory in insertion order
///
/// Failures are queued per repository and consumed one call at a time, so a
/// repository that fails once succeeds on the next pass.
pub struct ScriptedSource {
    page_size: usize,
    repositories: Vec<ScriptedRepository>,
    hidden: HashMap<String, ScriptedRepository>,
    contributor_failures: Mutex<HashMap<String, VecDeque<SourceError>>>,
    listing_failures: Mutex<VecDeque<SourceError>>,
    listing_offsets: Mutex<Vec<u64>>,
    listing_times: Mutex<Vec<Instant>>,
    quota: Mutex<RateLimitState>,
}

impl ScriptedSource {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            repositories: Vec::new(),
            hidden: HashMap::new(),
            contributor_failures: Mutex::new(HashMap::new()),
            listing_failures: Mutex::new(VecDeque::new()),
            listing_offsets: Mutex::new(Vec::new()),
            listing_times: Mutex::new(Vec::new()),
            quota: Mutex::new(RateLimitState::default()),
        }
    }

    fn scripted(name: &str, owner: &str, contributors: &[&str]) -> ScriptedRepository {
        ScriptedRepository {
            reference: RepositoryRef {
                full_name: Some(name.to_string()),
                language: Some("Rust".to_string()),
                weight: Some(1),
                fork: false,
                owner: Some(PersonRef::with_login(owner)),
            },
            owner: Some(PersonRef::with_login(owner)),
            contributors: contributors.iter().map(|c| PersonRef::with_login(c)).collect(),
            ..ScriptedRepository::default()
        }
    }

    /// Adds a repository to the listing
    pub fn with_repository(mut self, name: &str, owner: &str, contributors: &[&str]) -> Self {
        self.repositories
            .push(Self::scripted(name, owner, contributors));
        self
    }

    /// Adds a raw reference to the listing, e.g. one without a name
    pub fn with_reference(mut self, reference: RepositoryRef) -> Self {
        self.repositories.push(ScriptedRepository {
            reference,
            ..ScriptedRepository::default()
        });
        self
    }

    /// Makes `name` a fork of `parent`; the parent is resolvable but not listed
    /// unless it was added with `with_repository`
    pub fn with_fork(mut self, name: &str, parent: &str, parent_owner: &str) -> Self {
        let parent_ref = RepositoryRef::named(parent);
        if let Some(repo) = self.entry_mut(name) {
            repo.reference.fork = true;
            repo.parent = Some(parent_ref);
        }
        if self.entry_mut(parent).is_none() {
            self.hidden
                .insert(parent.to_string(), Self::scripted(parent, parent_owner, &[]));
        }
        self
    }

    pub fn with_contributor_refs(mut self, name: &str, contributors: Vec<PersonRef>) -> Self {
        if let Some(repo) = self.entry_mut(name) {
            repo.contributors = contributors;
        }
        self
    }

    /// Sets the commit authors of `name`, one entry per commit
    pub fn with_commits(mut self, name: &str, authors: &[&str]) -> Self {
        if let Some(repo) = self.entry_mut(name) {
            repo.commit_authors = authors.iter().map(|a| PersonRef::with_login(a)).collect();
        }
        self
    }

    /// Queues a failure for the next contributor fetch of `name`
    pub fn fail_contributors(self, name: &str, error: SourceError) -> Self {
        self.contributor_failures
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Queues a failure for the next listing call
    pub fn fail_listing(self, error: SourceError) -> Self {
        self.listing_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn set_quota(&self, state: RateLimitState) {
        *self.quota.lock().unwrap() = state;
    }

    /// Offsets the listing was requested at, in call order
    pub fn listing_offsets(&self) -> Vec<u64> {
        self.listing_offsets.lock().unwrap().clone()
    }

    /// Tokio instants of the listing calls, in call order
    pub fn listing_times(&self) -> Vec<Instant> {
        self.listing_times.lock().unwrap().clone()
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut ScriptedRepository> {
        if let Some(pos) = self
            .repositories
            .iter()
            .position(|r| r.reference.key() == Some(name))
        {
            return self.repositories.get_mut(pos);
        }
        self.hidden.get_mut(name)
    }

    fn entry(&self, repo: &RepositoryRef) -> Option<&ScriptedRepository> {
        let name = repo.key()?;
        self.repositories
            .iter()
            .find(|r| r.reference.key() == Some(name))
            .or_else(|| self.hidden.get(name))
    }
}

#[async_trait]
impl RemoteSource for ScriptedSource {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn list_repositories(
        &self,
        listing: &Listing,
        offset: u64,
    ) -> SourceResult<Vec<RepositoryRef>> {
        self.listing_offsets.lock().unwrap().push(offset);
        self.listing_times.lock().unwrap().push(Instant::now());
        if let Some(error) = self.listing_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        Ok(self
            .repositories
            .iter()
            .filter(|r| match (&listing.query, r.reference.key()) {
                (Some(query), Some(name)) => name.contains(query.as_str()),
                _ => true,
            })
            .skip(offset as usize)
            .take(self.page_size)
            .map(|r| r.reference.clone())
            .collect())
    }

    async fn get_owner(&self, repo: &RepositoryRef) -> SourceResult<Option<PersonRef>> {
        Ok(self.entry(repo).and_then(|r| r.owner.clone()))
    }

    async fn get_contributors(&self, repo: &RepositoryRef) -> SourceResult<Vec<PersonRef>> {
        let name = repo.key().unwrap_or_default().to_string();
        let failure = self
            .contributor_failures
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(VecDeque::pop_front);
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(self
            .entry(repo)
            .map(|r| r.contributors.clone())
            .unwrap_or_default())
    }

    async fn get_commit_authors(
        &self,
        repo: &RepositoryRef,
        _since: DateTime<Utc>,
    ) -> SourceResult<Vec<PersonRef>> {
        Ok(self
            .entry(repo)
            .map(|r| r.commit_authors.clone())
            .unwrap_or_default())
    }

    async fn get_fork_parent(&self, repo: &RepositoryRef) -> SourceResult<Option<RepositoryRef>> {
        Ok(self.entry(repo).and_then(|r| r.parent.clone()))
    }

    async fn primary_language(&self, repo: &RepositoryRef) -> SourceResult<Option<String>> {
        Ok(self.entry(repo).and_then(|r| r.reference.language.clone()))
    }

    fn quota(&self) -> RateLimitState {
        *self.quota.lock().unwrap()
    }
}
