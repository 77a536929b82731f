//! Remote hosting platforms
//!
//! This module abstracts the code-hosting platform the crawler reads from:
//! - `RemoteSource`: the capability the crawl engine consumes
//! - `RepositoryCursor`: offset-based producer over a repository listing
//! - Quota tracking and the `wait_for_reset` backoff primitive
//! - GitHub and GitLab REST adapters

mod github;
mod gitlab;
mod http;
mod quota;

pub use github::GithubSource;
pub use gitlab::GitlabSource;
pub use http::build_http_client;
pub use quota::{time_until_reset, wait_for_reset, QuotaTracker, RateLimitState};

use crate::config::{SourceConfig, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a remote source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The platform refused the call because the quota is spent
    #[error("Rate limit exceeded (resets at {reset_at:?})")]
    QuotaExceeded { reset_at: Option<DateTime<Utc>> },

    /// Network or transport failure
    #[error("Communication error for {resource}: {message}")]
    Communication { resource: String, message: String },

    /// A single resource could not be fetched (permissions, missing, server error)
    #[error("Resource unavailable: {resource} (HTTP {status})")]
    Unavailable { resource: String, status: u16 },

    /// The platform answered with a body we could not decode
    #[error("Malformed response for {resource}: {message}")]
    Decode { resource: String, message: String },
}

impl SourceError {
    /// Returns true if this error must end the current pass
    ///
    /// Quota and transport failures abort the page; everything else is scoped
    /// to the repository being imported.
    pub fn is_pass_fatal(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::Communication { .. })
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Result type for remote source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// A person as reported by the platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonRef {
    pub login: Option<String>,
    pub email: Option<String>,
}

impl PersonRef {
    pub fn with_login(login: &str) -> Self {
        Self {
            login: Some(login.to_string()),
            email: None,
        }
    }

    pub fn with_email(email: &str) -> Self {
        Self {
            login: None,
            email: Some(email.to_string()),
        }
    }

    /// Identity key: the login, falling back to the email
    ///
    /// Returns None when neither is usable.
    pub fn key(&self) -> Option<&str> {
        non_empty(self.login.as_deref()).or_else(|| non_empty(self.email.as_deref()))
    }
}

/// A repository as reported by the platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryRef {
    /// Full name, e.g. `owner/name`
    pub full_name: Option<String>,

    /// Primary language, if the listing reports one
    pub language: Option<String>,

    /// Popularity weight (stars/watchers), if reported
    pub weight: Option<u64>,

    /// Whether this repository is a fork
    pub fork: bool,

    /// Owner, if the listing carries it
    pub owner: Option<PersonRef>,
}

impl RepositoryRef {
    pub fn named(full_name: &str) -> Self {
        Self {
            full_name: Some(full_name.to_string()),
            ..Self::default()
        }
    }

    /// Unique key of the repository, None when the name is missing or blank
    pub fn key(&self) -> Option<&str> {
        non_empty(self.full_name.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// The listing a crawl walks: an optional search query and an optional
/// activity cutoff
///
/// When `since` is set the crawl links commit authors instead of owners and
/// contributors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub query: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn new(query: Option<String>, since: Option<DateTime<Utc>>) -> Self {
        Self {
            query: query.filter(|q| !q.trim().is_empty()),
            since,
        }
    }

    /// Human-readable description used in log output
    pub fn describe(&self) -> &str {
        self.query.as_deref().unwrap_or("NO QUERY")
    }
}

/// Capability over a code-hosting platform
///
/// `list_repositories` must return items in an order that is stable across
/// calls with the same listing, so that an offset stays meaningful between
/// invocations.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Short platform name for logs and session keys
    fn name(&self) -> &str;

    /// Returns the next chunk of the listing starting at `offset`
    ///
    /// An empty vector means the listing is exhausted.
    async fn list_repositories(
        &self,
        listing: &Listing,
        offset: u64,
    ) -> SourceResult<Vec<RepositoryRef>>;

    /// Gets the owner of a repository
    async fn get_owner(&self, repo: &RepositoryRef) -> SourceResult<Option<PersonRef>> {
        Ok(repo.owner.clone())
    }

    /// Gets every contributor of a repository
    async fn get_contributors(&self, repo: &RepositoryRef) -> SourceResult<Vec<PersonRef>>;

    /// Gets the author of every commit on or after `since`
    async fn get_commit_authors(
        &self,
        repo: &RepositoryRef,
        since: DateTime<Utc>,
    ) -> SourceResult<Vec<PersonRef>>;

    /// Gets the repository this one was forked from
    async fn get_fork_parent(&self, repo: &RepositoryRef) -> SourceResult<Option<RepositoryRef>>;

    /// Best guess at the primary language
    async fn primary_language(&self, repo: &RepositoryRef) -> SourceResult<Option<String>> {
        Ok(repo.language.clone())
    }

    /// Latest quota reported by the platform
    fn quota(&self) -> RateLimitState;
}

/// Offset-based producer over a repository listing
///
/// Fetching a page does not move the cursor; the caller advances it by the
/// number of items it actually consumed, so a page that was only partly
/// processed is fetched again from the first unprocessed item.
pub struct RepositoryCursor {
    source: Arc<dyn RemoteSource>,
    listing: Listing,
    offset: u64,
}

impl RepositoryCursor {
    pub fn new(source: Arc<dyn RemoteSource>, listing: Listing, offset: u64) -> Self {
        Self {
            source,
            listing,
            offset,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn source(&self) -> &Arc<dyn RemoteSource> {
        &self.source
    }

    /// Rewinds to the start of the listing
    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    /// Fetches the page that starts at the current offset
    pub async fn next_page(&self) -> SourceResult<Vec<RepositoryRef>> {
        tracing::debug!(
            "Fetching repositories for \"{}\" at offset {}",
            self.listing.describe(),
            self.offset
        );
        self.source
            .list_repositories(&self.listing, self.offset)
            .await
    }

    /// Marks `count` items as consumed
    pub fn advance(&mut self, count: u64) {
        self.offset += count;
    }
}

/// Builds the configured remote source
///
/// # Arguments
///
/// * `config` - The source section of the configuration
/// * `page_size` - Number of repositories requested per listing page
pub fn build_source(config: &SourceConfig, page_size: u32) -> crate::Result<Arc<dyn RemoteSource>> {
    let credentials = config.credentials();
    let base_url = config.base_url.as_deref();
    let source: Arc<dyn RemoteSource> = match config.kind {
        SourceKind::Github => Arc::new(GithubSource::new(base_url, &credentials, page_size)?),
        SourceKind::Gitlab => Arc::new(GitlabSource::new(base_url, &credentials, page_size)?),
    };
    Ok(source)
}
