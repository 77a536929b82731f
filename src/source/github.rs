//! GitHub REST adapter
//!
//! Listings use the search API when a query is given, and the global
//! `/repositories` listing otherwise. The latter is ordered by repository id
//! (creation order) but pages by `since=<id>`, so the adapter remembers which
//! id each offset boundary corresponds to.

use crate::config::Credentials;
use crate::source::http::{ApiClient, Auth, QuotaHeaders};
use crate::source::{
    Listing, PersonRef, RateLimitState, RemoteSource, RepositoryRef, SourceResult,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

const QUOTA_HEADERS: QuotaHeaders = QuotaHeaders {
    remaining: "x-ratelimit-remaining",
    reset: "x-ratelimit-reset",
};

/// Page size for sub-resources (contributors, commits)
const SUB_RESOURCE_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct RepoItem {
    id: u64,
    full_name: Option<String>,
    language: Option<String>,
    watchers_count: Option<u64>,
    #[serde(default)]
    fork: bool,
    owner: Option<UserItem>,
    parent: Option<Box<RepoItem>>,
}

impl From<RepoItem> for RepositoryRef {
    fn from(item: RepoItem) -> Self {
        Self {
            full_name: item.full_name,
            language: item.language,
            weight: item.watchers_count,
            fork: item.fork,
            owner: item.owner.map(PersonRef::from),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserItem {
    login: Option<String>,
    email: Option<String>,
}

impl From<UserItem> for PersonRef {
    fn from(user: UserItem) -> Self {
        Self {
            login: user.login,
            email: user.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RepoItem>,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    author: Option<UserItem>,
    commit: Option<CommitDetail>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: Option<GitActor>,
}

#[derive(Debug, Deserialize)]
struct GitActor {
    email: Option<String>,
}

impl CommitItem {
    /// Platform login of the author, falling back to the git author email
    fn into_person(self) -> PersonRef {
        let email = self
            .commit
            .and_then(|c| c.author)
            .and_then(|a| a.email);
        PersonRef {
            login: self.author.and_then(|a| a.login),
            email,
        }
    }
}

/// GitHub implementation of `RemoteSource`
pub struct GithubSource {
    api: ApiClient,
    page_size: u32,
    /// Offset → `since` id for the unfiltered `/repositories` listing
    boundaries: Mutex<BTreeMap<u64, u64>>,
}

impl GithubSource {
    /// Creates a GitHub adapter
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, `https://api.github.com` when None
    /// * `credentials` - Basic auth or token; anonymous access has a lower quota
    /// * `page_size` - Search results per page (capped at 100 by GitHub)
    pub fn new(
        base_url: Option<&str>,
        credentials: &Credentials,
        page_size: u32,
    ) -> crate::Result<Self> {
        let api = ApiClient::new(
            base_url.unwrap_or(DEFAULT_BASE_URL),
            Auth::for_github(credentials),
            QUOTA_HEADERS,
        )?;
        Ok(Self {
            api,
            page_size: page_size.clamp(1, 100),
            boundaries: Mutex::new(BTreeMap::from([(0, 0)])),
        })
    }

    async fn search(&self, query: &str, offset: u64) -> SourceResult<Vec<RepositoryRef>> {
        let per_page = u64::from(self.page_size);
        let page = offset / per_page + 1;
        let skip = (offset % per_page) as usize;

        let params = [
            ("q", query.to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];
        let response: Option<SearchResponse> =
            self.api.get_json("search/repositories", &params).await?;

        Ok(response
            .map(|r| r.items)
            .unwrap_or_default()
            .into_iter()
            .skip(skip)
            .map(RepositoryRef::from)
            .collect())
    }

    async fn list_all(&self, offset: u64) -> SourceResult<Vec<RepositoryRef>> {
        loop {
            let (start, since) = self.nearest_boundary(offset);
            let params = [("since", since.to_string())];
            let items: Vec<RepoItem> = self
                .api
                .get_json("repositories", &params)
                .await?
                .unwrap_or_default();

            let Some(last_id) = items.last().map(|item| item.id) else {
                return Ok(Vec::new());
            };
            let end = start + items.len() as u64;
            self.boundaries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(end, last_id);

            if offset < end {
                let skip = (offset - start) as usize;
                return Ok(items
                    .into_iter()
                    .skip(skip)
                    .map(RepositoryRef::from)
                    .collect());
            }
            tracing::trace!("Walking GitHub listing from offset {} towards {}", end, offset);
        }
    }

    fn nearest_boundary(&self, offset: u64) -> (u64, u64) {
        self.boundaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .range(..=offset)
            .next_back()
            .map(|(start, since)| (*start, *since))
            .unwrap_or((0, 0))
    }

    fn repo_path(repo: &RepositoryRef, suffix: &str) -> Option<String> {
        repo.key().map(|name| format!("repos/{}{}", name, suffix))
    }
}

#[async_trait]
impl RemoteSource for GithubSource {
    fn name(&self) -> &str {
        "GitHub"
    }

    async fn list_repositories(
        &self,
        listing: &Listing,
        offset: u64,
    ) -> SourceResult<Vec<RepositoryRef>> {
        match listing.query.as_deref() {
            Some(query) => self.search(query, offset).await,
            None => self.list_all(offset).await,
        }
    }

    async fn get_contributors(&self, repo: &RepositoryRef) -> SourceResult<Vec<PersonRef>> {
        let Some(path) = Self::repo_path(repo, "/contributors") else {
            return Ok(Vec::new());
        };
        let users: Vec<UserItem> = self
            .api
            .get_all_pages(&path, &[], SUB_RESOURCE_PAGE_SIZE)
            .await?;
        Ok(users.into_iter().map(PersonRef::from).collect())
    }

    async fn get_commit_authors(
        &self,
        repo: &RepositoryRef,
        since: DateTime<Utc>,
    ) -> SourceResult<Vec<PersonRef>> {
        let Some(path) = Self::repo_path(repo, "/commits") else {
            return Ok(Vec::new());
        };
        let params = [("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))];
        let commits: Vec<CommitItem> = self
            .api
            .get_all_pages(&path, &params, SUB_RESOURCE_PAGE_SIZE)
            .await?;

        let mut seen = HashSet::new();
        Ok(commits
            .into_iter()
            .map(CommitItem::into_person)
            .filter(|person| person.key().map_or(false, |key| seen.insert(key.to_string())))
            .collect())
    }

    async fn get_fork_parent(&self, repo: &RepositoryRef) -> SourceResult<Option<RepositoryRef>> {
        if !repo.fork {
            return Ok(None);
        }
        let Some(path) = Self::repo_path(repo, "") else {
            return Ok(None);
        };
        let detail: Option<RepoItem> = self.api.get_json(&path, &[]).await?;
        Ok(detail
            .and_then(|d| d.parent)
            .map(|parent| RepositoryRef::from(*parent)))
    }

    fn quota(&self) -> RateLimitState {
        self.api.quota()
    }
}
