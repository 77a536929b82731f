//! GitLab REST adapter (API v4)
//!
//! Projects are listed oldest first, so the listing order is stable and an
//! offset maps directly onto `page`/`per_page`. GitLab has no login for
//! contributors; people are keyed by email there.

use crate::config::Credentials;
use crate::source::http::{encode_segment, ApiClient, Auth, QuotaHeaders};
use crate::source::{
    Listing, PersonRef, RateLimitState, RemoteSource, RepositoryRef, SourceResult,
};
use crate::ConfigError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_BASE_URL: &str = "https://gitlab.com/api/v4";

const QUOTA_HEADERS: QuotaHeaders = QuotaHeaders {
    remaining: "ratelimit-remaining",
    reset: "ratelimit-reset",
};

const SUB_RESOURCE_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ProjectItem {
    path_with_namespace: Option<String>,
    star_count: Option<u64>,
    namespace: Option<NamespaceItem>,
    forked_from_project: Option<Box<ProjectItem>>,
}

#[derive(Debug, Deserialize)]
struct NamespaceItem {
    path: Option<String>,
}

impl From<ProjectItem> for RepositoryRef {
    fn from(item: ProjectItem) -> Self {
        Self {
            full_name: item.path_with_namespace,
            language: None,
            weight: item.star_count,
            fork: item.forked_from_project.is_some(),
            owner: item
                .namespace
                .and_then(|ns| ns.path)
                .map(|path| PersonRef::with_login(&path)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContributorItem {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    author_email: Option<String>,
}

/// GitLab implementation of `RemoteSource`
pub struct GitlabSource {
    api: ApiClient,
    page_size: u32,
}

impl GitlabSource {
    /// Creates a GitLab adapter
    ///
    /// GitLab's API only accepts token authentication; a user/password pair
    /// is rejected here.
    pub fn new(
        base_url: Option<&str>,
        credentials: &Credentials,
        page_size: u32,
    ) -> crate::Result<Self> {
        let auth = match credentials {
            Credentials::Anonymous => Auth::Anonymous,
            Credentials::Token(token) => Auth::Header {
                name: "PRIVATE-TOKEN",
                value: token.clone(),
            },
            Credentials::Basic { .. } => {
                return Err(ConfigError::Validation(
                    "GitLab requires a token; user/password login is not supported".to_string(),
                )
                .into())
            }
        };

        Ok(Self {
            api: ApiClient::new(base_url.unwrap_or(DEFAULT_BASE_URL), auth, QUOTA_HEADERS)?,
            page_size: page_size.clamp(1, 100),
        })
    }

    fn project_path(repo: &RepositoryRef, suffix: &str) -> Option<String> {
        repo.key()
            .map(|name| format!("projects/{}{}", encode_segment(name), suffix))
    }
}

#[async_trait]
impl RemoteSource for GitlabSource {
    fn name(&self) -> &str {
        "GitLab"
    }

    async fn list_repositories(
        &self,
        listing: &Listing,
        offset: u64,
    ) -> SourceResult<Vec<RepositoryRef>> {
        let per_page = u64::from(self.page_size);
        let page = offset / per_page + 1;
        let skip = (offset % per_page) as usize;

        let mut params = vec![
            ("order_by", "created_at".to_string()),
            ("sort", "asc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(query) = &listing.query {
            params.push(("search", query.clone()));
        }
        if let Some(since) = listing.since {
            params.push((
                "last_activity_after",
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }

        let items: Vec<ProjectItem> = self
            .api
            .get_json("projects", &params)
            .await?
            .unwrap_or_default();
        Ok(items
            .into_iter()
            .skip(skip)
            .map(RepositoryRef::from)
            .collect())
    }

    async fn get_contributors(&self, repo: &RepositoryRef) -> SourceResult<Vec<PersonRef>> {
        let Some(path) = Self::project_path(repo, "/repository/contributors") else {
            return Ok(Vec::new());
        };
        let contributors: Vec<ContributorItem> = self
            .api
            .get_all_pages(&path, &[], SUB_RESOURCE_PAGE_SIZE)
            .await?;
        Ok(contributors
            .into_iter()
            .map(|c| PersonRef {
                login: None,
                email: c.email,
            })
            .collect())
    }

    async fn get_commit_authors(
        &self,
        repo: &RepositoryRef,
        since: DateTime<Utc>,
    ) -> SourceResult<Vec<PersonRef>> {
        let Some(path) = Self::project_path(repo, "/repository/commits") else {
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
            .filter_map(|c| c.author_email)
            .filter(|email| !email.trim().is_empty() && seen.insert(email.clone()))
            .map(|email| PersonRef::with_email(&email))
            .collect())
    }

    async fn get_fork_parent(&self, repo: &RepositoryRef) -> SourceResult<Option<RepositoryRef>> {
        if !repo.fork {
            return Ok(None);
        }
        let Some(path) = Self::project_path(repo, "") else {
            return Ok(None);
        };
        let detail: Option<ProjectItem> = self.api.get_json(&path, &[]).await?;
        Ok(detail
            .and_then(|d| d.forked_from_project)
            .map(|parent| RepositoryRef::from(*parent)))
    }

    /// Picks the language with the largest share of the code base
    async fn primary_language(&self, repo: &RepositoryRef) -> SourceResult<Option<String>> {
        let Some(path) = Self::project_path(repo, "/languages") else {
            return Ok(None);
        };
        let languages: HashMap<String, f64> =
            self.api.get_json(&path, &[]).await?.unwrap_or_default();
        Ok(top_language(languages))
    }

    fn quota(&self) -> RateLimitState {
        self.api.quota()
    }
}

fn top_language(languages: HashMap<String, f64>) -> Option<String> {
    languages
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(name, _)| name)
}
