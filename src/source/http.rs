//! HTTP plumbing shared by the platform adapters
//!
//! This module handles:
//! - Building HTTP clients with a proper user agent string
//! - Applying credentials to requests
//! - Recording quota headers from every response
//! - Classifying failures into `SourceError`

use crate::config::Credentials;
use crate::source::{QuotaTracker, RateLimitState, SourceError, SourceResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// User agent sent with every API call
pub const USER_AGENT: &str = concat!("repograph/", env!("CARGO_PKG_VERSION"));

/// Builds an HTTP client for API calls
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// How an adapter authenticates
#[derive(Debug, Clone)]
pub(crate) enum Auth {
    Anonymous,
    Basic { user: String, password: Option<String> },
    Bearer(String),
    Header { name: &'static str, value: String },
}

impl Auth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Anonymous => request,
            Self::Basic { user, password } => request.basic_auth(user, password.as_ref()),
            Self::Bearer(token) => request.bearer_auth(token),
            Self::Header { name, value } => request.header(*name, value),
        }
    }

    /// GitHub style: user/password as basic auth, token as bearer
    pub fn for_github(credentials: &Credentials) -> Self {
        match credentials {
            Credentials::Anonymous => Self::Anonymous,
            Credentials::Basic { user, password } => Self::Basic {
                user: user.clone(),
                password: password.clone(),
            },
            Credentials::Token(token) => Self::Bearer(token.clone()),
        }
    }
}

/// Names of the quota headers a platform sends
#[derive(Debug, Clone, Copy)]
pub(crate) struct QuotaHeaders {
    pub remaining: &'static str,
    pub reset: &'static str,
}

/// Thin JSON API client bound to one platform
pub(crate) struct ApiClient {
    client: Client,
    base: Url,
    auth: Auth,
    headers: QuotaHeaders,
    quota: QuotaTracker,
}

impl ApiClient {
    pub fn new(base_url: &str, auth: Auth, headers: QuotaHeaders) -> crate::Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))?;
        Ok(Self {
            client: build_http_client()?,
            base,
            auth,
            headers,
            quota: QuotaTracker::new(),
        })
    }

    pub fn quota(&self) -> RateLimitState {
        self.quota.current()
    }

    /// Resolves an API path against the base URL
    ///
    /// Paths may contain percent-encoded segments; they are kept as-is.
    pub fn endpoint(&self, path: &str) -> SourceResult<Url> {
        let joined = format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| SourceError::Decode {
            resource: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Sends a GET request and decodes the JSON body
    ///
    /// Returns `Ok(None)` for `204 No Content`.
    ///
    /// # Error classification
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | HTTP 429 | QuotaExceeded |
    /// | HTTP 403 with zero remaining quota | QuotaExceeded |
    /// | Other non-success status | Unavailable |
    /// | Timeout / connection failure | Communication |
    /// | Undecodable body | Decode |
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SourceResult<Option<T>> {
        let url = self.endpoint(path)?;
        let request = self.auth.apply(self.client.get(url).query(query));

        let response = request.send().await.map_err(|e| communication(path, &e))?;
        self.quota.record_headers(
            response.headers(),
            self.headers.remaining,
            self.headers.reset,
        );

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.classify_status(path, status));
        }

        decode(path, response).await.map(Some)
    }

    /// Fetches every page of a paginated array endpoint
    ///
    /// Stops at the first page shorter than `per_page`.
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        per_page: u32,
    ) -> SourceResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let mut params = query.to_vec();
            params.push(("per_page", per_page.to_string()));
            params.push(("page", page.to_string()));

            let batch: Vec<T> = self.get_json(path, &params).await?.unwrap_or_default();
            let short = batch.len() < per_page as usize;
            items.extend(batch);
            if short {
                break;
            }
            page += 1;
        }

        Ok(items)
    }

    fn classify_status(&self, resource: &str, status: StatusCode) -> SourceError {
        let quota = self.quota.current();
        if status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && quota.is_exhausted())
        {
            self.quota.mark_exhausted(quota.reset_at);
            return SourceError::QuotaExceeded {
                reset_at: quota.reset_at,
            };
        }

        SourceError::Unavailable {
            resource: resource.to_string(),
            status: status.as_u16(),
        }
    }
}

fn communication(resource: &str, error: &reqwest::Error) -> SourceError {
    let message = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else {
        error.to_string()
    };
    SourceError::Communication {
        resource: resource.to_string(),
        message,
    }
}

async fn decode<T: DeserializeOwned>(resource: &str, response: Response) -> SourceResult<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| communication(resource, &e))?;
    serde_json::from_slice(&body).map_err(|e| SourceError::Decode {
        resource: resource.to_string(),
        message: e.to_string(),
    })
}

/// Percent-encodes a value for use as a single path segment
pub(crate) fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
