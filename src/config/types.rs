use serde::Deserialize;

/// Main configuration structure for Repograph
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
}

/// Crawl engine behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of repositories imported concurrently
    #[serde(rename = "max-concurrent-imports", default = "default_max_concurrent_imports")]
    pub max_concurrent_imports: u32,

    /// Minimum pause between two passes of a session (seconds)
    #[serde(rename = "wait-time-secs", default)]
    pub wait_time_secs: u64,

    /// Repositories requested per listing page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Stop after this many passes even if the session is not complete
    #[serde(rename = "max-passes", default)]
    pub max_passes: Option<u32>,
}

fn default_max_concurrent_imports() -> u32 {
    20
}

fn default_page_size() -> u32 {
    30
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_imports: default_max_concurrent_imports(),
            wait_time_secs: 0,
            page_size: default_page_size(),
            max_passes: None,
        }
    }
}

/// Which hosting platform to crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Github,
    Gitlab,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
        }
    }
}

/// Remote platform and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,

    /// API root; the platform's public API when absent
    #[serde(rename = "base-url", default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub token: Option<String>,
}

/// Credentials handed to the remote source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Basic {
        user: String,
        password: Option<String>,
    },
    Token(String),
}

impl SourceConfig {
    /// Resolves the configured credentials; a token wins over user/password
    pub fn credentials(&self) -> Credentials {
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            return Credentials::Token(token.clone());
        }
        match self.user.as_ref().filter(|u| !u.is_empty()) {
            Some(user) => Credentials::Basic {
                user: user.clone(),
                password: self.password.clone(),
            },
            None => Credentials::Anonymous,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding the graph and session cursors
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Where to write a GEXF export after crawling
    #[serde(rename = "gexf-path", default)]
    pub gexf_path: Option<String>,
}
