//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the GitHub and GitLab REST APIs
//! and run whole passes and sessions end-to-end, including persistence.

use chrono::{TimeZone, Utc};
use futures::StreamExt;
use repograph::config::{parse_config, Config, Credentials};
use repograph::crawler::{CrawlEngine, CrawlSession};
use repograph::graph::{ProjectGraph, Relation, SharedGraph};
use repograph::output::{read_gexf, write_gexf};
use repograph::source::{build_source, GithubSource, GitlabSource, Listing, RemoteSource, RepositoryCursor};
use repograph::state::PassStatus;
use repograph::storage::{session_key, SessionRecord, SqliteStorage, Storage};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a GitHub test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &str) -> Config {
    let toml = format!(
        r#"
[crawler]
max-concurrent-imports = 4
page-size = 2

[source]
kind = "github"
base-url = "{}"

[output]
database-path = "{}"
"#,
        base_url, db_path
    );
    parse_config(&toml).expect("test config is valid")
}

fn github_repo(name: &str, owner: &str, language: &str, watchers: u64) -> serde_json::Value {
    json!({
        "id": watchers,
        "full_name": name,
        "language": language,
        "watchers_count": watchers,
        "fork": false,
        "owner": {"login": owner}
    })
}

/// Mounts a search listing of three repositories split over two pages of two
async fn mount_github_search(server: &MockServer, query: &str) {
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", query))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                github_repo("octo/alpha", "octo", "Rust", 10),
                github_repo("octo/beta", "octo", "Go", 5),
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", query))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [github_repo("lone/gamma", "lone", "Rust", 1)]
        })))
        .mount(server)
        .await;
}

async fn mount_contributors(server: &MockServer, repo: &str, logins: &[&str]) {
    let body: Vec<serde_json::Value> = logins.iter().map(|l| json!({"login": l})).collect();
    Mock::given(method("GET"))
        .and(path(format!("/repos/{}/contributors", repo)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_github_people(server: &MockServer) {
    mount_contributors(server, "octo/alpha", &["dev", "ops"]).await;
    mount_contributors(server, "octo/beta", &["dev"]).await;
    mount_contributors(server, "lone/gamma", &[]).await;
}

#[tokio::test]
async fn test_github_single_pass_builds_graph() {
    let mock_server = MockServer::start().await;
    mount_github_search(&mock_server, "language:rust").await;
    mount_github_people(&mock_server).await;

    let source: Arc<dyn RemoteSource> = Arc::new(
        GithubSource::new(Some(&mock_server.uri()), &Credentials::Anonymous, 2).unwrap(),
    );
    let engine = CrawlEngine::new(Arc::clone(&source), 4);
    let listing = Listing::new(Some("language:rust".to_string()), None);
    let mut cursor = RepositoryCursor::new(source, listing, 0);
    let graph = SharedGraph::new(ProjectGraph::new());

    let report = engine.find(&mut cursor, None, &graph).await;

    assert_eq!(report.status, PassStatus::Exhausted);
    assert_eq!(report.added, 3);
    assert_eq!(report.analyzed, 3);
    assert_eq!(report.offset, 3);
    assert!(report.error.is_none());

    let snapshot = graph.snapshot();
    assert_eq!(snapshot.repository_count(), 3);
    assert_eq!(snapshot.person_count(), 4);
    assert!(snapshot.is_bipartite());

    let alpha = snapshot.repository("octo/alpha").unwrap();
    assert_eq!(alpha.language, "Rust");
    assert_eq!(alpha.weight, 10);
    assert_eq!(snapshot.relation("octo", "octo/alpha"), Some(Relation::Owner));
    assert_eq!(snapshot.relation("dev", "octo/alpha"), Some(Relation::Contributor));
    assert_eq!(snapshot.relation("dev", "octo/beta"), Some(Relation::Contributor));
    assert_eq!(snapshot.relation("lone", "lone/gamma"), Some(Relation::Owner));
    assert_eq!(snapshot.connected_components(), 2);
}

#[tokio::test]
async fn test_github_since_links_committers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [github_repo("octo/alpha", "octo", "Rust", 10)]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/alpha/commits"))
        .and(query_param("since", "2024-03-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"author": {"login": "dev"}, "commit": {"author": {"email": "dev@example.com"}}},
            {"author": {"login": "dev"}, "commit": {"author": {"email": "dev@example.com"}}},
            {"author": null, "commit": {"author": {"email": "anon@example.com"}}}
        ])))
        .mount(&mock_server)
        .await;

    let source: Arc<dyn RemoteSource> = Arc::new(
        GithubSource::new(Some(&mock_server.uri()), &Credentials::Anonymous, 2).unwrap(),
    );
    let engine = CrawlEngine::new(Arc::clone(&source), 2);
    let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let listing = Listing::new(Some("topic:cli".to_string()), Some(since));
    let mut cursor = RepositoryCursor::new(source, listing, 0);
    let graph = SharedGraph::new(ProjectGraph::new());

    let report = engine.find(&mut cursor, None, &graph).await;

    assert_eq!(report.status, PassStatus::Exhausted);
    let snapshot = graph.snapshot();
    assert_eq!(snapshot.relation("dev", "octo/alpha"), Some(Relation::Committer));
    assert_eq!(
        snapshot.relation("anon@example.com", "octo/alpha"),
        Some(Relation::Committer)
    );
    assert!(!snapshot.contains("octo"));
    assert_eq!(snapshot.edge_count(), 2);
}

#[tokio::test]
async fn test_github_quota_exhaustion_ends_pass() {
    let mock_server = MockServer::start().await;
    mount_github_search(&mock_server, "language:rust").await;

    let reset = Utc::now().timestamp() + 3600;
    Mock::given(method("GET"))
        .and(path_regex(r"^/repos/.+/contributors$"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str()),
        )
        .mount(&mock_server)
        .await;

    let source: Arc<dyn RemoteSource> = Arc::new(
        GithubSource::new(Some(&mock_server.uri()), &Credentials::Anonymous, 2).unwrap(),
    );
    let engine = CrawlEngine::new(Arc::clone(&source), 1);
    let listing = Listing::new(Some("language:rust".to_string()), None);
    let mut cursor = RepositoryCursor::new(Arc::clone(&source), listing, 0);
    let graph = SharedGraph::new(ProjectGraph::new());

    let report = engine.find(&mut cursor, None, &graph).await;

    assert_eq!(report.status, PassStatus::QuotaExceeded);
    assert_eq!(report.offset, 0);
    assert_eq!(report.added, 0);
    assert!(report.error.is_some());
    assert!(graph.snapshot().is_empty());

    let quota = source.quota();
    assert!(quota.is_exhausted());
    assert_eq!(quota.reset_at.map(|t| t.timestamp()), Some(reset));
}

#[tokio::test]
async fn test_unavailable_contributors_skip_repository() {
    let mock_server = MockServer::start().await;
    mount_github_search(&mock_server, "language:rust").await;
    mount_contributors(&mock_server, "octo/alpha", &["dev"]).await;
    mount_contributors(&mock_server, "lone/gamma", &[]).await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/beta/contributors"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let source: Arc<dyn RemoteSource> = Arc::new(
        GithubSource::new(Some(&mock_server.uri()), &Credentials::Anonymous, 2).unwrap(),
    );
    let engine = CrawlEngine::new(Arc::clone(&source), 2);
    let listing = Listing::new(Some("language:rust".to_string()), None);
    let mut cursor = RepositoryCursor::new(source, listing, 0);
    let graph = SharedGraph::new(ProjectGraph::new());

    let report = engine.find(&mut cursor, None, &graph).await;

    assert_eq!(report.status, PassStatus::Exhausted);
    assert_eq!(report.offset, 3);
    assert_eq!(report.added, 2);

    let snapshot = graph.snapshot();
    assert!(!snapshot.contains("octo/beta"));
    assert!(snapshot.contains("octo"));
    assert!(snapshot.contains("dev"));
}

#[tokio::test]
async fn test_gitlab_pass_uses_languages_and_emails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/projects"))
        .and(query_param("search", "tool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "path_with_namespace": "group/tool",
                "star_count": 4,
                "namespace": {"path": "group"}
            }
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/projects/group(%2F|/)tool/languages$"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"Shell": 20.0, "Rust": 80.0})),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/projects/group(%2F|/)tool/repository/contributors$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "Dev", "email": "dev@example.com", "commits": 12}
        ])))
        .mount(&mock_server)
        .await;

    let source: Arc<dyn RemoteSource> = Arc::new(
        GitlabSource::new(Some(&mock_server.uri()), &Credentials::Anonymous, 2).unwrap(),
    );
    let engine = CrawlEngine::new(Arc::clone(&source), 2);
    let listing = Listing::new(Some("tool".to_string()), None);
    let mut cursor = RepositoryCursor::new(source, listing, 0);
    let graph = SharedGraph::new(ProjectGraph::new());

    let report = engine.find(&mut cursor, None, &graph).await;

    assert_eq!(report.status, PassStatus::Exhausted);
    assert_eq!(report.added, 1);

    let snapshot = graph.snapshot();
    let tool = snapshot.repository("group/tool").unwrap();
    assert_eq!(tool.language, "Rust");
    assert_eq!(tool.weight, 4);
    assert_eq!(snapshot.relation("group", "group/tool"), Some(Relation::Owner));
    assert_eq!(
        snapshot.relation("dev@example.com", "group/tool"),
        Some(Relation::Contributor)
    );
}

#[tokio::test]
async fn test_gitlab_too_many_requests_is_quota() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let source: Arc<dyn RemoteSource> = Arc::new(
        GitlabSource::new(Some(&mock_server.uri()), &Credentials::Anonymous, 2).unwrap(),
    );
    let engine = CrawlEngine::new(Arc::clone(&source), 2);
    let mut cursor = RepositoryCursor::new(source, Listing::new(None, None), 5);
    let graph = SharedGraph::new(ProjectGraph::new());

    let report = engine.find(&mut cursor, None, &graph).await;

    assert_eq!(report.status, PassStatus::QuotaExceeded);
    assert_eq!(report.offset, 5);
    assert_eq!(report.analyzed, 0);
}

#[tokio::test]
async fn test_session_limit_spans_passes() {
    let mock_server = MockServer::start().await;
    mount_github_search(&mock_server, "language:rust").await;
    mount_github_people(&mock_server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("graph.db");
    let config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());

    let source = build_source(&config.source, config.crawler.page_size).unwrap();
    let engine = CrawlEngine::new(source, config.crawler.max_concurrent_imports as usize);
    let listing = Listing::new(Some("language:rust".to_string()), None);
    let mut session = CrawlSession::new(engine, listing, Some(2));
    let graph = SharedGraph::new(ProjectGraph::new());

    let reports: Vec<_> = session.find_all(&graph).collect().await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, PassStatus::LimitReached);
    assert_eq!(reports[0].added, 2);
    assert_eq!(reports[0].offset, 2);
    assert_eq!(session.remaining(), Some(0));
    assert!(session.is_completed());
    assert!(graph.contains("octo/alpha"));
    assert!(graph.contains("octo/beta"));
    assert!(!graph.contains("lone/gamma"));
}

#[tokio::test]
async fn test_full_crawl_persists_and_resumes() {
    let mock_server = MockServer::start().await;
    mount_github_search(&mock_server, "language:rust").await;
    mount_github_people(&mock_server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("graph.db");
    let config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
    let listing = Listing::new(Some("language:rust".to_string()), None);
    let key = session_key(&config.source, &listing);

    // First invocation: crawl everything and persist
    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        let graph = SharedGraph::new(storage.load_graph().unwrap());
        let source = build_source(&config.source, config.crawler.page_size).unwrap();
        let source_name = source.name().to_string();
        let engine = CrawlEngine::new(source, config.crawler.max_concurrent_imports as usize);
        let mut session = CrawlSession::new(engine, listing.clone(), None);

        let started_at = Utc::now();
        let reports: Vec<_> = session.find_all(&graph).collect().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, PassStatus::Exhausted);

        storage.save_graph(&graph.snapshot()).unwrap();
        storage
            .save_session(&SessionRecord::for_listing(
                &key,
                &source_name,
                &listing,
                session.cursor(),
                session.remaining(),
            ))
            .unwrap();
        storage.record_pass(&key, &reports[0], started_at).unwrap();
    }

    // Second invocation: the stored session is complete, nothing is re-crawled
    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        let graph = storage.load_graph().unwrap();
        assert_eq!(graph.repository_count(), 3);
        assert_eq!(graph.person_count(), 4);
        assert_eq!(graph.relation("ops", "octo/alpha"), Some(Relation::Contributor));

        let record = storage.load_session(&key).unwrap().unwrap();
        assert_eq!(record.cursor.offset, 3);
        assert!(record.cursor.completed);
        assert_eq!(record.source, "GitHub");
        assert_eq!(record.query.as_deref(), Some("language:rust"));

        let passes = storage.list_passes(Some(&key)).unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].status, PassStatus::Exhausted);
        assert_eq!(passes[0].added, 3);

        let source = build_source(&config.source, config.crawler.page_size).unwrap();
        let engine = CrawlEngine::new(source, 2);
        let mut session =
            CrawlSession::resume(engine, listing.clone(), record.cursor, record.remaining);
        let shared = SharedGraph::new(graph);
        assert!(session.next_pass(&shared).await.is_none());
    }
}

#[tokio::test]
async fn test_recrawl_from_start_adds_nothing() {
    let mock_server = MockServer::start().await;
    mount_github_search(&mock_server, "language:rust").await;
    mount_github_people(&mock_server).await;

    let source: Arc<dyn RemoteSource> = Arc::new(
        GithubSource::new(Some(&mock_server.uri()), &Credentials::Anonymous, 2).unwrap(),
    );
    let engine = CrawlEngine::new(Arc::clone(&source), 4);
    let listing = Listing::new(Some("language:rust".to_string()), None);
    let mut session = CrawlSession::new(engine, listing, None);
    let graph = SharedGraph::new(ProjectGraph::new());

    let first = session.next_pass(&graph).await.unwrap();
    assert_eq!(first.added, 3);
    let edges = graph.snapshot().edge_count();

    session.reset();
    let second = session.next_pass(&graph).await.unwrap();

    assert_eq!(second.status, PassStatus::Exhausted);
    assert_eq!(second.added, 0);
    assert_eq!(second.analyzed, 3);
    assert_eq!(graph.snapshot().edge_count(), edges);
}

#[tokio::test]
async fn test_search_past_result_cap_completes_session() {
    let mock_server = MockServer::start().await;
    mount_github_search(&mock_server, "language:rust").await;
    mount_github_people(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "Only the first 1000 search results are available"
        })))
        .mount(&mock_server)
        .await;

    let source: Arc<dyn RemoteSource> = Arc::new(
        GithubSource::new(Some(&mock_server.uri()), &Credentials::Anonymous, 2).unwrap(),
    );
    let engine = CrawlEngine::new(Arc::clone(&source), 4);
    let listing = Listing::new(Some("language:rust".to_string()), None);
    let mut session = CrawlSession::resume(
        engine,
        listing,
        repograph::state::CrawlCursor::new(4),
        None,
    );
    let graph = SharedGraph::default();

    let reports: Vec<_> = session.find_all(&graph).collect().await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, PassStatus::Rejected);
    assert!(reports[0].error.as_deref().unwrap_or_default().contains("422"));
    assert!(session.is_completed());
    assert_eq!(session.cursor().offset, 4);
}

#[tokio::test]
async fn test_exported_graph_seeds_new_database() {
    let mock_server = MockServer::start().await;
    mount_github_search(&mock_server, "language:rust").await;
    mount_github_people(&mock_server).await;

    let temp_dir = TempDir::new().unwrap();
    let gexf_path = temp_dir.path().join("graph.gexf");
    let config = create_test_config(
        &mock_server.uri(),
        temp_dir.path().join("unused.db").to_str().unwrap(),
    );
    let listing = Listing::new(Some("language:rust".to_string()), None);

    let crawled = SharedGraph::default();
    let source = build_source(&config.source, config.crawler.page_size).unwrap();
    let mut session = CrawlSession::new(CrawlEngine::new(source, 4), listing.clone(), None);
    session.next_pass(&crawled).await.unwrap();
    write_gexf(&crawled.snapshot(), &gexf_path).unwrap();

    let mut storage = SqliteStorage::new(&temp_dir.path().join("seeded.db")).unwrap();
    let mut stored = storage.load_graph().unwrap();
    assert_eq!(stored.merge(&read_gexf(&gexf_path).unwrap()), 3);
    storage.save_graph(&stored).unwrap();

    let seeded = storage.load_graph().unwrap();
    assert_eq!(seeded.repository_count(), 3);
    assert_eq!(seeded.person_count(), 4);
    assert_eq!(seeded.repository("octo/beta").unwrap().language, "Go");
    assert_eq!(seeded.relation("octo", "octo/alpha"), Some(Relation::Owner));

    let graph = SharedGraph::new(seeded);
    let source = build_source(&config.source, config.crawler.page_size).unwrap();
    let mut session = CrawlSession::new(CrawlEngine::new(source, 4), listing, None);
    let report = session.next_pass(&graph).await.unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(report.analyzed, 3);
}
