//! Repograph main entry point
//!
//! This is the command-line interface for the Repograph crawler.

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::Parser;
use repograph::config::{load_config_with_hash, Config};
use repograph::crawler::{CrawlEngine, CrawlSession};
use repograph::graph::SharedGraph;
use repograph::output::{
    compute_statistics, load_statistics, print_pass_log, print_statistics, read_gexf, write_gexf,
};
use repograph::source::{build_source, Listing};
use repograph::storage::{open_storage, session_key, SessionRecord, Storage};
use repograph::CrawlError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Repograph: an incremental repository/person graph crawler
///
/// Repograph pages through a code-hosting platform's repository listing under
/// its rate limit and links every repository to its owner and contributors
/// (or, with --since, to its recent committers). Runs are resumable: the
/// next invocation with the same query continues where the last one stopped.
#[derive(Parser, Debug)]
#[command(name = "repograph")]
#[command(version)]
#[command(about = "An incremental repository/person graph crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Search query; the platform's full listing when absent
    #[arg(long)]
    query: Option<String>,

    /// Maximum number of repositories to add; on resume it replaces the stored remaining limit
    #[arg(long)]
    limit: Option<u64>,

    /// Link commit authors since this date (YYYY-MM-DD) instead of owners and contributors
    #[arg(long, value_name = "DATE")]
    since: Option<String>,

    /// Seed the graph from a GEXF file before crawling
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Stop after this many passes (overrides max-passes)
    #[arg(long)]
    passes: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start over: drop the stored graph and this query's cursor
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_gexf"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_gexf"])]
    stats: bool,

    /// Write the stored graph as GEXF to the configured gexf-path and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_gexf: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let listing = Listing::new(cli.query.clone(), parse_since(cli.since.as_deref())?);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &listing, cli.limit);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_gexf {
        handle_export_gexf(&config)?;
    } else {
        handle_crawl(&config, listing, &cli).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("repograph=info,warn"),
            1 => EnvFilter::new("repograph=debug,info"),
            2 => EnvFilter::new("repograph=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Parses a `YYYY-MM-DD` cutoff into midnight UTC
fn parse_since(since: Option<&str>) -> Result<Option<DateTime<Utc>>, CrawlError> {
    let Some(since) = since else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(since, "%Y-%m-%d")
        .map_err(|_| CrawlError::InvalidDate(since.to_string()))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CrawlError::InvalidDate(since.to_string()))?;
    Ok(Some(Utc.from_utc_datetime(&midnight)))
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, listing: &Listing, limit: Option<u64>) {
    println!("=== Repograph Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent imports: {}",
        config.crawler.max_concurrent_imports
    );
    println!("  Page size: {}", config.crawler.page_size);
    println!("  Wait between passes: {}s", config.crawler.wait_time_secs);
    match config.crawler.max_passes {
        Some(max) => println!("  Max passes: {}", max),
        None => println!("  Max passes: unlimited"),
    }

    println!("\nSource:");
    println!("  Kind: {}", config.source.kind.as_str());
    println!(
        "  Base URL: {}",
        config.source.base_url.as_deref().unwrap_or("(platform default)")
    );
    println!(
        "  Credentials: {}",
        match config.source.credentials() {
            repograph::config::Credentials::Anonymous => "anonymous",
            repograph::config::Credentials::Basic { .. } => "user/password",
            repograph::config::Credentials::Token(_) => "token",
        }
    );

    println!("\nListing:");
    println!("  Query: {}", listing.describe());
    match listing.since {
        Some(since) => println!("  Committers since: {}", since.format("%Y-%m-%d")),
        None => println!("  Linking owners and contributors"),
    }
    match limit {
        Some(limit) => println!("  Limit: {} repositories", limit),
        None => println!("  Limit: none"),
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(gexf) = &config.output.gexf_path {
        println!("  GEXF: {}", gexf);
    }
    println!(
        "  Session key: {}",
        session_key(&config.source, listing)
    );

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;

    print_statistics(&load_statistics(&storage)?);
    print_pass_log(&storage.list_passes(None)?);

    Ok(())
}

/// Handles the --export-gexf mode: writes the stored graph
fn handle_export_gexf(config: &Config) -> anyhow::Result<()> {
    let Some(gexf_path) = &config.output.gexf_path else {
        bail!("--export-gexf needs output.gexf-path in the configuration");
    };

    println!("=== Exporting Graph ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", gexf_path);
    println!();

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let graph = storage.load_graph()?;
    write_gexf(&graph, Path::new(gexf_path))?;

    println!("✓ Graph exported to: {}", gexf_path);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, listing: Listing, cli: &Cli) -> anyhow::Result<()> {
    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    let key = session_key(&config.source, &listing);

    if cli.fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
        storage.clear_graph()?;
        storage.delete_session(&key)?;
    }

    if let Some(input) = &cli.input {
        let seed = read_gexf(input)
            .with_context(|| format!("Failed to read GEXF input {}", input.display()))?;
        let mut stored = storage.load_graph()?;
        let added = stored.merge(&seed);
        storage.save_graph(&stored)?;
        tracing::info!("Seeded {} repositories from {}", added, input.display());
    }

    let previous = storage.load_session(&key)?;
    if let Some(record) = &previous {
        if record.cursor.completed {
            tracing::info!(
                "Session for \"{}\" is already complete; use --fresh to start over",
                listing.describe()
            );
            return Ok(());
        }
        tracing::info!(
            "Resuming \"{}\" at offset {}",
            listing.describe(),
            record.cursor.offset
        );
    }

    let graph = SharedGraph::new(storage.load_graph()?);
    tracing::info!(
        "Loaded graph with {} repositories",
        graph.repository_count()
    );

    let source = build_source(&config.source, config.crawler.page_size)?;
    let source_name = source.name().to_string();
    let engine = CrawlEngine::new(source, config.crawler.max_concurrent_imports as usize);

    let interrupter = engine.interrupter();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight imports");
            interrupter.interrupt();
        }
    });

    let mut session = match previous {
        Some(record) => {
            let mut session =
                CrawlSession::resume(engine, listing.clone(), record.cursor, record.remaining);
            if let Some(limit) = cli.limit {
                tracing::info!(
                    "--limit {} replaces the stored limit ({} left)",
                    limit,
                    record
                        .remaining
                        .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
                );
                session.retarget(listing.clone(), Some(limit));
            }
            session
        }
        None => CrawlSession::new(engine, listing.clone(), cli.limit),
    }
    .with_wait_time(Duration::from_secs(config.crawler.wait_time_secs));

    let max_passes = cli.passes.or(config.crawler.max_passes);
    let mut passes = 0u32;
    loop {
        if max_passes.map_or(false, |max| passes >= max) {
            tracing::info!("Stopping after {} passes", passes);
            break;
        }

        let started_at = Utc::now();
        let Some(report) = session.next_pass(&graph).await else {
            break;
        };
        passes += 1;
        if report.status.is_error() && report.status.completes_session() {
            tracing::warn!(
                "Listing for \"{}\" ended prematurely at offset {} ({})",
                listing.describe(),
                report.offset,
                report.error.as_deref().unwrap_or("no detail")
            );
        } else if report.status.is_error() {
            tracing::warn!(
                "Pass {} ended with {}; the next pass retries from offset {}",
                passes,
                report.status,
                report.offset
            );
        }

        storage.save_graph(&graph.snapshot())?;
        storage.save_session(&SessionRecord::for_listing(
            &key,
            &source_name,
            &listing,
            session.cursor(),
            session.remaining(),
        ))?;
        storage.record_pass(&key, &report, started_at)?;
    }

    if session.is_completed() {
        tracing::info!("Session for \"{}\" complete", listing.describe());
    }

    let snapshot = graph.snapshot();
    if !cli.quiet {
        print_statistics(&compute_statistics(&snapshot));
    }
    if let Some(gexf_path) = &config.output.gexf_path {
        write_gexf(&snapshot, Path::new(gexf_path))?;
    }

    Ok(())
}
