//! spiderdb command-line interface
//!
//! Crawls seed URLs (`urls`) or expands hostnames through their sitemaps
//! (`sites`) into a SQLite database.

use clap::{Parser, Subcommand};
use spiderdb::config::load_config;
use spiderdb::crawler::{
    crawl_sites_with, crawl_urls_with, HttpTransport, InterruptAction, InterruptHandle,
    NoopExtractor, ProgressSnapshot,
};
use spiderdb::{CrawlConfig, SqliteStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// spiderdb: a polite, SQL-embedded web crawler
#[derive(Parser, Debug)]
#[command(name = "spiderdb")]
#[command(version)]
#[command(about = "A polite web crawler that persists results into SQLite", long_about = None)]
struct Cli {
    /// Path to the SQLite database (created if absent)
    #[arg(long, value_name = "DB")]
    db: PathBuf,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// User-agent string (overrides the config file)
    #[arg(long)]
    user_agent: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the configuration and show what would be crawled
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a list of seed URLs
    Urls {
        /// Seed URLs to fetch
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Discover and crawl hostnames through their sitemaps
    Sites {
        /// Hostnames (or origins) to expand
        #[arg(required = true)]
        hosts: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            load_config(path)?
        }
        None => CrawlConfig::default(),
    };

    if let Some(user_agent) = &cli.user_agent {
        config.user_agent = user_agent.clone();
    }

    if cli.dry_run {
        return handle_dry_run(&config, &cli.command);
    }

    let interrupt = InterruptHandle::new();
    install_signal_handler(interrupt.clone());

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cli.db)?);
    let transport = Box::new(HttpTransport::new(&config)?);
    let progress: Option<spiderdb::crawler::ProgressCallback> =
        Some(Box::new(print_progress));

    let report = match &cli.command {
        Command::Urls { urls } => crawl_urls_with(
            config,
            store,
            transport,
            Box::new(NoopExtractor),
            interrupt,
            progress,
            urls,
        )?,
        Command::Sites { hosts } => crawl_sites_with(
            config,
            store,
            transport,
            Box::new(NoopExtractor),
            interrupt,
            progress,
            hosts,
        )?,
    };

    println!(
        "{} rows written ({} inserted, {} updated); {} completed, {} failed, {} skipped",
        report.rows_written(),
        report.inserted,
        report.updated,
        report.completed,
        report.failed,
        report.skipped
    );

    Ok(())
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("spiderdb=info,warn"),
            1 => EnvFilter::new("spiderdb=debug,info"),
            2 => EnvFilter::new("spiderdb=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Ctrl-C: first press stops gracefully, second within the grace window
/// exits immediately
fn install_signal_handler(interrupt: InterruptHandle) {
    let result = ctrlc::set_handler(move || match interrupt.interrupt() {
        InterruptAction::Graceful => {
            eprintln!("\nInterrupt received, finishing in-flight requests (Ctrl-C again to force quit)");
        }
        InterruptAction::HardExit => {
            eprintln!("\nForce quit");
            std::process::exit(130);
        }
    });

    if let Err(e) = result {
        tracing::warn!("Failed to install Ctrl-C handler: {}", e);
    }
}

fn print_progress(snapshot: &ProgressSnapshot) {
    if snapshot.percent < 0.0 {
        tracing::info!(
            "Progress: {} completed, {} failed, {} skipped, {} bytes",
            snapshot.completed,
            snapshot.failed,
            snapshot.skipped,
            snapshot.bytes_downloaded
        );
    } else {
        tracing::info!(
            "Progress: {:.1}% ({} completed, {} failed, {} skipped)",
            snapshot.percent,
            snapshot.completed,
            snapshot.failed,
            snapshot.skipped
        );
    }
}

/// Validates the configuration and prints the crawl plan without fetching
fn handle_dry_run(
    config: &CrawlConfig,
    command: &Command,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut checked = config.clone();
    spiderdb::config::validate(&mut checked)?;

    println!("=== spiderdb dry run ===\n");
    println!("User agent: {}", checked.user_agent);
    println!("Threads: {}", checked.threads);
    println!(
        "Connections: {} total, {} per domain",
        checked.max_total_connections, checked.max_parallel_per_domain
    );
    println!(
        "Delays: default {}s (clamped to {}..{}s)",
        checked.default_crawl_delay, checked.min_crawl_delay, checked.max_crawl_delay
    );
    println!("Respect robots.txt: {}", checked.respect_robots_txt);
    println!("Follow links: {}", checked.follow_links);
    if !checked.url_filter.is_empty() {
        println!("URL filter: {}", checked.url_filter);
    }

    match command {
        Command::Urls { urls } => {
            println!("\nWould crawl {} seed URLs:", urls.len());
            for url in urls {
                println!("  - {}", url);
            }
        }
        Command::Sites { hosts } => {
            println!("\nWould discover sitemaps for {} hosts:", hosts.len());
            for host in hosts {
                println!("  - {}", host);
            }
        }
    }

    println!("\nConfiguration is valid");
    Ok(())
}
