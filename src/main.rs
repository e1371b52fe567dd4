use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use research_crawler::adapters::AdapterRegistry;
use research_crawler::config::{
    find_config_file, get_config, load_config, Config, ConfigFile, LogFormat, LoggingConfig,
    CONFIG_FILE_NAME,
};
use research_crawler::crawl::{ConsumerStats, CrawlSession, EmptyPagePolicy, RunHandle, RunStatus};
use research_crawler::models::CrawlLocator;
use research_crawler::storage::{CouchDbStore, DocumentStore, MemoryStore};
use research_crawler::utils::{default_user_agent, HttpClient};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Research Crawler - Harvest research item metadata into CouchDB
#[derive(Parser, Debug)]
#[command(name = "research-crawler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Harvest research item metadata from scholarly APIs into a document store", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show all environment variables
    #[arg(long, global = true)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl every page reachable from a starting URL and store the items found
    Crawl {
        /// Starting URL (its host selects the site adapter)
        url: String,

        /// Keep items in memory and print them instead of writing to the database
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// After a page without items, fetch one more page before stopping
        #[arg(long)]
        fetch_past_empty: bool,
    },

    /// List the supported sites
    Adapters,

    /// Write the effective configuration to a file
    InitConfig {
        /// Destination (defaults to ./research-crawler.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn print_env_vars() {
    println!("Research Crawler - Environment Variables");
    println!();
    println!("Database:");
    println!("  RESEARCH_CRAWLER_DATABASE__URL        CouchDB base URL (default: http://localhost:5984)");
    println!("  RESEARCH_CRAWLER_DATABASE__USERNAME   CouchDB user (default: admin)");
    println!("  RESEARCH_CRAWLER_DATABASE__PASSWORD   CouchDB password (default: admin)");
    println!("  RESEARCH_CRAWLER_DATABASE__NAME       Database name (default: research_items)");
    println!();
    println!("Crawling:");
    println!("  RESEARCH_CRAWLER_QUEUE__CAPACITY            Hand-off queue size (default: 500)");
    println!("  RESEARCH_CRAWLER_CRAWL__EMPTY_PAGE_POLICY   stop | fetch-next (default: stop)");
    println!("  RESEARCH_CRAWLER_CRAWL__MAX_PAGES           Page limit per run (default: none)");
    println!("  RESEARCH_CRAWLER_CRAWL__USER_AGENT          User agent for requests");
    println!("  RESEARCH_CRAWLER_CRAWL__TIMEOUT_SECS        Request timeout (default: 30)");
    println!();
    println!("Logging:");
    println!("  RESEARCH_CRAWLER_LOGGING__LEVEL       Log level (default: info)");
    println!("  RESEARCH_CRAWLER_LOGGING__FORMAT      text | json (default: text)");
    println!("  RUST_LOG                              Overrides the log filter entirely");
    println!();
    println!("Global Proxy Settings:");
    println!("  HTTP_PROXY / HTTPS_PROXY / NO_PROXY   Honoured by the HTTP client");
    println!();
    println!("Example:");
    println!("  export RESEARCH_CRAWLER_DATABASE__URL=\"http://couch.internal:5984\"");
    println!("  research-crawler crawl https://api.biorxiv.org/details/biorxiv/2024-01-01/2024-01-31/0");
    std::process::exit(0);
}

fn init_tracing(cli: &Cli, logging: &LoggingConfig) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => logging.level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("research_crawler={}", level)));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Show environment variables and exit if requested
    if cli.env {
        print_env_vars();
    }

    // Load configuration from file if specified or found in default locations
    let config_path = cli.config.clone().or_else(find_config_file);
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => get_config()?,
    };

    init_tracing(&cli, &config.logging);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    match cli.command {
        Some(Commands::Crawl {
            url,
            dry_run,
            max_pages,
            fetch_past_empty,
        }) => crawl(&config, &url, dry_run, max_pages, fetch_past_empty).await,
        Some(Commands::Adapters) => {
            let registry = AdapterRegistry::new();
            let mut adapters: Vec<_> = registry.all().collect();
            adapters.sort_by(|a, b| a.host().cmp(b.host()));

            for adapter in adapters {
                println!(
                    "{:<20} {:<10} {} (delay {}s)",
                    adapter.host(),
                    adapter.id(),
                    adapter.name(),
                    adapter.crawl_delay_seconds()
                );
            }
            Ok(())
        }
        Some(Commands::InitConfig { path, force }) => {
            let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            ConfigFile::from(config).save(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

async fn crawl(
    config: &Config,
    url: &str,
    dry_run: bool,
    max_pages: Option<u32>,
    fetch_past_empty: bool,
) -> Result<()> {
    let locator = CrawlLocator::parse(url)?;

    let mut settings = config.crawl_settings();
    if max_pages.is_some() {
        settings.producer.max_pages = max_pages;
    }
    if fetch_past_empty {
        settings.producer.empty_page_policy = EmptyPagePolicy::FetchNext;
    }

    let user_agent = config
        .crawl
        .user_agent
        .clone()
        .unwrap_or_else(|| default_user_agent().to_string());
    let client = HttpClient::with_options(&user_agent, config.crawl.timeout())?;

    let memory = dry_run.then(|| Arc::new(MemoryStore::new()));
    let store: Arc<dyn DocumentStore> = match &memory {
        Some(memory) => memory.clone(),
        None => {
            let couch = CouchDbStore::new(client.clone(), &config.database)?;
            couch.ensure_database().await?;
            Arc::new(couch)
        }
    };

    let session = CrawlSession::start(
        Arc::new(AdapterRegistry::new()),
        Arc::new(client),
        store,
        &settings,
    )?;
    let handle = session.start_run(locator);

    let status = supervise_run(handle, tokio::signal::ctrl_c()).await;
    let stats = drain_session(session, tokio::signal::ctrl_c()).await;
    println!("Run {}", status);
    println!(
        "Stored: {} inserted, {} updated, {} unchanged, {} failed",
        stats.inserted, stats.updated, stats.discarded, stats.failed
    );

    if let Some(memory) = memory {
        for item in memory.documents() {
            println!("{}", serde_json::to_string(&item)?);
        }
    }

    if let RunStatus::Failed(reason) = status {
        bail!("crawl failed: {}", reason);
    }
    Ok(())
}

/// Wait for a run to end, cancelling it once `interrupt` completes successfully.
///
/// An `interrupt` that fails (no signal handler) is ignored.
async fn supervise_run<F>(handle: RunHandle, interrupt: F) -> RunStatus
where
    F: Future<Output = std::io::Result<()>>,
{
    let mut updates = handle.subscribe();
    tokio::select! {
        Ok(()) = interrupt => {
            tracing::warn!("Interrupted, cancelling crawl");
            handle.cancel();
        }
        _ = updates.wait_for(RunStatus::is_finished) => {}
    }
    handle.wait().await
}

/// Let the consumer store everything queued; a successful `interrupt` stops it early.
async fn drain_session<F>(session: CrawlSession, interrupt: F) -> ConsumerStats
where
    F: Future<Output = std::io::Result<()>>,
{
    let stop = session.consumer_token();
    let drain = session.drain();
    tokio::pin!(drain);

    tokio::select! {
        stats = &mut drain => stats,
        Ok(()) = interrupt => {
            tracing::warn!("Interrupted again, leaving queued items unstored");
            stop.cancel();
            drain.await
        }
    }
}
