use anyhow::Context;
use clap::Parser;
use listing_scout::browser::ChromeSession;
use listing_scout::scrapers::{CrawlerOptions, RealEstateCrawler};
use listing_scout::storage::NdjsonListingRepository;
use listing_scout::{AppConfig, Clock, CrawlError, CrawlOrchestrator, OrchestratorSettings, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Crawl realestate.com.au listings for the configured suburbs and save them
/// as newline-delimited JSON.
#[derive(Parser, Debug)]
#[command(name = "listing-scout", version)]
struct Cli {
    /// Path to TOML configuration file (default: ./listing-scout.toml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit one synthetic listing per suburb without launching a browser
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    info!("🏠 Listing Scout - realestate.com.au crawler");

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.dry_run {
        config.crawler.dry_run = true;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let session = Arc::new(ChromeSession::new(config.browser.clone()));
    let crawler = Arc::new(RealEstateCrawler::new(
        session.clone(),
        CrawlerOptions::from_config(&config),
        clock.clone(),
    ));
    let repository = Arc::new(NdjsonListingRepository::new(config.storage.clone(), clock.clone()));
    let orchestrator = CrawlOrchestrator::new(
        crawler,
        repository,
        OrchestratorSettings::from_config(&config),
        clock,
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, shutting down...");
            signal_token.cancel();
        }
    });

    let outcome = orchestrator.run(&cancel).await;

    // The crawler holds the other reference to the session; dropping both
    // shuts the browser process down.
    drop(orchestrator);
    if session.is_launched() {
        info!("Closing browser");
    }
    drop(session);

    match outcome {
        Ok(summary) => {
            info!(
                "💾 Saved {} listings from {} suburb(s) to {} file(s)",
                summary.listings_persisted,
                summary.suburbs_crawled,
                summary.files_written.len()
            );
            Ok(())
        }
        Err(CrawlError::Cancelled) => {
            info!("Crawl cancelled, remaining suburbs were skipped");
            Ok(())
        }
        Err(e) => Err(e).context("Crawl failed"),
    }
}

/// Sets up the tracing subscriber. `RUST_LOG` wins over the CLI flags.
fn setup_logging(verbose: u8, quiet: bool) {
    let default_filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "listing_scout=info,warn",
            1 => "listing_scout=debug,info",
            _ => "listing_scout=trace,debug",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
