//! Listing Scout: crawls realestate.com.au search results for a list of
//! suburbs and writes every listing found as newline-delimited JSON.
//!
//! Flow per suburb: [`scrapers::build_request`] -> [`scrapers::RealEstateCrawler`]
//! -> [`storage::NdjsonListingRepository`], driven by [`orchestrator::CrawlOrchestrator`].

pub mod browser;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod scrapers;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use error::{ConfigError, CrawlError, Result};
pub use models::{CrawlRequest, LifecycleStatus, Listing};
pub use orchestrator::{CrawlOrchestrator, OrchestratorSettings, RunSummary};
