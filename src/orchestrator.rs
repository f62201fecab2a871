//! Runs the configured suburbs one after another.

use crate::clock::Clock;
use crate::config::{AppConfig, SuburbConfig};
use crate::error::{CrawlError, Result};
use crate::models::{CrawlRequest, Listing};
use crate::scrapers::{build_request, ListingCrawler};
use crate::storage::ListingRepository;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub suburbs: Vec<SuburbConfig>,
    /// Pause after each suburb, zero for none
    pub delay_between_suburbs: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            suburbs: config.crawler.suburbs.clone(),
            delay_between_suburbs: config.crawler.delay_between_requests(),
        }
    }
}

/// What a completed run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub suburbs_crawled: usize,
    pub listings_persisted: usize,
    pub files_written: Vec<PathBuf>,
}

pub struct CrawlOrchestrator {
    crawler: Arc<dyn ListingCrawler>,
    repository: Arc<dyn ListingRepository>,
    settings: OrchestratorSettings,
    clock: Arc<dyn Clock>,
}

impl CrawlOrchestrator {
    pub fn new(
        crawler: Arc<dyn ListingCrawler>,
        repository: Arc<dyn ListingRepository>,
        settings: OrchestratorSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            crawler,
            repository,
            settings,
            clock,
        }
    }

    /// Crawl every configured suburb in order.
    ///
    /// Each suburb's listings are persisted only after its crawl has been
    /// drained completely. Cancellation is observed between suburbs, while a
    /// crawl is running and during the pause; it ends the run with
    /// [`CrawlError::Cancelled`] once the active browser context is closed.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        if self.settings.suburbs.is_empty() {
            warn!("No suburbs configured. Add [[crawler.suburbs]] entries to the configuration file.");
            return Ok(summary);
        }

        info!(
            "Starting {} crawl for {} suburb(s)",
            self.crawler.source_name(),
            self.settings.suburbs.len()
        );

        for (index, suburb) in self.settings.suburbs.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancellation requested, skipping remaining suburbs");
                return Err(CrawlError::Cancelled);
            }

            let request = build_request(suburb);
            info!(
                suburb = %request.suburb_query,
                limit = ?request.max_listings,
                "Crawling suburb"
            );

            let listings = self.drain(request.clone(), cancel).await?;
            summary.suburbs_crawled += 1;

            if listings.is_empty() {
                warn!(suburb = %request.suburb_query, "No listings captured");
            } else {
                if let Some(path) = self.repository.store_batch(&request, &listings).await? {
                    summary.files_written.push(path);
                }
                summary.listings_persisted += listings.len();
                info!(
                    suburb = %request.suburb_query,
                    "Persisted {} listings",
                    listings.len()
                );
            }

            let is_last = index + 1 == self.settings.suburbs.len();
            if !is_last && !self.settings.delay_between_suburbs.is_zero() {
                debug!("Delaying for {:?} before next suburb", self.settings.delay_between_suburbs);
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.delay_between_suburbs) => {}
                    _ = cancel.cancelled() => {
                        info!("Cancellation requested during delay, skipping remaining suburbs");
                        return Err(CrawlError::Cancelled);
                    }
                }
            }
        }

        info!("Crawl completed at {}", self.clock.now().to_rfc3339());
        Ok(summary)
    }

    /// Collect the whole crawl for one suburb. On cancellation the stream is
    /// closed, which waits for the crawler to release its browser context.
    async fn drain(&self, request: CrawlRequest, cancel: &CancellationToken) -> Result<Vec<Listing>> {
        let mut stream = self.crawler.crawl(request, cancel.clone());
        let mut listings = Vec::new();

        loop {
            tokio::select! {
                next = stream.next() => match next {
                    Some(listing) => listings.push(listing),
                    None => break,
                },
                _ = cancel.cancelled() => {
                    info!("Cancellation requested, stopping the active crawl");
                    // Whatever the crawler reports, the caller asked to stop.
                    let _ = stream.close().await;
                    return Err(CrawlError::Cancelled);
                }
            }
        }

        stream.close().await?;
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::ListingIdentity;
    use crate::scrapers::ListingStream;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedCrawler {
        batches: HashMap<String, Vec<Listing>>,
        requested: Mutex<Vec<String>>,
    }

    impl ListingCrawler for ScriptedCrawler {
        fn crawl(&self, request: CrawlRequest, _cancel: CancellationToken) -> ListingStream {
            self.requested.lock().unwrap().push(request.suburb_query.clone());
            let listings = self
                .batches
                .get(&request.suburb_query)
                .cloned()
                .unwrap_or_default();
            ListingStream::from_listings(listings)
        }

        fn source_name(&self) -> &'static str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingRepository {
        stored: Mutex<Vec<(String, usize)>>,
        cancel_after_store: Option<CancellationToken>,
        fail: bool,
    }

    #[async_trait]
    impl ListingRepository for RecordingRepository {
        async fn store_batch(&self, request: &CrawlRequest, listings: &[Listing]) -> Result<Option<PathBuf>> {
            if self.fail {
                return Err(CrawlError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only output directory",
                )));
            }
            self.stored
                .lock()
                .unwrap()
                .push((request.suburb_query.clone(), listings.len()));
            if let Some(token) = &self.cancel_after_store {
                token.cancel();
            }
            Ok(Some(PathBuf::from(format!("{}.ndjson", request.suburb_query))))
        }
    }

    fn listing(url: &str) -> Listing {
        Listing {
            identity: ListingIdentity::from_url("scripted", url),
            ..Default::default()
        }
    }

    fn suburbs(names: &[&str]) -> Vec<SuburbConfig> {
        names
            .iter()
            .map(|name| SuburbConfig {
                query: name.to_string(),
                ..Default::default()
            })
            .collect()
    }

    fn orchestrator(
        crawler: Arc<ScriptedCrawler>,
        repository: Arc<RecordingRepository>,
        names: &[&str],
        delay: Duration,
    ) -> CrawlOrchestrator {
        CrawlOrchestrator::new(
            crawler,
            repository,
            OrchestratorSettings {
                suburbs: suburbs(names),
                delay_between_suburbs: delay,
            },
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn no_suburbs_is_a_no_op() {
        let crawler = Arc::new(ScriptedCrawler::default());
        let repository = Arc::new(RecordingRepository::default());

        let summary = orchestrator(crawler.clone(), repository.clone(), &[], Duration::ZERO)
            .run(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(crawler.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_batches_are_not_persisted() {
        let crawler = Arc::new(ScriptedCrawler {
            batches: HashMap::from([(
                "Bondi".to_string(),
                vec![listing("https://example.com/1"), listing("https://example.com/2")],
            )]),
            ..Default::default()
        });
        let repository = Arc::new(RecordingRepository::default());

        let summary = orchestrator(crawler.clone(), repository.clone(), &["Empty", "Bondi"], Duration::ZERO)
            .run(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*crawler.requested.lock().unwrap(), vec!["Empty", "Bondi"]);
        assert_eq!(*repository.stored.lock().unwrap(), vec![("Bondi".to_string(), 2)]);
        assert_eq!(summary.suburbs_crawled, 2);
        assert_eq!(summary.listings_persisted, 2);
        assert_eq!(summary.files_written, vec![PathBuf::from("Bondi.ndjson")]);
    }

    #[tokio::test]
    async fn cancellation_before_start_processes_nothing() {
        let crawler = Arc::new(ScriptedCrawler::default());
        let repository = Arc::new(RecordingRepository::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator(crawler.clone(), repository.clone(), &["Bondi"], Duration::ZERO)
            .run(&cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(crawler.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_delay_stops_remaining_suburbs() {
        let cancel = CancellationToken::new();
        let crawler = Arc::new(ScriptedCrawler {
            batches: HashMap::from([
                ("Bondi".to_string(), vec![listing("https://example.com/1")]),
                ("Coogee".to_string(), vec![listing("https://example.com/2")]),
            ]),
            ..Default::default()
        });
        let repository = Arc::new(RecordingRepository {
            cancel_after_store: Some(cancel.clone()),
            ..Default::default()
        });

        let err = orchestrator(
            crawler.clone(),
            repository.clone(),
            &["Bondi", "Coogee"],
            Duration::from_secs(3600),
        )
        .run(&cancel)
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(*crawler.requested.lock().unwrap(), vec!["Bondi"]);
        assert_eq!(repository.stored.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_applied_between_suburbs_only() {
        let crawler = Arc::new(ScriptedCrawler::default());
        let repository = Arc::new(RecordingRepository::default());
        let started = tokio::time::Instant::now();

        orchestrator(crawler, repository, &["A", "B", "C"], Duration::from_millis(1500))
            .run(&CancellationToken::new())
            .await
            .unwrap();

        // Two pauses for three suburbs, none after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(4500));
    }

    #[tokio::test]
    async fn storage_failure_ends_the_run() {
        let crawler = Arc::new(ScriptedCrawler {
            batches: HashMap::from([("Bondi".to_string(), vec![listing("https://example.com/1")])]),
            ..Default::default()
        });
        let repository = Arc::new(RecordingRepository {
            fail: true,
            ..Default::default()
        });

        let err = orchestrator(crawler.clone(), repository, &["Bondi", "Coogee"], Duration::ZERO)
            .run(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Io(_)));
        assert_eq!(*crawler.requested.lock().unwrap(), vec!["Bondi"]);
    }
}
