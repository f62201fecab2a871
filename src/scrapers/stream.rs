use crate::error::{CrawlError, Result};
use crate::models::Listing;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lazily produced listings for one crawl.
///
/// The producer runs on a blocking worker and hands listings over a channel
/// with room for a single item, so it never gets more than one listing ahead
/// of the consumer. A stream can be consumed once; [`ListingStream::close`]
/// stops it early and waits until the producer has released its browser
/// resources.
pub struct ListingStream {
    rx: mpsc::Receiver<Listing>,
    producer: Option<JoinHandle<Result<()>>>,
}

/// Producer half handed to the crawl worker.
pub struct ListingSink {
    tx: mpsc::Sender<Listing>,
}

impl ListingSink {
    /// Hand one listing to the consumer, blocking while it is busy.
    /// Fails with [`CrawlError::Cancelled`] once the consumer has gone away.
    pub fn emit(&self, listing: Listing) -> Result<()> {
        self.tx
            .blocking_send(listing)
            .map_err(|_| CrawlError::Cancelled)
    }
}

impl ListingStream {
    /// Run `produce` on the blocking pool and stream what it emits.
    pub fn spawn_blocking<F>(produce: F) -> Self
    where
        F: FnOnce(ListingSink) -> Result<()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::task::spawn_blocking(move || produce(ListingSink { tx }));
        Self {
            rx,
            producer: Some(producer),
        }
    }

    /// A stream over listings that already exist.
    pub fn from_listings(listings: Vec<Listing>) -> Self {
        let (tx, rx) = mpsc::channel(listings.len().max(1));
        for listing in listings {
            // Capacity matches the item count, so this cannot fail.
            let _ = tx.try_send(listing);
        }
        Self { rx, producer: None }
    }

    /// Next listing, or `None` once the producer is done.
    pub async fn next(&mut self) -> Option<Listing> {
        self.rx.recv().await
    }

    /// Stop consuming and wait for the producer to exit.
    ///
    /// Returns how the producer ended: `Ok` on normal completion, the
    /// producer's own error otherwise. Listings still buffered are discarded.
    pub async fn close(mut self) -> Result<()> {
        self.rx.close();
        while self.rx.recv().await.is_some() {}

        match self.producer.take() {
            None => Ok(()),
            Some(handle) => handle
                .await
                .map_err(|e| CrawlError::Producer(e.to_string()))?,
        }
    }

    /// Drain every listing, then report how the producer ended.
    pub async fn collect(mut self) -> Result<Vec<Listing>> {
        let mut listings = Vec::new();
        while let Some(listing) = self.next().await {
            listings.push(listing);
        }
        self.close().await?;
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingIdentity;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn listing(n: usize) -> Listing {
        Listing {
            identity: ListingIdentity::from_url("test", &format!("https://example.com/{n}")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn yields_in_order_then_reports_success() {
        let stream = ListingStream::spawn_blocking(|sink| {
            for n in 0..3 {
                sink.emit(listing(n))?;
            }
            Ok(())
        });

        let listings = stream.collect().await.unwrap();
        let ids: Vec<&str> = listings
            .iter()
            .map(|l| l.identity.source_listing_id.as_str())
            .collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn producer_error_surfaces_after_drain() {
        let stream = ListingStream::spawn_blocking(|sink| {
            sink.emit(listing(1))?;
            Err(CrawlError::Producer("boom".to_string()))
        });

        let err = stream.collect().await.unwrap_err();
        assert!(matches!(err, CrawlError::Producer(_)));
    }

    #[tokio::test]
    async fn close_stops_producer_and_waits_for_cleanup() {
        let produced = Arc::new(AtomicUsize::new(0));
        let cleaned_up = Arc::new(AtomicBool::new(false));

        let mut stream = {
            let produced = produced.clone();
            let cleaned_up = cleaned_up.clone();
            ListingStream::spawn_blocking(move |sink| {
                let result: Result<()> = (0..100).try_for_each(|n| {
                    sink.emit(listing(n))?;
                    produced.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                cleaned_up.store(true, Ordering::SeqCst);
                result
            })
        };

        assert!(stream.next().await.is_some());
        let outcome = stream.close().await;

        assert!(matches!(outcome, Err(CrawlError::Cancelled)));
        assert!(cleaned_up.load(Ordering::SeqCst));
        assert!(produced.load(Ordering::SeqCst) < 100);
    }

    #[tokio::test]
    async fn ready_made_stream_yields_everything() {
        let mut stream = ListingStream::from_listings(vec![listing(7)]);
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        assert!(stream.close().await.is_ok());
    }
}
