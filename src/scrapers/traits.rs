use crate::models::CrawlRequest;
use crate::scrapers::stream::ListingStream;
use tokio_util::sync::CancellationToken;

/// Common trait for listing crawlers.
/// The orchestrator only sees this, so other sites can be added alongside.
pub trait ListingCrawler: Send + Sync {
    /// Start crawling one suburb. Listings are produced lazily; the crawl
    /// checks `cancel` before visiting each listing.
    fn crawl(&self, request: CrawlRequest, cancel: CancellationToken) -> ListingStream;

    /// Tag recorded as the listing's source site
    fn source_name(&self) -> &'static str;
}
