use crate::browser::{BrowserSession, BrowsingContext, OpenContext, OpenPage};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::{CrawlError, Result};
use crate::models::{
    AddressDetails, CoreAttributes, CrawlRequest, Listing, ListingIdentity, PricingInformation,
    QueryParameters, StatusMetadata,
};
use crate::scrapers::extract::{extract_fields, DetailField, LISTING_CARD_LINK, LISTING_DETAIL_FIELDS};
use crate::scrapers::stream::{ListingSink, ListingStream};
use crate::scrapers::traits::ListingCrawler;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

pub const SOURCE_SITE: &str = "realestate.com.au";

/// Settings the crawler needs from the process configuration
#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    pub base_url: String,
    pub listing_page_limit: u32,
    pub dry_run: bool,
    pub navigation_timeout: Duration,
}

impl CrawlerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.crawler.base_url.clone(),
            listing_page_limit: config.crawler.listing_page_limit,
            dry_run: config.crawler.dry_run,
            navigation_timeout: config.browser.navigation_timeout(),
        }
    }
}

/// Crawler for realestate.com.au search results and listing pages.
///
/// One search page is loaded per suburb, then every discovered listing is
/// visited in its own tab, strictly one at a time.
#[derive(Clone)]
pub struct RealEstateCrawler {
    session: Arc<dyn BrowserSession>,
    options: CrawlerOptions,
    clock: Arc<dyn Clock>,
}

impl RealEstateCrawler {
    pub fn new(session: Arc<dyn BrowserSession>, options: CrawlerOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            session,
            options,
            clock,
        }
    }

    /// Search URL for `request`: fixed defaults overlaid by the request's own parameters.
    pub fn search_url(&self, request: &CrawlRequest) -> String {
        let mut parameters: QueryParameters = [
            ("includeSurrounding", "false"),
            ("source", "refine"),
            ("activeSort", "default"),
            ("where", request.suburb_query.as_str()),
        ]
        .into_iter()
        .collect();
        parameters.merge(&request.query_parameters);

        let query = parameters
            .iter()
            .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}/buy?{}", self.options.base_url.trim_end_matches('/'), query)
    }

    /// The record emitted for every suburb in dry-run mode.
    pub fn dry_run_listing(&self, request: &CrawlRequest) -> Listing {
        let canonical_url = format!("{}/sample-listing", self.options.base_url.trim_end_matches('/'));

        Listing {
            identity: ListingIdentity {
                source_site: SOURCE_SITE.to_string(),
                source_listing_id: uuid::Uuid::new_v4().simple().to_string(),
                canonical_url,
            },
            status: StatusMetadata::seen_at(self.clock.now()),
            address: AddressDetails {
                full_address_raw: format!("{} (dry run)", request.suburb_query),
                state: request.state.clone(),
                ..Default::default()
            },
            attributes: CoreAttributes {
                property_type: Some("house".to_string()),
                bedrooms: Some(3),
                bathrooms: Some(2),
                parking_spaces: Some(1),
                internal_size_sqm: Some(120.0),
                ..Default::default()
            },
            pricing: PricingInformation {
                price_guide_raw: Some("$1,000,000 - $1,100,000".to_string()),
                price_min_aud: Some(1_000_000.0),
                price_max_aud: Some(1_100_000.0),
                nbn_tech: Some("FTTP".to_string()),
                ..Default::default()
            },
            raw_attributes: BTreeMap::new(),
        }
    }

    fn crawl_live(
        &self,
        request: &CrawlRequest,
        sink: &ListingSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        // Closed on every way out of this function, including early returns.
        let context = OpenContext::new(self.session.open_context()?);

        let candidates = self.discover_candidates(&*context, request);
        info!(
            suburb = %request.suburb_query,
            "Discovered {} candidate listings",
            candidates.len()
        );

        let mut emitted = 0usize;
        for listing_url in &candidates {
            if let Some(max) = request.max_listings {
                if emitted >= max {
                    info!(suburb = %request.suburb_query, "Reached max listing limit ({})", max);
                    break;
                }
            }

            if cancel.is_cancelled() {
                info!(suburb = %request.suburb_query, "Crawl cancelled, closing browser context");
                return Err(CrawlError::Cancelled);
            }

            match self.scrape_listing(&*context, listing_url) {
                Ok(listing) => {
                    sink.emit(listing)?;
                    emitted += 1;
                }
                Err(e) => error!(url = %listing_url, "Failed to scrape listing: {:#}", e),
            }
        }

        Ok(())
    }

    /// Listing URLs on the first results page. Any failure yields an empty list.
    fn discover_candidates(&self, context: &dyn BrowsingContext, request: &CrawlRequest) -> Vec<String> {
        let search_url = self.search_url(request);
        info!(suburb = %request.suburb_query, "Navigating to search page {}", search_url);

        if self.options.listing_page_limit > 1 {
            debug!(
                "listing-page-limit is {} but pagination is not implemented; only the first page is crawled",
                self.options.listing_page_limit
            );
        }

        match self.read_candidate_links(context, &search_url) {
            Ok(hrefs) => {
                let base = Url::parse(&self.options.base_url).ok();
                let candidates = dedupe_candidates(base.as_ref(), hrefs);
                if candidates.is_empty() {
                    warn!(suburb = %request.suburb_query, "Search page returned no listing links");
                }
                candidates
            }
            Err(e) => {
                error!(
                    suburb = %request.suburb_query,
                    "Failed to extract listing URLs: {:#}", e
                );
                Vec::new()
            }
        }
    }

    fn read_candidate_links(&self, context: &dyn BrowsingContext, search_url: &str) -> anyhow::Result<Vec<String>> {
        let page = OpenPage::new(context.new_page()?);
        page.goto(search_url, self.options.navigation_timeout)?;

        let mut hrefs = Vec::new();
        for anchor in page.query_selector_all(LISTING_CARD_LINK)? {
            if let Some(href) = anchor.attribute("href")? {
                hrefs.push(href);
            }
        }
        Ok(hrefs)
    }

    fn scrape_listing(&self, context: &dyn BrowsingContext, listing_url: &str) -> anyhow::Result<Listing> {
        info!(url = %listing_url, "Scraping listing");

        let page = OpenPage::new(context.new_page()?);
        page.goto(listing_url, self.options.navigation_timeout)?;
        let fields = extract_fields(&*page, LISTING_DETAIL_FIELDS)?;
        debug!(url = %listing_url, "Extracted {} fields", fields.len());

        let now = self.clock.now();
        let raw_attributes = BTreeMap::from([
            ("pageUrl".to_string(), Some(listing_url.to_string())),
            ("scrapedAt".to_string(), Some(now.to_rfc3339())),
        ]);

        Ok(Listing {
            identity: ListingIdentity::from_url(SOURCE_SITE, listing_url),
            status: StatusMetadata::seen_at(now),
            address: AddressDetails {
                full_address_raw: fields.text(DetailField::Address).unwrap_or_default(),
                ..Default::default()
            },
            attributes: CoreAttributes {
                property_type: fields.text(DetailField::PropertyType),
                bedrooms: fields.count(DetailField::Bedrooms),
                bathrooms: fields.count(DetailField::Bathrooms),
                parking_spaces: fields.count(DetailField::ParkingSpaces),
                ..Default::default()
            },
            pricing: PricingInformation {
                price_guide_raw: fields.text(DetailField::PriceGuide),
                ..Default::default()
            },
            raw_attributes,
        })
    }
}

impl ListingCrawler for RealEstateCrawler {
    fn crawl(&self, request: CrawlRequest, cancel: CancellationToken) -> ListingStream {
        if self.options.dry_run {
            warn!(
                suburb = %request.suburb_query,
                "Crawler running in dry-run mode, returning a synthetic listing"
            );
            return ListingStream::from_listings(vec![self.dry_run_listing(&request)]);
        }

        let crawler = self.clone();
        ListingStream::spawn_blocking(move |sink| crawler.crawl_live(&request, &sink, &cancel))
    }

    fn source_name(&self) -> &'static str {
        SOURCE_SITE
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Strip query strings, resolve relative links against `base` and drop
/// duplicates (case-insensitive), keeping first-seen order.
pub fn dedupe_candidates<I>(base: Option<&Url>, hrefs: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for href in hrefs {
        let href = href.trim();
        let without_query = href.split('?').next().unwrap_or(href);
        if without_query.is_empty() {
            continue;
        }

        let absolute = match Url::parse(without_query) {
            Ok(url) => url.to_string(),
            Err(_) => match base.and_then(|b| b.join(without_query).ok()) {
                Some(url) => url.to_string(),
                None => {
                    debug!(href = %href, "Skipping listing link that cannot be resolved");
                    continue;
                }
            },
        };

        if seen.insert(absolute.to_lowercase()) {
            candidates.push(absolute);
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowsingContext;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    struct UnusedSession;

    impl BrowserSession for UnusedSession {
        fn open_context(&self) -> anyhow::Result<Box<dyn BrowsingContext + '_>> {
            anyhow::bail!("no browser in unit tests")
        }
    }

    fn crawler(base_url: &str, dry_run: bool) -> RealEstateCrawler {
        RealEstateCrawler::new(
            Arc::new(UnusedSession),
            CrawlerOptions {
                base_url: base_url.to_string(),
                listing_page_limit: 1,
                dry_run,
                navigation_timeout: Duration::from_secs(30),
            },
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap())),
        )
    }

    fn request(query: &str) -> CrawlRequest {
        CrawlRequest {
            suburb_query: query.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn search_url_uses_defaults_and_encodes() {
        let url = crawler("https://www.realestate.com.au/", false).search_url(&request("Bondi Beach, NSW 2026"));

        assert_eq!(
            url,
            "https://www.realestate.com.au/buy?includeSurrounding=false&source=refine&activeSort=default&where=Bondi+Beach%2C+NSW+2026"
        );
    }

    #[test]
    fn request_parameters_override_defaults() {
        let mut req = request("Fitzroy");
        req.query_parameters.insert("ActiveSort", "price-asc");
        req.query_parameters.insert("maxBeds", "3");

        let url = crawler("https://example.com", false).search_url(&req);

        assert!(url.starts_with("https://example.com/buy?"));
        assert!(url.contains("activeSort=price-asc"));
        assert!(!url.contains("activeSort=default"));
        assert!(url.ends_with("&maxBeds=3"));
    }

    #[test]
    fn candidates_ignore_query_and_case_and_keep_order() {
        let base = Url::parse("https://www.realestate.com.au").unwrap();
        let candidates = dedupe_candidates(
            Some(&base),
            vec![
                "/property-house-nsw-bondi-1?sourcePage=rea:buy".to_string(),
                "https://www.realestate.com.au/property-unit-nsw-bondi-2".to_string(),
                "/property-house-nsw-bondi-1?sourcePage=other".to_string(),
                "/PROPERTY-HOUSE-NSW-BONDI-1".to_string(),
                "".to_string(),
            ],
        );

        assert_eq!(
            candidates,
            vec![
                "https://www.realestate.com.au/property-house-nsw-bondi-1",
                "https://www.realestate.com.au/property-unit-nsw-bondi-2",
            ]
        );
    }

    #[test]
    fn relative_links_without_base_are_skipped() {
        let candidates = dedupe_candidates(None, vec!["/property-1".to_string()]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn dry_run_listing_has_fixed_shape() {
        let crawler = crawler("https://www.realestate.com.au/", true);
        let mut req = request("Bondi Beach");
        req.state = Some("NSW".to_string());

        let first = crawler.dry_run_listing(&req);
        let second = crawler.dry_run_listing(&req);

        assert_eq!(first.identity.source_site, "realestate.com.au");
        assert_eq!(
            first.identity.canonical_url,
            "https://www.realestate.com.au/sample-listing"
        );
        assert_eq!(first.identity.source_listing_id.len(), 32);
        assert_ne!(first.identity.source_listing_id, second.identity.source_listing_id);
        assert_eq!(first.address.full_address_raw, "Bondi Beach (dry run)");
        assert_eq!(first.address.state.as_deref(), Some("NSW"));
        assert_eq!(first.attributes.bedrooms, Some(3));
        assert_eq!(first.pricing.price_min_aud, Some(1_000_000.0));
        assert_eq!(first.status.lifecycle_status, crate::models::LifecycleStatus::Active);
    }

    #[tokio::test]
    async fn dry_run_never_opens_the_browser() {
        let crawler = crawler("https://www.realestate.com.au", true);
        let mut req = request("Carlton");
        req.max_listings = Some(0);

        let listings = crawler
            .crawl(req, CancellationToken::new())
            .collect()
            .await
            .unwrap();

        assert_eq!(listings.len(), 1);
    }

    #[tokio::test]
    async fn browser_launch_failure_propagates() {
        let crawler = crawler("https://www.realestate.com.au", false);

        let err = crawler
            .crawl(request("Carlton"), CancellationToken::new())
            .collect()
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Browser(_)));
    }
}
