use crate::config::SuburbConfig;
use crate::models::{CrawlRequest, QueryParameters};

/// Turn a configured suburb into a crawl request.
///
/// Extra query parameters keep case-insensitive keys; when two keys differ
/// only by case the later one wins.
pub fn build_request(suburb: &SuburbConfig) -> CrawlRequest {
    let query_parameters: QueryParameters = suburb
        .extra_query_parameters
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();

    CrawlRequest {
        suburb_query: suburb.query.clone(),
        state: suburb.state.clone(),
        max_listings: suburb.max_listings,
        query_parameters,
    }
}

impl From<&SuburbConfig> for CrawlRequest {
    fn from(suburb: &SuburbConfig) -> Self {
        build_request(suburb)
    }
}
