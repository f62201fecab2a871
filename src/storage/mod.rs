//! Persistence of completed suburb batches.

mod filename;
mod ndjson;

pub use filename::{dotnet_to_strftime, render_file_name, sanitize_file_name};
pub use ndjson::NdjsonListingRepository;

use crate::error::Result;
use crate::models::{CrawlRequest, Listing};
use async_trait::async_trait;
use std::path::PathBuf;

/// Stores one suburb's listings after its crawl has been fully drained.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Write `listings` for `request`. Returns the file written, or `None`
    /// when there was nothing to store.
    async fn store_batch(&self, request: &CrawlRequest, listings: &[Listing]) -> Result<Option<PathBuf>>;
}
