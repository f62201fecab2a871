use crate::clock::Clock;
use crate::config::StorageConfig;
use crate::error::Result;
use crate::models::{CrawlRequest, Listing};
use crate::storage::filename::render_file_name;
use crate::storage::ListingRepository;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// Writes each batch as newline-delimited JSON, one compact object per line.
///
/// Files are written in place and flushed once at the end; an interrupted
/// write can leave a truncated file.
pub struct NdjsonListingRepository {
    config: StorageConfig,
    clock: Arc<dyn Clock>,
}

impl NdjsonListingRepository {
    pub fn new(config: StorageConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Where a batch for `request` would be written right now.
    pub fn resolve_path(&self, request: &CrawlRequest) -> PathBuf {
        let file_name = render_file_name(&self.config.file_name_format, request, self.clock.now());
        Path::new(&self.config.output_directory).join(file_name)
    }
}

#[async_trait]
impl ListingRepository for NdjsonListingRepository {
    async fn store_batch(&self, request: &CrawlRequest, listings: &[Listing]) -> Result<Option<PathBuf>> {
        if listings.is_empty() {
            debug!(
                suburb = %request.suburb_query,
                "Skipping storage because no listings were provided"
            );
            return Ok(None);
        }

        fs::create_dir_all(&self.config.output_directory).await?;
        let path = self.resolve_path(request);
        info!("Writing {} listings to {}", listings.len(), path.display());

        let mut writer = BufWriter::new(File::create(&path).await?);
        for listing in listings {
            let mut line = serde_json::to_vec(listing)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
        }
        writer.flush().await?;

        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{CoreAttributes, ListingIdentity};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn repository(output_directory: &Path) -> NdjsonListingRepository {
        NdjsonListingRepository::new(
            StorageConfig {
                output_directory: output_directory.display().to_string(),
                ..StorageConfig::default()
            },
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 1).unwrap())),
        )
    }

    fn request(query: &str) -> CrawlRequest {
        CrawlRequest {
            suburb_query: query.to_string(),
            ..Default::default()
        }
    }

    fn listing(n: u32) -> Listing {
        Listing {
            identity: ListingIdentity::from_url(
                "realestate.com.au",
                &format!("https://www.realestate.com.au/property-{n}"),
            ),
            attributes: CoreAttributes {
                bedrooms: Some(n),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn writes_one_line_per_listing_in_order() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("nested/output");
        let repo = repository(&output);

        let path = repo
            .store_batch(&request("Bondi Beach"), &[listing(1), listing(2), listing(3)])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(path, output.join("Bondi_Beach_20240630235901.ndjson"));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(content.ends_with('\n'));

        for (i, line) in lines.iter().enumerate() {
            assert!(!line.contains("null"));
            assert!(!line.contains(": "));
            let parsed: Listing = serde_json::from_str(line).unwrap();
            assert_eq!(parsed, listing(i as u32 + 1));
        }
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("never-created");
        let repo = repository(&output);

        let written = repo.store_batch(&request("Carlton"), &[]).await.unwrap();

        assert!(written.is_none());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn same_name_overwrites_previous_file() {
        let dir = tempdir().unwrap();
        let repo = repository(dir.path());

        repo.store_batch(&request("Carlton"), &[listing(1), listing(2)])
            .await
            .unwrap();
        let path = repo
            .store_batch(&request("Carlton"), &[listing(3)])
            .await
            .unwrap()
            .unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
