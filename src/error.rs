use thiserror::Error;

/// Errors surfaced by the crawl pipeline
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The caller asked the run to stop. Never a fault.
    #[error("Crawl cancelled")]
    Cancelled,

    #[error("Browser error: {0:#}")]
    Browser(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Crawl worker failed: {0}")]
    Producer(String),
}

impl CrawlError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CrawlError::Cancelled)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;
