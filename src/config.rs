//! Process configuration.
//!
//! Settings come from an optional TOML file, then `REA_CRAWLER_*` environment
//! variables, then CLI flags applied in `main`. Every key has a default, so an
//! empty file (or none at all) is a valid configuration.
//!
//! ```toml
//! [crawler]
//! delay-between-requests-ms = 1500
//!
//! [[crawler.suburbs]]
//! query = "Bondi Beach"
//! state = "NSW"
//! max-listings = 20
//!
//! [crawler.suburbs.extra-query-parameters]
//! maxBeds = "3"
//!
//! [browser]
//! engine = "chromium"
//! headless = true
//!
//! [storage]
//! output-directory = "output"
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "listing-scout.toml";

/// Prefix for environment overrides, e.g. `REA_CRAWLER_DRY_RUN=true`.
pub const ENV_PREFIX: &str = "REA_CRAWLER_";

pub const DEFAULT_BASE_URL: &str = "https://www.realestate.com.au";
pub const DEFAULT_FILE_NAME_FORMAT: &str = "{suburb}_{timestamp:yyyyMMddHHmmss}.ndjson";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AppConfig {
    pub crawler: CrawlerConfig,
    pub browser: BrowserConfig,
    pub storage: StorageConfig,
}

/// Crawl behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    pub base_url: String,
    pub suburbs: Vec<SuburbConfig>,
    /// Result pages to crawl per suburb. Only the first page is crawled today.
    pub listing_page_limit: u32,
    /// Pause between suburbs (milliseconds)
    pub delay_between_requests_ms: u64,
    /// Emit one synthetic listing per suburb without launching a browser
    pub dry_run: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            suburbs: Vec::new(),
            listing_page_limit: 1,
            delay_between_requests_ms: 1500,
            dry_run: false,
        }
    }
}

impl CrawlerConfig {
    pub fn delay_between_requests(&self) -> Duration {
        Duration::from_millis(self.delay_between_requests_ms)
    }
}

/// One configured location query
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SuburbConfig {
    pub query: String,
    pub state: Option<String>,
    pub max_listings: Option<usize>,
    pub extra_query_parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        };
        f.write_str(name)
    }
}

impl FromStr for BrowserEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserEngine::Chromium),
            "firefox" => Ok(BrowserEngine::Firefox),
            "webkit" => Ok(BrowserEngine::Webkit),
            other => Err(format!("unknown browser engine '{other}'")),
        }
    }
}

/// Browser launch settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserConfig {
    pub engine: BrowserEngine,
    pub headless: bool,
    /// Pause before every browser operation (milliseconds)
    pub slow_mo_ms: u64,
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::Chromium,
            headless: true,
            slow_mo_ms: 0,
            navigation_timeout_ms: 30_000,
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn slow_mo(&self) -> Duration {
        Duration::from_millis(self.slow_mo_ms)
    }
}

/// Output settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    pub output_directory: String,
    /// Supports `{suburb}`, `{state}`, `{timestamp}` and `{timestamp:<format>}`
    pub file_name_format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_directory: "output".to_string(),
            file_name_format: DEFAULT_FILE_NAME_FORMAT.to_string(),
        }
    }
}

impl AppConfig {
    /// Load the configuration file (explicit path, else [`DEFAULT_CONFIG_FILE`]
    /// if present, else defaults), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_toml_str(&std::fs::read_to_string(DEFAULT_CONFIG_FILE)?)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `REA_CRAWLER_*` overrides. Unrelated variables are ignored.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match key {
                "BASE_URL" => self.crawler.base_url = value,
                "DRY_RUN" => self.crawler.dry_run = parse_env(&name, &value)?,
                "DELAY_BETWEEN_REQUESTS_MS" => {
                    self.crawler.delay_between_requests_ms = parse_env(&name, &value)?
                }
                "LISTING_PAGE_LIMIT" => self.crawler.listing_page_limit = parse_env(&name, &value)?,
                "BROWSER" => self.browser.engine = parse_env(&name, &value)?,
                "HEADLESS" => self.browser.headless = parse_env(&name, &value)?,
                "SLOW_MO_MS" => self.browser.slow_mo_ms = parse_env(&name, &value)?,
                "NAVIGATION_TIMEOUT_MS" => {
                    self.browser.navigation_timeout_ms = parse_env(&name, &value)?
                }
                "OUTPUT_DIRECTORY" => self.storage.output_directory = value,
                "FILE_NAME_FORMAT" => self.storage.file_name_format = value,
                _ => tracing::debug!(variable = %name, "Ignoring unknown environment override"),
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = url::Url::parse(&self.crawler.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.crawler.base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                self.crawler.base_url
            )));
        }

        if let Some(index) = self
            .crawler
            .suburbs
            .iter()
            .position(|s| s.query.trim().is_empty())
        {
            return Err(ConfigError::Validation(format!(
                "suburb #{} has an empty query",
                index + 1
            )));
        }

        if self.crawler.listing_page_limit == 0 {
            return Err(ConfigError::Validation(
                "listing-page-limit must be at least 1".to_string(),
            ));
        }

        if self.browser.navigation_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "navigation-timeout-ms must be greater than 0".to_string(),
            ));
        }

        if self.storage.file_name_format.trim().is_empty() {
            return Err(ConfigError::Validation(
                "file-name-format must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Validation(format!("{name}={value}: {e}")))
}
