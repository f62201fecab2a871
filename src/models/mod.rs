use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod request;

pub use request::{CrawlRequest, QueryParameters};

/// Coarse availability state of a listing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleStatus {
    #[default]
    Unknown,
    Active,
    UnderOffer,
    Sold,
    Withdrawn,
}

/// Where a listing came from and how it is addressed
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingIdentity {
    pub source_site: String,
    pub source_listing_id: String,
    pub canonical_url: String,
}

impl ListingIdentity {
    /// Build an identity whose listing id is derived from the canonical URL.
    pub fn from_url(source_site: &str, canonical_url: &str) -> Self {
        Self {
            source_site: source_site.to_string(),
            source_listing_id: listing_id_from_url(canonical_url),
            canonical_url: canonical_url.to_string(),
        }
    }
}

/// Derive the site's listing id: the digit run of the last path segment,
/// else the raw segment, else the whole URL when it does not parse.
pub fn listing_id_from_url(listing_url: &str) -> String {
    let Ok(parsed) = url::Url::parse(listing_url) else {
        return listing_url.to_string();
    };

    let last_segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");
    if last_segment.is_empty() {
        return listing_url.to_string();
    }

    let digits: String = last_segment.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        last_segment.to_string()
    } else {
        digits
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lifecycle_status: LifecycleStatus,
}

impl StatusMetadata {
    /// A listing observed for the first time at `now`.
    pub fn seen_at(now: DateTime<Utc>) -> Self {
        Self {
            first_seen_at: Some(now),
            last_seen_at: Some(now),
            lifecycle_status: LifecycleStatus::Active,
        }
    }
}

/// Address text plus whatever structured parts extraction could fill in
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddressDetails {
    #[serde(default)]
    pub full_address_raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoreAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_size_sqm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land_size_sqm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parking_spaces: Option<u32>,
}

/// Price guide as shown on the page, plus parsed bounds and outgoings (AUD)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PricingInformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_guide_raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min_aud: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_max_aud: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strata_levies_quarter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub council_rates_quarter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_rates_quarter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbn_tech: Option<String>,
}

/// One scraped listing. Built once at scrape time and never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub identity: ListingIdentity,
    #[serde(default)]
    pub status: StatusMetadata,
    #[serde(default)]
    pub address: AddressDetails,
    #[serde(default)]
    pub attributes: CoreAttributes,
    #[serde(default)]
    pub pricing: PricingInformation,
    /// Extension fields not modelled above (page URL, scrape time, ...)
    #[serde(
        default,
        skip_serializing_if = "raw_attributes::is_blank",
        serialize_with = "raw_attributes::serialize"
    )]
    pub raw_attributes: BTreeMap<String, Option<String>>,
}

mod raw_attributes {
    use serde::Serializer;
    use std::collections::BTreeMap;

    pub fn is_blank(map: &BTreeMap<String, Option<String>>) -> bool {
        map.values().all(Option::is_none)
    }

    // Entries without a value are dropped rather than written as null.
    pub fn serialize<S>(map: &BTreeMap<String, Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(
            map.iter()
                .filter_map(|(key, value)| value.as_ref().map(|value| (key, value))),
        )
    }
}
