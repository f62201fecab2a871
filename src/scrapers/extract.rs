//! Selector table for listing detail pages and the interpreter that applies it.
//!
//! Selectors live here as data so a site redesign means editing one table.

use crate::browser::Page;
use anyhow::Result;
use std::collections::HashMap;

/// Anchor of each result card on a search page.
pub const LISTING_CARD_LINK: &str = "a[data-testid='listing-card-link']";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailField {
    Address,
    PriceGuide,
    PropertyType,
    Bedrooms,
    Bathrooms,
    ParkingSpaces,
}

/// Post-processing applied to an element's inner text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Trimmed text; blank counts as missing
    Text,
    /// Digits of the text read as a number, e.g. "3 Beds" -> 3
    DigitCount,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: DetailField,
    pub selector: &'static str,
    pub rule: Rule,
}

pub const LISTING_DETAIL_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        field: DetailField::Address,
        selector: "[data-testid='listing-details__address']",
        rule: Rule::Text,
    },
    FieldSpec {
        field: DetailField::PriceGuide,
        selector: "[data-testid='listing-details__price']",
        rule: Rule::Text,
    },
    FieldSpec {
        field: DetailField::PropertyType,
        selector: "[data-testid='listing-summary-property-type']",
        rule: Rule::Text,
    },
    FieldSpec {
        field: DetailField::Bedrooms,
        selector: "[data-testid='general-features__beds']",
        rule: Rule::DigitCount,
    },
    FieldSpec {
        field: DetailField::Bathrooms,
        selector: "[data-testid='general-features__baths']",
        rule: Rule::DigitCount,
    },
    FieldSpec {
        field: DetailField::ParkingSpaces,
        selector: "[data-testid='general-features__cars']",
        rule: Rule::DigitCount,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Count(u32),
}

/// Values found on one page. Fields whose element was missing are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    values: HashMap<DetailField, FieldValue>,
}

impl ExtractedFields {
    pub fn text(&self, field: DetailField) -> Option<String> {
        match self.values.get(&field) {
            Some(FieldValue::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn count(&self, field: DetailField) -> Option<u32> {
        match self.values.get(&field) {
            Some(FieldValue::Count(count)) => Some(*count),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Apply `table` to `page`. A missing element leaves its field unset; a
/// failing DOM call aborts the whole extraction.
pub fn extract_fields(page: &dyn Page, table: &[FieldSpec]) -> Result<ExtractedFields> {
    let mut extracted = ExtractedFields::default();

    for spec in table {
        let Some(text) = inner_text(page, spec.selector)? else {
            continue;
        };

        let value = match spec.rule {
            Rule::Text => Some(FieldValue::Text(text)),
            Rule::DigitCount => digit_count(&text).map(FieldValue::Count),
        };
        if let Some(value) = value {
            extracted.values.insert(spec.field, value);
        }
    }

    Ok(extracted)
}

fn inner_text(page: &dyn Page, selector: &str) -> Result<Option<String>> {
    let Some(element) = page.query_selector(selector)? else {
        return Ok(None);
    };

    let text = element.inner_text()?;
    let trimmed = text.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

/// Keep only the digits of `text` and parse them.
pub fn digit_count(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
