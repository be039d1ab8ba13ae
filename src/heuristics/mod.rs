// src/heuristics/mod.rs

mod noise;
mod receipt;

pub use noise::{DEFAULT_KEYWORDS, DEFAULT_PATTERNS, NoiseFilter};
pub use receipt::parse_price;

use serde::Deserialize;
use serde::Serialize;

/// A single receipt line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedItem {
    pub id: String,
    pub name: String,
    pub qty: u32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
}

impl ParsedItem {
    /// Fresh item with a new unique id and no supplier.
    pub fn new(name: impl Into<String>, qty: u32, price: f64) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            qty,
            price,
            supplier_id: None,
        }
    }

    pub fn line_total(&self) -> f64 {
        f64::from(self.qty) * self.price
    }
}

/// Generate a fresh opaque identifier for an item, receipt or supplier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Extract line items from raw OCR text using the default noise vocabulary.
pub fn parse_items(text: &str) -> Vec<ParsedItem> {
    receipt::extract(text, NoiseFilter::shared_default())
}

/// Extract line items from raw OCR text with a caller-supplied noise filter.
pub fn parse_items_with(text: &str, filter: &NoiseFilter) -> Vec<ParsedItem> {
    receipt::extract(text, filter)
}
