//! Receipt OCR parsing, storage and supplier price comparison.

pub mod compare;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod ocr_client;
pub mod receipt_db;
pub mod upload;

pub use heuristics::{ParsedItem, parse_items, parse_items_with};
