// src/upload.rs

use crate::error::AppError;
use crate::heuristics::{self, NoiseFilter, ParsedItem};
use crate::ocr_client::TextRecognizer;
use crate::receipt_db::{self, NewReceipt, ReceiptStore};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_TITLE: &str = "Untitled receipt";

#[derive(Debug, Default)]
pub struct UploadOptions {
    pub save: bool,
    pub title: Option<String>,
    /// `YYYY-MM-DD`; missing or invalid means today.
    pub date: Option<String>,
    /// Applied to every parsed item before saving.
    pub supplier_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub raw_text: String,
    pub items: Vec<ParsedItem>,
    pub ocr_error: Option<String>,
    pub duplicate_of: Option<String>,
    pub receipt_id: Option<String>,
}

/// Image file -> OCR -> line items, optionally stored as a new receipt.
///
/// An OCR failure is not fatal: the upload continues with empty text and
/// therefore no items. Nothing is ever invented to fill an empty result.
#[tracing::instrument(skip_all, fields(image = %image_path.display()))]
pub async fn upload(
    recognizer: &dyn TextRecognizer,
    filter: &NoiseFilter,
    db: &ReceiptStore,
    image_path: &Path,
    options: &UploadOptions,
) -> Result<UploadOutcome, AppError> {
    if let Some(supplier_id) = &options.supplier_id {
        if db.get_supplier(supplier_id)?.is_none() {
            return Err(AppError::not_found("supplier", supplier_id.as_str()));
        }
    }

    let image = std::fs::read(image_path)?;
    let file_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "receipt.jpg".to_string());

    let digest = ReceiptStore::image_digest(&image);
    let duplicate_of = db.find_receipt_by_digest(&digest)?;
    if let Some(existing) = &duplicate_of {
        warn!(receipt = %existing, "This image was already uploaded");
    }

    let (raw_text, ocr_error) = match recognizer.recognize(&file_name, image.clone()).await {
        Ok(text) => (text, None),
        Err(e) => {
            warn!(error = %e, "OCR failed, continuing with an empty item set");
            (String::new(), Some(e.to_string()))
        }
    };

    let mut items = heuristics::parse_items_with(&raw_text, filter);
    info!(chars = raw_text.len(), items = items.len(), "Parsed OCR text");

    if items.is_empty() {
        warn!("No items recognised; add them manually with `item add`");
    }
    if let Some(supplier_id) = &options.supplier_id {
        for item in &mut items {
            item.supplier_id = Some(supplier_id.clone());
        }
    }
    for (i, item) in items.iter().enumerate() {
        info!(idx = i, name = %item.name, qty = item.qty, price = item.price, "Line item");
    }

    let mut receipt_id = None;
    if options.save {
        if items.is_empty() {
            return Err(AppError::InvalidInput(
                "refusing to save a receipt without items".into(),
            ));
        }
        let receipt = NewReceipt {
            title: options
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            date: receipt_date(options.date.as_deref()),
            image_name: Some(file_name),
            image_data: Some(image),
            items: items.clone(),
        };
        receipt_id = Some(db.add_receipt(&receipt)?);
    }

    Ok(UploadOutcome {
        raw_text,
        items,
        ocr_error,
        duplicate_of,
        receipt_id,
    })
}

fn receipt_date(raw: Option<&str>) -> String {
    match raw.map(receipt_db::parse_date) {
        Some(Ok(date)) => date,
        Some(Err(e)) => {
            warn!(error = %e, "Invalid receipt date, using today");
            receipt_db::today()
        }
        None => receipt_db::today(),
    }
}
