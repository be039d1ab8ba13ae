use crate::error::AppError;
use crate::heuristics::{ParsedItem, new_id};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::info;

pub struct ReceiptStore {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub title: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub image_name: Option<String>,
    pub image_digest: Option<String>,
    pub items: Vec<ParsedItem>,
}

impl Receipt {
    pub fn total_qty(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.qty)).sum()
    }

    pub fn total_price(&self) -> f64 {
        self.items.iter().map(ParsedItem::line_total).sum()
    }
}

#[derive(Debug)]
pub struct NewReceipt {
    pub title: String,
    pub date: String,
    pub image_name: Option<String>,
    pub image_data: Option<Vec<u8>>,
    pub items: Vec<ParsedItem>,
}

/// Partial update of a stored item. `supplier_id: Some(None)` clears the supplier.
#[derive(Debug, Default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub qty: Option<u32>,
    pub price: Option<f64>,
    pub supplier_id: Option<Option<String>>,
}

const ITEM_COLUMNS: &str = "id, name, qty, price, supplier_id";
const RECEIPT_COLUMNS: &str = "id, title, date, image_name, image_digest";

impl ReceiptStore {
    /// Open (or create) the receipt database.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS suppliers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS receipts (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                date TEXT NOT NULL,
                image_name TEXT,
                image_data BLOB,
                image_digest TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS receipt_items (
                id TEXT PRIMARY KEY,
                receipt_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                qty INTEGER NOT NULL,
                price REAL NOT NULL,
                supplier_id TEXT,
                FOREIGN KEY (receipt_id) REFERENCES receipts(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_receipt ON receipt_items(receipt_id, position)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_supplier ON receipt_items(supplier_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_receipts_digest ON receipts(image_digest)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Content fingerprint of an uploaded image.
    pub fn image_digest(image: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image);
        format!("{:x}", hasher.finalize())
    }

    // -----------------------------------------------------------------------
    // Suppliers
    // -----------------------------------------------------------------------

    pub fn add_supplier(&self, name: &str) -> Result<String, AppError> {
        let name = non_empty(name, "supplier name")?;
        let id = new_id();
        self.conn.execute(
            "INSERT INTO suppliers (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
        info!(id = %id, name = %name, "Supplier added");
        Ok(id)
    }

    pub fn list_suppliers(&self) -> SqliteResult<Vec<Supplier>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM suppliers ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(Supplier {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        rows.collect()
    }

    pub fn get_supplier(&self, id: &str) -> SqliteResult<Option<Supplier>> {
        self.conn
            .query_row(
                "SELECT id, name FROM suppliers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Supplier {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
    }

    pub fn rename_supplier(&self, id: &str, name: &str) -> Result<(), AppError> {
        let name = non_empty(name, "supplier name")?;
        let changed = self.conn.execute(
            "UPDATE suppliers SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        if changed == 0 {
            return Err(AppError::not_found("supplier", id));
        }
        info!(id = %id, name = %name, "Supplier renamed");
        Ok(())
    }

    /// Delete a supplier and detach it from every stored item.
    pub fn remove_supplier(&self, id: &str) -> Result<(), AppError> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute("DELETE FROM suppliers WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(AppError::not_found("supplier", id));
        }
        let detached = tx.execute(
            "UPDATE receipt_items SET supplier_id = NULL WHERE supplier_id = ?1",
            params![id],
        )?;
        tx.commit()?;
        info!(id = %id, detached_items = detached, "Supplier removed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Receipts
    // -----------------------------------------------------------------------

    pub fn add_receipt(&self, receipt: &NewReceipt) -> Result<String, AppError> {
        for item in &receipt.items {
            self.validate_item(item)?;
        }
        let id = new_id();
        let digest = receipt.image_data.as_deref().map(Self::image_digest);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO receipts (id, title, date, image_name, image_data, image_digest)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                receipt.title,
                receipt.date,
                receipt.image_name,
                receipt.image_data,
                digest,
            ],
        )?;
        for (position, item) in receipt.items.iter().enumerate() {
            insert_item(&tx, &id, position, item)?;
        }
        tx.commit()?;

        info!(id = %id, title = %receipt.title, items = receipt.items.len(), "Receipt stored");
        Ok(id)
    }

    pub fn list_receipts(&self) -> SqliteResult<Vec<Receipt>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts ORDER BY rowid"
        ))?;
        let headers = stmt
            .query_map([], Self::row_to_receipt)?
            .collect::<SqliteResult<Vec<_>>>()?;

        headers
            .into_iter()
            .map(|mut receipt| {
                receipt.items = self.items_for(&receipt.id)?;
                Ok(receipt)
            })
            .collect()
    }

    pub fn get_receipt(&self, id: &str) -> SqliteResult<Option<Receipt>> {
        let receipt = self
            .conn
            .query_row(
                &format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?1"),
                params![id],
                Self::row_to_receipt,
            )
            .optional()?;

        match receipt {
            Some(mut receipt) => {
                receipt.items = self.items_for(&receipt.id)?;
                Ok(Some(receipt))
            }
            None => Ok(None),
        }
    }

    /// First receipt whose image has this SHA-256 digest.
    pub fn find_receipt_by_digest(&self, digest: &str) -> SqliteResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT id FROM receipts WHERE image_digest = ?1 ORDER BY rowid LIMIT 1",
                params![digest],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn update_receipt(
        &self,
        id: &str,
        title: Option<&str>,
        date: Option<&str>,
    ) -> Result<(), AppError> {
        let title = title.map(|t| non_empty(t, "title")).transpose()?;
        let date = date.map(parse_date).transpose()?;

        let changed = self.conn.execute(
            "UPDATE receipts SET title = COALESCE(?1, title), date = COALESCE(?2, date) WHERE id = ?3",
            params![title, date, id],
        )?;
        if changed == 0 {
            return Err(AppError::not_found("receipt", id));
        }
        info!(id = %id, "Receipt updated");
        Ok(())
    }

    pub fn remove_receipt(&self, id: &str) -> Result<(), AppError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM receipt_items WHERE receipt_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM receipts WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(AppError::not_found("receipt", id));
        }
        tx.commit()?;
        info!(id = %id, "Receipt removed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    /// Append an item to an existing receipt.
    pub fn add_item(&self, receipt_id: &str, item: &ParsedItem) -> Result<(), AppError> {
        self.validate_item(item)?;
        let exists: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM receipts WHERE id = ?1",
            params![receipt_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(AppError::not_found("receipt", receipt_id));
        }
        let next: usize = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM receipt_items WHERE receipt_id = ?1",
            params![receipt_id],
            |row| row.get(0),
        )?;
        insert_item(&self.conn, receipt_id, next, item)?;
        info!(receipt = %receipt_id, item = %item.id, name = %item.name, "Item added");
        Ok(())
    }

    pub fn update_item(&self, item_id: &str, patch: &ItemPatch) -> Result<ParsedItem, AppError> {
        let mut item = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM receipt_items WHERE id = ?1"),
                params![item_id],
                Self::row_to_item,
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("item", item_id))?;

        if let Some(name) = &patch.name {
            item.name = name.trim().to_string();
        }
        if let Some(qty) = patch.qty {
            item.qty = qty;
        }
        if let Some(price) = patch.price {
            item.price = price;
        }
        if let Some(supplier_id) = &patch.supplier_id {
            item.supplier_id = supplier_id.clone();
        }
        self.validate_item(&item)?;

        self.conn.execute(
            "UPDATE receipt_items SET name = ?1, qty = ?2, price = ?3, supplier_id = ?4 WHERE id = ?5",
            params![item.name, item.qty, item.price, item.supplier_id, item.id],
        )?;
        info!(item = %item.id, name = %item.name, qty = item.qty, price = item.price, "Item updated");
        Ok(item)
    }

    pub fn remove_item(&self, item_id: &str) -> Result<(), AppError> {
        let removed = self
            .conn
            .execute("DELETE FROM receipt_items WHERE id = ?1", params![item_id])?;
        if removed == 0 {
            return Err(AppError::not_found("item", item_id));
        }
        info!(item = %item_id, "Item removed");
        Ok(())
    }

    fn items_for(&self, receipt_id: &str) -> SqliteResult<Vec<ParsedItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM receipt_items WHERE receipt_id = ?1 ORDER BY position"
        ))?;
        let rows = stmt.query_map(params![receipt_id], Self::row_to_item)?;
        rows.collect()
    }

    /// Manual edits must keep a usable name, a positive quantity and a
    /// non-negative price, and may only point at known suppliers.
    fn validate_item(&self, item: &ParsedItem) -> Result<(), AppError> {
        if item.name.trim().is_empty() {
            return Err(AppError::InvalidInput("item name must not be empty".into()));
        }
        if item.qty == 0 {
            return Err(AppError::InvalidInput("quantity must be at least 1".into()));
        }
        if !item.price.is_finite() || item.price < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "price must be a non-negative number, got {}",
                item.price
            )));
        }
        if let Some(supplier_id) = &item.supplier_id {
            if self.get_supplier(supplier_id)?.is_none() {
                return Err(AppError::not_found("supplier", supplier_id.as_str()));
            }
        }
        Ok(())
    }

    /// Helper: map a row with the item projection to `ParsedItem`.
    fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParsedItem> {
        Ok(ParsedItem {
            id: row.get(0)?,
            name: row.get(1)?,
            qty: row.get(2)?,
            price: row.get(3)?,
            supplier_id: row.get(4)?,
        })
    }

    fn row_to_receipt(row: &rusqlite::Row<'_>) -> rusqlite::Result<Receipt> {
        Ok(Receipt {
            id: row.get(0)?,
            title: row.get(1)?,
            date: row.get(2)?,
            image_name: row.get(3)?,
            image_digest: row.get(4)?,
            items: Vec::new(),
        })
    }

    /// Get counts of suppliers, receipts and items
    pub fn get_counts(&self) -> SqliteResult<(usize, usize, usize)> {
        let suppliers: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM suppliers", [], |row| row.get(0))?;

        let receipts: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))?;

        let items: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM receipt_items", [], |row| row.get(0))?;

        Ok((suppliers, receipts, items))
    }
}

fn insert_item(
    conn: &Connection,
    receipt_id: &str,
    position: usize,
    item: &ParsedItem,
) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO receipt_items (id, receipt_id, position, name, qty, price, supplier_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.id,
            receipt_id,
            position,
            item.name.trim(),
            item.qty,
            item.price,
            item.supplier_id,
        ],
    )?;
    Ok(())
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(trimmed)
}

/// Validate a `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Result<String, AppError> {
    let format = format_description!("[year]-[month]-[day]");
    let date = time::Date::parse(raw.trim(), format)
        .map_err(|e| AppError::InvalidInput(format!("invalid date {raw:?}: {e}")))?;
    Ok(date.to_string())
}

/// Today's date in UTC as `YYYY-MM-DD`.
pub fn today() -> String {
    OffsetDateTime::now_utc().date().to_string()
}
