// src/compare.rs

use crate::receipt_db::{Receipt, Supplier};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One item name with the lowest price seen per supplier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub name: String,
    /// supplier id -> minimum unit price
    pub prices: BTreeMap<String, f64>,
}

impl ComparisonRow {
    pub fn cheapest(&self) -> Option<f64> {
        self.prices.values().copied().reduce(f64::min)
    }

    pub fn is_cheapest(&self, supplier_id: &str) -> bool {
        match (self.prices.get(supplier_id), self.cheapest()) {
            (Some(price), Some(min)) => *price == min,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonTable {
    pub suppliers: Vec<Supplier>,
    pub rows: Vec<ComparisonRow>,
}

/// Group every stored item by name and keep each supplier's minimum price.
/// Items without a supplier still get a row.
pub fn build_table(receipts: &[Receipt], suppliers: &[Supplier]) -> ComparisonTable {
    let mut rows: HashMap<String, ComparisonRow> = HashMap::new();

    for item in receipts.iter().flat_map(|r| &r.items) {
        let key = item.name.trim();
        if key.is_empty() {
            continue;
        }
        let row = rows
            .entry(key.to_string())
            .or_insert_with(|| ComparisonRow {
                name: key.to_string(),
                prices: BTreeMap::new(),
            });
        if let Some(supplier_id) = &item.supplier_id {
            row.prices
                .entry(supplier_id.clone())
                .and_modify(|p| *p = p.min(item.price))
                .or_insert(item.price);
        }
    }

    let mut rows: Vec<ComparisonRow> = rows.into_values().collect();
    rows.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });

    ComparisonTable {
        suppliers: suppliers.to_vec(),
        rows,
    }
}

/// Format an amount the way Indonesian receipts print it: `Rp 1.234,5`.
pub fn format_rupiah(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();

    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let fraction = cents % 100;
    if fraction == 0 {
        format!("Rp {sign}{grouped}")
    } else {
        let fraction = format!("{fraction:02}");
        format!("Rp {sign}{grouped},{}", fraction.trim_end_matches('0'))
    }
}

/// Plain-text rendering; the cheapest price in each row is marked with `*`.
pub fn render_table(table: &ComparisonTable) -> String {
    if table.rows.is_empty() {
        return "No data to compare yet. Upload receipts and assign a supplier to each item.\n"
            .to_string();
    }

    let mut grid: Vec<Vec<String>> = Vec::with_capacity(table.rows.len() + 1);
    grid.push(
        std::iter::once("Item".to_string())
            .chain(table.suppliers.iter().map(|s| s.name.clone()))
            .collect(),
    );
    for row in &table.rows {
        let mut cells = vec![row.name.clone()];
        for supplier in &table.suppliers {
            let cell = match row.prices.get(&supplier.id) {
                Some(price) if row.is_cheapest(&supplier.id) => format!("{} *", format_rupiah(*price)),
                Some(price) => format_rupiah(*price),
                None => "-".to_string(),
            };
            cells.push(cell);
        }
        grid.push(cells);
    }

    let columns = grid[0].len();
    let widths: Vec<usize> = (0..columns)
        .map(|c| grid.iter().map(|r| r[c].chars().count()).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for (i, cells) in grid.iter().enumerate() {
        let line: Vec<String> = cells
            .iter()
            .zip(widths.iter().copied())
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
        if i == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            out.push_str(&rule.join("  "));
            out.push('\n');
        }
    }
    out
}
