use super::{NoiseFilter, ParsedItem};
use regex::Regex;
use std::sync::LazyLock;

// Every pattern below is a fixed literal.
static QTY_X_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*[xX]\s*([\d.,]+)").expect("qty x price pattern"));
static QTY_NAME_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(.+?)\s+([\d.,]+)$").expect("qty name price pattern"));
static NAME_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+([\d.,]+)$").expect("name price pattern"));
static NAME_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-•*|,]+").expect("name punctuation pattern"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Walk the receipt lines once and emit items in the order they appear.
pub fn extract(text: &str, filter: &NoiseFilter) -> Vec<ParsedItem> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_matches(|c: char| c.is_whitespace() || c == BYTE_ORDER_MARK))
        .filter(|l| !l.is_empty())
        .collect();
    let noise: Vec<bool> = lines.iter().map(|l| filter.is_noise(l)).collect();

    let mut items = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if noise[i] {
            tracing::trace!(line = lines[i], "Skipping noise line");
            i += 1;
            continue;
        }
        let line = lines[i];

        // Names often wrap onto their own line with "2x14000" below them.
        let next = lines.get(i + 1).filter(|_| !noise[i + 1]);
        if let Some(item) = next.and_then(|next| match_name_then_qty_price(line, next)) {
            items.push(item);
            i += 2;
            continue;
        }

        if let Some(item) = match_qty_name_price(line).or_else(|| match_name_price(line)) {
            items.push(item);
        }
        i += 1;
    }

    items
}

// ---------------------------------------------------------------------------
// Line patterns
// ---------------------------------------------------------------------------

fn match_name_then_qty_price(name_line: &str, next: &str) -> Option<ParsedItem> {
    let cap = QTY_X_PRICE.captures(next)?;
    build_item(name_line, parse_qty(&cap[1]), parse_price(&cap[2]))
}

fn match_qty_name_price(line: &str) -> Option<ParsedItem> {
    let cap = QTY_NAME_PRICE.captures(line)?;
    build_item(&cap[2], parse_qty(&cap[1]), parse_price(&cap[3]))
}

fn match_name_price(line: &str) -> Option<ParsedItem> {
    let cap = NAME_PRICE.captures(line)?;
    build_item(&cap[1], 1, parse_price(&cap[2]))
}

fn build_item(raw_name: &str, qty: u32, price: f64) -> Option<ParsedItem> {
    if qty == 0 || price <= 0.0 {
        return None;
    }
    let name = clean_name(raw_name);
    if name.chars().count() <= 1 {
        return None;
    }
    Some(ParsedItem::new(name, qty, price))
}

fn clean_name(raw: &str) -> String {
    let spaced = NAME_PUNCTUATION.replace_all(raw, " ");
    WHITESPACE_RUN.replace_all(&spaced, " ").trim().to_string()
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

fn parse_qty(raw: &str) -> u32 {
    raw.parse().unwrap_or(0)
}

/// Parse a locale-ambiguous amount. `.` groups thousands when present,
/// otherwise a comma followed by exactly two digits is the decimal point.
/// Anything unparseable is `0`.
pub fn parse_price(raw: &str) -> f64 {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let normalized = if kept.contains('.') {
        kept.replace('.', "").replace(',', ".")
    } else if let Some(pos) = kept.rfind(',') {
        let fraction = &kept[pos + 1..];
        if fraction.len() == 2 {
            format!("{}.{}", kept[..pos].replace(',', ""), fraction)
        } else {
            kept.replace(',', "")
        }
    } else {
        kept
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<ParsedItem> {
        extract(text, &NoiseFilter::default())
    }

    fn triples(items: &[ParsedItem]) -> Vec<(&str, u32, f64)> {
        items
            .iter()
            .map(|i| (i.name.as_str(), i.qty, i.price))
            .collect()
    }

    #[test]
    fn test_parse_price_formats() {
        assert_eq!(parse_price("10.500"), 10500.0);
        assert_eq!(parse_price("10,50"), 10.5);
        assert_eq!(parse_price("1.234,56"), 1234.56);
        assert_eq!(parse_price("14000"), 14000.0);
        assert_eq!(parse_price("14,000"), 14000.0);
        assert_eq!(parse_price("1,234,567"), 1234567.0);
        assert_eq!(parse_price("1,234,56"), 1234.56);
        assert_eq!(parse_price("Rp18.000,-"), 18000.0);
        assert_eq!(parse_price("abc"), 0.0);
        assert_eq!(parse_price(""), 0.0);
        assert_eq!(parse_price("1.2,3,4"), 0.0);
    }

    #[test]
    fn test_name_then_qty_price() {
        let items = parse("Gula 1kg\n2x14000");
        assert_eq!(triples(&items), vec![("Gula 1kg", 2, 14000.0)]);
        assert_eq!(items[0].supplier_id, None);
    }

    #[test]
    fn test_byte_order_mark_is_trimmed() {
        let items = parse("\u{feff}Gula 1kg\n2x14000");
        assert_eq!(triples(&items), vec![("Gula 1kg", 2, 14000.0)]);

        let items = parse("\u{feff}\nKopi Sachet 2.500\u{feff}");
        assert_eq!(triples(&items), vec![("Kopi Sachet", 1, 2500.0)]);
    }

    #[test]
    fn test_qty_x_price_variants() {
        let items = parse("Teh Botol\n3 X 4.500\nRoti Tawar\r\n1x12.000 12.000");
        assert_eq!(
            triples(&items),
            vec![("Teh Botol", 3, 4500.0), ("Roti Tawar", 1, 12000.0)]
        );
    }

    #[test]
    fn test_total_line_is_noise() {
        assert!(parse("Total: 50000").is_empty());
        assert!(parse("Subtotal 12.000").is_empty());
        assert!(parse("TOTAL: 50000\nCASH 100.000\nKEMBALI 50.000").is_empty());
    }

    #[test]
    fn test_qty_name_price() {
        let items = parse("3 Minyak Goreng 18000");
        assert_eq!(triples(&items), vec![("Minyak Goreng", 3, 18000.0)]);
    }

    #[test]
    fn test_name_price_defaults_qty() {
        let items = parse("Kopi Sachet 2.500");
        assert_eq!(triples(&items), vec![("Kopi Sachet", 1, 2500.0)]);
    }

    #[test]
    fn test_blank_lines_between_items() {
        let items = parse("\n\nKopi Sachet 2.500\n\n   \n3 Minyak Goreng 18000\n\n\nGula 1kg\n\n2x14000\n");
        assert_eq!(
            triples(&items),
            vec![
                ("Kopi Sachet", 1, 2500.0),
                ("Minyak Goreng", 3, 18000.0),
                ("Gula 1kg", 2, 14000.0),
            ]
        );
    }

    #[test]
    fn test_noise_line_not_consumed_by_pair() {
        // The qty line mentions "TOTAL", so the name above it stays unpaired.
        let items = parse("Gula 1kg\nTOTAL 2x14000\nKopi Sachet 2.500");
        assert_eq!(triples(&items), vec![("Kopi Sachet", 1, 2500.0)]);

        let items = parse("Teh Celup 7.000\nSubtotal 12.000");
        assert_eq!(triples(&items), vec![("Teh Celup", 1, 7000.0)]);
    }

    #[test]
    fn test_name_cleanup() {
        let items = parse("• Susu - UHT | 1L,, 6.500\n2 *Sabun*  Mandi, 3,500");
        assert_eq!(
            triples(&items),
            vec![("Susu UHT 1L", 1, 6500.0), ("Sabun Mandi", 2, 3500.0)]
        );
    }

    #[test]
    fn test_single_char_name_rejected() {
        assert!(parse("A 5000").is_empty());
        assert!(parse("- 5000").is_empty());
        assert!(parse("*\n2x5000").is_empty());
    }

    #[test]
    fn test_zero_price_and_qty_rejected() {
        assert!(parse("Kerupuk 0").is_empty());
        assert!(parse("Kerupuk\n2x0").is_empty());
        assert!(parse("Kerupuk\n0x5000").is_empty());
    }

    #[test]
    fn test_failed_pair_falls_back_to_single_line() {
        // The pair is rejected on price, the name line is tried on its own.
        let items = parse("Beras 5kg 65.000\n1x0");
        assert_eq!(triples(&items), vec![("Beras 5kg", 1, 65000.0)]);
    }

    #[test]
    fn test_zero_qty_falls_through_to_name_price() {
        let items = parse("0 Telur 2.000");
        assert_eq!(triples(&items), vec![("0 Telur", 1, 2000.0)]);
    }

    #[test]
    fn test_unmatched_lines_dropped() {
        assert!(parse("TOKO SEJAHTERA\nJl. Merdeka No. 5A\n-----").is_empty());
        assert!(parse("").is_empty());
        assert!(parse("\n\r\n   \n").is_empty());
    }

    #[test]
    fn test_full_receipt() {
        let text = "\
TOKO MAKMUR JAYA
Jl. Pasar Baru No. 12B
Date: 12/03/2024 10:15
ITEM QTY HARGA
Gula 1kg
2x14000
3 Minyak Goreng 18000
Kopi Sachet 2.500
Subtotal 74.500
PPN 11% 8.195
TOTAL 82.695
Tunai Rp 100.000
Kembali 17.305
Thank you";
        let items = parse(text);
        assert_eq!(
            triples(&items),
            vec![
                ("Gula 1kg", 2, 14000.0),
                ("Minyak Goreng", 3, 18000.0),
                ("Kopi Sachet", 1, 2500.0),
            ]
        );
    }

    #[test]
    fn test_items_keep_receipt_order() {
        let text = "Apel 10.000\nBelimbing\n2x8.000\n4 Ceri 30.000\nDurian 75.000";
        let names: Vec<String> = parse(text).into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["Apel", "Belimbing", "Ceri", "Durian"]);
    }

    #[test]
    fn test_deterministic_apart_from_ids() {
        let text = "Gula 1kg\n2x14000\nKopi Sachet 2.500\n3 Minyak Goreng 18000";
        let first = parse(text);
        let second = parse(text);
        assert_eq!(triples(&first), triples(&second));
        assert_ne!(first[0].id, second[0].id);
        assert_ne!(first[0].id, first[1].id);
    }

    #[test]
    fn test_emitted_items_are_valid() {
        let text = "x 1\n1 y 2\nab 0,00\n00 cd 5\n\u{2022}\u{2022} 3\nok item 1,5\n7 ef ,50\nzz\n9x,9";
        for item in parse(text) {
            assert!(item.qty >= 1);
            assert!(item.price > 0.0);
            assert!(item.name.trim().chars().count() > 1);
        }
    }
}
