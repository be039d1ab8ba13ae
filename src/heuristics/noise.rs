use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Words that mark totals, tax, payment, headers and metadata lines.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "total", "subtotal", "ppn", "tax", "cash", "kembali", "change", "payment", "thank", "date",
    "time", "item", "qty", "harga", "disc",
];

/// A bare currency-prefixed amount such as `Rp 50.000`.
pub const DEFAULT_PATTERNS: &[&str] = &[r"rp\s*\d"];

static DEFAULT_FILTER: LazyLock<NoiseFilter> = LazyLock::new(NoiseFilter::default);

/// Case-insensitive classifier for lines that never describe an item.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    matcher: Option<Regex>,
}

impl NoiseFilter {
    /// Keywords are matched literally, patterns as regular expressions.
    /// Both match anywhere in the line.
    pub fn new<K, P>(keywords: K, patterns: P) -> Result<Self, regex::Error>
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let alternatives: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|k| regex::escape(&k))
            .chain(
                patterns
                    .into_iter()
                    .map(|p| p.as_ref().to_string())
                    .filter(|p| !p.trim().is_empty())
                    .map(|p| format!("(?:{p})")),
            )
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { matcher: None });
        }

        let matcher = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            matcher: Some(matcher),
        })
    }

    pub(crate) fn shared_default() -> &'static NoiseFilter {
        &DEFAULT_FILTER
    }

    pub fn is_noise(&self, line: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(line))
    }
}

impl Default for NoiseFilter {
    fn default() -> Self {
        // The built-in vocabulary is made of escaped literals and one fixed pattern.
        Self::new(DEFAULT_KEYWORDS, DEFAULT_PATTERNS).expect("default noise vocabulary compiles")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_vocabulary() {
        let filter = NoiseFilter::default();
        assert!(filter.is_noise("TOTAL: 50000"));
        assert!(filter.is_noise("Subtotal 12.000"));
        assert!(filter.is_noise("PPN 10%"));
        assert!(filter.is_noise("Kembali 2.000"));
        assert!(filter.is_noise("Terima kasih / Thank you"));
        assert!(filter.is_noise("Rp 25.000"));
        assert!(filter.is_noise("rp25000"));
        assert!(filter.is_noise("Discount 5%"));
        assert!(filter.is_noise("ITEM   QTY   HARGA"));

        assert!(!filter.is_noise("Gula 1kg"));
        assert!(!filter.is_noise("Kopi Sachet 2.500"));
        assert!(!filter.is_noise("3 Minyak Goreng 18000"));
        assert!(!filter.is_noise("2x14000"));
    }

    #[test]
    fn test_custom_vocabulary() {
        let filter = NoiseFilter::new(["Kasir", "a+b"], [r"^\*+$"]).unwrap();
        assert!(filter.is_noise("kasir: Budi"));
        // keywords are literals, not patterns
        assert!(filter.is_noise("promo a+b"));
        assert!(!filter.is_noise("promo aab"));
        assert!(filter.is_noise("*****"));
        assert!(!filter.is_noise("Total 5000"));
    }

    #[test]
    fn test_empty_vocabulary_matches_nothing() {
        let filter = NoiseFilter::new(Vec::<String>::new(), ["  "]).unwrap();
        assert!(!filter.is_noise("TOTAL 50000"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(NoiseFilter::new(["total"], ["(unclosed"]).is_err());
    }
}
