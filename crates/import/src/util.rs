use rust_decimal::Decimal;
use std::str::FromStr;

/// Lowercases and drops everything but ASCII letters and digits, so
/// "Date/Time", "date time" and "DATE_TIME" all compare equal.
pub fn normalize_header(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parses a report amount into a decimal.
///
/// Thousands separators, currency symbols and whitespace are ignored and
/// `(12.50)` reads as negative. Returns `None` when nothing numeric remains.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && !is_currency_symbol(*c))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let dec = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -dec } else { dec })
}

fn is_currency_symbol(c: char) -> bool {
    matches!(c, '$' | '£' | '€' | '¥' | '₹' | '¢')
}

/// Collapses runs of whitespace to single hyphens and upper-cases.
pub fn normalize_sku(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_uppercase()
}
