use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::normalize_sku;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// "<sku words> [x|×] <digits> [unit|units]" anchored at the end of the text.
re!(re_sku_quantity,
    r"(?i)^(?P<sku>.*?\S)(?:\s+[x×]\s*|\s*×\s*|\s+)(?P<qty>\d+)(?:\s*units?)?\s*$");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuQuantity {
    pub sku: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuParseError {
    #[error("Description '{0}' does not end with '<SKU> <quantity> [units]'")]
    NoMatch(String),
    #[error("Description '{0}' has no usable quantity")]
    InvalidQuantity(String),
}

/// Reads a trailing SKU and unit count out of a bill line description.
///
/// The SKU is whitespace-normalized to hyphens and upper-cased; a stray `x`
/// or `×` before the quantity is tolerated.
pub fn parse_sku_quantity(description: &str) -> Result<SkuQuantity, SkuParseError> {
    let text = description.trim();
    let caps = re_sku_quantity()
        .captures(text)
        .ok_or_else(|| SkuParseError::NoMatch(description.to_string()))?;

    let sku = normalize_sku(&caps["sku"]);
    if sku.is_empty() || sku == "X" || sku == "×" {
        return Err(SkuParseError::NoMatch(description.to_string()));
    }

    let quantity = caps["qty"]
        .parse::<i64>()
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| SkuParseError::InvalidQuantity(description.to_string()))?;

    Ok(SkuQuantity { sku, quantity })
}
