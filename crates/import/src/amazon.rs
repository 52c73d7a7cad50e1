//! Amazon "unified transaction" (date range) report parser.

use std::collections::HashMap;

use costbook_core::to_cents;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{normalize_header, parse_decimal};

/// Normalized names that must all appear on the real header row.
const REQUIRED_HEADERS: [&str; 4] = ["datetime", "settlementid", "type", "total"];

/// Amazon's "no value" placeholder.
const NO_VALUE: &str = "--";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmazonTransactionRow {
    pub date_time: String,
    pub settlement_id: String,
    pub transaction_type: String,
    pub order_id: String,
    pub sku: String,
    pub description: String,
    pub quantity: i64,
    pub marketplace: String,
    pub account_type: String,
    pub fulfillment: String,
    pub order_city: String,
    pub order_state: String,
    pub order_postal: String,
    pub tax_collection_model: String,
    pub product_sales: i64,
    pub product_sales_tax: i64,
    pub shipping_credits: i64,
    pub shipping_credits_tax: i64,
    pub gift_wrap_credits: i64,
    pub giftwrap_credits_tax: i64,
    pub regulatory_fee: i64,
    pub tax_on_regulatory_fee: i64,
    pub promotional_rebates: i64,
    pub promotional_rebates_tax: i64,
    pub marketplace_withheld_tax: i64,
    pub selling_fees: i64,
    pub fba_fees: i64,
    pub other_transaction_fees: i64,
    pub other: i64,
    pub total: i64,
}

#[derive(Error, Debug)]
pub enum AmazonCsvError {
    #[error("CSV must contain a header row and at least one data row")]
    TooFewLines,
    #[error("Could not find a header row with date/time, settlement id, type and total columns")]
    HeaderNotFound,
    #[error("Row {row}: missing required value for '{column}'")]
    MissingValue { row: u64, column: &'static str },
    #[error("Row {row}: invalid number '{value}' in column '{column}'")]
    InvalidNumber {
        row: u64,
        column: &'static str,
        value: String,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Per-settlement rollup of parsed rows, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub settlement_id: String,
    pub first_date_time: String,
    pub row_count: usize,
    pub total_cents: i64,
}

struct Columns(HashMap<String, usize>);

impl Columns {
    fn from_header(record: &csv::StringRecord) -> Self {
        let mut map = HashMap::new();
        for (idx, field) in record.iter().enumerate() {
            // First occurrence wins if a report repeats a column.
            map.entry(normalize_header(field)).or_insert(idx);
        }
        Columns(map)
    }

    fn has_required(&self) -> bool {
        REQUIRED_HEADERS.iter().all(|h| self.0.contains_key(*h))
    }
}

struct RowReader<'a> {
    record: &'a csv::StringRecord,
    columns: &'a Columns,
    row: u64,
}

impl RowReader<'_> {
    fn raw(&self, column: &str) -> Option<&str> {
        self.columns
            .0
            .get(column)
            .and_then(|idx| self.record.get(*idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn text(&self, column: &str) -> String {
        self.raw(column).unwrap_or_default().to_string()
    }

    fn required_text(&self, column: &'static str) -> Result<String, AmazonCsvError> {
        self.raw(column)
            .map(str::to_string)
            .ok_or(AmazonCsvError::MissingValue { row: self.row, column })
    }

    fn cents(&self, column: &'static str) -> Result<i64, AmazonCsvError> {
        match self.raw(column) {
            None | Some(NO_VALUE) => Ok(0),
            Some(value) => self.parse_cents(column, value),
        }
    }

    fn required_cents(&self, column: &'static str) -> Result<i64, AmazonCsvError> {
        match self.raw(column) {
            None => Err(AmazonCsvError::MissingValue { row: self.row, column }),
            Some(NO_VALUE) => Ok(0),
            Some(value) => self.parse_cents(column, value),
        }
    }

    fn parse_cents(&self, column: &'static str, value: &str) -> Result<i64, AmazonCsvError> {
        parse_decimal(value)
            .and_then(|d| to_cents(d).ok())
            .ok_or_else(|| AmazonCsvError::InvalidNumber {
                row: self.row,
                column,
                value: value.to_string(),
            })
    }

    fn quantity(&self) -> Result<i64, AmazonCsvError> {
        match self.raw("quantity") {
            None | Some(NO_VALUE) => Ok(0),
            Some(value) => value
                .replace(',', "")
                .parse::<i64>()
                .map_err(|_| AmazonCsvError::InvalidNumber {
                    row: self.row,
                    column: "quantity",
                    value: value.to_string(),
                }),
        }
    }
}

/// Parses the report body, skipping any preamble before the header row.
pub fn parse_amazon_unified_transaction_csv(
    content: &str,
) -> Result<Vec<AmazonTransactionRow>, AmazonCsvError> {
    let content = content.trim_start_matches('\u{feff}');
    if content.lines().filter(|l| !l.trim().is_empty()).count() < 2 {
        return Err(AmazonCsvError::TooFewLines);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let mut columns = None;
    for result in records.by_ref() {
        let record = result?;
        let candidate = Columns::from_header(&record);
        if candidate.has_required() {
            columns = Some(candidate);
            break;
        }
    }
    let columns = columns.ok_or(AmazonCsvError::HeaderNotFound)?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in records {
        let record = result?;
        let row = record.position().map(|p| p.line()).unwrap_or_default();
        let reader = RowReader {
            record: &record,
            columns: &columns,
            row,
        };

        // Blank settlement ids mark separator and footer rows.
        let Some(settlement_id) = reader.raw("settlementid").map(str::to_string) else {
            skipped += 1;
            continue;
        };

        rows.push(AmazonTransactionRow {
            date_time: reader.text("datetime"),
            settlement_id,
            transaction_type: reader.required_text("type")?,
            order_id: reader.text("orderid"),
            sku: reader.text("sku"),
            description: reader.text("description"),
            quantity: reader.quantity()?,
            marketplace: reader.text("marketplace"),
            account_type: reader.text("accounttype"),
            fulfillment: reader.text("fulfillment"),
            order_city: reader.text("ordercity"),
            order_state: reader.text("orderstate"),
            order_postal: reader.text("orderpostal"),
            tax_collection_model: reader.text("taxcollectionmodel"),
            product_sales: reader.cents("productsales")?,
            product_sales_tax: reader.cents("productsalestax")?,
            shipping_credits: reader.cents("shippingcredits")?,
            shipping_credits_tax: reader.cents("shippingcreditstax")?,
            gift_wrap_credits: reader.cents("giftwrapcredits")?,
            giftwrap_credits_tax: reader.cents("giftwrapcreditstax")?,
            regulatory_fee: reader.cents("regulatoryfee")?,
            tax_on_regulatory_fee: reader.cents("taxonregulatoryfee")?,
            promotional_rebates: reader.cents("promotionalrebates")?,
            promotional_rebates_tax: reader.cents("promotionalrebatestax")?,
            marketplace_withheld_tax: reader.cents("marketplacewithheldtax")?,
            selling_fees: reader.cents("sellingfees")?,
            fba_fees: reader.cents("fbafees")?,
            other_transaction_fees: reader.cents("othertransactionfees")?,
            other: reader.cents("other")?,
            total: reader.required_cents("total")?,
        });
    }

    tracing::debug!(rows = rows.len(), skipped, "parsed amazon transaction report");
    Ok(rows)
}

/// Groups rows by settlement id, keeping the order settlements first appear in.
/// Totals saturate at the `i64` bounds.
pub fn summarize_by_settlement(rows: &[AmazonTransactionRow]) -> Vec<SettlementSummary> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut summaries: Vec<SettlementSummary> = Vec::new();
    for row in rows {
        let idx = *index.entry(row.settlement_id.as_str()).or_insert_with(|| {
            summaries.push(SettlementSummary {
                settlement_id: row.settlement_id.clone(),
                first_date_time: row.date_time.clone(),
                row_count: 0,
                total_cents: 0,
            });
            summaries.len() - 1
        });
        summaries[idx].row_count += 1;
        summaries[idx].total_cents = summaries[idx].total_cents.saturating_add(row.total);
    }
    summaries
}
