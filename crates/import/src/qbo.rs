//! Normalizers for QuickBooks Online API payloads.
//!
//! QBO returns PascalCase entities either bare, as arrays, or wrapped in a
//! `QueryResponse` envelope. These functions accept any of those shapes and
//! produce the crate's plain types.

use chrono::NaiveDate;
use costbook_core::{index_accounts, Account, AccountId, AccountsById};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected payload shape: expected {0}")]
    UnexpectedShape(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillLine {
    pub id: Option<String>,
    /// `None` when QBO sent no `Amount`.
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub account_id: Option<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: String,
    pub txn_date: NaiveDate,
    pub doc_number: Option<String>,
    /// QBO `PrivateNote`; carries the `PO: <number>` reference.
    pub memo: Option<String>,
    pub vendor_name: Option<String>,
    pub lines: Vec<BillLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyPreferences {
    pub home_currency: String,
    pub multi_currency_enabled: bool,
}

impl Default for CompanyPreferences {
    fn default() -> Self {
        Self {
            home_currency: "USD".to_string(),
            multi_currency_enabled: false,
        }
    }
}

// ── Wire shapes ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RefValue {
    value: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAccount {
    id: String,
    name: String,
    fully_qualified_name: Option<String>,
    account_type: Option<String>,
    account_sub_type: Option<String>,
    parent_ref: Option<RefValue>,
    active: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAccountDetail {
    account_ref: Option<RefValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawBillLine {
    id: Option<String>,
    amount: Option<Decimal>,
    description: Option<String>,
    account_based_expense_line_detail: Option<RawAccountDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawBill {
    id: String,
    txn_date: NaiveDate,
    doc_number: Option<String>,
    private_note: Option<String>,
    vendor_ref: Option<RefValue>,
    #[serde(default)]
    line: Vec<RawBillLine>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct RawCurrencyPrefs {
    home_currency: Option<RefValue>,
    multi_currency_enabled: Option<bool>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct RawPreferences {
    currency_prefs: Option<RawCurrencyPrefs>,
}

// ── Public normalizers ────────────────────────────────────────────────────────

/// Pulls the list of `entity` records out of a bare array, a `{entity: [...]}`
/// object or a `{"QueryResponse": {entity: [...]}}` envelope.
fn entity_list(value: Value, entity: &str) -> Result<Vec<Value>, NormalizeError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            if let Some(response) = map.remove("QueryResponse") {
                return match response {
                    Value::Object(mut inner) => match inner.remove(entity) {
                        Some(Value::Array(items)) => Ok(items),
                        Some(_) => Err(NormalizeError::UnexpectedShape(format!(
                            "QueryResponse.{entity} to be an array"
                        ))),
                        // QBO omits the key entirely when a query matches nothing.
                        None => Ok(Vec::new()),
                    },
                    _ => Err(NormalizeError::UnexpectedShape(
                        "QueryResponse to be an object".to_string(),
                    )),
                };
            }
            match map.remove(entity) {
                Some(Value::Array(items)) => Ok(items),
                Some(single @ Value::Object(_)) => Ok(vec![single]),
                _ => Err(NormalizeError::UnexpectedShape(format!(
                    "an array of {entity} records"
                ))),
            }
        }
        _ => Err(NormalizeError::UnexpectedShape(format!(
            "an array of {entity} records"
        ))),
    }
}

pub fn normalize_accounts(payload: &str) -> Result<AccountsById, NormalizeError> {
    let value: Value = serde_json::from_str(payload)?;
    let accounts = entity_list(value, "Account")?
        .into_iter()
        .map(|item| {
            let raw: RawAccount = serde_json::from_value(item)?;
            Ok(Account {
                fully_qualified_name: raw.fully_qualified_name.unwrap_or_else(|| raw.name.clone()),
                id: AccountId(raw.id),
                name: raw.name,
                account_type: raw.account_type.unwrap_or_default(),
                account_sub_type: raw.account_sub_type,
                parent_id: raw.parent_ref.and_then(|r| r.value).map(AccountId),
                active: raw.active.unwrap_or(true),
            })
        })
        .collect::<Result<Vec<_>, NormalizeError>>()?;
    Ok(index_accounts(accounts))
}

pub fn normalize_bills(payload: &str) -> Result<Vec<Bill>, NormalizeError> {
    let value: Value = serde_json::from_str(payload)?;
    entity_list(value, "Bill")?
        .into_iter()
        .map(|item| {
            let raw: RawBill = serde_json::from_value(item)?;
            Ok(Bill {
                id: raw.id,
                txn_date: raw.txn_date,
                doc_number: raw.doc_number,
                memo: raw.private_note,
                vendor_name: raw.vendor_ref.and_then(|r| r.name),
                lines: raw
                    .line
                    .into_iter()
                    .map(|l| BillLine {
                        id: l.id,
                        amount: l.amount,
                        description: l.description,
                        account_id: l
                            .account_based_expense_line_detail
                            .and_then(|d| d.account_ref)
                            .and_then(|r| r.value)
                            .map(AccountId),
                    })
                    .collect(),
            })
        })
        .collect()
}

pub fn normalize_preferences(payload: &str) -> Result<CompanyPreferences, NormalizeError> {
    let value = match serde_json::from_str::<Value>(payload)? {
        Value::Object(mut map) => match map.remove("Preferences") {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    };
    let raw: RawPreferences = serde_json::from_value(value)?;
    let currency = raw.currency_prefs.unwrap_or_default();
    let defaults = CompanyPreferences::default();
    Ok(CompanyPreferences {
        home_currency: currency
            .home_currency
            .and_then(|r| r.value)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.home_currency),
        multi_currency_enabled: currency
            .multi_currency_enabled
            .unwrap_or(defaults.multi_currency_enabled),
    })
}
