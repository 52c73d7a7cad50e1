//! Settlement autopost orchestration.
//!
//! Marketplace settlements are matched to uploaded audit invoices and handed to
//! a [`SettlementProcessor`]. Persistence lives behind [`SettlementStore`] so the
//! orchestration can run against SQLite or an in-memory double.

pub mod autopost;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use autopost::{AutopostReport, Autoposter, FailedSettlement, PostedSettlement, SkippedSettlement};

/// A settlement journal entry that has not been posted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEntry {
    pub settlement_id: String,
    pub marketplace: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_cents: i64,
}

impl SettlementEntry {
    pub fn covers(&self, first: NaiveDate, last: NaiveDate) -> bool {
        first >= self.period_start && last <= self.period_end
    }
}

/// An uploaded audit file, summarized by the date span of its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInvoice {
    pub invoice_id: String,
    pub marketplace: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// One persisted audit row as the store keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRowRecord {
    pub invoice_id: String,
    pub marketplace: String,
    pub date: NaiveDate,
    pub order_id: Option<String>,
    pub sku: Option<String>,
    pub quantity: i64,
    pub description: String,
    pub net_cents: i64,
}

/// Audit row in the shape the settlement processor consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmbAuditRow {
    pub invoice: String,
    pub market: String,
    pub date: NaiveDate,
    pub order_id: String,
    pub sku: String,
    pub quantity: i64,
    pub description: String,
    pub net_cents: i64,
}

impl From<&AuditRowRecord> for LmbAuditRow {
    fn from(row: &AuditRowRecord) -> Self {
        Self {
            invoice: row.invoice_id.clone(),
            market: row.marketplace.clone(),
            date: row.date,
            order_id: row.order_id.clone().unwrap_or_default(),
            sku: row.sku.clone().unwrap_or_default(),
            quantity: row.quantity,
            description: row.description.clone(),
            net_cents: row.net_cents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Posted { journal_entry_ids: Vec<String> },
    /// The processor declined; not an error.
    Blocked { reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Settlement {settlement_id} failed: {message}")]
    Failed { settlement_id: String, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn unprocessed_settlements(&self) -> Result<Vec<SettlementEntry>, StoreError>;

    /// Invoices on `marketplace` not yet assigned to any settlement.
    async fn unconsumed_invoices(&self, marketplace: &str) -> Result<Vec<AuditInvoice>, StoreError>;

    async fn audit_rows(&self, invoice_id: &str) -> Result<Vec<AuditRowRecord>, StoreError>;

    /// Assigns `invoice_id` to `settlement_id`. Returns `false` when the invoice
    /// was already claimed; at most one claim per invoice ever succeeds.
    async fn claim_invoice(&self, settlement_id: &str, invoice_id: &str) -> Result<bool, StoreError>;

    async fn record_skip(&self, settlement_id: &str, reason: &str) -> Result<(), StoreError>;

    async fn record_error(&self, settlement_id: &str, message: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SettlementProcessor: Send + Sync {
    async fn process_settlement(
        &self,
        settlement: &SettlementEntry,
        rows: &[LmbAuditRow],
    ) -> Result<ProcessOutcome, ProcessError>;
}
