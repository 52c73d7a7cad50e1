use std::collections::HashSet;

use costbook_core::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    AuditInvoice, LmbAuditRow, ProcessError, ProcessOutcome, SettlementEntry, SettlementProcessor,
    SettlementStore, StoreError,
};

pub const NO_MATCHING_AUDIT_DATA: &str = "no matching audit data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedSettlement {
    pub settlement_id: String,
    pub invoice_id: String,
    pub journal_entry_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSettlement {
    pub settlement_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSettlement {
    pub settlement_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutopostReport {
    pub processed: Vec<PostedSettlement>,
    pub skipped: Vec<SkippedSettlement>,
    pub errors: Vec<FailedSettlement>,
}

impl AutopostReport {
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.errors.len()
    }
}

#[derive(Error, Debug)]
enum AutopostError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(
        "invoice {invoice_id} was claimed by another settlement after posting; journal entries {ids} are not linked to it",
        ids = .journal_entry_ids.join(", ")
    )]
    LostClaim {
        invoice_id: String,
        journal_entry_ids: Vec<String>,
    },
}

enum Attempt {
    Posted(PostedSettlement),
    Skipped(String),
}

/// Posts every unprocessed settlement against its matching audit invoice.
///
/// Settlements are handled one at a time. A failure on one settlement is
/// recorded and the batch moves on.
pub struct Autoposter<S, P> {
    store: S,
    processor: P,
    record_outcomes: bool,
}

impl<S: SettlementStore, P: SettlementProcessor> Autoposter<S, P> {
    pub fn new(store: S, processor: P) -> Self {
        Self {
            store,
            processor,
            record_outcomes: true,
        }
    }

    /// When false, skips and errors are reported but not written to the store.
    pub fn record_outcomes(mut self, record: bool) -> Self {
        self.record_outcomes = record;
        self
    }

    pub async fn run(&self) -> Result<AutopostReport, StoreError> {
        let settlements = self.store.unprocessed_settlements().await?;
        tracing::info!(count = settlements.len(), "autoposting settlements");

        let mut report = AutopostReport::default();
        let mut claimed: HashSet<String> = HashSet::new();

        for settlement in &settlements {
            let id = settlement.settlement_id.clone();
            match self.attempt(settlement, &mut claimed).await {
                Ok(Attempt::Posted(posted)) => {
                    tracing::info!(
                        settlement_id = %id,
                        invoice_id = %posted.invoice_id,
                        total = %Money::from_cents(settlement.total_cents),
                        "settlement posted"
                    );
                    report.processed.push(posted);
                }
                Ok(Attempt::Skipped(reason)) => {
                    tracing::warn!(settlement_id = %id, %reason, "settlement skipped");
                    if self.record_outcomes {
                        if let Err(e) = self.store.record_skip(&id, &reason).await {
                            tracing::warn!(settlement_id = %id, "failed to record skip: {e}");
                        }
                    }
                    report.skipped.push(SkippedSettlement {
                        settlement_id: id,
                        reason,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!(settlement_id = %id, error = %message, "settlement failed");
                    if self.record_outcomes {
                        if let Err(e) = self.store.record_error(&id, &message).await {
                            tracing::warn!(settlement_id = %id, "failed to record error: {e}");
                        }
                    }
                    report.errors.push(FailedSettlement {
                        settlement_id: id,
                        message,
                    });
                }
            }
        }

        tracing::info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            "autopost finished"
        );
        Ok(report)
    }

    async fn attempt(
        &self,
        settlement: &SettlementEntry,
        claimed: &mut HashSet<String>,
    ) -> Result<Attempt, AutopostError> {
        let invoices = self.store.unconsumed_invoices(&settlement.marketplace).await?;
        let Some(invoice) = pick_invoice(settlement, &invoices, claimed) else {
            return Ok(Attempt::Skipped(NO_MATCHING_AUDIT_DATA.to_string()));
        };

        let rows: Vec<LmbAuditRow> = self
            .store
            .audit_rows(&invoice.invoice_id)
            .await?
            .iter()
            .map(LmbAuditRow::from)
            .collect();
        if rows.is_empty() {
            return Ok(Attempt::Skipped(format!(
                "invoice {} has no audit rows",
                invoice.invoice_id
            )));
        }
        tracing::debug!(
            settlement_id = %settlement.settlement_id,
            invoice_id = %invoice.invoice_id,
            rows = rows.len(),
            "processing settlement"
        );

        match self.processor.process_settlement(settlement, &rows).await? {
            ProcessOutcome::Posted { journal_entry_ids } => {
                claimed.insert(invoice.invoice_id.clone());
                if !self
                    .store
                    .claim_invoice(&settlement.settlement_id, &invoice.invoice_id)
                    .await?
                {
                    // The ledger already holds these entries; surface them.
                    return Err(AutopostError::LostClaim {
                        invoice_id: invoice.invoice_id.clone(),
                        journal_entry_ids,
                    });
                }
                Ok(Attempt::Posted(PostedSettlement {
                    settlement_id: settlement.settlement_id.clone(),
                    invoice_id: invoice.invoice_id.clone(),
                    journal_entry_ids,
                }))
            }
            ProcessOutcome::Blocked { reason } => Ok(Attempt::Skipped(reason)),
        }
    }
}

/// Earliest unclaimed invoice on the settlement's marketplace whose audit
/// dates fall inside the settlement period.
fn pick_invoice<'a>(
    settlement: &SettlementEntry,
    invoices: &'a [AuditInvoice],
    claimed: &HashSet<String>,
) -> Option<&'a AuditInvoice> {
    invoices
        .iter()
        .filter(|inv| inv.marketplace == settlement.marketplace)
        .filter(|inv| !claimed.contains(&inv.invoice_id))
        .filter(|inv| settlement.covers(inv.first_date, inv.last_date))
        .min_by(|a, b| {
            a.first_date
                .cmp(&b.first_date)
                .then_with(|| a.invoice_id.cmp(&b.invoice_id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditRowRecord;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn settlement(id: &str, market: &str, start: NaiveDate, end: NaiveDate) -> SettlementEntry {
        SettlementEntry {
            settlement_id: id.to_string(),
            marketplace: market.to_string(),
            period_start: start,
            period_end: end,
            total_cents: 10_000,
        }
    }

    fn invoice(id: &str, market: &str, first: NaiveDate, last: NaiveDate) -> AuditInvoice {
        AuditInvoice {
            invoice_id: id.to_string(),
            marketplace: market.to_string(),
            first_date: first,
            last_date: last,
        }
    }

    fn row(invoice_id: &str, market: &str, date: NaiveDate) -> AuditRowRecord {
        AuditRowRecord {
            invoice_id: invoice_id.to_string(),
            marketplace: market.to_string(),
            date,
            order_id: Some("111-222".to_string()),
            sku: Some("WIDGET-RED".to_string()),
            quantity: 1,
            description: "Amazon Sales".to_string(),
            net_cents: 1999,
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        settlements: Vec<SettlementEntry>,
        invoices: Vec<AuditInvoice>,
        rows: HashMap<String, Vec<AuditRowRecord>>,
        claims: Mutex<HashMap<String, String>>,
        skips: Mutex<Vec<(String, String)>>,
        errors: Mutex<Vec<(String, String)>>,
        fail_listing: bool,
    }

    #[async_trait]
    impl SettlementStore for MemoryStore {
        async fn unprocessed_settlements(&self) -> Result<Vec<SettlementEntry>, StoreError> {
            if self.fail_listing {
                return Err(StoreError::Corrupt("settlements table unreadable".to_string()));
            }
            Ok(self.settlements.clone())
        }

        async fn unconsumed_invoices(&self, marketplace: &str) -> Result<Vec<AuditInvoice>, StoreError> {
            let claims = self.claims.lock().unwrap();
            Ok(self
                .invoices
                .iter()
                .filter(|i| i.marketplace == marketplace && !claims.contains_key(&i.invoice_id))
                .cloned()
                .collect())
        }

        async fn audit_rows(&self, invoice_id: &str) -> Result<Vec<AuditRowRecord>, StoreError> {
            Ok(self.rows.get(invoice_id).cloned().unwrap_or_default())
        }

        async fn claim_invoice(&self, settlement_id: &str, invoice_id: &str) -> Result<bool, StoreError> {
            let mut claims = self.claims.lock().unwrap();
            if claims.contains_key(invoice_id) {
                return Ok(false);
            }
            claims.insert(invoice_id.to_string(), settlement_id.to_string());
            Ok(true)
        }

        async fn record_skip(&self, settlement_id: &str, reason: &str) -> Result<(), StoreError> {
            self.skips
                .lock()
                .unwrap()
                .push((settlement_id.to_string(), reason.to_string()));
            Ok(())
        }

        async fn record_error(&self, settlement_id: &str, message: &str) -> Result<(), StoreError> {
            self.errors
                .lock()
                .unwrap()
                .push((settlement_id.to_string(), message.to_string()));
            Ok(())
        }
    }

    /// Posts everything except the settlement ids it is told to block or fail.
    #[derive(Default)]
    struct ScriptedProcessor {
        block: Vec<String>,
        fail: Vec<String>,
        seen_rows: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl SettlementProcessor for ScriptedProcessor {
        async fn process_settlement(
            &self,
            settlement: &SettlementEntry,
            rows: &[LmbAuditRow],
        ) -> Result<ProcessOutcome, ProcessError> {
            self.seen_rows.lock().unwrap().push(rows.len());
            let id = &settlement.settlement_id;
            if self.fail.contains(id) {
                return Err(ProcessError::Failed {
                    settlement_id: id.clone(),
                    message: "ledger rejected entry".to_string(),
                });
            }
            if self.block.contains(id) {
                return Ok(ProcessOutcome::Blocked {
                    reason: "unmapped SKU WIDGET-RED".to_string(),
                });
            }
            Ok(ProcessOutcome::Posted {
                journal_entry_ids: vec![format!("JE-{id}")],
            })
        }
    }

    fn march_store() -> MemoryStore {
        MemoryStore {
            settlements: vec![settlement("S1", "amazon.com", date(3, 1), date(3, 14))],
            invoices: vec![
                invoice("INV-LATE", "amazon.com", date(3, 8), date(3, 12)),
                invoice("INV-EARLY", "amazon.com", date(3, 2), date(3, 10)),
                invoice("INV-OUTSIDE", "amazon.com", date(2, 20), date(3, 5)),
                invoice("INV-UK", "amazon.co.uk", date(3, 1), date(3, 2)),
            ],
            rows: HashMap::from([
                ("INV-EARLY".to_string(), vec![row("INV-EARLY", "amazon.com", date(3, 2)); 3]),
                ("INV-LATE".to_string(), vec![row("INV-LATE", "amazon.com", date(3, 8))]),
            ]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn posts_against_earliest_matching_invoice() {
        let processor = ScriptedProcessor::default();
        let poster = Autoposter::new(march_store(), processor);
        let report = poster.run().await.unwrap();

        assert_eq!(
            report.processed,
            vec![PostedSettlement {
                settlement_id: "S1".to_string(),
                invoice_id: "INV-EARLY".to_string(),
                journal_entry_ids: vec!["JE-S1".to_string()],
            }]
        );
        assert!(report.skipped.is_empty());
        assert_eq!(*poster.processor.seen_rows.lock().unwrap(), vec![3]);
        assert_eq!(
            poster.store.claims.lock().unwrap().get("INV-EARLY"),
            Some(&"S1".to_string())
        );
    }

    #[tokio::test]
    async fn no_candidate_invoice_is_a_skip() {
        let mut store = march_store();
        store.settlements = vec![settlement("S9", "amazon.de", date(3, 1), date(3, 14))];
        let poster = Autoposter::new(store, ScriptedProcessor::default());
        let report = poster.run().await.unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, NO_MATCHING_AUDIT_DATA);
        assert_eq!(poster.store.skips.lock().unwrap().len(), 1);
        assert!(poster.processor.seen_rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invoice_without_rows_is_a_skip() {
        let mut store = march_store();
        store.rows.clear();
        let poster = Autoposter::new(store, ScriptedProcessor::default());
        let report = poster.run().await.unwrap();
        assert!(report.skipped[0].reason.contains("INV-EARLY"));
        assert!(report.processed.is_empty());
    }

    #[tokio::test]
    async fn blocked_settlement_records_reason() {
        let processor = ScriptedProcessor {
            block: vec!["S1".to_string()],
            ..Default::default()
        };
        let poster = Autoposter::new(march_store(), processor);
        let report = poster.run().await.unwrap();

        assert_eq!(report.skipped[0].reason, "unmapped SKU WIDGET-RED");
        assert!(poster.store.claims.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn processor_error_does_not_abort_batch() {
        let mut store = march_store();
        store.settlements = vec![
            settlement("S1", "amazon.com", date(3, 1), date(3, 14)),
            settlement("S2", "amazon.com", date(3, 1), date(3, 14)),
        ];
        let processor = ScriptedProcessor {
            fail: vec!["S1".to_string()],
            ..Default::default()
        };
        let poster = Autoposter::new(store, processor);
        let report = poster.run().await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("ledger rejected entry"));
        // S1 failed before claiming, so S2 gets the earliest invoice.
        assert_eq!(report.processed[0].settlement_id, "S2");
        assert_eq!(report.processed[0].invoice_id, "INV-EARLY");
        assert_eq!(poster.store.errors.lock().unwrap().len(), 1);
        assert_eq!(report.total(), 2);
    }

    #[tokio::test]
    async fn invoice_is_consumed_once_per_run() {
        let mut store = march_store();
        store.settlements = vec![
            settlement("S1", "amazon.com", date(3, 1), date(3, 14)),
            settlement("S2", "amazon.com", date(3, 1), date(3, 14)),
            settlement("S3", "amazon.com", date(3, 1), date(3, 14)),
        ];
        let poster = Autoposter::new(store, ScriptedProcessor::default());
        let report = poster.run().await.unwrap();

        let invoices: Vec<&str> = report.processed.iter().map(|p| p.invoice_id.as_str()).collect();
        assert_eq!(invoices, vec!["INV-EARLY", "INV-LATE"]);
        assert_eq!(report.skipped[0].settlement_id, "S3");
        assert_eq!(report.skipped[0].reason, NO_MATCHING_AUDIT_DATA);
    }

    #[tokio::test]
    async fn lost_claim_after_posting_reports_journal_ids() {
        let store = march_store();
        store
            .claims
            .lock()
            .unwrap()
            .insert("INV-EARLY".to_string(), "S0".to_string());
        // Listing still offers INV-EARLY as if a concurrent run claimed it after the read.
        struct StaleStore(MemoryStore);

        #[async_trait]
        impl SettlementStore for StaleStore {
            async fn unprocessed_settlements(&self) -> Result<Vec<SettlementEntry>, StoreError> {
                self.0.unprocessed_settlements().await
            }
            async fn unconsumed_invoices(&self, _marketplace: &str) -> Result<Vec<AuditInvoice>, StoreError> {
                Ok(self.0.invoices.clone())
            }
            async fn audit_rows(&self, invoice_id: &str) -> Result<Vec<AuditRowRecord>, StoreError> {
                self.0.audit_rows(invoice_id).await
            }
            async fn claim_invoice(&self, settlement_id: &str, invoice_id: &str) -> Result<bool, StoreError> {
                self.0.claim_invoice(settlement_id, invoice_id).await
            }
            async fn record_skip(&self, settlement_id: &str, reason: &str) -> Result<(), StoreError> {
                self.0.record_skip(settlement_id, reason).await
            }
            async fn record_error(&self, settlement_id: &str, message: &str) -> Result<(), StoreError> {
                self.0.record_error(settlement_id, message).await
            }
        }

        let poster = Autoposter::new(StaleStore(store), ScriptedProcessor::default());
        let report = poster.run().await.unwrap();
        assert!(report.processed.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(*poster.processor.seen_rows.lock().unwrap(), vec![3]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].settlement_id, "S1");
        assert!(report.errors[0].message.contains("INV-EARLY"));
        assert!(report.errors[0].message.contains("JE-S1"));
        assert_eq!(poster.store.0.errors.lock().unwrap().len(), 1);
        assert_eq!(
            poster.store.0.claims.lock().unwrap().get("INV-EARLY"),
            Some(&"S0".to_string())
        );
    }

    #[tokio::test]
    async fn listing_failure_aborts_run() {
        let store = MemoryStore {
            fail_listing: true,
            ..Default::default()
        };
        let poster = Autoposter::new(store, ScriptedProcessor::default());
        assert!(matches!(poster.run().await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn outcomes_not_recorded_when_disabled() {
        let mut store = march_store();
        store.settlements = vec![settlement("S9", "amazon.de", date(3, 1), date(3, 14))];
        let poster = Autoposter::new(store, ScriptedProcessor::default()).record_outcomes(false);
        let report = poster.run().await.unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert!(poster.store.skips.lock().unwrap().is_empty());
    }
}
