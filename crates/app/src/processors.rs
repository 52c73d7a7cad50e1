use std::path::PathBuf;

use async_trait::async_trait;
use costbook_settlement::{LmbAuditRow, ProcessError, ProcessOutcome, SettlementEntry, SettlementProcessor};
use serde::Serialize;

/// Reports what would be posted and posts nothing.
pub struct DryRunProcessor;

#[async_trait]
impl SettlementProcessor for DryRunProcessor {
    async fn process_settlement(
        &self,
        settlement: &SettlementEntry,
        rows: &[LmbAuditRow],
    ) -> Result<ProcessOutcome, ProcessError> {
        let net: i64 = rows.iter().map(|r| r.net_cents).sum();
        Ok(ProcessOutcome::Blocked {
            reason: format!(
                "dry run: {} audit rows ready for {} (net {} cents)",
                rows.len(),
                settlement.settlement_id,
                net
            ),
        })
    }
}

#[derive(Serialize)]
struct OutboxEntry<'a> {
    settlement: &'a SettlementEntry,
    net_cents: i64,
    rows: &'a [LmbAuditRow],
}

/// Writes one JSON journal file per settlement for the ledger to pick up.
pub struct OutboxProcessor {
    dir: PathBuf,
}

impl OutboxProcessor {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

/// Ids become file names inside the outbox, so only plain names are allowed.
fn is_safe_file_stem(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[async_trait]
impl SettlementProcessor for OutboxProcessor {
    async fn process_settlement(
        &self,
        settlement: &SettlementEntry,
        rows: &[LmbAuditRow],
    ) -> Result<ProcessOutcome, ProcessError> {
        let failed = |message: String| ProcessError::Failed {
            settlement_id: settlement.settlement_id.clone(),
            message,
        };

        let entry = OutboxEntry {
            settlement,
            net_cents: rows.iter().map(|r| r.net_cents).sum(),
            rows,
        };
        let json = serde_json::to_vec_pretty(&entry).map_err(|e| failed(e.to_string()))?;

        if !is_safe_file_stem(&settlement.settlement_id) {
            return Err(failed(format!(
                "settlement id {:?} cannot be used as a journal file name",
                settlement.settlement_id
            )));
        }
        let journal_id = format!("settlement-{}", settlement.settlement_id);
        let path = self.dir.join(format!("{journal_id}.json"));
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| failed(format!("{}: {e}", path.display())))?;
        if exists {
            return Ok(ProcessOutcome::Blocked {
                reason: format!("journal {} already exists", path.display()),
            });
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| failed(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| failed(format!("{}: {e}", path.display())))?;

        Ok(ProcessOutcome::Posted {
            journal_entry_ids: vec![journal_id],
        })
    }
}
