use async_trait::async_trait;
use chrono::NaiveDate;
use costbook_settlement::{AuditInvoice, AuditRowRecord, SettlementEntry, SettlementStore, StoreError};

use crate::db::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| StoreError::Corrupt(format!("invalid date '{value}'")))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[derive(Debug, Clone)]
pub struct SqliteSettlementStore {
    pool: DbPool,
}

impl SqliteSettlementStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

pub async fn insert_settlement(pool: &DbPool, settlement: &SettlementEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR REPLACE INTO settlements (settlement_id, marketplace, period_start, period_end, total_cents) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&settlement.settlement_id)
    .bind(&settlement.marketplace)
    .bind(format_date(settlement.period_start))
    .bind(format_date(settlement.period_end))
    .bind(settlement.total_cents)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_audit_rows(pool: &DbPool, rows: &[AuditRowRecord]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(
            "INSERT INTO audit_rows (invoice_id, marketplace, date, order_id, sku, quantity, description, net_cents) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.invoice_id)
        .bind(&row.marketplace)
        .bind(format_date(row.date))
        .bind(&row.order_id)
        .bind(&row.sku)
        .bind(row.quantity)
        .bind(&row.description)
        .bind(row.net_cents)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[async_trait]
impl SettlementStore for SqliteSettlementStore {
    async fn unprocessed_settlements(&self) -> Result<Vec<SettlementEntry>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, String, i64)>(
            r#"
            SELECT settlement_id, marketplace, period_start, period_end, total_cents
            FROM settlements
            WHERE settlement_id NOT IN (SELECT settlement_id FROM settlement_processing)
            ORDER BY period_start, settlement_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|r| {
                Ok(SettlementEntry {
                    settlement_id: r.0,
                    marketplace: r.1,
                    period_start: parse_date(&r.2)?,
                    period_end: parse_date(&r.3)?,
                    total_cents: r.4,
                })
            })
            .collect()
    }

    async fn unconsumed_invoices(&self, marketplace: &str) -> Result<Vec<AuditInvoice>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, String)>(
            r#"
            SELECT invoice_id, marketplace, MIN(date), MAX(date)
            FROM audit_rows
            WHERE marketplace = ?
              AND invoice_id NOT IN (SELECT invoice_id FROM settlement_processing)
            GROUP BY invoice_id, marketplace
            ORDER BY MIN(date), invoice_id
            "#,
        )
        .bind(marketplace)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|r| {
                Ok(AuditInvoice {
                    invoice_id: r.0,
                    marketplace: r.1,
                    first_date: parse_date(&r.2)?,
                    last_date: parse_date(&r.3)?,
                })
            })
            .collect()
    }

    async fn audit_rows(&self, invoice_id: &str) -> Result<Vec<AuditRowRecord>, StoreError> {
        let rows = sqlx::query_as::<
            _,
            (String, String, String, Option<String>, Option<String>, i64, String, i64),
        >(
            r#"
            SELECT invoice_id, marketplace, date, order_id, sku, quantity, description, net_cents
            FROM audit_rows
            WHERE invoice_id = ?
            ORDER BY date, id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|r| {
                Ok(AuditRowRecord {
                    invoice_id: r.0,
                    marketplace: r.1,
                    date: parse_date(&r.2)?,
                    order_id: r.3,
                    sku: r.4,
                    quantity: r.5,
                    description: r.6,
                    net_cents: r.7,
                })
            })
            .collect()
    }

    async fn claim_invoice(&self, settlement_id: &str, invoice_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO settlement_processing (settlement_id, invoice_id) VALUES (?, ?)",
        )
        .bind(settlement_id)
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let claimed = result.rows_affected() == 1;
        if !claimed {
            tracing::debug!(settlement_id, invoice_id, "invoice claim lost");
        }
        Ok(claimed)
    }

    async fn record_skip(&self, settlement_id: &str, reason: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO settlement_skips (settlement_id, reason) VALUES (?, ?)")
            .bind(settlement_id)
            .bind(reason)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn record_error(&self, settlement_id: &str, message: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO settlement_errors (settlement_id, message) VALUES (?, ?)")
            .bind(settlement_id)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }
}
