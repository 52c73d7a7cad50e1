use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use costbook_core::{allocate_by_weight, remove_proportional_components, Component, InventoryEvent, Weight};
use costbook_import::import::allocate_qbo_payloads;
use costbook_import::{
    allocate_cost_events, build_inventory_events_from_mappings, landed_cost_by_sku,
    parse_amazon_unified_transaction_csv, summarize_by_settlement, AllocatedCost, AmazonTransactionRow,
    BillMapping, Classifier, PoUnitWeights, SettlementSummary,
};
use costbook_settlement::{AuditRowRecord, AutopostReport, Autoposter, SettlementEntry, SettlementProcessor};
use costbook_storage::{insert_audit_rows, insert_settlement, DbPool, SqliteSettlementStore};
use serde::Serialize;

use crate::processors::{DryRunProcessor, OutboxProcessor};

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[derive(Debug, Serialize)]
pub struct CsvReport {
    pub row_count: usize,
    pub settlements: Vec<SettlementSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<AmazonTransactionRow>>,
}

pub fn csv_report(path: &Path, include_rows: bool) -> Result<CsvReport> {
    let content = read(path)?;
    let rows = parse_amazon_unified_transaction_csv(&content)
        .with_context(|| format!("in {}", path.display()))?;
    tracing::info!(rows = rows.len(), "parsed settlement report");
    Ok(CsvReport {
        row_count: rows.len(),
        settlements: summarize_by_settlement(&rows),
        rows: include_rows.then_some(rows),
    })
}

#[derive(Debug, Serialize)]
pub struct LandedCost {
    pub po_number: String,
    pub sku: String,
    pub components: BTreeMap<Component, i64>,
    pub total_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct BillsReport {
    pub events: Vec<InventoryEvent>,
    pub po_units: PoUnitWeights,
    pub allocations: Vec<AllocatedCost>,
    pub landed_costs: Vec<LandedCost>,
}

/// Bills (plus any recorded mappings) to events, allocations and per-SKU landed cost.
pub fn bills_report(
    bills: &Path,
    accounts: &Path,
    mappings: Option<&Path>,
    classifier: &Classifier,
) -> Result<BillsReport> {
    let (mut parsed, mut allocations) =
        allocate_qbo_payloads(&read(bills)?, &read(accounts)?, classifier)?;

    if let Some(path) = mappings {
        let mappings: Vec<BillMapping> = serde_json::from_str(&read(path)?)
            .with_context(|| format!("invalid bill mappings in {}", path.display()))?;
        let brand_events = build_inventory_events_from_mappings(&mappings)?;
        allocations.extend(allocate_cost_events(&brand_events, &parsed.po_units)?);
        parsed.events.extend(brand_events);
    }

    let landed_costs = landed_cost_by_sku(&allocations)
        .into_iter()
        .map(|((po_number, sku), components)| LandedCost {
            total_cents: components.values().sum(),
            po_number,
            sku,
            components,
        })
        .collect();

    Ok(BillsReport {
        events: parsed.events,
        po_units: parsed.po_units,
        allocations,
        landed_costs,
    })
}

/// Parses `KEY=VALUE` pairs, keeping their order.
pub fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, i64)>> {
    pairs
        .iter()
        .map(|pair| {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("expected KEY=VALUE, got '{pair}'");
            };
            let value = value
                .trim()
                .parse::<i64>()
                .with_context(|| format!("'{value}' is not an integer in '{pair}'"))?;
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

pub fn allocate(total_cents: i64, weights: &[String]) -> Result<Vec<(String, i64)>> {
    let weights = parse_pairs(weights)?;
    let allocation = allocate_by_weight(total_cents, weights.into_iter().map(|(k, w)| Weight::new(k, w)))?;
    Ok(allocation.into_vec())
}

pub fn remove(units: i64, on_hand: i64, values: &[String]) -> Result<BTreeMap<String, i64>> {
    let values: BTreeMap<String, i64> = parse_pairs(values)?.into_iter().collect();
    Ok(remove_proportional_components(&values, units, on_hand)?)
}

/// Loads settlements and audit rows from JSON arrays into the database.
pub async fn load(pool: &DbPool, settlements: Option<&Path>, audit_rows: Option<&Path>) -> Result<(usize, usize)> {
    let mut loaded = (0, 0);
    if let Some(path) = settlements {
        let entries: Vec<SettlementEntry> = serde_json::from_str(&read(path)?)
            .with_context(|| format!("invalid settlements in {}", path.display()))?;
        for entry in &entries {
            insert_settlement(pool, entry).await?;
        }
        loaded.0 = entries.len();
    }
    if let Some(path) = audit_rows {
        let rows: Vec<AuditRowRecord> = serde_json::from_str(&read(path)?)
            .with_context(|| format!("invalid audit rows in {}", path.display()))?;
        insert_audit_rows(pool, &rows).await?;
        loaded.1 = rows.len();
    }
    tracing::info!(settlements = loaded.0, audit_rows = loaded.1, "loaded records");
    Ok(loaded)
}

/// Without an outbox nothing is posted or recorded.
pub async fn autopost(pool: DbPool, outbox: Option<&Path>) -> Result<AutopostReport> {
    let store = SqliteSettlementStore::new(pool);
    let report = match outbox {
        Some(dir) => run_autopost(store, OutboxProcessor::new(dir.to_path_buf()), true).await?,
        None => run_autopost(store, DryRunProcessor, false).await?,
    };
    Ok(report)
}

async fn run_autopost<P: SettlementProcessor>(
    store: SqliteSettlementStore,
    processor: P,
    record: bool,
) -> Result<AutopostReport> {
    let report = Autoposter::new(store, processor)
        .record_outcomes(record)
        .run()
        .await
        .context("failed to list unprocessed settlements")?;
    Ok(report)
}
