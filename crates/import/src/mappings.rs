use chrono::NaiveDate;
use costbook_core::{BrandCostEvent, Component, InventoryEvent};
use serde::{Deserialize, Serialize};

use crate::bills::BillParseError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillMappingLine {
    pub component: Component,
    pub amount_cents: i64,
}

/// Component breakdown recorded when a bill was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillMapping {
    pub bill_id: String,
    pub po_number: String,
    pub brand_id: String,
    pub bill_date: NaiveDate,
    pub lines: Vec<BillMappingLine>,
}

/// Turns recorded bill mappings into `brand_cost` events, ordered by date.
///
/// Classification is skipped entirely; zero-cent lines produce no event.
pub fn build_inventory_events_from_mappings(
    mappings: &[BillMapping],
) -> Result<Vec<InventoryEvent>, BillParseError> {
    let mut events = Vec::new();
    for mapping in mappings {
        let po_number = mapping.po_number.trim();
        if po_number.is_empty() {
            return Err(BillParseError::MissingPoNumber {
                bill_id: mapping.bill_id.clone(),
            });
        }
        for line in mapping.lines.iter().filter(|l| l.amount_cents != 0) {
            events.push(InventoryEvent::BrandCost(BrandCostEvent {
                date: mapping.bill_date,
                po_number: po_number.to_string(),
                brand_id: mapping.brand_id.clone(),
                component: line.component,
                cost_cents: line.amount_cents,
                bill_id: mapping.bill_id.clone(),
            }));
        }
    }
    // Stable: same-day events keep mapping order.
    events.sort_by_key(|e| e.date());
    tracing::debug!(mappings = mappings.len(), events = events.len(), "built events from bill mappings");
    Ok(events)
}
