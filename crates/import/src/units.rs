//! PO unit weights and the allocation pass that spreads PO-level costs over SKUs.
//!
//! Allocation is two-phase: build the unit table from every manufacturing event
//! first, then allocate cost events against the finished table. Nothing here
//! depends on the order events arrive in.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use costbook_core::{allocate_by_weight, Allocation, AllocationError, Component, InventoryEvent, Weight};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocateError {
    #[error("No manufacturing units recorded for PO {po_number}")]
    MissingUnits { po_number: String },
    #[error(transparent)]
    UnitOverflow(#[from] UnitOverflow),
    #[error("Allocation failed for PO {po_number}: {source}")]
    Allocation {
        po_number: String,
        source: AllocationError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Units for SKU {sku} on PO {po_number} overflow")]
pub struct UnitOverflow {
    pub po_number: String,
    pub sku: String,
}

/// PO number → SKU → units. Accumulates; never decrements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoUnitWeights(BTreeMap<String, BTreeMap<String, i64>>);

impl PoUnitWeights {
    /// Phase one: unit table from all manufacturing events.
    pub fn build<'a>(
        events: impl IntoIterator<Item = &'a InventoryEvent>,
    ) -> Result<Self, AllocateError> {
        let mut weights = Self::default();
        for event in events {
            if let InventoryEvent::Manufacturing(e) = event {
                weights.record(&e.po_number, &e.sku, e.units)?;
            }
        }
        Ok(weights)
    }

    /// Adds units for a SKU on a PO, e.g. from units recorded at bill creation.
    /// Fails without changing the table when the sum leaves `i64`.
    pub fn record(&mut self, po_number: &str, sku: &str, units: i64) -> Result<(), UnitOverflow> {
        let entry = self
            .0
            .entry(po_number.to_string())
            .or_default()
            .entry(sku.to_string())
            .or_insert(0);
        *entry = entry
            .checked_add(units)
            .ok_or_else(|| UnitOverflow {
                po_number: po_number.to_string(),
                sku: sku.to_string(),
            })?;
        Ok(())
    }

    /// Folds another table into this one.
    pub fn merge(&mut self, other: &PoUnitWeights) -> Result<(), UnitOverflow> {
        for (po, skus) in &other.0 {
            for (sku, units) in skus {
                self.record(po, sku, *units)?;
            }
        }
        Ok(())
    }

    pub fn units(&self, po_number: &str, sku: &str) -> Option<i64> {
        self.0.get(po_number).and_then(|skus| skus.get(sku)).copied()
    }

    pub fn for_po(&self, po_number: &str) -> Option<&BTreeMap<String, i64>> {
        self.0.get(po_number)
    }

    pub fn purchase_orders(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Splits a PO-level cost over the PO's SKUs in proportion to their units.
pub fn allocate_po_cost_across_skus(
    total_cents: i64,
    po_number: &str,
    weights: &PoUnitWeights,
) -> Result<Allocation<String>, AllocateError> {
    let skus = weights
        .for_po(po_number)
        .filter(|skus| skus.values().any(|u| *u > 0))
        .ok_or_else(|| AllocateError::MissingUnits {
            po_number: po_number.to_string(),
        })?;

    allocate_by_weight(
        total_cents,
        skus.iter().map(|(sku, units)| Weight::new(sku.clone(), *units)),
    )
    .map_err(|source| AllocateError::Allocation {
        po_number: po_number.to_string(),
        source,
    })
}

/// One event's cost, resolved to SKUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedCost {
    pub date: NaiveDate,
    pub po_number: String,
    pub bill_id: String,
    pub component: Component,
    pub total_cents: i64,
    pub by_sku: BTreeMap<String, i64>,
}

/// Phase two: resolve every event against a finished unit table.
///
/// Manufacturing events already name their SKU and pass through unchanged;
/// cost and brand cost events are spread over the PO's SKUs.
pub fn allocate_cost_events(
    events: &[InventoryEvent],
    weights: &PoUnitWeights,
) -> Result<Vec<AllocatedCost>, AllocateError> {
    events
        .iter()
        .map(|event| {
            let by_sku = match event {
                InventoryEvent::Manufacturing(e) => BTreeMap::from([(e.sku.clone(), e.cost_cents)]),
                InventoryEvent::Cost(_) | InventoryEvent::BrandCost(_) => {
                    allocate_po_cost_across_skus(event.cost_cents(), event.po_number(), weights)?
                        .into_map()
                }
            };
            Ok(AllocatedCost {
                date: event.date(),
                po_number: event.po_number().to_string(),
                bill_id: event.bill_id().to_string(),
                component: event.component(),
                total_cents: event.cost_cents(),
                by_sku,
            })
        })
        .collect()
}

/// Sums allocated costs per PO, SKU and component.
pub fn landed_cost_by_sku(
    allocated: &[AllocatedCost],
) -> BTreeMap<(String, String), BTreeMap<Component, i64>> {
    let mut totals: BTreeMap<(String, String), BTreeMap<Component, i64>> = BTreeMap::new();
    for cost in allocated {
        for (sku, cents) in &cost.by_sku {
            *totals
                .entry((cost.po_number.clone(), sku.clone()))
                .or_default()
                .entry(cost.component)
                .or_insert(0) += cents;
        }
    }
    totals
}
