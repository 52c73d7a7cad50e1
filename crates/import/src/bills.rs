use costbook_core::{
    sort_events, to_cents, AccountId, AccountsById, AllocationError, CostEvent,
    InventoryEvent, ManufacturingEvent,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::{Classifier, ClassifyError};
use crate::qbo::Bill;
use crate::sku::parse_sku_quantity;
use crate::units::{PoUnitWeights, UnitOverflow};

const PO_PREFIX: &str = "PO: ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillParseError {
    #[error("Bill {bill_id}: memo must start with 'PO: ' followed by a PO number, got {memo:?}")]
    InvalidMemo { bill_id: String, memo: Option<String> },
    #[error("Bill {bill_id}: manufacturing line '{description}' must end with '<SKU> <quantity> [units]'")]
    InvalidDescription { bill_id: String, description: String },
    #[error("Bill {bill_id}: line references unknown account {account_id}")]
    UnknownAccount { bill_id: String, account_id: AccountId },
    #[error("Bill {bill_id}: account {account_id} has a cyclic parent chain")]
    AccountCycle { bill_id: String, account_id: AccountId },
    #[error("Bill {bill_id}: inventory line {line_id:?} has no amount")]
    MissingAmount { bill_id: String, line_id: Option<String> },
    #[error("Bill {bill_id}: units for SKU {sku} on PO {po_number} overflow")]
    UnitOverflow {
        bill_id: String,
        po_number: String,
        sku: String,
    },
    #[error("Bill {bill_id}: {source}")]
    InvalidAmount {
        bill_id: String,
        source: AllocationError,
    },
    #[error("Bill mapping {bill_id}: PO number is empty")]
    MissingPoNumber { bill_id: String },
}

/// Output of one bill parse pass: ordered events plus the unit table they built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedBills {
    pub events: Vec<InventoryEvent>,
    pub po_units: PoUnitWeights,
}

/// Extracts the PO number from a bill memo of the form `PO: <number>`.
pub fn parse_po_number(memo: &str) -> Option<String> {
    let rest = memo.trim_start().strip_prefix(PO_PREFIX)?;
    let token = rest.split_whitespace().next()?;
    Some(token.to_string())
}

/// Classifies every bill line and turns inventory cost lines into events.
///
/// Any bill without a `PO: ` memo, or with a manufacturing line whose
/// description lacks a trailing quantity, fails the whole batch. So does an
/// inventory line with no amount.
pub fn parse_qbo_bills_to_inventory_events(
    bills: &[Bill],
    accounts: &AccountsById,
    classifier: &Classifier,
) -> Result<ParsedBills, BillParseError> {
    let mut events = Vec::new();
    let mut po_units = PoUnitWeights::default();

    for bill in bills {
        let po_number = bill
            .memo
            .as_deref()
            .and_then(parse_po_number)
            .ok_or_else(|| BillParseError::InvalidMemo {
                bill_id: bill.id.clone(),
                memo: bill.memo.clone(),
            })?;

        for line in &bill.lines {
            let Some(account_id) = &line.account_id else {
                tracing::debug!(bill_id = %bill.id, "skipping bill line without account");
                continue;
            };

            let component = match classifier.classify(account_id, accounts) {
                Ok(Some(component)) => component,
                Ok(None) => {
                    tracing::debug!(bill_id = %bill.id, %account_id, "skipping unclassified bill line");
                    continue;
                }
                Err(ClassifyError::UnknownAccount(account_id)) => {
                    return Err(BillParseError::UnknownAccount {
                        bill_id: bill.id.clone(),
                        account_id,
                    })
                }
                Err(ClassifyError::AccountCycle(account_id)) => {
                    return Err(BillParseError::AccountCycle {
                        bill_id: bill.id.clone(),
                        account_id,
                    })
                }
            };

            let amount = line.amount.ok_or_else(|| BillParseError::MissingAmount {
                bill_id: bill.id.clone(),
                line_id: line.id.clone(),
            })?;
            let cost_cents = to_cents(amount).map_err(|source| BillParseError::InvalidAmount {
                bill_id: bill.id.clone(),
                source,
            })?;
            let description = line.description.as_deref().unwrap_or_default();

            if component.is_unit_bearing() {
                let parsed = parse_sku_quantity(description).map_err(|_| {
                    BillParseError::InvalidDescription {
                        bill_id: bill.id.clone(),
                        description: description.to_string(),
                    }
                })?;
                po_units
                    .record(&po_number, &parsed.sku, parsed.quantity)
                    .map_err(|UnitOverflow { po_number, sku }| BillParseError::UnitOverflow {
                        bill_id: bill.id.clone(),
                        po_number,
                        sku,
                    })?;
                events.push(InventoryEvent::Manufacturing(ManufacturingEvent {
                    date: bill.txn_date,
                    po_number: po_number.clone(),
                    sku: parsed.sku,
                    units: parsed.quantity,
                    cost_cents,
                    bill_id: bill.id.clone(),
                }));
            } else {
                // Non-manufacturing lines carry no units; the SKU is informational.
                let sku = parse_sku_quantity(description).ok().map(|p| p.sku);
                events.push(InventoryEvent::Cost(CostEvent {
                    date: bill.txn_date,
                    po_number: po_number.clone(),
                    component,
                    cost_cents,
                    sku,
                    bill_id: bill.id.clone(),
                }));
            }
        }
    }

    sort_events(&mut events);
    tracing::info!(
        bills = bills.len(),
        events = events.len(),
        purchase_orders = po_units.len(),
        "parsed bills into inventory events"
    );
    Ok(ParsedBills { events, po_units })
}
