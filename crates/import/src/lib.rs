pub mod amazon;
pub mod bills;
pub mod classify;
pub mod mappings;
pub mod qbo;
pub mod sku;
pub mod units;
pub(crate) mod util;

pub use amazon::{
    parse_amazon_unified_transaction_csv, summarize_by_settlement, AmazonCsvError,
    AmazonTransactionRow, SettlementSummary,
};
pub use bills::{parse_po_number, parse_qbo_bills_to_inventory_events, BillParseError, ParsedBills};
pub use classify::{Classifier, ClassifierConfig, ClassifyError, ConfigError, PrefixRule};
pub use mappings::{build_inventory_events_from_mappings, BillMapping, BillMappingLine};
pub use qbo::{
    normalize_accounts, normalize_bills, normalize_preferences, Bill, BillLine, CompanyPreferences,
    NormalizeError,
};
pub use sku::{parse_sku_quantity, SkuParseError, SkuQuantity};
pub use units::{
    allocate_cost_events, allocate_po_cost_across_skus, landed_cost_by_sku, AllocateError,
    AllocatedCost, PoUnitWeights, UnitOverflow,
};

pub mod import {
    use crate::*;
    use costbook_core::AccountsById;

    /// Bills and accounts from raw QBO payloads straight to ordered events.
    pub fn events_from_qbo_payloads(
        bills_json: &str,
        accounts_json: &str,
        classifier: &Classifier,
    ) -> Result<ParsedBills, ImportError> {
        let accounts: AccountsById = normalize_accounts(accounts_json)?;
        let bills = normalize_bills(bills_json)?;
        Ok(parse_qbo_bills_to_inventory_events(&bills, &accounts, classifier)?)
    }

    /// Parse plus both allocation phases.
    pub fn allocate_qbo_payloads(
        bills_json: &str,
        accounts_json: &str,
        classifier: &Classifier,
    ) -> Result<(ParsedBills, Vec<AllocatedCost>), ImportError> {
        let parsed = events_from_qbo_payloads(bills_json, accounts_json, classifier)?;
        let weights = PoUnitWeights::build(&parsed.events)?;
        let allocated = allocate_cost_events(&parsed.events, &weights)?;
        Ok((parsed, allocated))
    }

    #[derive(thiserror::Error, Debug)]
    pub enum ImportError {
        #[error(transparent)]
        Normalize(#[from] NormalizeError),
        #[error(transparent)]
        Bills(#[from] BillParseError),
        #[error(transparent)]
        Allocate(#[from] AllocateError),
    }
}
