pub mod account;
pub mod allocation;
pub mod event;
pub mod money;

pub use account::{index_accounts, Account, AccountId, AccountsById};
pub use allocation::{
    allocate_by_weight, remove_proportional_components, Allocation, AllocationError, Weight,
};
pub use event::{
    sort_events, BrandCostEvent, Component, CostEvent, InventoryEvent, ManufacturingEvent,
};
pub use money::{from_cents, to_cents, to_cents_f64, Money};
