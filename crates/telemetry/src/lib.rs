//! Cost accounting for Stepwise runs.
//!
//! Computes per-run cost from the model call records a run carries,
//! accumulates process-wide usage in a [`UsageLedger`], and reports both
//! through a [`CostObserver`].

pub mod cost;
pub mod ledger;
pub mod observer;
pub mod pricing;

pub use cost::{RunCost, calculate_run_cost};
pub use ledger::{UsageLedger, UsageSnapshot};
pub use observer::CostObserver;
pub use pricing::{ModelPricing, PricingTable};
