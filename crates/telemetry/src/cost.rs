//! Run cost calculation from recorded model calls.

use serde::{Deserialize, Serialize};
use stepwise_core::run::Run;

use crate::pricing::PricingTable;

/// Cost and usage totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCost {
    /// All model calls, including failed attempts.
    pub calls: usize,
    pub successful_calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl RunCost {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Sum the cost of every model call recorded on the run.
pub fn calculate_run_cost(run: &Run, pricing: &PricingTable) -> RunCost {
    run.recorded_calls()
        .iter()
        .fold(RunCost::default(), |mut acc, call| {
            acc.calls += 1;
            if call.success {
                acc.successful_calls += 1;
            }
            if let Some(usage) = call.usage {
                acc.input_tokens += u64::from(usage.prompt_tokens);
                acc.output_tokens += u64::from(usage.completion_tokens);
            }
            acc.cost_usd += pricing.cost_of(call);
            acc
        })
}
