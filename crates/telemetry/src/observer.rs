//! Cost reporting observer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use stepwise_core::error::ObserverError;
use stepwise_core::observer::RunObserver;
use stepwise_core::run::{ModelCallRecord, Run};

use crate::cost::calculate_run_cost;
use crate::ledger::UsageLedger;

/// Feeds every model call into a [`UsageLedger`] and logs the run's cost
/// when it finishes.
pub struct CostObserver {
    ledger: Arc<UsageLedger>,
}

impl CostObserver {
    pub fn new(ledger: Arc<UsageLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }
}

#[async_trait]
impl RunObserver for CostObserver {
    fn name(&self) -> &str {
        "cost"
    }

    async fn on_model_call_completed(&self, run: &Run, call: &ModelCallRecord) -> Result<(), ObserverError> {
        let cost = self.ledger.record_call(call);
        debug!(
            run_id = %run.id(),
            step = call.step_index,
            attempt = call.attempt,
            success = call.success,
            cost_usd = cost,
            "Model call recorded"
        );
        Ok(())
    }

    async fn on_run_finished(&self, run: &Run) -> Result<(), ObserverError> {
        self.ledger.record_run_finished();
        let cost = calculate_run_cost(run, self.ledger.pricing());
        info!(
            run_id = %run.id(),
            model_calls = cost.successful_calls,
            failed_calls = cost.calls - cost.successful_calls,
            tokens = cost.total_tokens(),
            cost_usd = %format!("{:.4}", cost.cost_usd),
            "Run cost"
        );
        Ok(())
    }
}
