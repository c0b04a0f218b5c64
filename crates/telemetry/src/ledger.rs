//! Process-scoped usage ledger.
//!
//! Runs own their call records; the ledger accumulates totals across every
//! run in the process so hosts can report overall spend.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use stepwise_core::run::ModelCallRecord;

use crate::pricing::PricingTable;

/// Totals since the ledger was created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub runs_finished: u64,
    pub model_calls: u64,
    pub failed_model_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// Thread-safe accumulator shared by every run in the process.
pub struct UsageLedger {
    pricing: PricingTable,
    totals: RwLock<UsageSnapshot>,
}

impl UsageLedger {
    pub fn new(pricing: PricingTable) -> Self {
        Self {
            pricing,
            totals: RwLock::new(UsageSnapshot::default()),
        }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Add one model call; returns its cost.
    pub fn record_call(&self, call: &ModelCallRecord) -> f64 {
        let cost = self.pricing.cost_of(call);
        let mut totals = self.totals.write().unwrap_or_else(|e| e.into_inner());
        totals.model_calls += 1;
        if !call.success {
            totals.failed_model_calls += 1;
        }
        if let Some(usage) = call.usage {
            totals.input_tokens += u64::from(usage.prompt_tokens);
            totals.output_tokens += u64::from(usage.completion_tokens);
        }
        totals.cost_usd += cost;
        cost
    }

    pub fn record_run_finished(&self) {
        let mut totals = self.totals.write().unwrap_or_else(|e| e.into_inner());
        totals.runs_finished += 1;
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.totals.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new(PricingTable::with_defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stepwise_core::error::ModelCallError;
    use stepwise_core::model::{Generation, Usage};
    use std::sync::Arc;

    fn ok_call(tokens: u32) -> ModelCallRecord {
        ModelCallRecord::succeeded(
            0,
            1,
            "t",
            "p".into(),
            Utc::now(),
            &Generation {
                text: "{}".into(),
                model: "openai/gpt-4o".into(),
                usage: Some(Usage::new(tokens, tokens)),
            },
        )
    }

    #[test]
    fn accumulates_calls() {
        let ledger = UsageLedger::default();
        ledger.record_call(&ok_call(1000));
        ledger.record_call(&ModelCallRecord::failed(
            1,
            1,
            "t",
            "p".into(),
            Utc::now(),
            &ModelCallError::Network("down".into()),
        ));
        ledger.record_run_finished();

        let snap = ledger.snapshot();
        assert_eq!(snap.model_calls, 2);
        assert_eq!(snap.failed_model_calls, 1);
        assert_eq!(snap.input_tokens, 1000);
        assert_eq!(snap.runs_finished, 1);
        assert!(snap.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn shared_across_tasks() {
        let ledger = Arc::new(UsageLedger::default());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.record_call(&ok_call(10));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(ledger.snapshot().model_calls, 8);
    }
}
