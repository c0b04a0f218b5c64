//! Per-model token pricing.
//!
//! Prices are in USD per 1 million tokens. A small built-in table covers
//! common models; config overrides replace or extend it at bootstrap.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use stepwise_config::PricingOverrideConfig;
use stepwise_core::run::ModelCallRecord;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Cost for the given token counts.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

impl From<&PricingOverrideConfig> for ModelPricing {
    fn from(config: &PricingOverrideConfig) -> Self {
        Self::new(config.input_per_m, config.output_per_m)
    }
}

/// Model name → pricing, with tolerant lookup.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    prices: BTreeMap<String, ModelPricing>,
}

/// `openai/gpt-4o` → `gpt-4o`
fn bare(model: &str) -> String {
    model.rsplit('/').next().unwrap_or(model).to_lowercase()
}

impl PricingTable {
    /// An empty table; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in prices for common models.
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        for (model, input, output) in [
            ("openai/gpt-4o", 2.5, 10.0),
            ("openai/gpt-4o-mini", 0.15, 0.6),
            ("openai/gpt-4-turbo", 10.0, 30.0),
            ("openai/gpt-4", 30.0, 60.0),
            ("openai/gpt-3.5-turbo", 0.5, 1.5),
            ("anthropic/claude-sonnet-4", 3.0, 15.0),
            ("anthropic/claude-3.5-haiku", 0.8, 4.0),
            ("google/gemini-2.0-flash", 0.1, 0.4),
            ("mistral/mistral-large", 2.0, 6.0),
            ("deepseek/deepseek-v3", 0.27, 1.1),
        ] {
            table.set(model, ModelPricing::new(input, output));
        }
        table
    }

    /// Built-in prices plus overrides from configuration.
    pub fn from_config<'a>(
        overrides: impl IntoIterator<Item = (&'a String, &'a PricingOverrideConfig)>,
    ) -> Self {
        let mut table = Self::with_defaults();
        for (model, price) in overrides {
            table.set(model.clone(), ModelPricing::from(price));
        }
        table
    }

    /// Add or replace pricing for a model.
    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model.into(), pricing);
    }

    /// Find pricing: exact name, then provider-agnostic name, then the
    /// longest known name that prefixes the model (dated suffixes such as
    /// `gpt-4o-mini-2024-07-18`).
    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        if let Some(p) = self.prices.get(model) {
            return Some(*p);
        }

        let wanted = bare(model);
        if let Some((_, p)) = self.prices.iter().find(|(k, _)| bare(k) == wanted) {
            return Some(*p);
        }

        self.prices
            .iter()
            .map(|(k, p)| (bare(k), p))
            .filter(|(k, _)| wanted.starts_with(k.as_str()))
            .max_by_key(|(k, _)| k.len())
            .map(|(_, p)| *p)
    }

    /// Cost of one recorded call; zero without usage or known pricing.
    pub fn cost_of(&self, call: &ModelCallRecord) -> f64 {
        let (Some(model), Some(usage)) = (call.model.as_deref(), call.usage) else {
            return 0.0;
        };
        self.lookup(model)
            .map(|p| p.cost(usage.prompt_tokens, usage.completion_tokens))
            .unwrap_or(0.0)
    }

    /// Known model names, sorted.
    pub fn models(&self) -> Vec<&str> {
        self.prices.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
