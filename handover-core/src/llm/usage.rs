//! Token usage accumulation and cost translation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Round;

use super::TokenUsage;

/// Per-1K-token pricing for a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
    /// Cache reads are billed at this rate instead of the input rate.
    pub cache_read_per_1k: f64,
}

/// Look up pricing by model id substring. Unknown and local models cost 0.
pub fn pricing_for(model: &str) -> ModelPricing {
    if model.contains("opus") {
        ModelPricing {
            input_per_1k: 0.015,
            output_per_1k: 0.075,
            cache_read_per_1k: 0.0015,
        }
    } else if model.contains("sonnet") {
        ModelPricing {
            input_per_1k: 0.003,
            output_per_1k: 0.015,
            cache_read_per_1k: 0.0003,
        }
    } else if model.contains("haiku") {
        ModelPricing {
            input_per_1k: 0.00025,
            output_per_1k: 0.00125,
            cache_read_per_1k: 0.00003,
        }
    } else if model.contains("gpt-4o") {
        ModelPricing {
            input_per_1k: 0.0025,
            output_per_1k: 0.01,
            cache_read_per_1k: 0.00125,
        }
    } else if model.contains("gpt-4") {
        ModelPricing {
            input_per_1k: 0.03,
            output_per_1k: 0.06,
            cache_read_per_1k: 0.03,
        }
    } else if model.contains("deepseek") {
        ModelPricing {
            input_per_1k: 0.00027,
            output_per_1k: 0.0011,
            cache_read_per_1k: 0.00007,
        }
    } else {
        ModelPricing {
            input_per_1k: 0.0,
            output_per_1k: 0.0,
            cache_read_per_1k: 0.0,
        }
    }
}

/// Accumulates input/output/cache tokens per round and converts to USD.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageTracker {
    pub model: String,
    rounds: BTreeMap<u8, TokenUsage>,
}

impl UsageTracker {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            rounds: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, round: Round, usage: &TokenUsage) {
        self.rounds
            .entry(round.number())
            .or_default()
            .add(usage);
    }

    pub fn round_usage(&self, round: Round) -> TokenUsage {
        self.rounds
            .get(&round.number())
            .copied()
            .unwrap_or_default()
    }

    pub fn totals(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for usage in self.rounds.values() {
            total.add(usage);
        }
        total
    }

    /// Total cost in USD: cache-read tokens are billed at the discounted
    /// cache rate, not the input rate.
    #[allow(clippy::cast_precision_loss)]
    pub fn total_cost_usd(&self) -> f64 {
        let pricing = pricing_for(&self.model);
        let total = self.totals();
        let fresh_input = total.input_tokens.saturating_sub(total.cache_read_tokens);
        (fresh_input as f64 / 1000.0) * pricing.input_per_1k
            + (total.cache_read_tokens as f64 / 1000.0) * pricing.cache_read_per_1k
            + (total.output_tokens as f64 / 1000.0) * pricing.output_per_1k
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn round_cost_usd(&self, round: Round) -> f64 {
        let pricing = pricing_for(&self.model);
        let usage = self.round_usage(round);
        let fresh_input = usage.input_tokens.saturating_sub(usage.cache_read_tokens);
        (fresh_input as f64 / 1000.0) * pricing.input_per_1k
            + (usage.cache_read_tokens as f64 / 1000.0) * pricing.cache_read_per_1k
            + (usage.output_tokens as f64 / 1000.0) * pricing.output_per_1k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_tiers() {
        assert!(pricing_for("claude-opus-4-20250514").input_per_1k > 0.01);
        assert!((pricing_for("claude-sonnet-4-20250514").input_per_1k - 0.003).abs() < 1e-9);
        assert!(pricing_for("claude-haiku-4-20250514").input_per_1k < 0.001);
        assert!(pricing_for("gpt-4o").input_per_1k < pricing_for("gpt-4-turbo").input_per_1k);
        assert!((pricing_for("llama3.1").input_per_1k - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn accumulation_per_round() {
        let mut tracker = UsageTracker::new("claude-sonnet-4-20250514");
        tracker.record(
            Round::Overview,
            &TokenUsage {
                input_tokens: 1000,
                output_tokens: 500,
                cache_read_tokens: 0,
            },
        );
        tracker.record(
            Round::Overview,
            &TokenUsage {
                input_tokens: 200,
                output_tokens: 100,
                cache_read_tokens: 0,
            },
        );
        let usage = tracker.round_usage(Round::Overview);
        assert_eq!(usage.input_tokens, 1200);
        assert_eq!(usage.output_tokens, 600);

        // 1.2K * 0.003 + 0.6K * 0.015 = 0.0036 + 0.009 = 0.0126
        assert!((tracker.total_cost_usd() - 0.0126).abs() < 1e-9);
    }

    #[test]
    fn cache_reads_are_discounted() {
        let mut tracker = UsageTracker::new("claude-sonnet-4-20250514");
        tracker.record(
            Round::Modules,
            &TokenUsage {
                input_tokens: 1000,
                output_tokens: 0,
                cache_read_tokens: 1000,
            },
        );
        // All input came from cache: 1K * 0.0003.
        assert!((tracker.total_cost_usd() - 0.0003).abs() < 1e-9);
    }

    #[test]
    fn empty_tracker_costs_nothing() {
        let tracker = UsageTracker::new("gpt-4o");
        assert!((tracker.total_cost_usd() - 0.0).abs() < f64::EPSILON);
        assert_eq!(tracker.totals().input_tokens, 0);
    }
}
