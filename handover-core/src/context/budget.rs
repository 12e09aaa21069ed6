//! Token budget arithmetic.
//!
//! The packer budget is derived from the provider's context ceiling minus
//! fixed prompt overhead minus reserved output space, scaled by a safety
//! margin. All arithmetic saturates so a degenerate ceiling of zero yields a
//! zero budget rather than wrapping.

use serde::{Deserialize, Serialize};

/// Default safety margin applied to the usable window.
pub const DEFAULT_MARGIN: f64 = 0.85;
/// Tokens assumed consumed by prompt scaffolding (instructions, schemas,
/// static excerpts).
pub const DEFAULT_OVERHEAD: u32 = 6_000;
/// Tokens reserved for the model's response.
pub const DEFAULT_OUTPUT_RESERVE: u32 = 8_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBudget {
    pub max_context: u32,
    pub overhead: u32,
    pub output_reserve: u32,
    pub margin: f64,
}

impl TokenBudget {
    pub fn for_provider(max_context: u32) -> Self {
        Self {
            max_context,
            overhead: DEFAULT_OVERHEAD,
            output_reserve: DEFAULT_OUTPUT_RESERVE,
            margin: DEFAULT_MARGIN,
        }
    }

    /// Tokens available to the context packer.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn packer_budget(&self) -> u32 {
        let usable = self
            .max_context
            .saturating_sub(self.overhead)
            .saturating_sub(self.output_reserve);
        (f64::from(usable) * self.margin.clamp(0.0, 1.0)) as u32
    }
}

/// Best-effort token estimate when the provider has no native estimator:
/// `ceil(chars / 4)`.
#[allow(clippy::cast_possible_truncation)]
pub fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.chars().count().div_ceil(4)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_subtracts_and_scales() {
        let budget = TokenBudget {
            max_context: 100_000,
            overhead: 6_000,
            output_reserve: 8_000,
            margin: 0.85,
        };
        // (100000 - 6000 - 8000) * 0.85 = 73100
        assert_eq!(budget.packer_budget(), 73_100);
    }

    #[test]
    fn zero_ceiling_saturates() {
        let budget = TokenBudget::for_provider(0);
        assert_eq!(budget.packer_budget(), 0);
    }

    #[test]
    fn ceiling_below_overhead_saturates() {
        let budget = TokenBudget::for_provider(5_000);
        assert_eq!(budget.packer_budget(), 0);
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
