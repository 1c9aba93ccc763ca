//! Per-model token cost estimation.

use std::collections::HashMap;

use crate::config::ModelRates;

/// Resolves USD cost estimates from the configured per-model rate table.
#[derive(Debug, Clone, Default)]
pub struct CostTable {
    rates: HashMap<String, ModelRates>,
}

impl CostTable {
    pub fn new(rates: HashMap<String, ModelRates>) -> Self {
        Self { rates }
    }

    /// `cost = in_tokens * rate_in + out_tokens * rate_out`.
    ///
    /// Unknown models cost 0.0; the estimate is advisory, not billing.
    pub fn estimate(&self, model: &str, prompt_tokens: i64, completion_tokens: i64) -> f64 {
        match self.rates.get(model) {
            Some(rates) => {
                prompt_tokens as f64 * rates.input + completion_tokens as f64 * rates.output
            }
            None => 0.0,
        }
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.rates.contains_key(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CostTable {
        CostTable::new(HashMap::from([(
            "test-model".to_string(),
            ModelRates {
                input: 1e-6,
                output: 2e-6,
            },
        )]))
    }

    #[test]
    fn estimate_sums_both_directions() {
        let cost = table().estimate("test-model", 1_000, 500);
        assert!((cost - (0.001 + 0.001)).abs() < 1e-12);
    }

    #[test]
    fn unknown_model_costs_zero() {
        assert_eq!(table().estimate("missing", 1_000, 1_000), 0.0);
    }

    #[test]
    fn zero_tokens_cost_zero() {
        assert_eq!(table().estimate("test-model", 0, 0), 0.0);
    }
}
