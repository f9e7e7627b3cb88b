//! Token cost accounting

use crate::models::Pricing;
use crate::tasks::TokenUsage;

/// USD cost of a call and whether it could actually be priced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub cost_usd: f64,
    /// False when usage or pricing was missing and the cost defaulted to 0.0
    pub estimated: bool,
}

/// Compute `(input * input_price + output * output_price) / 1e6`, rounded
/// to `precision` decimal places. Never negative.
pub fn compute_cost(usage: Option<&TokenUsage>, pricing: &Pricing, precision: u32) -> CostEstimate {
    let (Some(usage), Pricing::PerMillion { input_price_per_million, output_price_per_million }) =
        (usage, pricing)
    else {
        return CostEstimate {
            cost_usd: 0.0,
            estimated: false,
        };
    };

    if !input_price_per_million.is_finite() || !output_price_per_million.is_finite() {
        return CostEstimate {
            cost_usd: 0.0,
            estimated: false,
        };
    }

    let raw = (usage.input_tokens as f64 * input_price_per_million
        + usage.output_tokens as f64 * output_price_per_million)
        / 1_000_000.0;

    CostEstimate {
        cost_usd: round_to(raw.max(0.0), precision),
        estimated: true,
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(12) as i32);
    (value * factor).round() / factor
}
