//! Confidence scoring policies.

use sage_types::ConfidenceBreakdown;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Combines the three independent scores into one confidence value.
pub trait ScoringPolicy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Must return a value in `[0, 1]` for inputs in `[0, 1]`.
    fn combine(&self, breakdown: &ConfidenceBreakdown) -> f64;
}

/// Blend of the weakest score and the weighted mean.
///
/// `confidence = floor * min + (1 - floor) * weighted_mean`
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedMinimum {
    pub intent_weight: f64,
    pub entity_weight: f64,
    pub situation_weight: f64,
    /// Share of the result taken from the minimum score.
    pub floor: f64,
}

impl Default for WeightedMinimum {
    fn default() -> Self {
        Self {
            intent_weight: 0.4,
            entity_weight: 0.3,
            situation_weight: 0.3,
            floor: 0.5,
        }
    }
}

impl ScoringPolicy for WeightedMinimum {
    fn name(&self) -> &'static str {
        "weighted_minimum"
    }

    fn combine(&self, b: &ConfidenceBreakdown) -> f64 {
        let total = self.intent_weight + self.entity_weight + self.situation_weight;
        let mean = if total > 0.0 {
            (b.intent * self.intent_weight
                + b.entity * self.entity_weight
                + b.situation * self.situation_weight)
                / total
        } else {
            0.0
        };
        let min = b.intent.min(b.entity).min(b.situation);
        let floor = self.floor.clamp(0.0, 1.0);
        floor * min + (1.0 - floor) * mean
    }
}

/// Plain product of the three scores.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Product;

impl ScoringPolicy for Product {
    fn name(&self) -> &'static str {
        "product"
    }

    fn combine(&self, b: &ConfidenceBreakdown) -> f64 {
        b.intent * b.entity * b.situation
    }
}

/// Config-level selector for the built-in policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringKind {
    #[default]
    WeightedMinimum,
    Product,
}

impl ScoringKind {
    pub fn policy(&self) -> Arc<dyn ScoringPolicy> {
        match self {
            ScoringKind::WeightedMinimum => Arc::new(WeightedMinimum::default()),
            ScoringKind::Product => Arc::new(Product),
        }
    }
}

/// Round to four decimals so equal inputs render identically everywhere.
pub(crate) fn round_score(value: f64) -> f64 {
    (value.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(intent: f64, entity: f64, situation: f64) -> ConfidenceBreakdown {
        ConfidenceBreakdown {
            intent,
            entity,
            situation,
        }
    }

    #[test]
    fn weighted_minimum_is_pulled_down_by_weakest_score() {
        let policy = WeightedMinimum::default();
        let strong = policy.combine(&breakdown(1.0, 1.0, 1.0));
        let weak = policy.combine(&breakdown(1.0, 1.0, 0.2));
        assert!((strong - 1.0).abs() < 1e-9);
        assert!(weak < 0.7);
    }

    #[test]
    fn product_multiplies() {
        let value = Product.combine(&breakdown(0.5, 0.5, 1.0));
        assert!((value - 0.25).abs() < 1e-9);
    }

    #[test]
    fn kind_selects_policy() {
        assert_eq!(ScoringKind::default().policy().name(), "weighted_minimum");
        assert_eq!(ScoringKind::Product.policy().name(), "product");
    }

    #[test]
    fn rounding_is_stable() {
        assert_eq!(round_score(0.123456), 0.1235);
        assert_eq!(round_score(1.7), 1.0);
    }
}
