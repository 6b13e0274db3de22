//! Weighted selection: a mapping from attribute to weight in `(0, 1]`
//! (spec §4.4).

use std::collections::HashMap;

use crate::attribute::AttributeIndex;

/// Mapping from attribute to weight. Absence means weight `0`.
#[derive(Debug, Clone, Default)]
pub struct WeightedSelection {
    weights: HashMap<AttributeIndex, f64>,
    sum_of_weights: f64,
}

impl WeightedSelection {
    pub fn new() -> Self { Self::default() }

    /// Increases the weight of `attribute` by `delta` (saturating at `1`).
    /// Returns the *effective* delta actually applied.
    pub fn increase(&mut self, attribute: AttributeIndex, delta: f64) -> f64 {
        debug_assert!(delta >= 0.0);
        let current = self.weight(attribute);
        let effective = delta.min(1.0 - current);
        if effective > 0.0 {
            self.weights.insert(attribute, current + effective);
            self.sum_of_weights += effective;
        }
        effective
    }

    /// Decreases the weight of `attribute` by `delta` (saturating at `0`,
    /// removing the entry when it reaches zero). Returns the effective delta.
    pub fn decrease(&mut self, attribute: AttributeIndex, delta: f64) -> f64 {
        debug_assert!(delta >= 0.0);
        let current = self.weight(attribute);
        let effective = delta.min(current);
        if effective > 0.0 {
            let remaining = current - effective;
            if remaining <= 0.0 {
                self.weights.remove(&attribute);
            } else {
                self.weights.insert(attribute, remaining);
            }
            self.sum_of_weights -= effective;
        }
        effective
    }

    #[inline]
    pub fn contains(&self, attribute: AttributeIndex) -> bool { self.weights.contains_key(&attribute) }

    #[inline]
    pub fn weight(&self, attribute: AttributeIndex) -> f64 { self.weights.get(&attribute).copied().unwrap_or(0.0) }

    #[inline]
    pub fn size(&self) -> usize { self.weights.len() }

    #[inline]
    pub fn sum_of_weights(&self) -> f64 { self.sum_of_weights }

    pub fn iter(&self) -> impl Iterator<Item = (AttributeIndex, f64)> + '_ {
        self.weights.iter().map(|(&a, &w)| (a, w))
    }
}
