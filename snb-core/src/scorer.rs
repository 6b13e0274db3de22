//! Selection scorer (spec §4.6): combines the model cost (prior) with a
//! caller-supplied data cost, and remembers the last modification so it can
//! be undone exactly once.

use crate::attribute::{Attribute, AttributeIndex};
use crate::error::{Error, Result};
use crate::selection::WeightedSelection;

/// Lanczos approximation of `ln(Γ(x))`, used for `ln(n!) = ln(Γ(n+1))`.
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection formula.
        (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut a = COEFFICIENTS[0];
        let t = x + G + 0.5;
        for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
            a += c / (x + i as f64);
        }
        0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
    }
}

fn ln_factorial(n: u64) -> f64 { ln_gamma(n as f64 + 1.0) }

/// Rissanen/Elias universal code length for a positive integer, in nats
/// (spec §9 numerical precision; `c0 ≈ 2.865064`, the Rissanen constant).
pub fn universal_integer_code_length(n: u64) -> f64 {
    const C0: f64 = 2.865_064;
    let mut total = C0.ln();
    let mut term = n as f64;
    while term > 1.0 {
        total += term.ln();
        term = term.ln();
    }
    total
}

/// Environment/configuration recognised by the scorer (spec §6).
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub prior_weight: f64,
    pub prior_exponent: f64,
    pub construction_cost_enabled: bool,
    pub preparation_cost_enabled: bool,
    pub initial_attribute_count: u32,
    /// Aggregate null-construction cost of the empty model, across all
    /// initial attributes (the scorer-level baseline of spec §4.6).
    pub total_null_construction_cost: f64,
    pub null_preparation_cost: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            prior_weight: 0.1,
            prior_exponent: 0.95,
            construction_cost_enabled: true,
            preparation_cost_enabled: true,
            initial_attribute_count: 1,
            total_null_construction_cost: std::f64::consts::LN_2,
            null_preparation_cost: 0.0,
        }
    }
}

impl ScorerConfig {
    /// `attr_cost(a)` of spec §4.6 (without the prior weight folded in).
    fn attr_cost(&self, attribute: &Attribute) -> f64 {
        let mut cost = if self.construction_cost_enabled && attribute.construction_cost > 0.0 {
            attribute.construction_cost - attribute.null_construction_cost
        } else {
            (self.initial_attribute_count.max(1) as f64).ln()
        };
        if self.preparation_cost_enabled {
            cost += attribute.preparation_cost;
        }
        cost
    }

    /// `base_prior(selection)` of spec §4.6.
    fn base_prior(&self, selection: &WeightedSelection) -> f64 {
        let mut prior = self.total_null_construction_cost;
        if selection.size() == 0 {
            if self.preparation_cost_enabled {
                prior += self.null_preparation_cost;
            }
        } else {
            // `sum_of_weights` is an incrementally maintained running total
            // (spec §4.4); after a long increase/decrease/undo history it can
            // land a few ULPs above the integer it conceptually equals, which
            // `ceil` would otherwise round up to the next integer.
            const DRIFT_TOLERANCE: f64 = 1e-9;
            let k = (selection.sum_of_weights() - DRIFT_TOLERANCE).ceil() as u64;
            prior += universal_integer_code_length(k) - ln_factorial(k);
        }
        prior
    }
}

/// What the last `increase`/`decrease` did, to support a single-level undo.
struct LastModification {
    attribute: AttributeIndex,
    effective_delta: f64,
    was_increase: bool,
    model_cost_all_attributes_before: f64,
}

/// Composes the model cost (prior) with an externally supplied data cost
/// (spec §4.6). The scorer owns the weighted selection and the incremental
/// model-cost cache; the data cost itself is computed by the (chunk-local,
/// parallel) data-cost calculators of §4.5 and supplied by the caller, since
/// aggregating it across workers is the training driver's job (§4.7).
pub struct SelectionScorer<'a> {
    config: ScorerConfig,
    selection: WeightedSelection,
    /// `Σ_a w_a^α · attr_cost(a)`, maintained incrementally (spec §4.6).
    model_cost_all_attributes: f64,
    attributes: &'a [Attribute],
    last_modification: Option<LastModification>,
}

impl<'a> SelectionScorer<'a> {
    pub fn new(config: ScorerConfig, attributes: &'a [Attribute]) -> Self {
        Self {
            config,
            selection: WeightedSelection::new(),
            model_cost_all_attributes: 0.0,
            attributes,
            last_modification: None,
        }
    }

    pub fn selection(&self) -> &WeightedSelection { &self.selection }

    /// The prior term, `prior_weight · [base_prior + Σ_a w_a^α · attr_cost(a)]`.
    pub fn model_cost(&self) -> f64 {
        self.config.prior_weight * (self.config.base_prior(&self.selection) + self.model_cost_all_attributes)
    }

    /// `score(selection) = model_cost + data_cost`, with `data_cost` supplied
    /// by the caller (the sum of the workers' partial data costs, spec §4.7
    /// "Aggregation wire format").
    pub fn score(&self, data_cost: f64) -> f64 { self.model_cost() + data_cost }

    fn attr_cost_for(&self, attribute: AttributeIndex) -> f64 {
        self.config.attr_cost(&self.attributes[attribute as usize])
    }

    /// Increases `attribute`'s weight by `delta` (spec §4.4/§4.6), updating
    /// the model-cost cache. Returns the effective delta actually applied.
    pub fn increase(&mut self, attribute: AttributeIndex, delta: f64) -> f64 {
        let weight_before = self.selection.weight(attribute);
        let cost_before = self.model_cost_all_attributes;
        let effective = self.selection.increase(attribute, delta);
        let c = self.attr_cost_for(attribute);
        let alpha = self.config.prior_exponent;
        self.model_cost_all_attributes +=
            (weight_before + effective).powf(alpha) * c - weight_before.powf(alpha) * c;
        self.last_modification = Some(LastModification {
            attribute,
            effective_delta: effective,
            was_increase: true,
            model_cost_all_attributes_before: cost_before,
        });
        effective
    }

    /// Decreases `attribute`'s weight by `delta`, symmetric to [`Self::increase`].
    pub fn decrease(&mut self, attribute: AttributeIndex, delta: f64) -> f64 {
        let weight_before = self.selection.weight(attribute);
        let cost_before = self.model_cost_all_attributes;
        let effective = self.selection.decrease(attribute, delta);
        let c = self.attr_cost_for(attribute);
        let alpha = self.config.prior_exponent;
        self.model_cost_all_attributes +=
            (weight_before - effective).powf(alpha) * c - weight_before.powf(alpha) * c;
        self.last_modification = Some(LastModification {
            attribute,
            effective_delta: effective,
            was_increase: false,
            model_cost_all_attributes_before: cost_before,
        });
        effective
    }

    /// Undoes the last `increase`/`decrease` exactly once (spec §4.6).
    /// A second call with no intervening modification fails.
    pub fn undo_last(&mut self) -> Result<()> {
        let last = self
            .last_modification
            .take()
            .ok_or_else(|| Error::InvariantViolation("undo_last called with no pending modification".into()))?;
        if last.was_increase {
            self.selection.decrease(last.attribute, last.effective_delta);
        } else {
            self.selection.increase(last.attribute, last.effective_delta);
        }
        self.model_cost_all_attributes = last.model_cost_all_attributes_before;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{LogProbTable, TargetPartitionSpec};

    fn attr(index: u32, construction_cost: f64, null_construction_cost: f64) -> Attribute {
        Attribute::new(
            index,
            format!("n{index}"),
            format!("r{index}"),
            format!("p{index}"),
            0,
            false,
            construction_cost,
            null_construction_cost,
            0.0,
            0.2,
            LogProbTable::new(1, 1, vec![0.0]).unwrap(),
            TargetPartitionSpec::Singletons { symbol_count: 1 },
        )
    }

    #[test]
    fn ln_gamma_matches_known_factorials() {
        for n in 1u64..10 {
            let expected: f64 = (1..=n).map(|k| k as f64).product::<f64>().ln();
            assert!((ln_factorial(n) - expected).abs() < 1e-9, "n={n}");
        }
    }

    #[test]
    fn empty_selection_model_cost_is_prior_weight_times_base_prior() {
        let attrs = vec![attr(0, 1.0, 0.2)];
        let config = ScorerConfig { total_null_construction_cost: std::f64::consts::LN_2, ..Default::default() };
        let scorer = SelectionScorer::new(config.clone(), &attrs);
        let expected = config.prior_weight * std::f64::consts::LN_2;
        assert!((scorer.model_cost() - expected).abs() < 1e-12);
    }

    #[test]
    fn undo_round_trip_restores_model_cost_bit_for_bit() {
        let attrs = vec![attr(0, 1.0, 0.2), attr(1, 2.0, 0.3)];
        let mut scorer = SelectionScorer::new(ScorerConfig::default(), &attrs);
        scorer.increase(0, 0.4);
        let before = scorer.model_cost();
        scorer.increase(1, 0.7);
        scorer.undo_last().unwrap();
        assert_eq!(scorer.model_cost(), before);
        assert!(scorer.undo_last().is_err()); // second undo fails
    }

    #[test]
    fn increase_then_decrease_by_same_amount_restores_model_cost() {
        let attrs = vec![attr(0, 1.0, 0.2)];
        let mut scorer = SelectionScorer::new(ScorerConfig::default(), &attrs);
        let empty_cost = scorer.model_cost();
        scorer.increase(0, 0.5);
        scorer.decrease(0, 0.5);
        assert!((scorer.model_cost() - empty_cost).abs() < 1e-12);
    }
}
