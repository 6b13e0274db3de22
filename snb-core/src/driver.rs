//! Training driver (spec §4.7): fast-forward/fast-backward passes over a
//! geometric weight schedule, parallelised across chunks.
//!
//! One "worker" per chunk, each owning a [`ChunkCostCalculator`]; the master
//! (this struct) owns the [`SelectionScorer`] and the shuffled attribute
//! order. For every proposal the master applies the weight change to every
//! chunk's calculator in parallel, aggregates the partial data costs (sum),
//! and decides accept/undo against the precision epsilon.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use crate::attribute::{Attribute, AttributeIndex};
use crate::cost::ChunkCostCalculator;
use crate::error::Result;
use crate::schema::{AttributeSchema, RandomizedAttributeIterator};
use crate::scorer::{ScorerConfig, SelectionScorer};
use crate::selection::WeightedSelection;
use crate::slice_set::{BinarySliceSet, Column};

/// Environment/configuration recognised at the core boundary (spec §6),
/// minus the scorer's own options (`prior_weight`, `prior_exponent`,
/// `construction_cost_enabled`, `preparation_cost_enabled`), which live on
/// [`ScorerConfig`].
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// Hard cap on the number of attributes considered (0 = use all).
    pub max_evaluated_attributes: u32,
    /// Truncates the number of attributes the FF pass will let *enter* the
    /// selection (0 = no cap). Attributes already selected may still be
    /// adjusted by later passes.
    pub max_selected_attributes: u32,
    /// The random seed driving the shuffled attribute iterator (spec §9
    /// "Random number generation": the seed is an explicit driver parameter).
    pub seed: u64,
}

/// How training ended (spec §4.7 "Exit semantics of the driver").
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    Success,
    /// Fewer than two informative attributes were selected.
    Warning(String),
    Interrupted,
}

/// Final state of a completed (or interrupted) training run.
#[derive(Debug)]
pub struct TrainingResult {
    pub outcome: TrainingOutcome,
    pub selection: WeightedSelection,
    pub score: f64,
}

/// The master: owns the selection and the model cost, and drives a pool of
/// per-chunk workers through the proposal/aggregate/accept cycle.
pub struct TrainingDriver<'a> {
    schema: &'a AttributeSchema,
    slice_set: BinarySliceSet,
    calculators: Vec<ChunkCostCalculator>,
    scorer: SelectionScorer<'a>,
    config: DriverConfig,
}

impl<'a> TrainingDriver<'a> {
    pub fn new(
        schema: &'a AttributeSchema,
        slice_set: BinarySliceSet,
        calculators: Vec<ChunkCostCalculator>,
        scorer_config: ScorerConfig,
        config: DriverConfig,
    ) -> Self {
        let scorer = SelectionScorer::new(scorer_config, by_index_slice(schema));
        Self { schema, slice_set, calculators, scorer, config }
    }

    fn aggregated_data_cost(&self) -> f64 { self.calculators.iter().map(|c| c.data_cost()).sum() }

    fn current_score(&self) -> f64 { self.scorer.score(self.aggregated_data_cost()) }

    /// Applies `(attribute, delta_weight, is_increase, entering_or_leaving)`
    /// to every chunk's calculator in parallel (spec §4.7 "Parallelism").
    fn broadcast(
        &mut self,
        attribute: &Attribute,
        delta_weight: f64,
        is_increase: bool,
        entering_or_leaving: bool,
    ) -> Result<()> {
        let layout = self.slice_set.layout().clone();
        self.slice_set
            .chunks_mut()
            .par_iter_mut()
            .zip(self.calculators.par_iter_mut())
            .try_for_each(|(chunk, calc)| -> Result<()> {
                let column = chunk.get_column(&layout, attribute.index)?;
                match column {
                    Column::Dense(_) => {
                        let dense: Vec<i32> = column.present_iter().fold(
                            vec![-1i32; calc_len(calc)],
                            |mut acc, (i, v)| {
                                acc[i as usize] = v;
                                acc
                            },
                        );
                        calc.update(attribute, delta_weight, is_increase, entering_or_leaving, Some(&dense), None)
                    }
                    Column::Sparse(_) => {
                        let pairs: Vec<(u32, i32)> = column.present_iter().collect();
                        calc.update(attribute, delta_weight, is_increase, entering_or_leaving, None, Some(&pairs))
                    }
                }
            })
    }

    /// Undoes the last broadcast (same attribute/delta, opposite direction).
    fn undo_broadcast(
        &mut self,
        attribute: &Attribute,
        delta_weight: f64,
        was_increase: bool,
        entering_or_leaving: bool,
    ) -> Result<()> {
        self.broadcast(attribute, delta_weight, !was_increase, entering_or_leaving)
    }

    /// One `increase(a, Δw)` proposal: commit if it lowers the score by more
    /// than `epsilon`, otherwise undo (spec §4.7 "FF pass").
    fn propose_increase(&mut self, attribute: AttributeIndex, delta: f64, epsilon: f64) -> Result<bool> {
        let a = self.schema.get(attribute);
        let entering = self.scorer.selection().weight(attribute) == 0.0;
        let before = self.current_score();
        let effective = self.scorer.increase(attribute, delta);
        if effective <= 0.0 {
            self.scorer.undo_last().ok();
            return Ok(false);
        }
        self.broadcast(a, effective, true, entering)?;
        let after = self.current_score();
        if after < before - epsilon {
            debug!(attribute, delta = effective, before, after, "accepted increase");
            Ok(true)
        } else {
            self.scorer.undo_last()?;
            self.undo_broadcast(a, effective, true, entering)?;
            Ok(false)
        }
    }

    /// One `decrease(a, Δw)` proposal (spec §4.7 "FB pass").
    fn propose_decrease(&mut self, attribute: AttributeIndex, delta: f64, epsilon: f64) -> Result<bool> {
        let a = self.schema.get(attribute);
        let before = self.current_score();
        let effective = self.scorer.decrease(attribute, delta);
        if effective <= 0.0 {
            self.scorer.undo_last().ok();
            return Ok(false);
        }
        let leaving = self.scorer.selection().weight(attribute) == 0.0;
        self.broadcast(a, effective, false, leaving)?;
        let after = self.current_score();
        if after < before + epsilon {
            debug!(attribute, delta = effective, before, after, "accepted decrease");
            Ok(true)
        } else {
            self.scorer.undo_last()?;
            self.undo_broadcast(a, effective, false, leaving)?;
            Ok(false)
        }
    }

    fn evaluation_order(&self, iterator: &RandomizedAttributeIterator) -> Vec<AttributeIndex> {
        let order: Vec<AttributeIndex> = iterator.order().collect();
        if self.config.max_evaluated_attributes == 0 {
            order
        } else {
            order.into_iter().take(self.config.max_evaluated_attributes as usize).collect()
        }
    }

    fn fast_forward_pass(
        &mut self,
        iterator: &RandomizedAttributeIterator,
        delta: f64,
        epsilon: f64,
        interrupted: &AtomicBool,
    ) -> Result<()> {
        for a in self.evaluation_order(iterator) {
            if interrupted.load(Ordering::SeqCst) {
                break;
            }
            let cap = self.config.max_selected_attributes;
            if cap > 0 && self.scorer.selection().size() as u32 >= cap && self.scorer.selection().weight(a) == 0.0 {
                continue;
            }
            self.propose_increase(a, delta, epsilon)?;
        }
        Ok(())
    }

    fn fast_backward_pass(
        &mut self,
        iterator: &RandomizedAttributeIterator,
        delta: f64,
        epsilon: f64,
        interrupted: &AtomicBool,
    ) -> Result<()> {
        let order: Vec<AttributeIndex> =
            iterator.order().filter(|&a| self.scorer.selection().contains(a)).collect();
        for a in order {
            if interrupted.load(Ordering::SeqCst) {
                break;
            }
            self.propose_decrease(a, delta, epsilon)?;
        }
        Ok(())
    }

    /// Runs the full schedule of spec §4.7 and returns the outcome.
    /// `interrupted` is polled between proposals for cooperative cancellation.
    pub fn train(&mut self, interrupted: &AtomicBool) -> Result<TrainingResult> {
        let _span = info_span!("epsilon_computation").entered();
        let score_empty = self.current_score();
        let n = self.slice_set.layout().instance_count() as f64;
        let epsilon = 1e-2 * (1.0 + score_empty.abs()) / (1.0 + n);
        drop(_span);
        info!(score_empty, epsilon, "precision epsilon computed");

        let mut iterator = RandomizedAttributeIterator::new(self.schema, self.config.seed);
        let outer_iterations = (((n + 1.0).log2()).ceil() as u32).max(1);

        let mut outcome = TrainingOutcome::Success;
        'outer: for o in 0..outer_iterations {
            let span = info_span!("outer_iteration", o).entered();
            let delta = 1.0 / (2u64.pow(o) as f64);
            let mut round = 0u32;
            loop {
                if interrupted.load(Ordering::SeqCst) {
                    outcome = TrainingOutcome::Interrupted;
                    break 'outer;
                }
                iterator.shuffle();
                let before = self.current_score();
                self.fast_forward_pass(&iterator, delta, epsilon, interrupted)?;
                self.fast_backward_pass(&iterator, delta, epsilon, interrupted)?;
                let after = self.current_score();
                round += 1;
                let improved = before - after > epsilon;
                if round >= 2 || !improved {
                    break;
                }
            }
            drop(span);
        }

        if matches!(outcome, TrainingOutcome::Success) {
            let informative = self.scorer.selection().size();
            if informative == 0 {
                let message = "training produced no informative attributes; emitting an empty predictor".to_string();
                warn!("{message}");
                outcome = TrainingOutcome::Warning(message);
            } else if informative == 1 {
                let (attribute, weight) = self.scorer.selection().iter().next().unwrap();
                if weight < 1.0 {
                    self.scorer.increase(attribute, 1.0 - weight);
                }
                info!(attribute, "univariate predictor: forcing its weight to 1");
            }
        }

        let score = self.current_score();
        Ok(TrainingResult { outcome, selection: self.scorer.selection().clone(), score })
    }
}

fn calc_len(calc: &ChunkCostCalculator) -> usize { calc.instance_count() as usize }

fn by_index_slice(schema: &AttributeSchema) -> &[Attribute] { schema.as_slice() }
