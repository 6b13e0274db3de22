//! Command-line options (spec §6 "Environment / configuration recognised at
//! the core boundary").

use std::path::PathBuf;

use clap::Parser;

use snb_core::driver::DriverConfig;
use snb_core::scorer::ScorerConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Trains a Selective Naive Bayes attribute selection from a prepared dataset.
pub struct Conf {
    /// Path to the training dataset (JSON; see the crate README for the schema)
    pub input: PathBuf,

    /// Where to write the selection report and predictor spec (JSON); stdout if absent
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Hard cap on the number of attributes considered (0 = use all)
    #[arg(long, default_value_t = 0)]
    pub max_evaluated_attributes: u32,

    /// Truncate the number of attributes the selection may grow to (0 = no cap)
    #[arg(long, default_value_t = 0)]
    pub max_selected_attributes: u32,

    /// Multiplier on the selection prior
    #[arg(long, default_value_t = 0.1)]
    pub prior_weight: f64,

    /// Exponent on the per-attribute weight penalty
    #[arg(long, default_value_t = 0.95)]
    pub prior_exponent: f64,

    /// Include construction costs in the prior
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub construction_cost_enabled: bool,

    /// Include preparation costs in the prior
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub preparation_cost_enabled: bool,

    /// Disable sparse column encoding even for block-sparse inputs
    #[arg(long, default_value_t = false)]
    pub force_dense_mode: bool,

    /// Random seed driving the shuffled attribute iterator
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

impl Conf {
    /// `attribute_count` is the dataset's initial attribute count (spec §4.6
    /// `attr_cost` fallback: `ln(#initial_attributes)` when a construction
    /// cost is absent).
    pub fn scorer_config(&self, attribute_count: u32) -> ScorerConfig {
        ScorerConfig {
            prior_weight: self.prior_weight,
            prior_exponent: self.prior_exponent,
            construction_cost_enabled: self.construction_cost_enabled,
            preparation_cost_enabled: self.preparation_cost_enabled,
            initial_attribute_count: attribute_count,
            ..Default::default()
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            max_evaluated_attributes: self.max_evaluated_attributes,
            max_selected_attributes: self.max_selected_attributes,
            seed: self.seed,
        }
    }
}
