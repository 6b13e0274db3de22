//! JSON loader for a training dataset: a CLI-level convenience format
//! standing in for the (out-of-scope) upstream preparation stage (spec §6
//! "Prepared-statistics contract"). Supports dense columns only; sparse
//! ingestion is exercised by `snb-core`'s own test suite.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use snb_core::attribute::AttributeIndex;
use snb_core::cost::TargetStats;
use snb_core::error::{Error, Result};
use snb_core::io::{PreparedAttribute, TrainingInput};
use snb_core::partition::{LogProbTable, TargetPartitionSpec};
use snb_core::slice_set::{ColumnKind, RecodedSource};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TargetDef {
    Classification { class_frequency: Vec<u64>, actual: Vec<u32> },
    Regression { total_instances: u64, rank_of_instance: Vec<u32> },
    Grouped { symbol_frequency: Vec<u64>, actual: Vec<u32> },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TargetPartitionDef {
    Singletons { symbol_count: u32 },
    Intervals { bounds: Vec<u32> },
    Groups { group_of_symbol: Vec<u32>, default_group: Option<u32>, group_count: u32 },
}

impl From<TargetPartitionDef> for TargetPartitionSpec {
    fn from(d: TargetPartitionDef) -> Self {
        match d {
            TargetPartitionDef::Singletons { symbol_count } => Self::Singletons { symbol_count },
            TargetPartitionDef::Intervals { bounds } => Self::Intervals { bounds },
            TargetPartitionDef::Groups { group_of_symbol, default_group, group_count } => {
                Self::Groups { group_of_symbol, default_group, group_count }
            }
        }
    }
}

#[derive(Deserialize)]
struct AttributeDef {
    native_name: String,
    recoded_name: String,
    #[serde(default)]
    prepared_name: Option<String>,
    #[serde(default)]
    construction_cost: f64,
    #[serde(default)]
    null_construction_cost: f64,
    #[serde(default)]
    preparation_cost: f64,
    #[serde(default)]
    level: f64,
    source_parts: usize,
    target_parts: usize,
    /// Row-major `source_parts * target_parts` conditional log-probabilities.
    ln_p: Vec<f64>,
    target_partition: TargetPartitionDef,
    /// Dense recoded source-part index per instance; `-1` means missing.
    values: Vec<i32>,
}

#[derive(Deserialize)]
struct DatasetFile {
    instance_count: u32,
    target: TargetDef,
    attributes: Vec<AttributeDef>,
}

/// A loaded dataset: the training input plus a [`RecodedSource`] over its
/// (single-chunk) dense columns.
pub struct Dataset {
    pub input: TrainingInput,
    pub instance_count: u32,
    /// `ln P(target_part)` at the empty selection, one entry per part of the
    /// global target partition (spec §4.8 "Output": "plus the target prior").
    /// For regression and grouped-classification targets, which start
    /// training from a single part covering every instance, this is the
    /// trivial one-entry `[0.0]` prior.
    pub target_prior: Vec<f64>,
    pub source: DenseSource,
}

pub struct DenseSource {
    columns: HashMap<AttributeIndex, Vec<i32>>,
}

impl RecodedSource for DenseSource {
    fn dense_column(&self, _chunk: u32, attribute: AttributeIndex) -> Result<Vec<i32>> {
        self.columns
            .get(&attribute)
            .cloned()
            .ok_or_else(|| Error::InvariantViolation(format!("no column for attribute {attribute}")))
    }

    fn sparse_column(&self, _chunk: u32, _attribute: AttributeIndex) -> Result<Vec<(u32, u32)>> { Ok(Vec::new()) }

    fn column_kind(&self, _attribute: AttributeIndex) -> ColumnKind { ColumnKind::Dense }
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let file: DatasetFile = serde_json::from_str(&text)
            .map_err(|e| Error::InvariantViolation(format!("malformed dataset JSON: {e}")))?;

        let mut columns = HashMap::with_capacity(file.attributes.len());
        let mut attributes = Vec::with_capacity(file.attributes.len());
        for (i, a) in file.attributes.into_iter().enumerate() {
            if a.values.len() != file.instance_count as usize {
                return Err(Error::InvariantViolation(format!(
                    "attribute {} has {} values, expected {}",
                    a.native_name,
                    a.values.len(),
                    file.instance_count
                )));
            }
            columns.insert(i as AttributeIndex, a.values);
            attributes.push(PreparedAttribute {
                native_name: a.native_name,
                recoded_name: a.recoded_name.clone(),
                prepared_name: a.prepared_name.unwrap_or(a.recoded_name),
                preparation_catalogue_index: i as u32,
                is_sparse: false,
                construction_cost: a.construction_cost,
                null_construction_cost: a.null_construction_cost,
                preparation_cost: a.preparation_cost,
                level: a.level,
                ln_p_table: LogProbTable::new(a.source_parts, a.target_parts, a.ln_p)?,
                own_target_partition: a.target_partition.into(),
            });
        }

        let (target_stats, actual_symbol, target_prior) = match file.target {
            TargetDef::Classification { class_frequency, actual } => {
                let total: u64 = class_frequency.iter().sum();
                let prior = class_frequency.iter().map(|&f| ((f as f64) / (total as f64)).ln()).collect();
                (TargetStats::Classification { class_frequency }, actual, prior)
            }
            TargetDef::Regression { total_instances, rank_of_instance } => {
                let actual = rank_of_instance.clone();
                (TargetStats::Regression { total_instances, rank_of_instance }, actual, vec![0.0])
            }
            TargetDef::Grouped { symbol_frequency, actual } => {
                (TargetStats::Grouped { symbol_frequency }, actual, vec![0.0])
            }
        };
        if actual_symbol.len() != file.instance_count as usize {
            return Err(Error::InvariantViolation("target column length does not match instance_count".into()));
        }

        let input = TrainingInput {
            attributes,
            target_stats_per_chunk: vec![target_stats],
            actual_symbol_per_chunk: vec![actual_symbol],
        };
        Ok(Self { input, instance_count: file.instance_count, target_prior, source: DenseSource { columns } })
    }
}
