//! External input contract (spec §4.8 "Input", §6 "Prepared-statistics
//! contract"): assembles the schema, binary slice set and per-chunk data-cost
//! calculators the driver needs from the (out-of-scope) preparation stage's
//! artefacts.

use std::path::Path;

use crate::attribute::Attribute;
use crate::cost::{ChunkCostCalculator, TargetStats};
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::partition::{LogProbTable, TargetPartitionSpec};
use crate::schema::AttributeSchema;
use crate::slice_set::{BinarySliceSet, RecodedSource};

/// One attribute as exposed by the preparation stage, before it is assigned
/// a stable index and a slice (spec §6 "Prepared-statistics contract").
#[derive(Debug, Clone)]
pub struct PreparedAttribute {
    pub native_name: String,
    pub recoded_name: String,
    pub prepared_name: String,
    pub preparation_catalogue_index: u32,
    pub is_sparse: bool,
    pub construction_cost: f64,
    pub null_construction_cost: f64,
    pub preparation_cost: f64,
    pub level: f64,
    pub ln_p_table: LogProbTable,
    pub own_target_partition: TargetPartitionSpec,
}

/// Everything the preparer must hand the core to start training (spec §4.8).
pub struct TrainingInput {
    pub attributes: Vec<PreparedAttribute>,
    /// Per-chunk target statistics used to initialise each chunk's calculator.
    pub target_stats_per_chunk: Vec<TargetStats>,
    /// `actual_symbol_per_chunk[c][i]` is the raw target value of local
    /// instance `i` in chunk `c` (a symbol id, or an instance rank for
    /// regression).
    pub actual_symbol_per_chunk: Vec<Vec<u32>>,
}

/// Turns a [`TrainingInput`] plus a [`RecodedSource`] into the schema, slice
/// set and calculators the driver (C7) operates on.
pub fn assemble(
    input: TrainingInput,
    source: &dyn RecodedSource,
    layout: Layout,
    base_dir: Option<&Path>,
    max_sparse_values_per_block: Option<u64>,
    force_dense_mode: bool,
) -> Result<(AttributeSchema, BinarySliceSet, Vec<ChunkCostCalculator>)> {
    if input.target_stats_per_chunk.len() != layout.chunk_count() as usize
        || input.actual_symbol_per_chunk.len() != layout.chunk_count() as usize
    {
        return Err(Error::InvariantViolation(
            "per-chunk target statistics must have one entry per chunk in the layout".into(),
        ));
    }

    let attributes: Vec<Attribute> = input
        .attributes
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let index = i as u32;
            let (slice_index, relative_index) = layout.slice_of_attribute(index);
            let mut a = Attribute::new(
                index,
                p.native_name,
                p.recoded_name,
                p.prepared_name,
                p.preparation_catalogue_index,
                p.is_sparse,
                p.construction_cost,
                p.null_construction_cost,
                p.preparation_cost,
                p.level,
                p.ln_p_table,
                p.own_target_partition,
            );
            a.slice_index = slice_index;
            a.relative_index_within_slice = relative_index;
            a
        })
        .collect();
    let schema = AttributeSchema::new(attributes);

    let slice_set = BinarySliceSet::build(layout.clone(), source, base_dir, max_sparse_values_per_block, force_dense_mode)?;

    let global_n = layout.instance_count() as u64;
    let calculators = input
        .target_stats_per_chunk
        .into_iter()
        .zip(input.actual_symbol_per_chunk)
        .zip(layout.chunks())
        .map(|((stats, actual_symbol), chunk)| {
            ChunkCostCalculator::new(chunk.instance_count, global_n, stats, actual_symbol)
        })
        .collect();

    Ok((schema, slice_set, calculators))
}
