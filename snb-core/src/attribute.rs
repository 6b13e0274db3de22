//! Input variable (attribute) records (spec §3 "Input variable (attribute)").

use crate::partition::{LogProbTable, TargetPartitionSpec};

/// Stable index of an attribute in `[0, A)`.
pub type AttributeIndex = u32;

/// One input variable after preparation.
///
/// Carries its stable identity, the three cost scalars used by the prior
/// (spec §4.6), the sparse flag that decides column encoding (spec §3
/// "Column"), and the conditional log-probability table plus the
/// attribute-specific target-partition shape it was estimated against
/// (spec §3 "Target partition (per variable)").
#[derive(Debug, Clone)]
pub struct Attribute {
    pub index: AttributeIndex,
    pub native_name: String,
    pub recoded_name: String,
    pub prepared_name: String,
    /// Index into the (out-of-scope) preparation catalogue.
    pub preparation_catalogue_index: u32,
    pub is_sparse: bool,
    pub construction_cost: f64,
    pub null_construction_cost: f64,
    pub preparation_cost: f64,
    pub level: f64,
    pub slice_index: u32,
    pub relative_index_within_slice: u32,
    ln_p: LogProbTable,
    own_target_partition: TargetPartitionSpec,
}

impl Attribute {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: AttributeIndex,
        native_name: impl Into<String>,
        recoded_name: impl Into<String>,
        prepared_name: impl Into<String>,
        preparation_catalogue_index: u32,
        is_sparse: bool,
        construction_cost: f64,
        null_construction_cost: f64,
        preparation_cost: f64,
        level: f64,
        ln_p: LogProbTable,
        own_target_partition: TargetPartitionSpec,
    ) -> Self {
        Self {
            index,
            native_name: native_name.into(),
            recoded_name: recoded_name.into(),
            prepared_name: prepared_name.into(),
            preparation_catalogue_index,
            is_sparse,
            construction_cost,
            null_construction_cost,
            preparation_cost,
            level,
            slice_index: 0,
            relative_index_within_slice: 0,
            ln_p,
            own_target_partition,
        }
    }

    #[inline]
    pub fn ln_p(&self, source_part: u32, own_target_part: u32) -> f64 {
        self.ln_p.ln_p(source_part, own_target_part)
    }

    pub fn ln_p_table(&self) -> &LogProbTable { &self.ln_p }

    pub fn own_target_partition(&self) -> &TargetPartitionSpec { &self.own_target_partition }

    /// Maps a raw target value (symbol id, or instance rank for regression)
    /// to this attribute's own target-partition index: the `matching(k)`
    /// function of spec §4.5, evaluated at a representative raw value of
    /// global target part `k`.
    #[inline]
    pub fn matching(&self, representative_raw_target_value: u32) -> u32 {
        self.own_target_partition.part_index(representative_raw_target_value)
    }
}
