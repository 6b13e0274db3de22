//! Partition primitives (spec §3 "Target partition (per variable)", §4.1).
//!
//! Every input variable (attribute) owns one of three target-partition
//! shapes against which its conditional log-probability table was
//! estimated during preparation (out of scope here). `part_index` maps a
//! raw target value (a symbol id for classification/grouped tasks, or an
//! instance rank for regression) to the index of the part it falls in.

use crate::error::{Error, Result};

/// One of the three target-partition shapes a variable can be prepared against.
#[derive(Debug, Clone)]
pub enum TargetPartitionSpec {
    /// Classification with un-grouped target: part index = symbol index.
    Singletons { symbol_count: u32 },

    /// Regression: strictly increasing cumulative-frequency bounds over
    /// instance ranks. `bounds[i]` is the exclusive upper rank bound of
    /// part `i`; `bounds` must end with the total instance count.
    Intervals { bounds: Vec<u32> },

    /// Generalised classification: each symbol maps to a group; one group
    /// may be `default` and absorbs symbols not explicitly enumerated.
    Groups {
        group_of_symbol: Vec<u32>,
        default_group: Option<u32>,
        group_count: u32,
    },
}

impl TargetPartitionSpec {
    /// Number of parts in this partition.
    pub fn part_count(&self) -> u32 {
        match self {
            Self::Singletons { symbol_count } => *symbol_count,
            Self::Intervals { bounds } => bounds.len() as u32,
            Self::Groups { group_count, .. } => *group_count,
        }
    }

    /// Maps a raw target value (symbol id, or rank for regression) to its part index.
    ///
    /// For interval partitions a dichotomic search over `bounds` is used;
    /// a value equal to a bound falls into the lower-indexed part (spec §4.1).
    pub fn part_index(&self, raw_value: u32) -> u32 {
        match self {
            Self::Singletons { .. } => raw_value,
            Self::Intervals { bounds } => {
                // bounds[i] is the exclusive upper bound of part i; find the
                // first bound strictly greater than raw_value.
                let mut lo = 0usize;
                let mut hi = bounds.len();
                while lo < hi {
                    let mid = (lo + hi) / 2;
                    if bounds[mid] <= raw_value {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                lo.min(bounds.len().saturating_sub(1)) as u32
            }
            Self::Groups { group_of_symbol, default_group, .. } => {
                group_of_symbol
                    .get(raw_value as usize)
                    .copied()
                    .or(*default_group)
                    .expect("symbol not in any group and no default group present")
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Singletons { symbol_count } => {
                if *symbol_count == 0 {
                    return Err(Error::InvariantViolation("singleton partition with zero symbols".into()));
                }
            }
            Self::Intervals { bounds } => {
                if bounds.is_empty() {
                    return Err(Error::InvariantViolation("interval partition with no bounds".into()));
                }
                if !bounds.windows(2).all(|w| w[0] < w[1]) {
                    return Err(Error::InvariantViolation("interval bounds not strictly increasing".into()));
                }
            }
            Self::Groups { group_of_symbol, default_group, group_count } => {
                if group_of_symbol.iter().any(|g| *g >= *group_count)
                    || default_group.is_some_and(|g| g >= *group_count)
                {
                    return Err(Error::InvariantViolation("group index out of range".into()));
                }
            }
        }
        Ok(())
    }
}

/// Conditional log-probability table `LnP[s, t]`, materialised once at load
/// from the prepared grid (spec §4.1). `s` indexes the variable's own
/// source partition, `t` its own target partition.
#[derive(Debug, Clone)]
pub struct LogProbTable {
    source_parts: usize,
    target_parts: usize,
    data: Box<[f64]>,
}

impl LogProbTable {
    /// Numerical tolerance for the "rows sum to one" invariant.
    pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

    pub fn new(source_parts: usize, target_parts: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != source_parts * target_parts {
            return Err(Error::InvariantViolation(format!(
                "LnP table size {} does not match {source_parts} x {target_parts}",
                data.len()
            )));
        }
        let table = Self { source_parts, target_parts, data: data.into_boxed_slice() };
        table.check_rows_sum_to_one()?;
        Ok(table)
    }

    fn check_rows_sum_to_one(&self) -> Result<()> {
        for s in 0..self.source_parts {
            let row_sum: f64 = (0..self.target_parts).map(|t| self.ln_p(s as u32, t as u32).exp()).sum();
            if (row_sum - 1.0).abs() > Self::ROW_SUM_TOLERANCE {
                return Err(Error::InvariantViolation(format!(
                    "LnP row {s} sums to {row_sum}, expected 1.0 within {}",
                    Self::ROW_SUM_TOLERANCE
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn ln_p(&self, s: u32, t: u32) -> f64 {
        self.data[s as usize * self.target_parts + t as usize]
    }

    pub fn source_parts(&self) -> usize { self.source_parts }
    pub fn target_parts(&self) -> usize { self.target_parts }
}
