//! Attribute schema and the randomised iterator used by the training driver
//! (spec §4.3).

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::attribute::{Attribute, AttributeIndex};

/// Stable index for each input, with lookup by native and recoded name.
#[derive(Debug)]
pub struct AttributeSchema {
    by_index: Vec<Attribute>,
    by_native_name: HashMap<String, AttributeIndex>,
    by_recoded_name: HashMap<String, AttributeIndex>,
}

impl AttributeSchema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        let mut by_native_name = HashMap::with_capacity(attributes.len());
        let mut by_recoded_name = HashMap::with_capacity(attributes.len());
        for a in &attributes {
            by_native_name.insert(a.native_name.clone(), a.index);
            by_recoded_name.insert(a.recoded_name.clone(), a.index);
        }
        Self { by_index: attributes, by_native_name, by_recoded_name }
    }

    pub fn len(&self) -> usize { self.by_index.len() }
    pub fn is_empty(&self) -> bool { self.by_index.is_empty() }

    pub fn get(&self, index: AttributeIndex) -> &Attribute { &self.by_index[index as usize] }

    pub fn by_native_name(&self, name: &str) -> Option<&Attribute> {
        self.by_native_name.get(name).map(|&i| self.get(i))
    }

    pub fn by_recoded_name(&self, name: &str) -> Option<&Attribute> {
        self.by_recoded_name.get(name).map(|&i| self.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> { self.by_index.iter() }

    pub fn as_slice(&self) -> &[Attribute] { &self.by_index }

    pub fn slice_count(&self) -> u32 {
        self.by_index.iter().map(|a| a.slice_index).max().map_or(0, |m| m + 1)
    }
}

/// Iterates attributes in shuffled order, one sub-vector per slice, so that
/// sequentially-used attributes stay in the same slice and reduce slice-load
/// churn (spec §4.3).
pub struct RandomizedAttributeIterator {
    /// `by_slice[s]` holds the stable indices of the attributes in slice `s`,
    /// in stable order initially, shuffled order after `shuffle()`.
    by_slice: Vec<Vec<AttributeIndex>>,
    rng: ChaCha8Rng,
}

impl RandomizedAttributeIterator {
    pub fn new(schema: &AttributeSchema, seed: u64) -> Self {
        let slice_count = schema.slice_count().max(1) as usize;
        let mut by_slice = vec![Vec::new(); slice_count];
        for a in schema.iter() {
            by_slice[a.slice_index as usize].push(a.index);
        }
        Self { by_slice, rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    /// Shuffles the slice order, then shuffles attributes within each slice.
    pub fn shuffle(&mut self) {
        self.by_slice.shuffle(&mut self.rng);
        for slice in &mut self.by_slice {
            slice.shuffle(&mut self.rng);
        }
    }

    /// Restores stable-index order (slice order by slice index, attributes
    /// within a slice by stable index).
    pub fn restore(&mut self) {
        self.by_slice.sort_by_key(|slice| slice.first().copied().unwrap_or(u32::MAX));
        for slice in &mut self.by_slice {
            slice.sort_unstable();
        }
    }

    /// Current iteration order, flattened across slices.
    pub fn order(&self) -> impl Iterator<Item = AttributeIndex> + '_ {
        self.by_slice.iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use crate::partition::{LogProbTable, TargetPartitionSpec};

    fn dummy_attribute(index: u32, slice: u32) -> Attribute {
        let mut a = Attribute::new(
            index,
            format!("native{index}"),
            format!("recoded{index}"),
            format!("prepared{index}"),
            0,
            false,
            0.0,
            0.0,
            0.0,
            0.0,
            LogProbTable::new(1, 1, vec![0.0]).unwrap(),
            TargetPartitionSpec::Singletons { symbol_count: 1 },
        );
        a.slice_index = slice;
        a
    }

    #[test]
    fn shuffle_then_restore_round_trips_to_stable_order() {
        let attrs: Vec<_> = (0..6).map(|i| dummy_attribute(i, i % 3)).collect();
        let schema = AttributeSchema::new(attrs);
        let mut it = RandomizedAttributeIterator::new(&schema, 42);
        it.shuffle();
        it.restore();
        let order: Vec<_> = it.order().collect();
        assert_eq!(order, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let attrs: Vec<_> = (0..10).map(|i| dummy_attribute(i, i % 4)).collect();
        let schema = AttributeSchema::new(attrs);
        let mut it = RandomizedAttributeIterator::new(&schema, 7);
        it.shuffle();
        let mut order: Vec<_> = it.order().collect();
        order.sort_unstable();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }
}
