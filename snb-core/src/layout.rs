//! Immutable chunk/slice layout (spec §3 "Layout").

/// One row band: `N` instances split into near-equal chunks, the first
/// `N mod C` chunks one instance larger than the rest.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSpec {
    pub instance_offset: u32,
    pub instance_count: u32,
}

/// One column band: `A` attributes split into near-equal slices analogously.
#[derive(Debug, Clone, Copy)]
pub struct SliceSpec {
    pub attribute_offset: u32,
    pub attribute_count: u32,
}

#[derive(Debug, Clone)]
pub struct Layout {
    instance_count: u32,
    attribute_count: u32,
    chunks: Vec<ChunkSpec>,
    slices: Vec<SliceSpec>,
}

fn near_equal_parts(total: u32, parts: u32) -> Vec<(u32, u32)> {
    let parts = parts.max(1);
    let base = total / parts;
    let remainder = total % parts;
    let mut offset = 0;
    let mut out = Vec::with_capacity(parts as usize);
    for i in 0..parts {
        let count = if i < remainder { base + 1 } else { base };
        out.push((offset, count));
        offset += count;
    }
    out
}

impl Layout {
    pub fn new(instance_count: u32, chunk_count: u32, attribute_count: u32, slice_count: u32) -> Self {
        let chunks = near_equal_parts(instance_count, chunk_count)
            .into_iter()
            .map(|(instance_offset, instance_count)| ChunkSpec { instance_offset, instance_count })
            .collect();
        let slices = near_equal_parts(attribute_count, slice_count)
            .into_iter()
            .map(|(attribute_offset, attribute_count)| SliceSpec { attribute_offset, attribute_count })
            .collect();
        Self { instance_count, attribute_count, chunks, slices }
    }

    pub fn instance_count(&self) -> u32 { self.instance_count }
    pub fn attribute_count(&self) -> u32 { self.attribute_count }
    pub fn chunk_count(&self) -> u32 { self.chunks.len() as u32 }
    pub fn slice_count(&self) -> u32 { self.slices.len() as u32 }
    pub fn chunk(&self, index: u32) -> ChunkSpec { self.chunks[index as usize] }
    pub fn slice(&self, index: u32) -> SliceSpec { self.slices[index as usize] }
    pub fn chunks(&self) -> &[ChunkSpec] { &self.chunks }
    pub fn slices(&self) -> &[SliceSpec] { &self.slices }

    /// `(slice_index, relative_index_within_slice)` for attribute `a`.
    pub fn slice_of_attribute(&self, attribute: u32) -> (u32, u32) {
        for (i, s) in self.slices.iter().enumerate() {
            if attribute >= s.attribute_offset && attribute < s.attribute_offset + s.attribute_count {
                return (i as u32, attribute - s.attribute_offset);
            }
        }
        panic!("attribute {attribute} out of range for layout with {} attributes", self.attribute_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_differ_by_at_most_one_and_first_remainder_are_larger() {
        let layout = Layout::new(17, 5, 4, 2);
        assert_eq!(layout.chunk_count(), 5);
        let counts: Vec<_> = layout.chunks().iter().map(|c| c.instance_count).collect();
        assert_eq!(counts, vec![4, 4, 3, 3, 3]);
        let total: u32 = counts.iter().sum();
        assert_eq!(total, 17);
        let offsets: Vec<_> = layout.chunks().iter().map(|c| c.instance_offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 11, 14]);
    }

    #[test]
    fn slice_of_attribute_is_consistent_with_slice_specs() {
        let layout = Layout::new(100, 1, 10, 3);
        for a in 0..10 {
            let (s, rel) = layout.slice_of_attribute(a);
            let spec = layout.slice(s);
            assert_eq!(spec.attribute_offset + rel, a);
        }
    }
}
