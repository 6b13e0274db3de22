//! Binary slice set (spec §3 "Column"/"Chunk buffer", §4.2).
//!
//! A recoded, chunk/slice partitioned matrix of part indices. When there is
//! a single slice the whole matrix is kept resident; otherwise each chunk is
//! spilled to its own binary chunk file and only one slice is resident per
//! chunk at a time (spec §4.2 "Read access").

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use binout::Serializer;
use tracing::trace;

use crate::attribute::AttributeIndex;
use crate::error::{Error, Result};
use crate::layout::Layout;

/// Serializer for `i32`, little-endian, fixed 4 bytes. `binout::AsIs` only
/// implements unsigned integers upstream; part indices need a sign (`-1`
/// means missing), so this mirrors that impl for `i32`.
#[derive(Clone, Copy)]
struct AsIsI32;

impl Serializer<i32> for AsIsI32 {
    const CONST_SIZE: Option<usize> = Some(4);
    #[inline]
    fn size(_val: i32) -> usize { 4 }
    fn write<W: std::io::Write + ?Sized>(output: &mut W, val: i32) -> std::io::Result<()> {
        output.write_all(&val.to_le_bytes())
    }
    fn read<R: std::io::Read + ?Sized>(input: &mut R) -> std::io::Result<i32> {
        let mut buf = [0u8; 4];
        input.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }
}

/// One attribute's recoded values for one chunk: dense (one entry per
/// instance, `-1` = missing) or sparse (present values only, as
/// `(instance_in_chunk, part_index)` pairs in strictly increasing instance
/// order).
#[derive(Debug, Clone)]
pub enum Column {
    Dense(Box<[i32]>),
    /// Flat, even-length buffer alternating `instance_in_chunk, part_index`.
    Sparse(Box<[i32]>),
}

impl Column {
    pub fn dense(instance_count: u32, values: Vec<i32>) -> Result<Self> {
        if values.len() != instance_count as usize {
            return Err(Error::InvariantViolation(format!(
                "dense column has {} entries, expected {instance_count}",
                values.len()
            )));
        }
        Ok(Self::Dense(values.into_boxed_slice()))
    }

    /// `pairs` are `(instance_in_chunk, part_index)`, 0-based, strictly increasing by instance.
    pub fn sparse(pairs: &[(u32, u32)]) -> Result<Self> {
        if !pairs.windows(2).all(|w| w[0].0 < w[1].0) {
            return Err(Error::InvariantViolation("sparse column instance indices not strictly increasing".into()));
        }
        let mut flat = Vec::with_capacity(pairs.len() * 2);
        for &(instance, part) in pairs {
            flat.push(instance as i32);
            flat.push(part as i32);
        }
        Ok(Self::Sparse(flat.into_boxed_slice()))
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Dense(_) => ColumnKind::Dense,
            Self::Sparse(_) => ColumnKind::Sparse,
        }
    }

    /// Number of `i32` words this column occupies in a chunk file.
    pub fn int_len(&self) -> usize {
        match self {
            Self::Dense(v) => v.len(),
            Self::Sparse(v) => v.len(),
        }
    }

    pub fn present_count(&self) -> usize {
        match self {
            Self::Dense(v) => v.iter().filter(|&&x| x >= 0).count(),
            Self::Sparse(v) => v.len() / 2,
        }
    }

    /// Value for `instance_in_chunk`, or `None` if missing.
    pub fn get(&self, instance_in_chunk: u32) -> Option<i32> {
        match self {
            Self::Dense(v) => {
                let x = v[instance_in_chunk as usize];
                (x >= 0).then_some(x)
            }
            Self::Sparse(v) => {
                let mut lo = 0usize;
                let mut hi = v.len() / 2;
                while lo < hi {
                    let mid = (lo + hi) / 2;
                    let inst = v[mid * 2] as u32;
                    if inst < instance_in_chunk {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                if lo < v.len() / 2 && v[lo * 2] as u32 == instance_in_chunk {
                    Some(v[lo * 2 + 1])
                } else {
                    None
                }
            }
        }
    }

    /// Iterates `(instance_in_chunk, part_index)` for present values, in
    /// strictly increasing instance order, for both dense and sparse columns.
    pub fn present_iter(&self) -> Box<dyn Iterator<Item = (u32, i32)> + '_> {
        match self {
            Self::Dense(v) => Box::new(
                v.iter().enumerate().filter(|&(_, &x)| x >= 0).map(|(i, &x)| (i as u32, x)),
            ),
            Self::Sparse(v) => Box::new(v.chunks_exact(2).map(|c| (c[0] as u32, c[1]))),
        }
    }

    fn write_ints<W: Write>(&self, out: &mut W) -> Result<()> {
        let ints: &[i32] = match self {
            Self::Dense(v) => v,
            Self::Sparse(v) => v,
        };
        for &i in ints {
            AsIsI32::write(out, i)?;
        }
        Ok(())
    }

    fn read_dense<R: Read>(input: &mut R, instance_count: u32) -> Result<Self> {
        let mut values = Vec::with_capacity(instance_count as usize);
        for _ in 0..instance_count {
            values.push(AsIsI32::read(input)?);
        }
        Ok(Self::Dense(values.into_boxed_slice()))
    }

    fn read_sparse<R: Read>(input: &mut R, int_len: usize) -> Result<Self> {
        let mut values = Vec::with_capacity(int_len);
        for _ in 0..int_len {
            values.push(AsIsI32::read(input)?);
        }
        Ok(Self::Sparse(values.into_boxed_slice()))
    }
}

/// What kind of column each attribute produces; decided once per attribute
/// (spec §6 `force_dense_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Dense,
    Sparse,
}

/// Abstraction of the (out-of-scope) preparation stage: supplies the
/// recoded column for one attribute within one chunk.
pub trait RecodedSource: Sync {
    /// Dense column: one signed part index per instance in the chunk (`-1` = missing).
    fn dense_column(&self, chunk: u32, attribute: AttributeIndex) -> Result<Vec<i32>>;

    /// Sparse column: present values only, as `(instance_in_chunk, 1_based_part_index)`
    /// pairs in any order (the slice set sorts and re-bases them to 0).
    fn sparse_column(&self, chunk: u32, attribute: AttributeIndex) -> Result<Vec<(u32, u32)>>;

    fn column_kind(&self, attribute: AttributeIndex) -> ColumnKind;
}

/// Per-slice byte range plus, per attribute in that slice, its `(kind, int_len)`,
/// the physical layout spec §4.2 requires to navigate the chunk file.
#[derive(Debug)]
struct PhysicalLayout {
    slice_byte_ranges: Vec<(u64, u64)>,
    /// `column_specs[slice][relative_index] = (kind, int_len)`
    column_specs: Vec<Vec<(ColumnKind, usize)>>,
}

/// The slab of columns for one chunk: resident in memory when there is a
/// single slice, otherwise spilled to a binary chunk file with one slice
/// resident at a time.
#[derive(Debug)]
pub struct ChunkBuffer {
    chunk_index: u32,
    instance_count: u32,
    file_path: Option<PathBuf>,
    physical: Option<PhysicalLayout>,
    resident_slice: Option<u32>,
    /// columns of the resident slice, ordered by relative index within the slice.
    columns: Vec<Column>,
}

impl ChunkBuffer {
    /// Builds the chunk buffer for `chunk_index`, reading one slice at a
    /// time from `source`. When `layout.slice_count() > 1` the slab is
    /// serialised to `base_dir/chunk_{chunk_index}.bin`.
    pub fn build(
        chunk_index: u32,
        layout: &Layout,
        source: &dyn RecodedSource,
        base_dir: Option<&Path>,
        max_sparse_values_per_block: Option<u64>,
        force_dense_mode: bool,
    ) -> Result<Self> {
        let chunk = layout.chunk(chunk_index);
        let slice_count = layout.slice_count();

        if slice_count <= 1 {
            let slice = layout.slice(0);
            let columns = Self::build_slice_columns(
                chunk_index,
                chunk.instance_count,
                slice.attribute_offset,
                slice.attribute_count,
                source,
                max_sparse_values_per_block,
                force_dense_mode,
            )?;
            return Ok(Self {
                chunk_index,
                instance_count: chunk.instance_count,
                file_path: None,
                physical: None,
                resident_slice: Some(0),
                columns,
            });
        }

        let base_dir = base_dir
            .ok_or_else(|| Error::InvariantViolation("base_dir required when slice_count > 1".into()))?;
        let path = base_dir.join(format!("chunk_{chunk_index}.bin"));
        let mut file = File::create(&path)?;
        let mut slice_byte_ranges = Vec::with_capacity(slice_count as usize);
        let mut column_specs = Vec::with_capacity(slice_count as usize);
        let mut offset = 0u64;

        for s in 0..slice_count {
            let slice = layout.slice(s);
            let result = Self::build_slice_columns(
                chunk_index,
                chunk.instance_count,
                slice.attribute_offset,
                slice.attribute_count,
                source,
                max_sparse_values_per_block,
                force_dense_mode,
            );
            let columns = match result {
                Ok(c) => c,
                Err(e) => {
                    drop(file);
                    let _ = std::fs::remove_file(&path);
                    return Err(e);
                }
            };
            let mut block_size = 0u64;
            let mut specs = Vec::with_capacity(columns.len());
            for col in &columns {
                if let Err(e) = col.write_ints(&mut file) {
                    drop(file);
                    let _ = std::fs::remove_file(&path);
                    return Err(e);
                }
                block_size += (col.int_len() * 4) as u64;
                specs.push((col.kind(), col.int_len()));
            }
            slice_byte_ranges.push((offset, block_size));
            column_specs.push(specs);
            offset += block_size;
        }
        file.flush()?;
        drop(file);

        let actual_size = std::fs::metadata(&path)?.len();
        let expected_size: u64 = slice_byte_ranges.iter().map(|&(_, size)| size).sum();
        if actual_size != expected_size {
            return Err(Error::IoCorruption(format!(
                "chunk file {path:?} has {actual_size} bytes, expected {expected_size}"
            )));
        }

        Ok(Self {
            chunk_index,
            instance_count: chunk.instance_count,
            file_path: Some(path),
            physical: Some(PhysicalLayout { slice_byte_ranges, column_specs }),
            resident_slice: None,
            columns: Vec::new(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_slice_columns(
        chunk_index: u32,
        instance_count: u32,
        attribute_offset: u32,
        attribute_count: u32,
        source: &dyn RecodedSource,
        max_sparse_values_per_block: Option<u64>,
        force_dense_mode: bool,
    ) -> Result<Vec<Column>> {
        let mut columns = Vec::with_capacity(attribute_count as usize);
        let mut sparse_pairs_in_block: u64 = 0;
        let mut overflowed = false;

        for rel in 0..attribute_count {
            let attribute = attribute_offset + rel;
            let use_sparse = !force_dense_mode && source.column_kind(attribute) == ColumnKind::Sparse;
            if use_sparse {
                let mut pairs = source.sparse_column(chunk_index, attribute)?;
                pairs.sort_unstable_by_key(|&(i, _)| i);
                sparse_pairs_in_block += pairs.len() as u64;
                if let Some(budget) = max_sparse_values_per_block {
                    if sparse_pairs_in_block > budget {
                        overflowed = true;
                        continue;
                    }
                }
                let rebased: Vec<(u32, u32)> = pairs.into_iter().map(|(i, p)| (i, p - 1)).collect();
                columns.push(Column::sparse(&rebased)?);
            } else {
                let values = source.dense_column(chunk_index, attribute)?;
                columns.push(Column::dense(instance_count, values)?);
            }
        }

        if overflowed {
            let budget = max_sparse_values_per_block.unwrap_or(0);
            let requested = sparse_pairs_in_block * 2 * 4; // two i32 per pair, 4 bytes per i32
            return Err(Error::MemoryExhausted {
                requested_bytes: requested,
                budget_bytes: budget * 2 * 4,
                context: "sparse block ingestion",
            });
        }
        Ok(columns)
    }

    /// Returns the column for `attribute`, loading its slice from disk if necessary.
    pub fn get_column(&mut self, layout: &Layout, attribute: AttributeIndex) -> Result<&Column> {
        let (slice_index, relative_index) = layout.slice_of_attribute(attribute);
        if self.resident_slice != Some(slice_index) {
            self.load_slice(slice_index)?;
        }
        Ok(&self.columns[relative_index as usize])
    }

    fn load_slice(&mut self, slice_index: u32) -> Result<()> {
        let path = self.file_path.as_ref().ok_or_else(|| {
            Error::InvariantViolation("load_slice called on an in-memory (single-slice) chunk buffer".into())
        })?;
        let physical = self.physical.as_ref().expect("physical layout present whenever file_path is");
        let (offset, size) = physical.slice_byte_ranges[slice_index as usize];
        let specs = &physical.column_specs[slice_index as usize];

        trace!(chunk = self.chunk_index, slice = slice_index, offset, size, "loading slice from chunk file");

        let mut file = OpenOptions::new().read(true).open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        file.read_exact(&mut buf).map_err(|e| {
            Error::IoCorruption(format!("short read of slice {slice_index} in {path:?}: {e}"))
        })?;

        let mut cursor = std::io::Cursor::new(buf);
        let mut columns = Vec::with_capacity(specs.len());
        for &(kind, int_len) in specs {
            columns.push(match kind {
                ColumnKind::Dense => Column::read_dense(&mut cursor, self.instance_count)?,
                ColumnKind::Sparse => Column::read_sparse(&mut cursor, int_len)?,
            });
        }

        self.columns = columns;
        self.resident_slice = Some(slice_index);
        Ok(())
    }
}

/// The recoded dataset: `C` chunks, each holding its own (possibly
/// file-backed) [`ChunkBuffer`] (spec §3 "Layout", §4.2).
#[derive(Debug)]
pub struct BinarySliceSet {
    layout: Layout,
    chunks: Vec<ChunkBuffer>,
}

impl BinarySliceSet {
    /// Builds the full slice set by having each chunk's worker read the
    /// prepared data one slice at a time (spec §4.2 "Construction").
    pub fn build(
        layout: Layout,
        source: &dyn RecodedSource,
        base_dir: Option<&Path>,
        max_sparse_values_per_block: Option<u64>,
        force_dense_mode: bool,
    ) -> Result<Self> {
        use rayon::prelude::*;

        let chunks: Result<Vec<ChunkBuffer>> = (0..layout.chunk_count())
            .into_par_iter()
            .map(|c| ChunkBuffer::build(c, &layout, source, base_dir, max_sparse_values_per_block, force_dense_mode))
            .collect();
        Ok(Self { layout, chunks: chunks? })
    }

    pub fn layout(&self) -> &Layout { &self.layout }

    pub fn chunk(&self, index: u32) -> &ChunkBuffer { &self.chunks[index as usize] }
    pub fn chunk_mut(&mut self, index: u32) -> &mut ChunkBuffer { &mut self.chunks[index as usize] }
    pub fn chunks_mut(&mut self) -> &mut [ChunkBuffer] { &mut self.chunks }

    pub fn get_column(&mut self, chunk: u32, attribute: AttributeIndex) -> Result<&Column> {
        let layout = self.layout.clone();
        self.chunks[chunk as usize].get_column(&layout, attribute)
    }
}
