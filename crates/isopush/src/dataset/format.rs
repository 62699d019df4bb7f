//! On-disk dataset container.
//!
//! ```text
//! ┌──────────┬─────────────┬──────────────────┬────────────────────────────┬─────┐
//! │ "ISOD"   │ version u32 │ header_len u64   │ JSON header (header_len B) │ ... │
//! └──────────┴─────────────┴──────────────────┴────────────────────────────┴─────┘
//!                                                                          payload
//! ```
//!
//! Every array (and every unstructured geometry buffer) is an independently
//! addressed payload block, so a reader can seek to exactly the arrays it
//! was asked for. Scalars are little-endian `f32`, indices little-endian
//! `u32`.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};

use super::{Association, CellShape, Dataset, DatasetKind, Geometry, UniformGrid, UnstructuredMesh};
use crate::error::{IsoError, Result};

pub const MAGIC: [u8; 4] = *b"ISOD";
pub const VERSION: u32 = 1;

/// Fixed prefix before the JSON header.
pub const PREAMBLE_LEN: u64 = 16;

/// Per-block compression for stored arrays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockCompression {
  #[default]
  None,
  Zlib,
}

/// Location of one payload block, relative to the end of the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
  pub offset: u64,
  pub stored_len: u64,
  /// Number of 4-byte elements once decoded.
  pub count: u64,
  pub compression: BlockCompression,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeometryHeader {
  Grid(UniformGrid),
  Unstructured {
    points: BlockRef,
    cell_types: BlockRef,
    offsets: BlockRef,
    connectivity: BlockRef,
  },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayEntry {
  pub name: String,
  pub association: Association,
  pub block: BlockRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
  pub kind: DatasetKind,
  pub geometry: GeometryHeader,
  pub arrays: Vec<ArrayEntry>,
}

// =============================================================================
// Reading
// =============================================================================

/// Read the preamble and header, returning the header and the absolute
/// offset where the payload starts.
pub(crate) fn read_header(path: &Path, file: &mut File) -> Result<(Header, u64)> {
  let mut preamble = [0u8; PREAMBLE_LEN as usize];
  file
    .read_exact(&mut preamble)
    .map_err(|e| IsoError::io(path, e))?;

  if preamble[0..4] != MAGIC {
    return Err(IsoError::corrupt_dataset(path, "bad magic"));
  }
  let version = u32::from_le_bytes([preamble[4], preamble[5], preamble[6], preamble[7]]);
  if version != VERSION {
    return Err(IsoError::corrupt_dataset(
      path,
      format!("unsupported container version {version}"),
    ));
  }
  let mut len_bytes = [0u8; 8];
  len_bytes.copy_from_slice(&preamble[8..16]);
  let header_len = u64::from_le_bytes(len_bytes);
  let file_len = file_len(path, file)?;
  if header_len > file_len.saturating_sub(PREAMBLE_LEN) {
    return Err(IsoError::corrupt_dataset(
      path,
      format!("header length {header_len} exceeds file size {file_len}"),
    ));
  }

  let mut header_bytes = vec![0u8; header_len as usize];
  file
    .read_exact(&mut header_bytes)
    .map_err(|e| IsoError::io(path, e))?;
  let header: Header = serde_json::from_slice(&header_bytes)
    .map_err(|e| IsoError::corrupt_dataset(path, format!("header: {e}")))?;

  Ok((header, PREAMBLE_LEN + header_len))
}

/// Seek to and decode a single block. Returns the raw 4-byte words and the
/// number of bytes read from storage.
pub(crate) fn read_block(
  path: &Path,
  file: &mut File,
  payload_start: u64,
  block: &BlockRef,
) -> Result<(Vec<[u8; 4]>, u64)> {
  let file_len = file_len(path, file)?;
  let end = payload_start
    .checked_add(block.offset)
    .and_then(|start| start.checked_add(block.stored_len));
  if end.map_or(true, |end| end > file_len) {
    return Err(IsoError::corrupt_dataset(
      path,
      format!(
        "block at {} of {} bytes runs past the end of the file",
        block.offset, block.stored_len
      ),
    ));
  }
  let raw_len = block
    .count
    .checked_mul(4)
    .ok_or_else(|| IsoError::corrupt_dataset(path, "block element count overflows"))?;

  file
    .seek(SeekFrom::Start(payload_start + block.offset))
    .map_err(|e| IsoError::io(path, e))?;
  let mut stored = vec![0u8; block.stored_len as usize];
  file
    .read_exact(&mut stored)
    .map_err(|e| IsoError::io(path, e))?;

  let raw = match block.compression {
    BlockCompression::None => stored,
    BlockCompression::Zlib => {
      let mut raw = Vec::with_capacity(stored.len());
      ZlibDecoder::new(stored.as_slice())
        .take(raw_len + 1)
        .read_to_end(&mut raw)
        .map_err(|e| IsoError::corrupt_dataset(path, format!("zlib block: {e}")))?;
      raw
    }
  };

  if raw.len() as u64 != raw_len {
    return Err(IsoError::corrupt_dataset(
      path,
      format!("block holds {} bytes, expected {raw_len}", raw.len()),
    ));
  }

  let words = raw
    .chunks_exact(4)
    .map(|c| [c[0], c[1], c[2], c[3]])
    .collect();
  Ok((words, block.stored_len))
}

fn file_len(path: &Path, file: &File) -> Result<u64> {
  file
    .metadata()
    .map(|m| m.len())
    .map_err(|e| IsoError::io(path, e))
}

pub(crate) fn words_to_f32(words: Vec<[u8; 4]>) -> Vec<f32> {
  words.into_iter().map(f32::from_le_bytes).collect()
}

pub(crate) fn words_to_u32(words: Vec<[u8; 4]>) -> Vec<u32> {
  words.into_iter().map(u32::from_le_bytes).collect()
}

/// Rebuild unstructured geometry from its four blocks.
pub(crate) fn read_unstructured(
  path: &Path,
  file: &mut File,
  payload_start: u64,
  blocks: [&BlockRef; 4],
) -> Result<(UnstructuredMesh, u64)> {
  let [points_ref, types_ref, offsets_ref, conn_ref] = blocks;
  let (points, n0) = read_block(path, file, payload_start, points_ref)?;
  let (types, n1) = read_block(path, file, payload_start, types_ref)?;
  let (offsets, n2) = read_block(path, file, payload_start, offsets_ref)?;
  let (connectivity, n3) = read_block(path, file, payload_start, conn_ref)?;

  let coords = words_to_f32(points);
  if coords.len() % 3 != 0 {
    return Err(IsoError::corrupt_dataset(path, "point block is not xyz triples"));
  }
  let shapes = words_to_u32(types)
    .into_iter()
    .map(|code| {
      CellShape::from_type_code(code)
        .ok_or_else(|| IsoError::corrupt_dataset(path, format!("unsupported cell type {code}")))
    })
    .collect::<Result<Vec<_>>>()?;
  let offsets = words_to_u32(offsets);
  let connectivity = words_to_u32(connectivity);

  if offsets.len() != shapes.len() + 1 {
    return Err(IsoError::corrupt_dataset(path, "offset count does not match cell count"));
  }
  for (cell, shape) in shapes.iter().enumerate() {
    let span = offsets[cell + 1].checked_sub(offsets[cell]);
    if span != Some(shape.vertex_count() as u32) {
      return Err(IsoError::corrupt_dataset(path, format!("cell {cell} has a bad vertex span")));
    }
  }
  let point_count = coords.len() / 3;
  if offsets.last().copied() != Some(connectivity.len() as u32)
    || connectivity.iter().any(|&v| v as usize >= point_count)
  {
    return Err(IsoError::corrupt_dataset(path, "connectivity out of range"));
  }

  let mesh = UnstructuredMesh {
    points: coords.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
    shapes,
    offsets,
    connectivity,
  };
  Ok((mesh, n0 + n1 + n2 + n3))
}

// =============================================================================
// Writing
// =============================================================================

struct PayloadBuilder {
  bytes: Vec<u8>,
  compression: BlockCompression,
}

impl PayloadBuilder {
  fn push_words(&mut self, path: &Path, words: impl Iterator<Item = [u8; 4]>) -> Result<BlockRef> {
    let mut raw = Vec::new();
    let mut count = 0u64;
    for w in words {
      raw.extend_from_slice(&w);
      count += 1;
    }

    let stored = match self.compression {
      BlockCompression::None => raw,
      BlockCompression::Zlib => {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&raw).map_err(|e| IsoError::io(path, e))?;
        encoder.finish().map_err(|e| IsoError::io(path, e))?
      }
    };

    let block = BlockRef {
      offset: self.bytes.len() as u64,
      stored_len: stored.len() as u64,
      count,
      compression: self.compression,
    };
    self.bytes.extend_from_slice(&stored);
    Ok(block)
  }
}

/// Write a dataset container. The path suffix must match the dataset kind.
///
/// Returns the total number of bytes written.
pub fn write_dataset(
  path: impl AsRef<Path>,
  dataset: &Dataset,
  compression: BlockCompression,
) -> Result<u64> {
  let path = path.as_ref();
  let kind = DatasetKind::from_path(path)?;
  if kind != dataset.kind() {
    return Err(IsoError::corrupt_dataset(
      path,
      format!(
        "suffix .{} does not match a {:?} dataset",
        kind.suffix(),
        dataset.kind()
      ),
    ));
  }

  let mut payload = PayloadBuilder {
    bytes: Vec::new(),
    compression,
  };

  let geometry = match dataset.geometry() {
    Geometry::Grid(grid) => GeometryHeader::Grid(*grid),
    Geometry::Unstructured(mesh) => GeometryHeader::Unstructured {
      points: payload.push_words(
        path,
        mesh.points.iter().flatten().map(|c| c.to_le_bytes()),
      )?,
      cell_types: payload.push_words(
        path,
        mesh.shapes.iter().map(|s| s.type_code().to_le_bytes()),
      )?,
      offsets: payload.push_words(path, mesh.offsets.iter().map(|o| o.to_le_bytes()))?,
      connectivity: payload.push_words(
        path,
        mesh.connectivity.iter().map(|v| v.to_le_bytes()),
      )?,
    },
  };

  let mut arrays = Vec::with_capacity(dataset.fields().len());
  for field in dataset.fields() {
    let block = payload.push_words(path, field.values.iter().map(|v| v.to_le_bytes()))?;
    arrays.push(ArrayEntry {
      name: field.name.clone(),
      association: field.association,
      block,
    });
  }

  let header = Header {
    kind,
    geometry,
    arrays,
  };
  let header_bytes = serde_json::to_vec(&header)
    .map_err(|e| IsoError::corrupt_dataset(path, format!("header: {e}")))?;

  let file = File::create(path).map_err(|e| IsoError::io(path, e))?;
  let mut writer = BufWriter::new(file);
  let write = |writer: &mut BufWriter<File>| -> std::io::Result<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&(header_bytes.len() as u64).to_le_bytes())?;
    writer.write_all(&header_bytes)?;
    writer.write_all(&payload.bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()
  };
  write(&mut writer).map_err(|e| IsoError::io(path, e))?;

  Ok(PREAMBLE_LEN + header_bytes.len() as u64 + payload.bytes.len() as u64)
}
