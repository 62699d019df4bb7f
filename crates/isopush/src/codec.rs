//! Mesh transfer units.
//!
//! Each `encode` call produces one complete, self-contained unit:
//!
//! ```text
//! offset  size  field
//! ──────  ────  ─────────────────────────────────────────
//!      0     4  magic "ISOM"
//!      4     1  version (1)
//!      5     1  compression (0 = none, 1 = zlib, 2 = lz4)
//!      6     2  reserved
//!      8     8  point count            (u64 LE)
//!     16     8  triangle count         (u64 LE)
//!     24     8  raw payload length     (u64 LE)
//!     32     8  stored payload length  (u64 LE)
//!     40     …  payload: points as f32 LE xyz, then triangles as u32 LE
//! ```
//!
//! An executor that cannot produce a mesh publishes a failure unit instead:
//! magic `"ISOF"`, a `u32` LE length and a UTF-8 message. Decoding one yields
//! [`IsoError::ExecutorFailure`].

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{IsoError, Result};
use crate::mesh::IsosurfaceMesh;

pub const MESH_MAGIC: [u8; 4] = *b"ISOM";
pub const FAILURE_MAGIC: [u8; 4] = *b"ISOF";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 40;

/// Upper bound on how far one lz4 block can expand.
const LZ4_MAX_RATIO: usize = 255;

/// Payload compression applied to a transfer unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
  #[default]
  None,
  Zlib,
  Lz4,
}

impl CompressionMode {
  pub const ALL: [CompressionMode; 3] = [
    CompressionMode::None,
    CompressionMode::Zlib,
    CompressionMode::Lz4,
  ];

  /// Wire code used in command files and unit headers.
  pub fn code(self) -> u8 {
    match self {
      CompressionMode::None => 0,
      CompressionMode::Zlib => 1,
      CompressionMode::Lz4 => 2,
    }
  }

  pub fn from_code(code: u8) -> Option<Self> {
    match code {
      0 => Some(CompressionMode::None),
      1 => Some(CompressionMode::Zlib),
      2 => Some(CompressionMode::Lz4),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      CompressionMode::None => "none",
      CompressionMode::Zlib => "zlib",
      CompressionMode::Lz4 => "lz4",
    }
  }
}

// =============================================================================
// Encode
// =============================================================================

/// Serialize `mesh` into one transfer unit.
pub fn encode(mesh: &IsosurfaceMesh, mode: CompressionMode) -> Result<Vec<u8>> {
  let mut raw = Vec::with_capacity(mesh.payload_bytes());
  for p in &mesh.points {
    for c in p {
      raw.extend_from_slice(&c.to_le_bytes());
    }
  }
  for t in &mesh.triangles {
    for i in t {
      raw.extend_from_slice(&i.to_le_bytes());
    }
  }

  let raw_len = raw.len();
  let payload = match mode {
    CompressionMode::None => raw,
    CompressionMode::Zlib => {
      let zlib_err = |e: std::io::Error| IsoError::corrupt_mesh(format!("zlib encode: {e}"));
      let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
      encoder.write_all(&raw).map_err(zlib_err)?;
      encoder.finish().map_err(zlib_err)?
    }
    CompressionMode::Lz4 => lz4_flex::block::compress(&raw),
  };

  let mut unit = Vec::with_capacity(HEADER_LEN + payload.len());
  unit.extend_from_slice(&MESH_MAGIC);
  unit.push(VERSION);
  unit.push(mode.code());
  unit.extend_from_slice(&[0, 0]);
  unit.extend_from_slice(&(mesh.points.len() as u64).to_le_bytes());
  unit.extend_from_slice(&(mesh.triangles.len() as u64).to_le_bytes());
  unit.extend_from_slice(&(raw_len as u64).to_le_bytes());
  unit.extend_from_slice(&(payload.len() as u64).to_le_bytes());
  unit.extend_from_slice(&payload);
  Ok(unit)
}

/// Failure unit carrying `message`.
pub fn encode_failure(message: &str) -> Vec<u8> {
  let mut unit = Vec::with_capacity(8 + message.len());
  unit.extend_from_slice(&FAILURE_MAGIC);
  unit.extend_from_slice(&(message.len() as u32).to_le_bytes());
  unit.extend_from_slice(message.as_bytes());
  unit
}

// =============================================================================
// Decode
// =============================================================================

/// Parse a transfer unit back into a mesh.
pub fn decode(bytes: &[u8]) -> Result<IsosurfaceMesh> {
  if bytes.len() < 4 {
    return Err(IsoError::corrupt_mesh(format!(
      "unit is {} bytes, too short for a magic",
      bytes.len()
    )));
  }
  let magic: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
  match magic {
    FAILURE_MAGIC => Err(decode_failure(bytes)),
    MESH_MAGIC => decode_mesh(bytes),
    other => Err(IsoError::corrupt_mesh(format!("bad magic {other:?}"))),
  }
}

/// Compression mode recorded in a mesh unit header.
pub fn peek_mode(bytes: &[u8]) -> Option<CompressionMode> {
  if bytes.len() < HEADER_LEN || bytes[..4] != MESH_MAGIC {
    return None;
  }
  CompressionMode::from_code(bytes[5])
}

fn decode_failure(bytes: &[u8]) -> IsoError {
  let Some(len) = read_u32(bytes, 4) else {
    return IsoError::corrupt_mesh("truncated failure unit");
  };
  let body = &bytes[8..];
  if body.len() != len as usize {
    return IsoError::corrupt_mesh(format!(
      "failure message is {} bytes, header says {len}",
      body.len()
    ));
  }
  IsoError::ExecutorFailure {
    message: String::from_utf8_lossy(body).into_owned(),
  }
}

fn decode_mesh(bytes: &[u8]) -> Result<IsosurfaceMesh> {
  if bytes.len() < HEADER_LEN {
    return Err(IsoError::corrupt_mesh("truncated header"));
  }
  if bytes[4] != VERSION {
    return Err(IsoError::corrupt_mesh(format!("unsupported version {}", bytes[4])));
  }
  let mode = CompressionMode::from_code(bytes[5])
    .ok_or_else(|| IsoError::corrupt_mesh(format!("unknown compression code {}", bytes[5])))?;

  let header_u64 = |offset| {
    read_u64(bytes, offset).ok_or_else(|| IsoError::corrupt_mesh("truncated header"))
  };
  let point_count = header_u64(8)? as usize;
  let triangle_count = header_u64(16)? as usize;
  let raw_len = header_u64(24)? as usize;
  let payload_len = header_u64(32)? as usize;

  let expected_raw = point_count
    .checked_add(triangle_count)
    .and_then(|n| n.checked_mul(12))
    .ok_or_else(|| IsoError::corrupt_mesh("element counts overflow"))?;
  if raw_len != expected_raw {
    return Err(IsoError::corrupt_mesh(format!(
      "raw length {raw_len} does not match {point_count} points and {triangle_count} triangles"
    )));
  }

  let payload = &bytes[HEADER_LEN..];
  if payload.len() != payload_len {
    return Err(IsoError::corrupt_mesh(format!(
      "payload is {} bytes, header says {payload_len}",
      payload.len()
    )));
  }

  // lz4 cannot expand a block by more than 255x.
  if mode == CompressionMode::Lz4 && raw_len > payload.len().saturating_mul(LZ4_MAX_RATIO) {
    return Err(IsoError::corrupt_mesh(format!(
      "raw length {raw_len} is impossible for a {} byte lz4 payload",
      payload.len()
    )));
  }

  let raw = match mode {
    CompressionMode::None => payload.to_vec(),
    CompressionMode::Zlib => {
      let mut out = Vec::with_capacity(payload.len());
      flate2::read::ZlibDecoder::new(payload)
        .take(raw_len as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| IsoError::corrupt_mesh(format!("zlib decode: {e}")))?;
      out
    }
    CompressionMode::Lz4 => lz4_flex::block::decompress(payload, raw_len)
      .map_err(|e| IsoError::corrupt_mesh(format!("lz4 decode: {e}")))?,
  };
  if raw.len() != raw_len {
    return Err(IsoError::corrupt_mesh(format!(
      "decompressed {} bytes, expected {raw_len}",
      raw.len()
    )));
  }

  let (point_bytes, triangle_bytes) = raw.split_at(point_count * 12);
  let points = point_bytes
    .chunks_exact(12)
    .map(|c| {
      [
        f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
        f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
        f32::from_le_bytes([c[8], c[9], c[10], c[11]]),
      ]
    })
    .collect();
  let triangles: Vec<[u32; 3]> = triangle_bytes
    .chunks_exact(12)
    .map(|c| {
      [
        u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
        u32::from_le_bytes([c[4], c[5], c[6], c[7]]),
        u32::from_le_bytes([c[8], c[9], c[10], c[11]]),
      ]
    })
    .collect();

  if let Some(bad) = triangles
    .iter()
    .flatten()
    .find(|&&i| i as usize >= point_count)
  {
    return Err(IsoError::corrupt_mesh(format!(
      "triangle references point {bad} of {point_count}"
    )));
  }

  Ok(IsosurfaceMesh { points, triangles })
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
  let b = bytes.get(offset..offset + 4)?;
  Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline]
fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
  let b = bytes.get(offset..offset + 8)?;
  let mut word = [0u8; 8];
  word.copy_from_slice(b);
  Some(u64::from_le_bytes(word))
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
