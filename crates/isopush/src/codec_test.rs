use super::*;
use crate::contour;
use crate::pipeline::test_utils::*;
use crate::thresholds::FieldThresholdTable;

fn realistic_mesh() -> IsosurfaceMesh {
  let spec = FieldThresholdTable::asteroid().spec("v03").unwrap();
  contour::extract(&asteroid_grid(24), &spec).unwrap()
}

#[test]
fn test_roundtrip_every_mode() {
  let mesh = realistic_mesh();
  assert!(!mesh.is_empty());
  for mode in CompressionMode::ALL {
    let unit = encode(&mesh, mode).unwrap();
    assert_eq!(peek_mode(&unit), Some(mode));
    assert_eq!(decode(&unit).unwrap(), mesh, "{mode:?}");
  }
}

#[test]
fn test_empty_mesh_roundtrip() {
  for mode in CompressionMode::ALL {
    let unit = encode(&IsosurfaceMesh::new(), mode).unwrap();
    assert!(decode(&unit).unwrap().is_empty());
  }
}

#[test]
fn test_uncompressed_size_is_header_plus_payload() {
  let mesh = tetra_surface();
  let unit = encode(&mesh, CompressionMode::None).unwrap();
  assert_eq!(unit.len(), HEADER_LEN + mesh.payload_bytes());
}

#[test]
fn test_compressed_not_larger_on_realistic_data() {
  let mesh = realistic_mesh();
  let none = encode(&mesh, CompressionMode::None).unwrap().len();
  let zlib = encode(&mesh, CompressionMode::Zlib).unwrap().len();
  let lz4 = encode(&mesh, CompressionMode::Lz4).unwrap().len();
  assert!(zlib <= none, "zlib {zlib} > none {none}");
  assert!(lz4 <= none, "lz4 {lz4} > none {none}");
}

#[test]
fn test_mode_codes() {
  for mode in CompressionMode::ALL {
    assert_eq!(CompressionMode::from_code(mode.code()), Some(mode));
  }
  assert_eq!(CompressionMode::Zlib.code(), 1);
  assert_eq!(CompressionMode::from_code(3), None);
}

#[test]
fn test_failure_unit_decodes_to_executor_failure() {
  let unit = encode_failure("unsupported dataset kind for /data/run1.xyz");
  let err = decode(&unit).unwrap_err();
  match err {
    IsoError::ExecutorFailure { message } => assert!(message.contains("run1.xyz")),
    other => panic!("unexpected {other:?}"),
  }
  assert_eq!(peek_mode(&unit), None);
}

#[test]
fn test_bad_magic_is_corrupt() {
  let mut unit = encode(&tetra_surface(), CompressionMode::None).unwrap();
  unit[0] = b'X';
  assert!(matches!(decode(&unit), Err(IsoError::CorruptMesh { .. })));
  assert!(matches!(decode(b"IS"), Err(IsoError::CorruptMesh { .. })));
  assert!(matches!(decode(&[]), Err(IsoError::CorruptMesh { .. })));
}

#[test]
fn test_truncated_unit_is_corrupt() {
  for mode in CompressionMode::ALL {
    let unit = encode(&tetra_surface(), mode).unwrap();
    let err = decode(&unit[..unit.len() - 3]).unwrap_err();
    assert!(matches!(err, IsoError::CorruptMesh { .. }), "{mode:?}: {err}");
  }
}

#[test]
fn test_out_of_range_index_is_corrupt() {
  let mut mesh = tetra_surface();
  mesh.triangles.push([0, 1, 9]);
  let unit = encode(&mesh, CompressionMode::None).unwrap();
  assert!(matches!(decode(&unit), Err(IsoError::CorruptMesh { .. })));
}

#[test]
fn test_oversized_counts_are_corrupt_not_allocated() {
  let points: u64 = 1 << 40;
  for mode in CompressionMode::ALL {
    let mut unit = encode(&tetra_surface(), mode).unwrap();
    unit[8..16].copy_from_slice(&points.to_le_bytes());
    unit[16..24].copy_from_slice(&0u64.to_le_bytes());
    unit[24..32].copy_from_slice(&(points * 12).to_le_bytes());

    let err = decode(&unit).unwrap_err();
    assert!(matches!(err, IsoError::CorruptMesh { .. }), "{mode:?}: {err}");
  }
}
