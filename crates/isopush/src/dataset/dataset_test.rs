use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};

use tempfile::tempdir;

use super::format::read_header;
use super::*;
use crate::pipeline::test_utils::*;

// =============================================================================
// Kind dispatch
// =============================================================================

#[test]
fn test_kind_from_suffix() {
  assert_eq!(DatasetKind::from_path("/data/run1.vti").unwrap(), DatasetKind::Grid);
  assert_eq!(
    DatasetKind::from_path("/data/run1.vtu").unwrap(),
    DatasetKind::Unstructured
  );
}

#[test]
fn test_unknown_suffix_is_unsupported() {
  for path in ["/data/run1.vtk", "/data/run1", "/data/run1.vtm"] {
    let err = DatasetKind::from_path(path).unwrap_err();
    assert!(matches!(err, IsoError::UnsupportedKind { .. }), "{path}: {err}");
  }
}

#[test]
fn test_open_rejects_kind_before_touching_storage() {
  // The file does not exist; kind dispatch must fail first.
  let err = DatasetHandle::open("/nonexistent/run1.xyz").unwrap_err();
  assert!(matches!(err, IsoError::UnsupportedKind { .. }));
}

#[test]
fn test_open_missing_file_is_io_failure() {
  let err = DatasetHandle::open("/nonexistent/run1.vti").unwrap_err();
  assert!(matches!(err, IsoError::IoFailure { .. }));
}

// =============================================================================
// Array selection
// =============================================================================

#[test]
fn test_select_single_field_exposes_exactly_that_field() {
  let dir = tempdir().unwrap();
  let path = write_fixture(dir.path(), "run.vti", &asteroid_grid(9), BlockCompression::None);

  let mut handle = DatasetHandle::open(&path).unwrap();
  handle.select_fields(["v03"]);
  let dataset = handle.load().unwrap();

  let names: Vec<_> = dataset.field_names().collect();
  assert_eq!(names, vec!["v03"]);
  assert_eq!(dataset.field("v03").unwrap().values.len(), 9 * 9 * 9);
}

#[test]
fn test_no_selection_loads_every_scalar_field() {
  let dir = tempdir().unwrap();
  let path = write_fixture(dir.path(), "run.vti", &asteroid_grid(5), BlockCompression::None);

  let dataset = DatasetHandle::open(&path).unwrap().load().unwrap();

  let mut names: Vec<_> = dataset.field_names().collect();
  names.sort();
  assert_eq!(names, vec!["tev", "v02", "v03"]);
}

#[test]
fn test_unselected_arrays_are_never_read() {
  let dir = tempdir().unwrap();
  let path = write_fixture(
    dir.path(),
    "run.vti",
    &with_metadata(asteroid_grid(9)),
    BlockCompression::Zlib,
  );

  // Corrupt the stored bytes of v02 and of the metadata block.
  let (header, payload_start) = {
    let mut file = File::open(&path).unwrap();
    read_header(&path, &mut file).unwrap()
  };
  {
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    for name in ["v02", "TimeValue"] {
      let entry = header.arrays.iter().find(|a| a.name == name).unwrap();
      file
        .seek(SeekFrom::Start(payload_start + entry.block.offset))
        .unwrap();
      file
        .write_all(&vec![0xAB; entry.block.stored_len as usize])
        .unwrap();
    }
  }

  let mut handle = DatasetHandle::open(&path).unwrap();
  handle.select_fields(["v03", "tev"]);
  let (dataset, stats) = handle.load_with_stats().unwrap();
  assert!(dataset.field("v02").is_none());
  assert_eq!(stats.arrays_read, 2);

  let mut handle = DatasetHandle::open(&path).unwrap();
  handle.select_fields(["v03"]);
  let (_, stats) = handle.load_with_stats().unwrap();
  assert_eq!(stats.arrays_read, 1);

  let err = DatasetHandle::open(&path).unwrap().load().unwrap_err();
  assert!(matches!(err, IsoError::CorruptDataset { .. }), "{err}");
}

#[test]
fn test_oversized_lengths_are_corrupt() {
  let dir = tempdir().unwrap();

  let bogus = dir.path().join("bogus.vti");
  let mut bytes = Vec::from(format::MAGIC);
  bytes.extend_from_slice(&format::VERSION.to_le_bytes());
  bytes.extend_from_slice(&u64::MAX.to_le_bytes());
  bytes.extend_from_slice(b"{}");
  fs::write(&bogus, bytes).unwrap();
  let err = DatasetHandle::open(&bogus).unwrap_err();
  assert!(matches!(err, IsoError::CorruptDataset { .. }), "{err}");

  // A block header pointing far past the end of the file.
  let path = write_fixture(dir.path(), "run.vti", &asteroid_grid(5), BlockCompression::Zlib);
  let mut file = File::open(&path).unwrap();
  let (mut header, _) = read_header(&path, &mut file).unwrap();
  drop(file);
  for entry in &mut header.arrays {
    entry.block.stored_len = u64::MAX / 2;
    entry.block.count = u64::MAX / 2;
  }
  let header_bytes = serde_json::to_vec(&header).unwrap();
  let mut bytes = Vec::from(format::MAGIC);
  bytes.extend_from_slice(&format::VERSION.to_le_bytes());
  bytes.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
  bytes.extend_from_slice(&header_bytes);
  fs::write(&path, bytes).unwrap();
  let err = DatasetHandle::open(&path).unwrap().load().unwrap_err();
  assert!(matches!(err, IsoError::CorruptDataset { .. }), "{err}");
}

#[test]
fn test_selecting_absent_field_fails() {
  let dir = tempdir().unwrap();
  let path = write_fixture(dir.path(), "run.vti", &asteroid_grid(5), BlockCompression::None);

  let mut handle = DatasetHandle::open(&path).unwrap();
  handle.select_fields(["baryon_density"]);
  let err = handle.load().unwrap_err();

  assert!(matches!(err, IsoError::FieldNotLoaded { ref name } if name == "baryon_density"));
}

#[test]
fn test_bookkeeping_arrays_are_stripped_after_load() {
  let dir = tempdir().unwrap();
  let dataset = with_metadata(asteroid_grid(5)).with_field(ScalarField::point(
    VALID_MASK_FIELD,
    vec![1.0; 125],
  ));
  let path = write_fixture(dir.path(), "run.vti", &dataset, BlockCompression::None);

  let loaded = DatasetHandle::open(&path).unwrap().load().unwrap();

  assert!(loaded.field("TimeValue").is_none());
  assert!(loaded.field(VALID_MASK_FIELD).is_none());
  assert_eq!(loaded.fields().len(), 3);
}

#[test]
fn test_selection_reads_fewer_bytes() {
  let dir = tempdir().unwrap();
  let path = write_fixture(dir.path(), "run.vti", &asteroid_grid(9), BlockCompression::None);

  let (_, all) = DatasetHandle::open(&path).unwrap().load_with_stats().unwrap();
  let mut handle = DatasetHandle::open(&path).unwrap();
  handle.select_fields(["v03"]);
  let (_, one) = handle.load_with_stats().unwrap();

  assert!(one.bytes_read < all.bytes_read);
  assert_eq!(all.bytes_read, fs::metadata(&path).unwrap().len());
}

// =============================================================================
// Container integrity
// =============================================================================

#[test]
fn test_unstructured_geometry_survives_container() {
  let dir = tempdir().unwrap();
  let original = asteroid_hex_mesh(4);
  let path = write_fixture(dir.path(), "run.vtu", &original, BlockCompression::Zlib);

  let loaded = DatasetHandle::open(&path).unwrap().load().unwrap();

  assert_eq!(loaded.kind(), DatasetKind::Unstructured);
  assert_eq!(loaded.geometry(), original.geometry());
  assert_eq!(loaded.field("v03"), original.field("v03"));
}

#[test]
fn test_suffix_header_mismatch_is_corrupt() {
  let dir = tempdir().unwrap();
  let path = write_fixture(dir.path(), "run.vti", &asteroid_grid(3), BlockCompression::None);
  let renamed = dir.path().join("run.vtu");
  fs::rename(&path, &renamed).unwrap();

  let err = DatasetHandle::open(&renamed).unwrap_err();
  assert!(matches!(err, IsoError::CorruptDataset { .. }));
}

#[test]
fn test_write_rejects_mismatched_suffix() {
  let dir = tempdir().unwrap();
  let err = write_dataset(dir.path().join("run.vtu"), &asteroid_grid(3), BlockCompression::None)
    .unwrap_err();
  assert!(matches!(err, IsoError::CorruptDataset { .. }));
}

// =============================================================================
// Field operations
// =============================================================================

#[test]
fn test_restrict_to_picks_one_field() {
  let dataset = asteroid_grid(5);
  let view = dataset.restrict_to("tev").unwrap();
  assert_eq!(view.field.name, "tev");

  let err = dataset.restrict_to("missing").unwrap_err();
  assert!(matches!(err, IsoError::FieldNotLoaded { .. }));
}

#[test]
fn test_cell_to_point_averages_incident_cells() {
  let mut mesh = UnstructuredMesh::new(vec![
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
  ]);
  mesh.push_cell(CellShape::Tetra, &[0, 1, 2, 3]);
  mesh.push_cell(CellShape::Tetra, &[1, 2, 3, 4]);
  let mut dataset = Dataset::new(Geometry::Unstructured(mesh)).with_field(ScalarField::new(
    "v03",
    Association::Cell,
    vec![1.0, 3.0],
  ));

  dataset.cell_to_point();

  let field = dataset.field("v03").unwrap();
  assert_eq!(field.association, Association::Point);
  assert_eq!(field.values, vec![1.0, 2.0, 2.0, 2.0, 3.0]);
}

#[test]
fn test_hexahedron_splits_into_six_tetrahedra() {
  let dataset = asteroid_hex_mesh(2);
  let Geometry::Unstructured(mesh) = dataset.geometry() else {
    panic!("expected unstructured geometry");
  };
  let mut tets = Vec::new();
  mesh.for_each_tetra(0, |t| tets.push(t));

  assert_eq!(tets.len(), 6);
  // Every tetrahedron shares the 0-6 diagonal.
  assert!(tets.iter().all(|t| t[0] == 0 && t[3] == 7));
}

fn tetra_piece(shift: f32, v03: f32) -> Dataset {
  let mut mesh = UnstructuredMesh::new(vec![
    [shift, 0.0, 0.0],
    [shift + 1.0, 0.0, 0.0],
    [shift, 1.0, 0.0],
    [shift, 0.0, 1.0],
  ]);
  mesh.push_cell(CellShape::Tetra, &[0, 1, 2, 3]);
  Dataset::new(Geometry::Unstructured(mesh))
    .with_field(ScalarField::point("v03", vec![v03; 4]))
    .with_field(ScalarField::new("tev", Association::Cell, vec![v03]))
}

#[test]
fn test_append_offsets_connectivity_and_concatenates_fields() {
  let second = tetra_piece(2.0, 0.5).with_field(ScalarField::point("v02", vec![0.0; 4]));
  let merged = Dataset::append(vec![tetra_piece(0.0, 0.25), second]).unwrap();

  let Geometry::Unstructured(mesh) = merged.geometry() else {
    panic!("expected an unstructured mesh");
  };
  assert_eq!(mesh.points.len(), 8);
  assert_eq!(mesh.cell_count(), 2);
  assert_eq!(mesh.offsets, vec![0, 4, 8]);
  assert_eq!(mesh.cell(1).1, &[4, 5, 6, 7]);
  assert_eq!(mesh.points[4], [2.0, 0.0, 0.0]);

  assert_eq!(
    merged.field("v03").unwrap().values,
    vec![0.25, 0.25, 0.25, 0.25, 0.5, 0.5, 0.5, 0.5]
  );
  assert_eq!(merged.field("tev").unwrap().values, vec![0.25, 0.5]);
  // Only the second piece carries v02.
  assert!(merged.field("v02").is_none());
}

#[test]
fn test_append_rejects_grids_and_nothing() {
  let grid = asteroid_grid(3);
  assert!(matches!(
    Dataset::append(vec![grid.clone(), tetra_piece(0.0, 1.0)]),
    Err(IsoError::IncompatiblePieces { .. })
  ));
  assert!(matches!(
    Dataset::append(Vec::new()),
    Err(IsoError::IncompatiblePieces { .. })
  ));
  assert_eq!(Dataset::append(vec![grid.clone()]).unwrap(), grid);
}

#[test]
fn test_field_range() {
  let field = ScalarField::point("v03", vec![0.5, -1.0, 2.0]);
  assert_eq!(field.range(), Some((-1.0, 2.0)));
  assert_eq!(ScalarField::point("empty", vec![]).range(), None);
}
