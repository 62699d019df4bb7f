//! Test utilities shared by stage tests.
//!
//! Synthetic fields roughly shaped like the asteroid impact runs: a planar
//! `v02`, a spherical `v03` blob and a faint spherical `tev` shell, sampled
//! either on a uniform grid or on a hexahedral unstructured mesh with the
//! same lattice points.

use std::path::{Path, PathBuf};

use crate::dataset::{
  write_dataset, Association, BlockCompression, CellShape, Dataset, Geometry, ScalarField,
  UniformGrid, UnstructuredMesh,
};
use crate::mesh::IsosurfaceMesh;

// =============================================================================
// Field generators
// =============================================================================

/// Values of the three asteroid fields at lattice point `(i, j, k)` of an
/// `n³` lattice.
fn asteroid_values(n: usize, i: usize, j: usize, k: usize) -> [f32; 3] {
  let extent = (n - 1) as f32;
  let half = extent / 2.0;
  let dx = i as f32 - half;
  let dy = j as f32 - half;
  let dz = k as f32 - half;
  let r = (dx * dx + dy * dy + dz * dz).sqrt() / half;

  let v02 = i as f32 / extent;
  let v03 = 1.0 - r;
  let tev = 0.2 * (1.0 - r);
  [v02, v03, tev]
}

fn asteroid_fields(n: usize) -> [Vec<f32>; 3] {
  let mut fields: [Vec<f32>; 3] = Default::default();
  for k in 0..n {
    for j in 0..n {
      for i in 0..n {
        let values = asteroid_values(n, i, j, k);
        for (field, value) in fields.iter_mut().zip(values) {
          field.push(value);
        }
      }
    }
  }
  fields
}

fn attach_asteroid_fields(mut dataset: Dataset, n: usize) -> Dataset {
  let [v02, v03, tev] = asteroid_fields(n);
  dataset.insert_field(ScalarField::point("v02", v02));
  dataset.insert_field(ScalarField::point("v03", v03));
  dataset.insert_field(ScalarField::point("tev", tev));
  dataset
}

// =============================================================================
// Dataset fixtures
// =============================================================================

/// `n³` uniform grid with unit spacing at the origin.
pub fn asteroid_grid(n: usize) -> Dataset {
  let grid = UniformGrid::new([0.0; 3], [1.0; 3], [n; 3]);
  attach_asteroid_fields(Dataset::new(Geometry::Grid(grid)), n)
}

/// Lattice of unit hexahedra over the same `n³` points as [`asteroid_grid`].
pub fn asteroid_hex_mesh(n: usize) -> Dataset {
  let mut points = Vec::with_capacity(n * n * n);
  for k in 0..n {
    for j in 0..n {
      for i in 0..n {
        points.push([i as f32, j as f32, k as f32]);
      }
    }
  }
  let id = |i: usize, j: usize, k: usize| (i + n * (j + n * k)) as u32;

  let mut mesh = UnstructuredMesh::new(points);
  for k in 0..n - 1 {
    for j in 0..n - 1 {
      for i in 0..n - 1 {
        mesh.push_cell(
          CellShape::Hexahedron,
          &[
            id(i, j, k),
            id(i + 1, j, k),
            id(i + 1, j + 1, k),
            id(i, j + 1, k),
            id(i, j, k + 1),
            id(i + 1, j, k + 1),
            id(i + 1, j + 1, k + 1),
            id(i, j + 1, k + 1),
          ],
        );
      }
    }
  }
  attach_asteroid_fields(Dataset::new(Geometry::Unstructured(mesh)), n)
}

/// Single tetrahedron with a linear field `x + y + z`.
pub fn unit_tetra() -> Dataset {
  let mut mesh = UnstructuredMesh::new(vec![
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
  ]);
  mesh.push_cell(CellShape::Tetra, &[0, 1, 2, 3]);
  Dataset::new(Geometry::Unstructured(mesh))
    .with_field(ScalarField::point("v03", vec![0.0, 1.0, 1.0, 1.0]))
}

/// Add dataset-level metadata of the kind simulation dumps carry.
pub fn with_metadata(dataset: Dataset) -> Dataset {
  dataset.with_field(ScalarField::new(
    "TimeValue",
    Association::Field,
    vec![9782.0],
  ))
}

/// Write a fixture into `dir` and return its path.
pub fn write_fixture(
  dir: &Path,
  name: &str,
  dataset: &Dataset,
  compression: BlockCompression,
) -> PathBuf {
  let path = dir.join(name);
  write_dataset(&path, dataset, compression).expect("write fixture");
  path
}

/// Small closed mesh (a tetrahedron surface) for codec tests.
pub fn tetra_surface() -> IsosurfaceMesh {
  IsosurfaceMesh {
    points: vec![
      [0.0, 0.0, 0.0],
      [1.0, 0.0, 0.0],
      [0.0, 1.0, 0.0],
      [0.0, 0.0, 1.0],
    ],
    triangles: vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
  }
}
