//! Isosurface extraction for one field at one isovalue.
//!
//! ```text
//! Dataset ──restrict_to(field)──► FieldView ──┬── Grid          ──► surface_nets
//!                                             └── Unstructured  ──► tetra (marching tetrahedra)
//!                                                                         │
//!                                                                         ▼
//!                                                          IsosurfaceMesh (points + triangles)
//! ```
//!
//! Output carries no per-vertex scalars or normals. Both extractors are
//! single-threaded and iterate cells in storage order, so the same input and
//! isovalue always produce the same points and triangles in the same order.
//!
//! An isovalue outside the field's range produces an empty mesh, not an error.

mod surface_nets;
mod tetra;

use crate::dataset::{Association, Dataset, FieldView, Geometry};
use crate::error::{IsoError, Result};
use crate::mesh::IsosurfaceMesh;
use crate::thresholds::FieldSpec;

/// Extract the isosurface of `spec.name` at `spec.isovalue`.
///
/// The dataset is restricted to that single field first; other resident
/// fields never reach the extractor.
pub fn extract(dataset: &Dataset, spec: &FieldSpec) -> Result<IsosurfaceMesh> {
  let view = dataset.restrict_to(&spec.name)?;
  let _span = tracing::info_span!("contour", field = %spec.name, iso = spec.isovalue).entered();
  let mesh = extract_view(view, spec.isovalue)?;
  tracing::debug!(
    field = %spec.name,
    points = mesh.point_count(),
    cells = mesh.cell_count(),
    "extracted isosurface"
  );
  Ok(mesh)
}

/// Extract from an already-restricted view.
pub fn extract_view(view: FieldView<'_>, isovalue: f64) -> Result<IsosurfaceMesh> {
  let field = view.field;
  let expected = match view.geometry {
    Geometry::Grid(grid) => grid.point_count(),
    Geometry::Unstructured(mesh) => match field.association {
      Association::Cell => mesh.cell_count(),
      _ => mesh.points.len(),
    },
  };
  if field.values.len() != expected {
    return Err(IsoError::InvalidField {
      name: field.name.clone(),
      reason: format!("{} values for {} elements", field.values.len(), expected),
    });
  }

  match (view.geometry, field.association) {
    (Geometry::Grid(grid), Association::Point) => {
      Ok(surface_nets::generate(grid, &field.values, isovalue))
    }
    (Geometry::Unstructured(mesh), Association::Point) => {
      Ok(tetra::generate(mesh, &field.values, isovalue))
    }
    (Geometry::Unstructured(mesh), Association::Cell) => {
      let point_values = mesh.cell_values_to_points(&field.values);
      Ok(tetra::generate(mesh, &point_values, isovalue))
    }
    _ => Err(IsoError::InvalidField {
      name: field.name.clone(),
      reason: format!("{:?} association is not contourable on a grid", field.association),
    }),
  }
}
