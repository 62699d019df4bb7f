//! Volumetric datasets: uniform grids and unstructured meshes carrying named
//! scalar fields.
//!
//! ```text
//!   path.vti ──► DatasetKind::Grid ─────────┐
//!                                           ├──► DatasetHandle ──► select_fields ──► load ──► Dataset
//!   path.vtu ──► DatasetKind::Unstructured ─┘        (header only)      (names)       (blocks)
//! ```
//!
//! The kind tag is decided once from the path suffix at open time and then
//! carried on the [`Dataset`] through every later stage.

mod adapter;
pub mod format;

pub use adapter::{DatasetHandle, LoadStats};
pub use format::{write_dataset, BlockCompression};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IsoError, Result};

/// Validity mask introduced by resampling (1 = sample hit a cell).
pub const VALID_MASK_FIELD: &str = "valid_point_mask";

/// Ghost flags introduced by resampling (nonzero = hidden sample).
pub const GHOST_FIELD: &str = "ghost_type";

/// Grid or unstructured. Decided from the path suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
  Grid,
  Unstructured,
}

impl DatasetKind {
  /// Classify a dataset path by its suffix.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
      Some("vti") => Ok(DatasetKind::Grid),
      Some("vtu") => Ok(DatasetKind::Unstructured),
      _ => Err(IsoError::UnsupportedKind {
        path: path.to_path_buf(),
      }),
    }
  }

  pub fn suffix(self) -> &'static str {
    match self {
      DatasetKind::Grid => "vti",
      DatasetKind::Unstructured => "vtu",
    }
  }
}

/// What a field's values are attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Association {
  Point,
  Cell,
  /// Dataset-level metadata (time stamps, provenance). Never scientific.
  Field,
}

/// A named scalar array.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
  pub name: String,
  pub association: Association,
  pub values: Vec<f32>,
}

impl ScalarField {
  pub fn new(name: impl Into<String>, association: Association, values: Vec<f32>) -> Self {
    Self {
      name: name.into(),
      association,
      values,
    }
  }

  pub fn point(name: impl Into<String>, values: Vec<f32>) -> Self {
    Self::new(name, Association::Point, values)
  }

  /// Minimum and maximum value, `None` for an empty array.
  pub fn range(&self) -> Option<(f32, f32)> {
    self.values.iter().fold(None, |acc, &v| match acc {
      None => Some((v, v)),
      Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
  }
}

/// Regular 3-D lattice of points with uniform spacing.
///
/// Point `(i, j, k)` lives at `origin + (i, j, k) * spacing` and is stored at
/// linear index `i + nx * (j + ny * k)` (X fastest).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformGrid {
  pub origin: [f64; 3],
  pub spacing: [f64; 3],
  pub dims: [usize; 3],
}

impl UniformGrid {
  pub fn new(origin: [f64; 3], spacing: [f64; 3], dims: [usize; 3]) -> Self {
    Self {
      origin,
      spacing,
      dims,
    }
  }

  pub fn point_count(&self) -> usize {
    self.dims[0] * self.dims[1] * self.dims[2]
  }

  pub fn cell_count(&self) -> usize {
    self.dims.iter().map(|&n| n.saturating_sub(1)).product()
  }

  #[inline(always)]
  pub fn point_index(&self, i: usize, j: usize, k: usize) -> usize {
    i + self.dims[0] * (j + self.dims[1] * k)
  }

  #[inline]
  pub fn point_position(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
    [
      self.origin[0] + i as f64 * self.spacing[0],
      self.origin[1] + j as f64 * self.spacing[1],
      self.origin[2] + k as f64 * self.spacing[2],
    ]
  }
}

/// Supported unstructured cell shapes, with their VTK type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellShape {
  Tetra,
  Hexahedron,
}

impl CellShape {
  pub fn vertex_count(self) -> usize {
    match self {
      CellShape::Tetra => 4,
      CellShape::Hexahedron => 8,
    }
  }

  pub fn type_code(self) -> u32 {
    match self {
      CellShape::Tetra => 10,
      CellShape::Hexahedron => 12,
    }
  }

  pub fn from_type_code(code: u32) -> Option<Self> {
    match code {
      10 => Some(CellShape::Tetra),
      12 => Some(CellShape::Hexahedron),
      _ => None,
    }
  }
}

/// Six tetrahedra around the 0-6 diagonal of a hexahedron (VTK ordering).
const HEX_TETS: [[usize; 4]; 6] = [
  [0, 1, 2, 6],
  [0, 2, 3, 6],
  [0, 3, 7, 6],
  [0, 7, 4, 6],
  [0, 4, 5, 6],
  [0, 5, 1, 6],
];

/// Irregular mesh of points and volumetric cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnstructuredMesh {
  pub points: Vec<[f32; 3]>,
  pub shapes: Vec<CellShape>,
  /// Start of each cell in `connectivity`; one extra trailing entry.
  pub offsets: Vec<u32>,
  pub connectivity: Vec<u32>,
}

impl UnstructuredMesh {
  pub fn new(points: Vec<[f32; 3]>) -> Self {
    Self {
      points,
      shapes: Vec::new(),
      offsets: vec![0],
      connectivity: Vec::new(),
    }
  }

  pub fn push_cell(&mut self, shape: CellShape, vertices: &[u32]) {
    debug_assert_eq!(vertices.len(), shape.vertex_count());
    self.shapes.push(shape);
    self.connectivity.extend_from_slice(vertices);
    self.offsets.push(self.connectivity.len() as u32);
  }

  pub fn cell_count(&self) -> usize {
    self.shapes.len()
  }

  pub fn cell(&self, index: usize) -> (CellShape, &[u32]) {
    let start = self.offsets[index] as usize;
    let end = self.offsets[index + 1] as usize;
    (self.shapes[index], &self.connectivity[start..end])
  }

  /// Visit the tetrahedral decomposition of one cell.
  pub fn for_each_tetra(&self, index: usize, mut visit: impl FnMut([u32; 4])) {
    let (shape, vertices) = self.cell(index);
    match shape {
      CellShape::Tetra => visit([vertices[0], vertices[1], vertices[2], vertices[3]]),
      CellShape::Hexahedron => {
        for tet in &HEX_TETS {
          visit(tet.map(|corner| vertices[corner]));
        }
      }
    }
  }

  /// Average cell values onto points over the cells incident to each point.
  /// Points used by no cell get 0.
  pub fn cell_values_to_points(&self, values: &[f32]) -> Vec<f32> {
    let mut sums = vec![0.0f64; self.points.len()];
    let mut incidence = vec![0u32; self.points.len()];
    for (cell, &value) in values.iter().enumerate().take(self.cell_count()) {
      let (_, vertices) = self.cell(cell);
      for &v in vertices {
        sums[v as usize] += value as f64;
        incidence[v as usize] += 1;
      }
    }
    sums
      .iter()
      .zip(&incidence)
      .map(|(&sum, &n)| if n == 0 { 0.0 } else { (sum / n as f64) as f32 })
      .collect()
  }

  /// Axis-aligned extent of all points, `None` when there are no points.
  pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
    let first = self.points.first()?;
    let mut min = first.map(|c| c as f64);
    let mut max = min;
    for p in &self.points {
      for axis in 0..3 {
        min[axis] = min[axis].min(p[axis] as f64);
        max[axis] = max[axis].max(p[axis] as f64);
      }
    }
    Some((min, max))
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
  Grid(UniformGrid),
  Unstructured(UnstructuredMesh),
}

/// A dataset restricted to exactly one field.
#[derive(Clone, Copy, Debug)]
pub struct FieldView<'a> {
  pub geometry: &'a Geometry,
  pub field: &'a ScalarField,
}

/// Geometry plus the scalar fields materialized for it.
///
/// After array selection, only requested fields are present; anything else
/// is absent rather than zero-filled.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
  geometry: Geometry,
  fields: Vec<ScalarField>,
}

impl Dataset {
  pub fn new(geometry: Geometry) -> Self {
    Self {
      geometry,
      fields: Vec::new(),
    }
  }

  pub fn with_field(mut self, field: ScalarField) -> Self {
    self.insert_field(field);
    self
  }

  pub fn kind(&self) -> DatasetKind {
    match self.geometry {
      Geometry::Grid(_) => DatasetKind::Grid,
      Geometry::Unstructured(_) => DatasetKind::Unstructured,
    }
  }

  pub fn geometry(&self) -> &Geometry {
    &self.geometry
  }

  pub fn point_count(&self) -> usize {
    match &self.geometry {
      Geometry::Grid(grid) => grid.point_count(),
      Geometry::Unstructured(mesh) => mesh.points.len(),
    }
  }

  pub fn cell_count(&self) -> usize {
    match &self.geometry {
      Geometry::Grid(grid) => grid.cell_count(),
      Geometry::Unstructured(mesh) => mesh.cell_count(),
    }
  }

  /// Add a field, replacing any field with the same name.
  pub fn insert_field(&mut self, field: ScalarField) {
    match self.fields.iter_mut().find(|f| f.name == field.name) {
      Some(slot) => *slot = field,
      None => self.fields.push(field),
    }
  }

  pub fn remove_field(&mut self, name: &str) -> Option<ScalarField> {
    let index = self.fields.iter().position(|f| f.name == name)?;
    Some(self.fields.remove(index))
  }

  pub fn field(&self, name: &str) -> Option<&ScalarField> {
    self.fields.iter().find(|f| f.name == name)
  }

  pub fn fields(&self) -> &[ScalarField] {
    &self.fields
  }

  pub fn field_names(&self) -> impl Iterator<Item = &str> {
    self.fields.iter().map(|f| f.name.as_str())
  }

  /// Fields attached to points or cells (excludes dataset-level metadata).
  pub fn scalar_fields(&self) -> impl Iterator<Item = &ScalarField> {
    self
      .fields
      .iter()
      .filter(|f| f.association != Association::Field)
  }

  /// Drop dataset-level metadata and resampling validity/ghost arrays.
  pub fn strip_bookkeeping(&mut self) {
    self.fields.retain(|f| {
      f.association != Association::Field && f.name != VALID_MASK_FIELD && f.name != GHOST_FIELD
    });
  }

  /// Restrict to exactly one field for contouring.
  pub fn restrict_to(&self, name: &str) -> Result<FieldView<'_>> {
    let field = self
      .scalar_fields()
      .find(|f| f.name == name)
      .ok_or_else(|| IsoError::FieldNotLoaded {
        name: name.to_string(),
      })?;
    Ok(FieldView {
      geometry: &self.geometry,
      field,
    })
  }

  /// Concatenate partitioned pieces into one dataset.
  ///
  /// Unstructured pieces are appended in order: points and cells follow each
  /// other, and connectivity is offset past the points of earlier pieces. A
  /// point or cell field survives only if every piece carries it with the
  /// same association; metadata keeps the first piece's values. A single
  /// piece of either kind passes through unchanged.
  pub fn append(pieces: Vec<Dataset>) -> Result<Dataset> {
    let incompatible = |reason: &str| IsoError::IncompatiblePieces {
      reason: reason.to_string(),
    };

    let mut pieces = pieces.into_iter();
    let first = pieces.next().ok_or_else(|| incompatible("no pieces given"))?;
    let rest: Vec<Dataset> = pieces.collect();
    if rest.is_empty() {
      return Ok(first);
    }

    let Geometry::Unstructured(mut mesh) = first.geometry else {
      return Err(incompatible("uniform grids cannot be appended"));
    };
    let mut fields = first.fields;

    for piece in rest {
      let Geometry::Unstructured(other) = piece.geometry else {
        return Err(incompatible("uniform grids cannot be appended"));
      };
      let fits = |a: usize, b: usize| u32::try_from(a + b).is_ok();
      if !fits(mesh.points.len(), other.points.len())
        || !fits(mesh.connectivity.len(), other.connectivity.len())
      {
        return Err(incompatible("appended mesh exceeds 32-bit indices"));
      }
      let point_base = mesh.points.len() as u32;
      let index_base = mesh.connectivity.len() as u32;

      mesh.points.extend_from_slice(&other.points);
      mesh.shapes.extend_from_slice(&other.shapes);
      mesh
        .offsets
        .extend(other.offsets.iter().skip(1).map(|&o| o + index_base));
      mesh
        .connectivity
        .extend(other.connectivity.iter().map(|&v| v + point_base));

      fields.retain_mut(|field| {
        let matching = piece
          .fields
          .iter()
          .find(|f| f.name == field.name && f.association == field.association);
        match matching {
          Some(_) if field.association == Association::Field => true,
          Some(f) => {
            field.values.extend_from_slice(&f.values);
            true
          }
          None => {
            tracing::warn!(field = %field.name, "field missing from a piece, dropped");
            false
          }
        }
      });
    }

    Ok(Dataset {
      geometry: Geometry::Unstructured(mesh),
      fields,
    })
  }

  /// Convert cell-attached fields of an unstructured mesh to point fields by
  /// averaging over the cells incident to each point. Grid cell fields are
  /// left untouched.
  pub fn cell_to_point(&mut self) {
    let Geometry::Unstructured(mesh) = &self.geometry else {
      return;
    };

    for field in self
      .fields
      .iter_mut()
      .filter(|f| f.association == Association::Cell)
    {
      field.values = mesh.cell_values_to_points(&field.values);
      field.association = Association::Point;
    }
  }
}

#[cfg(test)]
#[path = "dataset_test.rs"]
mod dataset_test;
