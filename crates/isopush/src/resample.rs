//! Resampling of unstructured meshes onto a uniform grid.
//!
//! ```text
//! ┌──────────────────────┐    probe every grid point     ┌─────────────────────────┐
//! │ UnstructuredMesh     │ ────────────────────────────► │ UniformGrid (nx,ny,nz)  │
//! │  tets / hexes        │   locate tetra (binned)       │  fields (interpolated)  │
//! │  point + cell fields │   barycentric interpolation   │  valid_point_mask       │
//! └──────────────────────┘                               │  ghost_type             │
//!                                                        └────────────┬────────────┘
//!                                                                     │ strip
//!                                                                     ▼
//!                                                          grid indistinguishable
//!                                                          from a native .vti
//! ```
//!
//! Sampling resolution is fixed by the caller and lossy by design; it is not
//! derived from the input resolution.

use glam::DVec3;
use rayon::prelude::*;

use crate::dataset::{
  Association, Dataset, Geometry, ScalarField, UniformGrid, UnstructuredMesh, GHOST_FIELD,
  VALID_MASK_FIELD,
};
use crate::error::Result;

/// Ghost flag value for samples that fell outside every cell.
pub const HIDDEN_POINT: f32 = 2.0;

/// Barycentric tolerance for points on shared faces.
const INSIDE_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resampler {
  dims: [usize; 3],
}

impl Default for Resampler {
  fn default() -> Self {
    Self::new(Self::DEFAULT_DIMS)
  }
}

impl Resampler {
  /// Resolution used by the asteroid runs.
  pub const DEFAULT_DIMS: [usize; 3] = [150, 150, 150];

  /// Each axis is clamped to at least two samples.
  pub fn new(dims: [usize; 3]) -> Self {
    Self {
      dims: dims.map(|n| n.max(2)),
    }
  }

  pub fn cubic(n: usize) -> Self {
    Self::new([n; 3])
  }

  pub fn dims(&self) -> [usize; 3] {
    self.dims
  }

  /// Resample unstructured input; grid input passes through untouched.
  ///
  /// The validity mask and ghost flags produced while probing are removed
  /// before returning.
  pub fn resample(&self, dataset: Dataset) -> Result<Dataset> {
    if !matches!(dataset.geometry(), Geometry::Unstructured(_)) {
      return Ok(dataset);
    }
    let mut resampled = self.resample_raw(&dataset)?;
    resampled.strip_bookkeeping();
    Ok(resampled)
  }

  /// Probe the mesh at every grid point, keeping the validity mask and
  /// ghost flags. Grid input is returned as a copy.
  pub fn resample_raw(&self, dataset: &Dataset) -> Result<Dataset> {
    let Geometry::Unstructured(mesh) = dataset.geometry() else {
      return Ok(dataset.clone());
    };

    let _span = tracing::info_span!("resample", dims = ?self.dims).entered();

    let grid = self.target_grid(mesh);
    let locator = TetLocator::new(mesh);

    let hits: Vec<Option<Hit>> = (0..grid.point_count())
      .into_par_iter()
      .map(|index| {
        let [nx, ny, _] = grid.dims;
        let (i, j, k) = (index % nx, (index / nx) % ny, index / (nx * ny));
        locator.locate(DVec3::from_array(grid.point_position(i, j, k)))
      })
      .collect();

    let mut out = Dataset::new(Geometry::Grid(grid));
    for field in dataset.scalar_fields() {
      let values = hits
        .par_iter()
        .map(|hit| match hit {
          None => 0.0,
          Some(hit) => match field.association {
            Association::Point => hit.interpolate(&field.values),
            _ => field.values[hit.cell as usize],
          },
        })
        .collect();
      out.insert_field(ScalarField::point(field.name.clone(), values));
    }

    let valid = hits.iter().filter(|h| h.is_some()).count();
    out.insert_field(ScalarField::point(
      VALID_MASK_FIELD,
      hits
        .iter()
        .map(|h| if h.is_some() { 1.0 } else { 0.0 })
        .collect(),
    ));
    out.insert_field(ScalarField::point(
      GHOST_FIELD,
      hits
        .iter()
        .map(|h| if h.is_some() { 0.0 } else { HIDDEN_POINT })
        .collect(),
    ));

    tracing::debug!(
      points = hits.len(),
      valid,
      tets = locator.tets.len(),
      "resampled unstructured mesh"
    );

    Ok(out)
  }

  /// Grid spanning the mesh bounding box at the configured resolution.
  fn target_grid(&self, mesh: &UnstructuredMesh) -> UniformGrid {
    let (min, max) = mesh.bounds().unwrap_or(([0.0; 3], [0.0; 3]));
    let spacing = std::array::from_fn(|axis| (max[axis] - min[axis]) / (self.dims[axis] - 1) as f64);
    UniformGrid::new(min, spacing, self.dims)
  }
}

// =============================================================================
// Point location
// =============================================================================

/// A grid point found inside a tetrahedron.
#[derive(Clone, Copy, Debug)]
struct Hit {
  cell: u32,
  vertices: [u32; 4],
  weights: [f64; 4],
}

impl Hit {
  #[inline]
  fn interpolate(&self, values: &[f32]) -> f32 {
    let sum: f64 = self
      .vertices
      .iter()
      .zip(self.weights)
      .map(|(&v, w)| values[v as usize] as f64 * w)
      .sum();
    sum as f32
  }
}

/// Uniform binning over the tetrahedral decomposition of a mesh.
struct TetLocator<'a> {
  mesh: &'a UnstructuredMesh,
  tets: Vec<(u32, [u32; 4])>,
  origin: DVec3,
  bin_size: DVec3,
  bins: [usize; 3],
  members: Vec<Vec<u32>>,
}

impl<'a> TetLocator<'a> {
  fn new(mesh: &'a UnstructuredMesh) -> Self {
    let mut tets = Vec::new();
    for cell in 0..mesh.cell_count() {
      mesh.for_each_tetra(cell, |tet| tets.push((cell as u32, tet)));
    }

    let (min, max) = mesh.bounds().unwrap_or(([0.0; 3], [0.0; 3]));
    let origin = DVec3::from_array(min);
    let extent = DVec3::from_array(max) - origin;

    let per_axis = ((tets.len() as f64).cbrt().ceil() as usize).clamp(1, 128);
    let bins = [per_axis; 3];
    let bin_size = DVec3::new(
      bin_extent(extent.x, per_axis),
      bin_extent(extent.y, per_axis),
      bin_extent(extent.z, per_axis),
    );

    let mut locator = Self {
      mesh,
      tets: Vec::new(),
      origin,
      bin_size,
      bins,
      members: vec![Vec::new(); per_axis * per_axis * per_axis],
    };

    for (id, (_, tet)) in tets.iter().enumerate() {
      let corners = tet.map(|v| locator.point(v));
      let lo = corners.iter().fold(corners[0], |acc, &c| acc.min(c));
      let hi = corners.iter().fold(corners[0], |acc, &c| acc.max(c));
      let lo_bin = locator.bin_of(lo);
      let hi_bin = locator.bin_of(hi);
      for bz in lo_bin[2]..=hi_bin[2] {
        for by in lo_bin[1]..=hi_bin[1] {
          for bx in lo_bin[0]..=hi_bin[0] {
            let slot = locator.bin_index([bx, by, bz]);
            locator.members[slot].push(id as u32);
          }
        }
      }
    }
    locator.tets = tets;
    locator
  }

  #[inline]
  fn point(&self, index: u32) -> DVec3 {
    let p = self.mesh.points[index as usize];
    DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64)
  }

  #[inline]
  fn bin_of(&self, p: DVec3) -> [usize; 3] {
    let rel = (p - self.origin) / self.bin_size;
    let axis = |value: f64, n: usize| (value.floor().max(0.0) as usize).min(n - 1);
    [
      axis(rel.x, self.bins[0]),
      axis(rel.y, self.bins[1]),
      axis(rel.z, self.bins[2]),
    ]
  }

  #[inline]
  fn bin_index(&self, bin: [usize; 3]) -> usize {
    bin[0] + self.bins[0] * (bin[1] + self.bins[1] * bin[2])
  }

  /// First tetrahedron (in cell order) containing `p`.
  fn locate(&self, p: DVec3) -> Option<Hit> {
    let slot = self.bin_index(self.bin_of(p));
    self.members[slot].iter().find_map(|&id| {
      let (cell, vertices) = self.tets[id as usize];
      let weights = barycentric(p, vertices.map(|v| self.point(v)))?;
      weights
        .iter()
        .all(|&w| w >= -INSIDE_EPSILON)
        .then_some(Hit {
          cell,
          vertices,
          weights,
        })
    })
  }
}

fn bin_extent(extent: f64, bins: usize) -> f64 {
  if extent > 0.0 {
    extent / bins as f64
  } else {
    1.0
  }
}

/// Barycentric coordinates of `p` in tetrahedron `[a, b, c, d]`, `None` for a
/// degenerate tetrahedron.
fn barycentric(p: DVec3, [a, b, c, d]: [DVec3; 4]) -> Option<[f64; 4]> {
  let ab = b - a;
  let ac = c - a;
  let ad = d - a;
  let volume6 = ab.dot(ac.cross(ad));
  if volume6.abs() < f64::EPSILON * ab.length() * ac.length() * ad.length() {
    return None;
  }

  let ap = p - a;
  let bp = p - b;
  let bc = c - b;
  let bd = d - b;

  let wa = bp.dot(bd.cross(bc)) / volume6;
  let wb = ap.dot(ac.cross(ad)) / volume6;
  let wc = ap.dot(ad.cross(ab)) / volume6;
  let wd = ap.dot(ab.cross(ac)) / volume6;
  Some([wa, wb, wc, wd])
}

#[cfg(test)]
#[path = "resample_test.rs"]
mod resample_test;
