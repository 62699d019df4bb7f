//! Isosurface mesh: points and triangles, nothing else.

/// Polygonal isosurface with no per-vertex attributes.
///
/// Point and triangle order is deterministic for a given dataset and
/// isovalue.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IsosurfaceMesh {
  pub points: Vec<[f32; 3]>,
  /// Triangles as indices into `points`.
  pub triangles: Vec<[u32; 3]>,
}

impl IsosurfaceMesh {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn point_count(&self) -> usize {
    self.points.len()
  }

  pub fn cell_count(&self) -> usize {
    self.triangles.len()
  }

  /// Returns true if no triangles were generated.
  pub fn is_empty(&self) -> bool {
    self.triangles.is_empty()
  }

  /// `(min, max)` over all points, or `None` for an empty mesh.
  pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
    let (first, rest) = self.points.split_first()?;
    let (mut min, mut max) = (*first, *first);
    for p in rest {
      for axis in 0..3 {
        min[axis] = min[axis].min(p[axis]);
        max[axis] = max[axis].max(p[axis]);
      }
    }
    Some((min, max))
  }

  /// Size of the uncompressed point and connectivity payload.
  pub fn payload_bytes(&self) -> usize {
    self.points.len() * 12 + self.triangles.len() * 12
  }
}
