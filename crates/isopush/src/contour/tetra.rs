//! Marching tetrahedra over an unstructured mesh.
//!
//! Every cell is decomposed into tetrahedra (hexahedra into six around their
//! main diagonal). A tetrahedron with one corner on the other side of the
//! isovalue yields one triangle; a two/two split yields a quad. Crossing
//! points are keyed by their mesh edge so neighbouring tetrahedra share them.
//!
//! Triangles are wound so their normal points toward increasing values.

use std::collections::HashMap;

use glam::{DVec3, Vec3A};

use crate::dataset::UnstructuredMesh;
use crate::mesh::IsosurfaceMesh;

struct Builder<'a> {
  mesh: &'a UnstructuredMesh,
  samples: Vec<f64>,
  edges: HashMap<(u32, u32), u32>,
  output: IsosurfaceMesh,
}

impl<'a> Builder<'a> {
  /// Index of the crossing point on mesh edge `(a, b)`, created on first use.
  fn crossing(&mut self, a: u32, b: u32) -> u32 {
    let key = (a.min(b), a.max(b));
    if let Some(&index) = self.edges.get(&key) {
      return index;
    }

    // Interpolate from the lower index so the point is independent of
    // which tetrahedron reaches the edge first.
    let (lo, hi) = key;
    let s0 = self.samples[lo as usize];
    let s1 = self.samples[hi as usize];
    let t = s0 / (s0 - s1);
    let p0 = self.position(lo);
    let p1 = self.position(hi);
    let p = p0 + t * (p1 - p0);

    let index = self.output.points.len() as u32;
    self.output.points.push([p.x as f32, p.y as f32, p.z as f32]);
    self.edges.insert(key, index);
    index
  }

  #[inline]
  fn position(&self, v: u32) -> DVec3 {
    let p = self.mesh.points[v as usize];
    DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64)
  }

  #[inline]
  fn inside(&self, v: u32) -> bool {
    self.samples[v as usize] < 0.0
  }

  fn push_triangle(&mut self, tri: [u32; 3], toward: DVec3) {
    let [a, b, c] = tri.map(|i| Vec3A::from_array(self.output.points[i as usize]));
    let normal = (b - a).cross(c - a);
    let toward = Vec3A::new(toward.x as f32, toward.y as f32, toward.z as f32);
    if normal.dot(toward) < 0.0 {
      self.output.triangles.push([tri[0], tri[2], tri[1]]);
    } else {
      self.output.triangles.push(tri);
    }
  }

  fn process(&mut self, tet: [u32; 4]) {
    let (inside, outside): (Vec<u32>, Vec<u32>) = tet.iter().partition(|&&v| self.inside(v));
    if inside.is_empty() || outside.is_empty() {
      return;
    }

    // Direction from the inside corners toward the outside corners.
    let centroid = |vs: &[u32], b: &Self| {
      vs.iter().map(|&v| b.position(v)).sum::<DVec3>() / vs.len() as f64
    };
    let toward = centroid(&outside, self) - centroid(&inside, self);

    match (inside.len(), outside.len()) {
      (1, 3) | (3, 1) => {
        let (apex, base) = if inside.len() == 1 {
          (inside[0], &outside)
        } else {
          (outside[0], &inside)
        };
        let tri = [
          self.crossing(apex, base[0]),
          self.crossing(apex, base[1]),
          self.crossing(apex, base[2]),
        ];
        self.push_triangle(tri, toward);
      }
      _ => {
        let (a, b) = (inside[0], inside[1]);
        let (c, d) = (outside[0], outside[1]);
        // Cycle ac → ad → bd → bc around the quad.
        let ac = self.crossing(a, c);
        let ad = self.crossing(a, d);
        let bd = self.crossing(b, d);
        let bc = self.crossing(b, c);
        self.push_triangle([ac, ad, bd], toward);
        self.push_triangle([ac, bd, bc], toward);
      }
    }
  }
}

/// Generate the isosurface of point `values` on `mesh` at `isovalue`.
pub(super) fn generate(mesh: &UnstructuredMesh, values: &[f32], isovalue: f64) -> IsosurfaceMesh {
  let mut builder = Builder {
    mesh,
    samples: values.iter().map(|&v| v as f64 - isovalue).collect(),
    edges: HashMap::new(),
    output: IsosurfaceMesh::new(),
  };

  let mut tets = Vec::with_capacity(6);
  for cell in 0..mesh.cell_count() {
    tets.clear();
    mesh.for_each_tetra(cell, |tet| tets.push(tet));
    for &tet in &tets {
      builder.process(tet);
    }
  }

  builder.output
}

#[cfg(test)]
#[path = "tetra_test.rs"]
mod tetra_test;
