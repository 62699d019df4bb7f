//! Naive Surface Nets over a uniform grid.
//!
//! One vertex per cell whose corners straddle the isovalue, placed at the
//! centroid of the edge crossings. Quads are emitted for every crossing
//! grid edge and split along their shorter diagonal.
//!
//! ```text
//! Cell corner indices (binary: ZYX):
//!   0 = (0,0,0)    4 = (0,0,1)
//!   1 = (1,0,0)    5 = (1,0,1)
//!   2 = (0,1,0)    6 = (0,1,1)
//!   3 = (1,1,0)    7 = (1,1,1)
//! ```
//!
//! Samples are shifted by the isovalue so that `s = value - iso`; a corner is
//! inside when `s < 0`.

use glam::Vec3A;

use crate::dataset::UniformGrid;
use crate::mesh::IsosurfaceMesh;

/// Corner positions within the unit cell, indexed by corner bits.
const CORNER_POSITIONS: [Vec3A; 8] = [
  Vec3A::new(0.0, 0.0, 0.0),
  Vec3A::new(1.0, 0.0, 0.0),
  Vec3A::new(0.0, 1.0, 0.0),
  Vec3A::new(1.0, 1.0, 0.0),
  Vec3A::new(0.0, 0.0, 1.0),
  Vec3A::new(1.0, 0.0, 1.0),
  Vec3A::new(0.0, 1.0, 1.0),
  Vec3A::new(1.0, 1.0, 1.0),
];

/// The 12 cube edges as corner pairs.
const CUBE_EDGES: [[usize; 2]; 12] = [
  [0, 1],
  [0, 2],
  [0, 4],
  [1, 3],
  [1, 5],
  [2, 3],
  [2, 6],
  [3, 7],
  [4, 5],
  [4, 6],
  [5, 7],
  [6, 7],
];

/// Corner reached from corner 0 along each axis.
const AXIS_CORNER: [usize; 3] = [1, 2, 4];

const NO_VERTEX: u32 = u32::MAX;

/// Per-cell vertex indices for the whole grid.
struct IndexBuffer {
  data: Vec<u32>,
  cells: [usize; 3],
}

impl IndexBuffer {
  fn new(cells: [usize; 3]) -> Self {
    Self {
      data: vec![NO_VERTEX; cells[0] * cells[1] * cells[2]],
      cells,
    }
  }

  #[inline]
  fn index(&self, [x, y, z]: [usize; 3]) -> usize {
    x + self.cells[0] * (y + self.cells[1] * z)
  }

  #[inline]
  fn get(&self, pos: [usize; 3]) -> Option<u32> {
    let value = self.data[self.index(pos)];
    (value != NO_VERTEX).then_some(value)
  }

  #[inline]
  fn set(&mut self, pos: [usize; 3], value: u32) {
    let idx = self.index(pos);
    self.data[idx] = value;
  }
}

/// Generate the isosurface of `values` (point data on `grid`) at `isovalue`.
pub(super) fn generate(grid: &UniformGrid, values: &[f32], isovalue: f64) -> IsosurfaceMesh {
  let mut output = IsosurfaceMesh::new();
  let [nx, ny, nz] = grid.dims;
  if nx < 2 || ny < 2 || nz < 2 {
    return output;
  }

  let cells = [nx - 1, ny - 1, nz - 1];
  let mut index_buffer = IndexBuffer::new(cells);
  let iso = isovalue as f32;

  // Offsets of the 8 corners relative to a cell's base point.
  let corner_offsets: [usize; 8] = std::array::from_fn(|c| {
    grid.point_index(c & 1, (c >> 1) & 1, (c >> 2) & 1)
  });

  let origin = Vec3A::new(
    grid.origin[0] as f32,
    grid.origin[1] as f32,
    grid.origin[2] as f32,
  );
  let spacing = Vec3A::new(
    grid.spacing[0] as f32,
    grid.spacing[1] as f32,
    grid.spacing[2] as f32,
  );

  // Z outermost so the traversal follows storage order.
  for z in 0..cells[2] {
    for y in 0..cells[1] {
      for x in 0..cells[0] {
        let base = grid.point_index(x, y, z);
        let samples: [f32; 8] = std::array::from_fn(|c| values[base + corner_offsets[c]] - iso);

        let corner_mask = build_corner_mask(&samples);
        if corner_mask == 0 || corner_mask == 255 {
          continue;
        }

        let local = centroid_of_crossings(&samples);
        let cell_origin = Vec3A::new(x as f32, y as f32, z as f32);
        let position = origin + (cell_origin + local) * spacing;

        let vertex_index = output.points.len() as u32;
        index_buffer.set([x, y, z], vertex_index);
        output.points.push(position.to_array());

        emit_triangles([x, y, z], corner_mask, &samples, &index_buffer, &mut output);
      }
    }
  }

  output
}

/// Bit `c` set when corner `c` is inside (`s < 0`). NaN counts as outside.
#[inline]
fn build_corner_mask(samples: &[f32; 8]) -> u8 {
  samples
    .iter()
    .enumerate()
    .fold(0u8, |mask, (c, &s)| if s < 0.0 { mask | (1 << c) } else { mask })
}

/// Centroid of the edge crossing points, in cell-local coordinates.
#[inline]
fn centroid_of_crossings(samples: &[f32; 8]) -> Vec3A {
  let mut sum = Vec3A::ZERO;
  let mut count = 0u32;

  for &[c0, c1] in &CUBE_EDGES {
    let s0 = samples[c0];
    let s1 = samples[c1];
    if (s0 < 0.0) != (s1 < 0.0) {
      // A NaN corner counts as outside; place its crossing mid-edge.
      let t = s0 / (s0 - s1);
      let t = if t.is_nan() { 0.5 } else { t };
      let p0 = CORNER_POSITIONS[c0];
      let p1 = CORNER_POSITIONS[c1];
      sum += p0 + t * (p1 - p0);
      count += 1;
    }
  }

  if count == 0 {
    return Vec3A::splat(0.5);
  }
  sum / count as f32
}

/// Emit quads for the crossing edges leaving corner 0 of this cell.
///
/// The quad around an edge along `axis` joins the four cells that share it,
/// all of which precede this one in traversal order.
fn emit_triangles(
  pos: [usize; 3],
  corner_mask: u8,
  samples: &[f32; 8],
  index_buffer: &IndexBuffer,
  output: &mut IsosurfaceMesh,
) {
  // Flip winding when corner 0 is outside.
  let flip = (corner_mask & 1) == 0;

  for axis in 0..3 {
    let far = samples[AXIS_CORNER[axis]];
    if (samples[0] < 0.0) == (far < 0.0) {
      continue;
    }

    let u = (axis + 1) % 3;
    let v = (axis + 2) % 3;
    if pos[u] == 0 || pos[v] == 0 {
      continue;
    }

    let mut pos_b = pos;
    pos_b[u] -= 1;
    pos_b[v] -= 1;
    let mut pos_c = pos;
    pos_c[u] -= 1;
    let mut pos_d = pos;
    pos_d[v] -= 1;

    let (Some(v_a), Some(v_b), Some(v_c), Some(v_d)) = (
      index_buffer.get(pos),
      index_buffer.get(pos_b),
      index_buffer.get(pos_c),
      index_buffer.get(pos_d),
    ) else {
      continue;
    };

    let p = |i: u32| Vec3A::from_array(output.points[i as usize]);
    let diag_ab = p(v_a).distance_squared(p(v_b));
    let diag_cd = p(v_c).distance_squared(p(v_d));

    let quad = if diag_ab < diag_cd {
      if flip {
        [[v_a, v_d, v_b], [v_a, v_b, v_c]]
      } else {
        [[v_a, v_b, v_d], [v_a, v_c, v_b]]
      }
    } else if flip {
      [[v_c, v_d, v_b], [v_c, v_a, v_d]]
    } else {
      [[v_c, v_b, v_d], [v_c, v_d, v_a]]
    };
    output.triangles.extend_from_slice(&quad);
  }
}

#[cfg(test)]
#[path = "surface_nets_test.rs"]
mod surface_nets_test;
