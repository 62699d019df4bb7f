use super::*;
use crate::dataset::{CellShape, Geometry};
use crate::pipeline::test_utils::*;

fn single_tetra() -> UnstructuredMesh {
  let mut mesh = UnstructuredMesh::new(vec![
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
  ]);
  mesh.push_cell(CellShape::Tetra, &[0, 1, 2, 3]);
  mesh
}

fn normal(mesh: &IsosurfaceMesh, tri: [u32; 3]) -> Vec3A {
  let [a, b, c] = tri.map(|i| Vec3A::from_array(mesh.points[i as usize]));
  (b - a).cross(c - a)
}

#[test]
fn test_one_corner_yields_one_triangle() {
  let out = generate(&single_tetra(), &[0.0, 1.0, 1.0, 1.0], 0.5);

  assert_eq!(out.cell_count(), 1);
  assert_eq!(out.point_count(), 3);
  let mut points = out.points.clone();
  points.sort_by(|a, b| a.partial_cmp(b).unwrap());
  assert_eq!(
    points,
    vec![[0.0, 0.0, 0.5], [0.0, 0.5, 0.0], [0.5, 0.0, 0.0]]
  );
  // Normal faces the higher values, away from the origin.
  assert!(normal(&out, out.triangles[0]).dot(Vec3A::ONE) > 0.0);
}

#[test]
fn test_inverted_field_flips_winding() {
  let out = generate(&single_tetra(), &[1.0, 0.0, 0.0, 0.0], 0.5);
  assert_eq!(out.cell_count(), 1);
  assert!(normal(&out, out.triangles[0]).dot(Vec3A::ONE) < 0.0);
}

#[test]
fn test_two_two_split_yields_quad() {
  let out = generate(&single_tetra(), &[0.0, 0.0, 1.0, 1.0], 0.5);
  assert_eq!(out.cell_count(), 2);
  assert_eq!(out.point_count(), 4);
}

#[test]
fn test_uniform_field_is_empty() {
  assert!(generate(&single_tetra(), &[1.0; 4], 0.5).is_empty());
  assert!(generate(&single_tetra(), &[0.0; 4], 0.5).is_empty());
}

#[test]
fn test_neighbouring_tetrahedra_share_crossings() {
  let dataset = asteroid_hex_mesh(5);
  let Geometry::Unstructured(mesh) = dataset.geometry() else {
    panic!("expected unstructured geometry");
  };
  let values = &dataset.field("v02").unwrap().values;
  let out = generate(mesh, values, 0.6);

  assert!(!out.is_empty());
  let mut keys: Vec<[u32; 3]> = out.points.iter().map(|p| p.map(f32::to_bits)).collect();
  keys.sort_unstable();
  let before = keys.len();
  keys.dedup();
  assert_eq!(keys.len(), before, "duplicate crossing points");

  // v02 is linear in x: every crossing lies on the plane x = 2.4.
  for p in &out.points {
    assert!((p[0] - 2.4).abs() < 1e-5, "{p:?}");
  }
}

#[test]
fn test_deterministic_output() {
  let dataset = asteroid_hex_mesh(6);
  let Geometry::Unstructured(mesh) = dataset.geometry() else {
    panic!("expected unstructured geometry");
  };
  let values = &dataset.field("v03").unwrap().values;
  let a = generate(mesh, values, 0.5);
  let b = generate(mesh, values, 0.5);
  assert_eq!(a, b);
}
