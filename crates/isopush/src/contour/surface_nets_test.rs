use super::*;

fn plane_x(n: usize, origin: [f64; 3], spacing: [f64; 3]) -> (UniformGrid, Vec<f32>) {
  let grid = UniformGrid::new(origin, spacing, [n; 3]);
  let mut values = Vec::with_capacity(n * n * n);
  for _k in 0..n {
    for _j in 0..n {
      for i in 0..n {
        values.push(i as f32 / (n - 1) as f32);
      }
    }
  }
  (grid, values)
}

#[test]
fn test_corner_mask() {
  assert_eq!(build_corner_mask(&[1.0; 8]), 0);
  assert_eq!(build_corner_mask(&[-1.0; 8]), 255);
  let mut samples = [1.0; 8];
  samples[0] = -1.0;
  samples[7] = -0.5;
  assert_eq!(build_corner_mask(&samples), 0b1000_0001);
}

#[test]
fn test_nan_samples_are_outside() {
  assert_eq!(build_corner_mask(&[f32::NAN; 8]), 0);
}

#[test]
fn test_centroid_single_corner() {
  let mut samples = [1.0; 8];
  samples[0] = -1.0;
  let p = centroid_of_crossings(&samples);
  // Crossings at the midpoints of edges 0, 1 and 2.
  let expected = Vec3A::splat(0.5 / 3.0);
  assert!((p - expected).length() < 1e-6, "{p:?}");
}

#[test]
fn test_plane_counts() {
  let (grid, values) = plane_x(5, [0.0; 3], [1.0; 3]);
  let mesh = generate(&grid, &values, 0.6);

  // One vertex per cell in the x = 2 slab, one quad per interior x-edge.
  assert_eq!(mesh.point_count(), 16);
  assert_eq!(mesh.cell_count(), 18);

  let expected_x = 2.0 + 0.1 / 0.25;
  for p in &mesh.points {
    assert!((p[0] - expected_x).abs() < 1e-5, "{p:?}");
  }
}

#[test]
fn test_positions_follow_origin_and_spacing() {
  let (grid, values) = plane_x(5, [10.0, -4.0, 2.0], [0.5, 2.0, 3.0]);
  let mesh = generate(&grid, &values, 0.6);

  let (min, max) = mesh.bounds().unwrap();
  let expected_x = 10.0 + (2.0 + 0.1 / 0.25) * 0.5;
  assert!((min[0] - expected_x).abs() < 1e-5);
  assert!((max[0] - expected_x).abs() < 1e-5);
  assert!(min[1] >= -4.0 && max[1] <= -4.0 + 8.0);
  assert!(min[2] >= 2.0 && max[2] <= 2.0 + 12.0);
}

#[test]
fn test_isovalue_outside_range_is_empty() {
  let (grid, values) = plane_x(5, [0.0; 3], [1.0; 3]);
  assert!(generate(&grid, &values, 2.0).is_empty());
  assert!(generate(&grid, &values, -1.0).is_empty());
  assert_eq!(generate(&grid, &values, 2.0).point_count(), 0);
}

#[test]
fn test_flat_grid_is_empty() {
  let grid = UniformGrid::new([0.0; 3], [1.0; 3], [4, 4, 1]);
  let values = vec![0.0; 16];
  assert!(generate(&grid, &values, 0.5).is_empty());
}

#[test]
fn test_triangles_reference_valid_points() {
  let (grid, values) = plane_x(7, [0.0; 3], [1.0; 3]);
  let mesh = generate(&grid, &values, 0.3);
  assert!(!mesh.is_empty());
  for tri in &mesh.triangles {
    for &v in tri {
      assert!((v as usize) < mesh.point_count());
    }
    assert!(tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2]);
  }
}
