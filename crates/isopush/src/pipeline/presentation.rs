//! Render stage: hand extracted meshes to a sink.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Presentation Stage                                               │
//! │                                                                  │
//! │   Vec<FieldMesh> ──► Presenter::present                          │
//! │                        ├─ SummaryPresenter → "<field>-mesh, c, p" │
//! │                        └─ ObjPresenter     → scene.obj + .mtl     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pipeline times the call as the `render` stage whichever sink is used.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::FieldMesh;
use crate::error::{IsoError, Result};

/// Consumer of a finished run's meshes.
pub trait Presenter {
  fn present(&mut self, meshes: &[FieldMesh]) -> Result<()>;
}

/// One `<field>-mesh, <cells>, <points>` line per mesh.
#[derive(Clone, Debug, Default)]
pub struct SummaryPresenter {
  lines: Vec<String>,
}

impl SummaryPresenter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn lines(&self) -> &[String] {
    &self.lines
  }
}

impl Presenter for SummaryPresenter {
  fn present(&mut self, meshes: &[FieldMesh]) -> Result<()> {
    for m in meshes {
      let line = format!(
        "{}-mesh, {}, {}",
        m.spec.name,
        m.mesh.cell_count(),
        m.mesh.point_count()
      );
      tracing::debug!("{line}");
      self.lines.push(line);
    }
    Ok(())
  }
}

/// Wavefront OBJ export: one group per field, tinted through a sibling
/// `.mtl` library.
#[derive(Clone, Debug)]
pub struct ObjPresenter {
  path: PathBuf,
}

impl ObjPresenter {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn material_path(&self) -> PathBuf {
    self.path.with_extension("mtl")
  }

  fn write_obj(&self, meshes: &[FieldMesh]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(&self.path)?);
    if let Some(name) = self.material_path().file_name() {
      writeln!(out, "mtllib {}", name.to_string_lossy())?;
    }

    // OBJ indices are 1-based and global across groups.
    let mut offset = 1u64;
    for m in meshes {
      writeln!(out, "g {}", m.spec.name)?;
      writeln!(out, "usemtl {}", m.spec.name)?;
      if let Some((min, max)) = m.mesh.bounds() {
        writeln!(
          out,
          "# bounds {} {} {} {} {} {}",
          min[0], min[1], min[2], max[0], max[1], max[2]
        )?;
      }
      for p in &m.mesh.points {
        writeln!(out, "v {} {} {}", p[0], p[1], p[2])?;
      }
      for t in &m.mesh.triangles {
        writeln!(
          out,
          "f {} {} {}",
          offset + t[0] as u64,
          offset + t[1] as u64,
          offset + t[2] as u64
        )?;
      }
      offset += m.mesh.point_count() as u64;
    }
    out.flush()
  }

  fn write_mtl(&self, meshes: &[FieldMesh]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(self.material_path())?);
    for m in meshes {
      let [r, g, b] = m.spec.tint;
      writeln!(out, "newmtl {}", m.spec.name)?;
      writeln!(out, "Kd {r} {g} {b}")?;
    }
    out.flush()
  }
}

impl Presenter for ObjPresenter {
  fn present(&mut self, meshes: &[FieldMesh]) -> Result<()> {
    self
      .write_obj(meshes)
      .map_err(|e| IsoError::io(&self.path, e))?;
    let mtl = self.material_path();
    self.write_mtl(meshes).map_err(|e| IsoError::io(&mtl, e))?;
    tracing::info!(
      path = %self.path.display(),
      groups = meshes.len(),
      "wrote obj scene"
    );
    Ok(())
  }
}

#[cfg(test)]
#[path = "presentation_test.rs"]
mod presentation_test;
