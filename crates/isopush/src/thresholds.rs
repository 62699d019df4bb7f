//! Field → isovalue table.
//!
//! Entries are domain constants. The same table instance is handed to the
//! local pipeline, the pushdown requester and the executor so that every
//! execution mode extracts the same surface for the same field.
//!
//! | Preset     | Field            | Isovalue | Tint                  |
//! |------------|------------------|----------|-----------------------|
//! | `asteroid` | `v02`            | 0.8      | (0.012, 0.686, 1.0)   |
//! | `asteroid` | `v03`            | 0.5      | (1.0, 0.333, 0.0)     |
//! | `asteroid` | `tev`            | 0.1      | (0.816, 0.816, 0.0)   |
//! | `nyx`      | `baryon_density` | 81.66    | (1.0, 0.333, 0.0)     |

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{IsoError, Result};

/// Linear RGB surface tint.
pub type Tint = [f32; 3];

/// One table entry.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldThreshold {
  pub name: &'static str,
  pub isovalue: f64,
  pub tint: Tint,
}

/// A field selected for extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
  pub name: String,
  pub isovalue: f64,
  pub tint: Tint,
  pub enabled: bool,
}

impl FieldSpec {
  /// Same field with a different isovalue.
  pub fn with_isovalue(mut self, isovalue: f64) -> Self {
    self.isovalue = isovalue;
    self
  }

  pub fn disabled(mut self) -> Self {
    self.enabled = false;
    self
  }
}

/// Selected fields in table order. Most runs select at most three.
pub type FieldSelection = SmallVec<[FieldSpec; 4]>;

/// Immutable, cheaply cloned threshold table.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldThresholdTable {
  entries: Arc<[FieldThreshold]>,
}

impl FieldThresholdTable {
  pub fn new(entries: Vec<FieldThreshold>) -> Self {
    Self {
      entries: entries.into(),
    }
  }

  /// Asteroid impact (water, asteroid material, temperature).
  pub fn asteroid() -> Self {
    Self::new(vec![
      FieldThreshold {
        name: "v02",
        isovalue: 0.8,
        tint: [0.012, 0.686, 1.0],
      },
      FieldThreshold {
        name: "v03",
        isovalue: 0.5,
        tint: [1.0, 0.333, 0.0],
      },
      FieldThreshold {
        name: "tev",
        isovalue: 0.1,
        tint: [0.816, 0.816, 0.0],
      },
    ])
  }

  /// Nyx cosmology (baryon density).
  pub fn nyx() -> Self {
    Self::new(vec![FieldThreshold {
      name: "baryon_density",
      isovalue: 81.66,
      tint: [1.0, 0.333, 0.0],
    }])
  }

  /// Isovalue and tint for a field, or `UnknownField`.
  pub fn lookup(&self, name: &str) -> Result<(f64, Tint)> {
    self
      .entry(name)
      .map(|e| (e.isovalue, e.tint))
      .ok_or_else(|| IsoError::UnknownField {
        name: name.to_string(),
      })
  }

  /// Position of a field in table order.
  pub fn index_of(&self, name: &str) -> Result<usize> {
    self
      .entries
      .iter()
      .position(|e| e.name == name)
      .ok_or_else(|| IsoError::UnknownField {
        name: name.to_string(),
      })
  }

  /// Enabled spec for a known field.
  pub fn spec(&self, name: &str) -> Result<FieldSpec> {
    let (isovalue, tint) = self.lookup(name)?;
    Ok(FieldSpec {
      name: name.to_string(),
      isovalue,
      tint,
      enabled: true,
    })
  }

  /// Specs for the named fields, in the order given.
  pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<FieldSelection> {
    names.into_iter().map(|name| self.spec(name)).collect()
  }

  /// Every field, enabled.
  pub fn all(&self) -> FieldSelection {
    self
      .entries
      .iter()
      .map(|e| FieldSpec {
        name: e.name.to_string(),
        isovalue: e.isovalue,
        tint: e.tint,
        enabled: true,
      })
      .collect()
  }

  pub fn entries(&self) -> &[FieldThreshold] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn entry(&self, name: &str) -> Option<&FieldThreshold> {
    self.entries.iter().find(|e| e.name == name)
  }
}

#[cfg(test)]
#[path = "thresholds_test.rs"]
mod thresholds_test;
