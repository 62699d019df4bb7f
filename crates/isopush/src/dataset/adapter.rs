//! Open → select → load.
//!
//! `open` reads only the container header. `select_fields` narrows which
//! point/cell arrays will be read; `load` then seeks to exactly those blocks
//! and strips bookkeeping arrays before handing the dataset on. Under a
//! selection, dataset-level metadata blocks are skipped as well.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use super::format::{self, GeometryHeader, Header};
use super::{Association, Dataset, DatasetKind, Geometry, ScalarField};
use crate::error::{IsoError, Result};

/// Bytes pulled from storage by one `load`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
  pub bytes_read: u64,
  pub arrays_read: usize,
}

/// An opened dataset whose arrays have not been read yet.
#[derive(Debug)]
pub struct DatasetHandle {
  path: PathBuf,
  kind: DatasetKind,
  file: File,
  header: Header,
  payload_start: u64,
  selection: Option<BTreeSet<String>>,
}

impl DatasetHandle {
  /// Open a dataset and read its header.
  ///
  /// Fails with `UnsupportedKind` if the suffix is not a known kind.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let kind = DatasetKind::from_path(path)?;
    let mut file = File::open(path).map_err(|e| IsoError::io(path, e))?;
    let (header, payload_start) = format::read_header(path, &mut file)?;

    if header.kind != kind {
      return Err(IsoError::corrupt_dataset(
        path,
        format!("suffix says {:?} but header says {:?}", kind, header.kind),
      ));
    }

    tracing::debug!(path = %path.display(), ?kind, arrays = header.arrays.len(), "opened dataset");

    Ok(Self {
      path: path.to_path_buf(),
      kind,
      file,
      header,
      payload_start,
      selection: None,
    })
  }

  pub fn kind(&self) -> DatasetKind {
    self.kind
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Names of the scalar (point or cell) arrays stored in the file.
  pub fn available_fields(&self) -> impl Iterator<Item = &str> {
    self
      .header
      .arrays
      .iter()
      .filter(|a| a.association != Association::Field)
      .map(|a| a.name.as_str())
  }

  /// Restrict which scalar arrays `load` will read. Replaces any earlier
  /// selection.
  pub fn select_fields<I, S>(&mut self, names: I)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.selection = Some(names.into_iter().map(Into::into).collect());
  }

  /// Read geometry and the selected arrays, then strip bookkeeping arrays.
  ///
  /// Without a selection every scalar array is read.
  pub fn load(self) -> Result<Dataset> {
    self.load_with_stats().map(|(dataset, _)| dataset)
  }

  pub fn load_with_stats(mut self) -> Result<(Dataset, LoadStats)> {
    let path = self.path.clone();
    let mut stats = LoadStats {
      bytes_read: self.payload_start,
      arrays_read: 0,
    };

    if let Some(selection) = &self.selection {
      for name in selection {
        if !self.available_fields().any(|f| f == name) {
          return Err(IsoError::FieldNotLoaded { name: name.clone() });
        }
      }
    }

    let geometry = match &self.header.geometry {
      GeometryHeader::Grid(grid) => Geometry::Grid(*grid),
      GeometryHeader::Unstructured {
        points,
        cell_types,
        offsets,
        connectivity,
      } => {
        let (mesh, bytes) = format::read_unstructured(
          &path,
          &mut self.file,
          self.payload_start,
          [points, cell_types, offsets, connectivity],
        )?;
        stats.bytes_read += bytes;
        Geometry::Unstructured(mesh)
      }
    };
    let mut dataset = Dataset::new(geometry);

    for entry in &self.header.arrays {
      let wanted = match (&self.selection, entry.association) {
        (None, _) => true,
        // Dataset-level metadata is stripped below anyway.
        (Some(_), Association::Field) => false,
        (Some(selection), _) => selection.contains(&entry.name),
      };
      if !wanted {
        continue;
      }

      let (words, bytes) =
        format::read_block(&path, &mut self.file, self.payload_start, &entry.block)?;
      let values = format::words_to_f32(words);

      let expected = match entry.association {
        Association::Point => Some(dataset.point_count()),
        Association::Cell => Some(dataset.cell_count()),
        Association::Field => None,
      };
      if let Some(expected) = expected {
        if values.len() != expected {
          return Err(IsoError::corrupt_dataset(
            &path,
            format!(
              "array `{}` has {} values, expected {}",
              entry.name,
              values.len(),
              expected
            ),
          ));
        }
      }

      stats.bytes_read += bytes;
      stats.arrays_read += 1;
      dataset.insert_field(ScalarField::new(entry.name.clone(), entry.association, values));
    }

    dataset.strip_bookkeeping();

    tracing::debug!(
      path = %path.display(),
      fields = ?dataset.field_names().collect::<Vec<_>>(),
      bytes = stats.bytes_read,
      "loaded dataset"
    );

    Ok((dataset, stats))
  }
}
