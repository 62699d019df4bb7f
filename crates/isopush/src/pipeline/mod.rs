//! Pipeline driver.
//!
//! ```text
//! local     ┌────┐   ┌──────────┐   ┌─────────┐                           ┌────────┐
//!           │ io ├──►│ resample ├──►│ contour ├──────────────────────────►│ render │
//!           └────┘   └──────────┘   └─────────┘                           └────────┘
//!                     (vtu only)
//!
//! pushdown  ┌──────────────────────────────────────────────┐   ┌────────┐ ┌────────┐
//!           │ round_trip: send ► executor (io … encode) ► read ├──►│ decode ├►│ render │
//!           └──────────────────────────────────────────────┘   └────────┘ └────────┘
//! ```
//!
//! Every stage finishes before the next one starts. Both modes produce
//! [`FieldMesh`]es in the same order with the same counts for equal inputs,
//! so either output can be handed to the same presenter.

pub mod presentation;
pub mod timing;

#[cfg(test)]
pub mod test_utils;


pub use presentation::{ObjPresenter, Presenter, SummaryPresenter};
pub use timing::{Stage, TimingRecord};

use std::path::Path;

use crate::codec::{self, CompressionMode};
use crate::contour;
use crate::dataset::{DatasetHandle, DatasetKind, LoadStats};
use crate::error::Result;
use crate::mesh::IsosurfaceMesh;
use crate::pushdown::{Command, PushdownChannel, ResultBarrier};
use crate::resample::Resampler;
use crate::thresholds::{FieldSpec, FieldThresholdTable};

/// Immutable pipeline configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
  pub table: FieldThresholdTable,
  /// Resampling resolution for unstructured input; `None` contours the mesh
  /// directly.
  pub resample: Option<[usize; 3]>,
  /// Read only the requested arrays from storage.
  pub select_arrays: bool,
}

impl PipelineConfig {
  pub fn new(table: FieldThresholdTable) -> Self {
    Self {
      table,
      resample: Some(Resampler::DEFAULT_DIMS),
      select_arrays: true,
    }
  }

  pub fn with_resample(mut self, dims: Option<[usize; 3]>) -> Self {
    self.resample = dims;
    self
  }

  pub fn with_select_arrays(mut self, select: bool) -> Self {
    self.select_arrays = select;
    self
  }

  pub fn resampler(&self) -> Option<Resampler> {
    self.resample.map(Resampler::new)
  }
}

/// The extracted surface of one field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldMesh {
  pub spec: FieldSpec,
  pub mesh: IsosurfaceMesh,
}

/// Meshes plus everything measured while producing them.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
  pub meshes: Vec<FieldMesh>,
  pub timing: TimingRecord,
  /// Dataset bytes read (local) or result bytes transferred (pushdown).
  pub bytes_moved: u64,
}

impl PipelineOutput {
  /// Hand the meshes to a presenter, timed as the render stage.
  pub fn present(&mut self, presenter: &mut dyn Presenter) -> Result<()> {
    let _span = tracing::info_span!("render").entered();
    let meshes = &self.meshes;
    self.timing.time(Stage::Render, || presenter.present(meshes))
  }

  pub fn mesh(&self, field: &str) -> Option<&IsosurfaceMesh> {
    self
      .meshes
      .iter()
      .find(|m| m.spec.name == field)
      .map(|m| &m.mesh)
  }
}

/// Load, resample and contour the enabled `fields` of one dataset.
///
/// Shared by the local driver and the executor so both extract identical
/// surfaces.
pub(crate) fn reduce(
  config: &PipelineConfig,
  dataset_path: &Path,
  fields: &[FieldSpec],
  timing: &mut TimingRecord,
) -> Result<(Vec<FieldMesh>, LoadStats)> {
  let mut enabled = Vec::new();
  for spec in fields.iter().filter(|s| s.enabled) {
    enabled.push((config.table.index_of(&spec.name)?, spec));
  }
  // Table order, matching the result order of a pushdown command.
  enabled.sort_by_key(|(index, _)| *index);
  let enabled: Vec<&FieldSpec> = enabled.into_iter().map(|(_, spec)| spec).collect();

  let (dataset, stats) = timing.time(Stage::Io, || {
    let _span = tracing::info_span!("io", path = %dataset_path.display()).entered();
    let mut handle = DatasetHandle::open(dataset_path)?;
    if config.select_arrays {
      handle.select_fields(enabled.iter().map(|s| s.name.as_str()));
    }
    handle.load_with_stats()
  })?;
  tracing::info!(
    path = %dataset_path.display(),
    kind = ?dataset.kind(),
    points = dataset.point_count(),
    cells = dataset.cell_count(),
    bytes = stats.bytes_read,
    "dataset loaded"
  );

  let dataset = match (dataset.kind(), config.resampler()) {
    (DatasetKind::Unstructured, Some(resampler)) => {
      timing.time(Stage::Resample, || resampler.resample(dataset))?
    }
    _ => dataset,
  };

  let meshes = timing.time(Stage::Contour, || {
    enabled
      .iter()
      .map(|spec| {
        Ok(FieldMesh {
          spec: (*spec).clone(),
          mesh: contour::extract(&dataset, spec)?,
        })
      })
      .collect::<Result<Vec<_>>>()
  })?;

  for m in &meshes {
    tracing::info!(
      field = %m.spec.name,
      cells = m.mesh.cell_count(),
      points = m.mesh.point_count(),
      "{}-mesh",
      m.spec.name
    );
  }

  Ok((meshes, stats))
}

/// Drives one dataset through the local or pushdown variant.
#[derive(Clone, Debug)]
pub struct Pipeline {
  config: PipelineConfig,
}

impl Pipeline {
  pub fn new(config: PipelineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn table(&self) -> &FieldThresholdTable {
    &self.config.table
  }

  /// Reduce in-process.
  pub fn run_local(&self, dataset_path: &Path, fields: &[FieldSpec]) -> Result<PipelineOutput> {
    let _span = tracing::info_span!("run_local").entered();
    let mut timing = TimingRecord::new();
    let (meshes, stats) = reduce(&self.config, dataset_path, fields, &mut timing)?;
    Ok(PipelineOutput {
      meshes,
      timing,
      bytes_moved: stats.bytes_read,
    })
  }

  /// Delegate the reduction to an executor over `channel`.
  ///
  /// The dataset kind is checked before anything is written, so an
  /// unsupported path never produces a command.
  pub fn run_pushdown<B: ResultBarrier>(
    &self,
    channel: &mut PushdownChannel<B>,
    dataset_path: &Path,
    fields: &[FieldSpec],
    compression: CompressionMode,
  ) -> Result<PipelineOutput> {
    let _span = tracing::info_span!("run_pushdown").entered();
    DatasetKind::from_path(dataset_path)?;
    let command = Command::for_request(dataset_path, &self.config.table, fields, compression)?;

    let mut timing = TimingRecord::new();
    let units = timing.time(Stage::RoundTrip, || {
      let paths = channel.send_command(&command)?;
      channel.receive_result(&paths)
    })?;
    let bytes_moved: u64 = units.iter().map(|u| u.len() as u64).sum();

    let specs: Vec<FieldSpec> = command
      .result_slots()
      .map(|(_, spec)| spec.clone())
      .collect();
    let meshes = timing.time(Stage::Decode, || {
      specs
        .into_iter()
        .zip(&units)
        .map(|(spec, unit)| {
          Ok(FieldMesh {
            spec,
            mesh: codec::decode(unit)?,
          })
        })
        .collect::<Result<Vec<_>>>()
    })?;
    channel.acknowledge()?;

    tracing::info!(
      command = %command,
      results = meshes.len(),
      bytes = bytes_moved,
      "pushdown round trip complete"
    );

    Ok(PipelineOutput {
      meshes,
      timing,
      bytes_moved,
    })
  }
}
