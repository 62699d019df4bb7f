//! isopush - staged isosurface reduction with a file-based offload protocol
//!
//! Reduces volumetric simulation output (uniform grids or unstructured
//! meshes) to per-field isosurface meshes, either in-process or by pushing
//! the reduction to an executor that sits next to the data and shipping only
//! the encoded geometry back.
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌───────┐   ┌──────────┐
//! │ dataset  ├──►│ resample ├──►│ contour ├──►│ codec ├──►│ pushdown │
//! │ (select) │   │ (vtu)    │   │         │   │       │   │ channel  │
//! └──────────┘   └──────────┘   └─────────┘   └───────┘   └──────────┘
//!        ▲            thresholds (shared by every mode)          │
//!        └──────────────────── pipeline + timing ◄───────────────┘
//! ```
//!
//! # Features
//!
//! - **Array selection**: only requested fields are read from storage
//! - **Resampling**: unstructured tetra/hex meshes onto a uniform grid
//! - **Surface Nets** on grids, marching tetrahedra on unstructured meshes
//! - **Mesh codec** with none / zlib / lz4 compression and failure units
//! - **Pushdown channel** with storage-blocking or completion-marker barriers
//!
//! # Example
//!
//! ```ignore
//! use isopush::{FieldThresholdTable, Pipeline, PipelineConfig, SummaryPresenter};
//!
//! let table = FieldThresholdTable::asteroid();
//! let pipeline = Pipeline::new(PipelineConfig::new(table.clone()));
//! let mut output = pipeline.run_local("run1.vtu".as_ref(), &table.all())?;
//! output.present(&mut SummaryPresenter::new())?;
//! println!("{}", output.timing);
//! ```

pub mod codec;
pub mod contour;
pub mod dataset;
pub mod error;
pub mod mesh;
pub mod pipeline;
pub mod pushdown;
pub mod resample;
pub mod thresholds;

// Re-export commonly used items
pub use codec::CompressionMode;
pub use dataset::{Dataset, DatasetHandle, DatasetKind};
pub use error::{IsoError, Result};
pub use mesh::IsosurfaceMesh;
pub use pipeline::{
  FieldMesh, ObjPresenter, Pipeline, PipelineConfig, PipelineOutput, Presenter, Stage,
  SummaryPresenter, TimingRecord,
};
pub use pushdown::{
  ChannelState, Command, CompletionMarker, Executor, PushdownChannel, ResultBarrier, ResultLayout,
  StorageBlocking,
};
pub use resample::Resampler;
pub use thresholds::{FieldSelection, FieldSpec, FieldThresholdTable};
