//! Error kinds shared by every stage of the reduction pipeline.
//!
//! None of these are recovered locally. A failed stage or offload round-trip
//! aborts the whole run; the binary reports the error and exits non-zero.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IsoError>;

#[derive(Debug, Error)]
pub enum IsoError {
  /// Dataset path suffix does not name a known dataset kind.
  #[error("unsupported dataset kind for {path}: expected a .vti or .vtu suffix")]
  UnsupportedKind { path: PathBuf },

  /// Read or write of a dataset, command, or result file failed.
  #[error("I/O failure on {path}: {source}")]
  IoFailure {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Requested field is not in the threshold table.
  #[error("unknown field `{name}`")]
  UnknownField { name: String },

  /// Field is known to the table but was not materialized in the dataset.
  #[error("field `{name}` is not loaded in the dataset")]
  FieldNotLoaded { name: String },

  /// Field is loaded but its layout cannot be contoured.
  #[error("field `{name}` cannot be contoured: {reason}")]
  InvalidField { name: String, reason: String },

  /// Channel operation issued out of state-machine order.
  #[error("pushdown protocol misuse: {operation} while channel is {state}")]
  ProtocolMisuse {
    operation: &'static str,
    state: &'static str,
  },

  /// Command text does not parse to a known token layout.
  #[error("bad command format: {reason} (in `{line}`)")]
  BadCommandFormat { line: String, reason: String },

  /// Dataset container bytes are malformed.
  #[error("corrupt dataset {path}: {reason}")]
  CorruptDataset { path: PathBuf, reason: String },

  /// Dataset pieces cannot be combined into one dataset.
  #[error("cannot append dataset pieces: {reason}")]
  IncompatiblePieces { reason: String },

  /// Mesh transfer unit bytes are malformed.
  #[error("corrupt mesh transfer unit: {reason}")]
  CorruptMesh { reason: String },

  /// The executor published an explicit failure result.
  #[error("offload executor failed: {message}")]
  ExecutorFailure { message: String },

  /// Completion marker did not appear before the configured deadline.
  #[error("timed out waiting for result {path}")]
  ResultTimeout { path: PathBuf },
}

impl IsoError {
  pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
    IsoError::IoFailure {
      path: path.as_ref().to_path_buf(),
      source,
    }
  }

  pub fn corrupt_dataset(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
    IsoError::CorruptDataset {
      path: path.as_ref().to_path_buf(),
      reason: reason.into(),
    }
  }

  pub fn corrupt_mesh(reason: impl Into<String>) -> Self {
    IsoError::CorruptMesh {
      reason: reason.into(),
    }
  }

  pub fn bad_command(line: impl Into<String>, reason: impl Into<String>) -> Self {
    IsoError::BadCommandFormat {
      line: line.into(),
      reason: reason.into(),
    }
  }
}
