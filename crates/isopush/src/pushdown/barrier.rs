//! Rendezvous between requester and executor.
//!
//! ```text
//! requester                                  executor
//! ─────────                                  ────────
//! reset(result paths)
//! publish(command) ───────────────────────►  is_complete(command)
//!                                            read + retire command
//!                                            publish(result i)
//! wait_for(result i)  ◄────────────────────  (marker appears)
//! read result i
//! ```
//!
//! Both barriers write a unit to `<path>.partial` and rename it into place,
//! so `<path>` never holds a half-written unit.
//!
//! [`StorageBlocking`] relies on the storage layer: a read of a result path
//! must block until the executor has finished writing it (a synchronizing
//! virtual filesystem provides this). Nothing waits on this side.
//!
//! [`CompletionMarker`] makes the rendezvous explicit on a plain filesystem:
//! after the rename, `<path>.done` is created. A reader that sees the marker
//! is guaranteed to see the complete unit.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use web_time::Instant;

use crate::error::{IsoError, Result};

/// Visibility protocol shared by both ends of a pushdown channel.
pub trait ResultBarrier {
  /// Forget any completion state left at `path` by an earlier exchange.
  fn reset(&self, path: &Path) -> Result<()>;

  /// Make `bytes` visible at `path` as one complete unit.
  fn publish(&self, path: &Path, bytes: &[u8]) -> Result<()>;

  /// Whether a complete unit is visible at `path`. Never blocks.
  fn is_complete(&self, path: &Path) -> bool;

  /// Block until a complete unit is visible at `path`.
  fn wait_for(&self, path: &Path) -> Result<()>;
}

/// Write `bytes` to `path` with create, truncate, flush and sync. Any failure
/// is an `IoFailure`; partial writes are not retried.
pub fn write_checked(path: &Path, bytes: &[u8]) -> Result<()> {
  let mut file = OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(true)
    .open(path)
    .map_err(|e| IsoError::io(path, e))?;
  file.write_all(bytes).map_err(|e| IsoError::io(path, e))?;
  file.flush().map_err(|e| IsoError::io(path, e))?;
  file.sync_all().map_err(|e| IsoError::io(path, e))?;
  Ok(())
}

/// Remove `path`, treating "already gone" as success.
pub(crate) fn remove_if_present(path: &Path) -> Result<bool> {
  match fs::remove_file(path) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(IsoError::io(path, e)),
  }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
  let mut name = OsString::from(path.as_os_str());
  name.push(suffix);
  PathBuf::from(name)
}

const PARTIAL_SUFFIX: &str = ".partial";

/// Write `bytes` next to `path` and rename them into place.
fn publish_renamed(path: &Path, bytes: &[u8]) -> Result<()> {
  let partial = with_suffix(path, PARTIAL_SUFFIX);
  write_checked(&partial, bytes)?;
  fs::rename(&partial, path).map_err(|e| IsoError::io(path, e))
}

// =============================================================================
// StorageBlocking
// =============================================================================

/// Storage-provided blocking. Requires that reads of a result path block
/// until the executor's write is complete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageBlocking;

impl ResultBarrier for StorageBlocking {
  fn reset(&self, path: &Path) -> Result<()> {
    remove_if_present(&with_suffix(path, PARTIAL_SUFFIX))?;
    Ok(())
  }

  fn publish(&self, path: &Path, bytes: &[u8]) -> Result<()> {
    publish_renamed(path, bytes)
  }

  fn is_complete(&self, path: &Path) -> bool {
    path.exists()
  }

  fn wait_for(&self, _path: &Path) -> Result<()> {
    Ok(())
  }
}

// =============================================================================
// CompletionMarker
// =============================================================================

/// Marker files polled at a fixed interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletionMarker {
  pub poll_interval: Duration,
  /// `None` waits forever.
  pub timeout: Option<Duration>,
}

impl Default for CompletionMarker {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_millis(10),
      timeout: None,
    }
  }
}

impl CompletionMarker {
  pub const MARKER_SUFFIX: &'static str = ".done";
  pub const PARTIAL_SUFFIX: &'static str = PARTIAL_SUFFIX;

  pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
    Self {
      poll_interval,
      timeout,
    }
  }

  pub fn marker_path(path: &Path) -> PathBuf {
    with_suffix(path, Self::MARKER_SUFFIX)
  }

  pub fn partial_path(path: &Path) -> PathBuf {
    with_suffix(path, Self::PARTIAL_SUFFIX)
  }
}

impl ResultBarrier for CompletionMarker {
  fn reset(&self, path: &Path) -> Result<()> {
    let marker = Self::marker_path(path);
    if remove_if_present(&marker)? {
      tracing::warn!(marker = %marker.display(), "cleared stale completion marker");
    }
    remove_if_present(&Self::partial_path(path))?;
    Ok(())
  }

  fn publish(&self, path: &Path, bytes: &[u8]) -> Result<()> {
    publish_renamed(path, bytes)?;
    write_checked(&Self::marker_path(path), &[])
  }

  fn is_complete(&self, path: &Path) -> bool {
    Self::marker_path(path).exists()
  }

  fn wait_for(&self, path: &Path) -> Result<()> {
    let start = Instant::now();
    loop {
      if self.is_complete(path) {
        return Ok(());
      }
      if let Some(timeout) = self.timeout {
        if start.elapsed() >= timeout {
          return Err(IsoError::ResultTimeout {
            path: path.to_path_buf(),
          });
        }
      }
      std::thread::sleep(self.poll_interval);
    }
  }
}

#[cfg(test)]
#[path = "barrier_test.rs"]
mod barrier_test;
