//! File-based offload protocol.
//!
//! ```text
//!        requester                                         executor
//! ┌───────────────────────┐   command file (one line)   ┌──────────────────────┐
//! │ PushdownChannel       │ ──────────────────────────► │ Executor             │
//! │  Idle                 │                             │  parse + retire      │
//! │  → CommandWritten     │                             │  load (selected)     │
//! │  → AwaitingResult     │   <prefix>0, <prefix>1, …   │  resample            │
//! │  → ResultAvailable    │ ◄────────────────────────── │  contour + encode    │
//! │  → Idle               │     (ResultBarrier)         │  publish             │
//! └───────────────────────┘                             └──────────────────────┘
//! ```
//!
//! The two sides share no memory. Coordination is entirely filesystem
//! visibility plus the out-of-band [`ResultLayout`] naming convention. One
//! command may be outstanding per channel; running two channels against the
//! same paths is undefined.

mod barrier;
mod channel;
mod command;
mod executor;

pub use barrier::{write_checked, CompletionMarker, ResultBarrier, StorageBlocking};
pub use channel::{ChannelState, PushdownChannel};
pub use command::{Command, CommandForm};
pub use executor::{ExecutionReport, Executor};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Default command path used by the storage-resident executor.
pub const DEFAULT_COMMAND_PATH: &str = "/fuse/command";

/// Default result prefix; results land at `/fuse/result0`, `/fuse/result1`, …
pub const DEFAULT_RESULT_PREFIX: &str = "/fuse/result";

/// Result naming convention: the result at index `i` lives at `<prefix><i>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultLayout {
  prefix: PathBuf,
}

impl Default for ResultLayout {
  fn default() -> Self {
    Self::new(DEFAULT_RESULT_PREFIX)
  }
}

impl ResultLayout {
  pub fn new(prefix: impl Into<PathBuf>) -> Self {
    Self {
      prefix: prefix.into(),
    }
  }

  pub fn prefix(&self) -> &Path {
    &self.prefix
  }

  pub fn path(&self, index: usize) -> PathBuf {
    let mut name = OsString::from(self.prefix.as_os_str());
    name.push(index.to_string());
    PathBuf::from(name)
  }

  /// Ordered result paths for the enabled fields of `command`.
  pub fn paths_for(&self, command: &Command) -> Vec<PathBuf> {
    command
      .result_slots()
      .map(|(index, _)| self.path(index))
      .collect()
  }
}
