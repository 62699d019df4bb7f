//! Requester side of the offload protocol.

use std::fs;
use std::path::{Path, PathBuf};

use super::barrier::{ResultBarrier, StorageBlocking};
use super::command::Command;
use super::ResultLayout;
use crate::error::{IsoError, Result};

/// Channel lifecycle.
///
/// ```text
/// Idle ──send_command──► CommandWritten ──receive_result──► AwaitingResult
///  ▲                                                              │
///  └──────acknowledge / send_command────── ResultAvailable ◄──────┘ (all read)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
  Idle,
  CommandWritten,
  AwaitingResult,
  ResultAvailable,
}

impl ChannelState {
  pub fn name(self) -> &'static str {
    match self {
      ChannelState::Idle => "idle",
      ChannelState::CommandWritten => "command-written",
      ChannelState::AwaitingResult => "awaiting-result",
      ChannelState::ResultAvailable => "result-available",
    }
  }
}

/// One command/result exchange at a time over fixed paths.
#[derive(Debug)]
pub struct PushdownChannel<B: ResultBarrier = StorageBlocking> {
  command_path: PathBuf,
  layout: ResultLayout,
  barrier: B,
  state: ChannelState,
}

impl<B: ResultBarrier> PushdownChannel<B> {
  pub fn new(command_path: impl Into<PathBuf>, layout: ResultLayout, barrier: B) -> Self {
    Self {
      command_path: command_path.into(),
      layout,
      barrier,
      state: ChannelState::Idle,
    }
  }

  pub fn state(&self) -> ChannelState {
    self.state
  }

  pub fn command_path(&self) -> &Path {
    &self.command_path
  }

  pub fn layout(&self) -> &ResultLayout {
    &self.layout
  }

  pub fn barrier(&self) -> &B {
    &self.barrier
  }

  fn misuse(&self, operation: &'static str) -> IsoError {
    IsoError::ProtocolMisuse {
      operation,
      state: self.state.name(),
    }
  }

  /// Serialize `command` and write it to the command path.
  ///
  /// Allowed from `Idle` or `ResultAvailable`. Returns the ordered result
  /// paths the executor will publish, one per enabled field.
  pub fn send_command(&mut self, command: &Command) -> Result<Vec<PathBuf>> {
    match self.state {
      ChannelState::Idle | ChannelState::ResultAvailable => {}
      _ => return Err(self.misuse("send_command")),
    }

    let paths = self.layout.paths_for(command);
    for path in &paths {
      self.barrier.reset(path)?;
    }

    let line = command.to_line();
    let mut record = line.clone().into_bytes();
    record.push(b'\n');
    self.barrier.publish(&self.command_path, &record)?;

    tracing::debug!(
      command = %line,
      path = %self.command_path.display(),
      results = paths.len(),
      "pushdown command written"
    );
    self.state = ChannelState::CommandWritten;
    Ok(paths)
  }

  /// Read each result path in order, fully.
  ///
  /// With [`StorageBlocking`] the read itself is the suspension point: the
  /// storage layer must hold it until the executor has finished. Errors leave
  /// the channel in `AwaitingResult`; the run is expected to abort.
  pub fn receive_result(&mut self, paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    if self.state != ChannelState::CommandWritten {
      return Err(self.misuse("receive_result"));
    }
    self.state = ChannelState::AwaitingResult;

    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
      self.barrier.wait_for(path)?;
      let bytes = fs::read(path).map_err(|e| IsoError::io(path, e))?;
      tracing::debug!(path = %path.display(), bytes = bytes.len(), "pushdown result read");
      results.push(bytes);
    }

    self.state = ChannelState::ResultAvailable;
    Ok(results)
  }

  /// Return to `Idle` after the results have been consumed.
  pub fn acknowledge(&mut self) -> Result<()> {
    if self.state != ChannelState::ResultAvailable {
      return Err(self.misuse("acknowledge"));
    }
    self.state = ChannelState::Idle;
    Ok(())
  }
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod channel_test;
