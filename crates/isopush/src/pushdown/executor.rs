//! Executor side: consume a command, reduce, publish results.
//!
//! Runs the same load → resample → contour stages as the local pipeline, with
//! the same immutable table, then encodes each mesh into a transfer unit.
//! If anything fails after the command has been read, a failure unit is
//! published at every expected result path so the requester fails instead of
//! waiting or misreading.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};

use super::barrier::{remove_if_present, ResultBarrier, StorageBlocking};
use super::command::Command;
use super::ResultLayout;
use crate::codec;
use crate::error::{IsoError, Result};
use crate::pipeline::{reduce, PipelineConfig, Stage, TimingRecord};
use crate::thresholds::FieldSpec;

/// What one `execute` call produced.
#[derive(Clone, Debug)]
pub struct ExecutionReport {
  pub command: Command,
  pub results: Vec<PathBuf>,
  pub bytes_written: u64,
  pub timing: TimingRecord,
}

pub struct Executor<B: ResultBarrier = StorageBlocking> {
  config: PipelineConfig,
  layout: ResultLayout,
  barrier: B,
}

impl<B: ResultBarrier> Executor<B> {
  pub fn new(config: PipelineConfig, layout: ResultLayout, barrier: B) -> Self {
    Self {
      config,
      layout,
      barrier,
    }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn layout(&self) -> &ResultLayout {
    &self.layout
  }

  /// Consume the command at `command_path` and publish its results.
  ///
  /// The command file is removed as soon as it has been read, so each command
  /// runs exactly once. A command that is present but cannot be read or
  /// decoded is retired too, and fails every slot.
  pub fn execute(&self, command_path: &Path) -> Result<ExecutionReport> {
    let text = match fs::read(command_path) {
      Ok(bytes) => {
        self.retire(command_path)?;
        String::from_utf8(bytes).map_err(|e| {
          IsoError::bad_command(
            String::from_utf8_lossy(e.as_bytes()),
            "command is not valid UTF-8",
          )
        })
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(IsoError::io(command_path, e));
      }
      Err(e) => {
        let err = IsoError::io(command_path, e);
        if let Err(retire_err) = self.retire(command_path) {
          tracing::warn!(error = %retire_err, "could not retire unreadable command");
        }
        Err(err)
      }
    };

    let command = match text.and_then(|text| Command::parse(&text, &self.config.table)) {
      Ok(command) => command,
      Err(err) => {
        // The requester's paths are unknown; cover every slot it could use.
        self.publish_failure(&self.every_slot(), &err)?;
        return Err(err);
      }
    };

    let paths = self.layout.paths_for(&command);
    match self.run(&command, &paths) {
      Ok(report) => Ok(report),
      Err(err) => {
        self.publish_failure(&paths, &err)?;
        Err(err)
      }
    }
  }

  fn retire(&self, command_path: &Path) -> Result<()> {
    remove_if_present(command_path)?;
    self.barrier.reset(command_path)
  }

  fn every_slot(&self) -> Vec<PathBuf> {
    (0..self.config.table.len().max(1))
      .map(|i| self.layout.path(i))
      .collect()
  }

  fn run(&self, command: &Command, paths: &[PathBuf]) -> Result<ExecutionReport> {
    let _span = tracing::info_span!("execute", command = %command).entered();
    let mut timing = TimingRecord::new();

    let fields: Vec<FieldSpec> = command
      .result_slots()
      .map(|(_, spec)| spec.clone())
      .collect();
    let (meshes, _) = reduce(&self.config, command.dataset(), &fields, &mut timing)?;

    let units = timing.time(Stage::Encode, || {
      meshes
        .iter()
        .map(|m| codec::encode(&m.mesh, command.compression()))
        .collect::<Result<Vec<_>>>()
    })?;

    let mut bytes_written = 0u64;
    for ((path, unit), field) in paths.iter().zip(&units).zip(&meshes) {
      self.barrier.publish(path, unit)?;
      bytes_written += unit.len() as u64;
      tracing::info!(
        field = %field.spec.name,
        path = %path.display(),
        cells = field.mesh.cell_count(),
        points = field.mesh.point_count(),
        bytes = unit.len(),
        "published result"
      );
    }

    Ok(ExecutionReport {
      command: command.clone(),
      results: paths.to_vec(),
      bytes_written,
      timing,
    })
  }

  fn publish_failure(&self, paths: &[PathBuf], err: &IsoError) -> Result<()> {
    tracing::warn!(error = %err, results = paths.len(), "publishing failure results");
    let unit = codec::encode_failure(&err.to_string());
    for path in paths {
      self.barrier.publish(path, &unit)?;
    }
    Ok(())
  }

  /// Execute every command that appears at `command_path` until `stop`
  /// receives a message or disconnects. Returns the number of commands
  /// handled.
  pub fn serve(&self, command_path: &Path, stop: &Receiver<()>, poll: Duration) -> usize {
    tracing::info!(path = %command_path.display(), "serving pushdown commands");
    let mut served = 0;
    loop {
      match stop.try_recv() {
        Err(TryRecvError::Empty) => {}
        Ok(()) | Err(TryRecvError::Disconnected) => break,
      }

      if !self.barrier.is_complete(command_path) {
        thread::sleep(poll);
        continue;
      }

      match self.execute(command_path) {
        Ok(report) => tracing::info!(
          command = %report.command,
          results = report.results.len(),
          bytes = report.bytes_written,
          "command complete"
        ),
        Err(err) => {
          tracing::warn!(error = %err, "command failed");
          // A command that could not be retired is still visible.
          thread::sleep(poll);
        }
      }
      served += 1;
    }
    served
  }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod executor_test;
