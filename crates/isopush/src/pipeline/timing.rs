//! Stage-labelled wall-clock accumulator.
//!
//! ```text
//! local:     io ─► resample ─► contour ─────────────────────────► render
//! pushdown:  round_trip (send + executor + read) ─► decode ──────► render
//! executor:  io ─► resample ─► contour ─► encode
//! ```
//!
//! Durations come from a monotonic clock so every entry is non-negative.

use std::fmt;
use std::time::Duration;

use web_time::Instant;

/// A timed pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
  Io,
  Resample,
  Contour,
  Encode,
  /// Command write through result read, executor time included.
  RoundTrip,
  Decode,
  Render,
}

impl Stage {
  pub fn name(self) -> &'static str {
    match self {
      Stage::Io => "io",
      Stage::Resample => "resample",
      Stage::Contour => "contour",
      Stage::Encode => "encode",
      Stage::RoundTrip => "round_trip",
      Stage::Decode => "decode",
      Stage::Render => "render",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Append-only `(stage, elapsed)` entries for one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimingRecord {
  entries: Vec<(Stage, Duration)>,
}

impl TimingRecord {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&mut self, stage: Stage, elapsed: Duration) {
    self.entries.push((stage, elapsed));
  }

  /// Run `f` and record its wall-clock time under `stage`.
  pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let value = f();
    self.record(stage, start.elapsed());
    value
  }

  /// Total time spent in `stage`, `None` if it never ran.
  pub fn get(&self, stage: Stage) -> Option<Duration> {
    self
      .entries
      .iter()
      .filter(|(s, _)| *s == stage)
      .map(|(_, d)| *d)
      .reduce(|a, b| a + b)
  }

  pub fn entries(&self) -> &[(Stage, Duration)] {
    &self.entries
  }

  /// Stages in the order they first ran.
  pub fn stages(&self) -> Vec<Stage> {
    let mut seen = Vec::new();
    for (stage, _) in &self.entries {
      if !seen.contains(stage) {
        seen.push(*stage);
      }
    }
    seen
  }

  pub fn total(&self) -> Duration {
    self.entries.iter().map(|(_, d)| *d).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl fmt::Display for TimingRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for stage in self.stages() {
      let elapsed = self.get(stage).unwrap_or_default();
      writeln!(f, "{:<10} {:>12.6} s", stage.name(), elapsed.as_secs_f64())?;
    }
    write!(f, "{:<10} {:>12.6} s", "total", self.total().as_secs_f64())
  }
}

#[cfg(test)]
#[path = "timing_test.rs"]
mod timing_test;
