//! Optional TOML run configuration. Command-line flags override it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use isopush::pushdown::{DEFAULT_COMMAND_PATH, DEFAULT_RESULT_PREFIX};
use isopush::{CompletionMarker, CompressionMode, FieldThresholdTable, Resampler};
use serde::{Deserialize, Deserializer};

/// Which threshold table a run uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
  #[default]
  Asteroid,
  Nyx,
}

impl Preset {
  pub fn table(self) -> FieldThresholdTable {
    match self {
      Preset::Asteroid => FieldThresholdTable::asteroid(),
      Preset::Nyx => FieldThresholdTable::nyx(),
    }
  }
}

/// How the requester learns that a result file is complete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierMode {
  /// The storage layer blocks reads until the executor is done.
  #[default]
  Storage,
  /// `.done` marker files written after each result.
  Marker,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BarrierConfig {
  pub mode: BarrierMode,
  pub poll_interval_ms: u64,
  /// Absent waits forever.
  pub timeout_ms: Option<u64>,
}

impl Default for BarrierConfig {
  fn default() -> Self {
    Self {
      mode: BarrierMode::Storage,
      poll_interval_ms: 10,
      timeout_ms: None,
    }
  }
}

impl BarrierConfig {
  pub fn marker(&self) -> CompletionMarker {
    CompletionMarker::new(
      Duration::from_millis(self.poll_interval_ms),
      self.timeout_ms.map(Duration::from_millis),
    )
  }
}

/// Root configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub preset: Preset,
  /// Resampling resolution for unstructured input. Absent keeps the default
  /// resolution; `false` or `"off"` contours unstructured input directly.
  #[serde(deserialize_with = "deserialize_resample")]
  pub resample: Option<[usize; 3]>,
  pub command_path: PathBuf,
  pub result_prefix: PathBuf,
  pub compression: CompressionMode,
  pub barrier: BarrierConfig,
}

/// Accepted spellings of `resample`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ResampleSetting {
  Dims([usize; 3]),
  Cube(usize),
  Switch(bool),
  Named(String),
}

fn deserialize_resample<'de, D>(
  deserializer: D,
) -> std::result::Result<Option<[usize; 3]>, D::Error>
where
  D: Deserializer<'de>,
{
  match ResampleSetting::deserialize(deserializer)? {
    ResampleSetting::Dims(dims) => Ok(Some(dims)),
    ResampleSetting::Cube(n) => Ok(Some([n; 3])),
    ResampleSetting::Switch(true) => Ok(Some(Resampler::DEFAULT_DIMS)),
    ResampleSetting::Switch(false) => Ok(None),
    ResampleSetting::Named(name) if name == "off" => Ok(None),
    ResampleSetting::Named(name) => Err(serde::de::Error::custom(format!(
      "resample must be [x, y, z], N, true, false or \"off\", got \"{name}\""
    ))),
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      preset: Preset::Asteroid,
      resample: Some(Resampler::DEFAULT_DIMS),
      command_path: PathBuf::from(DEFAULT_COMMAND_PATH),
      result_prefix: PathBuf::from(DEFAULT_RESULT_PREFIX),
      compression: CompressionMode::None,
      barrier: BarrierConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from a TOML file.
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
  }

  pub fn parse(content: &str) -> Result<Self> {
    let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if let Some(dims) = self.resample {
      if dims.iter().any(|&n| n < 2) {
        anyhow::bail!("resample dims must be at least 2 per axis, got {dims:?}");
      }
    }
    if self.command_path.as_os_str().is_empty() {
      anyhow::bail!("command_path must not be empty");
    }
    if self.result_prefix.as_os_str().is_empty() {
      anyhow::bail!("result_prefix must not be empty");
    }
    if self.barrier.mode == BarrierMode::Marker && self.barrier.poll_interval_ms == 0 {
      anyhow::bail!("barrier.poll_interval_ms must be positive in marker mode");
    }
    Ok(())
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
