//! Command records and their line format.
//!
//! ```text
//! bare:    <dataset>                                  every table field, no compression
//! single:  <dataset> <field> <isovalue>               one field, explicit isovalue
//! multi:   <dataset> <bool>… <compression>            one bool per table field, in table order
//! keyed:   <dataset> v02=1 v03=1 tev=0 compression=1  multi, spelled with keys (parse only)
//! ```
//!
//! Booleans are `0 | 1 | true | false`; compression is `0 = none, 1 = zlib,
//! 2 = lz4`. The serializer always emits the bare, single or multi form.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::codec::CompressionMode;
use crate::error::{IsoError, Result};
use crate::thresholds::{FieldSelection, FieldSpec, FieldThresholdTable};

/// Token layout of a command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandForm {
  Bare,
  Single,
  Multi,
}

/// One offload request. Serialized once, never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
  dataset: PathBuf,
  form: CommandForm,
  /// Single form: the one field. Otherwise every table field in table order.
  fields: FieldSelection,
  compression: CompressionMode,
}

impl Command {
  /// Every table field, no compression.
  pub fn bare(dataset: impl Into<PathBuf>, table: &FieldThresholdTable) -> Result<Self> {
    Self::build(dataset.into(), CommandForm::Bare, table.all(), CompressionMode::None)
  }

  /// One field at an explicit isovalue. Results are never compressed and
  /// land at `<prefix>0`.
  pub fn single(dataset: impl Into<PathBuf>, spec: FieldSpec) -> Result<Self> {
    let mut fields = FieldSelection::new();
    fields.push(FieldSpec {
      enabled: true,
      ..spec
    });
    Self::build(dataset.into(), CommandForm::Single, fields, CompressionMode::None)
  }

  /// Table fields switched on by name; isovalues come from the table.
  pub fn multi<'a>(
    dataset: impl Into<PathBuf>,
    table: &FieldThresholdTable,
    enabled: impl IntoIterator<Item = &'a str>,
    compression: CompressionMode,
  ) -> Result<Self> {
    let mut fields = table.all();
    for spec in &mut fields {
      spec.enabled = false;
    }
    for name in enabled {
      let index = table.index_of(name)?;
      fields[index].enabled = true;
    }
    Self::build(dataset.into(), CommandForm::Multi, fields, compression)
  }

  /// Pick the form that expresses a request exactly.
  ///
  /// A single field whose isovalue differs from the table goes out in the
  /// single form; everything else uses the multi form. Several fields with
  /// overridden isovalues cannot be expressed.
  pub fn for_request(
    dataset: impl Into<PathBuf>,
    table: &FieldThresholdTable,
    requested: &[FieldSpec],
    compression: CompressionMode,
  ) -> Result<Self> {
    let dataset = dataset.into();
    let enabled: Vec<&FieldSpec> = requested.iter().filter(|s| s.enabled).collect();

    let mut overridden = Vec::new();
    for spec in &enabled {
      let (isovalue, _) = table.lookup(&spec.name)?;
      if isovalue != spec.isovalue {
        overridden.push(spec.name.as_str());
      }
    }

    match (enabled.as_slice(), overridden.len()) {
      (_, 0) => Self::multi(
        dataset,
        table,
        enabled.iter().map(|s| s.name.as_str()),
        compression,
      ),
      ([only], 1) => {
        if compression != CompressionMode::None {
          tracing::warn!(
            field = %only.name,
            "single-field commands carry no compression mode; result will be uncompressed"
          );
        }
        Self::single(dataset, (*only).clone())
      }
      _ => Err(IsoError::bad_command(
        dataset.display().to_string(),
        format!(
          "isovalue overrides for {} require one field per command",
          overridden.join(", ")
        ),
      )),
    }
  }

  fn build(
    dataset: PathBuf,
    form: CommandForm,
    fields: FieldSelection,
    compression: CompressionMode,
  ) -> Result<Self> {
    let text = dataset.to_str().ok_or_else(|| {
      IsoError::bad_command(dataset.display().to_string(), "dataset path is not UTF-8")
    })?;
    if text.is_empty() || text.chars().any(char::is_whitespace) {
      return Err(IsoError::bad_command(
        text,
        "dataset path must be non-empty and contain no whitespace",
      ));
    }
    Ok(Self {
      dataset,
      form,
      fields,
      compression,
    })
  }

  pub fn dataset(&self) -> &Path {
    &self.dataset
  }

  pub fn form(&self) -> CommandForm {
    self.form
  }

  pub fn compression(&self) -> CompressionMode {
    self.compression
  }

  /// Every field slot, enabled or not.
  pub fn fields(&self) -> &[FieldSpec] {
    &self.fields
  }

  /// Enabled fields paired with their result index.
  ///
  /// The single form always publishes at index 0; the other forms use the
  /// field's table position. A single result therefore lands at `<prefix>0`
  /// rather than at the bare prefix, so readers never special-case the form.
  pub fn result_slots(&self) -> impl Iterator<Item = (usize, &FieldSpec)> {
    self
      .fields
      .iter()
      .enumerate()
      .filter(|(_, spec)| spec.enabled)
  }

  /// Names of the fields the executor must load.
  pub fn enabled_names(&self) -> impl Iterator<Item = &str> {
    self.result_slots().map(|(_, spec)| spec.name.as_str())
  }

  /// Deterministic line form, without the trailing newline.
  pub fn to_line(&self) -> String {
    self.to_string()
  }

  // ===========================================================================
  // Parsing
  // ===========================================================================

  /// Parse one command record against `table`.
  pub fn parse(text: &str, table: &FieldThresholdTable) -> Result<Self> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let line = lines
      .next()
      .ok_or_else(|| IsoError::bad_command(text, "empty command"))?;
    if lines.next().is_some() {
      return Err(IsoError::bad_command(text, "more than one command record"));
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let dataset = PathBuf::from(tokens[0]);
    let args = &tokens[1..];

    if args.is_empty() {
      return Self::bare(dataset, table);
    }
    if args.iter().any(|t| t.contains('=')) {
      return Self::parse_keyed(line, dataset, args, table);
    }
    if args.len() == 2 && parse_bool(args[0]).is_none() {
      let spec = table.spec(args[0])?;
      let isovalue: f64 = args[1]
        .parse()
        .map_err(|_| IsoError::bad_command(line, format!("bad isovalue `{}`", args[1])))?;
      return Self::single(dataset, spec.with_isovalue(isovalue));
    }
    if args.len() == table.len() + 1 {
      let (flags, mode) = args.split_at(table.len());
      let mut fields = table.all();
      for (spec, token) in fields.iter_mut().zip(flags) {
        spec.enabled = parse_bool(token)
          .ok_or_else(|| IsoError::bad_command(line, format!("bad boolean `{token}`")))?;
      }
      let compression = parse_mode(line, mode[0])?;
      return Self::build(dataset, CommandForm::Multi, fields, compression);
    }

    Err(IsoError::bad_command(
      line,
      format!(
        "expected 0, 2 or {} arguments after the dataset path, got {}",
        table.len() + 1,
        args.len()
      ),
    ))
  }

  fn parse_keyed(
    line: &str,
    dataset: PathBuf,
    args: &[&str],
    table: &FieldThresholdTable,
  ) -> Result<Self> {
    if args.len() != table.len() + 1 {
      return Err(IsoError::bad_command(
        line,
        format!("expected {} key=value pairs, got {}", table.len() + 1, args.len()),
      ));
    }

    let mut fields = table.all();
    let mut compression = None;
    for (position, token) in args.iter().enumerate() {
      let (key, value) = token
        .split_once('=')
        .ok_or_else(|| IsoError::bad_command(line, format!("`{token}` is not key=value")))?;

      if position == table.len() {
        if key != "compression" {
          return Err(IsoError::bad_command(
            line,
            format!("expected `compression=` last, got `{key}=`"),
          ));
        }
        compression = Some(parse_mode(line, value)?);
        continue;
      }

      let spec = &mut fields[position];
      if key != spec.name {
        return Err(IsoError::bad_command(
          line,
          format!("expected key `{}` at position {}, got `{key}`", spec.name, position + 1),
        ));
      }
      spec.enabled = parse_bool(value)
        .ok_or_else(|| IsoError::bad_command(line, format!("bad boolean `{value}`")))?;
    }

    let compression =
      compression.ok_or_else(|| IsoError::bad_command(line, "missing compression"))?;
    Self::build(dataset, CommandForm::Multi, fields, compression)
  }
}

impl fmt::Display for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.dataset.display())?;
    match self.form {
      CommandForm::Bare => Ok(()),
      CommandForm::Single => {
        let spec = &self.fields[0];
        write!(f, " {} {}", spec.name, spec.isovalue)
      }
      CommandForm::Multi => {
        for spec in &self.fields {
          write!(f, " {}", u8::from(spec.enabled))?;
        }
        write!(f, " {}", self.compression.code())
      }
    }
  }
}

fn parse_bool(token: &str) -> Option<bool> {
  match token {
    "1" | "true" => Some(true),
    "0" | "false" => Some(false),
    _ => None,
  }
}

fn parse_mode(line: &str, token: &str) -> Result<CompressionMode> {
  token
    .parse::<u8>()
    .ok()
    .and_then(CompressionMode::from_code)
    .ok_or_else(|| IsoError::bad_command(line, format!("bad compression mode `{token}`")))
}

#[cfg(test)]
#[path = "command_test.rs"]
mod command_test;
