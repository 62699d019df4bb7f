//! isopush runners.
//!
//! - `local`: load, resample and contour in-process
//! - `pushdown`: write a command, wait for the executor, decode its results
//! - `execute` / `serve`: the executor side, next to the data
//! - `rewrite`: re-pack a dataset (piece merging, field selection, resampling,
//!   compression)

mod config;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::bounded;
use isopush::dataset::{write_dataset, BlockCompression};
use isopush::{
  CompressionMode, Dataset, DatasetHandle, DatasetKind, Executor, FieldSpec, FieldThresholdTable,
  ObjPresenter, Pipeline, PipelineConfig, PipelineOutput, PushdownChannel, Resampler,
  ResultBarrier, ResultLayout, StorageBlocking, SummaryPresenter,
};
use tracing_subscriber::EnvFilter;

use config::{BarrierMode, Config, Preset};

/// Isosurface reduction, locally or pushed down to the storage side.
#[derive(Parser, Debug)]
#[command(name = "isopush")]
#[command(about = "Reduce volumetric datasets to isosurface meshes, locally or via pushdown")]
struct Cli {
  /// Path to a TOML configuration file.
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Threshold table (overrides the config file).
  #[arg(long, global = true, value_enum)]
  preset: Option<Preset>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Reduce a dataset in-process.
  Local {
    #[command(flatten)]
    request: RequestArgs,

    #[command(flatten)]
    resample: ResampleArgs,

    /// Read every stored array instead of only the requested ones.
    #[arg(long)]
    full_read: bool,
  },
  /// Delegate the reduction to an executor over the command/result files.
  Pushdown {
    #[command(flatten)]
    request: RequestArgs,

    #[command(flatten)]
    channel: ChannelArgs,

    /// Result compression: none, zlib or lz4 (or 0, 1, 2).
    #[arg(long, value_parser = parse_compression)]
    compression: Option<CompressionMode>,
  },
  /// Run the command currently at the command path once.
  Execute {
    #[command(flatten)]
    channel: ChannelArgs,

    #[command(flatten)]
    resample: ResampleArgs,
  },
  /// Execute commands as they appear.
  Serve {
    #[command(flatten)]
    channel: ChannelArgs,

    #[command(flatten)]
    resample: ResampleArgs,

    /// Command poll interval in milliseconds.
    #[arg(long, default_value_t = 10)]
    poll_ms: u64,

    /// Stop once stdin reaches end of file.
    #[arg(long)]
    until_eof: bool,
  },
  /// Rewrite a dataset with selected fields and block compression.
  Rewrite {
    /// Input dataset (.vti or .vtu). Several unstructured pieces are appended
    /// into one mesh in the order given.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output dataset; the suffix must match the output kind.
    #[arg(short, long)]
    output: PathBuf,

    /// Field to keep (repeatable). Default keeps every field.
    #[arg(short = 'a', long = "field")]
    fields: Vec<String>,

    /// Resample unstructured input to N³ before writing.
    #[arg(short = 's', long = "resample")]
    resample: Option<usize>,

    /// Compress array blocks (1) or store them raw (0).
    #[arg(short = 'z', long = "compress", default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    compress: u8,

    /// Convert unstructured cell fields to point fields.
    #[arg(long)]
    cell_to_point: bool,
  },
}

#[derive(Args, Debug)]
struct RequestArgs {
  /// Dataset to reduce (.vti or .vtu).
  dataset: PathBuf,

  /// Field to extract (repeatable). Default is every field in the table.
  #[arg(short = 'a', long = "field")]
  fields: Vec<String>,

  /// Isovalue override for a single selected field.
  #[arg(short = 'c', long = "isovalue")]
  isovalue: Option<f64>,

  /// Also export the meshes as a Wavefront OBJ scene.
  #[arg(long)]
  obj: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ChannelArgs {
  /// Command file path.
  #[arg(short = 'd', long = "command-path")]
  command_path: Option<PathBuf>,

  /// Result path prefix; results land at <prefix>0, <prefix>1, ...
  #[arg(short = 'r', long = "result-prefix")]
  result_prefix: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ResampleArgs {
  /// Resample unstructured input to N³.
  #[arg(short = 's', long = "resample", conflicts_with = "no_resample")]
  resample: Option<usize>,

  /// Contour unstructured input directly.
  #[arg(long)]
  no_resample: bool,
}

fn parse_compression(s: &str) -> std::result::Result<CompressionMode, String> {
  let lowered = s.to_ascii_lowercase();
  let by_code = lowered.parse::<u8>().ok().and_then(CompressionMode::from_code);
  by_code
    .or_else(|| {
      CompressionMode::ALL
        .into_iter()
        .find(|m| m.name() == lowered)
    })
    .ok_or_else(|| format!("unknown compression `{s}`, expected none, zlib or lz4"))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let mut config = match &cli.config {
    Some(path) => Config::load(path)?,
    None => Config::default(),
  };
  if let Some(preset) = cli.preset {
    config.preset = preset;
  }
  let table = config.preset.table();

  match cli.command {
    Commands::Local {
      request,
      resample,
      full_read,
    } => {
      let pipeline_config = PipelineConfig::new(table.clone())
        .with_resample(resample.resolve(config.resample))
        .with_select_arrays(!full_read);
      let fields = request.fields(&table)?;
      let output = Pipeline::new(pipeline_config)
        .run_local(&request.dataset, &fields)
        .with_context(|| format!("Local run failed for {}", request.dataset.display()))?;
      report(output, request.obj.as_deref())
    }
    Commands::Pushdown {
      request,
      channel,
      compression,
    } => {
      let compression = compression.unwrap_or(config.compression);
      let fields = request.fields(&table)?;
      let pipeline = Pipeline::new(PipelineConfig::new(table).with_resample(config.resample));
      let layout = channel.layout(&config);
      let command_path = channel.command_path(&config);
      let output = match config.barrier.mode {
        BarrierMode::Storage => pushdown(
          &pipeline,
          PushdownChannel::new(command_path, layout, StorageBlocking),
          &request,
          &fields,
          compression,
        ),
        BarrierMode::Marker => pushdown(
          &pipeline,
          PushdownChannel::new(command_path, layout, config.barrier.marker()),
          &request,
          &fields,
          compression,
        ),
      }?;
      report(output, request.obj.as_deref())
    }
    Commands::Execute { channel, resample } => {
      let pipeline_config =
        PipelineConfig::new(table).with_resample(resample.resolve(config.resample));
      let layout = channel.layout(&config);
      let command_path = channel.command_path(&config);
      match config.barrier.mode {
        BarrierMode::Storage => execute(
          Executor::new(pipeline_config, layout, StorageBlocking),
          &command_path,
        ),
        BarrierMode::Marker => execute(
          Executor::new(pipeline_config, layout, config.barrier.marker()),
          &command_path,
        ),
      }
    }
    Commands::Serve {
      channel,
      resample,
      poll_ms,
      until_eof,
    } => {
      let pipeline_config =
        PipelineConfig::new(table).with_resample(resample.resolve(config.resample));
      let layout = channel.layout(&config);
      let command_path = channel.command_path(&config);
      let poll = Duration::from_millis(poll_ms.max(1));
      match config.barrier.mode {
        BarrierMode::Storage => serve(
          Executor::new(pipeline_config, layout, StorageBlocking),
          &command_path,
          poll,
          until_eof,
        ),
        BarrierMode::Marker => serve(
          Executor::new(pipeline_config, layout, config.barrier.marker()),
          &command_path,
          poll,
          until_eof,
        ),
      }
    }
    Commands::Rewrite {
      inputs,
      output,
      fields,
      resample,
      compress,
      cell_to_point,
    } => rewrite(&inputs, &output, &fields, resample, compress, cell_to_point),
  }
}

impl RequestArgs {
  /// Requested field specs, with the isovalue override applied.
  fn fields(&self, table: &FieldThresholdTable) -> Result<Vec<FieldSpec>> {
    let mut specs: Vec<FieldSpec> = if self.fields.is_empty() {
      table.all().into_vec()
    } else {
      table
        .select(self.fields.iter().map(String::as_str))?
        .into_vec()
    };

    if let Some(isovalue) = self.isovalue {
      let selected = specs.len();
      let [spec] = specs.as_mut_slice() else {
        anyhow::bail!("-c applies to exactly one field, but {selected} are selected (use -a)");
      };
      spec.isovalue = isovalue;
    }
    Ok(specs)
  }
}

impl ChannelArgs {
  fn command_path(&self, config: &Config) -> PathBuf {
    self
      .command_path
      .clone()
      .unwrap_or_else(|| config.command_path.clone())
  }

  fn layout(&self, config: &Config) -> ResultLayout {
    ResultLayout::new(
      self
        .result_prefix
        .clone()
        .unwrap_or_else(|| config.result_prefix.clone()),
    )
  }
}

impl ResampleArgs {
  fn resolve(&self, configured: Option<[usize; 3]>) -> Option<[usize; 3]> {
    if self.no_resample {
      None
    } else {
      self.resample.map(|n| [n; 3]).or(configured)
    }
  }
}

fn pushdown<B: ResultBarrier>(
  pipeline: &Pipeline,
  mut channel: PushdownChannel<B>,
  request: &RequestArgs,
  fields: &[FieldSpec],
  compression: CompressionMode,
) -> Result<PipelineOutput> {
  pipeline
    .run_pushdown(&mut channel, &request.dataset, fields, compression)
    .with_context(|| format!("Pushdown run failed for {}", request.dataset.display()))
}

/// Summary lines and timing to stdout, optional OBJ export.
fn report(mut output: PipelineOutput, obj: Option<&Path>) -> Result<()> {
  let mut summary = SummaryPresenter::new();
  output.present(&mut summary)?;
  if let Some(path) = obj {
    output
      .present(&mut ObjPresenter::new(path))
      .with_context(|| format!("Failed to export {}", path.display()))?;
  }

  for line in summary.lines() {
    println!("{line}");
  }
  println!("bytes moved: {}", output.bytes_moved);
  print!("{}", output.timing);
  Ok(())
}

fn execute<B: ResultBarrier>(executor: Executor<B>, command_path: &Path) -> Result<()> {
  let report = executor
    .execute(command_path)
    .with_context(|| format!("Command at {} failed", command_path.display()))?;
  for path in &report.results {
    println!("{}", path.display());
  }
  println!("bytes written: {}", report.bytes_written);
  print!("{}", report.timing);
  Ok(())
}

fn serve<B: ResultBarrier>(
  executor: Executor<B>,
  command_path: &Path,
  poll: Duration,
  until_eof: bool,
) -> Result<()> {
  let (stop_tx, stop_rx) = bounded::<()>(1);
  // Without --until-eof the sender lives until the process is killed.
  let _keep_alive = if until_eof {
    std::thread::spawn(move || {
      let mut sink = Vec::new();
      let _ = std::io::stdin().read_to_end(&mut sink);
      let _ = stop_tx.send(());
    });
    None
  } else {
    Some(stop_tx)
  };

  let served = executor.serve(command_path, &stop_rx, poll);
  tracing::info!(served, "executor stopped");
  Ok(())
}

fn rewrite(
  inputs: &[PathBuf],
  output: &Path,
  fields: &[String],
  resample: Option<usize>,
  compress: u8,
  cell_to_point: bool,
) -> Result<()> {
  let _span = tracing::info_span!("rewrite", pieces = inputs.len()).entered();
  let pieces = inputs
    .iter()
    .map(|input| -> Result<Dataset> {
      let mut handle = DatasetHandle::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
      if !fields.is_empty() {
        handle.select_fields(fields.iter().map(String::as_str));
      }
      let piece = handle
        .load()
        .with_context(|| format!("Failed to load {}", input.display()))?;
      tracing::debug!(
        input = %input.display(),
        points = piece.point_count(),
        cells = piece.cell_count(),
        "loaded piece"
      );
      Ok(piece)
    })
    .collect::<Result<Vec<_>>>()?;
  let mut dataset = Dataset::append(pieces).context("Failed to append pieces")?;
  if inputs.len() > 1 {
    tracing::info!(
      points = dataset.point_count(),
      cells = dataset.cell_count(),
      "appended pieces"
    );
  }

  if cell_to_point {
    dataset.cell_to_point();
  }
  if let (Some(n), DatasetKind::Unstructured) = (resample, dataset.kind()) {
    dataset = Resampler::cubic(n)
      .resample(dataset)
      .context("Resampling failed")?;
  }

  let compression = if compress == 1 {
    BlockCompression::Zlib
  } else {
    BlockCompression::None
  };
  let written = write_dataset(output, &dataset, compression)
    .with_context(|| format!("Failed to write {}", output.display()))?;
  tracing::info!(
    output = %output.display(),
    fields = dataset.fields().len(),
    bytes = written,
    ?compression,
    "dataset rewritten"
  );
  println!(
    "{} piece(s) -> {} ({written} bytes)",
    inputs.len(),
    output.display()
  );
  Ok(())
}
