//! Feature pipeline CLI
//!
//! Runs configured pipelines, backfills features and checks feature definition
//! files against exported sensor data.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use feature_pipeline_core::{
    features::{validate, FeatureRegistry, FunctionLibrary},
    io::{CsvTableReader, CsvWriter, JsonPacketReader, JsonWriter, MemoryWriter, OnlineCache, OutputWriter, SnapshotBackend},
    pipeline::{load_pipelines, FeatureCalculator, PipelineManager, Profile, RunReport},
    VERSION,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "feature-pipeline")]
#[command(version = VERSION)]
#[command(about = "Incremental feature computation over sensor time series", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one pipeline at its latest recurrence
    Run {
        /// Pipelines file (JSON)
        #[arg(long, value_name = "FILE")]
        pipelines: PathBuf,

        /// Name of the pipeline to run
        #[arg(long)]
        pipeline: String,

        /// Location profile (JSON)
        #[arg(long, value_name = "FILE")]
        profile: Option<PathBuf>,

        /// Pretend the current time is this RFC 3339 instant
        #[arg(long, value_parser = parse_time)]
        at: Option<DateTime<Utc>>,

        /// Recalculate these sources even if cached (can be repeated)
        #[arg(long, value_name = "SOURCE")]
        force: Vec<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Calculate features over a time range and store every result
    Calculate {
        /// Features to calculate (can be repeated)
        #[arg(long = "feature", value_name = "SOURCE", required = true)]
        features: Vec<String>,

        /// Start of the range (RFC 3339); defaults to one window before the end
        #[arg(long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,

        /// End of the range (RFC 3339); defaults to now
        #[arg(long, value_parser = parse_time)]
        end: Option<DateTime<Utc>>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Check a feature definitions file
    Validate {
        /// Feature definitions file (JSON)
        #[arg(long, value_name = "FILE")]
        features: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Feature definitions file (JSON)
    #[arg(long, value_name = "FILE")]
    features_file: PathBuf,

    /// Location to process
    #[arg(long)]
    location: String,

    /// Exported JSON packet files (can be repeated)
    #[arg(long, value_name = "FILE")]
    packets: Vec<PathBuf>,

    /// CSV tables with a millisecond `timestamp` column (can be repeated)
    #[arg(long, value_name = "FILE")]
    table: Vec<PathBuf>,

    /// Timestep assigned to CSV rows, in seconds
    #[arg(long, default_value_t = 1.0)]
    table_timestep: f64,

    /// Directory receiving stored outputs
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Format of stored outputs
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Json,
    Csv,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    log::info!("Feature pipeline v{}", VERSION);

    match cli.command {
        Commands::Run { pipelines, pipeline, profile, at, force, common } => {
            let registry = load_registry(&common.features_file)?;
            let configs = load_pipelines(&pipelines)?;
            let Some(config) = configs.get(&pipeline).cloned() else {
                bail!("No pipeline named '{}' in {:?}", pipeline, pipelines);
            };
            config.validate()?;
            let profile = match profile {
                Some(path) => Profile::load(&path)?,
                None => Profile::default(),
            };

            let mut manager = PipelineManager::new(&common.location, config, &registry)
                .with_profile(profile)
                .with_force_recompute(force);
            if let Some(at) = at {
                manager = manager.with_forced_time(at);
            }

            let mut cache = load_inputs(&common)?;
            let mut writer = make_writer(&common);
            let report = manager.run(&mut cache, writer.as_mut())?;
            print_report(&report)
        }
        Commands::Calculate { features, start, end, common } => {
            let registry = load_registry(&common.features_file)?;
            let end = end.unwrap_or_else(Utc::now).timestamp();
            let start = start.map(|s| s.timestamp());

            let mut calculator = FeatureCalculator::new(&common.location, &registry, features, start, end);
            let mut cache = load_inputs(&common)?;
            let mut writer = make_writer(&common);
            let report = calculator.run(&mut cache, writer.as_mut())?;
            print_report(&report)
        }
        Commands::Validate { features } => {
            let registry = FeatureRegistry::from_path(&features, FunctionLibrary::builtin())?;
            match validate(&registry) {
                Ok(()) => {
                    println!("{} feature definitions are valid", registry.definitions().count());
                    Ok(())
                }
                Err(errors) => {
                    for error in &errors {
                        eprintln!("{}", error);
                    }
                    bail!("{} problems in {:?}", errors.len(), features)
                }
            }
        }
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 time: {}", e))
}

fn load_registry(path: &Path) -> Result<FeatureRegistry> {
    log::info!("Loading feature definitions from {:?}", path);
    let registry = FeatureRegistry::from_path(path, FunctionLibrary::builtin())?;
    if let Err(errors) = validate(&registry) {
        for error in &errors {
            log::error!("{}", error);
        }
        bail!("{} problems in feature definitions {:?}", errors.len(), path);
    }
    Ok(registry)
}

/// Loads every input file into a snapshot served through batched queries.
fn load_inputs(common: &CommonArgs) -> Result<OnlineCache<SnapshotBackend>> {
    let mut data = JsonPacketReader::new(&common.location)
        .load(&common.packets)
        .context("Failed to load packet files")?;

    let tables = CsvTableReader::new(common.table_timestep);
    for path in &common.table {
        let rows = tables
            .load_into(path, &mut data)
            .with_context(|| format!("Failed to load table {:?}", path))?;
        log::debug!("Loaded {} values from {:?}", rows, path);
    }

    log::info!("Loaded {} points", data.point_count());
    Ok(OnlineCache::new(SnapshotBackend::new(data)))
}

fn make_writer(common: &CommonArgs) -> Box<dyn OutputWriter> {
    match (&common.output, common.format) {
        (Some(dir), OutputFormat::Json) => Box::new(JsonWriter::new(&common.location, dir)),
        (Some(dir), OutputFormat::Csv) => Box::new(CsvWriter::new(dir)),
        (None, _) => Box::new(MemoryWriter::new()),
    }
}

fn print_report(report: &RunReport) -> Result<()> {
    for warning in &report.warnings {
        log::warn!("{}", warning);
    }
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args()))
        .init();
}
