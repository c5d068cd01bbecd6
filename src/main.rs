//! geobench CLI - load and run the geo workload against one backend.

use std::path::PathBuf;
use std::process::ExitCode;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use geobench::core::config::{load_properties, Properties, WorkloadConfig};
use geobench::core::error::{Error, Result};
use geobench::core::stats::StatsSnapshot;
use geobench::dataset::DatasetLoader;
use geobench::store::open_store_from_config;
use geobench::workload::{GeoPointWorkload, PhaseReport, WorkloadRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Command {
    /// Reset the table and insert the insert range
    Load,
    /// Issue scans against an already loaded table
    Run,
    /// Load, then run in the same process
    All,
}

#[derive(Parser)]
#[command(name = "geobench")]
#[command(about = "Geospatial workload benchmark for spatial databases", long_about = None)]
struct Args {
    /// Phase to execute
    #[arg(value_enum)]
    command: Command,

    /// Workload properties file; may be given more than once
    #[arg(short = 'P', value_name = "FILE")]
    property_files: Vec<PathBuf>,

    /// Single property, applied after the files
    #[arg(short = 'p', value_name = "KEY=VALUE", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Worker threads (overrides threadcount; 0 = one per core)
    #[arg(long)]
    threads: Option<usize>,
}

fn parse_property(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.trim().to_string())),
        _ => Err(format!("expected key=value, got {:?}", raw)),
    }
}

#[derive(Serialize)]
struct Report<'a> {
    backend: &'a str,
    table: &'a str,
    phases: Vec<PhaseReport>,
    stats: StatsSnapshot,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match execute(args) {
        Ok(report) => {
            println!("{}", report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(fatal = err.is_fatal(), "{}", err);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn execute(args: Args) -> Result<String> {
    let mut props = Properties::new();
    for path in &args.property_files {
        props.extend(load_properties(path)?);
    }
    props.extend(args.properties.iter().cloned());

    let mut config = WorkloadConfig::from_properties(&props)?;
    if args.command == Command::Run && !config.preloaded {
        // a run-only process starts after a separate load
        info!("run phase alone: treating the insert range as loaded");
        config.preloaded = true;
    }
    if args.command != Command::Load && config.operation_count == 0 {
        return Err(Error::config("operationcount must be positive for the run phase"));
    }

    let path = config
        .dataset_path
        .clone()
        .ok_or_else(|| Error::config("dataset.path is required"))?;
    let dataset = DatasetLoader::new(config.load_limit())
        .skip_malformed(config.skip_malformed)
        .load_path(&path)?;

    let runner = match args.threads.unwrap_or(config.thread_count) {
        0 => WorkloadRunner::with_available_cores(),
        n => WorkloadRunner::new(n),
    };
    let operations = config.operation_count;
    let store = open_store_from_config(&config, &props)?;
    let workload = GeoPointWorkload::init(config, dataset)?;

    let mut phases = Vec::new();
    if matches!(args.command, Command::Load | Command::All) {
        phases.push(runner.load(&workload, store.as_ref())?);
    }
    if matches!(args.command, Command::Run | Command::All) {
        phases.push(runner.run(&workload, store.as_ref(), operations)?);
    }

    let report = Report {
        backend: store.name(),
        table: &workload.config().table,
        phases,
        stats: workload.stats(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
