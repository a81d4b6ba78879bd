//! Contention simulator
//!
//! Runs a pool of workers that write random values to a small set of shared
//! resources, lets the resolver settle every conflict, and prints the
//! operation log in append order.
//!
//! Run with: cargo run -p contention_sim -- --workers 4 --iterations 20
//!
//! Diagnostics go to stderr (`RUST_LOG` or `-v`); the log itself goes to stdout.

use clap::Parser;
use contend_hub::{Coordinator, RunConfig};
use contend_journal::{Auditor, ExportFormat, Exporter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Concurrent optimistic writes with last-write-wins conflict resolution
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// RON run configuration; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of worker threads (default: logical CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Write attempts per worker
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Number of distinct resources (R1..Rn)
    #[arg(short, long)]
    resources: Option<usize>,

    /// Number of distinct values (V1..Vn)
    #[arg(long)]
    values: Option<usize>,

    /// Shortest pause between a worker's attempts, in milliseconds
    #[arg(long)]
    min_delay_ms: Option<u64>,

    /// Longest pause between a worker's attempts, in milliseconds
    #[arg(long)]
    max_delay_ms: Option<u64>,

    /// Seed for workloads and pacing
    #[arg(long)]
    seed: Option<u64>,

    /// Output format: text, ron, json, or csv
    #[arg(short, long, default_value_t = ExportFormat::Text)]
    format: ExportFormat,

    /// Print a run summary and audit report to stderr
    #[arg(long)]
    audit: bool,

    /// Verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn run_config(&self) -> contend_hub::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_ron_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(n) = self.workers {
            config.worker_count = n;
        }
        if let Some(n) = self.iterations {
            config.iterations_per_worker = n;
        }
        if let Some(n) = self.resources {
            config.resource_count = n;
        }
        if let Some(n) = self.values {
            config.value_space = n;
        }
        if let Some(ms) = self.min_delay_ms {
            config.min_delay_ms = ms;
        }
        if let Some(ms) = self.max_delay_ms {
            config.max_delay_ms = ms;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let config = cli.run_config()?;
    info!(?config, "configuration loaded");

    let report = Coordinator::new(config).run()?;
    let exporter = Exporter::new(&report.snapshot);
    exporter.export_to(&mut std::io::stdout().lock(), cli.format)?;

    if !cli.audit {
        return Ok(true);
    }

    let audit = Auditor::new(&report.snapshot).audit();
    eprint!("{}", exporter.summary());
    for worker in &report.workers {
        eprintln!(
            "  {}: {} committed, {} conflicted",
            worker.worker, worker.committed, worker.conflicted
        );
    }
    eprint!("{}", audit);
    Ok(audit.is_clean())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("audit found violations");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
