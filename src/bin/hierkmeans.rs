//! Command-line front end for hierarchical k-means.
//!
//! Usage: `hierkmeans <INPUT> <OUTPUT> <K> <LEVELS> <POSITION>...`
//!
//! `LEVELS = 1` runs flat k-means. Exit code 0 on success, 1 on any failure.

use clap::{ArgAction, Parser};
use hierkmeans_rs::{HierarchicalKMeans, KMeansConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Cluster delimited text records with flat or hierarchical k-means
#[derive(Parser)]
#[command(name = "hierkmeans")]
#[command(version)]
#[command(about = "Cluster delimited text records with flat or hierarchical k-means")]
struct Cli {
    /// Input file of delimited records
    input: PathBuf,

    /// Output file: each record followed by its cluster path indexes
    output: PathBuf,

    /// Clusters per bucket
    k: usize,

    /// Hierarchy depth (1 = flat k-means)
    levels: usize,

    /// Column indexes of the coordinate fields, in order
    #[arg(required = true)]
    positions: Vec<usize>,

    /// Tolerance window for deciding that a centroid moved
    #[arg(long, default_value_t = 1.0)]
    tol: f64,

    /// Round cap per level (0 = run until convergence)
    #[arg(long, default_value_t = 100)]
    max_rounds: usize,

    /// Substring identifying header lines (default: detect non-numeric coordinate fields)
    #[arg(long)]
    header_marker: Option<String>,

    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Working directory for the centroid blob, block files and intermediates
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Records per assignment task
    #[arg(long, default_value_t = 50_000)]
    chunk_size: usize,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> KMeansConfig {
        let mut config = KMeansConfig::new(self.k)
            .with_levels(self.levels)
            .with_column_positions(self.positions.clone())
            .with_tol(self.tol)
            .with_max_rounds((self.max_rounds > 0).then_some(self.max_rounds))
            .with_delimiter(self.delimiter)
            .with_header_marker(self.header_marker.clone())
            .with_chunk_size_records(self.chunk_size);
        if let Some(work_dir) = &self.work_dir {
            config = config.with_work_dir(work_dir);
        }
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config();
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid arguments");
        return ExitCode::from(1);
    }

    let mut kmeans = HierarchicalKMeans::with_config(config);
    match kmeans.fit(&cli.input, &cli.output) {
        Ok(report) => {
            info!(
                levels = report.levels.len(),
                rounds = report.total_rounds(),
                centroids = report.store.len(),
                converged = report.converged(),
                output = %cli.output.display(),
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "clustering failed");
            ExitCode::from(1)
        }
    }
}
