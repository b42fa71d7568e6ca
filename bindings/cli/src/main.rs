//! Command-line front end for fastDensity.
//!
//! Reads one census interval as JSON, runs the density pipeline with the
//! built-in penalized GLM backend and writes the report as JSON.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ::fastDensity::prelude::{
    Census, DecayKernel, DensityBuilder, Individual, PenalizedGlm, PipelineConfig, PipelineReport,
    SweepReport,
};

// ============================================================================
// Arguments
// ============================================================================

/// Command-line arguments for density-sweep
#[derive(Parser, Debug)]
#[command(name = "density-sweep")]
#[command(about = "Decay-weighted neighborhood density and decay-shape selection")]
#[command(version)]
struct Args {
    /// Census interval as a JSON array of individuals
    #[arg(short, long)]
    census: PathBuf,

    /// TOML pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the neighbor radius
    #[arg(long)]
    radius: Option<f64>,

    /// Override the decay kernel (exponential, gaussian)
    #[arg(long)]
    kernel: Option<String>,

    /// Override the per-run timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Stop after the feature table
    #[arg(long)]
    features_only: bool,

    /// Disable parallel execution
    #[arg(long)]
    sequential: bool,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse decay kernel from string
fn parse_decay_kernel(name: &str) -> Result<DecayKernel> {
    DecayKernel::from_name(name)
        .with_context(|| format!("unknown decay kernel: {name}. Valid options: exponential, gaussian"))
}

/// Load the configuration file, or defaults, and apply command-line overrides.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(radius) = args.radius {
        config.radius = radius;
    }
    if let Some(kernel) = &args.kernel {
        config.decay_kernel = parse_decay_kernel(kernel)?.prefix().to_string();
    }
    if let Some(secs) = args.timeout {
        if !secs.is_finite() || secs <= 0.0 {
            bail!("timeout must be a positive number of seconds, got {secs}");
        }
        config.run_timeout_secs = Some(secs);
    }
    if args.sequential {
        config.parallel = false;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_census(path: &PathBuf) -> Result<Census<f64>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let individuals: Vec<Individual<f64>> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse census {}", path.display()))?;
    Census::new(individuals).context("invalid census")
}

fn writer(output: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

/// Run counts, exclusions and global optima in plain text.
fn write_summary(out: &mut impl Write, sweep: &SweepReport) -> io::Result<()> {
    let summary = &sweep.summary;
    writeln!(
        out,
        "runs: {} total, {} accepted, {} rejected, {} discarded",
        summary.total,
        summary.accepted,
        summary.rejected_total(),
        summary.discarded
    )?;
    for (reason, count) in &summary.rejected {
        writeln!(out, "  rejected ({reason}): {count}")?;
    }
    for group in sweep.plan.unmatched_groups() {
        writeln!(out, "focal group {group}: no interior individuals")?;
    }
    for (group, reason) in &sweep.selection.excluded {
        writeln!(out, "excluded group {group}: {reason}")?;
    }
    for best in &sweep.selection.global_optima {
        writeln!(
            out,
            "{:>5}: own = {:<10} total = {:<10} loglik = {:.4}",
            best.basis.label(),
            best.own_label,
            best.total_label,
            best.sum_log_likelihood
        )?;
    }
    if summary.accepted == 0 {
        writeln!(out, "no run was accepted; selection is empty")?;
    }
    Ok(())
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let census = load_census(&args.census)?;
    info!(individuals = census.len(), "census loaded");

    let pipeline = DensityBuilder::<f64>::from_config(&config)?.build()?;
    let table = pipeline.features(&census)?;

    let mut out = writer(args.output.as_ref())?;
    if args.features_only {
        serde_json::to_writer_pretty(&mut out, &table)?;
    } else {
        let fitter = PenalizedGlm::from_config(&config);
        let sweep = pipeline.sweep(&table, &fitter);
        write_summary(&mut io::stderr().lock(), &sweep)?;
        let report = PipelineReport {
            features: table,
            sweep,
        };
        serde_json::to_writer_pretty(&mut out, &report)?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
