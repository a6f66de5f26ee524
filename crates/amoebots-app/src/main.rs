use std::path::{Path, PathBuf};

use amoebots_app::{Population, RunSummary, SimulationConfig, run_replicas};
use amoebots_core::{AlgorithmKind, Topology};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "amoebots",
    version,
    about = "Run self-organizing particle system simulations headlessly"
)]
struct Cli {
    /// JSON simulation config; flags below override its fields.
    #[arg(long, env = "AMOEBOTS_CONFIG")]
    config: Option<PathBuf>,

    /// Algorithm driving every particle.
    #[arg(long)]
    algorithm: Option<AlgorithmKind>,

    /// Shape of the grid.
    #[arg(long, value_enum)]
    shape: Option<Shape>,

    /// Radius, half side or half length of the grid, depending on the shape.
    #[arg(long, default_value_t = 10.0)]
    size: f64,

    /// Number of particles placed with the algorithm's default population.
    #[arg(long)]
    particles: Option<usize>,

    /// Algorithm parameter override, repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    #[arg(long)]
    activations: Option<u64>,

    /// Activations between progress reports.
    #[arg(long)]
    report_every: Option<u64>,

    /// Independent runs executed in parallel.
    #[arg(long)]
    replicas: Option<usize>,

    #[arg(long, env = "AMOEBOTS_SEED")]
    seed: Option<u64>,

    /// Write the final configuration(s) as JSON.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Shape {
    Hexagonal,
    Quadrilateral,
    Toroidal,
    Linear,
    Circular,
    Continuous,
}

impl Shape {
    fn topology(self, size: f64) -> Topology {
        let cells = size.round() as i32;
        match self {
            Self::Hexagonal => Topology::Hexagonal { radius: cells },
            Self::Quadrilateral => Topology::Quadrilateral { half_side: cells },
            Self::Toroidal => Topology::Toroidal { half_side: cells },
            Self::Linear => Topology::Linear { half_length: cells },
            Self::Circular => Topology::Circular { half_length: cells },
            Self::Continuous => Topology::Continuous { radius: size },
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    info!(
        algorithm = %config.algorithm,
        topology = ?config.grid.topology,
        replicas = config.replicas,
        activations = config.activations,
        "Starting amoebot simulation"
    );

    let summaries = run_replicas(&config)?;
    for summary in &summaries {
        print_summary(summary);
    }
    if let Some(path) = &cli.snapshot {
        write_snapshots(path, &summaries)?;
        info!(path = %path.display(), "Wrote final snapshot");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn resolve_config(cli: &Cli) -> Result<SimulationConfig> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_path(path)?,
        None => SimulationConfig::default(),
    };
    let mut repopulate = false;
    if let Some(algorithm) = cli.algorithm {
        if algorithm != config.algorithm {
            config.parameters.clear();
        }
        config.algorithm = algorithm;
        repopulate = true;
    }
    if let Some(shape) = cli.shape {
        config.grid.topology = shape.topology(cli.size);
        repopulate = true;
    }
    if cli.particles.is_some() || repopulate {
        let count = cli.particles.unwrap_or_else(|| config.population.count());
        config.population = Population::for_algorithm(config.algorithm, &config.grid.topology, count);
    }
    config.apply_overrides(&cli.params)?;
    if let Some(activations) = cli.activations {
        config.activations = activations;
    }
    if let Some(report_every) = cli.report_every {
        config.report_every = report_every;
    }
    if let Some(replicas) = cli.replicas {
        config.replicas = replicas;
    }
    if cli.seed.is_some() {
        config.grid.rng_seed = cli.seed;
    }
    config.validate().context("invalid simulation config")?;
    Ok(config)
}

fn print_summary(summary: &RunSummary) {
    let seed = summary
        .seed
        .map_or_else(|| "random".to_owned(), |seed| seed.to_string());
    println!("replica {} (seed {seed})", summary.replica);
    for (key, value) in &summary.information {
        println!("  {key}: {value}");
    }
    println!("  Invariants hold: {}", summary.grid_valid);
}

fn write_snapshots(path: &Path, summaries: &[RunSummary]) -> Result<()> {
    let json = match summaries {
        [single] => serde_json::to_string_pretty(&single.snapshot)?,
        many => {
            let snapshots: Vec<_> = many.iter().map(|summary| &summary.snapshot).collect();
            serde_json::to_string_pretty(&snapshots)?
        }
    };
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}
