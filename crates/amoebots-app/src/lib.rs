//! Shared plumbing for the headless amoebot simulation driver.

use std::collections::BTreeMap;
use std::path::Path;

use amoebots_core::generator::{Placement, add_particles};
use amoebots_core::{
    Algorithm, AlgorithmKey, AlgorithmKind, Grid, GridConfig, GridError, GridSnapshot,
    ParameterValue, Particle, Topology,
};
use anyhow::{Context, Result, anyhow};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Particle population placed before a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum Population {
    Basic { count: usize },
    /// Lattice particles facing random compass directions.
    Directed { count: usize },
    /// Lattice particles with random free headings.
    Oriented { count: usize },
    /// Particles spread evenly over `classes` color classes.
    Separable { count: usize, classes: u8 },
    /// Connected foragers plus scattered food sources.
    Foraging { count: usize, food: usize },
    /// Discs with random headings.
    Continuous { count: usize, radius: f64 },
}

impl Default for Population {
    fn default() -> Self {
        Self::Basic { count: 40 }
    }
}

impl Population {
    /// Template suited to `algorithm` on `topology`.
    #[must_use]
    pub fn for_algorithm(algorithm: AlgorithmKind, topology: &Topology, count: usize) -> Self {
        match algorithm {
            _ if !topology.is_discrete() => Self::Continuous { count, radius: 0.5 },
            AlgorithmKind::Compression => Self::Basic { count },
            AlgorithmKind::Separation => Self::Separable { count, classes: 2 },
            AlgorithmKind::Alignment | AlgorithmKind::BobBotAlignment => Self::Directed { count },
            AlgorithmKind::HeadingAlignment => Self::Oriented { count },
            AlgorithmKind::Foraging => Self::Foraging {
                count,
                food: (count / 10).max(1),
            },
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        match *self {
            Self::Basic { count }
            | Self::Directed { count }
            | Self::Oriented { count }
            | Self::Separable { count, .. }
            | Self::Foraging { count, .. }
            | Self::Continuous { count, .. } => count,
        }
    }

    pub fn validate(&self) -> Result<(), GridError> {
        match *self {
            Self::Separable { classes: 0, .. } => Err(GridError::InvalidConfig(
                "separable populations need at least one class",
            )),
            Self::Continuous { radius, .. } if !(radius.is_finite() && radius > 0.0) => Err(
                GridError::InvalidConfig("particle radius must be positive"),
            ),
            _ => Ok(()),
        }
    }

    /// Representative of the particles this template places first.
    #[must_use]
    pub fn prototype(&self) -> Particle {
        match *self {
            Self::Basic { .. } => Particle::basic(),
            Self::Directed { .. } => Particle::directed(amoebots_core::geometry::N),
            Self::Oriented { .. } => Particle::oriented(0.0),
            Self::Separable { .. } => Particle::separable(0),
            Self::Foraging { .. } => Particle::foraging(),
            Self::Continuous { radius, .. } => Particle::continuous(radius, 0.0),
        }
    }
}

/// Everything needed to reproduce a batch of runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub algorithm: AlgorithmKind,
    pub population: Population,
    /// Overrides applied to the algorithm's default parameters.
    pub parameters: BTreeMap<String, ParameterValue>,
    pub activations: u64,
    /// Activations between progress reports.
    pub report_every: u64,
    /// Independent runs; replica `i` uses seed `rng_seed + i`.
    pub replicas: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            algorithm: AlgorithmKind::Compression,
            population: Population::default(),
            parameters: BTreeMap::new(),
            activations: 100_000,
            report_every: 10_000,
            replicas: 1,
        }
    }
}

impl SimulationConfig {
    /// Load a configuration from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), GridError> {
        self.grid.validate()?;
        self.population.validate()?;
        let discs = matches!(self.population, Population::Continuous { .. });
        if discs == self.grid.topology.is_discrete() {
            return Err(GridError::InvalidConfig(
                "population template does not fit the topology",
            ));
        }
        if !self.algorithm.is_particle_allowed(&self.population.prototype()) {
            return Err(GridError::InvalidConfig(
                "population template cannot run the algorithm",
            ));
        }
        if self.report_every == 0 {
            return Err(GridError::InvalidConfig("report interval must be positive"));
        }
        if self.replicas == 0 {
            return Err(GridError::InvalidConfig("at least one replica is required"));
        }
        Ok(())
    }

    /// Parse `name=value` overrides against the algorithm's parameter table.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> Result<()> {
        let entries = self.algorithm.instantiate().parameters();
        for raw in overrides {
            let raw = raw.as_ref();
            let (name, text) = raw
                .split_once('=')
                .ok_or_else(|| anyhow!("parameter override `{raw}` is not of the form name=value"))?;
            let name = name.trim();
            let entry = entries
                .iter()
                .find(|entry| entry.name == name)
                .ok_or_else(|| anyhow!("{} has no parameter `{name}`", self.algorithm))?;
            let value = ParameterValue::parse(entry.kind, text)
                .with_context(|| format!("invalid value for `{name}`"))?;
            self.parameters.insert(name.to_owned(), value);
        }
        Ok(())
    }

    /// Seed of replica `index`.
    #[must_use]
    pub fn replica_seed(&self, index: usize) -> Option<u64> {
        self.grid
            .rng_seed
            .map(|seed| seed.wrapping_add(index as u64))
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub replica: usize,
    pub seed: Option<u64>,
    pub information: Vec<(String, String)>,
    /// Whether the algorithm's structural invariants still hold.
    pub grid_valid: bool,
    pub snapshot: GridSnapshot,
}

fn configured_algorithm(config: &SimulationConfig) -> Result<Box<dyn Algorithm>> {
    let mut algorithm = config.algorithm.instantiate();
    for (name, value) in &config.parameters {
        algorithm
            .set_parameter(name, *value)
            .with_context(|| format!("cannot apply parameter `{name}` to {}", config.algorithm))?;
    }
    Ok(algorithm)
}

/// Build and populate a grid for `config`, returning it with the running algorithm's handle.
pub fn build_grid(config: &SimulationConfig, seed: Option<u64>) -> Result<(Grid, AlgorithmKey)> {
    config.validate()?;
    let mut grid = Grid::new(GridConfig {
        rng_seed: seed,
        ..config.grid.clone()
    })?;
    let key = grid.register_boxed_algorithm(configured_algorithm(config)?);
    let validator = config.algorithm.instantiate();
    let placement = Placement::new(config.population.count())
        .with_validator(validator.as_ref())
        .with_algorithm(key);
    let compass = grid.compass();

    match config.population {
        Population::Basic { .. } => {
            add_particles(&mut grid, &placement, |_| Particle::basic())?;
        }
        Population::Directed { .. } => {
            let choices = compass.directions();
            add_particles(&mut grid, &placement, |rng| {
                Particle::directed(choices[rng.random_range(0..choices.len())])
            })?;
        }
        Population::Oriented { .. } => {
            add_particles(&mut grid, &placement, |rng| {
                Particle::oriented(rng.random_range(0.0..std::f64::consts::TAU))
            })?;
        }
        Population::Separable { count, classes } => {
            let mut next = 0_usize;
            add_particles(&mut grid, &placement, |_| {
                let class = (next % usize::from(classes)) as u8;
                next += 1;
                Particle::separable(class)
            })?;
            debug!(count, classes, "placed separable particles");
        }
        Population::Foraging { food, .. } => {
            add_particles(&mut grid, &placement, |_| Particle::foraging())?;
            let sources = Placement::new(food).with_algorithm(key);
            add_particles(&mut grid, &sources, |_| Particle::food())?;
        }
        Population::Continuous { radius, .. } => {
            add_particles(&mut grid, &placement, |rng| {
                Particle::continuous(radius, rng.random_range(0.0..std::f64::consts::TAU))
            })?;
        }
    }
    Ok((grid, key))
}

/// Run one replica to completion, reporting progress every `report_every` activations.
pub fn run_simulation(config: &SimulationConfig, replica: usize) -> Result<RunSummary> {
    let seed = config.replica_seed(replica);
    let (mut grid, key) = build_grid(config, seed)
        .with_context(|| format!("failed to build replica {replica}"))?;
    info!(
        replica,
        particles = grid.particle_count(),
        algorithm = %config.algorithm,
        "starting run"
    );

    let mut remaining = config.activations;
    while remaining > 0 {
        let chunk = remaining.min(config.report_every);
        grid.run_activations(chunk)
            .with_context(|| format!("replica {replica} failed after {} activations", grid.activations_run()))?;
        remaining -= chunk;
        info!(
            replica,
            activations = grid.activations_run(),
            moves = grid.moves_made(),
            particles = grid.particle_count(),
            "progress"
        );
    }

    let grid_valid = grid
        .algorithm(key)
        .is_some_and(|algorithm| algorithm.is_grid_valid(&grid));
    if !grid_valid {
        warn!(replica, algorithm = %config.algorithm, "grid no longer satisfies the algorithm's invariants");
    }
    Ok(RunSummary {
        replica,
        seed,
        information: grid.grid_information(),
        grid_valid,
        snapshot: grid.snapshot(),
    })
}

/// Run every replica, in parallel across independent grids.
pub fn run_replicas(config: &SimulationConfig) -> Result<Vec<RunSummary>> {
    config.validate()?;
    (0..config.replicas)
        .into_par_iter()
        .map(|replica| run_simulation(config, replica))
        .collect()
}
