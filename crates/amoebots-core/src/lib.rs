//! Core engine for amoebot-style self-organizing particle systems.

pub mod algorithms;
pub mod generator;
pub mod geometry;
mod grid;
pub mod params;
pub mod particle;
pub mod rules;
pub mod topology;

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, new_key_type};
use thiserror::Error;

pub use algorithms::{Algorithm, AlgorithmKind};
pub use geometry::{Compass, Direction, Position};
pub use grid::{DataPoint, Grid, GridSnapshot, ParticleFilter, ParticleRecord};
pub use params::{ParameterEntry, ParameterError, ParameterKind, ParameterValue};
pub use particle::{Capability, ClassTagged, Directional, Particle, ParticleKind};
pub use topology::Topology;

new_key_type! {
    /// Stable handle for particles backed by a generational slot map.
    pub struct ParticleId;
}

new_key_type! {
    /// Handle of an algorithm instance registered with a grid.
    pub struct AlgorithmKey;
}

/// Convenience alias for associating side data with particles.
pub type ParticleMap<T> = SecondaryMap<ParticleId, T>;

/// Errors raised by grid operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Position outside the topology.
    #[error("position {0} is out of bounds")]
    OutOfBounds(Position),
    /// Position already holds a particle.
    #[error("position {0} is already occupied")]
    OccupiedPosition(Position),
    /// Particle handle not present on this grid.
    #[error("particle is not on the grid")]
    NotOnGrid,
    /// Move request the particle cannot carry out.
    #[error("invalid move: {0}")]
    InvalidMove(&'static str),
    /// Algorithm assigned to a particle lacking a required capability.
    #[error("algorithm `{algorithm}` cannot drive a {particle} particle")]
    IncompatibleAlgorithm {
        algorithm: &'static str,
        particle: &'static str,
    },
    /// Particle whose variant or facing does not fit the topology.
    #[error("a {particle} particle does not fit this grid: {reason}")]
    IncompatibleParticle {
        particle: &'static str,
        reason: &'static str,
    },
    /// Stale or foreign algorithm handle.
    #[error("algorithm is not registered with this grid")]
    UnknownAlgorithm,
    /// Random placement gave up.
    #[error("placed {placed} of {requested} particles before running out of attempts")]
    PlacementExhausted { placed: usize, requested: usize },
}

/// Static configuration for a grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Shape of the space.
    pub topology: Topology,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of center-of-mass samples kept; 0 disables sampling.
    /// Each sample runs a component search over every particle.
    pub history_capacity: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            rng_seed: None,
            history_capacity: 0,
        }
    }
}

impl GridConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), GridError> {
        self.topology.validate()
    }

    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_json() {
        let config = GridConfig {
            topology: Topology::Toroidal { half_side: 6 },
            rng_seed: Some(9),
            history_capacity: 0,
        };
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(json.contains(r#""shape":"toroidal""#));
        let parsed: GridConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.topology, config.topology);
        assert_eq!(parsed.rng_seed, Some(9));

        let partial: GridConfig = serde_json::from_str(r#"{"rng_seed":3}"#).expect("defaults");
        assert_eq!(partial.topology, Topology::default());
        assert_eq!(partial.history_capacity, 0);
    }

    #[test]
    fn invalid_topology_is_rejected() {
        let config = GridConfig {
            topology: Topology::Linear { half_length: 0 },
            ..GridConfig::default()
        };
        assert!(matches!(config.validate(), Err(GridError::InvalidConfig(_))));
        assert!(Grid::new(config).is_err());
    }
}
