//! Stochastic local algorithms run by activated particles.

mod alignment;
mod bobbot;
mod compression;
mod foraging;
mod heading_alignment;
mod separation;

pub use alignment::{AlignmentAlgorithm, polar_order, wrapped_normal};
pub use bobbot::BobBotAlignmentAlgorithm;
pub use compression::CompressionAlgorithm;
pub use foraging::ForagingAlgorithm;
pub use heading_alignment::HeadingAlignmentAlgorithm;
pub use separation::SeparationAlgorithm;

use crate::grid::Grid;
use crate::params::{ParameterEntry, ParameterError, ParameterValue};
use crate::particle::{Capability, Particle};
use crate::{GridError, ParticleId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Behaviour shared by every particle algorithm.
///
/// Instances hold tunable parameters only; all per-particle state lives on
/// the particles, so one instance can drive any number of them.
pub trait Algorithm: Send + Sync + fmt::Debug {
    /// Display name of the algorithm.
    fn name(&self) -> &'static str;

    /// Capabilities a particle needs to run this algorithm.
    fn required_capabilities(&self) -> &'static [Capability];

    fn is_particle_allowed(&self, particle: &Particle) -> bool {
        self.required_capabilities()
            .iter()
            .all(|&capability| particle.has(capability))
    }

    /// Act on behalf of particle `id`. Rejected or failed moves are not errors.
    fn on_activation(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError>;

    /// Whether the configuration satisfies this algorithm's structural invariants.
    fn is_grid_valid(&self, grid: &Grid) -> bool;

    /// Extra key/value pairs appended to the grid information.
    fn diagnostics(&self, _grid: &Grid) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Current values of every tunable parameter.
    fn parameters(&self) -> Vec<ParameterEntry>;

    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<(), ParameterError>;
}

/// Built-in algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    Compression,
    Separation,
    Alignment,
    Foraging,
    BobBotAlignment,
    HeadingAlignment,
}

impl AlgorithmKind {
    pub const ALL: [Self; 6] = [
        Self::Compression,
        Self::Separation,
        Self::Alignment,
        Self::Foraging,
        Self::BobBotAlignment,
        Self::HeadingAlignment,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compression => "Compression",
            Self::Separation => "Separation",
            Self::Alignment => "Alignment",
            Self::Foraging => "Foraging",
            Self::BobBotAlignment => "BobBot Alignment",
            Self::HeadingAlignment => "Heading Alignment",
        }
    }

    #[must_use]
    pub fn required_capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Compression => CompressionAlgorithm::REQUIRED,
            Self::Separation => SeparationAlgorithm::REQUIRED,
            Self::Alignment => AlignmentAlgorithm::REQUIRED,
            Self::Foraging => ForagingAlgorithm::REQUIRED,
            Self::BobBotAlignment => BobBotAlignmentAlgorithm::REQUIRED,
            Self::HeadingAlignment => HeadingAlignmentAlgorithm::REQUIRED,
        }
    }

    #[must_use]
    pub fn is_particle_allowed(&self, particle: &Particle) -> bool {
        self.required_capabilities()
            .iter()
            .all(|&capability| particle.has(capability))
    }

    /// Instance with default parameters.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn Algorithm> {
        match self {
            Self::Compression => Box::new(CompressionAlgorithm::default()),
            Self::Separation => Box::new(SeparationAlgorithm::default()),
            Self::Alignment => Box::new(AlignmentAlgorithm::default()),
            Self::Foraging => Box::new(ForagingAlgorithm::default()),
            Self::BobBotAlignment => Box::new(BobBotAlignmentAlgorithm::default()),
            Self::HeadingAlignment => Box::new(HeadingAlignmentAlgorithm::default()),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmKind {
    type Err = String;

    /// Matches display names ignoring case, spaces and punctuation, so
    /// `"BobBot Alignment"` and `"bobbot-alignment"` name the same kind.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let folded = fold_name(text);
        Self::ALL
            .into_iter()
            .find(|kind| fold_name(kind.name()) == folded)
            .ok_or_else(|| format!("unknown algorithm: {text}"))
    }
}

fn fold_name(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Draw `u` in `[0, 1)` and accept when `u <= probability`.
pub(crate) fn accept(grid: &mut Grid, probability: f64) -> bool {
    let roll: f64 = grid.rng().random();
    roll <= probability
}

/// Neighbors at the position one step along `direction`, without the mover itself.
pub(crate) fn future_neighbor_count(
    grid: &Grid,
    id: ParticleId,
    direction: crate::Direction,
) -> Result<usize, GridError> {
    Ok(grid
        .adjacent_position_neighbors(id, direction, None)?
        .into_iter()
        .filter(|&other| other != id)
        .count())
}

pub(crate) fn is_foraging(_: ParticleId, particle: &Particle) -> bool {
    particle.is_foraging()
}

pub(crate) fn is_food(_: ParticleId, particle: &Particle) -> bool {
    particle.is_food()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("separation".parse(), Ok(AlgorithmKind::Separation));
        assert_eq!(" Foraging ".parse(), Ok(AlgorithmKind::Foraging));
        assert_eq!("bobbot-alignment".parse(), Ok(AlgorithmKind::BobBotAlignment));
        assert_eq!("heading_alignment".parse(), Ok(AlgorithmKind::HeadingAlignment));
        assert!("flocking".parse::<AlgorithmKind>().is_err());
        assert!("".parse::<AlgorithmKind>().is_err());
    }

    #[test]
    fn instances_match_their_kind() {
        for kind in AlgorithmKind::ALL {
            let algorithm = kind.instantiate();
            assert_eq!(algorithm.name(), kind.name());
            assert_eq!(algorithm.required_capabilities(), kind.required_capabilities());
            assert!(!algorithm.parameters().is_empty());
        }
    }

    #[test]
    fn capability_requirements_gate_particles() {
        assert!(AlgorithmKind::Compression.is_particle_allowed(&Particle::basic()));
        assert!(!AlgorithmKind::Separation.is_particle_allowed(&Particle::basic()));
        assert!(AlgorithmKind::Separation.is_particle_allowed(&Particle::separable(1)));
        assert!(AlgorithmKind::Alignment.is_particle_allowed(&Particle::continuous(0.5, 0.0)));
        assert!(!AlgorithmKind::Alignment.is_particle_allowed(&Particle::basic()));
        assert!(AlgorithmKind::Foraging.is_particle_allowed(&Particle::food()));
        assert!(AlgorithmKind::Foraging.is_particle_allowed(&Particle::foraging()));
        assert!(!AlgorithmKind::Foraging.is_particle_allowed(&Particle::basic()));
        assert!(AlgorithmKind::BobBotAlignment.is_particle_allowed(&Particle::directed(crate::geometry::N)));
        assert!(!AlgorithmKind::BobBotAlignment.is_particle_allowed(&Particle::oriented(0.3)));
        assert!(AlgorithmKind::HeadingAlignment.is_particle_allowed(&Particle::oriented(0.3)));
        assert!(!AlgorithmKind::HeadingAlignment.is_particle_allowed(&Particle::continuous(0.5, 0.0)));
        assert!(!AlgorithmKind::Alignment.is_particle_allowed(&Particle::oriented(0.3)));
    }
}
