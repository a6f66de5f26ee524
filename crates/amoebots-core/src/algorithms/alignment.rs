use super::{Algorithm, accept};
use crate::geometry::{Direction, normalize_angle};
use crate::grid::Grid;
use crate::params::{self, ParameterDef, ParameterEntry, ParameterError, ParameterKind, ParameterValue};
use crate::particle::Capability;
use crate::{GridError, ParticleId};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::{Rng, rngs::SmallRng};
use rand_distr::StandardNormal;
use std::f64::consts::{PI, TAU};
use tracing::trace;

/// Flocking: particles turn towards their neighbors' facings and drift
/// forward along their own.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentAlgorithm {
    rotation_bias: f64,
    translation_bias: f64,
    forward_bias: f64,
    rotation_probability: f64,
}

impl Default for AlignmentAlgorithm {
    fn default() -> Self {
        Self {
            rotation_bias: 20.0,
            translation_bias: 1.0,
            forward_bias: 1.1,
            rotation_probability: 0.1,
        }
    }
}

const PARAMETERS: &[ParameterDef<AlignmentAlgorithm>] = &[
    ParameterDef {
        name: "rotation_bias",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(20.0),
        description: "preference for facings aligned with neighbors",
        get: |algorithm| ParameterValue::Number(algorithm.rotation_bias),
        set: |algorithm, value| {
            algorithm.rotation_bias = params::positive_number("rotation_bias", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "translation_bias",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(1.0),
        description: "preference for moves that gain neighbors",
        get: |algorithm| ParameterValue::Number(algorithm.translation_bias),
        set: |algorithm, value| {
            algorithm.translation_bias = params::positive_number("translation_bias", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "forward_bias",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(1.1),
        description: "preference for moving along the current facing",
        get: |algorithm| ParameterValue::Number(algorithm.forward_bias),
        set: |algorithm, value| {
            algorithm.forward_bias = params::positive_number("forward_bias", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "rotation_probability",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(0.1),
        description: "chance an activation rotates instead of translating",
        get: |algorithm| ParameterValue::Number(algorithm.rotation_probability),
        set: |algorithm, value| {
            algorithm.rotation_probability = params::probability("rotation_probability", value)?;
            Ok(())
        },
    },
];

/// Cosine similarity mapped to `[0, 1]`.
pub(crate) fn normalized_cosine(angle: f64) -> f64 {
    (angle.cos() + 1.0) / 2.0
}

/// Wrapped normal angle with spread `sigma`, in `[-π, π)`.
pub fn wrapped_normal<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    (z * sigma + PI).rem_euclid(TAU) - PI
}

impl AlignmentAlgorithm {
    pub const REQUIRED: &'static [Capability] = &[
        Capability::Movable,
        Capability::NeighborAware,
        Capability::Directional,
    ];

    #[must_use]
    pub fn new(
        rotation_bias: f64,
        translation_bias: f64,
        forward_bias: f64,
        rotation_probability: f64,
    ) -> Self {
        Self {
            rotation_bias,
            translation_bias,
            forward_bias,
            rotation_probability,
        }
    }

    #[must_use]
    pub fn rotation_probability(&self) -> f64 {
        self.rotation_probability
    }

    /// Sum over `neighbors` of how closely each one's facing matches `facing`.
    fn alignment(&self, grid: &Grid, facing: Direction, neighbors: &[ParticleId]) -> f64 {
        let compass = grid.compass();
        neighbors
            .iter()
            .filter_map(|&id| grid.particle(id)?.facing())
            .map(|other| normalized_cosine(compass.facing_angle(facing, other)))
            .sum()
    }

    /// Acceptance probability of `id` turning to `candidate`.
    pub fn rotation_probability_for(
        &self,
        grid: &Grid,
        id: ParticleId,
        candidate: Direction,
    ) -> Result<f64, GridError> {
        let facing = self.facing_of(grid, id)?;
        let neighbors = grid.particle_neighbors(id, None)?;
        let gain = self.alignment(grid, candidate, &neighbors) - self.alignment(grid, facing, &neighbors);
        Ok(self.rotation_bias.powf(gain))
    }

    /// Acceptance probability of `id` stepping along `direction` with its facing unchanged.
    pub fn translation_probability(
        &self,
        grid: &Grid,
        id: ParticleId,
        direction: Direction,
    ) -> Result<f64, GridError> {
        let facing = self.facing_of(grid, id)?;
        let current = grid.particle_neighbors(id, None)?;
        let mut future = grid.adjacent_position_neighbors(id, direction, None)?;
        future.retain(|&other| other != id);
        let gained = future.len() as i32 - current.len() as i32;
        let alignment_gain =
            self.alignment(grid, facing, &future) - self.alignment(grid, facing, &current);
        Ok(self.translation_bias.powi(gained) * self.rotation_bias.powf(alignment_gain))
    }

    fn facing_of(&self, grid: &Grid, id: ParticleId) -> Result<Direction, GridError> {
        grid.particle(id)
            .ok_or(GridError::NotOnGrid)?
            .facing()
            .ok_or(GridError::InvalidMove("particle has no facing"))
    }

    /// Translation direction biased towards `facing`.
    ///
    /// Lattice directions are weighted by `forward_bias^cos_sim`; on the
    /// plane the heading deviates from `facing` by a wrapped normal.
    fn sample_translation(&self, grid: &mut Grid, facing: Direction) -> Option<Direction> {
        let compass = grid.compass();
        if !compass.is_discrete() {
            let angle = facing.angle()?;
            let deviation = wrapped_normal(grid.rng(), self.forward_bias);
            return Some(Direction::heading(normalize_angle(angle + deviation)));
        }
        let directions = compass.directions();
        let weights: Vec<f64> = directions
            .iter()
            .map(|&direction| {
                self.forward_bias
                    .powf(normalized_cosine(compass.facing_angle(direction, facing)))
            })
            .collect();
        let index = WeightedIndex::new(&weights).ok()?;
        let rng: &mut SmallRng = grid.rng();
        Some(directions[index.sample(rng)])
    }

    fn rotate(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let candidate = grid.uniform_random_direction();
        let probability = self.rotation_probability_for(grid, id, candidate)?;
        if accept(grid, probability) {
            grid.set_facing(id, candidate)?;
        }
        Ok(())
    }

    fn translate(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let facing = self.facing_of(grid, id)?;
        let Some(direction) = self.sample_translation(grid, facing) else {
            return Ok(());
        };
        if !grid.is_direction_in_bounds(id, direction)? {
            return Ok(());
        }
        let probability = self.translation_probability(grid, id, direction)?;
        if !accept(grid, probability) {
            return Ok(());
        }
        if let Err(error) = grid.move_in_direction(id, direction) {
            trace!(?id, %direction, %error, "alignment move rejected by grid");
        }
        Ok(())
    }
}

/// Length of the mean facing vector of every directional particle, in `[0, 1]`.
#[must_use]
pub fn polar_order(grid: &Grid) -> Option<f64> {
    let (sum_x, sum_y, count) = grid
        .particles()
        .filter_map(|(_, particle)| particle.facing())
        .map(|facing| facing.drawn_vector())
        .fold((0.0, 0.0, 0_usize), |(sx, sy, n), (x, y)| (sx + x, sy + y, n + 1));
    (count > 0).then(|| (sum_x / count as f64).hypot(sum_y / count as f64))
}

impl Algorithm for AlignmentAlgorithm {
    fn name(&self) -> &'static str {
        "Alignment"
    }

    fn required_capabilities(&self) -> &'static [Capability] {
        Self::REQUIRED
    }

    fn on_activation(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let roll: f64 = grid.rng().random();
        if roll <= self.rotation_probability {
            self.rotate(grid, id)
        } else {
            self.translate(grid, id)
        }
    }

    fn is_grid_valid(&self, _grid: &Grid) -> bool {
        true
    }

    fn diagnostics(&self, grid: &Grid) -> Vec<(String, String)> {
        let order = polar_order(grid).map_or_else(|| "n/a".to_owned(), |order| format!("{order:.3}"));
        vec![("Polar order".to_owned(), order)]
    }

    fn parameters(&self) -> Vec<ParameterEntry> {
        params::describe(self, PARAMETERS)
    }

    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<(), ParameterError> {
        params::assign(self, PARAMETERS, name, value)
    }
}
