use super::alignment::normalized_cosine;
use super::{Algorithm, accept, polar_order};
use crate::geometry::{Compass, Direction, normalize_angle};
use crate::grid::Grid;
use crate::params::{self, ParameterDef, ParameterEntry, ParameterError, ParameterKind, ParameterValue};
use crate::particle::Capability;
use crate::{GridError, ParticleId};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::{Rng, rngs::SmallRng};
use std::f64::consts::TAU;
use tracing::trace;

/// Alignment for lattice particles that keep a free heading. Rotations draw
/// any angle; translations still step along compass directions.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingAlignmentAlgorithm {
    rotation_bias: f64,
    translation_bias: f64,
    forward_bias: f64,
    rotation_probability: f64,
}

impl Default for HeadingAlignmentAlgorithm {
    fn default() -> Self {
        Self {
            rotation_bias: 20.0,
            translation_bias: 1.0,
            forward_bias: 1.1,
            rotation_probability: 0.1,
        }
    }
}

const PARAMETERS: &[ParameterDef<HeadingAlignmentAlgorithm>] = &[
    ParameterDef {
        name: "rotation_bias",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(20.0),
        description: "preference for headings shared with neighbors",
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
        description: "preference for steps that gain neighbors",
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
        description: "preference for steps close to the heading",
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
        description: "chance an activation attempts a rotation",
        get: |algorithm| ParameterValue::Number(algorithm.rotation_probability),
        set: |algorithm, value| {
            algorithm.rotation_probability = params::probability("rotation_probability", value)?;
            Ok(())
        },
    },
];

impl HeadingAlignmentAlgorithm {
    pub const REQUIRED: &'static [Capability] = &[
        Capability::Movable,
        Capability::NeighborAware,
        Capability::Spinning,
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

    fn heading_of(grid: &Grid, id: ParticleId) -> Result<f64, GridError> {
        grid.particle(id)
            .ok_or(GridError::NotOnGrid)?
            .facing()
            .map(|facing| facing.drawn_angle())
            .ok_or(GridError::InvalidMove("particle has no facing"))
    }

    /// Sum over `neighbors` of how closely each one's facing matches `heading`.
    fn alignment(grid: &Grid, heading: f64, neighbors: &[ParticleId]) -> f64 {
        neighbors
            .iter()
            .filter_map(|&id| grid.particle(id)?.facing())
            .map(|other| normalized_cosine(other.drawn_angle() - heading))
            .sum()
    }

    /// Acceptance probability of `id` turning to the heading `candidate`.
    pub fn rotation_probability_for(
        &self,
        grid: &Grid,
        id: ParticleId,
        candidate: f64,
    ) -> Result<f64, GridError> {
        let heading = Self::heading_of(grid, id)?;
        let neighbors = grid.particle_neighbors(id, None)?;
        let gain = Self::alignment(grid, candidate, &neighbors) - Self::alignment(grid, heading, &neighbors);
        Ok(self.rotation_bias.powf(gain))
    }

    /// Acceptance probability of `id` stepping along `direction` with its heading unchanged.
    pub fn translation_probability(
        &self,
        grid: &Grid,
        id: ParticleId,
        direction: Direction,
    ) -> Result<f64, GridError> {
        let heading = Self::heading_of(grid, id)?;
        let current = grid.particle_neighbors(id, None)?;
        let mut future = grid.adjacent_position_neighbors(id, direction, None)?;
        future.retain(|&other| other != id);
        let gained = future.len() as i32 - current.len() as i32;
        let alignment_gain = Self::alignment(grid, heading, &future) - Self::alignment(grid, heading, &current);
        Ok(self.translation_bias.powi(gained) * self.rotation_bias.powf(alignment_gain))
    }

    /// Weight of each compass step: `forward_bias^cos_sim(step, heading)`.
    fn step_weights(&self, compass: Compass, heading: f64) -> Vec<f64> {
        compass
            .directions()
            .iter()
            .map(|step| {
                self.forward_bias
                    .powf(normalized_cosine(normalize_angle(step.drawn_angle() - heading)))
            })
            .collect()
    }

    fn rotate(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let candidate = grid.rng().random_range(0.0..TAU);
        let probability = self.rotation_probability_for(grid, id, candidate)?;
        if accept(grid, probability) {
            grid.set_facing(id, Direction::heading(candidate))?;
        }
        Ok(())
    }

    fn translate(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let heading = Self::heading_of(grid, id)?;
        let compass = grid.compass();
        let Ok(index) = WeightedIndex::new(self.step_weights(compass, heading)) else {
            return Ok(());
        };
        let rng: &mut SmallRng = grid.rng();
        let direction = compass.directions()[index.sample(rng)];
        if !grid.is_direction_in_bounds(id, direction)? {
            return Ok(());
        }
        let probability = self.translation_probability(grid, id, direction)?;
        if !accept(grid, probability) {
            return Ok(());
        }
        if let Err(error) = grid.move_in_direction(id, direction) {
            trace!(?id, %direction, %error, "heading alignment move rejected by grid");
        }
        Ok(())
    }
}

impl Algorithm for HeadingAlignmentAlgorithm {
    fn name(&self) -> &'static str {
        "Heading Alignment"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{N, Position};
    use crate::{GridConfig, Particle, Topology};
    use std::f64::consts::FRAC_PI_2;

    fn hex_grid(radius: i32, seed: u64) -> Grid {
        Grid::new(GridConfig {
            topology: Topology::Hexagonal { radius },
            rng_seed: Some(seed),
            history_capacity: 0,
        })
        .expect("grid")
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn turning_towards_neighbor_headings_is_favored() {
        let mut grid = hex_grid(3, 1);
        let me = grid.add_particle(Particle::oriented(0.0), Position::cell(0, 0)).expect("me");
        grid.add_particle(Particle::oriented(FRAC_PI_2), Position::cell(1, 0)).expect("a");
        grid.add_particle(Particle::oriented(FRAC_PI_2), Position::cell(0, -1)).expect("b");
        let algorithm = HeadingAlignmentAlgorithm::default();
        // Each neighbor goes from cosine similarity 0.5 to 1.
        let toward = algorithm.rotation_probability_for(&grid, me, FRAC_PI_2).expect("toward");
        assert!(close(toward, 20.0));
        let stay = algorithm.rotation_probability_for(&grid, me, 0.0).expect("stay");
        assert!(close(stay, 1.0));
    }

    #[test]
    fn steps_into_aligned_company_are_favored() {
        let mut grid = hex_grid(4, 2);
        let me = grid.add_particle(Particle::oriented(FRAC_PI_2), Position::cell(0, 0)).expect("me");
        grid.add_particle(Particle::oriented(FRAC_PI_2), Position::cell(0, -2)).expect("ahead");
        let algorithm = HeadingAlignmentAlgorithm::new(20.0, 2.0, 1.1, 0.1);
        let probability = algorithm.translation_probability(&grid, me, N).expect("step");
        assert!(close(probability, 40.0));
    }

    #[test]
    fn step_weights_peak_along_the_heading() {
        let algorithm = HeadingAlignmentAlgorithm::new(20.0, 1.0, 4.0, 0.1);
        let compass = Compass::Hexagonal;
        let weights = algorithm.step_weights(compass, FRAC_PI_2);
        let best = weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| compass.directions()[index]);
        assert_eq!(best, Some(N));
        assert!(weights.iter().all(|&weight| (1.0..=4.0).contains(&weight)));
    }

    #[test]
    fn oriented_flock_keeps_free_headings() {
        let mut grid = hex_grid(5, 9);
        for (index, (q, r)) in [(0, 0), (1, 0), (0, 1), (-1, 1), (2, -1), (-2, 0)].into_iter().enumerate() {
            grid.add_particle(Particle::oriented(index as f64), Position::cell(q, r))
                .expect("place");
        }
        let key = grid.register_algorithm(HeadingAlignmentAlgorithm::default());
        grid.assign_all(Some(key)).expect("assign");
        grid.run_activations(3_000).expect("run");
        assert!(grid.moves_made() > 0);
        for (id, particle) in grid.particles() {
            let position = grid.position_of(id).expect("position");
            assert!(grid.topology().is_position_valid(&position, 0.0));
            assert!(particle.facing().and_then(|facing| facing.angle()).is_some());
        }
        let order = polar_order(&grid).expect("order");
        assert!((0.0..=1.0 + 1e-9).contains(&order));
    }
}
