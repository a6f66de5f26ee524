use super::{Algorithm, accept, polar_order};
use crate::geometry::Direction;
use crate::grid::Grid;
use crate::params::{self, ParameterDef, ParameterEntry, ParameterError, ParameterKind, ParameterValue};
use crate::particle::Capability;
use crate::{GridError, ParticleId};
use rand::Rng;
use tracing::trace;

/// Contact-driven alignment modelled on vibrating robots: a particle is more
/// likely to act when neighbors press against its back, and then either spins
/// or steps in a uniformly random direction.
#[derive(Debug, Clone, PartialEq)]
pub struct BobBotAlignmentAlgorithm {
    base_move_probability: f64,
    contact_weight: f64,
    rotation_probability: f64,
}

impl Default for BobBotAlignmentAlgorithm {
    fn default() -> Self {
        Self {
            base_move_probability: 0.2,
            contact_weight: 0.1,
            rotation_probability: 0.5,
        }
    }
}

const PARAMETERS: &[ParameterDef<BobBotAlignmentAlgorithm>] = &[
    ParameterDef {
        name: "base_move_probability",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(0.2),
        description: "chance to act with no neighbors in contact",
        get: |algorithm| ParameterValue::Number(algorithm.base_move_probability),
        set: |algorithm, value| {
            algorithm.base_move_probability = params::probability("base_move_probability", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "contact_weight",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(0.1),
        description: "change in that chance per neighbor pushing from behind",
        get: |algorithm| ParameterValue::Number(algorithm.contact_weight),
        set: |algorithm, value| {
            algorithm.contact_weight = params::positive_number("contact_weight", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "rotation_probability",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(0.5),
        description: "chance an accepted activation spins instead of stepping",
        get: |algorithm| ParameterValue::Number(algorithm.rotation_probability),
        set: |algorithm, value| {
            algorithm.rotation_probability = params::probability("rotation_probability", value)?;
            Ok(())
        },
    },
];

impl BobBotAlignmentAlgorithm {
    pub const REQUIRED: &'static [Capability] = &[
        Capability::Movable,
        Capability::NeighborAware,
        Capability::Directional,
    ];

    #[must_use]
    pub fn new(base_move_probability: f64, contact_weight: f64, rotation_probability: f64) -> Self {
        Self {
            base_move_probability,
            contact_weight,
            rotation_probability,
        }
    }

    /// Directions from `id` towards each particle touching it.
    fn contact_directions(grid: &Grid, id: ParticleId) -> Result<Vec<Direction>, GridError> {
        let position = grid.position_of(id).ok_or(GridError::NotOnGrid)?;
        if grid.topology().is_discrete() {
            return Ok(grid
                .compass()
                .directions()
                .iter()
                .copied()
                .filter(|&direction| grid.neighbor_in_direction(&position, direction, None).is_some())
                .collect());
        }
        let (x, y) = position.coords();
        Ok(grid
            .particle_neighbors(id, None)?
            .into_iter()
            .filter_map(|other| grid.position_of(other))
            .map(|other| {
                let (ox, oy) = other.coords();
                Direction::heading((y - oy).atan2(ox - x))
            })
            .collect())
    }

    /// Chance that `id` acts at all: `base + weight * Σ -cos(contact, facing)`.
    pub fn move_probability(&self, grid: &Grid, id: ParticleId) -> Result<f64, GridError> {
        let facing = grid
            .particle(id)
            .ok_or(GridError::NotOnGrid)?
            .facing()
            .ok_or(GridError::InvalidMove("particle has no facing"))?;
        let compass = grid.compass();
        let push: f64 = Self::contact_directions(grid, id)?
            .into_iter()
            .map(|contact| -compass.facing_angle(contact, facing).cos())
            .sum();
        Ok(self.base_move_probability + self.contact_weight * push)
    }
}

impl Algorithm for BobBotAlignmentAlgorithm {
    fn name(&self) -> &'static str {
        "BobBot Alignment"
    }

    fn required_capabilities(&self) -> &'static [Capability] {
        Self::REQUIRED
    }

    fn on_activation(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let probability = self.move_probability(grid, id)?;
        if !accept(grid, probability) {
            return Ok(());
        }
        let roll: f64 = grid.rng().random();
        let direction = grid.uniform_random_direction();
        if roll <= self.rotation_probability {
            return grid.set_facing(id, direction);
        }
        if !grid.is_direction_in_bounds(id, direction)? {
            return Ok(());
        }
        if let Err(error) = grid.move_in_direction(id, direction) {
            trace!(?id, %direction, %error, "bobbot move rejected by grid");
        }
        Ok(())
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
    use crate::geometry::{N, Position, S};
    use crate::{GridConfig, Particle, Topology};

    fn grid(topology: Topology, seed: u64) -> Grid {
        Grid::new(GridConfig {
            topology,
            rng_seed: Some(seed),
            history_capacity: 0,
        })
        .expect("grid")
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn pushes_from_behind_raise_the_move_probability() {
        let mut grid = grid(Topology::Hexagonal { radius: 3 }, 1);
        let me = grid.add_particle(Particle::directed(N), Position::cell(0, 0)).expect("me");
        let algorithm = BobBotAlignmentAlgorithm::default();
        assert!(close(algorithm.move_probability(&grid, me).expect("alone"), 0.2));

        let behind = grid.add_particle(Particle::directed(N), Position::cell(0, 1)).expect("behind");
        assert!(close(algorithm.move_probability(&grid, me).expect("pushed"), 0.3));

        grid.add_particle(Particle::directed(S), Position::cell(0, -1)).expect("ahead");
        assert!(close(algorithm.move_probability(&grid, me).expect("squeezed"), 0.2));

        grid.remove_particle(behind).expect("remove");
        assert!(close(algorithm.move_probability(&grid, me).expect("blocked"), 0.1));
    }

    #[test]
    fn contacts_on_the_plane_use_bearing() {
        let mut grid = grid(Topology::Continuous { radius: 6.0 }, 2);
        let me = grid
            .add_particle(Particle::continuous(0.5, 0.0), Position::point(0.0, 0.0))
            .expect("me");
        grid.add_particle(Particle::continuous(0.5, 0.0), Position::point(1.0, 0.0))
            .expect("ahead");
        let algorithm = BobBotAlignmentAlgorithm::default();
        assert!(close(algorithm.move_probability(&grid, me).expect("blocked"), 0.1));
    }

    #[test]
    fn swarm_wanders_inside_the_hexagon() {
        let mut grid = grid(Topology::Hexagonal { radius: 4 }, 17);
        for (q, r) in [(0, 0), (1, 0), (0, 1), (-1, 1), (1, -1), (-1, 0)] {
            grid.add_particle(Particle::directed(N), Position::cell(q, r)).expect("place");
        }
        let key = grid.register_algorithm(BobBotAlignmentAlgorithm::default());
        grid.assign_all(Some(key)).expect("assign");
        grid.run_activations(3_000).expect("run");
        assert!(grid.moves_made() > 0);
        assert_eq!(grid.particle_count(), 6);
        for (id, _) in grid.particles() {
            let position = grid.position_of(id).expect("position");
            assert!(grid.topology().is_position_valid(&position, 0.0));
        }
        let info = grid.grid_information();
        assert_eq!(info.last().map(|(key, _)| key.as_str()), Some("Polar order"));
    }

    #[test]
    fn parameters_are_validated() {
        let mut algorithm = BobBotAlignmentAlgorithm::default();
        assert!(algorithm
            .set_parameter("base_move_probability", ParameterValue::Number(1.5))
            .is_err());
        algorithm
            .set_parameter("rotation_probability", ParameterValue::Number(1.0))
            .expect("set");
        let names: Vec<&str> = algorithm.parameters().iter().map(|entry| entry.name).collect();
        assert_eq!(names, ["base_move_probability", "contact_weight", "rotation_probability"]);
    }
}
