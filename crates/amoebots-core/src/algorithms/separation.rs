use super::{Algorithm, accept, future_neighbor_count};
use crate::geometry::Direction;
use crate::grid::Grid;
use crate::params::{self, ParameterDef, ParameterEntry, ParameterError, ParameterKind, ParameterValue};
use crate::particle::{Capability, Particle};
use crate::{GridError, ParticleId, rules};
use tracing::trace;

/// Compression with a homogeneity bias: particles of the same color class
/// attract each other with strength `alpha`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeparationAlgorithm {
    lambda: f64,
    alpha: f64,
    swaps_allowed: bool,
    non_swaps_allowed: bool,
}

impl Default for SeparationAlgorithm {
    fn default() -> Self {
        Self {
            lambda: 4.0,
            alpha: 4.0,
            swaps_allowed: true,
            non_swaps_allowed: false,
        }
    }
}

const PARAMETERS: &[ParameterDef<SeparationAlgorithm>] = &[
    ParameterDef {
        name: "lambda",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(4.0),
        description: "bias towards moves that gain neighbors",
        get: |algorithm| ParameterValue::Number(algorithm.lambda),
        set: |algorithm, value| {
            algorithm.lambda = params::positive_number("lambda", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "alpha",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(4.0),
        description: "bias towards neighbors of the same class",
        get: |algorithm| ParameterValue::Number(algorithm.alpha),
        set: |algorithm, value| {
            algorithm.alpha = params::positive_number("alpha", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "swaps_allowed",
        kind: ParameterKind::Boolean,
        default: ParameterValue::Boolean(true),
        description: "allow exchanging places with a neighbor",
        get: |algorithm| ParameterValue::Boolean(algorithm.swaps_allowed),
        set: |algorithm, value| {
            algorithm.swaps_allowed = params::flag("swaps_allowed", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "non_swaps_allowed",
        kind: ParameterKind::Boolean,
        default: ParameterValue::Boolean(false),
        description: "allow moving into empty cells",
        get: |algorithm| ParameterValue::Boolean(algorithm.non_swaps_allowed),
        set: |algorithm, value| {
            algorithm.non_swaps_allowed = params::flag("non_swaps_allowed", value)?;
            Ok(())
        },
    },
];

impl SeparationAlgorithm {
    pub const REQUIRED: &'static [Capability] = &[
        Capability::Movable,
        Capability::SwapMovable,
        Capability::NeighborAware,
        Capability::ClassTagged,
    ];

    #[must_use]
    pub fn new(lambda: f64, alpha: f64, swaps_allowed: bool, non_swaps_allowed: bool) -> Self {
        Self {
            lambda,
            alpha,
            swaps_allowed,
            non_swaps_allowed,
        }
    }

    #[must_use]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Acceptance probability of `id` moving, or swapping, along `direction`.
    ///
    /// A swap leaves occupancy unchanged, so only the homogeneity of both
    /// participants enters its probability.
    pub fn move_probability(
        &self,
        grid: &Grid,
        id: ParticleId,
        direction: Direction,
    ) -> Result<f64, GridError> {
        let class = grid.particle(id).ok_or(GridError::NotOnGrid)?.class_id();
        let same_as_mover =
            move |other: ParticleId, particle: &Particle| other != id && particle.class_id() == class;

        let Some(neighbor) = grid.relative_neighbor(id, direction, 0, None)? else {
            let current = grid.particle_neighbors(id, None)?.len() as i32;
            let future = future_neighbor_count(grid, id, direction)? as i32;
            let current_same = grid.particle_neighbors(id, Some(&same_as_mover))?.len() as i32;
            let future_same = grid
                .adjacent_position_neighbors(id, direction, Some(&same_as_mover))?
                .len() as i32;
            return Ok(self.alpha.powi(future_same - current_same) * self.lambda.powi(future - current));
        };

        let neighbor_class = grid.particle(neighbor).ok_or(GridError::NotOnGrid)?.class_id();
        let same_as_neighbor = move |other: ParticleId, particle: &Particle| {
            other != neighbor && particle.class_id() == neighbor_class
        };
        let classes_match = i32::from(class == neighbor_class);

        let mover_current = grid.particle_neighbors(id, Some(&same_as_mover))?.len() as i32;
        let mover_future = grid
            .adjacent_position_neighbors(id, direction, Some(&same_as_mover))?
            .len() as i32
            + classes_match;
        let neighbor_current = grid
            .adjacent_position_neighbors(id, direction, Some(&same_as_neighbor))?
            .len() as i32;
        let neighbor_future =
            grid.particle_neighbors(id, Some(&same_as_neighbor))?.len() as i32 + classes_match;

        Ok(self
            .alpha
            .powi(mover_future - mover_current + neighbor_future - neighbor_current))
    }
}

impl Algorithm for SeparationAlgorithm {
    fn name(&self) -> &'static str {
        "Separation"
    }

    fn required_capabilities(&self) -> &'static [Capability] {
        Self::REQUIRED
    }

    fn on_activation(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let direction = grid.uniform_random_direction();
        let legal = rules::is_legal_move(
            grid,
            id,
            direction,
            self.swaps_allowed,
            self.non_swaps_allowed,
            None,
        )?;
        if !legal {
            return Ok(());
        }
        let probability = self.move_probability(grid, id, direction)?;
        if !accept(grid, probability) {
            return Ok(());
        }
        let outcome = if self.swaps_allowed {
            grid.swap_in_direction(id, direction)
        } else {
            grid.move_in_direction(id, direction)
        };
        if let Err(error) = outcome {
            trace!(?id, %direction, %error, "separation move rejected by grid");
        }
        Ok(())
    }

    fn is_grid_valid(&self, grid: &Grid) -> bool {
        rules::check_particle_connection(grid) && rules::check_particle_holes(grid)
    }

    fn diagnostics(&self, grid: &Grid) -> Vec<(String, String)> {
        vec![(
            "Same-class adjacencies".to_owned(),
            rules::same_class_adjacencies(grid).to_string(),
        )]
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
    use crate::geometry::{NE, Position, S};
    use crate::{GridConfig, Topology};
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    fn hex_grid(radius: i32, seed: u64) -> Grid {
        Grid::new(GridConfig {
            topology: Topology::Hexagonal { radius },
            rng_seed: Some(seed),
            history_capacity: 0,
        })
        .expect("grid")
    }

    #[test]
    fn swap_probability_counts_both_participants() {
        let mut grid = hex_grid(4, 1);
        // Column of classes 0, 1, 1: swapping the top two splits the ones.
        let top = grid.add_particle(Particle::separable(0), Position::cell(0, -1)).expect("top");
        grid.add_particle(Particle::separable(1), Position::cell(0, 0)).expect("middle");
        grid.add_particle(Particle::separable(1), Position::cell(0, 1)).expect("bottom");
        let algorithm = SeparationAlgorithm::default();
        // Mover gains nothing; the displaced particle loses its same-class neighbor.
        assert_eq!(algorithm.move_probability(&grid, top, S).expect("swap"), 0.25);

        let mut grid = hex_grid(4, 1);
        let top = grid.add_particle(Particle::separable(1), Position::cell(0, -1)).expect("top");
        grid.add_particle(Particle::separable(0), Position::cell(0, 0)).expect("middle");
        grid.add_particle(Particle::separable(1), Position::cell(0, 1)).expect("bottom");
        // Mover gains the bottom neighbor, the displaced particle gains nothing.
        assert_eq!(algorithm.move_probability(&grid, top, S).expect("swap"), 4.0);
    }

    #[test]
    fn empty_target_uses_both_biases() {
        let mut grid = hex_grid(4, 1);
        grid.add_particle(Particle::separable(0), Position::cell(0, 0)).expect("a");
        grid.add_particle(Particle::separable(1), Position::cell(1, -1)).expect("b");
        let mover = grid.add_particle(Particle::separable(0), Position::cell(0, 1)).expect("mover");
        let algorithm = SeparationAlgorithm::new(2.0, 3.0, true, true);
        // One more neighbor overall, same-class count unchanged.
        let probability = algorithm
            .move_probability(&grid, mover, NE)
            .expect("probability");
        assert_eq!(probability, 2.0);
        // Moving away loses the only neighbor, which shares the class.
        let probability = algorithm.move_probability(&grid, mover, S).expect("probability");
        assert!((probability - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn diagnostics_report_same_class_pairs() {
        let mut grid = hex_grid(3, 1);
        grid.add_particle(Particle::separable(0), Position::cell(0, 0)).expect("a");
        grid.add_particle(Particle::separable(0), Position::cell(1, 0)).expect("b");
        let key = grid.register_algorithm(SeparationAlgorithm::default());
        grid.assign_all(Some(key)).expect("assign");
        let info = grid.grid_information();
        assert_eq!(
            info.last(),
            Some(&("Same-class adjacencies".to_owned(), "1".to_owned()))
        );
    }

    #[test]
    fn flags_are_boolean_parameters() {
        let mut algorithm = SeparationAlgorithm::default();
        assert!(matches!(
            algorithm.set_parameter("swaps_allowed", ParameterValue::Number(1.0)),
            Err(ParameterError::TypeMismatch { .. })
        ));
        algorithm
            .set_parameter("non_swaps_allowed", ParameterValue::Boolean(true))
            .expect("set");
        let names: Vec<&str> = algorithm.parameters().iter().map(|entry| entry.name).collect();
        assert_eq!(names, ["lambda", "alpha", "swaps_allowed", "non_swaps_allowed"]);
    }

    /// A mixed blob sorts itself: same-class adjacencies grow over time.
    #[test]
    fn classes_separate_over_time() {
        let mut grid = hex_grid(18, 2024);
        let mut placement = SmallRng::seed_from_u64(99);
        let cells: Vec<Position> = grid
            .topology()
            .valid_positions()
            .into_iter()
            .filter(|position| {
                let (q, r) = position.as_cell().unwrap_or((i32::MAX, 0));
                (q.abs() + r.abs() + (q + r).abs()) / 2 <= 14
            })
            .collect();
        for position in cells {
            let class = u8::from(placement.random_bool(0.5));
            grid.add_particle(Particle::separable(class), position).expect("place");
        }
        let key = grid.register_algorithm(SeparationAlgorithm::new(4.0, 8.0, true, false));
        grid.assign_all(Some(key)).expect("assign");

        let initial = rules::same_class_adjacencies(&grid);
        let mut checkpoints = Vec::new();
        for _ in 0..5 {
            grid.run_activations(10_000).expect("run");
            checkpoints.push(rules::same_class_adjacencies(&grid));
        }
        let last = *checkpoints.last().expect("checkpoint");
        assert!(
            last as f64 > initial as f64 * 1.1,
            "same-class adjacencies went from {initial} to {last} ({checkpoints:?})"
        );
        assert!(checkpoints[0] > initial);
        assert!(SeparationAlgorithm::default().is_grid_valid(&grid));
    }
}
