//! Random placement of particle populations.

use crate::algorithms::Algorithm;
use crate::geometry::Position;
use crate::grid::Grid;
use crate::particle::Particle;
use crate::{AlgorithmKey, GridError, ParticleId};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::SmallRng;
use tracing::{debug, warn};

/// Default number of positions tried per particle before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 10_000;

/// How many particles to place and where they may go.
#[derive(Clone, Copy)]
pub struct Placement<'a> {
    pub count: usize,
    /// Extra predicate on candidate positions.
    pub filter: Option<&'a dyn Fn(&Position) -> bool>,
    /// Placements that leave this algorithm's invariants broken are undone.
    pub validator: Option<&'a dyn Algorithm>,
    /// Algorithm assigned to each placed particle.
    pub assign: Option<AlgorithmKey>,
    pub max_attempts: usize,
}

impl<'a> Placement<'a> {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            count,
            filter: None,
            validator: None,
            assign: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: &'a dyn Fn(&Position) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: &'a dyn Algorithm) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn with_algorithm(mut self, key: AlgorithmKey) -> Self {
        self.assign = Some(key);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Place `placement.count` particles produced by `supply` at random positions.
///
/// On [`GridError::PlacementExhausted`] the particles placed so far stay on the grid.
pub fn add_particles<F>(
    grid: &mut Grid,
    placement: &Placement<'_>,
    mut supply: F,
) -> Result<Vec<ParticleId>, GridError>
where
    F: FnMut(&mut SmallRng) -> Particle,
{
    let mut placed = Vec::with_capacity(placement.count);
    for _ in 0..placement.count {
        let particle = supply(grid.rng());
        match place_one(grid, placement, particle)? {
            Some(id) => placed.push(id),
            None => {
                warn!(
                    placed = placed.len(),
                    requested = placement.count,
                    "random placement ran out of attempts"
                );
                return Err(GridError::PlacementExhausted {
                    placed: placed.len(),
                    requested: placement.count,
                });
            }
        }
    }
    debug!(count = placed.len(), "placed random particles");
    Ok(placed)
}

/// Like [`add_particles`], drawing each particle from `choices` in proportion to its weight.
pub fn add_weighted_particles(
    grid: &mut Grid,
    placement: &Placement<'_>,
    choices: &[(Particle, f64)],
) -> Result<Vec<ParticleId>, GridError> {
    let index = WeightedIndex::new(choices.iter().map(|(_, weight)| *weight))
        .map_err(|_| GridError::InvalidConfig("particle weights must be non-negative with a positive sum"))?;
    add_particles(grid, placement, |rng| choices[index.sample(rng)].0.clone())
}

fn place_one(
    grid: &mut Grid,
    placement: &Placement<'_>,
    particle: Particle,
) -> Result<Option<ParticleId>, GridError> {
    let topology = *grid.topology();
    let radius = particle.radius();
    for _ in 0..placement.max_attempts {
        let Some(position) = topology.random_position(grid.rng(), radius) else {
            continue;
        };
        if placement.filter.is_some_and(|keep| !keep(&position)) || grid.is_occupied(&position) {
            continue;
        }
        let id = match grid.add_particle(particle.clone(), position) {
            Ok(id) => id,
            Err(GridError::OccupiedPosition(_) | GridError::OutOfBounds(_)) => continue,
            Err(error) => return Err(error),
        };
        if let Some(validator) = placement.validator
            && !validator.is_grid_valid(grid)
        {
            grid.remove_particle(id)?;
            continue;
        }
        if let Some(key) = placement.assign {
            grid.assign_algorithm(id, Some(key))?;
        }
        return Ok(Some(id));
    }
    Ok(None)
}
