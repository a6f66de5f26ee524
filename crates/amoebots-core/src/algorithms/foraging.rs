use super::{Algorithm, accept, future_neighbor_count, is_food, is_foraging};
use crate::geometry::Position;
use crate::grid::Grid;
use crate::params::{self, ParameterDef, ParameterEntry, ParameterError, ParameterKind, ParameterValue};
use crate::particle::Capability;
use crate::{GridError, ParticleId, rules};
use tracing::{debug, trace};

/// Food sources hand out tokens that hop between foragers; fed foragers
/// compress strongly while hungry ones wander.
#[derive(Debug, Clone, PartialEq)]
pub struct ForagingAlgorithm {
    fed_lambda: f64,
    hungry_lambda: f64,
    food_lifetime: u32,
    food_token_lifetime: u32,
    max_fed_activations: u32,
}

impl Default for ForagingAlgorithm {
    fn default() -> Self {
        Self {
            fed_lambda: 4.0,
            hungry_lambda: 1.0,
            food_lifetime: u32::MAX,
            food_token_lifetime: 4,
            max_fed_activations: 500,
        }
    }
}

const PARAMETERS: &[ParameterDef<ForagingAlgorithm>] = &[
    ParameterDef {
        name: "fed_lambda",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(4.0),
        description: "compression bias of fed particles",
        get: |algorithm| ParameterValue::Number(algorithm.fed_lambda),
        set: |algorithm, value| {
            algorithm.fed_lambda = params::positive_number("fed_lambda", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "hungry_lambda",
        kind: ParameterKind::Number,
        default: ParameterValue::Number(1.0),
        description: "compression bias of hungry particles",
        get: |algorithm| ParameterValue::Number(algorithm.hungry_lambda),
        set: |algorithm, value| {
            algorithm.hungry_lambda = params::positive_number("hungry_lambda", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "food_lifetime",
        kind: ParameterKind::Integer,
        default: ParameterValue::Integer(u32::MAX as i64),
        description: "activations a food source lasts",
        get: |algorithm| ParameterValue::Integer(i64::from(algorithm.food_lifetime)),
        set: |algorithm, value| {
            algorithm.food_lifetime = params::count("food_lifetime", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "food_token_lifetime",
        kind: ParameterKind::Integer,
        default: ParameterValue::Integer(4),
        description: "hops a food token travels",
        get: |algorithm| ParameterValue::Integer(i64::from(algorithm.food_token_lifetime)),
        set: |algorithm, value| {
            algorithm.food_token_lifetime = params::count("food_token_lifetime", value)?;
            Ok(())
        },
    },
    ParameterDef {
        name: "max_fed_activations",
        kind: ParameterKind::Integer,
        default: ParameterValue::Integer(500),
        description: "activations a particle stays fed after receiving food",
        get: |algorithm| ParameterValue::Integer(i64::from(algorithm.max_fed_activations)),
        set: |algorithm, value| {
            algorithm.max_fed_activations = params::count("max_fed_activations", value)?;
            Ok(())
        },
    },
];

impl ForagingAlgorithm {
    pub const REQUIRED: &'static [Capability] = &[Capability::NeighborAware, Capability::FoodAware];

    #[must_use]
    pub fn new(
        fed_lambda: f64,
        hungry_lambda: f64,
        food_lifetime: u32,
        food_token_lifetime: u32,
        max_fed_activations: u32,
    ) -> Self {
        Self {
            fed_lambda,
            hungry_lambda,
            food_lifetime,
            food_token_lifetime,
            max_fed_activations,
        }
    }

    /// Feed every adjacent forager and burn one activation of the source.
    fn activate_food(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let foragers = grid.particle_neighbors(id, Some(&is_foraging))?;
        for forager in foragers {
            if let Some(state) = grid.particle_mut(forager).and_then(|p| p.foraging_mut()) {
                state.give_food_token(self.food_token_lifetime, self.max_fed_activations);
            }
        }

        let food = grid
            .particle_mut(id)
            .and_then(|p| p.food_mut())
            .ok_or(GridError::NotOnGrid)?;
        let remaining = food.remaining_activations.get_or_insert(self.food_lifetime);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            debug!(?id, "food source exhausted");
            grid.remove_particle(id)?;
        }
        Ok(())
    }

    fn activate_forager(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let state = grid
            .particle_mut(id)
            .and_then(|p| p.foraging_mut())
            .ok_or(GridError::NotOnGrid)?;
        let token = state.take_food_token();
        let fed_for = state.max_fed_activations;

        if let Some(hops) = token
            && hops > 1
        {
            let direction = grid.uniform_random_direction();
            if let Some(receiver) = grid.relative_neighbor(id, direction, 0, Some(&is_foraging))?
                && let Some(state) = grid.particle_mut(receiver).and_then(|p| p.foraging_mut())
            {
                state.give_food_token(hops - 1, fed_for);
                trace!(?id, ?receiver, hops = hops - 1, "food token passed on");
            }
        }

        let state = grid
            .particle_mut(id)
            .and_then(|p| p.foraging_mut())
            .ok_or(GridError::NotOnGrid)?;
        state.age();
        let lambda = if state.is_fed() {
            self.fed_lambda
        } else {
            self.hungry_lambda
        };

        let direction = grid.uniform_random_direction();
        if grid.relative_neighbor(id, direction, 0, Some(&is_food))?.is_some() {
            return Ok(());
        }
        if !rules::is_legal_move(grid, id, direction, false, true, Some(&is_foraging))? {
            return Ok(());
        }
        let current = grid.particle_neighbors(id, None)?.len() as i32;
        let future = future_neighbor_count(grid, id, direction)? as i32;
        if !accept(grid, lambda.powi(future - current)) {
            return Ok(());
        }
        if let Err(error) = grid.move_in_direction(id, direction) {
            trace!(?id, %direction, %error, "foraging move rejected by grid");
        }
        Ok(())
    }
}

impl Algorithm for ForagingAlgorithm {
    fn name(&self) -> &'static str {
        "Foraging"
    }

    fn required_capabilities(&self) -> &'static [Capability] {
        Self::REQUIRED
    }

    fn on_activation(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let particle = grid.particle(id).ok_or(GridError::NotOnGrid)?;
        if particle.is_food() {
            self.activate_food(grid, id)
        } else {
            self.activate_forager(grid, id)
        }
    }

    /// Foragers must stay connected and hole-free. Food cells count as empty.
    fn is_grid_valid(&self, grid: &Grid) -> bool {
        let forager_at = |position: &Position| {
            grid.particle_at(position)
                .and_then(|id| grid.particle(id))
                .is_some_and(|particle| particle.is_foraging())
        };
        rules::is_connected(grid, &forager_at) && rules::is_connected(grid, |position| !forager_at(position))
    }

    fn diagnostics(&self, grid: &Grid) -> Vec<(String, String)> {
        let foragers: Vec<_> = grid
            .particles()
            .filter_map(|(_, particle)| particle.foraging_state())
            .collect();
        let longest = foragers
            .iter()
            .map(|state| state.longest_last_fed_activations_ago)
            .max()
            .unwrap_or(0);
        let satiation = if foragers.is_empty() {
            "n/a".to_owned()
        } else {
            let mean = foragers.iter().map(|state| state.satiation()).sum::<f64>()
                / foragers.len() as f64;
            format!("{mean:.3}")
        };
        vec![
            ("Longest un-fed wait so far".to_owned(), longest.to_string()),
            ("Mean satiation".to_owned(), satiation),
        ]
    }

    fn parameters(&self) -> Vec<ParameterEntry> {
        params::describe(self, PARAMETERS)
    }

    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<(), ParameterError> {
        params::assign(self, PARAMETERS, name, value)
    }
}
