use super::{Algorithm, accept, future_neighbor_count};
use crate::geometry::Direction;
use crate::grid::Grid;
use crate::params::{self, ParameterDef, ParameterEntry, ParameterError, ParameterKind, ParameterValue};
use crate::particle::Capability;
use crate::{GridError, ParticleId, rules};
use tracing::trace;

/// Biased random walk that gathers particles into a compact blob.
///
/// A move gaining `k` neighbors is accepted with probability `lambda^k`, so
/// `lambda > 1` compresses and `lambda < 1` expands.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionAlgorithm {
    lambda: f64,
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        Self {
            lambda: Self::DEFAULT_LAMBDA,
        }
    }
}

const PARAMETERS: &[ParameterDef<CompressionAlgorithm>] = &[ParameterDef {
    name: "lambda",
    kind: ParameterKind::Number,
    default: ParameterValue::Number(CompressionAlgorithm::DEFAULT_LAMBDA),
    description: "bias towards moves that gain neighbors",
    get: |algorithm| ParameterValue::Number(algorithm.lambda),
    set: |algorithm, value| {
        algorithm.lambda = params::positive_number("lambda", value)?;
        Ok(())
    },
}];

impl CompressionAlgorithm {
    pub const DEFAULT_LAMBDA: f64 = 4.0;
    pub const REQUIRED: &'static [Capability] = &[Capability::Movable, Capability::NeighborAware];

    #[must_use]
    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }

    #[must_use]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Acceptance probability of moving `id` along `direction`; may exceed one.
    pub fn move_probability(
        &self,
        grid: &Grid,
        id: ParticleId,
        direction: Direction,
    ) -> Result<f64, GridError> {
        let current = grid.particle_neighbors(id, None)?.len() as i32;
        let future = future_neighbor_count(grid, id, direction)? as i32;
        Ok(self.lambda.powi(future - current))
    }

    /// Lattice moves must keep the system connected and hole-free; on the
    /// plane only the boundary is checked.
    pub fn is_move_valid(
        &self,
        grid: &Grid,
        id: ParticleId,
        direction: Direction,
    ) -> Result<bool, GridError> {
        if grid.topology().is_discrete() {
            rules::is_legal_move(grid, id, direction, false, true, None)
        } else {
            grid.is_direction_in_bounds(id, direction)
        }
    }
}

impl Algorithm for CompressionAlgorithm {
    fn name(&self) -> &'static str {
        "Compression"
    }

    fn required_capabilities(&self) -> &'static [Capability] {
        Self::REQUIRED
    }

    fn on_activation(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
        let direction = grid.uniform_random_direction();
        if !self.is_move_valid(grid, id, direction)? {
            return Ok(());
        }
        let probability = self.move_probability(grid, id, direction)?;
        if !accept(grid, probability) {
            return Ok(());
        }
        if let Err(error) = grid.move_in_direction(id, direction) {
            trace!(?id, %direction, %error, "compression move rejected by grid");
        }
        Ok(())
    }

    fn is_grid_valid(&self, grid: &Grid) -> bool {
        rules::check_particle_connection(grid) && rules::check_particle_holes(grid)
    }

    fn parameters(&self) -> Vec<ParameterEntry> {
        params::describe(self, PARAMETERS)
    }

    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<(), ParameterError> {
        params::assign(self, PARAMETERS, name, value)
    }
}
