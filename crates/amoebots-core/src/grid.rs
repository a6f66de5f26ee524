use crate::algorithms::{Algorithm, AlgorithmKind};
use crate::geometry::{Compass, Direction, Position, unsupported};
use crate::params::ParameterError;
use crate::particle::{Capability, ContinuousState, DirectedState, Particle, ParticleKind};
use crate::topology::{Topology, WrapLevels};
use crate::{AlgorithmKey, GridConfig, GridError, ParticleId, rules};
use amoebots_index::{BiMapStorage, ParticleStorage};
use rand::{Rng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{HashSet, VecDeque};
use std::f64::consts::TAU;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Predicate deciding which neighbors count; rejected particles read as empty.
pub type ParticleFilter<'a> = &'a dyn Fn(ParticleId, &Particle) -> bool;

/// Center-of-mass sample recorded after a move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Centroid of the largest connected component.
    pub x: f64,
    pub y: f64,
    /// Share of all particles inside that component.
    pub weight: f64,
}

/// One particle of an exported or imported configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub position: Position,
    pub kind: ParticleKind,
}

/// Serializable grid configuration without algorithms or counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub topology: Topology,
    pub particles: Vec<ParticleRecord>,
}

/// Space holding particles, their positions and the algorithms driving them.
pub struct Grid {
    topology: Topology,
    compass: Compass,
    particles: SlotMap<ParticleId, Particle>,
    storage: BiMapStorage<ParticleId, Position>,
    algorithms: SlotMap<AlgorithmKey, Arc<dyn Algorithm>>,
    levels: Option<WrapLevels>,
    rng: SmallRng,
    activations_run: u64,
    moves_made: u64,
    history: VecDeque<DataPoint>,
    history_capacity: usize,
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("topology", &self.topology)
            .field("particle_count", &self.particles.len())
            .field("algorithm_count", &self.algorithms.len())
            .field("activations_run", &self.activations_run)
            .field("moves_made", &self.moves_made)
            .finish()
    }
}

impl Grid {
    /// Instantiate a grid from the provided configuration.
    pub fn new(config: GridConfig) -> Result<Self, GridError> {
        config.validate()?;
        let rng = config.seeded_rng();
        Ok(Self::build(config.topology, config.history_capacity, rng))
    }

    /// Instantiate a grid drawing randomness from `rng`.
    pub fn with_rng(topology: Topology, rng: SmallRng) -> Result<Self, GridError> {
        topology.validate()?;
        Ok(Self::build(
            topology,
            GridConfig::default().history_capacity,
            rng,
        ))
    }

    fn build(topology: Topology, history_capacity: usize, rng: SmallRng) -> Self {
        Self {
            topology,
            compass: topology.compass(),
            particles: SlotMap::with_key(),
            storage: BiMapStorage::new(),
            algorithms: SlotMap::with_key(),
            levels: topology.wrap_extents().map(WrapLevels::new),
            rng,
            activations_run: 0,
            moves_made: 0,
            history: VecDeque::with_capacity(history_capacity.min(4096)),
            history_capacity,
        }
    }

    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    #[must_use]
    pub fn compass(&self) -> Compass {
        self.compass
    }

    /// Random source shared by the scheduler and every algorithm.
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    #[must_use]
    pub fn activations_run(&self) -> u64 {
        self.activations_run
    }

    #[must_use]
    pub fn moves_made(&self) -> u64 {
        self.moves_made
    }

    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Iterate live particles in stable slot order.
    pub fn particles(&self) -> impl Iterator<Item = (ParticleId, &Particle)> {
        self.particles.iter()
    }

    #[must_use]
    pub fn particle_ids(&self) -> Vec<ParticleId> {
        self.particles.keys().collect()
    }

    #[must_use]
    pub fn contains(&self, id: ParticleId) -> bool {
        self.particles.contains_key(id)
    }

    /// Immutable access to a particle.
    #[must_use]
    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(id)
    }

    /// Mutable access to a particle's per-kind state. Its variant and facing
    /// only change through the grid.
    pub fn particle_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.particles.get_mut(id)
    }

    #[must_use]
    pub fn position_of(&self, id: ParticleId) -> Option<Position> {
        self.storage.position_of(id)
    }

    fn require_position(&self, id: ParticleId) -> Result<Position, GridError> {
        self.storage.position_of(id).ok_or(GridError::NotOnGrid)
    }

    fn particle_radius(&self, id: ParticleId) -> f64 {
        self.particles.get(id).map_or(0.0, Particle::radius)
    }

    /// Whether `position` lies inside the topology, for `particle` if given.
    #[must_use]
    pub fn is_position_valid(&self, position: &Position, particle: Option<ParticleId>) -> bool {
        let radius = particle.map_or(0.0, |id| self.particle_radius(id));
        self.topology.is_position_valid(position, radius)
    }

    /// Neighbor cell of `position` along `direction`, wrapped where the topology wraps.
    #[must_use]
    pub fn position_in_direction(&self, position: &Position, direction: Direction) -> Position {
        self.topology.position_in_direction(position, direction)
    }

    /// Cells adjacent to `position`, in compass order.
    #[must_use]
    pub fn adjacent_positions(&self, position: &Position) -> Vec<Position> {
        if !self.topology.is_discrete() {
            unsupported("adjacent positions on the continuous plane");
        }
        self.compass
            .directions()
            .iter()
            .map(|&direction| self.position_in_direction(position, direction))
            .collect()
    }

    /// Particle at `position`; on the continuous plane, any particle whose body covers it.
    #[must_use]
    pub fn particle_at(&self, position: &Position) -> Option<ParticleId> {
        self.occupant(position, None)
    }

    #[must_use]
    pub fn is_occupied(&self, position: &Position) -> bool {
        self.particle_at(position).is_some()
    }

    fn occupant(&self, position: &Position, ignore: Option<ParticleId>) -> Option<ParticleId> {
        if let Some(id) = self.storage.particle_at(position)
            && Some(id) != ignore
        {
            return Some(id);
        }
        if self.topology.is_discrete() {
            return None;
        }
        self.particles
            .iter()
            .filter(|&(id, _)| Some(id) != ignore)
            .find_map(|(id, particle)| {
                let center = self.storage.position_of(id)?;
                (center.distance(position) < particle.radius()).then_some(id)
            })
    }

    /// Reject variants and facings the topology cannot host.
    fn check_kind(&self, kind: &ParticleKind) -> Result<(), GridError> {
        let discrete = self.topology.is_discrete();
        let problem = match kind {
            ParticleKind::Continuous(_) if discrete => Some("discs only live on the continuous plane"),
            ParticleKind::Oriented(_) if !discrete => Some("free headings need a lattice"),
            ParticleKind::Oriented(state) => {
                (!matches!(state.facing, Direction::Heading(_))).then_some("facing must be a heading")
            }
            ParticleKind::Directed(DirectedState { facing })
            | ParticleKind::Continuous(ContinuousState { facing, .. }) => {
                (!self.compass.contains(*facing)).then_some("facing is not part of the compass")
            }
            _ => None,
        };
        match problem {
            Some(reason) => Err(GridError::IncompatibleParticle {
                particle: kind.label(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Place `particle` at `position`, returning its handle.
    pub fn add_particle(
        &mut self,
        particle: impl Into<Particle>,
        position: Position,
    ) -> Result<ParticleId, GridError> {
        let mut particle = particle.into();
        self.check_kind(particle.kind())?;
        if !self.topology.is_position_valid(&position, particle.radius()) {
            return Err(GridError::OutOfBounds(position));
        }
        if self.is_occupied(&position) {
            return Err(GridError::OccupiedPosition(position));
        }
        particle.algorithm = None;
        let id = self.particles.insert(particle);
        if self.storage.insert(id, position).is_err() {
            self.particles.remove(id);
            return Err(GridError::OccupiedPosition(position));
        }
        if let Some(levels) = &mut self.levels {
            levels.insert(id);
        }
        Ok(id)
    }

    /// Take a particle off the grid, returning it without its algorithm.
    pub fn remove_particle(&mut self, id: ParticleId) -> Result<Particle, GridError> {
        self.storage.remove(id).ok_or(GridError::NotOnGrid)?;
        if let Some(levels) = &mut self.levels {
            levels.remove(id);
        }
        let mut particle = self.particles.remove(id).ok_or(GridError::NotOnGrid)?;
        particle.algorithm = None;
        Ok(particle)
    }

    /// Add every record, stopping at the first failure.
    pub fn import<I>(&mut self, records: I) -> Result<Vec<ParticleId>, GridError>
    where
        I: IntoIterator<Item = ParticleRecord>,
    {
        records
            .into_iter()
            .map(|record| self.add_particle(Particle::new(record.kind), record.position))
            .collect()
    }

    /// Export positions and attributes of every particle.
    #[must_use]
    pub fn snapshot(&self) -> GridSnapshot {
        let particles = self
            .particles
            .iter()
            .filter_map(|(id, particle)| {
                Some(ParticleRecord {
                    position: self.storage.position_of(id)?,
                    kind: *particle.kind(),
                })
            })
            .collect();
        GridSnapshot {
            topology: self.topology,
            particles,
        }
    }

    /// Rebuild a grid from `snapshot`.
    pub fn from_snapshot(snapshot: &GridSnapshot, rng_seed: Option<u64>) -> Result<Self, GridError> {
        let mut grid = Self::new(GridConfig {
            topology: snapshot.topology,
            rng_seed,
            ..GridConfig::default()
        })?;
        grid.import(snapshot.particles.iter().cloned())?;
        Ok(grid)
    }

    fn step_between(&self, from: &Position, to: &Position) -> Option<Direction> {
        if !self.topology.is_discrete() {
            return None;
        }
        self.compass
            .directions()
            .iter()
            .copied()
            .find(|&direction| self.position_in_direction(from, direction) == *to)
    }

    /// Relocate `id` to `position`.
    ///
    /// Wrapping topologies only accept moves to adjacent cells so seam
    /// crossings can be tracked.
    pub fn move_particle(&mut self, id: ParticleId, position: Position) -> Result<(), GridError> {
        let from = self.require_position(id)?;
        if !self.is_position_valid(&position, Some(id)) {
            return Err(GridError::OutOfBounds(position));
        }
        let ignore = (position != from).then_some(id);
        if self.occupant(&position, ignore).is_some() {
            return Err(GridError::OccupiedPosition(position));
        }
        let step = match self.levels {
            Some(_) => Some(
                self.step_between(&from, &position)
                    .ok_or(GridError::InvalidMove("jump move across a wrapping grid"))?,
            ),
            None => None,
        };
        self.storage
            .relocate(id, position)
            .map_err(|_| GridError::OccupiedPosition(position))?;
        self.moves_made += 1;
        if let (Some(levels), Some(step)) = (&mut self.levels, step)
            && levels.record_step(id, &from, step, &position)
        {
            trace!(?id, level = ?levels.level(id), "particle crossed a wrapping seam");
        }
        self.sample_center_of_mass();
        Ok(())
    }

    /// Move `id` one unit along `direction`.
    pub fn move_in_direction(&mut self, id: ParticleId, direction: Direction) -> Result<(), GridError> {
        let particle = self.particles.get(id).ok_or(GridError::NotOnGrid)?;
        if !particle.has(Capability::Movable) {
            return Err(GridError::InvalidMove("particle cannot move"));
        }
        let from = self.require_position(id)?;
        let target = self.position_in_direction(&from, direction);
        self.move_particle(id, target)
    }

    /// Move along `direction`, exchanging places with an occupant of the same kind.
    pub fn swap_in_direction(&mut self, id: ParticleId, direction: Direction) -> Result<(), GridError> {
        let from = self.require_position(id)?;
        let target = self.position_in_direction(&from, direction);
        let Some(other) = self.occupant(&target, Some(id)) else {
            return self.move_in_direction(id, direction);
        };
        let (Some(mover), Some(occupant)) = (self.particles.get(id), self.particles.get(other))
        else {
            return Err(GridError::NotOnGrid);
        };
        if !(mover.has(Capability::SwapMovable) && occupant.has(Capability::SwapMovable)) {
            return Err(GridError::InvalidMove("particle cannot swap"));
        }
        if !mover.same_kind(occupant) {
            return Err(GridError::InvalidMove("swap between different particle types"));
        }
        let occupant_from = self.require_position(other)?;

        self.storage.remove(other);
        self.storage
            .relocate(id, occupant_from)
            .map_err(|_| GridError::OccupiedPosition(occupant_from))?;
        self.storage
            .insert(other, from)
            .map_err(|_| GridError::OccupiedPosition(from))?;
        self.moves_made += 1;
        if let Some(levels) = &mut self.levels {
            levels.record_step(id, &from, direction, &occupant_from);
            levels.record_step(other, &occupant_from, self.compass.opposite(direction), &from);
        }
        self.sample_center_of_mass();
        Ok(())
    }

    /// Point a directional particle along `facing`.
    pub fn set_facing(&mut self, id: ParticleId, facing: Direction) -> Result<(), GridError> {
        let particle = self.particles.get(id).ok_or(GridError::NotOnGrid)?;
        let mut turned = particle.clone();
        turned
            .directional_mut()
            .ok_or(GridError::InvalidMove("particle has no facing"))?
            .set_facing(facing);
        self.check_kind(turned.kind())?;
        if let Some(directional) = self.particles.get_mut(id).and_then(Particle::directional_mut) {
            directional.set_facing(facing);
        }
        Ok(())
    }

    fn passes(&self, id: ParticleId, filter: Option<ParticleFilter<'_>>) -> bool {
        filter.is_none_or(|keep| self.particles.get(id).is_some_and(|p| keep(id, p)))
    }

    /// Particle next to `position` along `direction`, if it passes `filter`.
    #[must_use]
    pub fn neighbor_in_direction(
        &self,
        position: &Position,
        direction: Direction,
        filter: Option<ParticleFilter<'_>>,
    ) -> Option<ParticleId> {
        if !self.topology.is_discrete() {
            unsupported("direction neighbors on the continuous plane");
        }
        let target = self.position_in_direction(position, direction);
        let id = self.storage.particle_at(&target)?;
        self.passes(id, filter).then_some(id)
    }

    /// Neighbors of `position` in compass order.
    ///
    /// With `include_empty`, every direction yields a slot and empty or
    /// filtered-out neighbors read as `None`.
    #[must_use]
    pub fn neighbors(
        &self,
        position: &Position,
        include_empty: bool,
        filter: Option<ParticleFilter<'_>>,
    ) -> Vec<Option<ParticleId>> {
        self.compass
            .directions()
            .iter()
            .map(|&direction| self.neighbor_in_direction(position, direction, filter))
            .filter(|slot| include_empty || slot.is_some())
            .collect()
    }

    /// Particles whose centers lie closer than `distance` to `position`.
    #[must_use]
    pub fn neighbors_within(
        &self,
        position: &Position,
        distance: f64,
        filter: Option<ParticleFilter<'_>>,
    ) -> Vec<ParticleId> {
        self.particles
            .keys()
            .filter(|&id| {
                self.storage
                    .position_of(id)
                    .is_some_and(|center| center.distance(position) < distance)
                    && self.passes(id, filter)
            })
            .collect()
    }

    /// Neighbors of particle `id`, excluding itself.
    pub fn particle_neighbors(
        &self,
        id: ParticleId,
        filter: Option<ParticleFilter<'_>>,
    ) -> Result<Vec<ParticleId>, GridError> {
        let position = self.require_position(id)?;
        if self.topology.is_discrete() {
            return Ok(self
                .neighbors(&position, false, filter)
                .into_iter()
                .flatten()
                .collect());
        }
        let reach = self.topology.neighbor_distance(self.particle_radius(id));
        let mut found = self.neighbors_within(&position, reach, filter);
        found.retain(|&other| other != id);
        Ok(found)
    }

    /// Neighbors of the position one unit from `id` along `direction`.
    ///
    /// `id` itself is included when adjacent to that position and accepted by `filter`.
    pub fn adjacent_position_neighbors(
        &self,
        id: ParticleId,
        direction: Direction,
        filter: Option<ParticleFilter<'_>>,
    ) -> Result<Vec<ParticleId>, GridError> {
        let position = self.require_position(id)?;
        let target = self.position_in_direction(&position, direction);
        if self.topology.is_discrete() {
            return Ok(self
                .neighbors(&target, false, filter)
                .into_iter()
                .flatten()
                .collect());
        }
        let reach = self.topology.neighbor_distance(self.particle_radius(id));
        Ok(self.neighbors_within(&target, reach, filter))
    }

    /// Neighbor of `id` along `direction` rotated by `shift` compass steps.
    pub fn relative_neighbor(
        &self,
        id: ParticleId,
        direction: Direction,
        shift: i32,
        filter: Option<ParticleFilter<'_>>,
    ) -> Result<Option<ParticleId>, GridError> {
        let position = self.require_position(id)?;
        let direction = self.compass.shift(direction, shift);
        Ok(self.neighbor_in_direction(&position, direction, filter))
    }

    /// Neighbor of the cell one unit along `direction`, looking `shift` steps around.
    pub fn adjacent_position_relative_neighbor(
        &self,
        id: ParticleId,
        direction: Direction,
        shift: i32,
        filter: Option<ParticleFilter<'_>>,
    ) -> Result<Option<ParticleId>, GridError> {
        let position = self.require_position(id)?;
        let target = self.position_in_direction(&position, direction);
        let direction = self.compass.shift(direction, shift);
        Ok(self.neighbor_in_direction(&target, direction, filter))
    }

    /// Whether one unit along `direction` stays inside the topology for `id`.
    pub fn is_direction_in_bounds(&self, id: ParticleId, direction: Direction) -> Result<bool, GridError> {
        let position = self.require_position(id)?;
        let target = self.position_in_direction(&position, direction);
        Ok(self.is_position_valid(&target, Some(id)))
    }

    /// Uniformly random compass direction, or heading on the continuous plane.
    pub fn uniform_random_direction(&mut self) -> Direction {
        if self.topology.is_discrete() {
            let directions = self.compass.directions();
            directions[self.rng.random_range(0..directions.len())]
        } else {
            Direction::heading(self.rng.random_range(0.0..TAU))
        }
    }

    /// Wake `id` and let its algorithm act.
    pub fn activate(&mut self, id: ParticleId) -> Result<(), GridError> {
        let particle = self.particles.get(id).ok_or(GridError::NotOnGrid)?;
        let Some(key) = particle.algorithm else {
            return Ok(());
        };
        let algorithm = self
            .algorithms
            .get(key)
            .cloned()
            .ok_or(GridError::UnknownAlgorithm)?;
        algorithm.on_activation(self, id)
    }

    /// Activate `count` uniformly drawn particles.
    ///
    /// Candidates come from the particles present at the start; ones removed
    /// mid-run are discarded and redrawn.
    pub fn run_activations(&mut self, count: u64) -> Result<(), GridError> {
        let mut candidates = self.particle_ids();
        for _ in 0..count {
            let id = loop {
                if candidates.is_empty() {
                    return Ok(());
                }
                let index = self.rng.random_range(0..candidates.len());
                let id = candidates[index];
                if self.particles.contains_key(id) {
                    break id;
                }
                candidates.swap_remove(index);
            };
            self.activate(id)?;
            self.activations_run += 1;
        }
        Ok(())
    }

    /// Register an algorithm instance, returning its handle.
    pub fn register_algorithm<A: Algorithm + 'static>(&mut self, algorithm: A) -> AlgorithmKey {
        self.algorithms.insert(Arc::new(algorithm))
    }

    pub fn register_boxed_algorithm(&mut self, algorithm: Box<dyn Algorithm>) -> AlgorithmKey {
        self.algorithms.insert(Arc::from(algorithm))
    }

    /// Drop an algorithm and unassign it everywhere.
    pub fn unregister_algorithm(&mut self, key: AlgorithmKey) -> bool {
        if self.algorithms.remove(key).is_none() {
            return false;
        }
        for particle in self.particles.values_mut() {
            if particle.algorithm == Some(key) {
                particle.algorithm = None;
            }
        }
        true
    }

    #[must_use]
    pub fn algorithm(&self, key: AlgorithmKey) -> Option<&dyn Algorithm> {
        self.algorithms.get(key).map(|algorithm| algorithm.as_ref())
    }

    /// Mutable access for parameter changes between activations.
    pub fn algorithm_mut(&mut self, key: AlgorithmKey) -> Option<&mut (dyn Algorithm + 'static)> {
        self.algorithms.get_mut(key).and_then(Arc::get_mut)
    }

    /// Change one parameter of a registered algorithm.
    pub fn set_algorithm_parameter(
        &mut self,
        key: AlgorithmKey,
        name: &str,
        value: crate::ParameterValue,
    ) -> Result<(), ParameterError> {
        let Some(shared) = self.algorithms.get_mut(key) else {
            return Err(ParameterError::Unknown(format!("algorithm handle for `{name}`")));
        };
        Arc::get_mut(shared)
            .ok_or(ParameterError::Busy)?
            .set_parameter(name, value)
    }

    fn check_assignment(&self, key: AlgorithmKey, particle: &Particle) -> Result<(), GridError> {
        let algorithm = self.algorithms.get(key).ok_or(GridError::UnknownAlgorithm)?;
        if algorithm.is_particle_allowed(particle) {
            Ok(())
        } else {
            Err(GridError::IncompatibleAlgorithm {
                algorithm: algorithm.name(),
                particle: particle.kind().label(),
            })
        }
    }

    /// Assign `key` (or nothing) to one particle.
    pub fn assign_algorithm(
        &mut self,
        id: ParticleId,
        key: Option<AlgorithmKey>,
    ) -> Result<(), GridError> {
        let particle = self.particles.get(id).ok_or(GridError::NotOnGrid)?;
        if let Some(key) = key {
            self.check_assignment(key, particle)?;
        }
        if let Some(particle) = self.particles.get_mut(id) {
            particle.algorithm = key;
        }
        Ok(())
    }

    /// Assign `key` (or nothing) to every particle; nothing changes on failure.
    pub fn assign_all(&mut self, key: Option<AlgorithmKey>) -> Result<(), GridError> {
        if let Some(key) = key {
            for particle in self.particles.values() {
                self.check_assignment(key, particle)?;
            }
        }
        for particle in self.particles.values_mut() {
            particle.algorithm = key;
        }
        Ok(())
    }

    /// Registered algorithm kinds every particle on the grid supports.
    #[must_use]
    pub fn compatible_algorithms(&self) -> Vec<AlgorithmKind> {
        AlgorithmKind::ALL
            .into_iter()
            .filter(|kind| {
                self.particles
                    .values()
                    .all(|particle| kind.is_particle_allowed(particle))
            })
            .collect()
    }

    /// Distinct algorithms currently assigned to at least one particle.
    #[must_use]
    pub fn running_algorithms(&self) -> Vec<AlgorithmKey> {
        let assigned: HashSet<AlgorithmKey> = self
            .particles
            .values()
            .filter_map(Particle::algorithm)
            .collect();
        self.algorithms
            .keys()
            .filter(|key| assigned.contains(key))
            .collect()
    }

    /// Position of `id` with wraparound seam crossings undone.
    #[must_use]
    pub fn unwrapped_position(&self, id: ParticleId) -> Option<(f64, f64)> {
        let position = self.storage.position_of(id)?;
        Some(match &self.levels {
            Some(levels) => levels.unwrapped(id, &position),
            None => position.coords(),
        })
    }

    /// Seam crossings of `id` per axis; zero on non-wrapping topologies.
    #[must_use]
    pub fn wrap_level(&self, id: ParticleId) -> (i32, i32) {
        self.levels
            .as_ref()
            .map_or((0, 0), |levels| levels.level(id))
    }

    fn centroid(&self, ids: impl IntoIterator<Item = ParticleId>) -> Option<((f64, f64), usize)> {
        let (sum_x, sum_y, count) = ids
            .into_iter()
            .filter_map(|id| self.unwrapped_position(id))
            .fold((0.0, 0.0, 0_usize), |(sx, sy, n), (x, y)| (sx + x, sy + y, n + 1));
        (count > 0).then(|| ((sum_x / count as f64, sum_y / count as f64), count))
    }

    /// Mean unwrapped position of all particles.
    #[must_use]
    pub fn center_of_mass(&self) -> Option<(f64, f64)> {
        self.centroid(self.particles.keys()).map(|(center, _)| center)
    }

    /// Rolling center-of-mass samples, oldest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<DataPoint> {
        &self.history
    }

    fn sample_center_of_mass(&mut self) {
        if self.history_capacity == 0 {
            return;
        }
        let component = rules::largest_component(self);
        let Some(((x, y), size)) = self.centroid(component) else {
            return;
        };
        let weight = size as f64 / self.particles.len() as f64;
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(DataPoint { x, y, weight });
    }

    /// Ordered key/value summary followed by each running algorithm's diagnostics.
    #[must_use]
    pub fn grid_information(&self) -> Vec<(String, String)> {
        let center = self
            .center_of_mass()
            .map_or_else(|| "n/a".to_owned(), |(x, y)| format!("({x:.3}, {y:.3})"));
        let mut info = vec![
            ("Particle count".to_owned(), self.particles.len().to_string()),
            ("Activations run".to_owned(), self.activations_run.to_string()),
            ("Moves made".to_owned(), self.moves_made.to_string()),
            ("Center of mass".to_owned(), center),
        ];
        for key in self.running_algorithms() {
            if let Some(algorithm) = self.algorithms.get(key) {
                info.extend(algorithm.diagnostics(self));
            }
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::CompressionAlgorithm;
    use crate::geometry::{N, NE, NW, S, SE, SW};
    use crate::params::{ParameterEntry, ParameterValue};
    use rand::SeedableRng;

    fn hex_grid(radius: i32) -> Grid {
        Grid::new(GridConfig {
            topology: Topology::Hexagonal { radius },
            rng_seed: Some(42),
            history_capacity: 16,
        })
        .expect("grid")
    }

    /// Removes the particle it activates.
    #[derive(Debug)]
    struct Vanish;

    impl Algorithm for Vanish {
        fn name(&self) -> &'static str {
            "Vanish"
        }

        fn required_capabilities(&self) -> &'static [Capability] {
            &[]
        }

        fn on_activation(&self, grid: &mut Grid, id: ParticleId) -> Result<(), GridError> {
            grid.remove_particle(id).map(|_| ())
        }

        fn is_grid_valid(&self, _grid: &Grid) -> bool {
            true
        }

        fn parameters(&self) -> Vec<ParameterEntry> {
            Vec::new()
        }

        fn set_parameter(&mut self, name: &str, _value: ParameterValue) -> Result<(), ParameterError> {
            Err(ParameterError::Unknown(name.to_owned()))
        }
    }

    #[test]
    fn add_and_remove_enforce_occupancy_rules() {
        let mut grid = hex_grid(2);
        let id = grid.add_particle(Particle::basic(), Position::cell(0, 0)).expect("add");
        assert_eq!(
            grid.add_particle(Particle::basic(), Position::cell(0, 0)),
            Err(GridError::OccupiedPosition(Position::cell(0, 0)))
        );
        assert_eq!(
            grid.add_particle(Particle::basic(), Position::cell(3, 0)),
            Err(GridError::OutOfBounds(Position::cell(3, 0)))
        );
        assert_eq!(grid.particle_at(&Position::cell(0, 0)), Some(id));
        assert_eq!(grid.position_of(id), Some(Position::cell(0, 0)));

        let removed = grid.remove_particle(id).expect("remove");
        assert_eq!(removed.kind(), &ParticleKind::Basic);
        assert_eq!(grid.remove_particle(id), Err(GridError::NotOnGrid));
        assert!(!grid.is_occupied(&Position::cell(0, 0)));
        assert_eq!(grid.particle_count(), 0);
    }

    #[test]
    fn storage_stays_bijective_through_moves() {
        let mut grid = hex_grid(3);
        let a = grid.add_particle(Particle::basic(), Position::cell(0, 0)).expect("a");
        let b = grid.add_particle(Particle::basic(), Position::cell(1, 0)).expect("b");
        assert_eq!(
            grid.move_particle(a, Position::cell(1, 0)),
            Err(GridError::OccupiedPosition(Position::cell(1, 0)))
        );
        grid.move_in_direction(a, N).expect("move");
        grid.move_in_direction(b, SW).expect("move");
        for (id, _) in grid.particles() {
            let position = grid.position_of(id).expect("position");
            assert_eq!(grid.particle_at(&position), Some(id));
        }
        assert_eq!(grid.position_of(a), Some(Position::cell(0, -1)));
        assert_eq!(grid.position_of(b), Some(Position::cell(0, 1)));
        assert_eq!(grid.moves_made(), 2);
        assert_eq!(grid.history().len(), 2);
    }

    #[test]
    fn neighbors_follow_compass_order() {
        let mut grid = hex_grid(3);
        let center = grid.add_particle(Particle::basic(), Position::cell(0, 0)).expect("center");
        let north = grid.add_particle(Particle::separable(1), Position::cell(0, -1)).expect("n");
        let south_east = grid.add_particle(Particle::separable(2), Position::cell(1, 0)).expect("se");

        let slots = grid.neighbors(&Position::cell(0, 0), true, None);
        assert_eq!(slots, vec![Some(south_east), None, Some(north), None, None, None]);
        assert_eq!(grid.neighbors(&Position::cell(0, 0), false, None).len(), 2);

        let only_class_one = |_: ParticleId, p: &Particle| p.class_id() == Some(1);
        let filtered = grid.neighbors(&Position::cell(0, 0), true, Some(&only_class_one));
        assert_eq!(filtered, vec![None, None, Some(north), None, None, None]);

        assert_eq!(grid.relative_neighbor(center, SE, 2, None), Ok(Some(north)));
        let around_target = grid.adjacent_position_neighbors(center, NE, None).expect("adjacent");
        assert!(around_target.contains(&center));
        assert!(around_target.contains(&north));
        assert!(around_target.contains(&south_east));
        assert_eq!(
            grid.adjacent_position_relative_neighbor(center, NE, 1, None),
            Ok(None)
        );
        assert_eq!(
            grid.adjacent_position_relative_neighbor(center, NE, 2, None),
            Ok(Some(north))
        );
        assert_eq!(
            grid.adjacent_position_relative_neighbor(center, NE, 3, None),
            Ok(Some(center))
        );
    }

    #[test]
    fn swaps_require_matching_kinds() {
        let mut grid = hex_grid(3);
        let a = grid.add_particle(Particle::separable(0), Position::cell(0, 0)).expect("a");
        let b = grid.add_particle(Particle::separable(1), Position::cell(0, 1)).expect("b");
        let food = grid.add_particle(Particle::food(), Position::cell(-1, 0)).expect("food");

        grid.swap_in_direction(a, S).expect("swap");
        assert_eq!(grid.position_of(a), Some(Position::cell(0, 1)));
        assert_eq!(grid.position_of(b), Some(Position::cell(0, 0)));
        assert_eq!(grid.moves_made(), 1);

        assert_eq!(
            grid.swap_in_direction(b, NW),
            Err(GridError::InvalidMove("particle cannot swap"))
        );
        assert_eq!(
            grid.move_in_direction(food, SE),
            Err(GridError::InvalidMove("particle cannot move"))
        );
        grid.swap_in_direction(b, N).expect("plain move into empty cell");
        assert_eq!(grid.position_of(b), Some(Position::cell(0, -1)));
    }

    #[test]
    fn toroidal_moves_track_levels() {
        let mut grid = Grid::new(GridConfig {
            topology: Topology::Toroidal { half_side: 2 },
            rng_seed: Some(1),
            ..GridConfig::default()
        })
        .expect("grid");
        let id = grid.add_particle(Particle::basic(), Position::cell(2, 0)).expect("add");
        grid.move_in_direction(id, SE).expect("wrap move");
        assert_eq!(grid.position_of(id), Some(Position::cell(-2, 0)));
        assert_eq!(grid.wrap_level(id), (1, 0));
        assert_eq!(grid.unwrapped_position(id), Some((3.0, 0.0)));
        assert_eq!(grid.center_of_mass(), Some((3.0, 0.0)));
        assert_eq!(
            grid.move_particle(id, Position::cell(1, 1)),
            Err(GridError::InvalidMove("jump move across a wrapping grid"))
        );
        grid.move_in_direction(id, NW).expect("wrap back");
        assert_eq!(grid.wrap_level(id), (0, 0));
        assert!(grid.history().is_empty(), "sampling is opt-in");
    }

    #[test]
    fn activations_skip_particles_removed_mid_run() {
        let mut grid = hex_grid(3);
        for q in 0..3 {
            grid.add_particle(Particle::basic(), Position::cell(q, 0)).expect("add");
        }
        let key = grid.register_algorithm(Vanish);
        grid.assign_all(Some(key)).expect("assign");
        grid.run_activations(10).expect("run");
        assert_eq!(grid.particle_count(), 0);
        assert_eq!(grid.activations_run(), 3);
    }

    #[test]
    fn activation_of_missing_particle_propagates() {
        let mut grid = hex_grid(1);
        let id = grid.add_particle(Particle::basic(), Position::cell(0, 0)).expect("add");
        grid.remove_particle(id).expect("remove");
        assert_eq!(grid.activate(id), Err(GridError::NotOnGrid));
    }

    #[test]
    fn incompatible_assignment_is_rejected_atomically() {
        let mut grid = hex_grid(2);
        let basic = grid.add_particle(Particle::basic(), Position::cell(0, 0)).expect("basic");
        let food = grid.add_particle(Particle::food(), Position::cell(1, 0)).expect("food");
        let key = grid.register_algorithm(CompressionAlgorithm::default());
        assert!(matches!(
            grid.assign_all(Some(key)),
            Err(GridError::IncompatibleAlgorithm { algorithm: "Compression", particle: "food" })
        ));
        assert_eq!(grid.particle(basic).and_then(Particle::algorithm), None);
        grid.assign_algorithm(basic, Some(key)).expect("assign basic");
        assert_eq!(grid.running_algorithms(), vec![key]);
        assert!(!grid.compatible_algorithms().contains(&AlgorithmKind::Compression));
        grid.remove_particle(food).expect("remove food");
        assert!(grid.compatible_algorithms().contains(&AlgorithmKind::Compression));
        assert!(grid.unregister_algorithm(key));
        assert!(grid.running_algorithms().is_empty());
    }

    #[test]
    fn parameters_change_between_activations() {
        let mut grid = hex_grid(2);
        let key = grid.register_algorithm(CompressionAlgorithm::default());
        grid.set_algorithm_parameter(key, "lambda", ParameterValue::Number(2.5))
            .expect("set lambda");
        let entries = grid.algorithm(key).expect("registered").parameters();
        assert_eq!(entries[0].value, ParameterValue::Number(2.5));
        assert!(grid.algorithm_mut(key).is_some());
    }

    #[test]
    fn information_keeps_display_order() {
        let mut grid = hex_grid(2);
        grid.add_particle(Particle::basic(), Position::cell(0, 0)).expect("add");
        grid.add_particle(Particle::basic(), Position::cell(2, 0)).expect("add");
        let info = grid.grid_information();
        let keys: Vec<&str> = info.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["Particle count", "Activations run", "Moves made", "Center of mass"]);
        assert_eq!(info[0].1, "2");
        assert_eq!(info[3].1, "(1.000, 0.000)");
    }

    #[test]
    fn continuous_occupancy_uses_particle_bodies() {
        let mut grid = Grid::with_rng(
            Topology::Continuous { radius: 10.0 },
            SmallRng::seed_from_u64(5),
        )
        .expect("grid");
        let a = grid
            .add_particle(Particle::continuous(0.5, 0.0), Position::point(0.0, 0.0))
            .expect("a");
        assert_eq!(grid.particle_at(&Position::point(0.2, 0.2)), Some(a));
        assert_eq!(
            grid.add_particle(Particle::continuous(0.5, 0.0), Position::point(0.3, 0.0)),
            Err(GridError::OccupiedPosition(Position::point(0.3, 0.0)))
        );
        let b = grid
            .add_particle(Particle::continuous(0.5, 0.0), Position::point(1.0, 0.0))
            .expect("b");
        let far = grid
            .add_particle(Particle::continuous(0.5, 0.0), Position::point(5.0, 0.0))
            .expect("far");
        assert_eq!(grid.particle_neighbors(a, None), Ok(vec![b]));
        assert!(grid.particle_neighbors(far, None).expect("far").is_empty());
        grid.move_in_direction(a, Direction::heading(std::f64::consts::PI))
            .expect("move west");
        let (x, _) = grid.position_of(a).expect("a").coords();
        assert!((x + 1.0).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "unsupported operation")]
    fn continuous_grid_has_no_direction_neighbors() {
        let grid = Grid::with_rng(
            Topology::Continuous { radius: 5.0 },
            SmallRng::seed_from_u64(5),
        )
        .expect("grid");
        let _ = grid.neighbors(&Position::point(0.0, 0.0), true, None);
    }

    #[test]
    fn facings_must_fit_the_compass() {
        let mut line = Grid::new(GridConfig {
            topology: Topology::Linear { half_length: 5 },
            rng_seed: Some(4),
            history_capacity: 0,
        })
        .expect("line");
        assert!(matches!(
            line.add_particle(Particle::directed(SE), Position::cell(0, 0)),
            Err(GridError::IncompatibleParticle { particle: "directed", .. })
        ));
        let a = line.add_particle(Particle::directed(N), Position::cell(0, 0)).expect("a");
        line.add_particle(Particle::directed(S), Position::cell(0, 1)).expect("b");
        assert!(matches!(
            line.set_facing(a, SE),
            Err(GridError::IncompatibleParticle { .. })
        ));
        assert_eq!(line.particle(a).and_then(Particle::facing), Some(N));
        line.set_facing(a, S).expect("turn around");
        let key = line.register_algorithm(crate::algorithms::AlignmentAlgorithm::default());
        line.assign_all(Some(key)).expect("assign");
        line.run_activations(200).expect("aligned line runs");

        let mut hex = hex_grid(4);
        assert!(matches!(
            hex.add_particle(Particle::continuous(0.5, 0.3), Position::cell(0, 0)),
            Err(GridError::IncompatibleParticle { particle: "continuous", .. })
        ));
        assert!(matches!(
            hex.add_particle(Particle::directed(Direction::heading(0.3)), Position::cell(0, 0)),
            Err(GridError::IncompatibleParticle { particle: "directed", .. })
        ));
        let spinner = hex.add_particle(Particle::oriented(0.3), Position::cell(0, 0)).expect("oriented");
        assert!(hex.set_facing(spinner, N).is_err());
        hex.set_facing(spinner, Direction::heading(1.0)).expect("free heading");

        let mut plane = Grid::with_rng(Topology::Continuous { radius: 5.0 }, SmallRng::seed_from_u64(1))
            .expect("plane");
        assert!(plane.add_particle(Particle::oriented(0.3), Position::point(0.0, 0.0)).is_err());
        assert!(plane.add_particle(Particle::directed(N), Position::point(0.0, 0.0)).is_err());
        assert_eq!(plane.particle_count(), 0);

        let snapshot = GridSnapshot {
            topology: Topology::Linear { half_length: 3 },
            particles: vec![ParticleRecord {
                position: Position::cell(0, 0),
                kind: *Particle::directed(NE).kind(),
            }],
        };
        assert!(Grid::from_snapshot(&snapshot, Some(1)).is_err());
    }

    #[test]
    fn snapshots_round_trip_through_json() {
        let mut grid = hex_grid(3);
        grid.add_particle(Particle::separable(1), Position::cell(0, 0)).expect("add");
        grid.add_particle(Particle::directed(SE), Position::cell(1, 0)).expect("add");
        grid.add_particle(Particle::food(), Position::cell(-1, 1)).expect("add");
        let json = serde_json::to_string(&grid.snapshot()).expect("serialize");
        let snapshot: GridSnapshot = serde_json::from_str(&json).expect("deserialize");
        let restored = Grid::from_snapshot(&snapshot, Some(3)).expect("restore");
        assert_eq!(restored.particle_count(), 3);
        let id = restored.particle_at(&Position::cell(1, 0)).expect("directed");
        assert_eq!(restored.particle(id).and_then(Particle::facing), Some(SE));
    }
}
