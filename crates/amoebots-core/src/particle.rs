//! Particle variants, their capabilities and mutable per-kind state.

use crate::AlgorithmKey;
use crate::geometry::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Abilities an algorithm may require of the particles it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Can translate to an adjacent position.
    Movable,
    /// Can exchange positions with a neighbor of the same kind.
    SwapMovable,
    /// Can sense its neighborhood.
    NeighborAware,
    /// Carries a facing direction drawn from its compass.
    Directional,
    /// Carries a free heading while stepping on a lattice.
    Spinning,
    /// Carries a color class.
    ClassTagged,
    /// Takes part in food exchange.
    FoodAware,
}

/// Read/write access to a facing direction.
pub trait Directional {
    fn facing(&self) -> Direction;
    fn set_facing(&mut self, facing: Direction);
}

/// Read access to a color class.
pub trait ClassTagged {
    fn class_id(&self) -> u8;
}

/// Lattice particle with a facing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectedState {
    pub facing: Direction,
}

impl Directional for DirectedState {
    fn facing(&self) -> Direction {
        self.facing
    }

    fn set_facing(&mut self, facing: Direction) {
        self.facing = facing;
    }
}

/// Lattice particle with a color class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparableState {
    pub class_id: u8,
}

impl ClassTagged for SeparableState {
    fn class_id(&self) -> u8 {
        self.class_id
    }
}

/// Disc on the continuous plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContinuousState {
    pub radius: f64,
    pub facing: Direction,
}

impl Directional for ContinuousState {
    fn facing(&self) -> Direction {
        self.facing
    }

    fn set_facing(&mut self, facing: Direction) {
        self.facing = facing;
    }
}

/// Lattice particle with a free heading in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedState {
    pub facing: Direction,
}

impl Directional for OrientedState {
    fn facing(&self) -> Direction {
        self.facing
    }

    fn set_facing(&mut self, facing: Direction) {
        self.facing = facing;
    }
}

/// Hunger bookkeeping of a foraging particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForagingState {
    pub max_fed_activations: u32,
    pub fed_activations: u32,
    pub times_fed: u32,
    pub last_fed_activations_ago: u32,
    pub longest_last_fed_activations_ago: u32,
    /// Remaining hops of a token waiting to be passed on.
    pub food_token: Option<u32>,
}

impl ForagingState {
    #[must_use]
    pub fn is_fed(&self) -> bool {
        self.fed_activations > 0
    }

    #[must_use]
    pub fn has_food_token(&self) -> bool {
        self.food_token.is_some()
    }

    /// Receive a token carrying `lifetime` hops and become fed for `fed_activations`.
    pub fn give_food_token(&mut self, lifetime: u32, fed_activations: u32) {
        self.food_token = Some(lifetime);
        self.max_fed_activations = fed_activations;
        self.fed_activations = fed_activations;
        self.last_fed_activations_ago = 0;
        self.times_fed += 1;
    }

    /// Clear and return the held token.
    pub fn take_food_token(&mut self) -> Option<u32> {
        self.food_token.take()
    }

    /// Age the hunger counters by one activation.
    pub fn age(&mut self) {
        self.last_fed_activations_ago = self.last_fed_activations_ago.saturating_add(1);
        self.longest_last_fed_activations_ago = self
            .longest_last_fed_activations_ago
            .max(self.last_fed_activations_ago);
        self.fed_activations = self.fed_activations.saturating_sub(1);
    }

    /// Fraction of the last feeding still left, in `[0, 1]`.
    #[must_use]
    pub fn satiation(&self) -> f64 {
        if self.max_fed_activations == 0 {
            0.0
        } else {
            f64::from(self.fed_activations) / f64::from(self.max_fed_activations)
        }
    }
}

/// Immobile food source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FoodState {
    /// Activations left; `None` until the first activation sets it.
    pub remaining_activations: Option<u32>,
}

/// Variant-specific attributes of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParticleKind {
    Basic,
    Directed(DirectedState),
    Oriented(OrientedState),
    Separable(SeparableState),
    Foraging(ForagingState),
    Food(FoodState),
    Continuous(ContinuousState),
}

const BASIC_CAPABILITIES: &[Capability] = &[
    Capability::Movable,
    Capability::SwapMovable,
    Capability::NeighborAware,
];
const DIRECTED_CAPABILITIES: &[Capability] = &[
    Capability::Movable,
    Capability::SwapMovable,
    Capability::NeighborAware,
    Capability::Directional,
];
const ORIENTED_CAPABILITIES: &[Capability] = &[
    Capability::Movable,
    Capability::SwapMovable,
    Capability::NeighborAware,
    Capability::Spinning,
];
const SEPARABLE_CAPABILITIES: &[Capability] = &[
    Capability::Movable,
    Capability::SwapMovable,
    Capability::NeighborAware,
    Capability::ClassTagged,
];
const FORAGING_CAPABILITIES: &[Capability] = &[
    Capability::Movable,
    Capability::SwapMovable,
    Capability::NeighborAware,
    Capability::FoodAware,
];
const FOOD_CAPABILITIES: &[Capability] = &[Capability::NeighborAware, Capability::FoodAware];
const CONTINUOUS_CAPABILITIES: &[Capability] = &[
    Capability::Movable,
    Capability::NeighborAware,
    Capability::Directional,
];

impl ParticleKind {
    #[must_use]
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Basic => BASIC_CAPABILITIES,
            Self::Directed(_) => DIRECTED_CAPABILITIES,
            Self::Oriented(_) => ORIENTED_CAPABILITIES,
            Self::Separable(_) => SEPARABLE_CAPABILITIES,
            Self::Foraging(_) => FORAGING_CAPABILITIES,
            Self::Food(_) => FOOD_CAPABILITIES,
            Self::Continuous(_) => CONTINUOUS_CAPABILITIES,
        }
    }

    /// Short lowercase label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Directed(_) => "directed",
            Self::Oriented(_) => "oriented",
            Self::Separable(_) => "separable",
            Self::Foraging(_) => "foraging",
            Self::Food(_) => "food",
            Self::Continuous(_) => "continuous",
        }
    }
}

/// A particle owned by a grid.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    kind: ParticleKind,
    #[serde(skip)]
    pub(crate) algorithm: Option<AlgorithmKey>,
}

impl fmt::Debug for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("kind", &self.kind)
            .field("has_algorithm", &self.algorithm.is_some())
            .finish()
    }
}

impl From<ParticleKind> for Particle {
    fn from(kind: ParticleKind) -> Self {
        Self::new(kind)
    }
}

impl Particle {
    #[must_use]
    pub fn new(kind: ParticleKind) -> Self {
        Self {
            kind,
            algorithm: None,
        }
    }

    #[must_use]
    pub fn basic() -> Self {
        Self::new(ParticleKind::Basic)
    }

    #[must_use]
    pub fn directed(facing: Direction) -> Self {
        Self::new(ParticleKind::Directed(DirectedState { facing }))
    }

    /// Lattice particle facing `heading_radians`.
    #[must_use]
    pub fn oriented(heading_radians: f64) -> Self {
        Self::new(ParticleKind::Oriented(OrientedState {
            facing: Direction::heading(heading_radians),
        }))
    }

    #[must_use]
    pub fn separable(class_id: u8) -> Self {
        Self::new(ParticleKind::Separable(SeparableState { class_id }))
    }

    #[must_use]
    pub fn foraging() -> Self {
        Self::new(ParticleKind::Foraging(ForagingState::default()))
    }

    #[must_use]
    pub fn food() -> Self {
        Self::new(ParticleKind::Food(FoodState::default()))
    }

    #[must_use]
    pub fn continuous(radius: f64, heading_radians: f64) -> Self {
        Self::new(ParticleKind::Continuous(ContinuousState {
            radius,
            facing: Direction::heading(heading_radians),
        }))
    }

    /// Immutable access to the variant attributes.
    #[must_use]
    pub fn kind(&self) -> &ParticleKind {
        &self.kind
    }

    /// Handle of the assigned algorithm.
    #[must_use]
    pub fn algorithm(&self) -> Option<AlgorithmKey> {
        self.algorithm
    }

    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.kind.capabilities().contains(&capability)
    }

    /// Whether both particles are the same variant.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
    }

    /// Body radius; lattice particles are points.
    #[must_use]
    pub fn radius(&self) -> f64 {
        match self.kind {
            ParticleKind::Continuous(state) => state.radius,
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn directional(&self) -> Option<&dyn Directional> {
        match &self.kind {
            ParticleKind::Directed(state) => Some(state),
            ParticleKind::Oriented(state) => Some(state),
            ParticleKind::Continuous(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn directional_mut(&mut self) -> Option<&mut dyn Directional> {
        match &mut self.kind {
            ParticleKind::Directed(state) => Some(state),
            ParticleKind::Oriented(state) => Some(state),
            ParticleKind::Continuous(state) => Some(state),
            _ => None,
        }
    }

    /// Facing direction of directional particles.
    #[must_use]
    pub fn facing(&self) -> Option<Direction> {
        self.directional().map(Directional::facing)
    }

    #[must_use]
    pub fn class_tag(&self) -> Option<&dyn ClassTagged> {
        match &self.kind {
            ParticleKind::Separable(state) => Some(state),
            _ => None,
        }
    }

    /// Color class of separable particles.
    #[must_use]
    pub fn class_id(&self) -> Option<u8> {
        self.class_tag().map(ClassTagged::class_id)
    }

    #[must_use]
    pub fn foraging_state(&self) -> Option<&ForagingState> {
        match &self.kind {
            ParticleKind::Foraging(state) => Some(state),
            _ => None,
        }
    }

    pub fn foraging_mut(&mut self) -> Option<&mut ForagingState> {
        match &mut self.kind {
            ParticleKind::Foraging(state) => Some(state),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_foraging(&self) -> bool {
        matches!(self.kind, ParticleKind::Foraging(_))
    }

    #[must_use]
    pub fn is_food(&self) -> bool {
        matches!(self.kind, ParticleKind::Food(_))
    }

    pub(crate) fn food_mut(&mut self) -> Option<&mut FoodState> {
        match &mut self.kind {
            ParticleKind::Food(state) => Some(state),
            _ => None,
        }
    }
}
