//! Grid shapes: validity, enumeration, wrapping and display coordinates.

use crate::geometry::{Compass, Direction, Position, unsupported};
use crate::{GridError, ParticleId, ParticleMap};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Continuous neighbors sit closer than `(2 + NEIGHBOR_GAP) * radius`.
pub const NEIGHBOR_GAP: f64 = 0.5;

const CONTINUOUS_SAMPLE_ATTEMPTS: usize = 10_000;
const BOUNDARY_SEGMENTS: usize = 64;
const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Map `value` into `[-half, half]` on a ring of `2 * half + 1` cells.
#[must_use]
pub fn wrap(value: i32, half: i32) -> i32 {
    (value + half).rem_euclid(2 * half + 1) - half
}

/// Inverse of [`wrap`] for a particle that crossed the seam `level` times.
#[must_use]
pub fn unwrap(value: i32, half: i32, level: i32) -> i32 {
    value + level * (2 * half + 1)
}

/// Shape of the space particles live in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Topology {
    /// Hexagon of axial cells within `radius` of the origin.
    Hexagonal { radius: i32 },
    /// Square `|q|, |r| <= half_side`.
    Quadrilateral { half_side: i32 },
    /// Quadrilateral whose opposite edges are glued together.
    Toroidal { half_side: i32 },
    /// Column `q == 0, |r| <= half_length`.
    Linear { half_length: i32 },
    /// Linear column closed into a ring.
    Circular { half_length: i32 },
    /// Disc of `radius` on the continuous plane.
    Continuous { radius: f64 },
}

impl Default for Topology {
    fn default() -> Self {
        Self::Hexagonal { radius: 10 }
    }
}

impl Topology {
    /// Reject degenerate shapes.
    pub fn validate(&self) -> Result<(), GridError> {
        match *self {
            Self::Hexagonal { radius } if radius < 0 => Err(GridError::InvalidConfig(
                "hexagonal radius must be non-negative",
            )),
            Self::Quadrilateral { half_side } | Self::Toroidal { half_side } if half_side <= 0 => {
                Err(GridError::InvalidConfig("half side length must be positive"))
            }
            Self::Linear { half_length } | Self::Circular { half_length } if half_length <= 0 => {
                Err(GridError::InvalidConfig("half length must be positive"))
            }
            Self::Continuous { radius } if !(radius.is_finite() && radius > 0.0) => Err(
                GridError::InvalidConfig("continuous boundary radius must be positive"),
            ),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn compass(&self) -> Compass {
        match self {
            Self::Hexagonal { .. } | Self::Quadrilateral { .. } | Self::Toroidal { .. } => {
                Compass::Hexagonal
            }
            Self::Linear { .. } | Self::Circular { .. } => Compass::Linear,
            Self::Continuous { .. } => Compass::Continuous,
        }
    }

    #[must_use]
    pub fn is_discrete(&self) -> bool {
        !matches!(self, Self::Continuous { .. })
    }

    /// Per-axis half extents of wrapping shapes.
    #[must_use]
    pub fn wrap_extents(&self) -> Option<(i32, i32)> {
        match *self {
            Self::Toroidal { half_side } => Some((half_side, half_side)),
            Self::Circular { half_length } => Some((1, half_length)),
            _ => None,
        }
    }

    /// Whether a particle of `particle_radius` may sit at `position`.
    #[must_use]
    pub fn is_position_valid(&self, position: &Position, particle_radius: f64) -> bool {
        match (*self, *position) {
            (Self::Hexagonal { radius }, Position::Cell { q, r }) => {
                (q.abs() + (q + r).abs() + r.abs()) / 2 <= radius
            }
            (
                Self::Quadrilateral { half_side } | Self::Toroidal { half_side },
                Position::Cell { q, r },
            ) => q.abs() <= half_side && r.abs() <= half_side,
            (
                Self::Linear { half_length } | Self::Circular { half_length },
                Position::Cell { q, r },
            ) => q == 0 && r.abs() <= half_length,
            (Self::Continuous { radius }, Position::Point { x, y }) => {
                let reach = radius - particle_radius;
                reach > 0.0 && x.0 * x.0 + y.0 * y.0 < reach * reach
            }
            _ => false,
        }
    }

    /// Neighbor of `position` one unit along `direction`, wrapped where the shape wraps.
    #[must_use]
    pub fn position_in_direction(&self, position: &Position, direction: Direction) -> Position {
        let moved = position.offset(direction);
        match (self.wrap_extents(), moved) {
            (Some((half_q, half_r)), Position::Cell { q, r }) => {
                Position::cell(wrap(q, half_q), wrap(r, half_r))
            }
            _ => moved,
        }
    }

    /// Every valid lattice cell; empty on the continuous plane.
    #[must_use]
    pub fn valid_positions(&self) -> Vec<Position> {
        match *self {
            Self::Hexagonal { radius } => {
                let mut cells = Vec::new();
                for q in -radius..=radius {
                    let low = (-radius).max(-q - radius);
                    let high = radius.min(-q + radius);
                    cells.extend((low..=high).map(|r| Position::cell(q, r)));
                }
                cells
            }
            Self::Quadrilateral { half_side } | Self::Toroidal { half_side } => (-half_side
                ..=half_side)
                .flat_map(|q| (-half_side..=half_side).map(move |r| Position::cell(q, r)))
                .collect(),
            Self::Linear { half_length } | Self::Circular { half_length } => (-half_length
                ..=half_length)
                .map(|r| Position::cell(0, r))
                .collect(),
            Self::Continuous { .. } => Vec::new(),
        }
    }

    /// Uniformly random valid position for a particle of `particle_radius`.
    ///
    /// Continuous shapes sample the bounding square and give up after a bounded
    /// number of rejections.
    pub fn random_position<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        particle_radius: f64,
    ) -> Option<Position> {
        match *self {
            Self::Hexagonal { radius } => loop {
                let candidate = Position::cell(
                    rng.random_range(-radius..=radius),
                    rng.random_range(-radius..=radius),
                );
                if self.is_position_valid(&candidate, particle_radius) {
                    return Some(candidate);
                }
            },
            Self::Quadrilateral { half_side } | Self::Toroidal { half_side } => {
                Some(Position::cell(
                    rng.random_range(-half_side..=half_side),
                    rng.random_range(-half_side..=half_side),
                ))
            }
            Self::Linear { half_length } | Self::Circular { half_length } => {
                Some(Position::cell(0, rng.random_range(-half_length..=half_length)))
            }
            Self::Continuous { radius } => (0..CONTINUOUS_SAMPLE_ATTEMPTS)
                .map(|_| {
                    Position::point(
                        rng.random_range(-radius..=radius),
                        rng.random_range(-radius..=radius),
                    )
                })
                .find(|candidate| self.is_position_valid(candidate, particle_radius)),
        }
    }

    /// Outline of the shape in grid coordinates, one vertex per corner.
    #[must_use]
    pub fn boundary_vertices(&self) -> Vec<(f64, f64)> {
        match *self {
            Self::Hexagonal { radius } => {
                let d = f64::from(radius + 1);
                vec![(0.0, -d), (d, -d), (d, 0.0), (0.0, d), (-d, d), (-d, 0.0)]
            }
            Self::Quadrilateral { half_side } | Self::Toroidal { half_side } => {
                let d = f64::from(half_side + 1);
                vec![(-d, -d), (d, -d), (d, d), (-d, d)]
            }
            Self::Linear { half_length } | Self::Circular { half_length } => {
                let d = f64::from(half_length + 1);
                vec![(0.0, -d), (0.0, d)]
            }
            Self::Continuous { radius } => (0..BOUNDARY_SEGMENTS)
                .map(|i| {
                    let angle = TAU * i as f64 / BOUNDARY_SEGMENTS as f64;
                    (radius * angle.cos(), -radius * angle.sin())
                })
                .collect(),
        }
    }

    /// Display coordinates with unit spacing between adjacent particles.
    #[must_use]
    pub fn unit_pixel_coordinates(&self, position: &Position) -> (f64, f64) {
        match (*self, *position) {
            (Self::Circular { half_length }, Position::Cell { r, .. }) => {
                let cells = f64::from(2 * half_length + 1);
                let ring_radius = cells / TAU;
                let angle = TAU * f64::from(r + half_length) / cells - PI / 2.0;
                (ring_radius * angle.cos(), ring_radius * angle.sin())
            }
            (_, Position::Cell { q, r }) => {
                let (q, r) = (f64::from(q), f64::from(r));
                (1.5 * q, SQRT_3 / 2.0 * q + SQRT_3 * r)
            }
            (_, Position::Point { x, y }) => (x.0, y.0),
        }
    }

    /// Center distance under which two continuous particles count as neighbors.
    #[must_use]
    pub fn neighbor_distance(&self, particle_radius: f64) -> f64 {
        if self.is_discrete() {
            unsupported("distance neighborhoods on a lattice");
        }
        (2.0 + NEIGHBOR_GAP) * particle_radius
    }
}

/// How many times each particle crossed each wrapping seam.
#[derive(Debug, Clone)]
pub(crate) struct WrapLevels {
    extents: (i32, i32),
    levels: ParticleMap<(i32, i32)>,
}

impl WrapLevels {
    pub(crate) fn new(extents: (i32, i32)) -> Self {
        Self {
            extents,
            levels: ParticleMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: ParticleId) {
        self.levels.insert(id, (0, 0));
    }

    pub(crate) fn remove(&mut self, id: ParticleId) {
        self.levels.remove(id);
    }

    pub(crate) fn level(&self, id: ParticleId) -> (i32, i32) {
        self.levels.get(id).copied().unwrap_or_default()
    }

    /// Update levels after `id` stepped from `from` along `step` and landed on `to`.
    pub(crate) fn record_step(
        &mut self,
        id: ParticleId,
        from: &Position,
        step: Direction,
        to: &Position,
    ) -> bool {
        let (Some(expected), Some(actual)) = (from.offset(step).as_cell(), to.as_cell()) else {
            return false;
        };
        let Some(level) = self.levels.get_mut(id) else {
            return false;
        };
        let adjust = |expected: i32, actual: i32| match actual.cmp(&expected) {
            std::cmp::Ordering::Greater => -1,
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Equal => 0,
        };
        let dq = adjust(expected.0, actual.0);
        let dr = adjust(expected.1, actual.1);
        level.0 += dq;
        level.1 += dr;
        dq != 0 || dr != 0
    }

    /// Position of `id` with every seam crossing undone.
    pub(crate) fn unwrapped(&self, id: ParticleId, position: &Position) -> (f64, f64) {
        match position.as_cell() {
            Some((q, r)) => {
                let (lq, lr) = self.level(id);
                (
                    f64::from(unwrap(q, self.extents.0, lq)),
                    f64::from(unwrap(r, self.extents.1, lr)),
                )
            }
            None => position.coords(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{N, S, SE};
    use rand::{SeedableRng, rngs::SmallRng};
    use slotmap::SlotMap;

    #[test]
    fn wrap_matches_reference_values() {
        assert_eq!(wrap(6, 5), -5);
        assert_eq!(wrap(-12, 5), -1);
        assert_eq!(wrap(-18, 5), 4);
        for value in [0, 2, -2, 5, -5] {
            assert_eq!(wrap(value, 5), value);
        }
    }

    #[test]
    fn unwrap_inverts_wrap() {
        for value in -40..40 {
            let wrapped = wrap(value, 5);
            let level = (value - wrapped) / 11;
            assert_eq!(unwrap(wrapped, 5, level), value);
        }
    }

    #[test]
    fn hexagonal_enumeration_matches_validity() {
        let topology = Topology::Hexagonal { radius: 3 };
        let cells = topology.valid_positions();
        assert_eq!(cells.len(), 37);
        assert!(cells.iter().all(|cell| topology.is_position_valid(cell, 0.0)));
        assert!(!topology.is_position_valid(&Position::cell(3, 1), 0.0));
        assert!(topology.is_position_valid(&Position::cell(3, -3), 0.0));
    }

    #[test]
    fn shape_validation_rejects_degenerate_sizes() {
        assert!(Topology::Hexagonal { radius: 0 }.validate().is_ok());
        assert!(Topology::Quadrilateral { half_side: 0 }.validate().is_err());
        assert!(Topology::Circular { half_length: -1 }.validate().is_err());
        assert!(Topology::Continuous { radius: f64::NAN }.validate().is_err());
    }

    #[test]
    fn toroidal_neighbors_wrap_around() {
        let topology = Topology::Toroidal { half_side: 5 };
        assert_eq!(
            topology.position_in_direction(&Position::cell(5, 0), SE),
            Position::cell(-5, 0)
        );
        assert_eq!(
            topology.position_in_direction(&Position::cell(0, -5), N),
            Position::cell(0, 5)
        );
        let circular = Topology::Circular { half_length: 4 };
        assert_eq!(
            circular.position_in_direction(&Position::cell(0, 4), S),
            Position::cell(0, -4)
        );
    }

    #[test]
    fn continuous_validity_accounts_for_particle_radius() {
        let topology = Topology::Continuous { radius: 10.0 };
        assert!(topology.is_position_valid(&Position::point(9.0, 0.0), 0.5));
        assert!(!topology.is_position_valid(&Position::point(9.6, 0.0), 0.5));
        assert!(!topology.is_position_valid(&Position::cell(0, 0), 0.5));
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            let position = topology.random_position(&mut rng, 0.5).expect("position");
            assert!(topology.is_position_valid(&position, 0.5));
        }
    }

    #[test]
    fn random_cells_are_valid() {
        let mut rng = SmallRng::seed_from_u64(11);
        for topology in [
            Topology::Hexagonal { radius: 4 },
            Topology::Quadrilateral { half_side: 3 },
            Topology::Circular { half_length: 6 },
        ] {
            for _ in 0..200 {
                let position = topology.random_position(&mut rng, 0.0).expect("position");
                assert!(topology.is_position_valid(&position, 0.0));
            }
        }
    }

    #[test]
    fn levels_track_seam_crossings() {
        let mut ids = SlotMap::<ParticleId, ()>::with_key();
        let id = ids.insert(());
        let topology = Topology::Toroidal { half_side: 5 };
        let mut levels = WrapLevels::new((5, 5));
        levels.insert(id);

        let from = Position::cell(5, 2);
        let to = topology.position_in_direction(&from, SE);
        assert!(levels.record_step(id, &from, SE, &to));
        assert_eq!(levels.level(id), (1, 0));
        assert_eq!(levels.unwrapped(id, &to), (6.0, 2.0));

        let back = topology.position_in_direction(&to, crate::geometry::NW);
        assert!(levels.record_step(id, &to, crate::geometry::NW, &back));
        assert_eq!(levels.level(id), (0, 0));
        assert!(!levels.record_step(id, &Position::cell(0, 0), SE, &Position::cell(1, 0)));
    }
}
