//! Directions, compasses and positions shared by every topology.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_3, PI, TAU};
use std::fmt;

/// Panics for operations a continuous plane cannot answer.
#[track_caller]
pub(crate) fn unsupported(operation: &str) -> ! {
    panic!("unsupported operation: {operation}")
}

/// Wrap an angle into `[-π, π)`.
#[must_use]
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    (angle + PI).rem_euclid(TAU) - PI
}

/// Movement vector between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// One lattice step.
    Step { dq: i32, dr: i32 },
    /// Unit heading in radians, counter-clockwise from +x, kept in `[-π, π)`.
    Heading(OrderedFloat<f64>),
}

pub const SE: Direction = Direction::Step { dq: 1, dr: 0 };
pub const NE: Direction = Direction::Step { dq: 1, dr: -1 };
pub const N: Direction = Direction::Step { dq: 0, dr: -1 };
pub const NW: Direction = Direction::Step { dq: -1, dr: 0 };
pub const SW: Direction = Direction::Step { dq: -1, dr: 1 };
pub const S: Direction = Direction::Step { dq: 0, dr: 1 };

const HEXAGONAL_DIRECTIONS: [Direction; 6] = [SE, NE, N, NW, SW, S];
const LINEAR_DIRECTIONS: [Direction; 2] = [N, S];

impl Direction {
    /// Heading direction for `radians`.
    #[must_use]
    pub fn heading(radians: f64) -> Self {
        Self::Heading(OrderedFloat(normalize_angle(radians)))
    }

    /// Angle of a heading; lattice steps report `None`.
    #[must_use]
    pub fn angle(&self) -> Option<f64> {
        match self {
            Self::Heading(angle) => Some(angle.0),
            Self::Step { .. } => None,
        }
    }

    /// Displacement in grid coordinates. Headings point along `(cos θ, -sin θ)`.
    #[must_use]
    pub fn vector(&self) -> (f64, f64) {
        match *self {
            Self::Step { dq, dr } => (f64::from(dq), f64::from(dr)),
            Self::Heading(angle) => (angle.0.cos(), -angle.0.sin()),
        }
    }

    /// Unit vector as drawn on screen, y pointing down. Lattice steps use
    /// their axial pixel offset.
    #[must_use]
    pub fn drawn_vector(&self) -> (f64, f64) {
        match *self {
            Self::Heading(_) => self.vector(),
            Self::Step { dq, dr } => {
                let x = 1.5 * f64::from(dq);
                let y = 3_f64.sqrt() * (f64::from(dq) / 2.0 + f64::from(dr));
                let length = x.hypot(y);
                if length == 0.0 { (0.0, 0.0) } else { (x / length, y / length) }
            }
        }
    }

    /// Angle of [`Direction::drawn_vector`], counter-clockwise from +x.
    #[must_use]
    pub fn drawn_angle(&self) -> f64 {
        match *self {
            Self::Heading(angle) => angle.0,
            Self::Step { .. } => {
                let (x, y) = self.drawn_vector();
                normalize_angle((-y).atan2(x))
            }
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Step { dq, dr } => {
                let name = match (dq, dr) {
                    (1, 0) => "SE",
                    (1, -1) => "NE",
                    (0, -1) => "N",
                    (-1, 0) => "NW",
                    (-1, 1) => "SW",
                    (0, 1) => "S",
                    _ => return write!(f, "step({dq}, {dr})"),
                };
                f.write_str(name)
            }
            Self::Heading(angle) => write!(f, "{:.3} rad", angle.0),
        }
    }
}

/// Direction system of a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compass {
    /// Six axial directions, counter-clockwise from SE.
    Hexagonal,
    /// North and south only.
    Linear,
    /// Any heading; there is no finite direction set.
    Continuous,
}

impl Compass {
    /// Ordered direction set.
    ///
    /// # Panics
    /// On the continuous compass.
    #[must_use]
    pub fn directions(&self) -> &'static [Direction] {
        match self {
            Self::Hexagonal => &HEXAGONAL_DIRECTIONS,
            Self::Linear => &LINEAR_DIRECTIONS,
            Self::Continuous => unsupported("enumerating continuous directions"),
        }
    }

    #[must_use]
    pub fn is_discrete(&self) -> bool {
        !matches!(self, Self::Continuous)
    }

    /// Index of `direction` in the ordered set.
    #[must_use]
    pub fn index_of(&self, direction: Direction) -> Option<usize> {
        self.directions().iter().position(|&d| d == direction)
    }

    /// Whether particles on this compass may face `direction`.
    #[must_use]
    pub fn contains(&self, direction: Direction) -> bool {
        match self {
            Self::Continuous => matches!(direction, Direction::Heading(_)),
            _ => self.index_of(direction).is_some(),
        }
    }

    /// Unsigned angle between two facings, in `[0, π]`.
    ///
    /// Compass members are measured with [`Compass::angle_between`]; headings
    /// on a lattice fall back to their drawn angles.
    #[must_use]
    pub fn facing_angle(&self, from: Direction, to: Direction) -> f64 {
        if self.contains(from) && self.contains(to) {
            return self.angle_between(from, to).abs();
        }
        normalize_angle(to.drawn_angle() - from.drawn_angle()).abs()
    }

    fn require_index(&self, direction: Direction) -> usize {
        match self.index_of(direction) {
            Some(index) => index,
            None => panic!("{direction} is not part of the {self:?} compass"),
        }
    }

    /// Rotate `direction` by `steps` compass positions.
    ///
    /// # Panics
    /// On the continuous compass (use [`Compass::turn`]) or for a foreign direction.
    #[must_use]
    pub fn shift(&self, direction: Direction, steps: i32) -> Direction {
        let directions = self.directions();
        let len = directions.len() as i64;
        let index = self.require_index(direction) as i64;
        directions[(index + i64::from(steps)).rem_euclid(len) as usize]
    }

    /// Rotate a heading by `radians`.
    ///
    /// # Panics
    /// On discrete compasses.
    #[must_use]
    pub fn turn(&self, direction: Direction, radians: f64) -> Direction {
        match (self, direction.angle()) {
            (Self::Continuous, Some(angle)) => Direction::heading(angle + radians),
            _ => unsupported("turning a lattice direction by an arbitrary angle"),
        }
    }

    /// Direction pointing the other way.
    #[must_use]
    pub fn opposite(&self, direction: Direction) -> Direction {
        match self {
            Self::Continuous => self.turn(direction, PI),
            _ => self.shift(direction, self.directions().len() as i32 / 2),
        }
    }

    /// Fewest compass steps separating two directions.
    #[must_use]
    pub fn minor_arc_length(&self, from: Direction, to: Direction) -> usize {
        let len = self.directions().len();
        let a = self.require_index(from);
        let b = self.require_index(to);
        let forward = (b + len - a) % len;
        forward.min(len - forward)
    }

    /// Angle between two directions in radians.
    #[must_use]
    pub fn angle_between(&self, from: Direction, to: Direction) -> f64 {
        match self {
            Self::Hexagonal => self.minor_arc_length(from, to) as f64 * FRAC_PI_3,
            Self::Linear => {
                if self.minor_arc_length(from, to) == 0 {
                    0.0
                } else {
                    FRAC_PI_2
                }
            }
            Self::Continuous => match (from.angle(), to.angle()) {
                (Some(a), Some(b)) => normalize_angle(b - a),
                _ => unsupported("measuring lattice steps on the continuous compass"),
            },
        }
    }
}

/// Location of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    /// Integer lattice cell.
    Cell { q: i32, r: i32 },
    /// Point on the continuous plane.
    Point {
        x: OrderedFloat<f64>,
        y: OrderedFloat<f64>,
    },
}

impl Position {
    #[must_use]
    pub const fn cell(q: i32, r: i32) -> Self {
        Self::Cell { q, r }
    }

    #[must_use]
    pub fn point(x: f64, y: f64) -> Self {
        Self::Point {
            x: OrderedFloat(x),
            y: OrderedFloat(y),
        }
    }

    /// Lattice coordinates, if this is a cell.
    #[must_use]
    pub fn as_cell(&self) -> Option<(i32, i32)> {
        match *self {
            Self::Cell { q, r } => Some((q, r)),
            Self::Point { .. } => None,
        }
    }

    /// Coordinates as floats.
    #[must_use]
    pub fn coords(&self) -> (f64, f64) {
        match *self {
            Self::Cell { q, r } => (f64::from(q), f64::from(r)),
            Self::Point { x, y } => (x.0, y.0),
        }
    }

    /// Translate by one unit of `direction` without any wrapping.
    ///
    /// # Panics
    /// When mixing lattice cells with headings.
    #[must_use]
    pub fn offset(&self, direction: Direction) -> Self {
        match (*self, direction) {
            (Self::Cell { q, r }, Direction::Step { dq, dr }) => Self::cell(q + dq, r + dr),
            (Self::Point { x, y }, Direction::Heading(_)) => {
                let (dx, dy) = direction.vector();
                Self::point(x.0 + dx, y.0 + dy)
            }
            _ => unsupported("mixing lattice and continuous geometry"),
        }
    }

    /// Euclidean distance in grid coordinates.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        let (ax, ay) = self.coords();
        let (bx, by) = other.coords();
        (ax - bx).hypot(ay - by)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Cell { q, r } => write!(f, "({q}, {r})"),
            Self::Point { x, y } => write!(f, "({:.3}, {:.3})", x.0, y.0),
        }
    }
}
