//! Enumerable tunable parameters of algorithms.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Primitive type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Number,
    Integer,
    Boolean,
}

/// Value of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
}

impl ParameterValue {
    #[must_use]
    pub fn kind(&self) -> ParameterKind {
        match self {
            Self::Boolean(_) => ParameterKind::Boolean,
            Self::Integer(_) => ParameterKind::Integer,
            Self::Number(_) => ParameterKind::Number,
        }
    }

    /// Numeric view; integers widen.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Number(value) => Some(value),
            Self::Integer(value) => Some(value as f64),
            Self::Boolean(_) => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Integer(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Boolean(value) => Some(value),
            _ => None,
        }
    }

    /// Parse `text` as a value of `kind`.
    pub fn parse(kind: ParameterKind, text: &str) -> Result<Self, ParameterError> {
        let text = text.trim();
        let parsed = match kind {
            ParameterKind::Number => text.parse().ok().map(Self::Number),
            ParameterKind::Integer => text.parse().ok().map(Self::Integer),
            ParameterKind::Boolean => text.parse().ok().map(Self::Boolean),
        };
        parsed.ok_or_else(|| ParameterError::Unparsable {
            text: text.to_owned(),
            expected: kind,
        })
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
        }
    }
}

/// Errors raised when reading or writing parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("unknown parameter: {0}")]
    Unknown(String),
    #[error("parameter `{name}` expects a {expected:?} value")]
    TypeMismatch {
        name: &'static str,
        expected: ParameterKind,
    },
    #[error("parameter `{name}` is out of range: {reason}")]
    OutOfRange {
        name: &'static str,
        reason: &'static str,
    },
    #[error("cannot parse `{text}` as a {expected:?} value")]
    Unparsable {
        text: String,
        expected: ParameterKind,
    },
    #[error("algorithm is shared with a running activation and cannot be modified")]
    Busy,
}

/// Snapshot of one parameter for display or external control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterEntry {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub value: ParameterValue,
    pub default: ParameterValue,
    pub description: &'static str,
}

/// Static description of one parameter of algorithm type `A`.
pub struct ParameterDef<A> {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub default: ParameterValue,
    pub description: &'static str,
    pub get: fn(&A) -> ParameterValue,
    pub set: fn(&mut A, ParameterValue) -> Result<(), ParameterError>,
}

/// Describe every parameter in `table` with its current value.
pub fn describe<A>(algorithm: &A, table: &[ParameterDef<A>]) -> Vec<ParameterEntry> {
    table
        .iter()
        .map(|def| ParameterEntry {
            name: def.name,
            kind: def.kind,
            value: (def.get)(algorithm),
            default: def.default,
            description: def.description,
        })
        .collect()
}

/// Apply `value` to the parameter called `name`.
pub fn assign<A>(
    algorithm: &mut A,
    table: &[ParameterDef<A>],
    name: &str,
    value: ParameterValue,
) -> Result<(), ParameterError> {
    let def = table
        .iter()
        .find(|def| def.name == name)
        .ok_or_else(|| ParameterError::Unknown(name.to_owned()))?;
    (def.set)(algorithm, value)
}

/// Read a strictly positive finite number.
pub fn positive_number(name: &'static str, value: ParameterValue) -> Result<f64, ParameterError> {
    let number = value.as_f64().ok_or(ParameterError::TypeMismatch {
        name,
        expected: ParameterKind::Number,
    })?;
    if number.is_finite() && number > 0.0 {
        Ok(number)
    } else {
        Err(ParameterError::OutOfRange {
            name,
            reason: "must be a positive finite number",
        })
    }
}

/// Read a probability in `[0, 1]`.
pub fn probability(name: &'static str, value: ParameterValue) -> Result<f64, ParameterError> {
    let number = value.as_f64().ok_or(ParameterError::TypeMismatch {
        name,
        expected: ParameterKind::Number,
    })?;
    if (0.0..=1.0).contains(&number) {
        Ok(number)
    } else {
        Err(ParameterError::OutOfRange {
            name,
            reason: "must lie in [0, 1]",
        })
    }
}

/// Read a non-negative integer that fits in `u32`.
pub fn count(name: &'static str, value: ParameterValue) -> Result<u32, ParameterError> {
    let integer = value.as_i64().ok_or(ParameterError::TypeMismatch {
        name,
        expected: ParameterKind::Integer,
    })?;
    u32::try_from(integer).map_err(|_| ParameterError::OutOfRange {
        name,
        reason: "must be a non-negative 32-bit integer",
    })
}

pub fn flag(name: &'static str, value: ParameterValue) -> Result<bool, ParameterError> {
    value.as_bool().ok_or(ParameterError::TypeMismatch {
        name,
        expected: ParameterKind::Boolean,
    })
}
