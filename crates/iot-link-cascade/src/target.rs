//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport cascade, failure memory and connection status."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::fmt;

use iot_link_transport::BoxId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Box reference as handed over by callers: either the bare record id or a
/// relational many-to-one value wrapping that id in a one-element list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoxRef {
    /// Plain record id.
    Id(BoxId),
    /// Record id wrapped in a collection; exactly one element is accepted.
    Wrapped(Vec<BoxId>),
}

/// Caller passed a box reference that does not name exactly one box.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    /// The wrapping collection was empty.
    #[error("box reference is empty")]
    Empty,
    /// The wrapping collection held more than one id.
    #[error("box reference holds {0} ids; exactly one expected")]
    Ambiguous(usize),
    /// Textual input could not be parsed.
    #[error("invalid box reference '{0}'")]
    Unparseable(String),
}

impl BoxRef {
    /// Collapse the reference to the scalar record id.
    pub fn normalize(&self) -> Result<BoxId, TargetError> {
        match self {
            BoxRef::Id(id) => Ok(*id),
            BoxRef::Wrapped(ids) => match ids.as_slice() {
                [id] => Ok(*id),
                [] => Err(TargetError::Empty),
                many => Err(TargetError::Ambiguous(many.len())),
            },
        }
    }
}

impl From<BoxId> for BoxRef {
    fn from(id: BoxId) -> Self {
        BoxRef::Id(id)
    }
}

impl From<[BoxId; 1]> for BoxRef {
    fn from(ids: [BoxId; 1]) -> Self {
        BoxRef::Wrapped(ids.to_vec())
    }
}

impl From<Vec<BoxId>> for BoxRef {
    fn from(ids: Vec<BoxId>) -> Self {
        BoxRef::Wrapped(ids)
    }
}

impl std::str::FromStr for BoxRef {
    type Err = TargetError;

    /// Accepts `1` or `[1]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s.trim()).map_err(|_| TargetError::Unparseable(s.to_owned()))
    }
}

impl fmt::Display for BoxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxRef::Id(id) => write!(f, "{id}"),
            BoxRef::Wrapped(ids) => {
                let inner = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "[{inner}]")
            }
        }
    }
}
