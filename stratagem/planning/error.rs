use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of entity a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// Parent referenced when adding a goal.
    ParentGoal,
    /// Dependency referenced when adding a goal.
    DependencyGoal,
    /// Resource referenced by an allocation.
    Resource,
    /// Strategy referenced by an evaluation.
    Strategy,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParentGoal => write!(f, "parent goal"),
            Self::DependencyGoal => write!(f, "dependency goal"),
            Self::Resource => write!(f, "resource"),
            Self::Strategy => write!(f, "strategy"),
        }
    }
}

/// Hard failures raised by the planning components.
///
/// Most lookups on update/remove paths return sentinels instead; only creation-time
/// references and strategy evaluation fail through this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanningError {
    /// A referenced id is not registered.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: EntityKind,
        /// The missing id.
        id: String,
    },
}

impl PlanningError {
    /// Builds a [`PlanningError::NotFound`].
    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether this is a not-found failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias for planning operations.
pub type PlanningResult<T> = Result<T, PlanningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_kind_and_id() {
        let err = PlanningError::not_found(EntityKind::Resource, "gpu-0");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "resource not found: gpu-0");
    }
}
