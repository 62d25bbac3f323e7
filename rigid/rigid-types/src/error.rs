//! Error types for world operations.

use thiserror::Error;

/// Errors that can occur while building or stepping a world.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RigidError {
    /// Shape handle does not refer to a live shape.
    #[error("invalid shape ID: {0}")]
    InvalidShapeId(u64),

    /// Body handle does not refer to a live body.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// Constraint handle does not refer to a live constraint.
    #[error("invalid constraint ID: {0}")]
    InvalidConstraintId(u64),

    /// Shape cannot be deleted while a body uses it.
    #[error("shape {shape} is still used by body {body}")]
    ShapeInUse {
        /// The shape being deleted.
        shape: u64,
        /// A body that still references it.
        body: u64,
    },

    /// Shape cannot be deleted while a compound lists it as a child.
    #[error("shape {shape} is still a child of compound {compound}")]
    ShapeReferenced {
        /// The shape being deleted.
        shape: u64,
        /// The compound that still references it.
        compound: u64,
    },

    /// Operation requires a compound shape.
    #[error("shape {0} is not a compound")]
    NotACompound(u64),

    /// Adding the child would make the compound contain itself.
    #[error("adding shape {child} to compound {compound} would create a cycle")]
    CompoundCycle {
        /// The compound being extended.
        compound: u64,
        /// The child that already contains the compound.
        child: u64,
    },

    /// Compound child index out of range.
    #[error("child index {index} out of range for compound {compound} with {len} children")]
    ChildIndexOutOfRange {
        /// The compound shape.
        compound: u64,
        /// Requested index.
        index: usize,
        /// Number of children.
        len: usize,
    },

    /// Constraint exists but is of a different kind.
    #[error("constraint {constraint} is a {actual}, expected a {expected}")]
    WrongConstraintKind {
        /// The constraint.
        constraint: u64,
        /// Kind required by the operation.
        expected: &'static str,
        /// Kind actually stored.
        actual: &'static str,
    },

    /// Degree-of-freedom index out of range.
    #[error("axis index {index} out of range (expected < {limit})")]
    InvalidAxis {
        /// Requested index.
        index: usize,
        /// Exclusive upper bound.
        limit: usize,
    },

    /// Rejected degenerate geometry or numeric input.
    #[error("degenerate input: {reason}")]
    Degenerate {
        /// What was wrong.
        reason: String,
    },

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be non-negative and finite)")]
    InvalidTimestep(f64),

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A handle counter ran out of values.
    #[error("capacity exceeded: no more {what} handles available")]
    CapacityExceeded {
        /// Which kind of handle.
        what: &'static str,
    },
}

impl RigidError {
    /// Create a degenerate input error.
    #[must_use]
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::Degenerate {
            reason: reason.into(),
        }
    }

    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check if this error reports a dead or mistyped handle.
    #[must_use]
    pub fn is_handle_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidShapeId(_)
                | Self::InvalidBodyId(_)
                | Self::InvalidConstraintId(_)
                | Self::NotACompound(_)
                | Self::WrongConstraintKind { .. }
        )
    }

    /// Check if this is a degenerate input error.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate { .. } | Self::InvalidTimestep(_))
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

/// Reject a non-finite or non-positive scalar.
pub(crate) fn require_positive(name: &str, value: f64) -> crate::Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(RigidError::degenerate(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RigidError::InvalidBodyId(42);
        assert!(err.to_string().contains("42"));

        let err = RigidError::ShapeInUse { shape: 3, body: 7 };
        let msg = err.to_string();
        assert!(msg.contains("shape 3"));
        assert!(msg.contains("body 7"));

        let err = RigidError::degenerate("radius is zero");
        assert!(err.to_string().contains("radius is zero"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(RigidError::InvalidShapeId(1).is_handle_error());
        assert!(RigidError::NotACompound(1).is_handle_error());
        assert!(!RigidError::degenerate("x").is_handle_error());

        assert!(RigidError::degenerate("x").is_degenerate());
        assert!(RigidError::InvalidTimestep(-1.0).is_degenerate());

        assert!(RigidError::diverged("nan").is_diverged());
        assert!(RigidError::invalid_config("bad").is_config_error());
    }

    #[test]
    fn test_require_positive() {
        assert_eq!(require_positive("r", 2.0).unwrap(), 2.0);
        assert!(require_positive("r", 0.0).is_err());
        assert!(require_positive("r", -1.0).is_err());
        assert!(require_positive("r", f64::NAN).is_err());
        assert!(require_positive("r", f64::INFINITY).is_err());
    }
}
