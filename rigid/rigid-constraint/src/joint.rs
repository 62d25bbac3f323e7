//! The joint trait and the state every joint shares.

use rigid_types::{BodyId, Result, SolverBody, SolverConfig};

use crate::{ConstraintParam, JointRows, ParamSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of a stored constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstraintKind {
    /// Single-axis hinge.
    Hinge,
    /// Two-axis hinge (steering plus spin, with suspension travel).
    Hinge2,
}

impl ConstraintKind {
    /// Human-readable name, used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Hinge => "hinge",
            Self::Hinge2 => "hinge2",
        }
    }
}

/// The pair of bodies a joint connects plus its solver switches.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointLink {
    body_a: BodyId,
    body_b: BodyId,
    enabled: bool,
    collide: bool,
    params: ParamSet,
}

impl JointLink {
    /// Link two bodies. The joint starts enabled.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, collide: bool) -> Self {
        Self {
            body_a,
            body_b,
            enabled: true,
            collide,
            params: ParamSet::new(),
        }
    }

    /// First body.
    #[must_use]
    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    /// Second body.
    #[must_use]
    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    /// Whether the solver uses this joint.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Include or skip the joint in the solver.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the two bodies still collide with each other.
    #[must_use]
    pub fn collide(&self) -> bool {
        self.collide
    }

    /// ERP/CFM overrides.
    #[must_use]
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Mutable ERP/CFM overrides.
    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    /// Whether `body` is one of the two ends.
    #[must_use]
    pub fn involves(&self, body: BodyId) -> bool {
        self.body_a == body || self.body_b == body
    }

    /// Whether this link joins `a` and `b`, in either order.
    #[must_use]
    pub fn connects(&self, a: BodyId, b: BodyId) -> bool {
        (self.body_a == a && self.body_b == b) || (self.body_a == b && self.body_b == a)
    }

    pub(crate) fn erp(&self, axis: usize, config: &SolverConfig) -> f64 {
        self.params.resolve(ConstraintParam::Erp, axis, config.erp)
    }

    pub(crate) fn cfm(&self, axis: usize, config: &SolverConfig) -> f64 {
        self.params.resolve(ConstraintParam::Cfm, axis, config.cfm)
    }

    pub(crate) fn stop_erp(&self, axis: usize, config: &SolverConfig) -> f64 {
        self.params.resolve(ConstraintParam::StopErp, axis, config.erp)
    }

    pub(crate) fn stop_cfm(&self, axis: usize, config: &SolverConfig) -> f64 {
        self.params.resolve(ConstraintParam::StopCfm, axis, config.cfm)
    }
}

/// Behaviour common to all joints.
pub trait Joint {
    /// Bodies and switches.
    fn link(&self) -> &JointLink;

    /// Mutable bodies and switches.
    fn link_mut(&mut self) -> &mut JointLink;

    /// Joint kind.
    fn kind(&self) -> ConstraintKind;

    /// Set an ERP/CFM override.
    fn set_param(&mut self, param: ConstraintParam, value: f64, axis: Option<usize>) -> Result<()>;

    /// Read an ERP/CFM override.
    fn param(&self, param: ConstraintParam, axis: Option<usize>) -> Result<Option<f64>>;

    /// Lower the joint into velocity rows for one step.
    ///
    /// `a` and `b` must be the solver views of [`JointLink::body_a`] and
    /// [`JointLink::body_b`].
    fn prepare(&self, a: &SolverBody, b: &SolverBody, config: &SolverConfig, dt: f64) -> JointRows;
}
