//! Hinge and two-axis hinge constraints for the rigid-body world.
//!
//! # Joint Types
//!
//! - [`Hinge`]: Single-axis rotation between two body-local frames, with an
//!   angular limit and a velocity motor
//! - [`Hinge2`]: Steering about a parent axis, spin about a child axis and
//!   sprung travel along the parent axis (a car wheel)
//!
//! Both are stored as a [`Constraint`] and share a [`JointLink`]: the two
//! bodies, an enabled flag, a flag saying whether the bodies still collide,
//! and per-axis ERP/CFM overrides ([`ParamSet`]).
//!
//! # Constraint Formulation
//!
//! Every step a joint is lowered into velocity rows ([`JointRows`]) and solved
//! with projected Gauss-Seidel alongside the contacts:
//!
//! ```text
//! J v = rhs           (locked rows, rhs = -erp/dt · C)
//! J v ≥ rhs  or  ≤    (limit rows, one-sided)
//! |λ| ≤ λ_max         (motor rows, rhs = target velocity)
//! J v + cfm λ = rhs   (spring rows, cfm and rhs from stiffness and damping)
//! ```
//!
//! # Example
//!
//! ```
//! use rigid_constraint::{Constraint, Hinge, Joint};
//! use rigid_types::{BodyId, EulerAngles, Pose};
//! use nalgebra::{Point3, UnitQuaternion, Vector3};
//!
//! let mut hinge = Hinge::from_pivots(
//!     BodyId::new(1),
//!     BodyId::new(2),
//!     Point3::new(0.5, 0.0, 0.0),
//!     &EulerAngles::default(),
//!     Point3::new(-0.5, 0.0, 0.0),
//!     &EulerAngles::default(),
//!     true,
//!     false,
//! )
//! .unwrap();
//! hinge.set_limit(-1.0, 1.0).unwrap();
//!
//! let pose_a = Pose::identity();
//! let pose_b = Pose::from_position_rotation(
//!     Point3::new(1.0, 0.0, 0.0),
//!     UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.25),
//! );
//! assert!((hinge.angle(&pose_a, &pose_b) - 0.25).abs() < 1e-12);
//!
//! let constraint = Constraint::from(hinge);
//! assert!(constraint.link().is_enabled());
//! ```

#![doc(html_root_url = "https://docs.rs/rigid-constraint/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod hinge;
mod hinge2;
mod joint;
mod limits;
mod motor;
mod param;
mod rows;
mod spring;

pub use hinge::{HINGE_PARAM_AXIS, Hinge};
pub use hinge2::{
    Hinge2, Hinge2Dof, SPIN, STEERING, SUSPENSION_DAMPING, SUSPENSION_STIFFNESS, TILT,
};
pub use joint::{ConstraintKind, Joint, JointLink};
pub use limits::{DofLimit, LimitState};
pub use motor::{JointMotor, MotorBudget};
pub use param::{ConstraintParam, NUM_AXES, ParamSet};
pub use rows::{Jacobian, JointRows, PointRow, Row, Softness, limit_row};
pub use spring::{DofSpring, SpringRow};

// Re-export types needed for constraint computation
pub use rigid_types::{BodyId, ConstraintId, Pose};

use rigid_types::{Result, SolverBody, SolverConfig};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A constraint owned by the world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Constraint {
    /// Single-axis hinge.
    Hinge(Hinge),
    /// Two-axis hinge.
    Hinge2(Hinge2),
}

impl Constraint {
    fn joint(&self) -> &dyn Joint {
        match self {
            Self::Hinge(h) => h,
            Self::Hinge2(h) => h,
        }
    }

    fn joint_mut(&mut self) -> &mut dyn Joint {
        match self {
            Self::Hinge(h) => h,
            Self::Hinge2(h) => h,
        }
    }

    /// Bodies and switches.
    #[must_use]
    pub fn link(&self) -> &JointLink {
        self.joint().link()
    }

    /// Mutable bodies and switches.
    pub fn link_mut(&mut self) -> &mut JointLink {
        self.joint_mut().link_mut()
    }

    /// Kind of the stored joint.
    #[must_use]
    pub fn kind(&self) -> ConstraintKind {
        self.joint().kind()
    }

    /// Set an ERP/CFM override.
    ///
    /// # Errors
    ///
    /// Same as [`ParamSet::set`].
    pub fn set_param(
        &mut self,
        param: ConstraintParam,
        value: f64,
        axis: Option<usize>,
    ) -> Result<()> {
        self.joint_mut().set_param(param, value, axis)
    }

    /// Read an ERP/CFM override.
    ///
    /// # Errors
    ///
    /// Same as [`ParamSet::get`].
    pub fn param(&self, param: ConstraintParam, axis: Option<usize>) -> Result<Option<f64>> {
        self.joint().param(param, axis)
    }

    /// Lower into velocity rows for one step.
    #[must_use]
    pub fn prepare(
        &self,
        a: &SolverBody,
        b: &SolverBody,
        config: &SolverConfig,
        dt: f64,
    ) -> JointRows {
        self.joint().prepare(a, b, config, dt)
    }

    /// The hinge, if this is one.
    #[must_use]
    pub fn as_hinge(&self) -> Option<&Hinge> {
        match self {
            Self::Hinge(h) => Some(h),
            Self::Hinge2(_) => None,
        }
    }

    /// The hinge, mutably, if this is one.
    pub fn as_hinge_mut(&mut self) -> Option<&mut Hinge> {
        match self {
            Self::Hinge(h) => Some(h),
            Self::Hinge2(_) => None,
        }
    }

    /// The two-axis hinge, if this is one.
    #[must_use]
    pub fn as_hinge2(&self) -> Option<&Hinge2> {
        match self {
            Self::Hinge2(h) => Some(h),
            Self::Hinge(_) => None,
        }
    }

    /// The two-axis hinge, mutably, if this is one.
    pub fn as_hinge2_mut(&mut self) -> Option<&mut Hinge2> {
        match self {
            Self::Hinge2(h) => Some(h),
            Self::Hinge(_) => None,
        }
    }
}

impl From<Hinge> for Constraint {
    fn from(hinge: Hinge) -> Self {
        Self::Hinge(hinge)
    }
}

impl From<Hinge2> for Constraint {
    fn from(hinge: Hinge2) -> Self {
        Self::Hinge2(hinge)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};
    use rigid_types::EulerAngles;

    fn hinge() -> Hinge {
        Hinge::from_pivots(
            BodyId::new(1),
            BodyId::new(2),
            Point3::origin(),
            &EulerAngles::default(),
            Point3::origin(),
            &EulerAngles::default(),
            false,
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_enum_dispatch() {
        let mut c = Constraint::from(hinge());
        assert_eq!(c.kind(), ConstraintKind::Hinge);
        assert_eq!(c.kind().name(), "hinge");
        assert!(c.as_hinge().is_some());
        assert!(c.as_hinge2().is_none());

        c.link_mut().set_enabled(false);
        assert!(!c.link().is_enabled());
        assert!(c.link().collide());
        assert!(c.link().connects(BodyId::new(2), BodyId::new(1)));
        assert!(c.link().involves(BodyId::new(1)));
        assert!(!c.link().involves(BodyId::new(3)));
    }

    #[test]
    fn test_param_roundtrip_through_enum() {
        let p = Pose::identity();
        let mut c = Constraint::from(
            Hinge2::new(
                BodyId::new(1),
                BodyId::new(2),
                &p,
                &p,
                Point3::origin(),
                Vector3::z(),
                Vector3::x(),
                false,
            )
            .unwrap(),
        );
        assert_eq!(c.kind(), ConstraintKind::Hinge2);
        c.set_param(ConstraintParam::StopCfm, 0.01, Some(STEERING))
            .unwrap();
        assert_eq!(
            c.param(ConstraintParam::StopCfm, Some(STEERING)).unwrap(),
            Some(0.01)
        );
        assert_eq!(c.param(ConstraintParam::StopCfm, Some(SPIN)).unwrap(), None);
        assert!(!c.link().collide());
    }
}
