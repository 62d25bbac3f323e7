//! Single-axis hinge.
//!
//! Each body carries a local frame; the hinge axis is the frame's Z axis.
//! The joint keeps the two frame origins together (three linear rows as one
//! block) and the two Z axes aligned (two angular rows), leaving rotation
//! about Z free apart from an optional limit and motor.
//!
//! # Angle
//!
//! The angle is read from the X/Y axes of frame A and the Y axis of frame B:
//!
//! ```text
//! φ = atan2(y_B · x_A, y_B · y_A)
//! ```
//!
//! `φ` grows as A turns positively about the axis relative to B. With
//! `use_reference_frame_a` the sign flips, so the angle measures B relative
//! to A instead.

use nalgebra::{Point3, Vector3};
use rigid_types::{BodyId, EulerAngles, Pose, Result, RigidError, SolverBody, SolverConfig};

use crate::rows::{Jacobian, JointRows, PointRow, Row, Softness, limit_row};
use crate::{ConstraintKind, ConstraintParam, DofLimit, Joint, JointLink, JointMotor};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Axis index that hinge parameters are addressed on.
pub const HINGE_PARAM_AXIS: usize = 5;

/// A revolute joint between two bodies.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hinge {
    link: JointLink,
    frame_a: Pose,
    frame_b: Pose,
    use_reference_frame_a: bool,
    limit: DofLimit,
    motor: JointMotor,
}

impl Hinge {
    /// Create a hinge from body-local frames.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        frame_a: Pose,
        frame_b: Pose,
        use_reference_frame_a: bool,
        collide: bool,
    ) -> Self {
        Self {
            link: JointLink::new(body_a, body_b, collide),
            frame_a,
            frame_b,
            use_reference_frame_a,
            limit: DofLimit::free(),
            motor: JointMotor::impulse_limited(),
        }
    }

    /// Create a hinge from pivots and Euler rotations of the two frames.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] if a pivot or rotation is not finite.
    #[allow(clippy::too_many_arguments)]
    pub fn from_pivots(
        body_a: BodyId,
        body_b: BodyId,
        pivot_a: Point3<f64>,
        rotation_a: &EulerAngles,
        pivot_b: Point3<f64>,
        rotation_b: &EulerAngles,
        use_reference_frame_a: bool,
        collide: bool,
    ) -> Result<Self> {
        let finite = pivot_a.iter().chain(pivot_b.iter()).all(|x| x.is_finite())
            && rotation_a.is_finite()
            && rotation_b.is_finite();
        if !finite {
            return Err(RigidError::degenerate("hinge frame is not finite"));
        }
        Ok(Self::new(
            body_a,
            body_b,
            Pose::from_position_rotation(pivot_a, rotation_a.to_quaternion()),
            Pose::from_position_rotation(pivot_b, rotation_b.to_quaternion()),
            use_reference_frame_a,
            collide,
        ))
    }

    /// Frame on A, in A's local coordinates.
    #[must_use]
    pub fn frame_a(&self) -> &Pose {
        &self.frame_a
    }

    /// Frame on B, in B's local coordinates.
    #[must_use]
    pub fn frame_b(&self) -> &Pose {
        &self.frame_b
    }

    /// Whether the angle is measured in A's frame.
    #[must_use]
    pub fn use_reference_frame_a(&self) -> bool {
        self.use_reference_frame_a
    }

    /// Current angular limit.
    #[must_use]
    pub fn limit(&self) -> &DofLimit {
        &self.limit
    }

    /// Bound the hinge angle. `low > high` frees the joint; `low == high`
    /// locks it.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] if either bound is not finite.
    pub fn set_limit(&mut self, low: f64, high: f64) -> Result<()> {
        if !low.is_finite() || !high.is_finite() {
            return Err(RigidError::degenerate("hinge limits must be finite"));
        }
        self.limit = DofLimit::new(low, high);
        Ok(())
    }

    /// Current motor settings.
    #[must_use]
    pub fn motor(&self) -> &JointMotor {
        &self.motor
    }

    /// Configure the angular motor.
    ///
    /// `max_impulse` bounds the impulse the motor may apply per sub-step.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] for a non-finite velocity or a
    /// negative or non-finite impulse budget.
    pub fn enable_angular_motor(
        &mut self,
        enable: bool,
        target_velocity: f64,
        max_impulse: f64,
    ) -> Result<()> {
        if !target_velocity.is_finite() || !max_impulse.is_finite() || max_impulse < 0.0 {
            return Err(RigidError::degenerate(format!(
                "invalid motor settings: velocity {target_velocity}, impulse {max_impulse}"
            )));
        }
        self.motor.set_enabled(enable);
        self.motor.set_target_velocity(target_velocity);
        self.motor.set_max_effort(max_impulse);
        Ok(())
    }

    /// Hinge angle in `(-π, π]` for the given body poses.
    #[must_use]
    pub fn angle(&self, pose_a: &Pose, pose_b: &Pose) -> f64 {
        let world_a = pose_a.compose(&self.frame_a);
        let world_b = pose_b.compose(&self.frame_b);
        let ref0 = world_a.rotation * Vector3::x();
        let ref1 = world_a.rotation * Vector3::y();
        let swing = world_b.rotation * Vector3::y();
        self.reference_sign() * swing.dot(&ref0).atan2(swing.dot(&ref1))
    }

    fn reference_sign(&self) -> f64 {
        if self.use_reference_frame_a { -1.0 } else { 1.0 }
    }

    fn check_axis(axis: Option<usize>) -> Result<()> {
        match axis {
            None | Some(HINGE_PARAM_AXIS) => Ok(()),
            Some(index) => Err(RigidError::InvalidAxis {
                index,
                limit: HINGE_PARAM_AXIS + 1,
            }),
        }
    }
}

impl Joint for Hinge {
    fn link(&self) -> &JointLink {
        &self.link
    }

    fn link_mut(&mut self) -> &mut JointLink {
        &mut self.link
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Hinge
    }

    fn set_param(&mut self, param: ConstraintParam, value: f64, axis: Option<usize>) -> Result<()> {
        Self::check_axis(axis)?;
        self.link.params_mut().set(param, value, None)
    }

    fn param(&self, param: ConstraintParam, axis: Option<usize>) -> Result<Option<f64>> {
        Self::check_axis(axis)?;
        self.link.params().get(param, Some(HINGE_PARAM_AXIS))
    }

    fn prepare(&self, a: &SolverBody, b: &SolverBody, config: &SolverConfig, dt: f64) -> JointRows {
        let pose_a = Pose::from_position_rotation(a.position, a.rotation);
        let pose_b = Pose::from_position_rotation(b.position, b.rotation);
        let world_a = pose_a.compose(&self.frame_a);
        let world_b = pose_b.compose(&self.frame_b);

        let axis = HINGE_PARAM_AXIS;
        let lock = Softness {
            erp: self.link.erp(axis, config),
            cfm: self.link.cfm(axis, config),
        };
        let stop = Softness {
            erp: self.link.stop_erp(axis, config),
            cfm: self.link.stop_cfm(axis, config),
        };
        let bias_rate = if dt > 0.0 { lock.erp / dt } else { 0.0 };
        let free = (f64::NEG_INFINITY, f64::INFINITY);

        let mut rows = JointRows::new();
        rows.set_point(PointRow::new(
            a,
            b,
            &world_a.position,
            &world_b.position,
            lock.erp,
            lock.cfm,
            dt,
        ));

        // Keep B's axis on A's axis: rotate A about the misalignment.
        let axis_a = world_a.rotation * Vector3::z();
        let axis_b = world_b.rotation * Vector3::z();
        let misalignment = axis_a.cross(&axis_b);
        for perpendicular in [world_a.rotation * Vector3::x(), world_a.rotation * Vector3::y()] {
            rows.push(Row::new(
                Jacobian::angular(perpendicular),
                a,
                b,
                bias_rate * perpendicular.dot(&misalignment),
                lock.cfm,
                free,
            ));
        }

        // Rate of the hinge angle.
        let angle_rate = Jacobian::angular(axis_a * self.reference_sign());

        if let Some(max_impulse) = self.motor.step_impulse(dt) {
            rows.push(Row::new(
                angle_rate,
                a,
                b,
                self.motor.target_velocity(),
                lock.cfm,
                (-max_impulse, max_impulse),
            ));
        }

        let state = self.limit.state(self.angle(&pose_a, &pose_b));
        rows.push(limit_row(angle_rate, a, b, state, lock, stop, dt));

        rows
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use rigid_types::{MassProperties, Twist};

    fn hinge(use_reference_frame_a: bool) -> Hinge {
        Hinge::from_pivots(
            BodyId::new(1),
            BodyId::new(2),
            Point3::new(0.0, 0.0, 0.0),
            &EulerAngles::default(),
            Point3::new(-1.0, 0.0, 0.0),
            &EulerAngles::default(),
            use_reference_frame_a,
            false,
        )
        .unwrap()
    }

    fn turned_about_z(angle: f64, x: f64) -> Pose {
        Pose::from_position_rotation(
            Point3::new(x, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle),
        )
    }

    #[test]
    fn test_angle_sign_follows_reference_frame() {
        let pose_a = Pose::identity();
        let pose_b = turned_about_z(0.3, 1.0);

        assert_relative_eq!(hinge(false).angle(&pose_a, &pose_b), -0.3, epsilon = 1e-12);
        assert_relative_eq!(hinge(true).angle(&pose_a, &pose_b), 0.3, epsilon = 1e-12);
        let shifted = Pose::from_position(Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(hinge(true).angle(&pose_a, &shifted), 0.0);
    }

    #[test]
    fn test_limit_and_motor_settings() {
        let mut h = hinge(true);
        assert!(h.limit().is_free());
        h.set_limit(0.0, 0.0).unwrap();
        assert!(h.limit().is_locked());
        assert!(h.set_limit(f64::NAN, 1.0).is_err());

        h.enable_angular_motor(true, 2.0, 5.0).unwrap();
        assert!(h.motor().is_enabled());
        assert_eq!(h.motor().step_impulse(0.01), Some(5.0));
        assert!(h.enable_angular_motor(true, 1.0, -1.0).is_err());
    }

    #[test]
    fn test_params_only_on_limit_axis() {
        let mut h = hinge(false);
        h.set_param(ConstraintParam::StopErp, 0.8, Some(HINGE_PARAM_AXIS))
            .unwrap();
        assert_eq!(h.param(ConstraintParam::StopErp, None).unwrap(), Some(0.8));
        assert!(matches!(
            h.set_param(ConstraintParam::Cfm, 0.1, Some(0)),
            Err(RigidError::InvalidAxis { index: 0, .. })
        ));
    }

    #[test]
    fn test_rows_lock_free_spin() {
        let h = hinge(true);
        let a = SolverBody::fixed(&Pose::identity());
        let mut b = SolverBody::new(
            &Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
            &Twist::new(Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.3, 0.0, 2.0)),
            &MassProperties::sphere(1.0, 0.5),
        );
        let mut a_view = a.clone();
        let config = SolverConfig::default();
        let mut rows = h.prepare(&a, &b, &config, 1.0 / 60.0);
        // Block + two alignment rows; no limit, no motor.
        assert_eq!(rows.len(), 5);

        for _ in 0..500 {
            rows.solve(&mut a_view, &mut b);
        }
        // Only spin about the hinge axis survives, and the pivot stays put.
        assert_relative_eq!(b.angular_velocity.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(b.angular_velocity.y, 0.0, epsilon = 1e-6);
        let pivot_velocity = b.velocity_at(&Vector3::new(-1.0, 0.0, 0.0));
        assert_relative_eq!(pivot_velocity.norm(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_motor_row_drives_rate() {
        let mut h = hinge(true);
        h.enable_angular_motor(true, 1.5, 100.0).unwrap();
        let mut a = SolverBody::fixed(&Pose::identity());
        let mut b = SolverBody::new(
            &Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
            &Twist::zero(),
            &MassProperties::sphere(1.0, 0.5),
        );
        let mut rows = h.prepare(&a, &b, &SolverConfig::default(), 1.0 / 60.0);
        for _ in 0..100 {
            rows.solve(&mut a, &mut b);
        }
        // Measured in A's frame the angle rate is ω_B · z.
        assert_relative_eq!(b.angular_velocity.z, 1.5, epsilon = 1e-4);
    }
}
