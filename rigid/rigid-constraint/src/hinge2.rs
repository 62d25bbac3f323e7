//! Two-axis hinge with suspension travel.
//!
//! The joint frame is built once, in world space, from an anchor and two
//! axes:
//!
//! - Z is the parent (steering) axis
//! - X is the child (spin) axis, orthogonalised against Z
//! - Y completes the right-handed frame
//!
//! The frame is then stored in both bodies' local coordinates. Every step the
//! relative pose of frame B in frame A is split into three translations along
//! A's axes and three angles, `R = R_z(steering) · R_y(tilt) · R_x(spin)`.
//! Each of these six coordinates has its own limit, motor and spring.
//!
//! | Index | Coordinate | Default |
//! |-------|------------|---------|
//! | 0 | linear X | locked |
//! | 1 | linear Y | locked |
//! | 2 | linear Z (suspension) | `[-1, 1]` with a spring |
//! | 3 | spin | free |
//! | 4 | tilt | locked |
//! | 5 | steering | `±π/4` |

use std::f64::consts::{FRAC_PI_4, PI};

use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};
use rigid_types::{BodyId, Pose, Result, RigidError, SolverBody, SolverConfig};

use crate::param::NUM_AXES;
use crate::rows::{Jacobian, JointRows, Row, Softness, limit_row};
use crate::{ConstraintKind, ConstraintParam, DofLimit, DofSpring, Joint, JointLink, JointMotor};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of the spin coordinate (rotation about the child axis).
pub const SPIN: usize = 3;
/// Index of the tilt coordinate.
pub const TILT: usize = 4;
/// Index of the steering coordinate (rotation about the parent axis).
pub const STEERING: usize = 5;

/// Default suspension stiffness.
pub const SUSPENSION_STIFFNESS: f64 = 4.0 * PI * PI;
/// Default suspension damping.
pub const SUSPENSION_DAMPING: f64 = 0.01;

/// Shortest axis accepted when building the frame.
const MIN_AXIS_LENGTH: f64 = 1e-9;

/// Limit, motor and spring of one coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hinge2Dof {
    /// Position bounds.
    pub limit: DofLimit,
    /// Velocity motor (force limited).
    pub motor: JointMotor,
    /// Spring-damper.
    pub spring: DofSpring,
}

impl Hinge2Dof {
    fn with_limit(limit: DofLimit) -> Self {
        Self {
            limit,
            motor: JointMotor::force_limited(),
            spring: DofSpring::default(),
        }
    }
}

/// A wheel-style joint: steering about the parent axis, spin about the child
/// axis, and sprung travel along the parent axis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hinge2 {
    link: JointLink,
    frame_a: Pose,
    frame_b: Pose,
    dofs: [Hinge2Dof; NUM_AXES],
}

/// Coordinates of one configuration, with the axes their rates are measured on.
struct Coordinates {
    positions: [f64; NUM_AXES],
    linear_axes: [Vector3<f64>; 3],
    angular_axes: [Vector3<f64>; 3],
    anchor_b: Point3<f64>,
}

impl Hinge2 {
    /// Build the joint from a world anchor and world axes.
    ///
    /// `pose_a` and `pose_b` are the bodies' current poses. Fails when an
    /// axis has zero length or the two axes are parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] if the anchor or an axis is not finite,
    /// an axis has zero length, or the axes are parallel.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        pose_a: &Pose,
        pose_b: &Pose,
        anchor: Point3<f64>,
        parent_axis: Vector3<f64>,
        child_axis: Vector3<f64>,
        collide: bool,
    ) -> Result<Self> {
        let frame = Self::world_frame(anchor, &parent_axis, &child_axis)?;

        let mut suspension = Hinge2Dof::with_limit(DofLimit::new(-1.0, 1.0));
        suspension.spring = DofSpring::new(SUSPENSION_STIFFNESS, SUSPENSION_DAMPING);

        Ok(Self {
            link: JointLink::new(body_a, body_b, collide),
            frame_a: pose_a.inverse().compose(&frame),
            frame_b: pose_b.inverse().compose(&frame),
            dofs: [
                Hinge2Dof::with_limit(DofLimit::locked(0.0)),
                Hinge2Dof::with_limit(DofLimit::locked(0.0)),
                suspension,
                Hinge2Dof::with_limit(DofLimit::free()),
                Hinge2Dof::with_limit(DofLimit::locked(0.0)),
                Hinge2Dof::with_limit(DofLimit::symmetric(FRAC_PI_4)),
            ],
        })
    }

    fn world_frame(
        anchor: Point3<f64>,
        parent_axis: &Vector3<f64>,
        child_axis: &Vector3<f64>,
    ) -> Result<Pose> {
        let finite = anchor
            .iter()
            .chain(parent_axis.iter())
            .chain(child_axis.iter())
            .all(|x| x.is_finite());
        if !finite {
            return Err(RigidError::degenerate("hinge2 anchor or axis is not finite"));
        }
        let z = parent_axis
            .try_normalize(MIN_AXIS_LENGTH)
            .ok_or_else(|| RigidError::degenerate("hinge2 parent axis has zero length"))?;
        let child = child_axis
            .try_normalize(MIN_AXIS_LENGTH)
            .ok_or_else(|| RigidError::degenerate("hinge2 child axis has zero length"))?;
        let x = (child - z * z.dot(&child))
            .try_normalize(1e-6)
            .ok_or_else(|| RigidError::degenerate("hinge2 axes are parallel"))?;
        let y = z.cross(&x);

        let basis = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z]));
        Ok(Pose::from_position_rotation(
            anchor,
            UnitQuaternion::from_rotation_matrix(&basis),
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

    /// Settings of coordinate `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidAxis`] if `index` is 6 or more.
    pub fn dof(&self, index: usize) -> Result<&Hinge2Dof> {
        self.dofs.get(index).ok_or(RigidError::InvalidAxis {
            index,
            limit: NUM_AXES,
        })
    }

    fn dof_mut(&mut self, index: usize) -> Result<&mut Hinge2Dof> {
        self.dofs.get_mut(index).ok_or(RigidError::InvalidAxis {
            index,
            limit: NUM_AXES,
        })
    }

    /// Lower steering limit.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] if `lower` is not finite.
    pub fn set_lower_limit(&mut self, lower: f64) -> Result<()> {
        require_finite("lower limit", lower)?;
        self.dofs[STEERING].limit.set_lower(lower);
        Ok(())
    }

    /// Upper steering limit.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] if `upper` is not finite.
    pub fn set_upper_limit(&mut self, upper: f64) -> Result<()> {
        require_finite("upper limit", upper)?;
        self.dofs[STEERING].limit.set_upper(upper);
        Ok(())
    }

    /// Replace the limit of any coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidAxis`] if `index` is 6 or more and
    /// [`RigidError::Degenerate`] if a bound is not finite.
    pub fn set_limit(&mut self, index: usize, lower: f64, upper: f64) -> Result<()> {
        require_finite("lower limit", lower)?;
        require_finite("upper limit", upper)?;
        self.dof_mut(index)?.limit = DofLimit::new(lower, upper);
        Ok(())
    }

    /// Switch the motor of a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidAxis`] if `index` is 6 or more.
    pub fn enable_motor(&mut self, index: usize, enable: bool) -> Result<()> {
        self.dof_mut(index)?.motor.set_enabled(enable);
        Ok(())
    }

    /// Maximum motor force (or torque) of a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidAxis`] if `index` is 6 or more and
    /// [`RigidError::Degenerate`] for a negative or non-finite force.
    pub fn set_max_motor_force(&mut self, index: usize, force: f64) -> Result<()> {
        require_non_negative("max motor force", force)?;
        self.dof_mut(index)?.motor.set_max_effort(force);
        Ok(())
    }

    /// Motor target velocity of a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidAxis`] if `index` is 6 or more and
    /// [`RigidError::Degenerate`] if `velocity` is not finite.
    pub fn set_target_velocity(&mut self, index: usize, velocity: f64) -> Result<()> {
        require_finite("target velocity", velocity)?;
        self.dof_mut(index)?.motor.set_target_velocity(velocity);
        Ok(())
    }

    /// Spring stiffness of a coordinate. With `limit_aware` it only acts
    /// while the coordinate is outside its limits.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidAxis`] if `index` is 6 or more and
    /// [`RigidError::Degenerate`] for a negative or non-finite stiffness.
    pub fn set_stiffness(&mut self, index: usize, stiffness: f64, limit_aware: bool) -> Result<()> {
        require_non_negative("stiffness", stiffness)?;
        self.dof_mut(index)?
            .spring
            .set_stiffness(stiffness, limit_aware);
        Ok(())
    }

    /// Spring damping of a coordinate. With `limit_aware` it only acts
    /// while the coordinate is outside its limits.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidAxis`] if `index` is 6 or more and
    /// [`RigidError::Degenerate`] for a negative or non-finite damping.
    pub fn set_damping(&mut self, index: usize, damping: f64, limit_aware: bool) -> Result<()> {
        require_non_negative("damping", damping)?;
        self.dof_mut(index)?
            .spring
            .set_damping(damping, limit_aware);
        Ok(())
    }

    /// Spring rest position of a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidAxis`] if `index` is 6 or more and
    /// [`RigidError::Degenerate`] if `equilibrium` is not finite.
    pub fn set_equilibrium(&mut self, index: usize, equilibrium: f64) -> Result<()> {
        require_finite("equilibrium", equilibrium)?;
        self.dof_mut(index)?.spring.set_equilibrium(equilibrium);
        Ok(())
    }

    /// Steering angle about the parent axis.
    #[must_use]
    pub fn angle1(&self, pose_a: &Pose, pose_b: &Pose) -> f64 {
        self.coordinates(pose_a, pose_b).positions[STEERING]
    }

    /// Spin angle about the child axis.
    #[must_use]
    pub fn angle2(&self, pose_a: &Pose, pose_b: &Pose) -> f64 {
        self.coordinates(pose_a, pose_b).positions[SPIN]
    }

    /// All six coordinates: three translations, then spin, tilt, steering.
    #[must_use]
    pub fn positions(&self, pose_a: &Pose, pose_b: &Pose) -> [f64; NUM_AXES] {
        self.coordinates(pose_a, pose_b).positions
    }

    fn coordinates(&self, pose_a: &Pose, pose_b: &Pose) -> Coordinates {
        let world_a = pose_a.compose(&self.frame_a);
        let world_b = pose_b.compose(&self.frame_b);

        let offset = world_a.rotation.inverse() * (world_b.position - world_a.position);
        let m = (world_a.rotation.inverse() * world_b.rotation)
            .to_rotation_matrix()
            .into_inner();
        let steering = m[(1, 0)].atan2(m[(0, 0)]);
        let tilt = (-m[(2, 0)]).clamp(-1.0, 1.0).asin();
        let spin = m[(2, 1)].atan2(m[(2, 2)]);

        // ω_rel = steering' e1 + tilt' e2 + spin' e3; the reciprocal basis
        // isolates each rate.
        let e1 = world_a.rotation * Vector3::z();
        let e3 = world_b.rotation * Vector3::x();
        let e2 = e1
            .cross(&e3)
            .try_normalize(1e-12)
            .unwrap_or_else(|| world_a.rotation * Vector3::y());
        let spin_axis = reciprocal(&e1.cross(&e2), &e3);
        let steering_axis = reciprocal(&e2.cross(&e3), &e1);

        Coordinates {
            positions: [offset.x, offset.y, offset.z, spin, tilt, steering],
            linear_axes: [
                world_a.rotation * Vector3::x(),
                world_a.rotation * Vector3::y(),
                e1,
            ],
            angular_axes: [spin_axis, e2, steering_axis],
            anchor_b: world_b.position,
        }
    }
}

fn reciprocal(v: &Vector3<f64>, along: &Vector3<f64>) -> Vector3<f64> {
    let d = v.dot(along);
    if d.abs() < 1e-12 { Vector3::zeros() } else { v / d }
}

fn require_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RigidError::degenerate(format!("{name} must be finite, got {value}")))
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<()> {
    require_finite(name, value)?;
    if value < 0.0 {
        return Err(RigidError::degenerate(format!("{name} must be non-negative, got {value}")));
    }
    Ok(())
}

impl Joint for Hinge2 {
    fn link(&self) -> &JointLink {
        &self.link
    }

    fn link_mut(&mut self) -> &mut JointLink {
        &mut self.link
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Hinge2
    }

    fn set_param(&mut self, param: ConstraintParam, value: f64, axis: Option<usize>) -> Result<()> {
        self.link.params_mut().set(param, value, axis)
    }

    fn param(&self, param: ConstraintParam, axis: Option<usize>) -> Result<Option<f64>> {
        self.link.params().get(param, axis)
    }

    fn prepare(&self, a: &SolverBody, b: &SolverBody, config: &SolverConfig, dt: f64) -> JointRows {
        let pose_a = Pose::from_position_rotation(a.position, a.rotation);
        let pose_b = Pose::from_position_rotation(b.position, b.rotation);
        let coords = self.coordinates(&pose_a, &pose_b);

        // Linear rates are measured at B's anchor; the negated direction turns
        // `(v_A - v_B)` into the rate of `anchor_B - anchor_A`.
        let r_a = coords.anchor_b - a.position;
        let r_b = coords.anchor_b - b.position;
        let jacobians: [Jacobian; NUM_AXES] = [
            Jacobian::linear(-coords.linear_axes[0], &r_a, &r_b),
            Jacobian::linear(-coords.linear_axes[1], &r_a, &r_b),
            Jacobian::linear(-coords.linear_axes[2], &r_a, &r_b),
            Jacobian::angular(-coords.angular_axes[0]),
            Jacobian::angular(-coords.angular_axes[1]),
            Jacobian::angular(-coords.angular_axes[2]),
        ];

        let mut rows = JointRows::new();
        for (axis, (dof, jacobian)) in self.dofs.iter().zip(jacobians).enumerate() {
            let position = coords.positions[axis];
            let lock = Softness {
                erp: self.link.erp(axis, config),
                cfm: self.link.cfm(axis, config),
            };
            let stop = Softness {
                erp: self.link.stop_erp(axis, config),
                cfm: self.link.stop_cfm(axis, config),
            };

            if let Some(max_impulse) = dof.motor.step_impulse(dt) {
                rows.push(Row::new(
                    jacobian,
                    a,
                    b,
                    dof.motor.target_velocity(),
                    lock.cfm,
                    (-max_impulse, max_impulse),
                ));
            }

            if let Some(spring) = dof.spring.row(!dof.limit.contains(position), dt) {
                rows.push(Row::new(
                    jacobian,
                    a,
                    b,
                    -spring.bias_rate * (position - dof.spring.equilibrium()),
                    spring.cfm,
                    (f64::NEG_INFINITY, f64::INFINITY),
                ));
            }

            rows.push(limit_row(jacobian, a, b, dof.limit.state(position), lock, stop, dt));
        }
        rows
    }
}
