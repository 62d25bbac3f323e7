//! Numerical integration for rigid body dynamics.
//!
//! The world splits each sub-step's integration around the solver:
//! velocities are advanced by external forces first, the solver corrects
//! them, and only then are positions advanced with the corrected velocities.
//! That split is semi-implicit (symplectic) Euler:
//!
//! ```text
//! v(t+dt) = v(t) + a(t) * dt
//! x(t+dt) = x(t) + v(t+dt) * dt
//! ```
//!
//! Angular velocity is expressed in the world frame, so orientation updates
//! left-multiply the body's quaternion.
//!
//! # Example
//!
//! ```
//! use rigid_core::integrators::{Integrator, SemiImplicitEuler};
//! use rigid_types::{Pose, Twist};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut pose = Pose::from_position(Point3::new(0.0, 10.0, 0.0));
//! let mut twist = Twist::zero();
//! let gravity = Vector3::new(0.0, -10.0, 0.0);
//!
//! SemiImplicitEuler::integrate_velocity(&mut twist, gravity, Vector3::zeros(), 0.01);
//! SemiImplicitEuler::integrate_position(&mut pose, &twist, 0.01);
//!
//! assert!(pose.position.y < 10.0);
//! assert!(twist.linear.y < 0.0);
//! ```

use nalgebra::{UnitQuaternion, Vector3};
use rigid_types::{Pose, Twist};

/// Trait for integration methods.
pub trait Integrator {
    /// Advance velocities by the given accelerations.
    fn integrate_velocity(
        twist: &mut Twist,
        linear_accel: Vector3<f64>,
        angular_accel: Vector3<f64>,
        dt: f64,
    );

    /// Advance the pose by the (already updated) velocities.
    fn integrate_position(pose: &mut Pose, twist: &Twist, dt: f64);
}

/// Semi-implicit Euler integration (symplectic Euler).
///
/// Stable for oscillatory systems and cheap; the standard choice for
/// sequential-impulse solvers.
pub struct SemiImplicitEuler;

impl Integrator for SemiImplicitEuler {
    fn integrate_velocity(
        twist: &mut Twist,
        linear_accel: Vector3<f64>,
        angular_accel: Vector3<f64>,
        dt: f64,
    ) {
        twist.linear += linear_accel * dt;
        twist.angular += angular_accel * dt;
    }

    fn integrate_position(pose: &mut Pose, twist: &Twist, dt: f64) {
        pose.position += twist.linear * dt;
        integrate_rotation(&mut pose.rotation, &twist.angular, dt);
    }
}

/// Rotate by world-frame angular velocity `omega` over `dt`:
/// `q(t+dt) = exp(omega * dt) * q(t)`, renormalized.
pub fn integrate_rotation(rotation: &mut UnitQuaternion<f64>, omega: &Vector3<f64>, dt: f64) {
    if omega.norm() < 1e-12 {
        return;
    }
    let delta = UnitQuaternion::from_scaled_axis(omega * dt);
    let mut q = delta * *rotation;
    q.renormalize();
    *rotation = q;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_free_fall_matches_closed_form_velocity() {
        let mut pose = Pose::identity();
        let mut twist = Twist::zero();
        let g = Vector3::new(0.0, -10.0, 0.0);
        let dt = 0.01;
        for _ in 0..100 {
            SemiImplicitEuler::integrate_velocity(&mut twist, g, Vector3::zeros(), dt);
            SemiImplicitEuler::integrate_position(&mut pose, &twist, dt);
        }
        assert_relative_eq!(twist.linear.y, -10.0, epsilon = 1e-9);
        // Semi-implicit Euler overshoots the exact -5 by g*dt*t/2.
        assert_relative_eq!(pose.position.y, -5.05, epsilon = 1e-9);
    }

    #[test]
    fn test_rotation_about_world_axis() {
        // Start rotated so local and world axes differ.
        let mut q = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        let omega = Vector3::new(0.0, PI, 0.0);
        for _ in 0..100 {
            integrate_rotation(&mut q, &omega, 0.005);
        }
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        assert!(q.angle_to(&expected) < 1e-9);
        assert_relative_eq!(q.quaternion().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_angular_velocity_is_noop() {
        let mut pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
        let before = pose;
        SemiImplicitEuler::integrate_position(&mut pose, &Twist::zero(), 0.1);
        assert_eq!(pose, before);
    }
}
