//! Rigid bodies as stored by the world.

use nalgebra::{Matrix3, Point3, Vector3};
use rigid_types::{
    ActivationState, BodyId, MassProperties, Pose, ShapeId, SleepConfig, SolverBody, Twist,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rigid body.
///
/// Mass 0 makes the body static: it never moves, and impulses and velocity
/// writes are ignored.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    /// Handle of this body.
    pub id: BodyId,
    /// Collision shape.
    pub shape: ShapeId,
    /// World pose.
    pub pose: Pose,
    /// World-frame velocities.
    pub twist: Twist,
    /// Mass and diagonal inertia.
    pub mass: MassProperties,
    /// Friction coefficient.
    pub friction: f64,
    /// Restitution coefficient.
    pub restitution: f64,
    /// Activation state.
    pub activation: ActivationState,
    /// Time spent below the sleep thresholds (s).
    pub sleep_timer: f64,
    /// Force accumulated since the last sub-step.
    pub force: Vector3<f64>,
    /// Torque accumulated since the last sub-step.
    pub torque: Vector3<f64>,
    /// Whether the body takes part in simulation.
    pub in_world: bool,
}

impl Body {
    /// Create an active body with identity rotation.
    #[must_use]
    pub fn new(
        id: BodyId,
        shape: ShapeId,
        mass: MassProperties,
        position: Point3<f64>,
        friction: f64,
        restitution: f64,
    ) -> Self {
        Self {
            id,
            shape,
            pose: Pose::from_position(position),
            twist: Twist::zero(),
            mass,
            friction,
            restitution,
            activation: ActivationState::Active,
            sleep_timer: 0.0,
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            in_world: true,
        }
    }

    /// Whether the body has zero mass.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.mass.is_static()
    }

    /// Whether the body is integrated this step.
    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.activation.is_awake()
    }

    /// Whether the body moves at all: in the world, dynamic and awake.
    #[must_use]
    pub fn is_simulated(&self) -> bool {
        self.in_world && !self.is_static() && self.is_awake()
    }

    /// Whether the body counts as immovable for pair filtering.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.is_static() || self.activation == ActivationState::AlwaysInactive
    }

    /// World-frame inverse inertia tensor.
    #[must_use]
    pub fn inverse_inertia_world(&self) -> Matrix3<f64> {
        let r = self.pose.rotation.to_rotation_matrix().into_inner();
        r * Matrix3::from_diagonal(&self.mass.inverse_inertia()) * r.transpose()
    }

    /// Apply an instantaneous impulse at a world point and wake the body.
    pub fn apply_impulse(&mut self, impulse: &Vector3<f64>, world_point: &Point3<f64>) {
        if self.is_static() {
            return;
        }
        let r = world_point - self.pose.position;
        self.twist.linear += impulse * self.mass.inverse_mass();
        self.twist.angular += self.inverse_inertia_world() * r.cross(impulse);
        self.wake_up();
    }

    /// Accumulate a torque for the next sub-step.
    pub fn apply_torque(&mut self, torque: &Vector3<f64>) {
        if self.is_static() {
            return;
        }
        self.torque += torque;
        self.wake_up();
    }

    /// Accumulate a force through the center of mass for the next sub-step.
    pub fn apply_force(&mut self, force: &Vector3<f64>) {
        if self.is_static() {
            return;
        }
        self.force += force;
        self.wake_up();
    }

    /// Drop accumulated force and torque.
    pub fn clear_forces(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }

    /// Linear and angular acceleration from gravity and accumulated loads.
    #[must_use]
    pub fn accelerations(&self, gravity: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
        let linear = gravity + self.force * self.mass.inverse_mass();
        let angular = self.inverse_inertia_world() * self.torque;
        (linear, angular)
    }

    /// Wake a sleeping body. `AlwaysInactive` bodies stay inactive.
    pub fn wake_up(&mut self) {
        if self.activation == ActivationState::Sleeping {
            self.activation = ActivationState::Active;
        }
        self.sleep_timer = 0.0;
    }

    /// Put the body to sleep and stop it.
    pub fn put_to_sleep(&mut self) {
        self.activation = ActivationState::Sleeping;
        self.twist = Twist::zero();
    }

    /// Advance the sleep timer. Returns `true` if the body fell asleep.
    pub fn update_sleep(&mut self, config: &SleepConfig, dt: f64) -> bool {
        if !config.enabled || !self.activation.can_sleep() || self.is_static() {
            self.sleep_timer = 0.0;
            return false;
        }
        if self.twist.speed() < config.linear_threshold
            && self.twist.angular_speed() < config.angular_threshold
        {
            self.sleep_timer += dt;
        } else {
            self.sleep_timer = 0.0;
        }
        if self.sleep_timer >= config.time_to_sleep {
            self.put_to_sleep();
            return true;
        }
        false
    }

    /// Solver view of this body. Bodies that do not move are fixed anchors.
    #[must_use]
    pub fn solver_body(&self) -> SolverBody {
        if self.is_simulated() {
            SolverBody::new(&self.pose, &self.twist, &self.mass)
        } else {
            SolverBody::fixed(&self.pose)
        }
    }

    /// `½ m v² + ½ ωᵀ I ω`, with `I` taken in the body frame.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        if self.is_static() {
            return 0.0;
        }
        let omega_local = self.pose.rotation.inverse() * self.twist.angular;
        let rotational: f64 = omega_local
            .iter()
            .zip(self.mass.inertia.iter())
            .map(|(w, i)| i * w * w)
            .sum();
        0.5 * self.mass.mass * self.twist.linear.norm_squared() + 0.5 * rotational
    }

    /// Linear momentum `m v`.
    #[must_use]
    pub fn linear_momentum(&self) -> Vector3<f64> {
        self.twist.linear * self.mass.mass
    }
}
