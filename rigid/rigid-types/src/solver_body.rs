//! Velocity-level view of a body used by the impulse solvers.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

use crate::{MassProperties, Pose, Twist};

/// Snapshot of the quantities a velocity constraint needs from one body.
///
/// Contact and joint rows read positions from here and write velocity
/// changes back through [`SolverBody::apply_impulse`]. A body with zero
/// inverse mass and inertia acts as an immovable anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverBody {
    /// Center of mass in world coordinates.
    pub position: Point3<f64>,
    /// World orientation.
    pub rotation: UnitQuaternion<f64>,
    /// Linear velocity (m/s).
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity (rad/s, world frame).
    pub angular_velocity: Vector3<f64>,
    /// Inverse mass, zero when immovable.
    pub inv_mass: f64,
    /// Inverse inertia tensor in world coordinates.
    pub inv_inertia_world: Matrix3<f64>,
}

impl SolverBody {
    /// Build from a pose, velocity and mass properties.
    #[must_use]
    pub fn new(pose: &Pose, twist: &Twist, mass: &MassProperties) -> Self {
        let r = pose.rotation.to_rotation_matrix().into_inner();
        let inv_local = Matrix3::from_diagonal(&mass.inverse_inertia());
        Self {
            position: pose.position,
            rotation: pose.rotation,
            linear_velocity: twist.linear,
            angular_velocity: twist.angular,
            inv_mass: mass.inverse_mass(),
            inv_inertia_world: r * inv_local * r.transpose(),
        }
    }

    /// An immovable anchor at `pose` with zero velocity.
    #[must_use]
    pub fn fixed(pose: &Pose) -> Self {
        Self {
            position: pose.position,
            rotation: pose.rotation,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            inv_mass: 0.0,
            inv_inertia_world: Matrix3::zeros(),
        }
    }

    /// Whether impulses have any effect on this body.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.inv_mass == 0.0 && self.inv_inertia_world.iter().all(|x| *x == 0.0)
    }

    /// Velocity of the material point at offset `r` from the center of mass.
    #[must_use]
    pub fn velocity_at(&self, r: &Vector3<f64>) -> Vector3<f64> {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Apply a linear impulse at offset `r` from the center of mass.
    pub fn apply_impulse(&mut self, impulse: &Vector3<f64>, r: &Vector3<f64>) {
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia_world * r.cross(impulse);
    }

    /// Apply a pure angular impulse.
    pub fn apply_angular_impulse(&mut self, impulse: &Vector3<f64>) {
        self.angular_velocity += self.inv_inertia_world * impulse;
    }

    /// Current velocities as a [`Twist`].
    #[must_use]
    pub fn twist(&self) -> Twist {
        Twist::new(self.linear_velocity, self.angular_velocity)
    }
}
