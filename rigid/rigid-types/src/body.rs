//! Rigid body state types.
//!
//! Poses, velocities, mass properties, and activation states for bodies
//! living in a world.

use nalgebra::{Isometry3, Matrix4, Point3, Translation3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::RigidError;

/// Unique identifier for a rigid body in a world.
///
/// IDs are issued by the owning world and never reused, so a handle to a
/// deleted body stays invalid instead of aliasing a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for BodyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Position and orientation of a rigid body.
///
/// # Example
///
/// ```
/// use rigid_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates (meters).
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Identity pose at the origin.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose at a position with identity rotation.
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose from position and rotation.
    #[must_use]
    pub fn from_position_rotation(position: Point3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    /// Convert from an nalgebra isometry.
    #[must_use]
    pub fn from_isometry(iso: Isometry3<f64>) -> Self {
        Self {
            position: Point3::from(iso.translation.vector),
            rotation: iso.rotation,
        }
    }

    /// Convert to an nalgebra isometry.
    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position.coords), self.rotation)
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Rotate a vector from local to world coordinates.
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Rotate a vector from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * world
    }

    /// Inverse of this pose.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            position: Point3::from(rotation * -self.position.coords),
            rotation,
        }
    }

    /// Compose two poses: `self * other` maps `other`'s local frame through `self`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// Column-major 4x4 homogeneous matrix, laid out the way `OpenGL` expects.
    #[must_use]
    pub fn to_opengl_matrix(&self) -> [f64; 16] {
        let m: Matrix4<f64> = self.to_isometry().to_homogeneous();
        let mut out = [0.0; 16];
        out.copy_from_slice(m.as_slice());
        out
    }

    /// Check that all components are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity of the center of mass (m/s, world frame).
    pub linear: Vector3<f64>,
    /// Angular velocity (rad/s, world frame).
    pub angular: Vector3<f64>,
}

impl Twist {
    /// Create a twist from linear and angular components.
    #[must_use]
    pub fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Zero velocity.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Velocity of a point at `offset` from the center of mass.
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }

    /// Linear speed.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.linear.norm()
    }

    /// Angular speed.
    #[must_use]
    pub fn angular_speed(&self) -> f64 {
        self.angular.norm()
    }

    /// Check that all components are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }
}

/// Mass and diagonal inertia of a body, expressed in its local frame.
///
/// A mass of zero marks a static body: both inverses are zero and nothing
/// moves it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total mass (kg). Zero for static bodies.
    pub mass: f64,
    /// Principal moments of inertia about the local axes (kg·m²).
    pub inertia: Vector3<f64>,
}

impl MassProperties {
    /// Mass properties of a static, immovable body.
    #[must_use]
    pub fn fixed() -> Self {
        Self {
            mass: 0.0,
            inertia: Vector3::zeros(),
        }
    }

    /// Create mass properties from a mass and diagonal inertia.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] if the mass is negative or any
    /// value is non-finite.
    pub fn new(mass: f64, inertia: Vector3<f64>) -> crate::Result<Self> {
        let props = Self { mass, inertia };
        props.validate()?;
        Ok(props)
    }

    /// Solid sphere: `I = 2/5 m r²`.
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            inertia: Vector3::new(i, i, i),
        }
    }

    /// Solid box given its half-extents.
    #[must_use]
    pub fn box_shape(mass: f64, half_extents: Vector3<f64>) -> Self {
        let lx = 2.0 * half_extents.x;
        let ly = 2.0 * half_extents.y;
        let lz = 2.0 * half_extents.z;
        let k = mass / 12.0;
        Self {
            mass,
            inertia: Vector3::new(
                k * (ly * ly + lz * lz),
                k * (lx * lx + lz * lz),
                k * (lx * lx + ly * ly),
            ),
        }
    }

    /// Solid cylinder whose axis is local axis `axis` (0 = X, 1 = Y, 2 = Z).
    #[must_use]
    pub fn cylinder(mass: f64, radius: f64, half_length: f64, axis: usize) -> Self {
        let length = 2.0 * half_length;
        let along = 0.5 * mass * radius * radius;
        let across = mass * (3.0 * radius * radius + length * length) / 12.0;
        let mut inertia = Vector3::new(across, across, across);
        inertia[axis.min(2)] = along;
        Self { mass, inertia }
    }

    /// Whether this body is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.mass == 0.0
    }

    /// Inverse mass, zero for static bodies.
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.mass > 0.0 { 1.0 / self.mass } else { 0.0 }
    }

    /// Component-wise inverse inertia. Zero moments stay zero, locking that axis.
    #[must_use]
    pub fn inverse_inertia(&self) -> Vector3<f64> {
        if self.is_static() {
            return Vector3::zeros();
        }
        self.inertia.map(|i| if i > 0.0 { 1.0 / i } else { 0.0 })
    }

    /// Validate mass properties.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] for negative or non-finite values.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.mass.is_finite() || self.mass < 0.0 {
            return Err(RigidError::degenerate(format!(
                "mass must be finite and non-negative, got {}",
                self.mass
            )));
        }
        if self.inertia.iter().any(|i| !i.is_finite() || *i < 0.0) {
            return Err(RigidError::degenerate(format!(
                "inertia must be finite and non-negative, got {:?}",
                self.inertia
            )));
        }
        Ok(())
    }
}

/// Activation state of a body.
///
/// Sleeping bodies are skipped by integration and the solver until something
/// wakes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActivationState {
    /// Simulated, and may fall asleep when slow for long enough.
    #[default]
    Active,
    /// Asleep; woken by contact with an awake body or by user input.
    Sleeping,
    /// Simulated and never put to sleep.
    AlwaysActive,
    /// Never simulated until the state is changed.
    AlwaysInactive,
}

impl ActivationState {
    /// Whether the body takes part in integration this step.
    #[must_use]
    pub fn is_awake(self) -> bool {
        matches!(self, Self::Active | Self::AlwaysActive)
    }

    /// Whether automatic sleeping applies.
    #[must_use]
    pub fn can_sleep(self) -> bool {
        matches!(self, Self::Active)
    }
}
