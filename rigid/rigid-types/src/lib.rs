//! Core types for the rigid-body world.
//!
//! This crate holds the plain data shared by every layer of the engine:
//!
//! - [`ShapeId`], [`BodyId`], [`ConstraintId`] - Stable handles, never reused
//! - [`Shape`] - Box, sphere, axis-aligned cylinder, and compound geometry
//! - [`Pose`], [`Twist`], [`MassProperties`] - Body state
//! - [`EulerAngles`] - The one yaw/pitch/roll convention used everywhere
//! - [`WorldConfig`], [`SolverConfig`], [`SleepConfig`] - Tunables
//! - [`RigidError`] - The error type for every fallible operation
//!
//! # Design Philosophy
//!
//! These types are **pure data**. No collision detection, no solving, no
//! integration lives here; `rigid-contact`, `rigid-constraint` and
//! `rigid-core` build on them.
//!
//! # Coordinate System
//!
//! - Y: up (default gravity is `(0, -10, 0)`)
//! - Right-handed
//! - Quaternions are nalgebra `UnitQuaternion<f64>`; the `(x, y, z, w)`
//!   components are available through `.coords`
//!
//! # Example
//!
//! ```
//! use rigid_types::{EulerAngles, MassProperties, Pose, Shape};
//! use nalgebra::{Point3, Vector3};
//!
//! let shape = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0)).unwrap();
//! let props = shape.mass_properties(12.0).unwrap();
//! assert!((props.inertia.x - 8.0).abs() < 1e-12);
//!
//! let tilted = Pose::from_position_rotation(
//!     Point3::new(0.0, 2.0, 0.0),
//!     EulerAngles::new(0.5, 0.0, 0.0).to_quaternion(),
//! );
//! assert!(tilted.is_finite());
//! ```

#![doc(html_root_url = "https://docs.rs/rigid-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod constraint;
mod error;
mod euler;
mod shape;
mod solver_body;

pub use body::{ActivationState, BodyId, MassProperties, Pose, Twist};
pub use config::{SleepConfig, SolverConfig, WorldConfig};
pub use constraint::ConstraintId;
pub use error::RigidError;
pub use euler::EulerAngles;
pub use shape::{CompoundChild, CylinderAxis, Shape, ShapeId, ShapeType};
pub use solver_body::SolverBody;

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};

/// Result type for world operations.
pub type Result<T> = std::result::Result<T, RigidError>;
