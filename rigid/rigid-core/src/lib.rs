//! Rigid-body world: shape registry, body store, collision pipeline and
//! sequential-impulse solver.
//!
//! A [`World`] owns shapes, bodies and constraints and hands out stable
//! handles for them. Each call to [`World::step`] runs one or more fixed
//! sub-steps through the pipeline below, after which the penetrating
//! contacts of the last sub-step can be read with [`World::contacts`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          World                              │
//! │  ShapeRegistry · bodies · constraints · StepClock           │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ step(dt, max_sub_steps)
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Per sub-step                                               │
//! │  forces → velocities                                        │
//! │  BroadPhase (dynamic AABB tree)  → candidate pairs          │
//! │  NarrowPhase (analytic + GJK/EPA) → ContactManifolds        │
//! │  SequentialImpulseSolver (contacts + Hinge/Hinge2 rows)     │
//! │  velocities → poses, sleep bookkeeping                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use rigid_core::World;
//! use nalgebra::{Point3, Vector3};
//!
//! let mut world = World::default();
//!
//! let ground = world.create_box(Vector3::new(50.0, 1.0, 50.0)).unwrap();
//! let ball = world.create_sphere(0.5).unwrap();
//! world.create_body(ground, 0.0, Point3::new(0.0, -1.0, 0.0)).unwrap();
//! let body = world.create_body(ball, 1.0, Point3::new(0.0, 2.0, 0.0)).unwrap();
//! world.set_rotation_euler(body, 0.0, 0.3, 0.0).unwrap();
//!
//! for _ in 0..120 {
//!     world.step(1.0 / 60.0, 4).unwrap();
//! }
//!
//! // The ball rests on the ground.
//! let y = world.position(body).unwrap().y;
//! assert!((y - 0.5).abs() < 0.05);
//! for contact in world.contacts() {
//!     assert!(contact.distance < 0.0);
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/rigid-core/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,       // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,           // mul_add style changes aren't always clearer
    clippy::neg_cmp_op_on_partial_ord,  // !(x >= 0.0) is intentional for NaN rejection
    clippy::too_many_lines,             // Physics functions naturally have many steps
    clippy::doc_markdown,               // Not all technical terms need backticks
    clippy::cast_precision_loss,        // usize to f64 is fine for counts
    clippy::missing_errors_doc,         // Errors are documented on the error type
)]

// Collision detection
pub mod box_box;
pub mod broad_phase;
pub mod bvh;
pub mod gjk_epa;
pub mod narrow_phase;

// Dynamics
pub mod integrators;
mod solver;

// World and its stores
mod body;
mod shape;
mod stepper;
mod world;

pub use body::Body;
pub use broad_phase::{Aabb, BroadPhase};
pub use narrow_phase::{NarrowPhase, ShapeContact};
pub use shape::ShapeRegistry;
pub use solver::{SequentialImpulseSolver, SolverStats};
pub use stepper::{StepClock, StepPlan};
pub use world::World;

// Re-export the handle, shape and config types callers need
pub use rigid_types::{
    ActivationState, BodyId, ConstraintId, CylinderAxis, EulerAngles, MassProperties, Pose,
    Result, RigidError, Shape, ShapeId, ShapeType, SleepConfig, SolverConfig, Twist, WorldConfig,
};

pub use rigid_contact::{ContactManifold, ContactPoint, ContactReport, ContactReports};

pub use rigid_constraint::{Constraint, ConstraintKind, ConstraintParam, Hinge, Hinge2};
