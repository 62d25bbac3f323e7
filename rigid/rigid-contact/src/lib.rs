//! Contact manifolds, friction, and contact impulse rows.
//!
//! This crate sits between collision detection and the world's solver:
//!
//! - [`ContactPoint`] / [`ContactManifold`] - Persistent per-pair contact
//!   caches, refreshed every step and capped at four points
//! - [`FrictionCone`] - Coulomb cone projection for friction impulses
//! - [`ContactConstraint`] - Normal and friction rows for the
//!   sequential-impulse solver
//! - [`ContactReport`] / [`ContactReports`] - What callers see after a step
//!
//! # Conventions
//!
//! Every point satisfies
//!
//! ```text
//! point_on_a = point_on_b + normal_on_b * distance
//! ```
//!
//! with `normal_on_b` pointing from B towards A and a negative `distance`
//! meaning the bodies overlap. Only overlapping points are ever reported.
//!
//! # Example
//!
//! ```
//! use rigid_contact::{ContactManifold, ContactPoint, ContactReports};
//! use rigid_types::{BodyId, Pose};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut manifold = ContactManifold::new(BodyId::new(1), BodyId::new(2));
//! let pose = Pose::identity();
//! let point = ContactPoint::new(Point3::origin(), Vector3::y(), -0.01, &pose, &pose);
//! manifold.add_point(point, 0.02);
//!
//! let manifolds = [manifold];
//! let reports: Vec<_> = ContactReports::new(&manifolds).collect();
//! assert_eq!(reports.len(), 1);
//! assert!(reports[0].distance < 0.0);
//! ```

#![doc(html_root_url = "https://docs.rs/rigid-contact/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod contact;
mod friction;
mod report;
mod solver;

pub use contact::{ContactManifold, ContactPoint, MAX_MANIFOLD_POINTS};
pub use friction::{FrictionCone, MAX_COMBINED_FRICTION, combine_friction, combine_restitution};
pub use report::{ContactReport, ContactReports};
pub use solver::{ContactConstraint, ContactMaterial, tangent_basis};

// Re-export types needed for contact computation
pub use rigid_types::{BodyId, Pose, SolverBody};
