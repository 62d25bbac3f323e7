//! Coulomb friction cone and material combination rules.
//!
//! The friction impulse at a contact is constrained to lie within a cone:
//!
//! ```text
//! |λ_t| ≤ μ * λ_n
//! ```
//!
//! The solver accumulates the two tangential impulses separately and then
//! projects the pair back onto the circular cone.

use nalgebra::Vector2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Friction cone for a single contact.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrictionCone {
    /// Coulomb friction coefficient.
    pub mu: f64,
}

impl FrictionCone {
    /// Create a new friction cone with the given coefficient.
    #[must_use]
    pub fn new(mu: f64) -> Self {
        Self { mu: mu.max(0.0) }
    }

    /// Create a frictionless cone (μ = 0).
    #[must_use]
    pub fn frictionless() -> Self {
        Self { mu: 0.0 }
    }

    /// Project a tangential impulse onto the cone for the given normal impulse.
    #[must_use]
    pub fn project(&self, tangent: Vector2<f64>, normal_magnitude: f64) -> Vector2<f64> {
        if normal_magnitude <= 0.0 || self.mu <= 0.0 {
            return Vector2::zeros();
        }

        let max_friction = self.mu * normal_magnitude;
        let magnitude = tangent.norm();

        if magnitude <= max_friction {
            tangent
        } else {
            tangent * (max_friction / magnitude)
        }
    }

    /// Check if a tangential impulse is within the cone.
    #[must_use]
    pub fn contains(&self, tangent: &Vector2<f64>, normal_magnitude: f64) -> bool {
        if normal_magnitude <= 0.0 {
            return tangent.norm() < 1e-10;
        }
        tangent.norm() <= self.mu * normal_magnitude + 1e-10
    }

    /// Largest tangential impulse allowed for a normal impulse.
    #[must_use]
    pub fn max_friction(&self, normal_magnitude: f64) -> f64 {
        self.mu * normal_magnitude.max(0.0)
    }
}

/// Upper bound on combined friction.
pub const MAX_COMBINED_FRICTION: f64 = 10.0;

/// Friction coefficient for a pair of bodies: the product, capped.
#[must_use]
pub fn combine_friction(a: f64, b: f64) -> f64 {
    (a * b).clamp(0.0, MAX_COMBINED_FRICTION)
}

/// Restitution coefficient for a pair of bodies: the product.
#[must_use]
pub fn combine_restitution(a: f64, b: f64) -> f64 {
    a * b
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_inside_cone() {
        let cone = FrictionCone::new(0.5);
        let t = Vector2::new(0.3, 0.0);
        assert_eq!(cone.project(t, 1.0), t);
        assert!(cone.contains(&t, 1.0));
    }

    #[test]
    fn test_project_onto_boundary() {
        let cone = FrictionCone::new(0.5);
        let projected = cone.project(Vector2::new(3.0, 4.0), 2.0);
        assert_relative_eq!(projected.norm(), 1.0, epsilon = 1e-12);
        // Direction is preserved.
        assert_relative_eq!(projected.x / projected.y, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_no_normal_no_friction() {
        let cone = FrictionCone::new(1.0);
        assert_eq!(cone.project(Vector2::new(1.0, 1.0), 0.0), Vector2::zeros());
        assert_eq!(FrictionCone::frictionless().max_friction(10.0), 0.0);
        assert_eq!(FrictionCone::new(-1.0).mu, 0.0);
    }

    #[test]
    fn test_combination_rules() {
        assert_relative_eq!(combine_friction(0.5, 0.5), 0.25);
        assert_eq!(combine_friction(100.0, 1.0), MAX_COMBINED_FRICTION);
        assert_relative_eq!(combine_restitution(0.5, 0.8), 0.4);
    }
}
