//! Sequential-impulse rows for contacts.
//!
//! Each contact point becomes one [`ContactConstraint`]: a non-penetration
//! row along the normal and two friction rows in the tangent plane. The
//! world's solver calls [`ContactConstraint::warm_start`] once, then
//! [`ContactConstraint::solve`] a fixed number of times, then writes the
//! accumulated impulses back with [`ContactConstraint::store`].
//!
//! # Normal row
//!
//! With `v_n = (v_A(r_A) - v_B(r_B)) · n` and `n` pointing from B towards A,
//! the row enforces `v_n ≥ target` where the target is the larger of
//!
//! - a Baumgarte push-out `erp/dt · (-(d + slop))` for penetrating points,
//!   or `-d/dt` for separated (speculative) points, and
//! - a restitution bounce `-e · v_n⁰` when the approach speed exceeds the
//!   threshold.
//!
//! The accumulated normal impulse is clamped to be non-negative.

use nalgebra::{Vector2, Vector3};
use rigid_types::{SolverBody, SolverConfig};

use crate::{ContactPoint, FrictionCone};

/// Material parameters of one contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactMaterial {
    /// Combined friction coefficient.
    pub friction: f64,
    /// Combined restitution coefficient.
    pub restitution: f64,
}

/// Prepared velocity constraint for one contact point.
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    r_a: Vector3<f64>,
    r_b: Vector3<f64>,
    normal: Vector3<f64>,
    tangents: [Vector3<f64>; 2],
    normal_mass: f64,
    tangent_mass: [f64; 2],
    target_velocity: f64,
    cone: FrictionCone,
    normal_impulse: f64,
    tangent_impulse: Vector2<f64>,
}

impl ContactConstraint {
    /// Build the rows for `point` between bodies `a` and `b`.
    #[must_use]
    pub fn prepare(
        point: &ContactPoint,
        a: &SolverBody,
        b: &SolverBody,
        material: ContactMaterial,
        config: &SolverConfig,
        dt: f64,
    ) -> Self {
        let normal = point.normal_on_b;
        let r_a = point.point_on_a - a.position;
        let r_b = point.point_on_b - b.position;
        let tangents = tangent_basis(&normal);

        let normal_mass = inverse_or_zero(effective_mass_denominator(a, b, &r_a, &r_b, &normal));
        let tangent_mass = [
            inverse_or_zero(effective_mass_denominator(a, b, &r_a, &r_b, &tangents[0])),
            inverse_or_zero(effective_mass_denominator(a, b, &r_a, &r_b, &tangents[1])),
        ];

        let approach = (a.velocity_at(&r_a) - b.velocity_at(&r_b)).dot(&normal);

        let position_target = if point.distance > 0.0 {
            -point.distance / dt
        } else {
            let excess = -(point.distance + config.penetration_slop);
            config.erp / dt * excess.max(0.0)
        };

        let mut target_velocity = position_target;
        if point.distance <= 0.0 && approach < -config.restitution_threshold {
            target_velocity = target_velocity.max(-material.restitution * approach);
        }

        let (normal_impulse, tangent_impulse) = if config.warm_starting {
            let f = config.warm_start_factor;
            (
                point.normal_impulse * f,
                Vector2::new(point.friction_impulse[0], point.friction_impulse[1]) * f,
            )
        } else {
            (0.0, Vector2::zeros())
        };

        Self {
            r_a,
            r_b,
            normal,
            tangents,
            normal_mass,
            tangent_mass,
            target_velocity,
            cone: FrictionCone::new(material.friction),
            normal_impulse,
            tangent_impulse,
        }
    }

    /// Apply the cached impulses from the previous step.
    pub fn warm_start(&self, a: &mut SolverBody, b: &mut SolverBody) {
        let impulse = self.normal * self.normal_impulse
            + self.tangents[0] * self.tangent_impulse.x
            + self.tangents[1] * self.tangent_impulse.y;
        a.apply_impulse(&impulse, &self.r_a);
        b.apply_impulse(&-impulse, &self.r_b);
    }

    /// One Gauss-Seidel pass over the friction and normal rows.
    pub fn solve(&mut self, a: &mut SolverBody, b: &mut SolverBody) {
        // Friction first, bounded by the current normal impulse.
        let v_rel = a.velocity_at(&self.r_a) - b.velocity_at(&self.r_b);
        let delta = Vector2::new(
            -v_rel.dot(&self.tangents[0]) * self.tangent_mass[0],
            -v_rel.dot(&self.tangents[1]) * self.tangent_mass[1],
        );
        let old = self.tangent_impulse;
        self.tangent_impulse = self.cone.project(old + delta, self.normal_impulse);
        let applied = self.tangent_impulse - old;
        let friction = self.tangents[0] * applied.x + self.tangents[1] * applied.y;
        a.apply_impulse(&friction, &self.r_a);
        b.apply_impulse(&-friction, &self.r_b);

        let v_rel = a.velocity_at(&self.r_a) - b.velocity_at(&self.r_b);
        let v_n = v_rel.dot(&self.normal);
        let lambda = -(v_n - self.target_velocity) * self.normal_mass;
        let old = self.normal_impulse;
        self.normal_impulse = (old + lambda).max(0.0);
        let impulse = self.normal * (self.normal_impulse - old);
        a.apply_impulse(&impulse, &self.r_a);
        b.apply_impulse(&-impulse, &self.r_b);
    }

    /// Write accumulated impulses back to the contact point.
    pub fn store(&self, point: &mut ContactPoint) {
        point.normal_impulse = self.normal_impulse;
        point.friction_impulse = [self.tangent_impulse.x, self.tangent_impulse.y];
    }

    /// Accumulated normal impulse.
    #[must_use]
    pub fn normal_impulse(&self) -> f64 {
        self.normal_impulse
    }
}

/// `1 / k` for the row along `dir`, where
/// `k = m_A⁻¹ + m_B⁻¹ + dir·((I_A⁻¹ (r_A × dir)) × r_A) + dir·((I_B⁻¹ (r_B × dir)) × r_B)`.
fn effective_mass_denominator(
    a: &SolverBody,
    b: &SolverBody,
    r_a: &Vector3<f64>,
    r_b: &Vector3<f64>,
    dir: &Vector3<f64>,
) -> f64 {
    let ra_n = r_a.cross(dir);
    let rb_n = r_b.cross(dir);
    a.inv_mass
        + b.inv_mass
        + ra_n.dot(&(a.inv_inertia_world * ra_n))
        + rb_n.dot(&(b.inv_inertia_world * rb_n))
}

fn inverse_or_zero(k: f64) -> f64 {
    if k > 1e-12 { 1.0 / k } else { 0.0 }
}

/// Two unit tangents spanning the plane orthogonal to `n`.
#[must_use]
pub fn tangent_basis(n: &Vector3<f64>) -> [Vector3<f64>; 2] {
    let t1 = if n.x.abs() > 0.577_35 {
        Vector3::new(n.y, -n.x, 0.0).normalize()
    } else {
        Vector3::new(0.0, n.z, -n.y).normalize()
    };
    let t2 = n.cross(&t1);
    [t1, t2]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use rigid_types::{MassProperties, Pose, Twist};

    fn falling_box(velocity: Vector3<f64>) -> SolverBody {
        let pose = Pose::from_position(Point3::new(0.0, 0.5, 0.0));
        let twist = Twist::new(velocity, Vector3::zeros());
        SolverBody::new(
            &pose,
            &twist,
            &MassProperties::box_shape(1.0, Vector3::repeat(0.5)),
        )
    }

    fn ground() -> SolverBody {
        SolverBody::fixed(&Pose::identity())
    }

    fn contact(distance: f64) -> ContactPoint {
        // A sits on top of B; the normal points up from B towards A.
        ContactPoint::new(
            Point3::new(0.0, 0.0, 0.0),
            Vector3::y(),
            distance,
            &Pose::from_position(Point3::new(0.0, 0.5, 0.0)),
            &Pose::identity(),
        )
    }

    #[test]
    fn test_tangent_basis_is_orthonormal() {
        for n in [Vector3::x(), Vector3::y(), Vector3::new(1.0, 2.0, -3.0).normalize()] {
            let [t1, t2] = tangent_basis(&n);
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
            assert!(t1.dot(&n).abs() < 1e-12);
            assert!(t2.dot(&n).abs() < 1e-12);
            assert!(t1.dot(&t2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_normal_row_stops_approach() {
        let mut a = falling_box(Vector3::new(0.0, -2.0, 0.0));
        let mut b = ground();
        let material = ContactMaterial {
            friction: 0.0,
            restitution: 0.0,
        };
        let config = SolverConfig::default();
        let mut row =
            ContactConstraint::prepare(&contact(0.0), &a, &b, material, &config, 1.0 / 60.0);

        for _ in 0..config.iterations {
            row.solve(&mut a, &mut b);
        }

        assert!(a.linear_velocity.y.abs() < 1e-9);
        assert!(row.normal_impulse() > 0.0);
        assert_eq!(b.linear_velocity, Vector3::zeros());
    }

    #[test]
    fn test_never_pulls_separating_bodies() {
        let mut a = falling_box(Vector3::new(0.0, 3.0, 0.0));
        let mut b = ground();
        let material = ContactMaterial {
            friction: 0.5,
            restitution: 0.0,
        };
        let mut row = ContactConstraint::prepare(
            &contact(-0.001),
            &a,
            &b,
            material,
            &SolverConfig::default(),
            1.0 / 60.0,
        );
        row.solve(&mut a, &mut b);
        assert_eq!(row.normal_impulse(), 0.0);
        assert_relative_eq!(a.linear_velocity.y, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_restitution_bounces() {
        let mut a = falling_box(Vector3::new(0.0, -4.0, 0.0));
        let mut b = ground();
        let material = ContactMaterial {
            friction: 0.0,
            restitution: 0.5,
        };
        let config = SolverConfig::default();
        let mut row =
            ContactConstraint::prepare(&contact(0.0), &a, &b, material, &config, 1.0 / 60.0);
        for _ in 0..config.iterations {
            row.solve(&mut a, &mut b);
        }
        assert_relative_eq!(a.linear_velocity.y, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_friction_bounded_by_cone() {
        let mut a = falling_box(Vector3::new(5.0, -1.0, 0.0));
        let mut b = ground();
        let material = ContactMaterial {
            friction: 0.2,
            restitution: 0.0,
        };
        let config = SolverConfig::default();
        let mut row =
            ContactConstraint::prepare(&contact(0.0), &a, &b, material, &config, 1.0 / 60.0);
        for _ in 0..config.iterations {
            row.solve(&mut a, &mut b);
        }

        let mut point = contact(0.0);
        row.store(&mut point);
        let tangential = Vector2::new(point.friction_impulse[0], point.friction_impulse[1]);
        assert!(tangential.norm() <= 0.2 * point.normal_impulse + 1e-9);
        // Still sliding, but slower.
        assert!(a.linear_velocity.x > 0.0 && a.linear_velocity.x < 5.0);
    }

    #[test]
    fn test_speculative_contact_allows_closing_the_gap() {
        let dt = 1.0 / 60.0;
        let mut a = falling_box(Vector3::new(0.0, -0.3, 0.0));
        let mut b = ground();
        let material = ContactMaterial {
            friction: 0.0,
            restitution: 0.0,
        };
        // Gap of 0.01 closes at 0.6 m/s; slower approach is untouched.
        let mut row = ContactConstraint::prepare(
            &contact(0.01),
            &a,
            &b,
            material,
            &SolverConfig::default(),
            dt,
        );
        row.solve(&mut a, &mut b);
        assert_relative_eq!(a.linear_velocity.y, -0.3, epsilon = 1e-12);
    }
}
