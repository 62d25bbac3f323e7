//! Velocity rows shared by all joints.
//!
//! A joint is lowered into a [`JointRows`] once per step: an optional 3x3
//! point-to-point block followed by scalar [`Row`]s. Each scalar row has a
//! Jacobian `J`, a target velocity, softness and impulse bounds, and is
//! solved with projected Gauss-Seidel:
//!
//! ```text
//! Δλ = (rhs - J·v - cfm·λ) / (J M⁻¹ Jᵀ + cfm)
//! λ  = clamp(λ + Δλ, lower, upper)
//! ```

use nalgebra::{Matrix3, Point3, Vector3};
use rigid_types::SolverBody;

use crate::LimitState;

/// Rows whose effective mass is below this are dropped.
const MIN_EFFECTIVE_MASS_INV: f64 = 1e-12;

/// Jacobian of a scalar row.
///
/// The constrained velocity is
/// `linear · (v_A - v_B) + angular_a · ω_A + angular_b · ω_B`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jacobian {
    /// Linear direction (applied positively to A, negatively to B).
    pub linear: Vector3<f64>,
    /// Angular part on A.
    pub angular_a: Vector3<f64>,
    /// Angular part on B.
    pub angular_b: Vector3<f64>,
}

impl Jacobian {
    /// Relative velocity along `direction` of two points at offsets `r_a`
    /// and `r_b` from the bodies' centers of mass.
    #[must_use]
    pub fn linear(direction: Vector3<f64>, r_a: &Vector3<f64>, r_b: &Vector3<f64>) -> Self {
        Self {
            linear: direction,
            angular_a: r_a.cross(&direction),
            angular_b: -r_b.cross(&direction),
        }
    }

    /// Relative angular velocity `(ω_A - ω_B) · axis`.
    #[must_use]
    pub fn angular(axis: Vector3<f64>) -> Self {
        Self {
            linear: Vector3::zeros(),
            angular_a: axis,
            angular_b: -axis,
        }
    }

    /// `J · v`.
    #[must_use]
    pub fn velocity(&self, a: &SolverBody, b: &SolverBody) -> f64 {
        self.linear.dot(&(a.linear_velocity - b.linear_velocity))
            + self.angular_a.dot(&a.angular_velocity)
            + self.angular_b.dot(&b.angular_velocity)
    }

    /// `J M⁻¹ Jᵀ`.
    #[must_use]
    pub fn effective_mass_inv(&self, a: &SolverBody, b: &SolverBody) -> f64 {
        self.linear.norm_squared() * (a.inv_mass + b.inv_mass)
            + self.angular_a.dot(&(a.inv_inertia_world * self.angular_a))
            + self.angular_b.dot(&(b.inv_inertia_world * self.angular_b))
    }

    /// Apply `Jᵀ λ` to both bodies.
    pub fn apply(&self, a: &mut SolverBody, b: &mut SolverBody, lambda: f64) {
        a.linear_velocity += self.linear * (lambda * a.inv_mass);
        a.apply_angular_impulse(&(self.angular_a * lambda));
        b.linear_velocity -= self.linear * (lambda * b.inv_mass);
        b.apply_angular_impulse(&(self.angular_b * lambda));
    }
}

/// One scalar velocity constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    jacobian: Jacobian,
    inv_effective_mass: f64,
    rhs: f64,
    cfm: f64,
    lower: f64,
    upper: f64,
    impulse: f64,
}

impl Row {
    /// Build a row, or `None` if neither body can respond to it.
    #[must_use]
    pub fn new(
        jacobian: Jacobian,
        a: &SolverBody,
        b: &SolverBody,
        rhs: f64,
        cfm: f64,
        bounds: (f64, f64),
    ) -> Option<Self> {
        let k = jacobian.effective_mass_inv(a, b) + cfm;
        if k <= MIN_EFFECTIVE_MASS_INV {
            return None;
        }
        Some(Self {
            jacobian,
            inv_effective_mass: 1.0 / k,
            rhs,
            cfm,
            lower: bounds.0,
            upper: bounds.1,
            impulse: 0.0,
        })
    }

    /// One projected Gauss-Seidel update.
    pub fn solve(&mut self, a: &mut SolverBody, b: &mut SolverBody) {
        let cdot = self.jacobian.velocity(a, b);
        let delta = (self.rhs - cdot - self.cfm * self.impulse) * self.inv_effective_mass;
        let next = (self.impulse + delta).clamp(self.lower, self.upper);
        let applied = next - self.impulse;
        self.impulse = next;
        self.jacobian.apply(a, b, applied);
    }

    /// Accumulated impulse.
    #[must_use]
    pub fn impulse(&self) -> f64 {
        self.impulse
    }
}

/// Coincident-point constraint solved as one 3x3 block.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRow {
    r_a: Vector3<f64>,
    r_b: Vector3<f64>,
    mass: Matrix3<f64>,
    target: Vector3<f64>,
    cfm: f64,
    impulse: Vector3<f64>,
}

impl PointRow {
    /// Keep `pivot_a` (on A) and `pivot_b` (on B) together.
    ///
    /// Returns `None` when the block is singular, which only happens when
    /// both bodies are immovable.
    #[must_use]
    pub fn new(
        a: &SolverBody,
        b: &SolverBody,
        pivot_a: &Point3<f64>,
        pivot_b: &Point3<f64>,
        erp: f64,
        cfm: f64,
        dt: f64,
    ) -> Option<Self> {
        let r_a = pivot_a - a.position;
        let r_b = pivot_b - b.position;
        let ra_x = r_a.cross_matrix();
        let rb_x = r_b.cross_matrix();

        let k = Matrix3::identity() * (a.inv_mass + b.inv_mass + cfm)
            - ra_x * a.inv_inertia_world * ra_x
            - rb_x * b.inv_inertia_world * rb_x;
        let mass = k.try_inverse()?;

        let target = if dt > 0.0 {
            (pivot_b - pivot_a) * (erp / dt)
        } else {
            Vector3::zeros()
        };

        Some(Self {
            r_a,
            r_b,
            mass,
            target,
            cfm,
            impulse: Vector3::zeros(),
        })
    }

    /// One block Gauss-Seidel update.
    pub fn solve(&mut self, a: &mut SolverBody, b: &mut SolverBody) {
        let cdot = a.velocity_at(&self.r_a) - b.velocity_at(&self.r_b);
        let lambda = self.mass * (self.target - cdot - self.impulse * self.cfm);
        self.impulse += lambda;
        a.apply_impulse(&lambda, &self.r_a);
        b.apply_impulse(&-lambda, &self.r_b);
    }

    /// Accumulated impulse.
    #[must_use]
    pub fn impulse(&self) -> Vector3<f64> {
        self.impulse
    }
}

/// Error reduction and softness for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Softness {
    /// Fraction of the position error corrected per step.
    pub erp: f64,
    /// Constraint force mixing.
    pub cfm: f64,
}

impl Softness {
    fn bias_rate(&self, dt: f64) -> f64 {
        if dt > 0.0 { self.erp / dt } else { 0.0 }
    }
}

/// Row enforcing a limit, or `None` when the position is inside the range.
///
/// `jacobian` must measure the rate of the limited coordinate. Locked limits
/// use `lock`; one-sided limits use `stop` and may only push back inside.
#[must_use]
pub fn limit_row(
    jacobian: Jacobian,
    a: &SolverBody,
    b: &SolverBody,
    state: LimitState,
    lock: Softness,
    stop: Softness,
    dt: f64,
) -> Option<Row> {
    match state {
        LimitState::Free => None,
        LimitState::Locked(error) => Row::new(
            jacobian,
            a,
            b,
            -lock.bias_rate(dt) * error,
            lock.cfm,
            (f64::NEG_INFINITY, f64::INFINITY),
        ),
        LimitState::AtLower(depth) => Row::new(
            jacobian,
            a,
            b,
            stop.bias_rate(dt) * depth,
            stop.cfm,
            (0.0, f64::INFINITY),
        ),
        LimitState::AtUpper(depth) => Row::new(
            jacobian,
            a,
            b,
            -stop.bias_rate(dt) * depth,
            stop.cfm,
            (f64::NEG_INFINITY, 0.0),
        ),
    }
}

/// All rows of one joint for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointRows {
    point: Option<PointRow>,
    rows: Vec<Row>,
}

impl JointRows {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the point-to-point block.
    pub fn set_point(&mut self, point: Option<PointRow>) {
        self.point = point;
    }

    /// Append a scalar row if it was buildable.
    pub fn push(&mut self, row: Option<Row>) {
        if let Some(row) = row {
            self.rows.push(row);
        }
    }

    /// Number of scalar rows, plus three for the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len() + if self.point.is_some() { 3 } else { 0 }
    }

    /// Whether nothing is constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar rows in solve order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// One pass over every row.
    pub fn solve(&mut self, a: &mut SolverBody, b: &mut SolverBody) {
        if let Some(point) = &mut self.point {
            point.solve(a, b);
        }
        for row in &mut self.rows {
            row.solve(a, b);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rigid_types::{MassProperties, Pose, Twist};

    fn unit_sphere_at(x: f64, velocity: Vector3<f64>) -> SolverBody {
        SolverBody::new(
            &Pose::from_position(Point3::new(x, 0.0, 0.0)),
            &Twist::new(velocity, Vector3::zeros()),
            &MassProperties::sphere(1.0, 0.5),
        )
    }

    #[test]
    fn test_linear_row_stops_relative_motion() {
        let mut a = unit_sphere_at(0.0, Vector3::new(1.0, 0.0, 0.0));
        let mut b = SolverBody::fixed(&Pose::identity());
        let j = Jacobian::linear(Vector3::x(), &Vector3::zeros(), &Vector3::zeros());
        let mut row = Row::new(j, &a, &b, 0.0, 0.0, (f64::NEG_INFINITY, f64::INFINITY)).unwrap();

        row.solve(&mut a, &mut b);
        assert_relative_eq!(a.linear_velocity.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(row.impulse(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bounds_clamp_impulse() {
        let mut a = unit_sphere_at(0.0, Vector3::new(0.0, 0.0, 0.0));
        a.angular_velocity = Vector3::new(0.0, 0.0, 10.0);
        let mut b = SolverBody::fixed(&Pose::identity());
        let j = Jacobian::angular(Vector3::z());
        let mut row = Row::new(j, &a, &b, 0.0, 0.0, (-0.01, 0.01)).unwrap();

        row.solve(&mut a, &mut b);
        assert_relative_eq!(row.impulse(), -0.01, epsilon = 1e-12);
        // I = 0.1, so Δω = -0.1
        assert_relative_eq!(a.angular_velocity.z, 9.9, epsilon = 1e-12);
    }

    #[test]
    fn test_fixed_pair_builds_nothing() {
        let a = SolverBody::fixed(&Pose::identity());
        let b = SolverBody::fixed(&Pose::identity());
        let twist = Jacobian::angular(Vector3::x());
        assert!(Row::new(twist, &a, &b, 0.0, 0.0, (0.0, 1.0)).is_none());
        let pivot = Point3::origin();
        assert!(PointRow::new(&a, &b, &pivot, &pivot, 0.2, 0.0, 0.01).is_none());
    }

    #[test]
    fn test_point_row_cancels_relative_velocity() {
        let mut a = unit_sphere_at(0.0, Vector3::new(0.0, 1.0, 0.0));
        let mut b = unit_sphere_at(2.0, Vector3::new(0.0, -1.0, 0.0));
        let pivot = Point3::new(1.0, 0.0, 0.0);
        let mut point = PointRow::new(&a, &b, &pivot, &pivot, 0.2, 0.0, 0.01).unwrap();

        point.solve(&mut a, &mut b);
        let r_a = pivot - a.position;
        let r_b = pivot - b.position;
        let rel = a.velocity_at(&r_a) - b.velocity_at(&r_b);
        assert_relative_eq!(rel.norm(), 0.0, epsilon = 1e-10);
        // Momentum is conserved.
        let momentum = a.linear_velocity + b.linear_velocity;
        assert_relative_eq!(momentum.norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_lower_limit_only_pushes_inside() {
        let mut a = unit_sphere_at(0.0, Vector3::zeros());
        a.angular_velocity = Vector3::new(0.0, 0.0, 1.0);
        let mut b = SolverBody::fixed(&Pose::identity());
        let soft = Softness { erp: 0.2, cfm: 0.0 };

        // Already moving back inside: the row must not pull.
        let mut row = limit_row(
            Jacobian::angular(Vector3::z()),
            &a,
            &b,
            LimitState::AtLower(0.0),
            soft,
            soft,
            0.01,
        )
        .unwrap();
        row.solve(&mut a, &mut b);
        assert_eq!(row.impulse(), 0.0);
        assert_relative_eq!(a.angular_velocity.z, 1.0, epsilon = 1e-12);

        let free = limit_row(
            Jacobian::angular(Vector3::z()),
            &a,
            &b,
            LimitState::Free,
            soft,
            soft,
            0.01,
        );
        assert!(free.is_none());
    }

    #[test]
    fn test_locked_limit_corrects_error() {
        let mut a = unit_sphere_at(0.0, Vector3::zeros());
        let mut b = SolverBody::fixed(&Pose::identity());
        let soft = Softness { erp: 0.5, cfm: 0.0 };
        let mut row = limit_row(
            Jacobian::angular(Vector3::z()),
            &a,
            &b,
            LimitState::Locked(0.1),
            soft,
            soft,
            0.1,
        )
        .unwrap();
        row.solve(&mut a, &mut b);
        // Drive the coordinate back at erp/dt * error = 0.5 rad/s.
        assert_relative_eq!(a.angular_velocity.z, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_joint_rows_len() {
        let a = unit_sphere_at(0.0, Vector3::zeros());
        let b = SolverBody::fixed(&Pose::identity());
        let mut rows = JointRows::new();
        assert!(rows.is_empty());
        let pivot = Point3::origin();
        rows.set_point(PointRow::new(&a, &b, &pivot, &pivot, 0.2, 0.0, 0.01));
        let twist = Jacobian::angular(Vector3::x());
        rows.push(Row::new(twist, &a, &b, 0.0, 0.0, (0.0, 1.0)));
        rows.push(None);
        assert_eq!(rows.len(), 4);
    }
}
