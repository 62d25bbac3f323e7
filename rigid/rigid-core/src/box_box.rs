//! Box-box contact generation by the separating axis test.
//!
//! Fifteen candidate axes are tested: the three face normals of each box and
//! the nine cross products of their edge directions. The axis of least
//! penetration (or largest separation) decides the contact type:
//!
//! - **Face contact**: the face of the other box most anti-parallel to the
//!   reference face is clipped against the reference face's side planes
//!   (Sutherland-Hodgman), giving up to eight points, reduced to four
//! - **Edge contact**: a single point at the closest approach of the two
//!   supporting edges
//!
//! Face axes are preferred over edge axes, and A's faces over B's, unless the
//! alternative is clearly better; this keeps the reference face stable from
//! step to step, which warm starting depends on.

use nalgebra::{Matrix3, Point3, Vector3};
use rigid_types::Pose;
use smallvec::SmallVec;

use crate::narrow_phase::ShapeContact;

const PARALLEL_EPSILON: f64 = 1e-6;
const RELATIVE_TOLERANCE: f64 = 0.98;
const ABSOLUTE_TOLERANCE: f64 = 0.001;

/// Contacts produced for one box pair.
pub type BoxContacts = SmallVec<[ShapeContact; 4]>;

#[derive(Debug, Clone, Copy)]
struct OrientedBox {
    center: Point3<f64>,
    axes: Matrix3<f64>,
    half: Vector3<f64>,
}

impl OrientedBox {
    fn new(pose: &Pose, half: &Vector3<f64>) -> Self {
        Self {
            center: pose.position,
            axes: pose.rotation.to_rotation_matrix().into_inner(),
            half: *half,
        }
    }

    fn axis(&self, i: usize) -> Vector3<f64> {
        self.axes.column(i).into_owned()
    }

    /// Half-width of the box projected on unit direction `n`.
    fn radius_along(&self, n: &Vector3<f64>) -> f64 {
        (0..3).map(|i| self.half[i] * self.axis(i).dot(n).abs()).sum()
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    FaceA(usize),
    FaceB(usize),
    Edge(usize, usize),
}

/// Contacts between box A (`half_a` at `pose_a`) and box B.
///
/// Nothing is returned when the boxes are separated by more than
/// `threshold`. Within the threshold, points carry a positive distance.
#[must_use]
pub fn box_box(
    half_a: &Vector3<f64>,
    pose_a: &Pose,
    half_b: &Vector3<f64>,
    pose_b: &Pose,
    threshold: f64,
) -> BoxContacts {
    let a = OrientedBox::new(pose_a, half_a);
    let b = OrientedBox::new(pose_b, half_b);
    let d = b.center - a.center;

    // Separation along `n` with `n` oriented from A towards B.
    let separation = |n: Vector3<f64>| -> (f64, Vector3<f64>) {
        let n = if d.dot(&n) < 0.0 { -n } else { n };
        (d.dot(&n) - a.radius_along(&n) - b.radius_along(&n), n)
    };

    let mut best_face_a = (f64::NEG_INFINITY, Vector3::zeros(), Axis::FaceA(0));
    for i in 0..3 {
        let (sep, n) = separation(a.axis(i));
        if sep > threshold {
            return BoxContacts::new();
        }
        if sep > best_face_a.0 {
            best_face_a = (sep, n, Axis::FaceA(i));
        }
    }

    let mut best_face_b = (f64::NEG_INFINITY, Vector3::zeros(), Axis::FaceB(0));
    for j in 0..3 {
        let (sep, n) = separation(b.axis(j));
        if sep > threshold {
            return BoxContacts::new();
        }
        if sep > best_face_b.0 {
            best_face_b = (sep, n, Axis::FaceB(j));
        }
    }

    let mut best_edge = (f64::NEG_INFINITY, Vector3::zeros(), Axis::Edge(0, 0));
    for i in 0..3 {
        for j in 0..3 {
            let cross = a.axis(i).cross(&b.axis(j));
            let len = cross.norm();
            if len < PARALLEL_EPSILON {
                continue;
            }
            let (sep, n) = separation(cross / len);
            if sep > threshold {
                return BoxContacts::new();
            }
            if sep > best_edge.0 {
                best_edge = (sep, n, Axis::Edge(i, j));
            }
        }
    }

    let mut best = best_face_a;
    if best_face_b.0 > RELATIVE_TOLERANCE * best.0 + ABSOLUTE_TOLERANCE {
        best = best_face_b;
    }
    if best_edge.0 > RELATIVE_TOLERANCE * best.0 + ABSOLUTE_TOLERANCE {
        best = best_edge;
    }

    let (sep, n, axis) = best;
    match axis {
        // Reference on A: B's incident points lie on B already.
        Axis::FaceA(i) => face_contact(&a, i, &n, &b, threshold)
            .into_iter()
            .map(|(p, distance)| ShapeContact {
                point_on_b: p,
                normal_on_b: -n,
                distance,
            })
            .collect(),
        // Reference on B: the normal from B towards A is `-n`; incident
        // points lie on A, so step back along the normal to reach B.
        Axis::FaceB(j) => {
            let normal_on_b = -n;
            face_contact(&b, j, &normal_on_b, &a, threshold)
                .into_iter()
                .map(|(p, distance)| ShapeContact {
                    point_on_b: p - normal_on_b * distance,
                    normal_on_b,
                    distance,
                })
                .collect()
        }
        Axis::Edge(i, j) => {
            let mut out = BoxContacts::new();
            out.push(edge_contact(&a, i, &b, j, &n, sep));
            out
        }
    }
}

/// Clip the incident face of `inc` against reference face `axis` of `reference`.
///
/// `n` is the reference face's outward normal (pointing at `inc`). Returns
/// points on the incident box with their signed distance to the reference
/// plane, at most four.
fn face_contact(
    reference: &OrientedBox,
    axis: usize,
    n: &Vector3<f64>,
    inc: &OrientedBox,
    threshold: f64,
) -> SmallVec<[(Point3<f64>, f64); 4]> {
    // Incident face: the face of `inc` most anti-parallel to `n`.
    let mut inc_axis = 0;
    let mut best_dot = 0.0;
    for k in 0..3 {
        let dot = inc.axis(k).dot(n);
        if dot.abs() > best_dot {
            best_dot = dot.abs();
            inc_axis = k;
        }
    }
    let inc_normal = {
        let v = inc.axis(inc_axis);
        if v.dot(n) > 0.0 { -v } else { v }
    };
    let inc_center = inc.center + inc_normal * inc.half[inc_axis];
    let (u, v) = other_axes(inc_axis);
    let du = inc.axis(u) * inc.half[u];
    let dv = inc.axis(v) * inc.half[v];
    let mut polygon: SmallVec<[Point3<f64>; 8]> = SmallVec::new();
    polygon.push(inc_center + du + dv);
    polygon.push(inc_center - du + dv);
    polygon.push(inc_center - du - dv);
    polygon.push(inc_center + du - dv);

    // Side planes of the reference face.
    let (s, t) = other_axes(axis);
    for side in [s, t] {
        let dir = reference.axis(side);
        let offset = dir.dot(&reference.center.coords);
        let half = reference.half[side];
        polygon = clip(&polygon, &dir, offset + half);
        polygon = clip(&polygon, &-dir, -offset + half);
        if polygon.is_empty() {
            return SmallVec::new();
        }
    }

    let face_point = reference.center + n * reference.half[axis];
    let candidates: SmallVec<[(Point3<f64>, f64); 8]> = polygon
        .into_iter()
        .map(|p| (p, n.dot(&(p - face_point))))
        .filter(|(_, distance)| *distance <= threshold)
        .collect();

    reduce(&candidates, n)
}

/// Keep points with `dir · p <= limit`, cutting edges that cross the plane.
fn clip(polygon: &[Point3<f64>], dir: &Vector3<f64>, limit: f64) -> SmallVec<[Point3<f64>; 8]> {
    let mut out = SmallVec::new();
    let count = polygon.len();
    for k in 0..count {
        let p = polygon[k];
        let q = polygon[(k + 1) % count];
        let dp = dir.dot(&p.coords) - limit;
        let dq = dir.dot(&q.coords) - limit;
        if dp <= 0.0 {
            out.push(p);
        }
        if (dp < 0.0 && dq > 0.0) || (dp > 0.0 && dq < 0.0) {
            let t = dp / (dp - dq);
            out.push(p + (q - p) * t);
        }
    }
    out
}

/// Pick at most four points: the deepest, the one farthest from it, then
/// the two that span the largest area on either side of that segment.
fn reduce(points: &[(Point3<f64>, f64)], n: &Vector3<f64>) -> SmallVec<[(Point3<f64>, f64); 4]> {
    if points.len() <= 4 {
        return points.iter().copied().collect();
    }

    let deepest = argmax(points, |_, (_, d)| -d);
    let p0 = points[deepest].0;
    let farthest = argmax(points, |_, (p, _)| (*p - p0).norm_squared());
    let p1 = points[farthest].0;
    let edge = p1 - p0;
    let signed_area = |p: &Point3<f64>| edge.cross(&(*p - p0)).dot(n);
    let left = argmax(points, |_, (p, _)| signed_area(p));
    let right = argmax(points, |_, (p, _)| -signed_area(p));

    let mut out = SmallVec::new();
    for index in [deepest, left, farthest, right] {
        let point = points[index].0;
        if !out.iter().any(|(p, _): &(Point3<f64>, f64)| *p == point) {
            out.push(points[index]);
        }
    }
    out
}

fn argmax<T, F: Fn(usize, &T) -> f64>(items: &[T], score: F) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, item) in items.iter().enumerate() {
        let s = score(i, item);
        if s > best_score {
            best_score = s;
            best = i;
        }
    }
    best
}

/// Closest approach of edge `i` of A and edge `j` of B, both chosen as the
/// edges supporting the boxes along the separating axis `n` (A towards B).
fn edge_contact(
    a: &OrientedBox,
    i: usize,
    b: &OrientedBox,
    j: usize,
    n: &Vector3<f64>,
    separation: f64,
) -> ShapeContact {
    let mut on_a = a.center;
    for k in 0..3 {
        if k != i {
            let axis = a.axis(k);
            on_a += axis * a.half[k].copysign(axis.dot(n));
        }
    }
    let mut on_b = b.center;
    for k in 0..3 {
        if k != j {
            let axis = b.axis(k);
            on_b -= axis * b.half[k].copysign(axis.dot(n));
        }
    }

    let d1 = a.axis(i);
    let d2 = b.axis(j);
    let r = on_a - on_b;
    let k = d1.dot(&d2);
    let c = d1.dot(&r);
    let f = d2.dot(&r);
    let denom = 1.0 - k * k;
    let s = if denom > PARALLEL_EPSILON {
        ((k * f - c) / denom).clamp(-a.half[i], a.half[i])
    } else {
        0.0
    };
    let t = (k * s + f).clamp(-b.half[j], b.half[j]);

    ShapeContact {
        point_on_b: on_b + d2 * t,
        normal_on_b: -n,
        distance: separation,
    }
}

fn other_axes(axis: usize) -> (usize, usize) {
    match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use std::f64::consts::{FRAC_PI_4, SQRT_2};

    fn ground() -> (Vector3<f64>, Pose) {
        (Vector3::new(10.0, 0.5, 10.0), Pose::identity())
    }

    #[test]
    fn test_resting_box_gets_four_corners() {
        let (gh, gp) = ground();
        let pose = Pose::from_position(Point3::new(0.0, 1.49, 0.0));
        let contacts = box_box(&Vector3::repeat(1.0), &pose, &gh, &gp, 0.02);

        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            assert_relative_eq!(c.normal_on_b, Vector3::y(), epsilon = 1e-12);
            assert_relative_eq!(c.distance, -0.01, epsilon = 1e-9);
            assert_relative_eq!(c.point_on_b.y, 0.5, epsilon = 1e-9);
            assert_relative_eq!(c.point_on_b.x.abs(), 1.0, epsilon = 1e-9);
            assert_relative_eq!(c.point_on_b.z.abs(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_swapped_roles_flip_normal() {
        let (gh, gp) = ground();
        let pose = Pose::from_position(Point3::new(0.0, 1.49, 0.0));
        let contacts = box_box(&gh, &gp, &Vector3::repeat(1.0), &pose, 0.02);

        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            assert_relative_eq!(c.normal_on_b, -Vector3::y(), epsilon = 1e-12);
            assert_relative_eq!(c.distance, -0.01, epsilon = 1e-9);
            // On the small box's bottom face.
            assert_relative_eq!(c.point_on_b.y, 0.49, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_separation_threshold() {
        let (gh, gp) = ground();
        let far = Pose::from_position(Point3::new(0.0, 1.6, 0.0));
        assert!(box_box(&Vector3::repeat(1.0), &far, &gh, &gp, 0.02).is_empty());

        let near = Pose::from_position(Point3::new(0.0, 1.51, 0.0));
        let contacts = box_box(&Vector3::repeat(1.0), &near, &gh, &gp, 0.02);
        assert_eq!(contacts.len(), 4);
        assert!(contacts.iter().all(|c| c.distance > 0.0));
    }

    #[test]
    fn test_tilted_box_clips_to_edge() {
        let (gh, gp) = ground();
        // Rolled about Z so one bottom edge dips below the ground.
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.1);
        let right: Vector3<f64> = rotation * Vector3::new(1.0, -1.0, 0.0);
        let left: Vector3<f64> = rotation * Vector3::new(-1.0, -1.0, 0.0);
        let lowest = right.y.min(left.y);
        let pose =
            Pose::from_position_rotation(Point3::new(0.0, 0.5 - lowest - 0.01, 0.0), rotation);
        let contacts = box_box(&Vector3::repeat(1.0), &pose, &gh, &gp, 0.02);

        let penetrating: Vec<_> = contacts.iter().filter(|c| c.distance < 0.0).collect();
        assert_eq!(penetrating.len(), 2);
        for c in penetrating {
            assert_relative_eq!(c.distance, -0.01, epsilon = 1e-6);
            assert_relative_eq!(c.normal_on_b, Vector3::y(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_crossed_edges() {
        let half = Vector3::repeat(1.0);
        let depth = 0.1;
        let a = Pose::from_position_rotation(
            Point3::new(0.0, 2.0 * SQRT_2 - depth, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_4),
        );
        let b = Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_4),
        );
        let contacts = box_box(&half, &a, &half, &b, 0.02);

        assert_eq!(contacts.len(), 1);
        let c = contacts[0];
        assert_relative_eq!(c.normal_on_b, Vector3::y(), epsilon = 1e-9);
        assert_relative_eq!(c.distance, -depth, epsilon = 1e-9);
        assert_relative_eq!(c.point_on_b, Point3::new(0.0, SQRT_2, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_reduce_keeps_deepest_and_spread() {
        let n = Vector3::y();
        let points: Vec<(Point3<f64>, f64)> = (0..8)
            .map(|k| {
                let angle = f64::from(k) * FRAC_PI_4;
                (Point3::new(angle.cos(), 0.0, angle.sin()), if k == 3 { -0.2 } else { -0.1 })
            })
            .collect();
        let kept = reduce(&points, &n);
        assert_eq!(kept.len(), 4);
        assert!(kept.iter().any(|(_, d)| *d == -0.2));
    }
}
