//! GJK (Gilbert-Johnson-Keerthi) and EPA (Expanding Polytope Algorithm).
//!
//! The narrow phase falls back to these for every convex pair without an
//! analytic routine (anything involving a cylinder).
//!
//! # Algorithm Overview
//!
//! ## GJK
//!
//! GJK works on the Minkowski difference `A - B` of two convex shapes, which
//! contains the origin exactly when the shapes overlap. It grows a simplex
//! (point, segment, triangle, tetrahedron) from support points, each time
//! keeping the feature closest to the origin, until the simplex encloses the
//! origin or a support point fails to pass it.
//!
//! ## EPA
//!
//! Starting from GJK's enclosing tetrahedron, EPA expands a polytope inside
//! the Minkowski difference until its face nearest the origin lies on the
//! boundary. That face gives the penetration normal and depth; barycentric
//! coordinates of the origin's projection on it, applied to the original
//! support points, give the witness points on each shape.
//!
//! # Normal Convention
//!
//! [`GjkContact::normal_on_b`] points from B towards A, matching
//! [`rigid_contact::ContactPoint`].
//!
//! # References
//!
//! - Gilbert, Johnson, Keerthi: "A Fast Procedure for Computing the Distance
//!   Between Complex Objects in Three-Dimensional Space" (1988)
//! - van den Bergen: "Collision Detection in Interactive 3D Environments" (2003)

use nalgebra::{Point3, Vector3};
use rigid_types::{Pose, Shape};
use tracing::warn;

/// Tolerance for numerical comparisons in GJK/EPA.
const EPSILON: f64 = 1e-8;

/// Maximum iterations for GJK before giving up.
const GJK_MAX_ITERATIONS: usize = 64;

/// Maximum iterations for EPA before giving up.
const EPA_MAX_ITERATIONS: usize = 64;

/// Maximum faces in EPA polytope.
const EPA_MAX_FACES: usize = 128;

/// EPA convergence tolerance.
const EPA_TOLERANCE: f64 = 1e-6;

/// Contact information from GJK+EPA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GjkContact {
    /// Deepest point of A inside B, world space.
    pub point_on_a: Point3<f64>,
    /// Deepest point of B inside A, world space.
    pub point_on_b: Point3<f64>,
    /// Unit normal pointing from B towards A.
    pub normal_on_b: Vector3<f64>,
    /// Penetration depth, non-negative.
    pub penetration: f64,
}

impl GjkContact {
    /// Signed distance in the contact convention (negative when overlapping).
    #[must_use]
    pub fn distance(&self) -> f64 {
        -self.penetration
    }
}

/// A point in Minkowski space, with support points from both shapes.
#[derive(Debug, Clone, Copy, Default)]
struct MinkowskiPoint {
    point: Point3<f64>,
    support_a: Point3<f64>,
    support_b: Point3<f64>,
}

impl MinkowskiPoint {
    fn new(support_a: Point3<f64>, support_b: Point3<f64>) -> Self {
        Self {
            point: Point3::from(support_a - support_b),
            support_a,
            support_b,
        }
    }
}

/// A simplex used in GJK iteration, newest point first.
#[derive(Debug, Clone, Default)]
struct Simplex {
    points: [MinkowskiPoint; 4],
    size: usize,
}

impl Simplex {
    fn push(&mut self, point: MinkowskiPoint) {
        for i in (1..=self.size.min(3)).rev() {
            self.points[i] = self.points[i - 1];
        }
        self.points[0] = point;
        self.size = (self.size + 1).min(4);
    }

    fn len(&self) -> usize {
        self.size
    }

    fn points(&self) -> &[MinkowskiPoint] {
        &self.points[..self.size]
    }

    fn set(&mut self, points: &[MinkowskiPoint]) {
        self.size = points.len().min(4);
        for (i, p) in points.iter().take(4).enumerate() {
            self.points[i] = *p;
        }
    }
}

// =============================================================================
// Support Functions
// =============================================================================

/// World-space support point of a primitive placed at `pose`.
///
/// Compounds have no support mapping and return the pose origin; the narrow
/// phase expands them into their children before reaching this point.
#[must_use]
pub fn support(shape: &Shape, pose: &Pose, direction: &Vector3<f64>) -> Point3<f64> {
    let local_dir = pose.inverse_transform_vector(direction);
    shape
        .local_support(&local_dir)
        .map_or(pose.position, |p| pose.transform_point(&p))
}

fn support_minkowski(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    direction: &Vector3<f64>,
) -> MinkowskiPoint {
    MinkowskiPoint::new(
        support(shape_a, pose_a, direction),
        support(shape_b, pose_b, &-direction),
    )
}

// =============================================================================
// GJK Algorithm
// =============================================================================

/// Whether two convex primitives overlap.
#[must_use]
pub fn gjk_intersection(shape_a: &Shape, pose_a: &Pose, shape_b: &Shape, pose_b: &Pose) -> bool {
    gjk(shape_a, pose_a, shape_b, pose_b).is_some()
}

/// Run GJK; returns the enclosing simplex when the shapes overlap.
fn gjk(shape_a: &Shape, pose_a: &Pose, shape_b: &Shape, pose_b: &Pose) -> Option<Simplex> {
    let offset = pose_b.position - pose_a.position;
    let mut direction = if offset.norm() < EPSILON {
        Vector3::x()
    } else {
        offset.normalize()
    };

    let mut simplex = Simplex::default();
    let first = support_minkowski(shape_a, pose_a, shape_b, pose_b, &direction);
    simplex.push(first);
    direction = -first.point.coords;

    for _ in 0..GJK_MAX_ITERATIONS {
        if direction.norm_squared() < EPSILON * EPSILON {
            // Origin lies on the simplex: touching.
            return Some(simplex);
        }
        direction = direction.normalize();

        let next = support_minkowski(shape_a, pose_a, shape_b, pose_b, &direction);
        if next.point.coords.dot(&direction) < -EPSILON {
            return None;
        }

        simplex.push(next);
        if do_simplex(&mut simplex, &mut direction) {
            return Some(simplex);
        }
    }

    None
}

/// Reduce the simplex to the feature nearest the origin and update the
/// search direction. Returns true once the origin is enclosed.
fn do_simplex(simplex: &mut Simplex, direction: &mut Vector3<f64>) -> bool {
    match simplex.len() {
        2 => do_simplex_line(simplex, direction),
        3 => do_simplex_triangle(simplex, direction),
        4 => do_simplex_tetrahedron(simplex, direction),
        _ => false,
    }
}

fn do_simplex_line(simplex: &mut Simplex, direction: &mut Vector3<f64>) -> bool {
    let a = simplex.points[0].point;
    let b = simplex.points[1].point;
    let ab = b - a;
    let ao = -a.coords;

    if ab.dot(&ao) > 0.0 {
        *direction = triple_product(&ab, &ao, &ab);
    } else {
        simplex.set(&[simplex.points[0]]);
        *direction = ao;
    }
    false
}

fn do_simplex_triangle(simplex: &mut Simplex, direction: &mut Vector3<f64>) -> bool {
    let a = simplex.points[0].point;
    let b = simplex.points[1].point;
    let c = simplex.points[2].point;

    let ab = b - a;
    let ac = c - a;
    let ao = -a.coords;
    let abc = ab.cross(&ac);

    if abc.cross(&ac).dot(&ao) > 0.0 {
        if ac.dot(&ao) > 0.0 {
            simplex.set(&[simplex.points[0], simplex.points[2]]);
            *direction = triple_product(&ac, &ao, &ac);
        } else {
            reduce_to_edge_ab(simplex, direction, &ab, &ao);
        }
    } else if ab.cross(&abc).dot(&ao) > 0.0 {
        reduce_to_edge_ab(simplex, direction, &ab, &ao);
    } else if abc.dot(&ao) > 0.0 {
        *direction = abc;
    } else {
        // Below the triangle: flip winding so the normal faces the origin.
        simplex.set(&[simplex.points[0], simplex.points[2], simplex.points[1]]);
        *direction = -abc;
    }
    false
}

fn reduce_to_edge_ab(
    simplex: &mut Simplex,
    direction: &mut Vector3<f64>,
    ab: &Vector3<f64>,
    ao: &Vector3<f64>,
) {
    if ab.dot(ao) > 0.0 {
        simplex.set(&[simplex.points[0], simplex.points[1]]);
        *direction = triple_product(ab, ao, ab);
    } else {
        simplex.set(&[simplex.points[0]]);
        *direction = *ao;
    }
}

fn do_simplex_tetrahedron(simplex: &mut Simplex, direction: &mut Vector3<f64>) -> bool {
    let a = simplex.points[0].point;
    let b = simplex.points[1].point;
    let c = simplex.points[2].point;
    let d = simplex.points[3].point;

    let ab = b - a;
    let ac = c - a;
    let ad = d - a;
    let ao = -a.coords;

    let abc = ab.cross(&ac);
    let acd = ac.cross(&ad);
    let adb = ad.cross(&ab);

    if abc.dot(&ao) > 0.0 {
        simplex.set(&[simplex.points[0], simplex.points[1], simplex.points[2]]);
        return do_simplex_triangle(simplex, direction);
    }
    if acd.dot(&ao) > 0.0 {
        simplex.set(&[simplex.points[0], simplex.points[2], simplex.points[3]]);
        return do_simplex_triangle(simplex, direction);
    }
    if adb.dot(&ao) > 0.0 {
        simplex.set(&[simplex.points[0], simplex.points[3], simplex.points[1]]);
        return do_simplex_triangle(simplex, direction);
    }
    true
}

/// Triple product: (A × B) × C = B(A·C) - A(B·C).
#[inline]
fn triple_product(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> Vector3<f64> {
    b * a.dot(c) - a * b.dot(c)
}

// =============================================================================
// EPA Algorithm
// =============================================================================

#[derive(Debug, Clone)]
struct EpaFace {
    vertices: [usize; 3],
    /// Outward unit normal.
    normal: Vector3<f64>,
    /// Distance from the origin along the normal.
    distance: f64,
}

/// Closest boundary face of the Minkowski difference.
struct EpaResult {
    face: EpaFace,
    converged: bool,
}

fn epa(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    simplex: &Simplex,
) -> Option<(Vec<MinkowskiPoint>, EpaResult)> {
    let mut vertices = simplex.points().to_vec();
    if vertices.len() < 4 {
        expand_to_tetrahedron(shape_a, pose_a, shape_b, pose_b, &mut vertices);
        if vertices.len() < 4 {
            return None;
        }
    }

    let mut faces: Vec<EpaFace> = Vec::with_capacity(EPA_MAX_FACES);
    for indices in [[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]] {
        if let Some(face) = create_face(&vertices, indices) {
            faces.push(face);
        }
    }
    fix_face_orientations(&vertices, &mut faces);

    for _ in 0..EPA_MAX_ITERATIONS {
        let closest = faces[find_closest_face(&faces)?].clone();

        let next = support_minkowski(shape_a, pose_a, shape_b, pose_b, &closest.normal);
        let next_distance = next.point.coords.dot(&closest.normal);
        if next_distance - closest.distance < EPA_TOLERANCE {
            return Some((
                vertices,
                EpaResult {
                    face: closest,
                    converged: true,
                },
            ));
        }

        let next_index = vertices.len();
        vertices.push(next);

        // Remove every face that sees the new vertex, keep its horizon.
        let mut edges: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;
        while i < faces.len() {
            let face = &faces[i];
            let to_new = next.point - vertices[face.vertices[0]].point;
            if face.normal.dot(&to_new) > 0.0 {
                let v = face.vertices;
                add_edge(&mut edges, v[0], v[1]);
                add_edge(&mut edges, v[1], v[2]);
                add_edge(&mut edges, v[2], v[0]);
                faces.swap_remove(i);
            } else {
                i += 1;
            }
        }

        for (v1, v2) in edges {
            if let Some(face) = create_face(&vertices, [next_index, v1, v2]) {
                faces.push(face);
            }
        }

        if faces.len() > EPA_MAX_FACES {
            break;
        }
    }

    let face = faces[find_closest_face(&faces)?].clone();
    Some((
        vertices,
        EpaResult {
            face,
            converged: false,
        },
    ))
}

/// Add support points along the coordinate axes until four distinct
/// vertices exist.
fn expand_to_tetrahedron(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    vertices: &mut Vec<MinkowskiPoint>,
) {
    let search_dirs = [
        Vector3::x(),
        Vector3::y(),
        Vector3::z(),
        -Vector3::x(),
        -Vector3::y(),
        -Vector3::z(),
    ];

    for dir in &search_dirs {
        if vertices.len() >= 4 {
            break;
        }
        let candidate = support_minkowski(shape_a, pose_a, shape_b, pose_b, dir);
        let distinct = vertices
            .iter()
            .all(|v| (v.point - candidate.point).norm() > EPSILON);
        if !distinct {
            continue;
        }
        // Reject points that would leave the tetrahedron flat.
        let flat = match vertices.len() {
            2 => (vertices[1].point - vertices[0].point)
                .cross(&(candidate.point - vertices[0].point))
                .norm()
                < EPSILON,
            3 => {
                let n = (vertices[1].point - vertices[0].point)
                    .cross(&(vertices[2].point - vertices[0].point));
                n.dot(&(candidate.point - vertices[0].point)).abs() < EPSILON
            }
            _ => false,
        };
        if !flat {
            vertices.push(candidate);
        }
    }
}

fn create_face(vertices: &[MinkowskiPoint], indices: [usize; 3]) -> Option<EpaFace> {
    let a = vertices[indices[0]].point;
    let b = vertices[indices[1]].point;
    let c = vertices[indices[2]].point;

    let normal = (b - a).cross(&(c - a));
    let norm = normal.norm();
    if norm < EPSILON {
        return None;
    }
    let normal = normal / norm;
    Some(EpaFace {
        vertices: indices,
        normal,
        distance: a.coords.dot(&normal),
    })
}

/// Flip faces whose normal points at the polytope's centroid.
fn fix_face_orientations(vertices: &[MinkowskiPoint], faces: &mut [EpaFace]) {
    #[allow(clippy::cast_precision_loss)]
    let centroid: Vector3<f64> = vertices
        .iter()
        .map(|v| v.point.coords)
        .sum::<Vector3<f64>>()
        / vertices.len() as f64;

    for face in faces.iter_mut() {
        let to_centroid = centroid - vertices[face.vertices[0]].point.coords;
        if face.normal.dot(&to_centroid) > 0.0 {
            face.normal = -face.normal;
            face.distance = -face.distance;
            face.vertices.swap(1, 2);
        }
    }
}

fn find_closest_face(faces: &[EpaFace]) -> Option<usize> {
    faces
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.distance.abs().total_cmp(&b.distance.abs()))
        .map(|(i, _)| i)
}

/// Toggle an edge in the horizon list: shared edges cancel out.
fn add_edge(edges: &mut Vec<(usize, usize)>, v1: usize, v2: usize) {
    let existing = edges
        .iter()
        .position(|&(a, b)| (a == v2 && b == v1) || (a == v1 && b == v2));
    if let Some(index) = existing {
        edges.swap_remove(index);
    } else {
        edges.push((v1, v2));
    }
}

/// Barycentric coordinates of `p` projected onto triangle `abc`.
fn barycentric(p: &Vector3<f64>, a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> [f64; 3] {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < EPSILON * EPSILON {
        return [1.0, 0.0, 0.0];
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    [1.0 - v - w, v, w]
}

// =============================================================================
// High-Level API
// =============================================================================

/// Penetration contact between two convex primitives.
///
/// Returns `None` when the shapes are separated or the polytope degenerates.
#[must_use]
pub fn gjk_epa_contact(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
) -> Option<GjkContact> {
    let simplex = gjk(shape_a, pose_a, shape_b, pose_b)?;
    let (vertices, result) = epa(shape_a, pose_a, shape_b, pose_b, &simplex)?;
    if !result.converged {
        warn!(
            faces = EPA_MAX_FACES,
            depth = result.face.distance,
            "EPA did not converge, using best face"
        );
    }

    let face = &result.face;
    let [i, j, k] = face.vertices;
    let projected = face.normal * face.distance;
    let w = barycentric(
        &projected,
        &vertices[i].point.coords,
        &vertices[j].point.coords,
        &vertices[k].point.coords,
    );
    let blend = |f: fn(&MinkowskiPoint) -> Point3<f64>| {
        let [a, b, c] = [i, j, k].map(|n| f(&vertices[n]).coords);
        Point3::from(a * w[0] + b * w[1] + c * w[2])
    };

    Some(GjkContact {
        point_on_a: blend(|v| v.support_a),
        point_on_b: blend(|v| v.support_b),
        normal_on_b: -face.normal,
        penetration: face.distance.max(0.0),
    })
}

// =============================================================================
// Tests
// =============================================================================
