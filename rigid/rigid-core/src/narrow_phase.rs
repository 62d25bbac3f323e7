//! Narrow phase: exact contacts for the pairs the broad phase reports.
//!
//! Shape pairs are dispatched on their kinds:
//!
//! | Pair              | Routine                           | Points |
//! |-------------------|-----------------------------------|--------|
//! | sphere - sphere   | [`sphere_sphere`]                 | 1      |
//! | sphere - box      | [`sphere_box`] (sides swapped as needed) | 1 |
//! | box - box         | [`box_box`](crate::box_box::box_box) | up to 4 |
//! | anything else     | [`gjk_epa_contact`]               | 1      |
//! | compound - any    | recurse per child                 | -      |
//!
//! Analytic routines regenerate the whole manifold each step. GJK/EPA only
//! finds one point per call, so those pairs keep a persistent manifold that
//! is refreshed against the new poses and grows one point per step.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use rigid_contact::{ContactManifold, ContactPoint, MAX_MANIFOLD_POINTS};
use rigid_types::{BodyId, Pose, Shape};
use smallvec::SmallVec;
use tracing::trace;

use crate::body::Body;
use crate::box_box::box_box;
use crate::gjk_epa::gjk_epa_contact;
use crate::shape::ShapeRegistry;

/// A raw contact between two shapes, before it is tied to bodies.
///
/// Same convention as [`ContactPoint`]: the normal points from B towards A
/// and `point_on_a = point_on_b + normal_on_b * distance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeContact {
    /// Contact point on shape B, world space.
    pub point_on_b: Point3<f64>,
    /// Unit normal from B towards A.
    pub normal_on_b: Vector3<f64>,
    /// Signed separation, negative when overlapping.
    pub distance: f64,
}

impl ShapeContact {
    /// Contact point on shape A, world space.
    #[must_use]
    pub fn point_on_a(&self) -> Point3<f64> {
        self.point_on_b + self.normal_on_b * self.distance
    }

    /// The same contact seen with A and B exchanged.
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            point_on_b: self.point_on_a(),
            normal_on_b: -self.normal_on_b,
            distance: self.distance,
        }
    }
}

type Contacts = SmallVec<[ShapeContact; 8]>;

// =============================================================================
// Analytic routines
// =============================================================================

/// Contact between two spheres, if closer than `threshold`.
#[must_use]
pub fn sphere_sphere(
    radius_a: f64,
    center_a: &Point3<f64>,
    radius_b: f64,
    center_b: &Point3<f64>,
    threshold: f64,
) -> Option<ShapeContact> {
    let delta = center_a - center_b;
    let len = delta.norm();
    let distance = len - radius_a - radius_b;
    if distance > threshold {
        return None;
    }
    // Coincident centers: any direction works, pick up.
    let normal = if len > 1e-12 { delta / len } else { Vector3::y() };
    Some(ShapeContact {
        point_on_b: center_b + normal * radius_b,
        normal_on_b: normal,
        distance,
    })
}

/// Contact between sphere A and box B, if closer than `threshold`.
#[must_use]
pub fn sphere_box(
    radius: f64,
    center: &Point3<f64>,
    half_extents: &Vector3<f64>,
    box_pose: &Pose,
    threshold: f64,
) -> Option<ShapeContact> {
    let local = box_pose.inverse_transform_point(center);
    let closest = Point3::from(local.coords.zip_map(half_extents, |c, h| c.clamp(-h, h)));
    let delta = local - closest;
    let len = delta.norm();

    let (point, normal, distance) = if len > 1e-12 {
        (closest, delta / len, len - radius)
    } else {
        // Center inside the box: push out through the nearest face.
        let (axis, depth) = (0..3)
            .map(|i| (i, half_extents[i] - local[i].abs()))
            .min_by(|x, y| x.1.total_cmp(&y.1))?;
        let sign = if local[axis] < 0.0 { -1.0 } else { 1.0 };
        let mut normal = Vector3::zeros();
        normal[axis] = sign;
        let mut point = local;
        point[axis] = sign * half_extents[axis];
        (point, normal, -(depth + radius))
    };

    if distance > threshold {
        return None;
    }
    Some(ShapeContact {
        point_on_b: box_pose.transform_point(&point),
        normal_on_b: box_pose.transform_vector(&normal),
        distance,
    })
}

// =============================================================================
// Dispatch
// =============================================================================

/// Collide two shapes, appending contacts to `out`.
///
/// Returns `true` if any primitive pair went through GJK/EPA.
fn collide(
    registry: &ShapeRegistry,
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    threshold: f64,
    out: &mut Contacts,
) -> bool {
    if let Shape::Compound { children } = shape_a {
        let mut incremental = false;
        for child in children {
            if let Some(child_shape) = registry.get(child.shape) {
                let pose = pose_a.compose(&child.local);
                incremental |= collide(
                    registry,
                    child_shape,
                    &pose,
                    shape_b,
                    pose_b,
                    threshold,
                    out,
                );
            }
        }
        return incremental;
    }
    if let Shape::Compound { children } = shape_b {
        let mut incremental = false;
        for child in children {
            if let Some(child_shape) = registry.get(child.shape) {
                let pose = pose_b.compose(&child.local);
                incremental |= collide(
                    registry,
                    shape_a,
                    pose_a,
                    child_shape,
                    &pose,
                    threshold,
                    out,
                );
            }
        }
        return incremental;
    }

    match (shape_a, shape_b) {
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            out.extend(sphere_sphere(*ra, &pose_a.position, *rb, &pose_b.position, threshold));
            false
        }
        (Shape::Sphere { radius }, Shape::Box { half_extents }) => {
            out.extend(sphere_box(*radius, &pose_a.position, half_extents, pose_b, threshold));
            false
        }
        (Shape::Box { half_extents }, Shape::Sphere { radius }) => {
            out.extend(
                sphere_box(*radius, &pose_b.position, half_extents, pose_a, threshold)
                    .map(|c| c.swapped()),
            );
            false
        }
        (Shape::Box { half_extents: ha }, Shape::Box { half_extents: hb }) => {
            out.extend(box_box(ha, pose_a, hb, pose_b, threshold));
            false
        }
        _ => {
            if let Some(c) = gjk_epa_contact(shape_a, pose_a, shape_b, pose_b) {
                out.push(ShapeContact {
                    point_on_b: c.point_on_b,
                    normal_on_b: c.normal_on_b,
                    distance: c.distance(),
                });
            }
            true
        }
    }
}

// =============================================================================
// Manifold cache
// =============================================================================

/// Persistent contact manifolds, one per touching body pair.
///
/// Manifolds are kept sorted by `(body_a, body_b)`; a pair missing from an
/// update loses its manifold.
#[derive(Debug, Clone, Default)]
pub struct NarrowPhase {
    manifolds: Vec<ContactManifold>,
}

impl NarrowPhase {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current manifolds, sorted by body pair.
    #[must_use]
    pub fn manifolds(&self) -> &[ContactManifold] {
        &self.manifolds
    }

    /// Mutable access for the solver to store impulses.
    pub fn manifolds_mut(&mut self) -> &mut [ContactManifold] {
        &mut self.manifolds
    }

    /// Total number of cached points.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.manifolds.iter().map(ContactManifold::len).sum()
    }

    /// Regenerate manifolds for `pairs`.
    ///
    /// Each pair must be ordered with the smaller handle first. Points further
    /// apart than `threshold` are dropped.
    pub fn update(
        &mut self,
        pairs: &[(BodyId, BodyId)],
        bodies: &HashMap<BodyId, Body>,
        registry: &ShapeRegistry,
        threshold: f64,
    ) {
        let mut previous = std::mem::take(&mut self.manifolds);
        let mut next = Vec::with_capacity(pairs.len());

        for &(a, b) in pairs {
            let (Some(body_a), Some(body_b)) = (bodies.get(&a), bodies.get(&b)) else {
                continue;
            };
            let (Some(shape_a), Some(shape_b)) =
                (registry.get(body_a.shape), registry.get(body_b.shape))
            else {
                continue;
            };

            let (pose_a, pose_b) = (&body_a.pose, &body_b.pose);
            let mut fresh = Contacts::new();
            let incremental = collide(
                registry,
                shape_a,
                pose_a,
                shape_b,
                pose_b,
                threshold,
                &mut fresh,
            );

            let slot = previous.binary_search_by_key(&(a, b), |m| (m.body_a, m.body_b));
            let mut manifold = match slot {
                Ok(i) => std::mem::replace(&mut previous[i], ContactManifold::new(a, b)),
                Err(_) => ContactManifold::new(a, b),
            };

            let points = fresh
                .iter()
                .filter(|c| c.distance <= threshold)
                .map(|c| {
                    ContactPoint::new(c.point_on_b, c.normal_on_b, c.distance, pose_a, pose_b)
                });

            if incremental {
                manifold.refresh(pose_a, pose_b, threshold);
                for point in points {
                    manifold.add_point(point, threshold);
                }
            } else {
                let mut points: SmallVec<[ContactPoint; 8]> = points.collect();
                if points.len() > MAX_MANIFOLD_POINTS {
                    let mut reduced = ContactManifold::new(a, b);
                    for point in points.drain(..) {
                        reduced.add_point(point, threshold);
                    }
                    points.extend_from_slice(reduced.points());
                }
                manifold.replace_points(&points, threshold);
            }

            if !manifold.is_empty() {
                trace!(body_a = %a, body_b = %b, points = manifold.len(), "manifold updated");
                next.push(manifold);
            }
        }

        next.sort_by_key(|m| (m.body_a, m.body_b));
        self.manifolds = next;
    }

    /// Drop every manifold involving `body`.
    pub fn remove_body(&mut self, body: BodyId) {
        self.manifolds
            .retain(|m| m.body_a != body && m.body_b != body);
    }

    /// Drop all manifolds.
    pub fn clear(&mut self) {
        self.manifolds.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rigid_types::{CylinderAxis, MassProperties};

    const THRESHOLD: f64 = 0.02;

    #[test]
    fn test_sphere_sphere() {
        let c = sphere_sphere(
            1.0,
            &Point3::new(0.0, 1.9, 0.0),
            1.0,
            &Point3::origin(),
            THRESHOLD,
        )
        .unwrap();
        assert_relative_eq!(c.normal_on_b, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(c.distance, -0.1, epsilon = 1e-12);
        assert_relative_eq!(c.point_on_b, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(c.point_on_a(), Point3::new(0.0, 0.9, 0.0), epsilon = 1e-12);

        let far = Point3::new(3.0, 0.0, 0.0);
        assert!(sphere_sphere(1.0, &far, 1.0, &Point3::origin(), THRESHOLD).is_none());
        let close = Point3::new(2.01, 0.0, 0.0);
        let near = sphere_sphere(1.0, &close, 1.0, &Point3::origin(), THRESHOLD).unwrap();
        assert!(near.distance > 0.0);
    }

    #[test]
    fn test_sphere_resting_on_box() {
        let ground = Pose::from_position(Point3::new(0.0, -1.0, 0.0));
        let c = sphere_box(
            0.5,
            &Point3::new(0.3, 0.45, 0.0),
            &Vector3::new(10.0, 1.0, 10.0),
            &ground,
            THRESHOLD,
        )
        .unwrap();
        assert_relative_eq!(c.normal_on_b, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(c.distance, -0.05, epsilon = 1e-12);
        assert_relative_eq!(c.point_on_b, Point3::new(0.3, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_center_inside_box() {
        let c = sphere_box(
            0.5,
            &Point3::new(0.0, 0.0, 0.8),
            &Vector3::repeat(1.0),
            &Pose::identity(),
            THRESHOLD,
        )
        .unwrap();
        assert_relative_eq!(c.normal_on_b, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(c.distance, -0.7, epsilon = 1e-12);
        assert_relative_eq!(c.point_on_b, Point3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_swapped_contact_keeps_geometry() {
        let c = ShapeContact {
            point_on_b: Point3::new(0.0, 1.0, 0.0),
            normal_on_b: Vector3::y(),
            distance: -0.1,
        };
        let s = c.swapped();
        assert_relative_eq!(s.point_on_b, c.point_on_a(), epsilon = 1e-12);
        assert_relative_eq!(s.point_on_a(), c.point_on_b, epsilon = 1e-12);
        assert_eq!(s.distance, c.distance);
    }

    fn world_with(
        registry: &mut ShapeRegistry,
        a: (Shape, Point3<f64>),
        b: (Shape, Point3<f64>),
    ) -> HashMap<BodyId, Body> {
        let mut bodies = HashMap::new();
        for (i, (shape, position)) in [a, b].into_iter().enumerate() {
            let shape = registry.insert(shape).unwrap();
            let id = BodyId::new(i as u64 + 1);
            let mass = MassProperties::sphere(1.0, 1.0);
            bodies.insert(id, Body::new(id, shape, mass, position, 0.5, 0.0));
        }
        bodies
    }

    #[test]
    fn test_box_on_box_manifold() {
        let mut registry = ShapeRegistry::new();
        let bodies = world_with(
            &mut registry,
            (Shape::cuboid(Vector3::new(5.0, 1.0, 5.0)).unwrap(), Point3::new(0.0, -1.0, 0.0)),
            (Shape::cuboid(Vector3::repeat(0.5)).unwrap(), Point3::new(0.0, 0.49, 0.0)),
        );
        let mut narrow = NarrowPhase::new();
        let pair = [(BodyId::new(1), BodyId::new(2))];
        narrow.update(&pair, &bodies, &registry, THRESHOLD);

        let manifold = &narrow.manifolds()[0];
        assert_eq!(manifold.len(), 4);
        for p in manifold.points() {
            // Normal points from the small box (B) down into the ground (A).
            assert_relative_eq!(p.normal_on_b, -Vector3::y(), epsilon = 1e-9);
            assert_relative_eq!(p.distance, -0.01, epsilon = 1e-9);
        }

        narrow.update(&[], &bodies, &registry, THRESHOLD);
        assert!(narrow.manifolds().is_empty());
    }

    #[test]
    fn test_cylinder_pair_grows_persistent_manifold() {
        let mut registry = ShapeRegistry::new();
        let bodies = world_with(
            &mut registry,
            (Shape::cuboid(Vector3::new(5.0, 1.0, 5.0)).unwrap(), Point3::new(0.0, -1.0, 0.0)),
            (
                Shape::cylinder(CylinderAxis::Y, 0.5, 0.5).unwrap(),
                Point3::new(0.0, 0.45, 0.0),
            ),
        );
        let mut narrow = NarrowPhase::new();
        let pair = [(BodyId::new(1), BodyId::new(2))];
        narrow.update(&pair, &bodies, &registry, THRESHOLD);
        assert_eq!(narrow.point_count(), 1);

        let p = narrow.manifolds()[0].points()[0];
        assert_relative_eq!(p.distance, -0.05, epsilon = 1e-6);
        assert_relative_eq!(p.normal_on_b.y, -1.0, epsilon = 1e-6);

        // Same poses again: the cached point is refreshed and merged, not duplicated.
        narrow.update(&pair, &bodies, &registry, THRESHOLD);
        assert_eq!(narrow.point_count(), 1);
        assert_eq!(narrow.manifolds()[0].points()[0].lifetime, 1);
    }

    #[test]
    fn test_compound_recurses_into_children() {
        let mut registry = ShapeRegistry::new();
        let ball = registry.create_sphere(0.5).unwrap();
        let compound = registry.create_compound().unwrap();
        let left = Pose::from_position(Point3::new(-1.0, 0.0, 0.0));
        let right = Pose::from_position(Point3::new(1.0, 0.0, 0.0));
        registry.add_child(compound, ball, left).unwrap();
        registry.add_child(compound, ball, right).unwrap();
        let ground = registry.create_box(Vector3::new(5.0, 1.0, 5.0)).unwrap();

        let mut bodies = HashMap::new();
        let a = BodyId::new(1);
        let b = BodyId::new(2);
        let below = Point3::new(0.0, -1.0, 0.0);
        let above = Point3::new(0.0, 0.4, 0.0);
        let ground_body = Body::new(a, ground, MassProperties::fixed(), below, 0.5, 0.0);
        let mass = MassProperties::sphere(1.0, 1.0);
        let compound_body = Body::new(b, compound, mass, above, 0.5, 0.0);
        bodies.insert(a, ground_body);
        bodies.insert(b, compound_body);

        let mut narrow = NarrowPhase::new();
        narrow.update(&[(a, b)], &bodies, &registry, THRESHOLD);
        let manifold = &narrow.manifolds()[0];
        assert_eq!(manifold.len(), 2);
        let mut xs: Vec<f64> = manifold.points().iter().map(|p| p.point_on_b.x).collect();
        xs.sort_by(f64::total_cmp);
        assert_relative_eq!(xs[0], -1.0, epsilon = 1e-9);
        assert_relative_eq!(xs[1], 1.0, epsilon = 1e-9);

        narrow.remove_body(b);
        assert!(narrow.manifolds().is_empty());
    }
}
