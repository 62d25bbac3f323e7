//! Contact points and persistent manifolds.
//!
//! A manifold collects up to [`MAX_MANIFOLD_POINTS`] contact points between
//! one pair of bodies. Points are stored in both bodies' local frames so a
//! manifold can survive across steps: each step the world refreshes the
//! cached points against the new poses, drops those that drifted apart, and
//! merges freshly detected points in. Persisted points keep their
//! accumulated impulses, which the solver uses for warm starting.

use nalgebra::{Point3, Vector3};
use rigid_types::{BodyId, Pose};
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of points kept per manifold.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// A single contact between two bodies.
///
/// The geometry satisfies `point_on_a = point_on_b + normal_on_b * distance`.
/// The normal points from body B towards body A; a negative distance means
/// the bodies overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// Contact point on A in A's local frame.
    pub local_point_a: Point3<f64>,
    /// Contact point on B in B's local frame.
    pub local_point_b: Point3<f64>,
    /// Contact point on A in world coordinates.
    pub point_on_a: Point3<f64>,
    /// Contact point on B in world coordinates.
    pub point_on_b: Point3<f64>,
    /// Unit contact normal in world coordinates, pointing from B towards A.
    pub normal_on_b: Vector3<f64>,
    /// Signed separation along the normal. Negative when penetrating.
    pub distance: f64,
    /// Accumulated normal impulse from the last solve.
    pub normal_impulse: f64,
    /// Accumulated friction impulses along the two tangent directions.
    pub friction_impulse: [f64; 2],
    /// Number of steps this point has persisted.
    pub lifetime: u32,
}

impl ContactPoint {
    /// Create a contact from its world-space point on B, normal, and distance.
    ///
    /// The point on A is derived from the other three; local points are
    /// computed from the two body poses.
    #[must_use]
    pub fn new(
        point_on_b: Point3<f64>,
        normal_on_b: Vector3<f64>,
        distance: f64,
        pose_a: &Pose,
        pose_b: &Pose,
    ) -> Self {
        let point_on_a = point_on_b + normal_on_b * distance;
        Self {
            local_point_a: pose_a.inverse_transform_point(&point_on_a),
            local_point_b: pose_b.inverse_transform_point(&point_on_b),
            point_on_a,
            point_on_b,
            normal_on_b,
            distance,
            normal_impulse: 0.0,
            friction_impulse: [0.0; 2],
            lifetime: 0,
        }
    }

    /// Whether the bodies overlap at this point.
    #[must_use]
    pub fn is_penetrating(&self) -> bool {
        self.distance < 0.0
    }

    /// Contact with A and B swapped: the normal flips and the points trade places.
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            local_point_a: self.local_point_b,
            local_point_b: self.local_point_a,
            point_on_a: self.point_on_b,
            point_on_b: self.point_on_a,
            normal_on_b: -self.normal_on_b,
            ..*self
        }
    }

    fn inherit_impulses(&mut self, old: &Self) {
        self.normal_impulse = old.normal_impulse;
        self.friction_impulse = old.friction_impulse;
        self.lifetime = old.lifetime;
    }
}

/// All contact points between one ordered pair of bodies.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactManifold {
    /// First body of the pair.
    pub body_a: BodyId,
    /// Second body of the pair. Normals point from this body towards `body_a`.
    pub body_b: BodyId,
    points: SmallVec<[ContactPoint; MAX_MANIFOLD_POINTS]>,
}

impl ContactManifold {
    /// Create an empty manifold for a pair.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            points: SmallVec::new(),
        }
    }

    /// The contact points.
    #[must_use]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    /// Mutable access to the contact points.
    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the manifold holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether any point is penetrating.
    #[must_use]
    pub fn has_penetration(&self) -> bool {
        self.points.iter().any(ContactPoint::is_penetrating)
    }

    /// Deepest (most negative) separation, if any point exists.
    #[must_use]
    pub fn min_distance(&self) -> Option<f64> {
        self.points.iter().map(|p| p.distance).reduce(f64::min)
    }

    /// Drop all points.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Re-evaluate cached points against new body poses.
    ///
    /// World positions and distances are recomputed from the local points
    /// along each point's stored normal. Points that separated beyond
    /// `breaking_threshold`, or slid sideways further than it, are removed.
    pub fn refresh(&mut self, pose_a: &Pose, pose_b: &Pose, breaking_threshold: f64) {
        let threshold_sq = breaking_threshold * breaking_threshold;
        self.points.retain(|p| {
            p.point_on_a = pose_a.transform_point(&p.local_point_a);
            p.point_on_b = pose_b.transform_point(&p.local_point_b);
            p.distance = (p.point_on_a - p.point_on_b).dot(&p.normal_on_b);
            if p.distance > breaking_threshold {
                return false;
            }
            let projected = p.point_on_a - p.normal_on_b * p.distance;
            (projected - p.point_on_b).norm_squared() <= threshold_sq
        });
        for p in &mut self.points {
            p.lifetime = p.lifetime.saturating_add(1);
        }
    }

    /// Merge a newly detected point into the cache.
    ///
    /// A cached point close to the new one (within `merge_threshold`, in B's
    /// frame) is replaced while keeping its impulses. When the manifold is
    /// full, the point to evict is chosen so the deepest contact survives and
    /// the remaining points span the largest area.
    pub fn add_point(&mut self, mut point: ContactPoint, merge_threshold: f64) {
        if let Some(i) = self.closest_cached(&point, merge_threshold) {
            point.inherit_impulses(&self.points[i]);
            self.points[i] = point;
            return;
        }

        if self.points.len() < MAX_MANIFOLD_POINTS {
            self.points.push(point);
        } else {
            let i = self.replacement_index(&point);
            self.points[i] = point;
        }
    }

    /// Replace every point with a freshly generated set, carrying impulses
    /// over from cached points that match.
    pub fn replace_points(&mut self, fresh: &[ContactPoint], merge_threshold: f64) {
        let mut next: SmallVec<[ContactPoint; MAX_MANIFOLD_POINTS]> = SmallVec::new();
        for candidate in fresh.iter().take(MAX_MANIFOLD_POINTS) {
            let mut point = *candidate;
            if let Some(i) = self.closest_cached(&point, merge_threshold) {
                point.inherit_impulses(&self.points[i]);
                point.lifetime = point.lifetime.saturating_add(1);
            }
            next.push(point);
        }
        self.points = next;
    }

    fn closest_cached(&self, point: &ContactPoint, merge_threshold: f64) -> Option<usize> {
        let mut best = None;
        let mut best_dist = merge_threshold * merge_threshold;
        for (i, cached) in self.points.iter().enumerate() {
            let d = (cached.local_point_b - point.local_point_b).norm_squared();
            if d < best_dist {
                best_dist = d;
                best = Some(i);
            }
        }
        best
    }

    fn replacement_index(&self, point: &ContactPoint) -> usize {
        let deepest = self
            .points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.distance.total_cmp(&b.distance))
            .map_or(0, |(i, _)| i);

        let mut best = if deepest == 0 { 1 } else { 0 };
        let mut best_area = f64::NEG_INFINITY;
        for i in 0..self.points.len() {
            if i == deepest {
                continue;
            }
            let mut quad = [Point3::origin(); MAX_MANIFOLD_POINTS];
            for (slot, p) in quad.iter_mut().zip(self.points.iter()) {
                *slot = p.local_point_a;
            }
            quad[i] = point.local_point_a;
            let area = quad_area_measure(&quad);
            if area > best_area {
                best_area = area;
                best = i;
            }
        }
        best
    }
}

/// Squared-area proxy of the quadrilateral spanned by four points.
fn quad_area_measure(p: &[Point3<f64>; MAX_MANIFOLD_POINTS]) -> f64 {
    let a = (p[0] - p[1]).cross(&(p[2] - p[3])).norm_squared();
    let b = (p[0] - p[2]).cross(&(p[1] - p[3])).norm_squared();
    let c = (p[0] - p[3]).cross(&(p[1] - p[2])).norm_squared();
    a.max(b).max(c)
}
