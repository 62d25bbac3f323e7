//! Broad-phase collision detection over a dynamic AABB tree.
//!
//! Every body in the world owns one proxy in a [`DynamicBvh`]. The proxy
//! stores a *fat* AABB, the body's tight bounds grown by a margin, so a body
//! that only jiggles in place never touches the tree. When the tight bounds
//! escape the fat ones the proxy is reinserted.
//!
//! # Algorithm
//!
//! 1. Each sub-step the world recomputes tight AABBs and calls
//!    [`BroadPhase::update`] for every awake body
//! 2. [`BroadPhase::pairs`] queries the tree once per leaf and returns each
//!    overlapping pair exactly once, ordered by handle
//! 3. The world filters pairs that cannot produce contacts (static-static,
//!    sleeping-sleeping, or joined by a non-colliding constraint)
//!
//! # Example
//!
//! ```
//! use rigid_core::broad_phase::{Aabb, BroadPhase};
//! use rigid_types::BodyId;
//! use nalgebra::{Point3, Vector3};
//!
//! let mut bp = BroadPhase::new(0.05);
//! bp.insert(BodyId::new(1), Aabb::from_center(Point3::origin(), Vector3::repeat(1.0)));
//! bp.insert(BodyId::new(2), Aabb::from_center(Point3::new(1.5, 0.0, 0.0), Vector3::repeat(1.0)));
//! bp.insert(BodyId::new(3), Aabb::from_center(Point3::new(9.0, 0.0, 0.0), Vector3::repeat(1.0)));
//!
//! assert_eq!(bp.pairs(), vec![(BodyId::new(1), BodyId::new(2))]);
//! ```

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use rigid_types::{BodyId, Pose};

use crate::bvh::{DynamicBvh, ProxyId};

/// An axis-aligned bounding box (AABB) for broad-phase collision detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// World bounds of a box with `half_extents` placed at `pose`.
    ///
    /// The extent along world axis `i` is `Σ_j |R_ij| h_j`.
    #[must_use]
    pub fn from_oriented_box(pose: &Pose, half_extents: &Vector3<f64>) -> Self {
        let r = pose.rotation.to_rotation_matrix().into_inner().abs();
        Self::from_center(pose.position, r * half_extents)
    }

    /// Check if this AABB overlaps with another AABB.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether `other` lies entirely inside this box.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Smallest box containing both.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Surface area, the cost metric of tree insertion.
    #[must_use]
    pub fn surface_area(&self) -> f64 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half of the size along each axis.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        (self.max - self.min) * 0.5
    }

    /// Whether both corners are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.min.iter().all(|v| v.is_finite()) && self.max.iter().all(|v| v.is_finite())
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}

/// Tracks one tree proxy per body.
#[derive(Debug, Clone)]
pub struct BroadPhase {
    tree: DynamicBvh<BodyId>,
    proxies: HashMap<BodyId, ProxyId>,
}

impl Default for BroadPhase {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl BroadPhase {
    /// Create an empty broad phase whose proxies are fattened by `margin`.
    #[must_use]
    pub fn new(margin: f64) -> Self {
        Self {
            tree: DynamicBvh::new(margin),
            proxies: HashMap::new(),
        }
    }

    /// Fattening margin.
    #[must_use]
    pub fn margin(&self) -> f64 {
        self.tree.margin()
    }

    /// Number of bodies tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Whether no body is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Whether `body` has a proxy.
    #[must_use]
    pub fn contains(&self, body: BodyId) -> bool {
        self.proxies.contains_key(&body)
    }

    /// Start tracking `body`. A body already tracked is moved instead.
    pub fn insert(&mut self, body: BodyId, aabb: Aabb) {
        if let Some(&proxy) = self.proxies.get(&body) {
            self.tree.move_proxy(proxy, aabb);
            return;
        }
        let proxy = self.tree.insert(aabb, body);
        self.proxies.insert(body, proxy);
    }

    /// Stop tracking `body`. Returns whether it was tracked.
    pub fn remove(&mut self, body: BodyId) -> bool {
        match self.proxies.remove(&body) {
            Some(proxy) => {
                self.tree.remove(proxy);
                true
            }
            None => false,
        }
    }

    /// Refresh `body`'s bounds. Returns whether its proxy was reinserted.
    pub fn update(&mut self, body: BodyId, aabb: Aabb) -> bool {
        match self.proxies.get(&body) {
            Some(&proxy) => self.tree.update(proxy, aabb),
            None => false,
        }
    }

    /// Unconditionally reinsert `body` with fresh bounds, e.g. after a teleport.
    pub fn teleport(&mut self, body: BodyId, aabb: Aabb) {
        if let Some(&proxy) = self.proxies.get(&body) {
            self.tree.move_proxy(proxy, aabb);
        }
    }

    /// Fat bounds stored for `body`.
    #[must_use]
    pub fn fat_aabb(&self, body: BodyId) -> Option<Aabb> {
        self.proxies.get(&body).and_then(|&p| self.tree.fat_aabb(p))
    }

    /// Every pair of bodies whose fat bounds overlap, smaller handle first,
    /// sorted.
    #[must_use]
    pub fn pairs(&self) -> Vec<(BodyId, BodyId)> {
        self.tree.overlapping_pairs()
    }

    /// Bodies whose fat bounds overlap `aabb`.
    #[must_use]
    pub fn query(&self, aabb: &Aabb) -> Vec<BodyId> {
        let mut hits = Vec::new();
        self.tree.query(aabb, |body| hits.push(body));
        hits.sort_unstable();
        hits
    }

    /// Height of the underlying tree.
    #[must_use]
    pub fn tree_height(&self) -> usize {
        self.tree.height()
    }

    /// Drop every proxy.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.proxies.clear();
    }
}
