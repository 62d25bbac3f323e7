//! Post-step contact reports.
//!
//! After a step the world exposes the penetrating points of its manifolds as
//! plain [`ContactReport`] records. Reports are pulled by the caller through
//! [`ContactReports`], a finite iterator borrowed from the world, so nothing
//! can mutate the world while reports are being read.

use nalgebra::{Point3, Vector3};
use rigid_types::BodyId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ContactManifold;

/// One penetrating contact point between two bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactReport {
    /// First body of the pair.
    pub body_a: BodyId,
    /// Second body of the pair.
    pub body_b: BodyId,
    /// Contact point on A (world).
    pub point_on_a: Point3<f64>,
    /// Contact point on B (world).
    pub point_on_b: Point3<f64>,
    /// Contact normal (world), pointing from B towards A.
    pub normal_on_b: Vector3<f64>,
    /// Separation along the normal; always negative.
    pub distance: f64,
}

/// Iterator over the penetrating points of a set of manifolds.
///
/// Non-penetrating points (distance ≥ 0) are skipped.
#[derive(Debug, Clone)]
pub struct ContactReports<'a> {
    manifolds: std::slice::Iter<'a, ContactManifold>,
    current: Option<&'a ContactManifold>,
    index: usize,
}

impl<'a> ContactReports<'a> {
    /// Iterate the reports of `manifolds` in order.
    #[must_use]
    pub fn new(manifolds: &'a [ContactManifold]) -> Self {
        Self {
            manifolds: manifolds.iter(),
            current: None,
            index: 0,
        }
    }
}

impl Iterator for ContactReports<'_> {
    type Item = ContactReport;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(manifold) = self.current {
                while let Some(point) = manifold.points().get(self.index) {
                    self.index += 1;
                    if point.is_penetrating() {
                        return Some(ContactReport {
                            body_a: manifold.body_a,
                            body_b: manifold.body_b,
                            point_on_a: point.point_on_a,
                            point_on_b: point.point_on_b,
                            normal_on_b: point.normal_on_b,
                            distance: point.distance,
                        });
                    }
                }
            }
            self.current = Some(self.manifolds.next()?);
            self.index = 0;
        }
    }
}

impl std::iter::FusedIterator for ContactReports<'_> {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::ContactPoint;
    use rigid_types::Pose;

    fn manifold(a: u64, b: u64, distances: &[f64]) -> ContactManifold {
        let mut m = ContactManifold::new(BodyId::new(a), BodyId::new(b));
        for (i, d) in distances.iter().enumerate() {
            let p = ContactPoint::new(
                Point3::new(i as f64, 0.0, 0.0),
                Vector3::y(),
                *d,
                &Pose::identity(),
                &Pose::identity(),
            );
            m.add_point(p, 0.01);
        }
        m
    }

    #[test]
    fn test_only_penetrating_points_reported() {
        let manifolds = vec![
            manifold(1, 2, &[-0.1, 0.0, 0.02]),
            manifold(3, 4, &[0.01]),
            manifold(5, 6, &[-0.2, -0.3]),
        ];
        let reports: Vec<_> = ContactReports::new(&manifolds).collect();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.distance < 0.0));
        assert_eq!(reports[0].body_a, BodyId::new(1));
        assert_eq!(reports[1].body_b, BodyId::new(6));
        assert_eq!(reports[2].distance, -0.3);
    }

    #[test]
    fn test_empty_and_exhausted() {
        let mut it = ContactReports::new(&[]);
        assert!(it.next().is_none());
        assert!(it.next().is_none());

        let manifolds = vec![ContactManifold::new(BodyId::new(1), BodyId::new(2))];
        assert_eq!(ContactReports::new(&manifolds).count(), 0);
    }
}
