//! Sequential-impulse velocity solver.
//!
//! Contacts and joints are lowered into velocity rows against a packed array
//! of [`SolverBody`] views, iterated together with projected Gauss-Seidel, and
//! the corrected velocities are written back to the bodies:
//!
//! ```text
//! gather   bodies ──► [SolverBody]            (non-moving bodies are fixed anchors)
//! prepare  manifolds ──► ContactConstraint     (normal + 2 friction rows)
//!          constraints ──► JointRows           (enabled joints only)
//! warm     cached contact impulses applied once
//! iterate  joints, then contacts, N times
//! scatter  velocities ──► bodies, impulses ──► contact points
//! ```

use hashbrown::HashMap;
use rigid_constraint::{Constraint, JointRows};
use rigid_contact::{
    ContactConstraint, ContactManifold, ContactMaterial, combine_friction, combine_restitution,
};
use rigid_types::{BodyId, ConstraintId, SolverBody, SolverConfig};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::body::Body;

/// Counts from the last solve, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverStats {
    /// Bodies gathered into the solver.
    pub bodies: usize,
    /// Contact points solved.
    pub contacts: usize,
    /// Joints solved.
    pub joints: usize,
    /// Gauss-Seidel passes.
    pub iterations: usize,
}

struct ContactRow {
    a: usize,
    b: usize,
    manifold: usize,
    point: usize,
    constraint: ContactConstraint,
}

struct JointRow {
    a: usize,
    b: usize,
    rows: JointRows,
}

/// Sequential-impulse solver over contacts and joints.
#[derive(Debug, Clone, Default)]
pub struct SequentialImpulseSolver {
    stats: SolverStats,
}

impl SequentialImpulseSolver {
    /// Create a solver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts from the last call to [`solve`](Self::solve).
    #[must_use]
    pub fn last_stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Solve one sub-step of length `dt`.
    ///
    /// Only awake dynamic bodies have their velocities changed. Accumulated
    /// impulses are stored back into the manifolds for warm starting.
    pub fn solve(
        &mut self,
        bodies: &mut HashMap<BodyId, Body>,
        manifolds: &mut [ContactManifold],
        constraints: &HashMap<ConstraintId, Constraint>,
        config: &SolverConfig,
        dt: f64,
    ) {
        let mut ids: Vec<BodyId> = Vec::new();
        let mut index: HashMap<BodyId, usize> = HashMap::new();
        let mut solver_bodies: Vec<SolverBody> = Vec::new();
        let mut slot = |id: BodyId, bodies: &HashMap<BodyId, Body>| -> Option<usize> {
            if let Some(&i) = index.get(&id) {
                return Some(i);
            }
            let body = bodies.get(&id)?;
            let i = solver_bodies.len();
            solver_bodies.push(body.solver_body());
            ids.push(id);
            index.insert(id, i);
            Some(i)
        };

        let mut contacts = Vec::new();
        for (m, manifold) in manifolds.iter().enumerate() {
            let (id_a, id_b) = (manifold.body_a, manifold.body_b);
            let (Some(a), Some(b)) = (slot(id_a, &*bodies), slot(id_b, &*bodies)) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(&id_a), bodies.get(&id_b)) else {
                continue;
            };
            let material = ContactMaterial {
                friction: combine_friction(body_a.friction, body_b.friction),
                restitution: combine_restitution(body_a.restitution, body_b.restitution),
            };
            for (p, point) in manifold.points().iter().enumerate() {
                contacts.push((a, b, m, p, *point, material));
            }
        }

        let mut joints = Vec::new();
        let mut ordered: Vec<(&ConstraintId, &Constraint)> = constraints
            .iter()
            .filter(|(_, c)| c.link().is_enabled())
            .collect();
        ordered.sort_by_key(|(id, _)| **id);
        for (_, constraint) in ordered {
            let link = constraint.link();
            let (id_a, id_b) = (link.body_a(), link.body_b());
            let (Some(a), Some(b)) = (slot(id_a, &*bodies), slot(id_b, &*bodies)) else {
                continue;
            };
            joints.push((a, b, constraint));
        }

        let mut contact_rows: Vec<ContactRow> = contacts
            .into_iter()
            .filter(|(a, b, ..)| solvable(&solver_bodies, *a, *b))
            .map(|(a, b, manifold, point, contact, material)| ContactRow {
                a,
                b,
                manifold,
                point,
                constraint: ContactConstraint::prepare(
                    &contact,
                    &solver_bodies[a],
                    &solver_bodies[b],
                    material,
                    config,
                    dt,
                ),
            })
            .collect();

        let mut joint_rows: Vec<JointRow> = joints
            .into_iter()
            .filter(|(a, b, _)| solvable(&solver_bodies, *a, *b))
            .map(|(a, b, constraint)| JointRow {
                a,
                b,
                rows: constraint.prepare(&solver_bodies[a], &solver_bodies[b], config, dt),
            })
            .collect();

        if config.warm_starting {
            for row in &contact_rows {
                let (a, b) = pair_mut(&mut solver_bodies, row.a, row.b);
                row.constraint.warm_start(a, b);
            }
        }

        for _ in 0..config.iterations {
            for row in &mut joint_rows {
                let (a, b) = pair_mut(&mut solver_bodies, row.a, row.b);
                row.rows.solve(a, b);
            }
            for row in &mut contact_rows {
                let (a, b) = pair_mut(&mut solver_bodies, row.a, row.b);
                row.constraint.solve(a, b);
            }
        }

        for (id, solved) in ids.iter().zip(&solver_bodies) {
            if let Some(body) = bodies.get_mut(id) {
                if body.is_simulated() {
                    body.twist = solved.twist();
                }
            }
        }
        for row in &contact_rows {
            if let Some(point) = manifolds
                .get_mut(row.manifold)
                .and_then(|m| m.points_mut().get_mut(row.point))
            {
                row.constraint.store(point);
            }
        }

        self.stats = SolverStats {
            bodies: solver_bodies.len(),
            contacts: contact_rows.len(),
            joints: joint_rows.len(),
            iterations: config.iterations,
        };
    }
}

/// Two distinct elements of `bodies`, mutably. `i` and `j` must differ.
fn pair_mut(bodies: &mut [SolverBody], i: usize, j: usize) -> (&mut SolverBody, &mut SolverBody) {
    debug_assert_ne!(i, j);
    if i < j {
        let (lo, hi) = bodies.split_at_mut(j);
        (&mut lo[i], &mut hi[0])
    } else {
        let (lo, hi) = bodies.split_at_mut(i);
        (&mut hi[0], &mut lo[j])
    }
}

/// Whether a row between slots `a` and `b` can move anything.
fn solvable(bodies: &[SolverBody], a: usize, b: usize) -> bool {
    a != b && !(bodies[a].is_fixed() && bodies[b].is_fixed())
}
