//! Time stepping.
//!
//! [`StepClock`] turns the caller's frame time into a number of fixed
//! sub-steps; the rest of this module is the sub-step pipeline the world runs
//! for each of them:
//!
//! ```text
//! 1. forces ──► velocities        (gravity, accumulated force and torque)
//! 2. broad phase                  (refresh moved leaves, collect and filter pairs)
//! 3. narrow phase                 (manifolds)
//! 4. solver                       (contacts + joints)
//! 5. velocities ──► poses
//! 6. sleep bookkeeping
//! 7. clear accumulators
//! 8. advance time
//! ```

use hashbrown::HashSet;
use rigid_types::{ActivationState, BodyId, Result, RigidError};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::body::Body;
use crate::integrators::{Integrator, SemiImplicitEuler};
use crate::world::World;

/// Slack when counting whole sub-steps in the accumulator, so that e.g.
/// `0.1 / (1/60)` counts as 6.
const STEP_EPSILON: f64 = 1e-9;

/// How many sub-steps one call to `step` should take.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepPlan {
    /// Sub-steps to run.
    pub sub_steps: usize,
    /// Length of each sub-step (s).
    pub sub_dt: f64,
    /// Whole sub-steps discarded because of the cap.
    pub dropped: usize,
}

/// Fixed-timestep accumulator.
///
/// # Example
///
/// ```
/// use rigid_core::StepClock;
///
/// let mut clock = StepClock::new(0.01);
/// let plan = clock.plan(0.035, 10).unwrap();
/// assert_eq!(plan.sub_steps, 3);
/// assert!((clock.accumulator() - 0.005).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StepClock {
    fixed_timestep: f64,
    accumulator: f64,
}

impl StepClock {
    /// Create a clock with the given sub-step size.
    #[must_use]
    pub fn new(fixed_timestep: f64) -> Self {
        Self {
            fixed_timestep,
            accumulator: 0.0,
        }
    }

    /// Sub-step size (s).
    #[must_use]
    pub fn fixed_timestep(&self) -> f64 {
        self.fixed_timestep
    }

    /// Time carried over to the next call (s).
    #[must_use]
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Forget any carried-over time.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    /// Plan a frame of length `dt`.
    ///
    /// With `max_sub_steps == 0` the frame is one variable step of `dt`.
    /// Otherwise `dt` is accumulated and as many whole fixed sub-steps as fit
    /// are taken, up to `max_sub_steps`; any further whole steps are dropped
    /// and only the fractional remainder carries over.
    ///
    /// # Errors
    ///
    /// [`RigidError::InvalidTimestep`] if `dt` is negative or not finite.
    pub fn plan(&mut self, dt: f64, max_sub_steps: usize) -> Result<StepPlan> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(RigidError::InvalidTimestep(dt));
        }

        if max_sub_steps == 0 {
            let sub_steps = usize::from(dt > 0.0);
            return Ok(StepPlan {
                sub_steps,
                sub_dt: dt,
                dropped: 0,
            });
        }

        self.accumulator += dt;
        let whole = (self.accumulator / self.fixed_timestep + STEP_EPSILON).floor();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let available = whole as usize;
        self.accumulator = (self.accumulator - whole * self.fixed_timestep).max(0.0);

        let sub_steps = available.min(max_sub_steps);
        Ok(StepPlan {
            sub_steps,
            sub_dt: self.fixed_timestep,
            dropped: available - sub_steps,
        })
    }
}

impl World {
    /// Run `plan` and check the result for divergence.
    pub(crate) fn run_plan(&mut self, plan: &StepPlan) -> Result<usize> {
        if plan.dropped > 0 {
            warn!(
                dropped = plan.dropped,
                taken = plan.sub_steps,
                "frame needed more sub-steps than allowed, dropping the excess"
            );
        }
        for _ in 0..plan.sub_steps {
            self.sub_step(plan.sub_dt);
        }
        trace!(sub_steps = plan.sub_steps, time = self.time, "stepped");
        self.check_finite()?;
        Ok(plan.sub_steps)
    }

    fn sub_step(&mut self, dt: f64) {
        let gravity = self.config.gravity;

        for body in self.bodies.values_mut().filter(|b| b.is_simulated()) {
            let (linear, angular) = body.accelerations(&gravity);
            SemiImplicitEuler::integrate_velocity(&mut body.twist, linear, angular, dt);
        }

        self.refresh_broad_phase();
        let pairs = self.collect_pairs();
        self.wake_touching(&pairs);

        self.narrow_phase.update(
            &pairs,
            &self.bodies,
            &self.shapes,
            self.config.contact_breaking_threshold,
        );

        trace!(
            pairs = pairs.len(),
            manifolds = self.narrow_phase.manifolds().len(),
            contacts = self.narrow_phase.point_count(),
            "collision pass"
        );

        self.solver.solve(
            &mut self.bodies,
            self.narrow_phase.manifolds_mut(),
            &self.constraints,
            &self.config.solver,
            dt,
        );

        for body in self.bodies.values_mut().filter(|b| b.is_simulated()) {
            SemiImplicitEuler::integrate_position(&mut body.pose, &body.twist, dt);
        }

        for body in self.bodies.values_mut().filter(|b| b.in_world) {
            if body.update_sleep(&self.config.sleep, dt) {
                trace!(body = %body.id, "fell asleep");
            }
        }

        for body in self.bodies.values_mut() {
            body.clear_forces();
        }

        self.time += dt;
        self.step_count += 1;
    }

    /// Move broad-phase leaves of bodies that may have moved.
    fn refresh_broad_phase(&mut self) {
        for body in self.bodies.values().filter(|b| b.is_simulated()) {
            if let Ok(aabb) = self.shapes.local_aabb(body.shape, &body.pose) {
                self.broad_phase.update(body.id, aabb);
            }
        }
    }

    /// Overlapping pairs worth a narrow-phase test.
    fn collect_pairs(&self) -> Vec<(BodyId, BodyId)> {
        let excluded: HashSet<(BodyId, BodyId)> = self
            .constraints
            .values()
            .map(|c| c.link())
            .filter(|link| !link.collide())
            .map(|link| ordered(link.body_a(), link.body_b()))
            .collect();

        self.broad_phase
            .pairs()
            .into_iter()
            .filter(|pair| {
                let (Some(a), Some(b)) = (self.bodies.get(&pair.0), self.bodies.get(&pair.1)) else {
                    return false;
                };
                let both_fixed = a.is_fixed() && b.is_fixed();
                let both_asleep = a.activation == ActivationState::Sleeping
                    && b.activation == ActivationState::Sleeping;
                a.in_world && b.in_world && !both_fixed && !both_asleep && !excluded.contains(pair)
            })
            .collect()
    }

    /// Wake sleeping bodies touched by, or jointed to, a moving body.
    fn wake_touching(&mut self, pairs: &[(BodyId, BodyId)]) {
        let mut links: Vec<(BodyId, BodyId)> = pairs.to_vec();
        links.extend(
            self.constraints
                .values()
                .map(|c| c.link())
                .filter(|link| link.is_enabled())
                .map(|link| (link.body_a(), link.body_b())),
        );

        let mut to_wake = Vec::new();
        for (a, b) in links {
            let (Some(body_a), Some(body_b)) = (self.bodies.get(&a), self.bodies.get(&b)) else {
                continue;
            };
            let asleep = |body: &Body| body.activation == ActivationState::Sleeping;
            if body_a.is_simulated() && asleep(body_b) {
                to_wake.push(b);
            } else if body_b.is_simulated() && asleep(body_a) {
                to_wake.push(a);
            }
        }
        for id in to_wake {
            if let Some(body) = self.bodies.get_mut(&id) {
                trace!(body = %id, "woken by contact");
                body.wake_up();
            }
        }
    }

    fn check_finite(&self) -> Result<()> {
        for body in self.bodies.values() {
            if !body.pose.is_finite() || !body.twist.is_finite() {
                return Err(RigidError::diverged(format!(
                    "{} has a non-finite pose or velocity at t = {}",
                    body.id, self.time
                )));
            }
        }
        Ok(())
    }
}

/// `(a, b)` with the smaller handle first.
pub(crate) fn ordered(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_variable_step() {
        let mut clock = StepClock::new(1.0 / 60.0);
        let plan = clock.plan(0.3, 0).unwrap();
        assert_eq!(plan.sub_steps, 1);
        assert_eq!(plan.sub_dt, 0.3);
        assert_eq!(clock.plan(0.0, 0).unwrap().sub_steps, 0);
        assert_eq!(clock.accumulator(), 0.0);
    }

    #[test]
    fn test_accumulates_fractions() {
        let mut clock = StepClock::new(0.01);
        assert_eq!(clock.plan(0.004, 5).unwrap().sub_steps, 0);
        assert_eq!(clock.plan(0.004, 5).unwrap().sub_steps, 0);
        assert_eq!(clock.plan(0.004, 5).unwrap().sub_steps, 1);
        assert_relative_eq!(clock.accumulator(), 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_exact_multiples_are_not_lost_to_rounding() {
        let mut clock = StepClock::new(1.0 / 60.0);
        assert_eq!(clock.plan(0.1, 10).unwrap().sub_steps, 6);
        assert!(clock.accumulator() < 1e-9);
    }

    #[test]
    fn test_cap_drops_whole_steps_keeps_remainder() {
        let mut clock = StepClock::new(0.01);
        let plan = clock.plan(0.055, 2).unwrap();
        assert_eq!(plan.sub_steps, 2);
        assert_eq!(plan.dropped, 3);
        assert_relative_eq!(clock.accumulator(), 0.005, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_bad_dt() {
        let mut clock = StepClock::new(0.01);
        assert!(clock.plan(-0.1, 1).unwrap_err().is_degenerate());
        assert!(clock.plan(f64::NAN, 1).is_err());
        assert!(clock.plan(f64::INFINITY, 0).is_err());
        assert_eq!(clock.accumulator(), 0.0);
    }

    #[test]
    fn test_ordered() {
        let (a, b) = ordered(BodyId::new(5), BodyId::new(2));
        assert_eq!((a.raw(), b.raw()), (2, 5));
    }
}
