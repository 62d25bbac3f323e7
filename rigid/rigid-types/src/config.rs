//! Configuration types for a world.
//!
//! These control the fixed sub-step size, gravity, the sequential-impulse
//! solver, automatic sleeping, and the collision pipeline's margins.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::RigidError;

/// Main configuration for a world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Size of one internal sub-step (seconds).
    pub fixed_timestep: f64,
    /// Uniform acceleration applied to every dynamic body (m/s²).
    pub gravity: Vector3<f64>,
    /// Solver configuration.
    pub solver: SolverConfig,
    /// Automatic sleeping.
    pub sleep: SleepConfig,
    /// Padding added around bounding boxes in the broadphase tree (m).
    pub broad_phase_margin: f64,
    /// Separation beyond which cached contact points are dropped (m).
    pub contact_breaking_threshold: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 60.0,
            gravity: Vector3::new(0.0, -10.0, 0.0),
            solver: SolverConfig::default(),
            sleep: SleepConfig::default(),
            broad_phase_margin: 0.05,
            contact_breaking_threshold: 0.02,
        }
    }
}

impl WorldConfig {
    /// Real-time preset: 60 Hz sub-steps with default solver.
    #[must_use]
    pub fn realtime() -> Self {
        Self::default()
    }

    /// High-accuracy preset: 240 Hz sub-steps and more solver iterations.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            fixed_timestep: 1.0 / 240.0,
            solver: SolverConfig::high_accuracy(),
            ..Default::default()
        }
    }

    /// Set the sub-step size.
    #[must_use]
    pub fn with_fixed_timestep(mut self, timestep: f64) -> Self {
        self.fixed_timestep = timestep;
        self
    }

    /// Set the gravity vector.
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Disable automatic sleeping.
    #[must_use]
    pub fn no_sleeping(mut self) -> Self {
        self.sleep.enabled = false;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestep, gravity or margins are not usable.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.fixed_timestep.is_finite() || self.fixed_timestep <= 0.0 {
            return Err(RigidError::InvalidTimestep(self.fixed_timestep));
        }

        if self.fixed_timestep > 1.0 {
            return Err(RigidError::invalid_config(
                "fixed_timestep > 1 second is likely an error",
            ));
        }

        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(RigidError::invalid_config("gravity must be finite"));
        }

        if !(self.broad_phase_margin >= 0.0 && self.broad_phase_margin.is_finite()) {
            return Err(RigidError::invalid_config(
                "broad_phase_margin must be finite and non-negative",
            ));
        }

        if !(self.contact_breaking_threshold > 0.0 && self.contact_breaking_threshold.is_finite()) {
            return Err(RigidError::invalid_config(
                "contact_breaking_threshold must be positive",
            ));
        }

        self.solver.validate()?;
        self.sleep.validate()?;

        Ok(())
    }

    /// Sub-step frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.fixed_timestep
    }
}

/// Configuration for the sequential-impulse solver.
///
/// The iteration count is fixed: the solver always runs exactly
/// `iterations` passes over every row, whether or not it has converged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Velocity passes per sub-step.
    pub iterations: usize,
    /// Error reduction parameter (Baumgarte factor, 0-1).
    pub erp: f64,
    /// Constraint force mixing (softness added to every joint row).
    pub cfm: f64,
    /// Penetration tolerated without positional correction (m).
    pub penetration_slop: f64,
    /// Approach speed above which restitution applies (m/s).
    pub restitution_threshold: f64,
    /// Reuse impulses from persisted contact points.
    pub warm_starting: bool,
    /// Fraction of the cached impulse applied when warm starting.
    pub warm_start_factor: f64,
    /// Friction given to new bodies.
    pub default_friction: f64,
    /// Restitution given to new bodies.
    pub default_restitution: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            erp: 0.2,
            cfm: 0.0,
            penetration_slop: 0.001,
            restitution_threshold: 0.5,
            warm_starting: true,
            warm_start_factor: 0.85,
            default_friction: 0.5,
            default_restitution: 0.0,
        }
    }
}

impl SolverConfig {
    /// More iterations and tighter slop.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            iterations: 30,
            penetration_slop: 0.0005,
            ..Default::default()
        }
    }

    /// Fewer iterations for large scenes.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            iterations: 4,
            penetration_slop: 0.005,
            ..Default::default()
        }
    }

    /// Set the iteration count.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set default material properties.
    #[must_use]
    pub fn materials(mut self, friction: f64, restitution: f64) -> Self {
        self.default_friction = friction.max(0.0);
        self.default_restitution = restitution.max(0.0);
        self
    }

    /// Validate the solver configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> crate::Result<()> {
        if self.iterations == 0 {
            return Err(RigidError::invalid_config("iterations must be at least 1"));
        }

        if !(0.0..=1.0).contains(&self.erp) {
            return Err(RigidError::invalid_config("erp must be between 0 and 1"));
        }

        if !(self.cfm >= 0.0 && self.cfm.is_finite()) {
            return Err(RigidError::invalid_config("cfm must be finite and non-negative"));
        }

        if !(self.penetration_slop >= 0.0 && self.penetration_slop.is_finite()) {
            return Err(RigidError::invalid_config(
                "penetration_slop must be finite and non-negative",
            ));
        }

        if !(0.0..=1.0).contains(&self.warm_start_factor) {
            return Err(RigidError::invalid_config(
                "warm_start_factor must be between 0 and 1",
            ));
        }

        if !(self.default_friction >= 0.0 && self.default_friction.is_finite()) {
            return Err(RigidError::invalid_config(
                "default_friction must be finite and non-negative",
            ));
        }

        if !(self.default_restitution >= 0.0 && self.default_restitution.is_finite()) {
            return Err(RigidError::invalid_config(
                "default_restitution must be finite and non-negative",
            ));
        }

        Ok(())
    }
}

/// Thresholds for automatic sleeping.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepConfig {
    /// Master switch; when off no body is put to sleep automatically.
    pub enabled: bool,
    /// Linear speed below which a body counts as still (m/s).
    pub linear_threshold: f64,
    /// Angular speed below which a body counts as still (rad/s).
    pub angular_threshold: f64,
    /// Time a body must stay still before sleeping (s).
    pub time_to_sleep: f64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            linear_threshold: 0.8,
            angular_threshold: 1.0,
            time_to_sleep: 2.0,
        }
    }
}

impl SleepConfig {
    /// Validate the thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConfig`] for negative or non-finite values.
    pub fn validate(&self) -> crate::Result<()> {
        let ok = |v: f64| v >= 0.0 && v.is_finite();
        if !ok(self.linear_threshold) || !ok(self.angular_threshold) || !ok(self.time_to_sleep) {
            return Err(RigidError::invalid_config(
                "sleep thresholds must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WorldConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gravity, Vector3::new(0.0, -10.0, 0.0));
        assert!((config.frequency() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(WorldConfig::realtime().validate().is_ok());
        assert!(WorldConfig::high_accuracy().validate().is_ok());
        assert!(SolverConfig::fast().validate().is_ok());
        assert_eq!(
            WorldConfig::default().zero_gravity().gravity,
            Vector3::zeros()
        );
        assert!(!WorldConfig::default().no_sleeping().sleep.enabled);
    }

    #[test]
    fn test_invalid_timestep() {
        let err = WorldConfig::default()
            .with_fixed_timestep(0.0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RigidError::InvalidTimestep(_)));

        let err = WorldConfig::default()
            .with_fixed_timestep(2.0)
            .validate()
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_invalid_solver() {
        assert!(
            SolverConfig::default()
                .with_iterations(0)
                .validate()
                .is_err()
        );

        let mut solver = SolverConfig::default();
        solver.erp = 1.5;
        assert!(solver.validate().is_err());

        let mut solver = SolverConfig::default();
        solver.cfm = -0.1;
        assert!(solver.validate().is_err());
    }

    #[test]
    fn test_materials_clamp() {
        let solver = SolverConfig::default().materials(-1.0, 0.3);
        assert_eq!(solver.default_friction, 0.0);
        assert_eq!(solver.default_restitution, 0.3);
    }
}
