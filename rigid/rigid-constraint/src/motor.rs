//! Velocity motors.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How much effort a motor may spend.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MotorBudget {
    /// Maximum impulse per sub-step (N·s or N·m·s).
    Impulse(f64),
    /// Maximum force or torque; the per-step impulse is `force * dt`.
    Force(f64),
}

impl MotorBudget {
    /// Impulse available during a step of length `dt`.
    #[must_use]
    pub fn impulse(&self, dt: f64) -> f64 {
        match *self {
            Self::Impulse(j) => j,
            Self::Force(f) => f * dt,
        }
    }
}

/// A motor that drives one degree of freedom toward a target velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointMotor {
    enabled: bool,
    target_velocity: f64,
    budget: MotorBudget,
}

impl JointMotor {
    /// A disabled motor limited by impulse.
    #[must_use]
    pub fn impulse_limited() -> Self {
        Self {
            enabled: false,
            target_velocity: 0.0,
            budget: MotorBudget::Impulse(0.0),
        }
    }

    /// A disabled motor limited by force.
    #[must_use]
    pub fn force_limited() -> Self {
        Self {
            enabled: false,
            target_velocity: 0.0,
            budget: MotorBudget::Force(0.0),
        }
    }

    /// Whether the motor produces a row.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Switch the motor on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Target velocity (rad/s or m/s).
    #[must_use]
    pub fn target_velocity(&self) -> f64 {
        self.target_velocity
    }

    /// Set the target velocity.
    pub fn set_target_velocity(&mut self, velocity: f64) {
        self.target_velocity = velocity;
    }

    /// Effort limit.
    #[must_use]
    pub fn budget(&self) -> MotorBudget {
        self.budget
    }

    /// Replace the magnitude of the effort limit, keeping its kind.
    pub fn set_max_effort(&mut self, max: f64) {
        self.budget = match self.budget {
            MotorBudget::Impulse(_) => MotorBudget::Impulse(max),
            MotorBudget::Force(_) => MotorBudget::Force(max),
        };
    }

    /// Impulse bound for one step, or `None` when the motor is off.
    #[must_use]
    pub fn step_impulse(&self, dt: f64) -> Option<f64> {
        self.enabled.then(|| self.budget.impulse(dt).max(0.0))
    }
}

impl Default for JointMotor {
    fn default() -> Self {
        Self::impulse_limited()
    }
}
