//! Implicit spring-damper on one degree of freedom.
//!
//! Springs are solved as soft constraint rows rather than explicit forces.
//! For stiffness `k`, damping `c` and step `h` the row uses
//!
//! ```text
//! cfm  = 1 / (h (h k + c))
//! bias = k / (h k + c) · (x - x_eq)
//! ```
//!
//! which stays stable for any stiffness.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Spring and damper acting on one degree of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DofSpring {
    stiffness: f64,
    stiffness_limit_aware: bool,
    damping: f64,
    damping_limit_aware: bool,
    equilibrium: f64,
}

/// Softness of one spring row for a given step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringRow {
    /// Velocity bias per unit of displacement from equilibrium.
    pub bias_rate: f64,
    /// Constraint force mixing for the row.
    pub cfm: f64,
}

impl DofSpring {
    /// A spring with the given stiffness and damping, always active.
    #[must_use]
    pub fn new(stiffness: f64, damping: f64) -> Self {
        Self {
            stiffness,
            damping,
            ..Self::default()
        }
    }

    /// Stiffness (N/m or N·m/rad).
    #[must_use]
    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    /// Damping (N·s/m or N·m·s/rad).
    #[must_use]
    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// Rest position.
    #[must_use]
    pub fn equilibrium(&self) -> f64 {
        self.equilibrium
    }

    /// Whether the stiffness only acts outside the limit range.
    #[must_use]
    pub fn stiffness_limit_aware(&self) -> bool {
        self.stiffness_limit_aware
    }

    /// Whether the damping only acts outside the limit range.
    #[must_use]
    pub fn damping_limit_aware(&self) -> bool {
        self.damping_limit_aware
    }

    /// Set the stiffness.
    pub fn set_stiffness(&mut self, stiffness: f64, limit_aware: bool) {
        self.stiffness = stiffness;
        self.stiffness_limit_aware = limit_aware;
    }

    /// Set the damping.
    pub fn set_damping(&mut self, damping: f64, limit_aware: bool) {
        self.damping = damping;
        self.damping_limit_aware = limit_aware;
    }

    /// Set the rest position.
    pub fn set_equilibrium(&mut self, equilibrium: f64) {
        self.equilibrium = equilibrium;
    }

    /// Stiffness and damping in effect, given whether the degree of freedom
    /// currently lies outside its limits.
    #[must_use]
    pub fn coefficients(&self, outside_limits: bool) -> (f64, f64) {
        let k = if self.stiffness_limit_aware && !outside_limits {
            0.0
        } else {
            self.stiffness
        };
        let c = if self.damping_limit_aware && !outside_limits {
            0.0
        } else {
            self.damping
        };
        (k, c)
    }

    /// Soft row parameters for a step, or `None` when the spring is slack.
    #[must_use]
    pub fn row(&self, outside_limits: bool, dt: f64) -> Option<SpringRow> {
        let (k, c) = self.coefficients(outside_limits);
        let denom = dt * k + c;
        if denom <= 0.0 || dt <= 0.0 {
            return None;
        }
        Some(SpringRow {
            bias_rate: k / denom,
            cfm: 1.0 / (dt * denom),
        })
    }
}
