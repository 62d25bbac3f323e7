//! Per-degree-of-freedom limits.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position bounds on one degree of freedom.
///
/// Three regimes are encoded in the bounds themselves:
///
/// - `lower > upper`: the degree of freedom is free
/// - `lower == upper`: it is locked at that value
/// - otherwise it may move within `[lower, upper]`
///
/// Bounds are never reordered, so `new(1.0, -1.0)` is a free limit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DofLimit {
    lower: f64,
    upper: f64,
}

impl DofLimit {
    /// Create limits from the given bounds.
    #[must_use]
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// No limit at all.
    #[must_use]
    pub fn free() -> Self {
        Self::new(1.0, -1.0)
    }

    /// Lock the degree of freedom at `value`.
    #[must_use]
    pub fn locked(value: f64) -> Self {
        Self::new(value, value)
    }

    /// Symmetric range `[-bound, bound]`.
    #[must_use]
    pub fn symmetric(bound: f64) -> Self {
        Self::new(-bound.abs(), bound.abs())
    }

    /// Lower bound.
    #[must_use]
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper bound.
    #[must_use]
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Replace the lower bound.
    pub fn set_lower(&mut self, lower: f64) {
        self.lower = lower;
    }

    /// Replace the upper bound.
    pub fn set_upper(&mut self, upper: f64) {
        self.upper = upper;
    }

    /// Whether the limit is disabled.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.lower > self.upper
    }

    /// Whether the degree of freedom is pinned to one value.
    #[allow(clippy::float_cmp)]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lower == self.upper
    }

    /// Check if a position is allowed. Free limits allow everything.
    #[must_use]
    pub fn contains(&self, position: f64) -> bool {
        self.is_free() || (position >= self.lower && position <= self.upper)
    }

    /// Classify a position against the limits.
    ///
    /// A position sitting exactly on a bound counts as being at that bound,
    /// so the solver keeps it from moving further out.
    #[must_use]
    pub fn state(&self, position: f64) -> LimitState {
        if self.is_free() {
            LimitState::Free
        } else if self.is_locked() {
            LimitState::Locked(position - self.lower)
        } else if position <= self.lower {
            LimitState::AtLower(self.lower - position)
        } else if position >= self.upper {
            LimitState::AtUpper(position - self.upper)
        } else {
            LimitState::Free
        }
    }
}

impl Default for DofLimit {
    fn default() -> Self {
        Self::free()
    }
}

/// Where a position sits relative to its [`DofLimit`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LimitState {
    /// Inside the range, or no limit.
    Free,

    /// Locked limit; contains the signed error `position - target`.
    Locked(f64),

    /// At or past the lower bound; contains the (non-negative) overshoot.
    AtLower(f64),

    /// At or past the upper bound; contains the (non-negative) overshoot.
    AtUpper(f64),
}

impl LimitState {
    /// Check if a limit row is needed.
    #[must_use]
    pub fn is_at_limit(&self) -> bool {
        !matches!(self, Self::Free)
    }

    /// Distance past the bound (0 if free).
    #[must_use]
    pub fn penetration(&self) -> f64 {
        match self {
            Self::Free => 0.0,
            Self::Locked(e) => e.abs(),
            Self::AtLower(d) | Self::AtUpper(d) => *d,
        }
    }
}
