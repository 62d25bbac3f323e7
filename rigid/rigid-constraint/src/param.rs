//! Generic ERP/CFM overrides addressed by parameter and axis.

use rigid_types::{Result, RigidError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of addressable axes: three linear (0..=2) then three angular (3..=5).
pub const NUM_AXES: usize = 6;

/// Tunable solver parameter of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstraintParam {
    /// Error reduction for locked rows.
    Erp = 1,
    /// Error reduction for limit rows.
    StopErp = 2,
    /// Softness for locked rows.
    Cfm = 3,
    /// Softness for limit rows.
    StopCfm = 4,
}

impl ConstraintParam {
    /// All parameters, in raw-id order.
    pub const ALL: [Self; 4] = [Self::Erp, Self::StopErp, Self::Cfm, Self::StopCfm];

    /// Parse the raw id (1..=4).
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Erp),
            2 => Some(Self::StopErp),
            3 => Some(Self::Cfm),
            4 => Some(Self::StopCfm),
            _ => None,
        }
    }

    /// Raw id.
    #[must_use]
    pub fn raw(self) -> i32 {
        self as i32
    }

    /// Whether this is an error-reduction parameter (as opposed to softness).
    #[must_use]
    pub fn is_erp(self) -> bool {
        matches!(self, Self::Erp | Self::StopErp)
    }

    fn slot(self) -> usize {
        match self {
            Self::Erp => 0,
            Self::StopErp => 1,
            Self::Cfm => 2,
            Self::StopCfm => 3,
        }
    }
}

impl TryFrom<i32> for ConstraintParam {
    type Error = RigidError;

    fn try_from(raw: i32) -> Result<Self> {
        Self::from_raw(raw).ok_or_else(|| {
            RigidError::invalid_config(format!("unknown constraint parameter {raw}"))
        })
    }
}

/// Per-axis overrides of the solver's default ERP and CFM.
///
/// Unset entries fall back to the world's [`SolverConfig`](rigid_types::SolverConfig).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParamSet {
    values: [[Option<f64>; NUM_AXES]; 4],
}

impl ParamSet {
    /// No overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter on one axis, or on every axis when `axis` is `None`.
    ///
    /// ERP values must lie in `[0, 1]`; CFM values must be non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] for an out-of-range value and
    /// [`RigidError::InvalidAxis`] for an axis of 6 or more.
    pub fn set(&mut self, param: ConstraintParam, value: f64, axis: Option<usize>) -> Result<()> {
        let in_range = if param.is_erp() {
            (0.0..=1.0).contains(&value)
        } else {
            value >= 0.0 && value.is_finite()
        };
        if !in_range {
            return Err(RigidError::degenerate(format!(
                "{param:?} value {value} out of range"
            )));
        }

        let row = &mut self.values[param.slot()];
        match axis {
            None => row.fill(Some(value)),
            Some(i) => *row.get_mut(i).ok_or(RigidError::InvalidAxis {
                index: i,
                limit: NUM_AXES,
            })? = Some(value),
        }
        Ok(())
    }

    /// Read an override. `None` as axis reads axis 0.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidAxis`] for an axis of 6 or more.
    pub fn get(&self, param: ConstraintParam, axis: Option<usize>) -> Result<Option<f64>> {
        let i = axis.unwrap_or(0);
        self.values[param.slot()]
            .get(i)
            .copied()
            .ok_or(RigidError::InvalidAxis {
                index: i,
                limit: NUM_AXES,
            })
    }

    /// Effective value on `axis`, falling back to `default`.
    #[must_use]
    pub fn resolve(&self, param: ConstraintParam, axis: usize, default: f64) -> f64 {
        self.values[param.slot()]
            .get(axis)
            .copied()
            .flatten()
            .unwrap_or(default)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_ids() {
        for p in ConstraintParam::ALL {
            assert_eq!(ConstraintParam::from_raw(p.raw()), Some(p));
        }
        assert_eq!(ConstraintParam::from_raw(0), None);
        assert!(ConstraintParam::try_from(5).unwrap_err().is_config_error());
        assert_eq!(
            ConstraintParam::try_from(2).unwrap(),
            ConstraintParam::StopErp
        );
    }

    #[test]
    fn test_set_all_and_one() {
        let mut params = ParamSet::new();
        params.set(ConstraintParam::Erp, 0.5, None).unwrap();
        params.set(ConstraintParam::Erp, 0.9, Some(3)).unwrap();

        let erp = |axis| params.get(ConstraintParam::Erp, Some(axis)).unwrap();
        assert_eq!(erp(0), Some(0.5));
        assert_eq!(erp(3), Some(0.9));
        assert_eq!(params.get(ConstraintParam::Cfm, Some(3)).unwrap(), None);
        assert_eq!(params.resolve(ConstraintParam::Cfm, 3, 0.01), 0.01);
        assert_eq!(params.resolve(ConstraintParam::Erp, 3, 0.2), 0.9);
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut params = ParamSet::new();
        assert!(matches!(
            params.set(ConstraintParam::Cfm, 0.1, Some(6)),
            Err(RigidError::InvalidAxis { index: 6, limit: 6 })
        ));
        assert!(
            params
                .set(ConstraintParam::Erp, 1.5, None)
                .unwrap_err()
                .is_degenerate()
        );
        assert!(params.set(ConstraintParam::StopCfm, -1.0, None).is_err());
        assert!(params.get(ConstraintParam::Erp, Some(9)).is_err());
    }
}
