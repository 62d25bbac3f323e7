//! The single Euler-angle convention used across the world API.
//!
//! Yaw turns about the Y axis, pitch about X, roll about Z. Angles compose
//! as
//!
//! ```text
//! R = R_y(yaw) · R_x(pitch) · R_z(roll)
//! ```
//!
//! so a vector is rolled first, then pitched, then yawed. Compound children,
//! body rotation setters and hinge frames all go through this type.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Yaw, pitch and roll in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EulerAngles {
    /// Rotation about Y.
    pub yaw: f64,
    /// Rotation about X.
    pub pitch: f64,
    /// Rotation about Z.
    pub roll: f64,
}

impl EulerAngles {
    /// Create from yaw, pitch and roll.
    #[must_use]
    pub const fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    /// Read angles laid out per axis: `x` is pitch, `y` is yaw, `z` is roll.
    #[must_use]
    pub fn from_axes(v: &Vector3<f64>) -> Self {
        Self {
            yaw: v.y,
            pitch: v.x,
            roll: v.z,
        }
    }

    /// Build the rotation.
    #[must_use]
    pub fn to_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.yaw)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.pitch)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.roll)
    }

    /// Recover angles from a rotation.
    ///
    /// Pitch is returned in `[-π/2, π/2]`. At the poles roll is folded into yaw.
    #[must_use]
    pub fn from_quaternion(q: &UnitQuaternion<f64>) -> Self {
        let m: Matrix3<f64> = q.to_rotation_matrix().into_inner();
        let sin_pitch = (-m[(1, 2)]).clamp(-1.0, 1.0);
        let pitch = sin_pitch.asin();

        if sin_pitch.abs() > 1.0 - 1e-9 {
            Self {
                yaw: (-m[(2, 0)]).atan2(m[(0, 0)]),
                pitch,
                roll: 0.0,
            }
        } else {
            Self {
                yaw: m[(0, 2)].atan2(m[(2, 2)]),
                pitch,
                roll: m[(1, 0)].atan2(m[(1, 1)]),
            }
        }
    }

    /// Check that all angles are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.yaw.is_finite() && self.pitch.is_finite() && self.roll.is_finite()
    }
}
