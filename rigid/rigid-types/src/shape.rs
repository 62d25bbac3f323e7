//! Collision shape geometry.
//!
//! Shapes are pure geometry. Mass and inertia are derived on demand from a
//! shape plus a caller-supplied mass; see [`Shape::mass_properties`].
//!
//! A [`Shape::Compound`] refers to its children by [`ShapeId`]. It does not
//! own them: the registry that issued the IDs owns every shape, and a child
//! must be removed from all compounds before it can be deleted.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::require_positive;
use crate::{MassProperties, Pose};

/// Unique identifier for a shape in a world's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShapeId(pub u64);

impl ShapeId {
    /// Create a new shape ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for ShapeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Shape({})", self.0)
    }
}

/// Local axis a cylinder is aligned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CylinderAxis {
    /// Along local X.
    X,
    /// Along local Y.
    Y,
    /// Along local Z.
    Z,
}

impl CylinderAxis {
    /// Index of the axis (0, 1 or 2).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Unit vector along the axis.
    #[must_use]
    pub fn unit(self) -> Vector3<f64> {
        let mut v = Vector3::zeros();
        v[self.index()] = 1.0;
        v
    }
}

/// Discriminant of a [`Shape`], cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeType {
    /// Axis-aligned box.
    Box,
    /// Sphere.
    Sphere,
    /// Cylinder along one local axis.
    Cylinder(CylinderAxis),
    /// Compound of child shapes.
    Compound,
}

/// A child entry of a compound shape.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompoundChild {
    /// The referenced shape. Not owned by the compound.
    pub shape: ShapeId,
    /// Pose of the child in the compound's frame.
    pub local: Pose,
}

/// Collision geometry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// Box centered at the origin.
    Box {
        /// Half-extents along local X, Y and Z.
        half_extents: Vector3<f64>,
    },
    /// Sphere centered at the origin.
    Sphere {
        /// Sphere radius.
        radius: f64,
    },
    /// Cylinder centered at the origin.
    Cylinder {
        /// Axis the cylinder runs along.
        axis: CylinderAxis,
        /// Radius of the circular cross-section.
        radius: f64,
        /// Half of the cylinder's length.
        half_length: f64,
    },
    /// Ordered collection of child shapes with local poses.
    Compound {
        /// Children in insertion order.
        children: Vec<CompoundChild>,
    },
}

impl Shape {
    /// Create a box shape.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RigidError::Degenerate`] unless every half-extent is positive and finite.
    pub fn cuboid(half_extents: Vector3<f64>) -> crate::Result<Self> {
        require_positive("box half-extent x", half_extents.x)?;
        require_positive("box half-extent y", half_extents.y)?;
        require_positive("box half-extent z", half_extents.z)?;
        Ok(Self::Box { half_extents })
    }

    /// Create a sphere shape.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RigidError::Degenerate`] unless the radius is positive and finite.
    pub fn sphere(radius: f64) -> crate::Result<Self> {
        Ok(Self::Sphere {
            radius: require_positive("sphere radius", radius)?,
        })
    }

    /// Create a cylinder shape.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RigidError::Degenerate`] unless both dimensions are positive and finite.
    pub fn cylinder(axis: CylinderAxis, radius: f64, half_length: f64) -> crate::Result<Self> {
        Ok(Self::Cylinder {
            axis,
            radius: require_positive("cylinder radius", radius)?,
            half_length: require_positive("cylinder half-length", half_length)?,
        })
    }

    /// Create an empty compound.
    #[must_use]
    pub fn compound() -> Self {
        Self::Compound {
            children: Vec::new(),
        }
    }

    /// The shape's discriminant.
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Box { .. } => ShapeType::Box,
            Self::Sphere { .. } => ShapeType::Sphere,
            Self::Cylinder { axis, .. } => ShapeType::Cylinder(*axis),
            Self::Compound { .. } => ShapeType::Compound,
        }
    }

    /// Whether this shape is a compound.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound { .. })
    }

    /// Children of a compound, empty for primitives.
    #[must_use]
    pub fn children(&self) -> &[CompoundChild] {
        match self {
            Self::Compound { children } => children,
            _ => &[],
        }
    }

    /// Half-extents of the local bounding box of a primitive.
    ///
    /// Returns `None` for compounds, whose bounds depend on their children.
    #[must_use]
    pub fn primitive_half_extents(&self) -> Option<Vector3<f64>> {
        match self {
            Self::Box { half_extents } => Some(*half_extents),
            Self::Sphere { radius } => Some(Vector3::repeat(*radius)),
            Self::Cylinder {
                axis,
                radius,
                half_length,
            } => {
                let mut e = Vector3::repeat(*radius);
                e[axis.index()] = *half_length;
                Some(e)
            }
            Self::Compound { .. } => None,
        }
    }

    /// Support point of a primitive in local coordinates: the point of the
    /// shape furthest along `direction`.
    ///
    /// Returns `None` for compounds.
    #[must_use]
    pub fn local_support(&self, direction: &Vector3<f64>) -> Option<Point3<f64>> {
        match self {
            Self::Box { half_extents } => Some(Point3::new(
                half_extents.x.copysign(direction.x),
                half_extents.y.copysign(direction.y),
                half_extents.z.copysign(direction.z),
            )),
            Self::Sphere { radius } => {
                let n = direction.norm();
                if n < 1e-12 {
                    Some(Point3::new(*radius, 0.0, 0.0))
                } else {
                    Some(Point3::from(direction * (*radius / n)))
                }
            }
            Self::Cylinder {
                axis,
                radius,
                half_length,
            } => {
                let a = axis.index();
                let mut radial = *direction;
                radial[a] = 0.0;
                let rn = radial.norm();
                let mut p = if rn < 1e-12 {
                    Vector3::zeros()
                } else {
                    radial * (*radius / rn)
                };
                p[a] = half_length.copysign(direction[a]);
                Some(Point3::from(p))
            }
            Self::Compound { .. } => None,
        }
    }

    /// Mass properties of a primitive with the given mass.
    ///
    /// Compounds are resolved by the registry, which can see their children.
    #[must_use]
    pub fn mass_properties(&self, mass: f64) -> Option<MassProperties> {
        match self {
            Self::Box { half_extents } => Some(MassProperties::box_shape(mass, *half_extents)),
            Self::Sphere { radius } => Some(MassProperties::sphere(mass, *radius)),
            Self::Cylinder {
                axis,
                radius,
                half_length,
            } => Some(MassProperties::cylinder(
                mass,
                *radius,
                *half_length,
                axis.index(),
            )),
            Self::Compound { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constructors_reject_degenerate() {
        assert!(Shape::cuboid(Vector3::new(1.0, 0.0, 1.0)).is_err());
        assert!(Shape::cuboid(Vector3::new(1.0, -1.0, 1.0)).is_err());
        assert!(Shape::sphere(0.0).is_err());
        assert!(Shape::sphere(f64::NAN).is_err());
        assert!(Shape::cylinder(CylinderAxis::Y, 1.0, 0.0).is_err());
        assert!(Shape::cylinder(CylinderAxis::Y, -1.0, 1.0).is_err());
        assert!(Shape::cuboid(Vector3::new(1.0, 2.0, 3.0)).is_ok());
    }

    #[test]
    fn test_shape_type() {
        assert_eq!(Shape::sphere(1.0).unwrap().shape_type(), ShapeType::Sphere);
        assert_eq!(
            Shape::cylinder(CylinderAxis::X, 1.0, 2.0)
                .unwrap()
                .shape_type(),
            ShapeType::Cylinder(CylinderAxis::X)
        );
        assert_eq!(Shape::compound().shape_type(), ShapeType::Compound);
    }

    #[test]
    fn test_cylinder_half_extents_per_axis() {
        let x = Shape::cylinder(CylinderAxis::X, 0.5, 2.0).unwrap();
        let y = Shape::cylinder(CylinderAxis::Y, 0.5, 2.0).unwrap();
        let z = Shape::cylinder(CylinderAxis::Z, 0.5, 2.0).unwrap();
        assert_eq!(
            x.primitive_half_extents().unwrap(),
            Vector3::new(2.0, 0.5, 0.5)
        );
        assert_eq!(
            y.primitive_half_extents().unwrap(),
            Vector3::new(0.5, 2.0, 0.5)
        );
        assert_eq!(
            z.primitive_half_extents().unwrap(),
            Vector3::new(0.5, 0.5, 2.0)
        );
    }

    #[test]
    fn test_support_points() {
        let b = Shape::cuboid(Vector3::new(1.0, 2.0, 3.0)).unwrap();
        let p = b.local_support(&Vector3::new(-1.0, 1.0, -0.1)).unwrap();
        assert_eq!(p, Point3::new(-1.0, 2.0, -3.0));

        let s = Shape::sphere(2.0).unwrap();
        let p = s.local_support(&Vector3::new(0.0, 3.0, 0.0)).unwrap();
        assert_relative_eq!(p, Point3::new(0.0, 2.0, 0.0), epsilon = 1e-12);

        let c = Shape::cylinder(CylinderAxis::Y, 1.0, 0.5).unwrap();
        let p = c.local_support(&Vector3::new(1.0, -1.0, 0.0)).unwrap();
        assert_relative_eq!(p, Point3::new(1.0, -0.5, 0.0), epsilon = 1e-12);

        assert!(Shape::compound().local_support(&Vector3::x()).is_none());
    }

    #[test]
    fn test_primitive_mass_properties() {
        let b = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0)).unwrap();
        let props = b.mass_properties(3.0).unwrap();
        assert_relative_eq!(props.inertia.x, 2.0, epsilon = 1e-12);

        assert!(Shape::compound().mass_properties(1.0).is_none());
    }
}
