//! Shape registry.
//!
//! Shapes live in the world's [`ShapeRegistry`] and are referred to by
//! [`ShapeId`]. Compounds hold IDs of their children rather than owning
//! them, so the registry enforces the ownership rules:
//!
//! - a child must exist when it is added, and adding it must not make a
//!   compound contain itself
//! - removing a child from a compound never deletes the child
//! - a shape listed as a compound child cannot be deleted
//!
//! (The world adds one more rule: a shape used by a body cannot be deleted.)

use hashbrown::HashMap;
use nalgebra::Vector3;
use rigid_types::{
    CompoundChild, CylinderAxis, MassProperties, Pose, Result, RigidError, Shape, ShapeId,
    ShapeType,
};
use tracing::debug;

use crate::broad_phase::Aabb;

/// Owner of every shape in a world.
#[derive(Debug, Clone)]
pub struct ShapeRegistry {
    shapes: HashMap<ShapeId, Shape>,
    next_id: u64,
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shapes: HashMap::new(),
            next_id: 1,
        }
    }

    /// Number of shapes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Whether `id` refers to a live shape.
    #[must_use]
    pub fn contains(&self, id: ShapeId) -> bool {
        self.shapes.contains_key(&id)
    }

    /// Look up a shape.
    #[must_use]
    pub fn get(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    /// Look up a shape or fail with [`RigidError::InvalidShapeId`].
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidShapeId`] if `id` is unknown.
    pub fn require(&self, id: ShapeId) -> Result<&Shape> {
        self.shapes
            .get(&id)
            .ok_or(RigidError::InvalidShapeId(id.raw()))
    }

    /// The kind of shape `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidShapeId`] if `id` is unknown.
    pub fn shape_type(&self, id: ShapeId) -> Result<ShapeType> {
        self.require(id).map(Shape::shape_type)
    }

    /// All shape IDs, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = ShapeId> + '_ {
        self.shapes.keys().copied()
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Register an already validated shape.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::CapacityExceeded`] once shape IDs run out.
    pub fn insert(&mut self, shape: Shape) -> Result<ShapeId> {
        let id = ShapeId::new(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(RigidError::CapacityExceeded { what: "shape" })?;
        debug!(shape = %id, kind = ?shape.shape_type(), "shape created");
        self.shapes.insert(id, shape);
        Ok(id)
    }

    /// Create a box from its half-extents.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] unless every half-extent is finite and
    /// positive.
    pub fn create_box(&mut self, half_extents: Vector3<f64>) -> Result<ShapeId> {
        self.insert(Shape::cuboid(half_extents)?)
    }

    /// Create a sphere.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] unless `radius` is finite and positive.
    pub fn create_sphere(&mut self, radius: f64) -> Result<ShapeId> {
        self.insert(Shape::sphere(radius)?)
    }

    /// Create a cylinder along `axis`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] unless both dimensions are finite and
    /// positive.
    pub fn create_cylinder(
        &mut self,
        axis: CylinderAxis,
        radius: f64,
        half_length: f64,
    ) -> Result<ShapeId> {
        self.insert(Shape::cylinder(axis, radius, half_length)?)
    }

    /// Create an empty compound.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::CapacityExceeded`] once shape IDs run out.
    pub fn create_compound(&mut self) -> Result<ShapeId> {
        self.insert(Shape::compound())
    }

    // =========================================================================
    // Compounds
    // =========================================================================

    /// Append `child` to `compound` at `local` and return its index.
    ///
    /// # Errors
    ///
    /// - [`RigidError::InvalidShapeId`] if either shape is unknown
    /// - [`RigidError::NotACompound`] if `compound` is a primitive
    /// - [`RigidError::CompoundCycle`] if `child` is `compound` or contains it
    /// - [`RigidError::Degenerate`] if `local` is not finite
    pub fn add_child(&mut self, compound: ShapeId, child: ShapeId, local: Pose) -> Result<usize> {
        self.require(child)?;
        if !self.require(compound)?.is_compound() {
            return Err(RigidError::NotACompound(compound.raw()));
        }
        if !local.is_finite() {
            return Err(RigidError::degenerate("compound child pose is not finite"));
        }
        if self.reaches(child, compound) {
            return Err(RigidError::CompoundCycle {
                compound: compound.raw(),
                child: child.raw(),
            });
        }

        let children = self.children_mut(compound)?;
        children.push(CompoundChild {
            shape: child,
            local,
        });
        Ok(children.len() - 1)
    }

    /// Remove the child at `index` and return its ID. The child itself
    /// stays registered.
    ///
    /// # Errors
    ///
    /// - [`RigidError::InvalidShapeId`] if `compound` is unknown
    /// - [`RigidError::NotACompound`] if it is a primitive
    /// - [`RigidError::ChildIndexOutOfRange`] if `index` is past the last child
    pub fn remove_child(&mut self, compound: ShapeId, index: usize) -> Result<ShapeId> {
        let children = self.children_mut(compound)?;
        if index >= children.len() {
            return Err(RigidError::ChildIndexOutOfRange {
                compound: compound.raw(),
                index,
                len: children.len(),
            });
        }
        Ok(children.remove(index).shape)
    }

    /// Number of children of `compound`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidShapeId`] for an unknown shape and
    /// [`RigidError::NotACompound`] for a primitive.
    pub fn num_children(&self, compound: ShapeId) -> Result<usize> {
        match self.require(compound)? {
            Shape::Compound { children } => Ok(children.len()),
            _ => Err(RigidError::NotACompound(compound.raw())),
        }
    }

    fn children_mut(&mut self, compound: ShapeId) -> Result<&mut Vec<CompoundChild>> {
        match self.shapes.get_mut(&compound) {
            Some(Shape::Compound { children }) => Ok(children),
            Some(_) => Err(RigidError::NotACompound(compound.raw())),
            None => Err(RigidError::InvalidShapeId(compound.raw())),
        }
    }

    /// Whether `target` is `from` or a descendant of it.
    fn reaches(&self, from: ShapeId, target: ShapeId) -> bool {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if let Some(shape) = self.shapes.get(&id) {
                stack.extend(shape.children().iter().map(|c| c.shape));
            }
        }
        false
    }

    /// The compound that lists `id` as a child, if any.
    #[must_use]
    pub fn referencing_compound(&self, id: ShapeId) -> Option<ShapeId> {
        self.shapes.iter().find_map(|(&owner, shape)| {
            shape
                .children()
                .iter()
                .any(|c| c.shape == id)
                .then_some(owner)
        })
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete a shape.
    ///
    /// # Errors
    ///
    /// [`RigidError::ShapeReferenced`] while a compound still lists it.
    pub fn delete(&mut self, id: ShapeId) -> Result<Shape> {
        self.require(id)?;
        if let Some(compound) = self.referencing_compound(id) {
            return Err(RigidError::ShapeReferenced {
                shape: id.raw(),
                compound: compound.raw(),
            });
        }
        debug!(shape = %id, "shape deleted");
        self.shapes
            .remove(&id)
            .ok_or(RigidError::InvalidShapeId(id.raw()))
    }

    /// Drop every shape. Issued IDs stay retired.
    pub fn clear(&mut self) {
        self.shapes.clear();
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Bounds of shape `id` placed at `pose`.
    ///
    /// Pass [`Pose::identity`] for the box in the shape's own frame. An
    /// empty compound has zero-size bounds at the pose origin.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidShapeId`] if `id` or a nested child is unknown.
    pub fn local_aabb(&self, id: ShapeId, pose: &Pose) -> Result<Aabb> {
        match self.require(id)? {
            Shape::Compound { children } => {
                let mut bounds: Option<Aabb> = None;
                for child in children {
                    let child_aabb = self.local_aabb(child.shape, &pose.compose(&child.local))?;
                    bounds = Some(bounds.map_or(child_aabb, |b| b.merged(&child_aabb)));
                }
                Ok(bounds.unwrap_or_else(|| Aabb::new(pose.position, pose.position)))
            }
            Shape::Sphere { radius } => {
                Ok(Aabb::from_center(pose.position, Vector3::repeat(*radius)))
            }
            primitive => {
                let half = primitive
                    .primitive_half_extents()
                    .unwrap_or_else(Vector3::zeros);
                Ok(cylinder_or_box_bounds(primitive, pose, &half))
            }
        }
    }

    /// Mass properties of shape `id` with total `mass`.
    ///
    /// A compound is treated as a solid box filling its local bounds.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidShapeId`] for an unknown shape and
    /// [`RigidError::Degenerate`] for a non-finite or negative mass, or for a
    /// positive mass on a compound with no volume (no leaf children).
    pub fn compute_inertia(&self, id: ShapeId, mass: f64) -> Result<MassProperties> {
        if !mass.is_finite() || mass < 0.0 {
            return Err(RigidError::degenerate(format!(
                "mass must be finite and non-negative, got {mass}"
            )));
        }
        let shape = self.require(id)?;
        if mass == 0.0 {
            return Ok(MassProperties::fixed());
        }
        match shape.mass_properties(mass) {
            Some(props) => Ok(props),
            None => {
                let half = self.local_aabb(id, &Pose::identity())?.half_extents();
                if half.iter().any(|h| *h <= 0.0) {
                    return Err(RigidError::degenerate(format!(
                        "compound {id} has no volume to carry mass {mass}"
                    )));
                }
                Ok(MassProperties::box_shape(mass, half))
            }
        }
    }
}

/// Tight bounds for a cylinder, box bounds for everything else.
fn cylinder_or_box_bounds(shape: &Shape, pose: &Pose, half: &Vector3<f64>) -> Aabb {
    if let Shape::Cylinder {
        axis,
        radius,
        half_length,
    } = shape
    {
        // Extent along world axis i: |h a_i| + r sqrt(1 - a_i²).
        let a = pose.rotation * axis.unit();
        let extent = Vector3::from_fn(|i, _| {
            (half_length * a[i]).abs() + radius * (1.0 - a[i] * a[i]).max(0.0).sqrt()
        });
        return Aabb::from_center(pose.position, extent);
    }
    Aabb::from_oriented_box(pose, half)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, UnitQuaternion};
    use std::f64::consts::FRAC_PI_2;

    fn unit_box(reg: &mut ShapeRegistry) -> ShapeId {
        reg.create_box(Vector3::repeat(0.5)).unwrap()
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut reg = ShapeRegistry::new();
        let a = reg.create_sphere(1.0).unwrap();
        reg.delete(a).unwrap();
        let b = reg.create_sphere(1.0).unwrap();
        assert_ne!(a, b);
        assert!(reg.get(a).is_none());
        assert!(reg.shape_type(a).unwrap_err().is_handle_error());
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        let mut reg = ShapeRegistry::new();
        let flat = reg.create_box(Vector3::new(1.0, 0.0, 1.0)).unwrap_err();
        assert!(flat.is_degenerate());
        assert!(reg.create_sphere(-1.0).is_err());
        let endless = reg.create_cylinder(CylinderAxis::Y, 1.0, f64::INFINITY);
        assert!(endless.is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_compound_children() {
        let mut reg = ShapeRegistry::new();
        let compound = reg.create_compound().unwrap();
        let a = unit_box(&mut reg);
        let b = reg.create_sphere(0.25).unwrap();

        assert_eq!(reg.add_child(compound, a, Pose::identity()).unwrap(), 0);
        assert_eq!(
            reg.add_child(compound, b, Pose::from_position(Point3::new(2.0, 0.0, 0.0)))
                .unwrap(),
            1
        );
        assert_eq!(reg.num_children(compound).unwrap(), 2);

        assert_eq!(reg.remove_child(compound, 0).unwrap(), a);
        assert_eq!(reg.num_children(compound).unwrap(), 1);
        assert!(reg.contains(a));
        assert!(matches!(
            reg.remove_child(compound, 5),
            Err(RigidError::ChildIndexOutOfRange { index: 5, len: 1, .. })
        ));
    }

    #[test]
    fn test_compound_rules() {
        let mut reg = ShapeRegistry::new();
        let outer = reg.create_compound().unwrap();
        let inner = reg.create_compound().unwrap();
        let leaf = unit_box(&mut reg);

        assert!(matches!(
            reg.add_child(leaf, outer, Pose::identity()),
            Err(RigidError::NotACompound(_))
        ));
        reg.add_child(outer, inner, Pose::identity()).unwrap();
        reg.add_child(inner, leaf, Pose::identity()).unwrap();

        assert!(matches!(
            reg.add_child(inner, outer, Pose::identity()),
            Err(RigidError::CompoundCycle { .. })
        ));
        assert!(matches!(
            reg.add_child(outer, outer, Pose::identity()),
            Err(RigidError::CompoundCycle { .. })
        ));
        assert!(matches!(
            reg.delete(leaf),
            Err(RigidError::ShapeReferenced { .. })
        ));
        assert!(reg.num_children(leaf).is_err());
    }

    #[test]
    fn test_cylinder_bounds_follow_axis() {
        let mut reg = ShapeRegistry::new();
        let c = reg.create_cylinder(CylinderAxis::Y, 0.5, 2.0).unwrap();
        let upright = reg.local_aabb(c, &Pose::identity()).unwrap();
        assert_relative_eq!(
            upright.half_extents(),
            Vector3::new(0.5, 2.0, 0.5),
            epsilon = 1e-12
        );

        let lying = Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
        );
        let aabb = reg.local_aabb(c, &lying).unwrap();
        assert_relative_eq!(
            aabb.half_extents(),
            Vector3::new(2.0, 0.5, 0.5),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_empty_compound_cannot_carry_mass() {
        let mut reg = ShapeRegistry::new();
        let outer = reg.create_compound().unwrap();
        let inner = reg.create_compound().unwrap();
        reg.add_child(outer, inner, Pose::identity()).unwrap();

        for compound in [outer, inner] {
            let err = reg.compute_inertia(compound, 1.0).unwrap_err();
            assert!(err.is_degenerate());
            assert_eq!(
                reg.compute_inertia(compound, 0.0).unwrap(),
                MassProperties::fixed()
            );
        }
    }

    #[test]
    fn test_compound_bounds_and_inertia() {
        let mut reg = ShapeRegistry::new();
        let compound = reg.create_compound().unwrap();
        let a = unit_box(&mut reg);
        let left = Pose::from_position(Point3::new(-1.0, 0.0, 0.0));
        let right = Pose::from_position(Point3::new(1.0, 0.0, 0.0));
        reg.add_child(compound, a, left).unwrap();
        reg.add_child(compound, a, right).unwrap();

        let local = reg.local_aabb(compound, &Pose::identity()).unwrap();
        assert_relative_eq!(
            local.half_extents(),
            Vector3::new(1.5, 0.5, 0.5),
            epsilon = 1e-12
        );

        let moved = reg
            .local_aabb(compound, &Pose::from_position(Point3::new(0.0, 3.0, 0.0)))
            .unwrap();
        assert_relative_eq!(moved.center(), Point3::new(0.0, 3.0, 0.0), epsilon = 1e-12);

        let props = reg.compute_inertia(compound, 12.0).unwrap();
        let expected = MassProperties::box_shape(12.0, Vector3::new(1.5, 0.5, 0.5));
        assert_relative_eq!(props.inertia, expected.inertia);
        assert_eq!(
            reg.compute_inertia(compound, 0.0).unwrap(),
            MassProperties::fixed()
        );
        assert!(reg.compute_inertia(a, -1.0).is_err());
    }
}
