//! The simulation world: shapes, bodies, constraints and the step loop.
//!
//! A [`World`] owns everything it simulates. Callers hold plain handles
//! ([`ShapeId`], [`BodyId`], [`ConstraintId`]) that are never reused, so a
//! handle to something deleted keeps failing with an `Invalid*Id` error
//! instead of aliasing a newer object.

use hashbrown::HashMap;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rigid_constraint::{Constraint, ConstraintKind, ConstraintParam, Hinge, Hinge2};
use rigid_contact::{ContactManifold, ContactReport, ContactReports};
use rigid_types::{
    ActivationState, BodyId, ConstraintId, CylinderAxis, EulerAngles, Pose, Result, RigidError,
    Shape, ShapeId, ShapeType, WorldConfig,
};
use tracing::{debug, trace, warn};

use crate::body::Body;
use crate::broad_phase::BroadPhase;
use crate::narrow_phase::NarrowPhase;
use crate::shape::ShapeRegistry;
use crate::solver::{SequentialImpulseSolver, SolverStats};
use crate::stepper::StepClock;

/// Largest accepted deviation of a rotation's norm from 1.
const UNIT_QUATERNION_TOLERANCE: f64 = 1e-6;

/// A rigid-body world.
///
/// # Example
///
/// ```
/// use rigid_core::World;
/// use nalgebra::{Point3, Vector3};
///
/// let mut world = World::default();
/// let ground_shape = world.create_box(Vector3::new(50.0, 1.0, 50.0)).unwrap();
/// let box_shape = world.create_box(Vector3::new(1.0, 1.0, 1.0)).unwrap();
///
/// world.create_body(ground_shape, 0.0, Point3::new(0.0, -1.0, 0.0)).unwrap();
/// let body = world.create_body(box_shape, 1.0, Point3::new(0.0, 5.0, 0.0)).unwrap();
///
/// for _ in 0..60 {
///     world.step(1.0 / 60.0, 1).unwrap();
/// }
/// assert!(world.position(body).unwrap().y < 5.0);
/// ```
#[derive(Debug)]
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) shapes: ShapeRegistry,
    pub(crate) bodies: HashMap<BodyId, Body>,
    pub(crate) constraints: HashMap<ConstraintId, Constraint>,
    pub(crate) broad_phase: BroadPhase,
    pub(crate) narrow_phase: NarrowPhase,
    pub(crate) solver: SequentialImpulseSolver,
    pub(crate) clock: StepClock,
    pub(crate) time: f64,
    pub(crate) step_count: u64,
    next_body_id: u64,
    next_constraint_id: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::with_valid_config(WorldConfig::default())
    }
}

impl Drop for World {
    fn drop(&mut self) {
        debug!(
            bodies = self.bodies.len(),
            shapes = self.shapes.len(),
            constraints = self.constraints.len(),
            "tearing down world"
        );
        self.clear();
    }
}

impl World {
    /// Create an empty world.
    ///
    /// # Errors
    ///
    /// Returns the first problem [`WorldConfig::validate`] finds.
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: WorldConfig) -> Self {
        debug!(
            fixed_timestep = config.fixed_timestep,
            iterations = config.solver.iterations,
            "world created"
        );
        Self {
            broad_phase: BroadPhase::new(config.broad_phase_margin),
            clock: StepClock::new(config.fixed_timestep),
            config,
            shapes: ShapeRegistry::new(),
            bodies: HashMap::new(),
            constraints: HashMap::new(),
            narrow_phase: NarrowPhase::new(),
            solver: SequentialImpulseSolver::new(),
            time: 0.0,
            step_count: 0,
            next_body_id: 1,
            next_constraint_id: 1,
        }
    }

    /// The world's configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Current gravity.
    #[must_use]
    pub fn gravity(&self) -> Vector3<f64> {
        self.config.gravity
    }

    /// Replace gravity and wake every body so the change takes effect.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] if `gravity` is not finite.
    pub fn set_gravity(&mut self, gravity: Vector3<f64>) -> Result<()> {
        if gravity.iter().any(|g| !g.is_finite()) {
            return Err(RigidError::degenerate("gravity must be finite"));
        }
        self.config.gravity = gravity;
        for body in self.bodies.values_mut() {
            body.wake_up();
        }
        Ok(())
    }

    // =========================================================================
    // Shapes
    // =========================================================================

    /// Create a box from its half-extents.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] unless every half-extent is finite and
    /// positive.
    pub fn create_box(&mut self, half_extents: Vector3<f64>) -> Result<ShapeId> {
        self.shapes.create_box(half_extents)
    }

    /// Create a sphere.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] unless `radius` is finite and positive.
    pub fn create_sphere(&mut self, radius: f64) -> Result<ShapeId> {
        self.shapes.create_sphere(radius)
    }

    /// Create a cylinder along local X.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] unless both dimensions are finite and
    /// positive.
    pub fn create_cylinder_x(&mut self, radius: f64, half_length: f64) -> Result<ShapeId> {
        self.shapes.create_cylinder(CylinderAxis::X, radius, half_length)
    }

    /// Create a cylinder along local Y.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] unless both dimensions are finite and
    /// positive.
    pub fn create_cylinder_y(&mut self, radius: f64, half_length: f64) -> Result<ShapeId> {
        self.shapes.create_cylinder(CylinderAxis::Y, radius, half_length)
    }

    /// Create a cylinder along local Z.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::Degenerate`] unless both dimensions are finite and
    /// positive.
    pub fn create_cylinder_z(&mut self, radius: f64, half_length: f64) -> Result<ShapeId> {
        self.shapes.create_cylinder(CylinderAxis::Z, radius, half_length)
    }

    /// Create an empty compound.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::CapacityExceeded`] once shape IDs run out.
    pub fn create_compound(&mut self) -> Result<ShapeId> {
        self.shapes.create_compound()
    }

    /// Add `child` to `compound` at a local position and rotation. Returns the
    /// child's index.
    ///
    /// # Errors
    ///
    /// Fails like [`ShapeRegistry::add_child`], and with [`RigidError::Degenerate`]
    /// if the rotation is not finite.
    pub fn compound_add_child(
        &mut self,
        compound: ShapeId,
        child: ShapeId,
        local_position: Point3<f64>,
        local_rotation: &EulerAngles,
    ) -> Result<usize> {
        if !local_rotation.is_finite() {
            return Err(RigidError::degenerate("compound child rotation is not finite"));
        }
        let local = Pose::from_position_rotation(local_position, local_rotation.to_quaternion());
        let index = self.shapes.add_child(compound, child, local)?;
        self.refresh_compound_users()?;
        Ok(index)
    }

    /// Remove the child at `index` from `compound`. The child shape survives.
    ///
    /// # Errors
    ///
    /// Fails like [`ShapeRegistry::remove_child`].
    pub fn compound_remove_child(&mut self, compound: ShapeId, index: usize) -> Result<ShapeId> {
        let child = self.shapes.remove_child(compound, index)?;
        self.refresh_compound_users()?;
        Ok(child)
    }

    /// Number of children of `compound`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidShapeId`] for an unknown shape and
    /// [`RigidError::NotACompound`] for a primitive.
    pub fn compound_num_children(&self, compound: ShapeId) -> Result<usize> {
        self.shapes.num_children(compound)
    }

    /// Delete a shape.
    ///
    /// # Errors
    ///
    /// - [`RigidError::ShapeInUse`] while a body uses it
    /// - [`RigidError::ShapeReferenced`] while a compound lists it
    pub fn delete_shape(&mut self, shape: ShapeId) -> Result<()> {
        self.shapes.require(shape)?;
        if let Some(body) = self.bodies.values().find(|b| b.shape == shape) {
            return Err(RigidError::ShapeInUse {
                shape: shape.raw(),
                body: body.id.raw(),
            });
        }
        self.shapes.delete(shape).map(|_| ())
    }

    /// Look up a shape.
    #[must_use]
    pub fn shape(&self, shape: ShapeId) -> Option<&Shape> {
        self.shapes.get(shape)
    }

    /// Kind of a shape.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidShapeId`] if `shape` is unknown.
    pub fn shape_type(&self, shape: ShapeId) -> Result<ShapeType> {
        self.shapes.shape_type(shape)
    }

    /// The shape registry.
    #[must_use]
    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }

    /// Compound bounds changed: refresh every body that uses a compound.
    fn refresh_compound_users(&mut self) -> Result<()> {
        let users: Vec<BodyId> = self
            .bodies
            .values()
            .filter(|b| self.shapes.get(b.shape).is_some_and(Shape::is_compound))
            .map(|b| b.id)
            .collect();
        for id in users {
            self.refresh_proxy(id)?;
        }
        Ok(())
    }

    // =========================================================================
    // Bodies
    // =========================================================================

    /// Create a body at `position` and add it to the simulation.
    ///
    /// A mass of 0 makes a static body. Inertia is derived from the shape.
    ///
    /// # Errors
    ///
    /// - [`RigidError::InvalidShapeId`] if `shape` is unknown
    /// - [`RigidError::Degenerate`] for a non-finite position, a negative or
    ///   non-finite mass, or a positive mass on a compound with no volume
    pub fn create_body(
        &mut self,
        shape: ShapeId,
        mass: f64,
        position: Point3<f64>,
    ) -> Result<BodyId> {
        if position.iter().any(|x| !x.is_finite()) {
            return Err(RigidError::degenerate("body position is not finite"));
        }
        let props = self.shapes.compute_inertia(shape, mass)?;
        let aabb = self.shapes.local_aabb(shape, &Pose::from_position(position))?;

        let id = BodyId::new(self.next_body_id);
        self.next_body_id = self
            .next_body_id
            .checked_add(1)
            .ok_or(RigidError::CapacityExceeded { what: "body" })?;

        let body = Body::new(
            id,
            shape,
            props,
            position,
            self.config.solver.default_friction,
            self.config.solver.default_restitution,
        );
        self.broad_phase.insert(id, aabb);
        self.bodies.insert(id, body);
        debug!(body = %id, shape = %shape, mass, "body created");
        Ok(id)
    }

    /// Take a body out of the simulation without deleting it.
    ///
    /// Constraints on the body are deleted. [`add_body`](Self::add_body)
    /// puts it back.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn remove_body(&mut self, body: BodyId) -> Result<()> {
        self.require_body(body)?;
        self.delete_constraints_of(body);
        self.broad_phase.remove(body);
        self.narrow_phase.remove_body(body);
        if let Some(b) = self.bodies.get_mut(&body) {
            b.in_world = false;
        }
        debug!(body = %body, "body removed from simulation");
        Ok(())
    }

    /// Put a removed body back into the simulation.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn add_body(&mut self, body: BodyId) -> Result<()> {
        let b = self
            .bodies
            .get_mut(&body)
            .ok_or(RigidError::InvalidBodyId(body.raw()))?;
        if b.in_world {
            return Ok(());
        }
        b.in_world = true;
        b.wake_up();
        let (shape, pose) = (b.shape, b.pose);
        let aabb = self.shapes.local_aabb(shape, &pose)?;
        self.broad_phase.insert(body, aabb);
        debug!(body = %body, "body added to simulation");
        Ok(())
    }

    /// Delete a body and every constraint attached to it.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn delete_body(&mut self, body: BodyId) -> Result<()> {
        self.require_body(body)?;
        self.delete_constraints_of(body);
        self.broad_phase.remove(body);
        self.narrow_phase.remove_body(body);
        self.bodies.remove(&body);
        debug!(body = %body, "body deleted");
        Ok(())
    }

    /// Look up a body.
    #[must_use]
    pub fn body(&self, body: BodyId) -> Option<&Body> {
        self.bodies.get(&body)
    }

    /// All bodies, in no particular order.
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    fn require_body(&self, body: BodyId) -> Result<&Body> {
        self.bodies
            .get(&body)
            .ok_or(RigidError::InvalidBodyId(body.raw()))
    }

    fn require_body_mut(&mut self, body: BodyId) -> Result<&mut Body> {
        self.bodies
            .get_mut(&body)
            .ok_or(RigidError::InvalidBodyId(body.raw()))
    }

    fn refresh_proxy(&mut self, body: BodyId) -> Result<()> {
        let b = self.require_body(body)?;
        if !b.in_world {
            return Ok(());
        }
        let aabb = self.shapes.local_aabb(b.shape, &b.pose)?;
        self.broad_phase.teleport(body, aabb);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Transform
    // -------------------------------------------------------------------------

    /// World position of a body.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn position(&self, body: BodyId) -> Result<Point3<f64>> {
        self.require_body(body).map(|b| b.pose.position)
    }

    /// World orientation of a body.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn orientation(&self, body: BodyId) -> Result<UnitQuaternion<f64>> {
        self.require_body(body).map(|b| b.pose.rotation)
    }

    /// Position and orientation together.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn position_and_orientation(&self, body: BodyId) -> Result<Pose> {
        self.require_body(body).map(|b| b.pose)
    }

    /// Column-major 4x4 transform of a body, ready for `OpenGL`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn opengl_matrix(&self, body: BodyId) -> Result<[f64; 16]> {
        self.require_body(body).map(|b| b.pose.to_opengl_matrix())
    }

    /// Shape a body uses.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn shape_of(&self, body: BodyId) -> Result<ShapeId> {
        self.require_body(body).map(|b| b.shape)
    }

    /// Kind of the shape a body uses.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn shape_type_of(&self, body: BodyId) -> Result<ShapeType> {
        let shape = self.shape_of(body)?;
        self.shapes.shape_type(shape)
    }

    /// Move a body, keeping its rotation.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] if `position` is not finite.
    pub fn set_position(&mut self, body: BodyId, position: Point3<f64>) -> Result<()> {
        if position.iter().any(|x| !x.is_finite()) {
            return Err(RigidError::degenerate("body position is not finite"));
        }
        let b = self.require_body_mut(body)?;
        b.pose.position = position;
        b.wake_up();
        self.refresh_proxy(body)
    }

    /// Rotate a body, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] if `rotation` is not finite or not of unit norm.
    pub fn set_rotation(&mut self, body: BodyId, rotation: UnitQuaternion<f64>) -> Result<()> {
        if rotation.coords.iter().any(|x| !x.is_finite()) {
            return Err(RigidError::degenerate("body rotation is not finite"));
        }
        let norm = rotation.coords.norm();
        if (norm - 1.0).abs() > UNIT_QUATERNION_TOLERANCE {
            return Err(RigidError::degenerate(format!(
                "body rotation is not a unit quaternion (norm {norm})"
            )));
        }
        let b = self.require_body_mut(body)?;
        b.pose.rotation = rotation;
        b.wake_up();
        self.refresh_proxy(body)
    }

    /// Rotate a body from Euler angles, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] if an angle is not finite.
    pub fn set_rotation_euler(
        &mut self,
        body: BodyId,
        pitch: f64,
        yaw: f64,
        roll: f64,
    ) -> Result<()> {
        let angles = EulerAngles::new(yaw, pitch, roll);
        if !angles.is_finite() {
            return Err(RigidError::degenerate("Euler angles are not finite"));
        }
        self.set_rotation(body, angles.to_quaternion())
    }

    // -------------------------------------------------------------------------
    // Dynamics
    // -------------------------------------------------------------------------

    /// Apply an impulse at a world point. Takes effect immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] if the impulse or its point is not finite.
    pub fn apply_impulse(
        &mut self,
        body: BodyId,
        impulse: Vector3<f64>,
        world_point: Point3<f64>,
    ) -> Result<()> {
        require_finite("impulse", &impulse)?;
        if world_point.iter().any(|x| !x.is_finite()) {
            return Err(RigidError::degenerate("impulse point is not finite"));
        }
        self.require_body_mut(body)?.apply_impulse(&impulse, &world_point);
        Ok(())
    }

    /// Add a torque, consumed by the next sub-step.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] if `torque` is not finite.
    pub fn apply_torque(&mut self, body: BodyId, torque: Vector3<f64>) -> Result<()> {
        require_finite("torque", &torque)?;
        self.require_body_mut(body)?.apply_torque(&torque);
        Ok(())
    }

    /// Add a force through the center of mass, consumed by the next sub-step.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] if `force` is not finite.
    pub fn apply_central_force(&mut self, body: BodyId, force: Vector3<f64>) -> Result<()> {
        require_finite("force", &force)?;
        self.require_body_mut(body)?.apply_force(&force);
        Ok(())
    }

    /// Linear velocity of a body.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn linear_velocity(&self, body: BodyId) -> Result<Vector3<f64>> {
        self.require_body(body).map(|b| b.twist.linear)
    }

    /// Set the linear velocity. Ignored for static bodies.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] if `velocity` is not finite.
    pub fn set_linear_velocity(&mut self, body: BodyId, velocity: Vector3<f64>) -> Result<()> {
        require_finite("linear velocity", &velocity)?;
        let b = self.require_body_mut(body)?;
        if !b.is_static() {
            b.twist.linear = velocity;
            b.wake_up();
        }
        Ok(())
    }

    /// Angular velocity of a body (world frame).
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn angular_velocity(&self, body: BodyId) -> Result<Vector3<f64>> {
        self.require_body(body).map(|b| b.twist.angular)
    }

    /// Set the angular velocity. Ignored for static bodies.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] if `velocity` is not finite.
    pub fn set_angular_velocity(&mut self, body: BodyId, velocity: Vector3<f64>) -> Result<()> {
        require_finite("angular velocity", &velocity)?;
        let b = self.require_body_mut(body)?;
        if !b.is_static() {
            b.twist.angular = velocity;
            b.wake_up();
        }
        Ok(())
    }

    /// Friction coefficient of a body.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn friction(&self, body: BodyId) -> Result<f64> {
        self.require_body(body).map(|b| b.friction)
    }

    /// Set the friction coefficient. Any finite non-negative value is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] for a negative or non-finite coefficient.
    pub fn set_friction(&mut self, body: BodyId, friction: f64) -> Result<()> {
        let friction = require_material("friction", friction)?;
        self.require_body_mut(body)?.friction = friction;
        Ok(())
    }

    /// Restitution coefficient of a body.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn restitution(&self, body: BodyId) -> Result<f64> {
        self.require_body(body).map(|b| b.restitution)
    }

    /// Set the restitution coefficient. Any finite non-negative value is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] for an unknown body and
    /// [`RigidError::Degenerate`] for a negative or non-finite coefficient.
    pub fn set_restitution(&mut self, body: BodyId, restitution: f64) -> Result<()> {
        let restitution = require_material("restitution", restitution)?;
        self.require_body_mut(body)?.restitution = restitution;
        Ok(())
    }

    /// Allow (`true`) or forbid (`false`) automatic sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn set_deactivation(&mut self, body: BodyId, enabled: bool) -> Result<()> {
        let state = if enabled {
            ActivationState::Active
        } else {
            ActivationState::AlwaysActive
        };
        self.set_activation_state(body, state)
    }

    /// Force an activation state.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn set_activation_state(&mut self, body: BodyId, state: ActivationState) -> Result<()> {
        let b = self.require_body_mut(body)?;
        b.activation = state;
        b.sleep_timer = 0.0;
        if state == ActivationState::Sleeping {
            warn!(body = %body, "body forced to sleep");
            b.put_to_sleep();
        }
        Ok(())
    }

    /// Activation state of a body.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidBodyId`] if `body` is unknown.
    pub fn activation_state(&self, body: BodyId) -> Result<ActivationState> {
        self.require_body(body).map(|b| b.activation)
    }

    // =========================================================================
    // Constraints
    // =========================================================================

    /// Join two bodies with a hinge.
    ///
    /// Each frame is a pivot plus Euler angles in its body's local space; the
    /// hinge turns about the frames' Z axes.
    ///
    /// # Errors
    ///
    /// - [`RigidError::InvalidBodyId`] if either body is unknown
    /// - [`RigidError::Degenerate`] if the bodies are the same or a frame is not
    ///   finite
    #[allow(clippy::too_many_arguments)]
    pub fn create_hinge(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        pivot_a: Point3<f64>,
        rotation_a: &EulerAngles,
        pivot_b: Point3<f64>,
        rotation_b: &EulerAngles,
        use_reference_frame_a: bool,
        collide: bool,
    ) -> Result<ConstraintId> {
        self.require_pair(body_a, body_b)?;
        let hinge = Hinge::from_pivots(
            body_a,
            body_b,
            pivot_a,
            rotation_a,
            pivot_b,
            rotation_b,
            use_reference_frame_a,
            collide,
        )?;
        self.insert_constraint(hinge.into())
    }

    /// Join two bodies with a two-axis hinge at a world anchor.
    ///
    /// `parent_axis` is the steering axis (also the suspension travel) and
    /// `child_axis` the spin axis, both in world space.
    ///
    /// # Errors
    ///
    /// - [`RigidError::InvalidBodyId`] if either body is unknown
    /// - [`RigidError::Degenerate`] if the bodies are the same, or the anchor or
    ///   axes are unusable (see [`Hinge2::new`])
    pub fn create_hinge2(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        anchor: Point3<f64>,
        parent_axis: Vector3<f64>,
        child_axis: Vector3<f64>,
        collide: bool,
    ) -> Result<ConstraintId> {
        self.require_pair(body_a, body_b)?;
        let pose_a = self.require_body(body_a)?.pose;
        let pose_b = self.require_body(body_b)?.pose;
        let hinge2 = Hinge2::new(
            body_a,
            body_b,
            &pose_a,
            &pose_b,
            anchor,
            parent_axis,
            child_axis,
            collide,
        )?;
        self.insert_constraint(hinge2.into())
    }

    fn require_pair(&self, body_a: BodyId, body_b: BodyId) -> Result<()> {
        self.require_body(body_a)?;
        self.require_body(body_b)?;
        if body_a == body_b {
            return Err(RigidError::degenerate("a constraint needs two different bodies"));
        }
        Ok(())
    }

    fn insert_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId> {
        let id = ConstraintId::new(self.next_constraint_id);
        self.next_constraint_id = self
            .next_constraint_id
            .checked_add(1)
            .ok_or(RigidError::CapacityExceeded { what: "constraint" })?;
        let (a, b) = (constraint.link().body_a(), constraint.link().body_b());
        debug!(
            constraint = %id,
            kind = constraint.kind().name(),
            body_a = %a,
            body_b = %b,
            "constraint created"
        );
        self.constraints.insert(id, constraint);
        self.wake_pair(a, b);
        Ok(id)
    }

    fn wake_pair(&mut self, a: BodyId, b: BodyId) {
        for id in [a, b] {
            if let Some(body) = self.bodies.get_mut(&id) {
                body.wake_up();
            }
        }
    }

    fn delete_constraints_of(&mut self, body: BodyId) {
        self.constraints.retain(|id, c| {
            let keep = !c.link().involves(body);
            if !keep {
                trace!(constraint = %id, body = %body, "constraint dropped with body");
            }
            keep
        });
    }

    /// Look up a constraint.
    #[must_use]
    pub fn constraint(&self, constraint: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&constraint)
    }

    fn require_constraint(&self, constraint: ConstraintId) -> Result<&Constraint> {
        self.constraints
            .get(&constraint)
            .ok_or(RigidError::InvalidConstraintId(constraint.raw()))
    }

    /// Mutable access to a constraint; wakes both of its bodies.
    fn constraint_mut(&mut self, constraint: ConstraintId) -> Result<&mut Constraint> {
        let link = self.require_constraint(constraint)?.link();
        let (a, b) = (link.body_a(), link.body_b());
        self.wake_pair(a, b);
        self.constraints
            .get_mut(&constraint)
            .ok_or(RigidError::InvalidConstraintId(constraint.raw()))
    }

    fn hinge_mut(&mut self, constraint: ConstraintId) -> Result<&mut Hinge> {
        let c = self.constraint_mut(constraint)?;
        let actual = c.kind().name();
        c.as_hinge_mut().ok_or(RigidError::WrongConstraintKind {
            constraint: constraint.raw(),
            expected: ConstraintKind::Hinge.name(),
            actual,
        })
    }

    fn hinge2_mut(&mut self, constraint: ConstraintId) -> Result<&mut Hinge2> {
        let c = self.constraint_mut(constraint)?;
        let actual = c.kind().name();
        c.as_hinge2_mut().ok_or(RigidError::WrongConstraintKind {
            constraint: constraint.raw(),
            expected: ConstraintKind::Hinge2.name(),
            actual,
        })
    }

    /// Current poses of a constraint's bodies.
    fn link_poses(&self, c: &Constraint) -> Result<(Pose, Pose)> {
        let link = c.link();
        Ok((
            self.require_body(link.body_a())?.pose,
            self.require_body(link.body_b())?.pose,
        ))
    }

    /// Kind of a constraint.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] if `constraint` is unknown.
    pub fn constraint_kind(&self, constraint: ConstraintId) -> Result<ConstraintKind> {
        self.require_constraint(constraint).map(Constraint::kind)
    }

    /// Delete a constraint.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] if `constraint` is unknown.
    pub fn delete_constraint(&mut self, constraint: ConstraintId) -> Result<()> {
        let removed = self
            .constraints
            .remove(&constraint)
            .ok_or(RigidError::InvalidConstraintId(constraint.raw()))?;
        let link = removed.link();
        self.wake_pair(link.body_a(), link.body_b());
        debug!(constraint = %constraint, "constraint deleted");
        Ok(())
    }

    /// Enable or disable a constraint. Disabled constraints are not solved.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] if `constraint` is unknown.
    pub fn constraint_set_enabled(
        &mut self,
        constraint: ConstraintId,
        enabled: bool,
    ) -> Result<()> {
        self.constraint_mut(constraint)?
            .link_mut()
            .set_enabled(enabled);
        Ok(())
    }

    /// Whether a constraint is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] if `constraint` is unknown.
    pub fn constraint_is_enabled(&self, constraint: ConstraintId) -> Result<bool> {
        self.require_constraint(constraint).map(|c| c.link().is_enabled())
    }

    /// Override ERP or CFM for one axis, or for all axes with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] if `constraint` is unknown, and fails like
    /// [`ParamSet::set`](rigid_constraint::ParamSet::set) for a bad value or axis.
    pub fn constraint_set_param(
        &mut self,
        constraint: ConstraintId,
        param: ConstraintParam,
        value: f64,
        axis: Option<usize>,
    ) -> Result<()> {
        self.constraint_mut(constraint)?.set_param(param, value, axis)
    }

    /// Read back an ERP/CFM override. `None` means the solver default applies.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] if `constraint` is unknown, and
    /// [`RigidError::InvalidAxis`] for an axis of 6 or more.
    pub fn constraint_param(
        &self,
        constraint: ConstraintId,
        param: ConstraintParam,
        axis: Option<usize>,
    ) -> Result<Option<f64>> {
        self.require_constraint(constraint)?.param(param, axis)
    }

    /// Bound a hinge's angle. `low > high` frees it.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a hinge, or
    /// [`RigidError::Degenerate`] if a bound is not finite.
    pub fn hinge_set_limit(&mut self, constraint: ConstraintId, low: f64, high: f64) -> Result<()> {
        self.hinge_mut(constraint)?.set_limit(low, high)
    }

    /// Configure a hinge's angular motor.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a hinge, or
    /// fails like [`Hinge::enable_angular_motor`].
    pub fn hinge_enable_angular_motor(
        &mut self,
        constraint: ConstraintId,
        enable: bool,
        target_velocity: f64,
        max_impulse: f64,
    ) -> Result<()> {
        self.hinge_mut(constraint)?
            .enable_angular_motor(enable, target_velocity, max_impulse)
    }

    /// Current hinge angle.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a hinge.
    pub fn hinge_angle(&self, constraint: ConstraintId) -> Result<f64> {
        let c = self.require_constraint(constraint)?;
        let hinge = c.as_hinge().ok_or(RigidError::WrongConstraintKind {
            constraint: constraint.raw(),
            expected: ConstraintKind::Hinge.name(),
            actual: c.kind().name(),
        })?;
        let (pose_a, pose_b) = self.link_poses(c)?;
        Ok(hinge.angle(&pose_a, &pose_b))
    }

    /// Lower steering limit of a two-axis hinge.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a two-axis hinge.
    pub fn hinge2_set_lower_limit(&mut self, constraint: ConstraintId, lower: f64) -> Result<()> {
        self.hinge2_mut(constraint)?.set_lower_limit(lower)
    }

    /// Upper steering limit of a two-axis hinge.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a two-axis hinge.
    pub fn hinge2_set_upper_limit(&mut self, constraint: ConstraintId, upper: f64) -> Result<()> {
        self.hinge2_mut(constraint)?.set_upper_limit(upper)
    }

    /// Switch the motor on degree of freedom `index` (0-5).
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a two-axis hinge, or
    /// [`RigidError::InvalidAxis`] if `index` is 6 or more.
    pub fn hinge2_enable_motor(
        &mut self,
        constraint: ConstraintId,
        index: usize,
        enable: bool,
    ) -> Result<()> {
        self.hinge2_mut(constraint)?.enable_motor(index, enable)
    }

    /// Maximum motor force on degree of freedom `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a two-axis hinge, or fails
    /// like [`Hinge2::set_max_motor_force`].
    pub fn hinge2_set_max_motor_force(
        &mut self,
        constraint: ConstraintId,
        index: usize,
        force: f64,
    ) -> Result<()> {
        self.hinge2_mut(constraint)?.set_max_motor_force(index, force)
    }

    /// Motor target velocity on degree of freedom `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a two-axis hinge, or fails
    /// like [`Hinge2::set_target_velocity`].
    pub fn hinge2_set_target_velocity(
        &mut self,
        constraint: ConstraintId,
        index: usize,
        velocity: f64,
    ) -> Result<()> {
        self.hinge2_mut(constraint)?.set_target_velocity(index, velocity)
    }

    /// Spring stiffness on degree of freedom `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a two-axis hinge, or fails
    /// like [`Hinge2::set_stiffness`].
    pub fn hinge2_set_stiffness(
        &mut self,
        constraint: ConstraintId,
        index: usize,
        stiffness: f64,
        limit_aware: bool,
    ) -> Result<()> {
        self.hinge2_mut(constraint)?
            .set_stiffness(index, stiffness, limit_aware)
    }

    /// Spring damping on degree of freedom `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a two-axis hinge, or fails
    /// like [`Hinge2::set_damping`].
    pub fn hinge2_set_damping(
        &mut self,
        constraint: ConstraintId,
        index: usize,
        damping: f64,
        limit_aware: bool,
    ) -> Result<()> {
        self.hinge2_mut(constraint)?.set_damping(index, damping, limit_aware)
    }

    /// Steering angle about the parent axis.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a two-axis hinge.
    pub fn hinge2_angle1(&self, constraint: ConstraintId) -> Result<f64> {
        let (hinge2, pose_a, pose_b) = self.hinge2_with_poses(constraint)?;
        Ok(hinge2.angle1(&pose_a, &pose_b))
    }

    /// Spin angle about the child axis.
    ///
    /// # Errors
    ///
    /// Returns [`RigidError::InvalidConstraintId`] for an unknown constraint and
    /// [`RigidError::WrongConstraintKind`] if it is not a two-axis hinge.
    pub fn hinge2_angle2(&self, constraint: ConstraintId) -> Result<f64> {
        let (hinge2, pose_a, pose_b) = self.hinge2_with_poses(constraint)?;
        Ok(hinge2.angle2(&pose_a, &pose_b))
    }

    fn hinge2_with_poses(&self, constraint: ConstraintId) -> Result<(&Hinge2, Pose, Pose)> {
        let c = self.require_constraint(constraint)?;
        let hinge2 = c.as_hinge2().ok_or(RigidError::WrongConstraintKind {
            constraint: constraint.raw(),
            expected: ConstraintKind::Hinge2.name(),
            actual: c.kind().name(),
        })?;
        let (pose_a, pose_b) = self.link_poses(c)?;
        Ok((hinge2, pose_a, pose_b))
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// Advance the world by `dt` seconds. Returns the number of sub-steps taken.
    ///
    /// With `max_sub_steps == 0` one variable step of exactly `dt` is taken.
    /// Otherwise `dt` feeds a fixed-timestep accumulator and at most
    /// `max_sub_steps` sub-steps of [`WorldConfig::fixed_timestep`] run.
    ///
    /// # Errors
    ///
    /// - [`RigidError::InvalidTimestep`] for a negative or non-finite `dt`
    /// - [`RigidError::Diverged`] if a body's state became non-finite
    pub fn step(&mut self, dt: f64, max_sub_steps: usize) -> Result<usize> {
        let plan = self.clock.plan(dt, max_sub_steps)?;
        self.run_plan(&plan)
    }

    /// Penetrating contacts from the last step.
    pub fn contacts(&self) -> ContactReports<'_> {
        ContactReports::new(self.narrow_phase.manifolds())
    }

    /// [`contacts`](Self::contacts) collected into a `Vec`.
    #[must_use]
    pub fn contact_snapshot(&self) -> Vec<ContactReport> {
        self.contacts().collect()
    }

    /// Manifolds from the last step, including speculative points.
    #[must_use]
    pub fn manifolds(&self) -> &[ContactManifold] {
        self.narrow_phase.manifolds()
    }

    /// Counts from the last solver run.
    #[must_use]
    pub fn solver_stats(&self) -> &SolverStats {
        self.solver.last_stats()
    }

    /// The broad phase, for queries.
    #[must_use]
    pub fn broad_phase(&self) -> &BroadPhase {
        &self.broad_phase
    }

    /// Number of bodies, including removed ones.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of shapes.
    #[must_use]
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Number of constraints.
    #[must_use]
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Simulated time (s).
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Sub-steps taken so far.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Total kinetic energy of all bodies.
    #[must_use]
    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies.values().map(Body::kinetic_energy).sum()
    }

    /// Total linear momentum of all bodies.
    #[must_use]
    pub fn total_linear_momentum(&self) -> Vector3<f64> {
        self.bodies.values().map(Body::linear_momentum).sum()
    }

    /// Delete everything.
    ///
    /// Bodies go first, each taking its constraints with it, then shapes,
    /// then the pipeline state. Handles issued before stay invalid.
    pub fn clear(&mut self) {
        let mut ids: Vec<BodyId> = self.bodies.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            self.delete_constraints_of(id);
            self.broad_phase.remove(id);
            self.bodies.remove(&id);
        }
        self.constraints.clear();
        self.shapes.clear();
        self.broad_phase.clear();
        self.narrow_phase.clear();
        self.clock.reset();
    }
}

fn require_finite(what: &str, v: &Vector3<f64>) -> Result<()> {
    if v.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(RigidError::degenerate(format!("{what} is not finite")))
    }
}

fn require_material(what: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(RigidError::degenerate(format!(
            "{what} must be finite and non-negative, got {value}"
        )))
    }
}
