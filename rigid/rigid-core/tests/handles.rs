//! Integration tests for handle lifetimes, shape management and stepping limits.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use approx::assert_relative_eq;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rigid_core::{CylinderAxis, EulerAngles, RigidError, ShapeType, World, WorldConfig};

#[test]
fn test_position_and_rotation_round_trip_independently() {
    let mut world = World::default();
    let shape = world.create_cylinder_z(0.3, 1.0).unwrap();
    let body = world.create_body(shape, 1.0, Point3::origin()).unwrap();

    let rotation = UnitQuaternion::from_euler_angles(0.1, -0.4, 1.2);
    world.set_rotation(body, rotation).unwrap();
    let before = world.position(body).unwrap();
    assert_eq!(world.orientation(body).unwrap(), rotation);

    let target = Point3::new(-4.0, 7.5, 2.0);
    world.set_position(body, target).unwrap();
    assert_eq!(world.position(body).unwrap(), target);
    assert_eq!(world.orientation(body).unwrap(), rotation);
    assert_eq!(before, Point3::origin());

    let pose = world.position_and_orientation(body).unwrap();
    assert_eq!(pose.position, target);
    assert_eq!(pose.rotation, rotation);
}

#[test]
fn test_euler_setter_matches_documented_convention() {
    let mut world = World::default();
    let shape = world.create_sphere(1.0).unwrap();
    let body = world.create_body(shape, 1.0, Point3::origin()).unwrap();

    let (pitch, yaw, roll) = (0.2, 0.5, -0.3);
    world.set_rotation_euler(body, pitch, yaw, roll).unwrap();
    let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
        * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), pitch)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), roll);
    assert!(world.orientation(body).unwrap().angle_to(&expected) < 1e-12);
    let rebuilt = EulerAngles::new(yaw, pitch, roll).to_quaternion();
    assert_relative_eq!(rebuilt.angle_to(&expected), 0.0, epsilon = 1e-12);
}

#[test]
fn test_compound_child_removal_keeps_child_alive() {
    let mut world = World::default();
    let compound = world.create_compound().unwrap();
    let children: Vec<_> = (0..3)
        .map(|i| world.create_sphere(0.1 + f64::from(i) * 0.1).unwrap())
        .collect();
    let none = EulerAngles::default();
    for (x, child) in [0.0, 1.0, 2.0].into_iter().zip(&children) {
        let offset = Point3::new(x, 0.0, 0.0);
        world
            .compound_add_child(compound, *child, offset, &none)
            .unwrap();
    }
    assert_eq!(world.compound_num_children(compound).unwrap(), 3);

    let removed = world.compound_remove_child(compound, 1).unwrap();
    assert_eq!(removed, children[1]);
    assert_eq!(world.compound_num_children(compound).unwrap(), 2);
    assert_eq!(world.shape_type(removed).unwrap(), ShapeType::Sphere);
    assert!(matches!(
        world.compound_remove_child(compound, 2),
        Err(RigidError::ChildIndexOutOfRange { index: 2, len: 2, .. })
    ));

    let body = world.create_body(removed, 1.0, Point3::origin()).unwrap();
    assert_eq!(world.shape_of(body).unwrap(), removed);
}

#[test]
fn test_compound_rejects_cycles_and_non_compounds() {
    let mut world = World::default();
    let outer = world.create_compound().unwrap();
    let inner = world.create_compound().unwrap();
    let ball = world.create_sphere(1.0).unwrap();
    let origin = Point3::origin();
    let none = EulerAngles::default();

    world
        .compound_add_child(outer, inner, origin, &none)
        .unwrap();
    assert!(matches!(
        world.compound_add_child(inner, outer, origin, &none),
        Err(RigidError::CompoundCycle { .. })
    ));
    assert!(matches!(
        world.compound_add_child(outer, outer, origin, &none),
        Err(RigidError::CompoundCycle { .. })
    ));
    assert!(matches!(
        world.compound_add_child(ball, inner, origin, &none),
        Err(RigidError::NotACompound(_))
    ));
}

#[test]
fn test_empty_compound_is_static_only() {
    let mut world = World::default();
    let empty = world.create_compound().unwrap();
    let origin = Point3::origin();

    let err = world.create_body(empty, 1.0, origin).unwrap_err();
    assert!(err.is_degenerate());
    assert_eq!(world.body_count(), 0);

    let anchor = world.create_body(empty, 0.0, origin).unwrap();
    assert_eq!(world.shape_of(anchor).unwrap(), empty);

    let ball = world.create_sphere(0.5).unwrap();
    world
        .compound_add_child(empty, ball, origin, &EulerAngles::default())
        .unwrap();
    let above = Point3::new(0.0, 2.0, 0.0);
    world.create_body(empty, 1.0, above).unwrap();
}

#[test]
fn test_shape_deletion_rules() {
    let mut world = World::default();
    let ball = world.create_sphere(1.0).unwrap();
    let body = world.create_body(ball, 1.0, Point3::origin()).unwrap();

    let err = world.delete_shape(ball).unwrap_err();
    assert!(matches!(err, RigidError::ShapeInUse { .. }));
    assert!(world.shape(ball).is_some());

    world.delete_body(body).unwrap();
    world.delete_shape(ball).unwrap();
    assert_eq!(world.shape_count(), 0);
}

#[test]
fn test_stale_handles_fail() {
    let mut world = World::default();
    let ball = world.create_sphere(1.0).unwrap();
    let a = world.create_body(ball, 1.0, Point3::origin()).unwrap();
    let b = world
        .create_body(ball, 1.0, Point3::new(3.0, 0.0, 0.0))
        .unwrap();
    let anchor = Point3::new(1.5, 0.0, 0.0);
    let joint = world
        .create_hinge2(a, b, anchor, Vector3::y(), Vector3::x(), true)
        .unwrap();

    world.delete_body(a).unwrap();
    assert!(matches!(world.position(a), Err(RigidError::InvalidBodyId(_))));
    let err = world.set_linear_velocity(a, Vector3::x()).unwrap_err();
    assert!(err.is_handle_error());
    assert!(matches!(
        world.hinge2_angle1(joint),
        Err(RigidError::InvalidConstraintId(_))
    ));
    assert!(world.delete_body(a).is_err());

    // Fresh handles never reuse old values.
    let c = world.create_body(ball, 1.0, Point3::origin()).unwrap();
    assert!(c > b);
    assert_ne!(c, a);
}

#[test]
fn test_invalid_shape_dimensions() {
    let mut world = World::default();
    let flat = world.create_box(Vector3::new(1.0, 0.0, 1.0)).unwrap_err();
    assert!(flat.is_degenerate());
    assert!(world.create_sphere(-1.0).is_err());
    assert!(world.create_cylinder_x(f64::NAN, 1.0).is_err());
    assert_eq!(world.shape_count(), 0);
}

#[test]
fn test_cylinder_half_extents_follow_axis() {
    let mut world = World::default();
    let x = world.create_cylinder_x(0.5, 2.0).unwrap();
    let y = world.create_cylinder_y(0.5, 2.0).unwrap();
    let z = world.create_cylinder_z(0.5, 2.0).unwrap();

    let half = |id| world.shape(id).unwrap().primitive_half_extents().unwrap();
    assert_eq!(half(x), Vector3::new(2.0, 0.5, 0.5));
    assert_eq!(half(y), Vector3::new(0.5, 2.0, 0.5));
    assert_eq!(half(z), Vector3::new(0.5, 0.5, 2.0));
    let kind = |id| world.shape_type(id).unwrap();
    assert_eq!(kind(x), ShapeType::Cylinder(CylinderAxis::X));
    assert_eq!(kind(z), ShapeType::Cylinder(CylinderAxis::Z));
}

#[test]
fn test_max_sub_steps_caps_work() {
    let mut world = World::default();
    let ball = world.create_sphere(0.5).unwrap();
    let body = world
        .create_body(ball, 1.0, Point3::new(0.0, 100.0, 0.0))
        .unwrap();
    let fixed = world.config().fixed_timestep;

    assert_eq!(world.step(1.0, 3).unwrap(), 3);
    assert_eq!(world.step_count(), 3);
    assert_relative_eq!(world.time(), 3.0 * fixed, epsilon = 1e-12);
    let v = world.linear_velocity(body).unwrap();
    assert_relative_eq!(v.y, -10.0 * 3.0 * fixed, epsilon = 1e-12);

    // Less than one fixed step accumulates without stepping.
    assert_eq!(world.step(fixed * 0.5, 3).unwrap(), 0);
    assert_eq!(world.step(fixed * 0.5, 3).unwrap(), 1);
}

#[test]
fn test_invalid_timestep_is_rejected() {
    let mut world = World::default();
    assert!(matches!(world.step(-1.0, 1), Err(RigidError::InvalidTimestep(_))));
    assert!(world.step(f64::NAN, 0).is_err());
    assert_eq!(world.step(0.0, 0).unwrap(), 0);
    assert_eq!(world.step_count(), 0);
}

#[test]
fn test_custom_config_is_validated_and_used() {
    let bad = WorldConfig::default().with_gravity(Vector3::new(0.0, f64::NAN, 0.0));
    assert!(matches!(World::new(bad), Err(RigidError::InvalidConfig { .. })));

    let config = WorldConfig::default()
        .with_fixed_timestep(0.01)
        .with_gravity(Vector3::new(0.0, 0.0, -9.81));
    let mut world = World::new(config).unwrap();
    let ball = world.create_sphere(0.5).unwrap();
    let body = world.create_body(ball, 1.0, Point3::origin()).unwrap();

    assert_eq!(world.step(0.05, 10).unwrap(), 5);
    let falling = world.linear_velocity(body).unwrap();
    assert_relative_eq!(falling.z, -9.81 * 0.05, epsilon = 1e-12);

    world.set_gravity(Vector3::zeros()).unwrap();
    let v = world.linear_velocity(body).unwrap();
    world.step(0.01, 1).unwrap();
    assert_relative_eq!(world.linear_velocity(body).unwrap(), v);
}

#[test]
fn test_clear_then_reuse() {
    let mut world = World::default();
    let ball = world.create_sphere(0.5).unwrap();
    let body = world.create_body(ball, 1.0, Point3::origin()).unwrap();
    world.step(0.1, 0).unwrap();

    world.clear();
    assert_eq!(world.body_count(), 0);
    assert!(world.position(body).is_err());

    let again = world.create_sphere(0.5).unwrap();
    let fresh = world.create_body(again, 1.0, Point3::origin()).unwrap();
    assert_ne!(fresh, body);
    assert_eq!(world.step(0.1, 0).unwrap(), 1);
}
