//! Integration tests for free motion, resting contact and contact reports.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use rigid_core::{ActivationState, BodyId, EulerAngles, World, WorldConfig};

const DT: f64 = 1.0 / 60.0;

fn zero_gravity() -> World {
    World::new(WorldConfig::default().with_gravity(Vector3::zeros())).unwrap()
}

/// Static ground whose top face is the plane y = 0.
fn add_ground(world: &mut World) -> BodyId {
    let shape = world.create_box(Vector3::new(20.0, 1.0, 20.0)).unwrap();
    world
        .create_body(shape, 0.0, Point3::new(0.0, -1.0, 0.0))
        .unwrap()
}

fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 1).unwrap();
    }
}

// ============================================================================
// Free motion
// ============================================================================

#[test]
fn test_static_body_ignores_forces() {
    let mut world = World::default();
    let shape = world.create_box(Vector3::repeat(1.0)).unwrap();
    let body = world
        .create_body(shape, 0.0, Point3::new(1.0, 2.0, 3.0))
        .unwrap();

    for _ in 0..30 {
        world
            .apply_central_force(body, Vector3::new(100.0, 0.0, 0.0))
            .unwrap();
        world
            .apply_torque(body, Vector3::new(0.0, 50.0, 0.0))
            .unwrap();
        let corner = Point3::new(1.0, 3.0, 3.0);
        world
            .apply_impulse(body, Vector3::new(0.0, 10.0, 0.0), corner)
            .unwrap();
        world.step(DT, 1).unwrap();
    }

    assert_eq!(world.position(body).unwrap(), Point3::new(1.0, 2.0, 3.0));
    assert_eq!(world.linear_velocity(body).unwrap(), Vector3::zeros());
    assert_eq!(world.angular_velocity(body).unwrap(), Vector3::zeros());
}

#[test]
fn test_body_at_rest_without_gravity_stays_put() {
    let mut world = zero_gravity();
    let shape = world.create_sphere(0.5).unwrap();
    let body = world
        .create_body(shape, 2.0, Point3::new(0.0, 5.0, 0.0))
        .unwrap();

    run(&mut world, 120);

    assert_eq!(world.position(body).unwrap(), Point3::new(0.0, 5.0, 0.0));
    assert_eq!(world.linear_velocity(body).unwrap(), Vector3::zeros());
}

#[test]
fn test_free_fall_velocity_is_gravity_times_time() {
    let mut world = World::default();
    let shape = world.create_sphere(0.5).unwrap();
    let body = world
        .create_body(shape, 1.0, Point3::new(0.0, 100.0, 0.0))
        .unwrap();

    run(&mut world, 60);

    assert_relative_eq!(world.time(), 1.0, epsilon = 1e-9);
    assert_eq!(world.step_count(), 60);
    let v = world.linear_velocity(body).unwrap();
    assert_relative_eq!(v, world.gravity() * world.time(), epsilon = 1e-9);
}

#[test]
fn test_variable_step_uses_exact_dt() {
    let mut world = World::default();
    let shape = world.create_sphere(0.5).unwrap();
    let body = world
        .create_body(shape, 1.0, Point3::new(0.0, 100.0, 0.0))
        .unwrap();

    assert_eq!(world.step(0.25, 0).unwrap(), 1);
    let v = world.linear_velocity(body).unwrap();
    assert_relative_eq!(v.y, -2.5, epsilon = 1e-12);
    assert_relative_eq!(world.time(), 0.25);
}

#[test]
fn test_torque_is_consumed_by_one_sub_step() {
    let mut world = zero_gravity();
    let shape = world.create_box(Vector3::repeat(0.5)).unwrap();
    let body = world.create_body(shape, 1.0, Point3::origin()).unwrap();

    world
        .apply_torque(body, Vector3::new(0.0, 1.0, 0.0))
        .unwrap();
    world.step(DT, 1).unwrap();
    let spin = world.angular_velocity(body).unwrap().y;
    // I = m (1² + 1²) / 12 = 1/6.
    assert_relative_eq!(spin, 6.0 * DT, epsilon = 1e-12);

    world.step(DT, 1).unwrap();
    let omega = world.angular_velocity(body).unwrap();
    assert_relative_eq!(omega.y, spin, epsilon = 1e-12);
}

// ============================================================================
// Resting contact
// ============================================================================

#[test]
fn test_box_settles_on_ground() {
    let mut world = World::default();
    add_ground(&mut world);
    let shape = world.create_box(Vector3::repeat(1.0)).unwrap();
    let body = world
        .create_body(shape, 1.0, Point3::new(0.0, 3.0, 0.0))
        .unwrap();

    run(&mut world, 240);

    let y = world.position(body).unwrap().y;
    assert!((y - 1.0).abs() < 0.05, "box rests at y = {y}");
    assert!(world.linear_velocity(body).unwrap().norm() < 0.05);
    assert!(world.angular_velocity(body).unwrap().norm() < 0.05);
    for contact in world.contacts() {
        let depth = contact.distance;
        assert!(depth > -0.05, "deep penetration {depth}");
    }
}

#[test]
fn test_sphere_and_compound_rest_on_ground() {
    let mut world = World::default();
    add_ground(&mut world);

    let ball = world.create_sphere(0.5).unwrap();
    let sphere = world
        .create_body(ball, 1.0, Point3::new(-3.0, 2.0, 0.0))
        .unwrap();

    let dumbbell = world.create_compound().unwrap();
    let end = world.create_sphere(0.5).unwrap();
    let none = EulerAngles::default();
    for x in [-1.0, 1.0] {
        world
            .compound_add_child(dumbbell, end, Point3::new(x, 0.0, 0.0), &none)
            .unwrap();
    }
    let compound = world
        .create_body(dumbbell, 2.0, Point3::new(3.0, 2.0, 0.0))
        .unwrap();

    run(&mut world, 240);

    for body in [sphere, compound] {
        let y = world.position(body).unwrap().y;
        assert!((y - 0.5).abs() < 0.05, "{body} rests at y = {y}");
    }
}

#[test]
fn test_cylinder_rests_on_ground() {
    let mut world = World::default();
    add_ground(&mut world);
    // Radius equals half-length, so the rest height is the same standing or lying.
    let shape = world.create_cylinder_y(0.5, 0.5).unwrap();
    let body = world
        .create_body(shape, 1.0, Point3::new(0.0, 1.5, 0.0))
        .unwrap();

    run(&mut world, 240);

    let y = world.position(body).unwrap().y;
    assert!((y - 0.5).abs() < 0.1, "cylinder rests at y = {y}");
}

#[test]
fn test_resting_body_falls_asleep_and_wakes_on_impulse() {
    let mut world = World::default();
    add_ground(&mut world);
    let shape = world.create_box(Vector3::repeat(0.5)).unwrap();
    let body = world
        .create_body(shape, 1.0, Point3::new(0.0, 0.6, 0.0))
        .unwrap();

    run(&mut world, 300);
    assert_eq!(
        world.activation_state(body).unwrap(),
        ActivationState::Sleeping
    );
    assert_eq!(world.linear_velocity(body).unwrap(), Vector3::zeros());

    let at = world.position(body).unwrap();
    world
        .apply_impulse(body, Vector3::new(0.0, 5.0, 0.0), at)
        .unwrap();
    assert_eq!(
        world.activation_state(body).unwrap(),
        ActivationState::Active
    );
    world.step(DT, 1).unwrap();
    assert!(world.position(body).unwrap().y > at.y);
}

#[test]
fn test_always_active_body_never_sleeps() {
    let mut world = World::default();
    add_ground(&mut world);
    let shape = world.create_box(Vector3::repeat(0.5)).unwrap();
    let body = world
        .create_body(shape, 1.0, Point3::new(0.0, 0.6, 0.0))
        .unwrap();
    world.set_deactivation(body, false).unwrap();

    run(&mut world, 300);
    assert_eq!(
        world.activation_state(body).unwrap(),
        ActivationState::AlwaysActive
    );
}

// ============================================================================
// Contact reports
// ============================================================================

#[test]
fn test_reports_only_penetrating_points() {
    let mut world = World::default();
    let ground = add_ground(&mut world);
    let shape = world.create_box(Vector3::repeat(0.5)).unwrap();
    for i in 0..4 {
        let x = f64::from(i) * 1.5 - 2.25;
        world
            .create_body(shape, 1.0, Point3::new(x, 0.5 + f64::from(i), 0.0))
            .unwrap();
    }

    let mut reported = 0;
    for _ in 0..180 {
        world.step(DT, 1).unwrap();
        for contact in world.contacts() {
            reported += 1;
            assert!(contact.distance < 0.0);
            assert!(contact.body_a < contact.body_b);
            let rebuilt = contact.point_on_b + contact.normal_on_b * contact.distance;
            assert_relative_eq!(rebuilt, contact.point_on_a, epsilon = 1e-9);
        }
    }
    assert!(reported > 0);

    // Ground is created first, so it is always body A and the normal points down to it.
    for contact in world.contact_snapshot() {
        if contact.body_a == ground {
            assert!(contact.normal_on_b.y < -0.9);
        }
    }
}

#[test]
fn test_separated_bodies_report_nothing() {
    let mut world = zero_gravity();
    let shape = world.create_sphere(0.5).unwrap();
    world.create_body(shape, 1.0, Point3::origin()).unwrap();
    world
        .create_body(shape, 1.0, Point3::new(1.01, 0.0, 0.0))
        .unwrap();

    world.step(DT, 1).unwrap();
    assert!(world.contacts().next().is_none());
    // The near-contact is still kept for the solver.
    assert_eq!(world.manifolds().len(), 1);
}

#[test]
fn test_energy_and_momentum_diagnostics() {
    let mut world = zero_gravity();
    let shape = world.create_sphere(0.5).unwrap();
    let a = world.create_body(shape, 2.0, Point3::origin()).unwrap();
    let b = world
        .create_body(shape, 1.0, Point3::new(5.0, 0.0, 0.0))
        .unwrap();
    world
        .set_linear_velocity(a, Vector3::new(1.0, 0.0, 0.0))
        .unwrap();
    world
        .set_linear_velocity(b, Vector3::new(0.0, 2.0, 0.0))
        .unwrap();

    assert_relative_eq!(world.total_kinetic_energy(), 1.0 + 2.0);
    assert_relative_eq!(world.total_linear_momentum(), Vector3::new(2.0, 2.0, 0.0));
}
