//! Semi-implicit Euler integration over the ECS world.

use glam::{Quat, Vec3};

use crate::components::{GlobalTransform, RigidBody, Transform};

/// Angular speed cap before position integration; runaway spins would
/// otherwise produce meaningless orientation deltas at large timesteps.
const MAX_ANGULAR_SPEED: f32 = 32.0;
/// Below this angular speed the axis is too short to normalize safely and
/// the orientation update is skipped.
const ROTATION_EPSILON: f32 = 1e-6;

/// Integrate accumulated forces and gravity into velocities, then reset
/// the accumulators: `v += (F * inv_mass + g) * dt`,
/// `w += I_world^-1 * tau * dt`.
pub fn integrate_velocities(world: &mut hecs::World, gravity: Vec3, dt: f32) {
    for (_, (rb, transform)) in world.query_mut::<(&mut RigidBody, &Transform)>() {
        rb.center_of_mass = transform.position;
        if rb.inv_mass <= 0.0 {
            rb.reset_accumulators();
            continue;
        }
        rb.velocity += (rb.force_accumulator * rb.inv_mass + gravity) * dt;
        rb.angular_velocity += rb.inv_inertia_world * rb.torque_accumulator * dt;
        rb.reset_accumulators();
    }
}

/// Integrate velocities into position and orientation, then refresh the
/// world-space inverse inertia for the next tick. The orientation delta is
/// an angle-axis quaternion left-multiplied onto the current rotation.
pub fn integrate_positions(world: &mut hecs::World, dt: f32) {
    for (_, (rb, transform)) in world.query_mut::<(&mut RigidBody, &mut Transform)>() {
        if rb.inv_mass <= 0.0 {
            continue;
        }
        transform.position += rb.velocity * dt;

        let speed = rb.angular_velocity.length();
        if speed > ROTATION_EPSILON {
            let axis = rb.angular_velocity / speed;
            let angle = speed.min(MAX_ANGULAR_SPEED) * dt;
            let delta = Quat::from_axis_angle(axis, angle);
            transform.rotation = (delta * transform.rotation).normalize();
        }

        rb.update_world_inertia(transform.rotation);
        rb.center_of_mass = transform.position;
    }
}

/// Mirror every entity's local transform into its world matrix.
pub fn sync_transforms(world: &mut hecs::World) {
    for (_, (transform, global)) in world.query_mut::<(&Transform, &mut GlobalTransform)>() {
        global.0 = transform.to_matrix();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_fall() {
        let mut world = hecs::World::new();
        let entity = world.spawn((
            Transform::from_position(Vec3::new(0.0, 10.0, 0.0)),
            GlobalTransform::default(),
            RigidBody::new(1.0),
        ));

        let gravity = Vec3::new(0.0, -9.81, 0.0);
        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            integrate_velocities(&mut world, gravity, dt);
            integrate_positions(&mut world, dt);
            sync_transforms(&mut world);
        }

        let transform = world.get::<&Transform>(entity).unwrap();
        // Semi-implicit Euler falls slightly faster than the analytic
        // 0.5*g*t^2; after one second it is near y = 10 - 4.9 = 5.1.
        assert!(transform.position.y < 5.3, "y = {}", transform.position.y);
        assert!(transform.position.y > 4.7, "y = {}", transform.position.y);
        assert!(transform.position.x.abs() < 1e-5);
        assert!(transform.position.z.abs() < 1e-5);
    }

    #[test]
    fn test_zero_inverse_mass_unaffected() {
        let mut world = hecs::World::new();
        let mut rb = RigidBody::new(1.0);
        rb.set_mass(0.0);
        let entity = world.spawn((Transform::identity(), GlobalTransform::default(), rb));

        for _ in 0..60 {
            integrate_velocities(&mut world, Vec3::new(0.0, -9.81, 0.0), 1.0 / 60.0);
            integrate_positions(&mut world, 1.0 / 60.0);
        }
        let transform = world.get::<&Transform>(entity).unwrap();
        assert_eq!(transform.position, Vec3::ZERO);
    }

    #[test]
    fn test_accumulators_reset_after_integration() {
        let mut world = hecs::World::new();
        let mut rb = RigidBody::new(1.0);
        rb.add_force(Vec3::new(10.0, 0.0, 0.0));
        rb.torque_accumulator = Vec3::new(0.0, 1.0, 0.0);
        let entity = world.spawn((Transform::identity(), rb));

        integrate_velocities(&mut world, Vec3::ZERO, 1.0 / 60.0);

        let rb = world.get::<&RigidBody>(entity).unwrap();
        assert_eq!(rb.force_accumulator, Vec3::ZERO);
        assert_eq!(rb.torque_accumulator, Vec3::ZERO);
        assert!(rb.velocity.x > 0.0);
        assert!(rb.angular_velocity.y > 0.0);
    }

    #[test]
    fn test_spin_integrates_orientation() {
        let mut world = hecs::World::new();
        let mut rb = RigidBody::new(1.0);
        rb.angular_velocity = Vec3::new(0.0, std::f32::consts::PI, 0.0);
        let entity = world.spawn((Transform::identity(), rb));

        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            integrate_positions(&mut world, dt);
        }

        let transform = world.get::<&Transform>(entity).unwrap();
        // Half a turn about Y in one second.
        let (axis, angle) = transform.rotation.to_axis_angle();
        assert!((angle - std::f32::consts::PI).abs() < 1e-2);
        assert!(axis.y.abs() > 0.99);
    }

    #[test]
    fn test_center_of_mass_mirrors_position() {
        let mut world = hecs::World::new();
        let mut rb = RigidBody::new(1.0);
        rb.velocity = Vec3::new(1.0, 0.0, 0.0);
        let entity = world.spawn((Transform::identity(), rb));

        integrate_positions(&mut world, 1.0);

        let rb = world.get::<&RigidBody>(entity).unwrap();
        assert!((rb.center_of_mass - Vec3::X).length() < 1e-6);
    }
}
