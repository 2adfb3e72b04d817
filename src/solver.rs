//! Sequential-impulse (projected Gauss-Seidel) contact solver.
//!
//! Body state is gathered into a flat cache once per tick, the contact and
//! friction passes iterate over it strictly sequentially (each impulse
//! application feeds the next constraint's relative velocity), and the
//! result is written back to the ECS afterwards.

use std::collections::HashMap;

use glam::{Mat3, Vec3};
use hecs::Entity;

use crate::components::RigidBody;
use crate::contact::{Contact, Manifold};

/// Per-body state cached for the solver passes.
#[derive(Debug, Clone, Copy)]
struct RbData {
    inv_mass: f32,
    inv_inertia: Mat3,
    velocity: Vec3,
    angular_velocity: Vec3,
    restitution: f32,
    friction: f32,
}

/// Flat velocity cache for every rigidbody referenced by this tick's
/// manifolds. Entities without a [`RigidBody`] never enter the map; their
/// side of a contact contributes zero inverse mass and inertia.
pub struct BodySet {
    bodies: HashMap<Entity, RbData>,
}

impl BodySet {
    pub fn gather(world: &hecs::World, manifolds: &[Manifold]) -> Self {
        let mut bodies = HashMap::new();
        for manifold in manifolds {
            for entity in [manifold.entity_a, manifold.entity_b] {
                if bodies.contains_key(&entity) {
                    continue;
                }
                if let Ok(rb) = world.get::<&RigidBody>(entity) {
                    bodies.insert(
                        entity,
                        RbData {
                            inv_mass: rb.inv_mass,
                            inv_inertia: rb.inv_inertia_world,
                            velocity: rb.velocity,
                            angular_velocity: rb.angular_velocity,
                            restitution: rb.restitution,
                            friction: rb.friction,
                        },
                    );
                }
            }
        }
        Self { bodies }
    }

    /// Write resolved velocities back into the ECS.
    pub fn write_back(&self, world: &mut hecs::World) {
        for (entity, data) in &self.bodies {
            if let Ok(mut rb) = world.get::<&mut RigidBody>(*entity) {
                rb.velocity = data.velocity;
                rb.angular_velocity = data.angular_velocity;
            }
        }
    }

    fn get(&self, entity: Option<Entity>) -> Option<&RbData> {
        entity.and_then(|e| self.bodies.get(&e))
    }

    /// Velocity of the contact point relative to the reference side,
    /// projected on `axis` (the contact-space J.V).
    fn relative_velocity(&self, contact: &Contact, axis: Vec3) -> f32 {
        let ra = contact.ref_contact - contact.ref_centroid;
        let rb = contact.inc_contact - contact.inc_centroid;
        let mut v = Vec3::ZERO;
        if let Some(body) = self.get(contact.ref_rigidbody) {
            v -= body.velocity + body.angular_velocity.cross(ra);
        }
        if let Some(body) = self.get(contact.inc_rigidbody) {
            v += body.velocity + body.angular_velocity.cross(rb);
        }
        axis.dot(v)
    }

    fn effective_mass(&self, contact: &Contact, axis: Vec3) -> f32 {
        let ra = contact.ref_contact - contact.ref_centroid;
        let rb = contact.inc_contact - contact.inc_centroid;
        let mut sum = 0.0;
        if let Some(body) = self.get(contact.ref_rigidbody) {
            let ra_cross = ra.cross(axis);
            sum += body.inv_mass + ra_cross.dot(body.inv_inertia * ra_cross);
        }
        if let Some(body) = self.get(contact.inc_rigidbody) {
            let rb_cross = rb.cross(axis);
            sum += body.inv_mass + rb_cross.dot(body.inv_inertia * rb_cross);
        }
        sum
    }

    /// Apply an impulse along the contact Jacobian: reference side pushed
    /// against the impulse, incident side along it.
    fn apply_impulse(&mut self, contact: &Contact, impulse: Vec3) {
        let ra = contact.ref_contact - contact.ref_centroid;
        let rb = contact.inc_contact - contact.inc_centroid;
        if let Some(entity) = contact.ref_rigidbody {
            if let Some(body) = self.bodies.get_mut(&entity) {
                body.velocity -= impulse * body.inv_mass;
                body.angular_velocity -= body.inv_inertia * ra.cross(impulse);
            }
        }
        if let Some(entity) = contact.inc_rigidbody {
            if let Some(body) = self.bodies.get_mut(&entity) {
                body.velocity += impulse * body.inv_mass;
                body.angular_velocity += body.inv_inertia * rb.cross(impulse);
            }
        }
    }

    /// Deterministic, commutative material combination: restitution takes
    /// the max, friction the geometric mean. A missing side mirrors the
    /// present one.
    fn combined_materials(&self, contact: &Contact) -> (f32, f32) {
        match (
            self.get(contact.ref_rigidbody),
            self.get(contact.inc_rigidbody),
        ) {
            (Some(a), Some(b)) => (
                a.restitution.max(b.restitution),
                (a.friction * b.friction).sqrt(),
            ),
            (Some(only), None) | (None, Some(only)) => (only.restitution, only.friction),
            (None, None) => (0.0, 0.0),
        }
    }
}

/// Derive the tangent frame and per-axis effective masses for every
/// contact, and fix the restitution velocity bias from the initial
/// approach velocity. Runs once per manifold before warm starting.
pub fn precalculate_effective_masses(bodies: &BodySet, manifold: &mut Manifold, restitution_slop: f32) {
    for contact in &mut manifold.contacts {
        let normal = contact.normal;
        // Seed off the X axis, falling back to Y when the normal is
        // (anti)parallel to it.
        let mut tangent1 = normal.cross(Vec3::X);
        if tangent1.length_squared() < 1e-6 {
            tangent1 = normal.cross(Vec3::Y);
        }
        contact.tangent1 = tangent1.normalize();
        contact.tangent2 = normal.cross(contact.tangent1).normalize();

        contact.effective_mass = bodies.effective_mass(contact, normal);
        contact.tangent1_mass = bodies.effective_mass(contact, contact.tangent1);
        contact.tangent2_mass = bodies.effective_mass(contact, contact.tangent2);

        let (restitution, _) = bodies.combined_materials(contact);
        let approach = bodies.relative_velocity(contact, normal);
        contact.restitution_bias = (-approach * restitution - restitution_slop).max(0.0);

        contact.total_lambda = 0.0;
        contact.tangent1_lambda = 0.0;
        contact.tangent2_lambda = 0.0;
    }
}

/// Re-apply impulses for contacts whose lambdas were seeded from last
/// tick's matched labels.
pub fn apply_warm_start(bodies: &mut BodySet, manifold: &Manifold) {
    for contact in &manifold.contacts {
        if contact.total_lambda == 0.0
            && contact.tangent1_lambda == 0.0
            && contact.tangent2_lambda == 0.0
        {
            continue;
        }
        let impulse = contact.normal * contact.total_lambda
            + contact.tangent1 * contact.tangent1_lambda
            + contact.tangent2 * contact.tangent2_lambda;
        bodies.apply_impulse(contact, impulse);
    }
}

/// One Gauss-Seidel pass over the manifold's normal constraints.
pub fn solve_contact_constraints(
    bodies: &mut BodySet,
    manifold: &mut Manifold,
    dt: f32,
    baumgarte_coefficient: f32,
    baumgarte_slop: f32,
) {
    for contact in &mut manifold.contacts {
        if contact.effective_mass <= 0.0 {
            continue;
        }
        let jv = bodies.relative_velocity(contact, contact.normal);

        // Negative when the incident point is below the reference plane.
        let penetration = (contact.ref_contact - contact.inc_contact).dot(-contact.normal);
        let baumgarte =
            -(penetration + baumgarte_slop).min(0.0) * baumgarte_coefficient / dt;

        let lambda = (-jv + baumgarte + contact.restitution_bias) / contact.effective_mass;

        // Contacts only push: clamp the accumulated impulse, apply the
        // increment.
        let old = contact.total_lambda;
        contact.total_lambda = (old + lambda).max(0.0);
        let applied = contact.total_lambda - old;
        bodies.apply_impulse(contact, contact.normal * applied);
    }
}

/// One Gauss-Seidel pass over the manifold's friction constraints. Each
/// tangent's accumulated impulse is clamped to the Coulomb cone
/// (linearized per axis against the current normal impulse).
pub fn solve_friction_constraints(bodies: &mut BodySet, manifold: &mut Manifold) {
    for contact in &mut manifold.contacts {
        let (_, friction) = bodies.combined_materials(contact);
        let limit = contact.total_lambda * friction;

        if contact.tangent1_mass > 0.0 {
            let jv = bodies.relative_velocity(contact, contact.tangent1);
            let lambda = -jv / contact.tangent1_mass;
            let old = contact.tangent1_lambda;
            contact.tangent1_lambda = (old + lambda).clamp(-limit, limit);
            bodies.apply_impulse(contact, contact.tangent1 * (contact.tangent1_lambda - old));
        }
        if contact.tangent2_mass > 0.0 {
            let jv = bodies.relative_velocity(contact, contact.tangent2);
            let lambda = -jv / contact.tangent2_mass;
            let old = contact.tangent2_lambda;
            contact.tangent2_lambda = (old + lambda).clamp(-limit, limit);
            bodies.apply_impulse(contact, contact.tangent2 * (contact.tangent2_lambda - old));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Transform;
    use crate::mesh::EdgeLabel;
    use glam::Mat4;

    fn contact_between(
        ref_rb: Option<Entity>,
        inc_rb: Option<Entity>,
        ref_centroid: Vec3,
        inc_centroid: Vec3,
        point: Vec3,
        normal: Vec3,
    ) -> Contact {
        Contact {
            ref_contact: point,
            inc_contact: point,
            normal,
            tangent1: Vec3::ZERO,
            tangent2: Vec3::ZERO,
            ref_centroid,
            inc_centroid,
            ref_rigidbody: ref_rb,
            inc_rigidbody: inc_rb,
            total_lambda: 0.0,
            tangent1_lambda: 0.0,
            tangent2_lambda: 0.0,
            effective_mass: 0.0,
            tangent1_mass: 0.0,
            tangent2_mass: 0.0,
            restitution_bias: 0.0,
            label: EdgeLabel::UNSET,
        }
    }

    fn manifold_with(world: &hecs::World, a: Entity, b: Entity, contact: Contact) -> Manifold {
        let _ = world;
        let mut m = Manifold::new(a, b, 0, 0, Mat4::IDENTITY, Mat4::IDENTITY);
        m.is_colliding = true;
        m.contacts.push(contact);
        m
    }

    fn head_on_world(speed: f32, restitution: f32) -> (hecs::World, Entity, Entity, Manifold) {
        let mut world = hecs::World::new();
        let mut rb_a = RigidBody::new(1.0);
        rb_a.velocity = Vec3::new(speed, 0.0, 0.0);
        rb_a.set_restitution(restitution);
        rb_a.center_of_mass = Vec3::new(-0.5, 0.0, 0.0);
        let mut rb_b = RigidBody::new(1.0);
        rb_b.velocity = Vec3::new(-speed, 0.0, 0.0);
        rb_b.set_restitution(restitution);
        rb_b.center_of_mass = Vec3::new(0.5, 0.0, 0.0);

        let a = world.spawn((Transform::identity(), rb_a));
        let b = world.spawn((Transform::identity(), rb_b));

        // A is reference, normal points from A to B along +X; the contact
        // sits on the line of centers so angular terms vanish.
        let contact = contact_between(
            Some(a),
            Some(b),
            Vec3::new(-0.5, 0.0, 0.0),
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::ZERO,
            Vec3::X,
        );
        let manifold = manifold_with(&world, a, b, contact);
        (world, a, b, manifold)
    }

    #[test]
    fn test_effective_mass_two_unit_bodies() {
        let (world, _, _, mut manifold) = head_on_world(1.0, 0.0);
        let bodies = BodySet::gather(&world, std::slice::from_ref(&manifold));
        precalculate_effective_masses(&bodies, &mut manifold, 0.0);
        let c = &manifold.contacts[0];
        assert!((c.effective_mass - 2.0).abs() < 1e-5);
        // Tangent frame is orthonormal.
        assert!(c.tangent1.dot(c.normal).abs() < 1e-6);
        assert!(c.tangent2.dot(c.normal).abs() < 1e-6);
        assert!(c.tangent1.dot(c.tangent2).abs() < 1e-6);
    }

    #[test]
    fn test_tangent_fallback_axis() {
        let mut world = hecs::World::new();
        let a = world.spawn((Transform::identity(), RigidBody::new(1.0)));
        let contact = contact_between(Some(a), None, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO, Vec3::X);
        let mut manifold = manifold_with(&world, a, a, contact);
        let bodies = BodySet::gather(&world, std::slice::from_ref(&manifold));
        precalculate_effective_masses(&bodies, &mut manifold, 0.0);
        // normal == X: the first seed degenerates, the Y seed kicks in.
        let c = &manifold.contacts[0];
        assert!((c.tangent1.length() - 1.0).abs() < 1e-5);
        assert!(c.tangent1.dot(Vec3::X).abs() < 1e-6);
    }

    #[test]
    fn test_normal_solve_stops_approach() {
        let (world, _, _, mut manifold) = head_on_world(2.0, 0.0);
        let mut bodies = BodySet::gather(&world, std::slice::from_ref(&manifold));
        precalculate_effective_masses(&bodies, &mut manifold, 0.0);
        for _ in 0..8 {
            solve_contact_constraints(&mut bodies, &mut manifold, 1.0 / 60.0, 0.0, 0.0);
        }
        let jv = bodies.relative_velocity(&manifold.contacts[0], Vec3::X);
        assert!(jv > -1e-3, "still approaching after solve: jv = {jv}");
        assert!(manifold.contacts[0].total_lambda > 0.0);
    }

    #[test]
    fn test_restitution_bias_reflects_approach_speed() {
        let (world, _, _, mut manifold) = head_on_world(3.0, 1.0);
        let bodies = BodySet::gather(&world, std::slice::from_ref(&manifold));
        precalculate_effective_masses(&bodies, &mut manifold, 0.0);
        // Approach speed is 6 (3 each way), e = 1.
        assert!((manifold.contacts[0].restitution_bias - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_friction_cone_clamp() {
        let mut world = hecs::World::new();
        let mut rb = RigidBody::new(1.0);
        rb.velocity = Vec3::new(0.0, -1.0, 0.0) + Vec3::new(4.0, 0.0, 0.0); // sliding fast
        rb.set_friction(0.4);
        rb.center_of_mass = Vec3::new(0.0, 0.5, 0.0);
        let cube = world.spawn((Transform::identity(), rb));
        let floor = world.spawn((Transform::identity(),));

        let contact = contact_between(
            None,
            Some(cube),
            Vec3::ZERO,
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::ZERO,
            Vec3::Y,
        );
        let mut manifold = manifold_with(&world, floor, cube, contact);
        let mut bodies = BodySet::gather(&world, std::slice::from_ref(&manifold));
        precalculate_effective_masses(&bodies, &mut manifold, 0.0);

        for _ in 0..8 {
            solve_contact_constraints(&mut bodies, &mut manifold, 1.0 / 60.0, 0.0, 0.0);
        }
        for _ in 0..4 {
            solve_friction_constraints(&mut bodies, &mut manifold);
            let c = &manifold.contacts[0];
            let limit = c.total_lambda * 0.4 + 1e-6;
            assert!(c.tangent1_lambda.abs() <= limit);
            assert!(c.tangent2_lambda.abs() <= limit);
        }
        // The slide was too fast for friction to stop in one tick: the
        // cone must be saturated.
        let c = &manifold.contacts[0];
        let total_tangent =
            (c.tangent1_lambda.powi(2) + c.tangent2_lambda.powi(2)).sqrt();
        assert!(total_tangent > 0.0);
    }

    #[test]
    fn test_static_side_zero_contribution() {
        let mut world = hecs::World::new();
        let mut rb = RigidBody::new(1.0);
        rb.velocity = Vec3::new(0.0, -2.0, 0.0);
        rb.center_of_mass = Vec3::new(0.0, 0.5, 0.0);
        let cube = world.spawn((Transform::identity(), rb));
        let floor = world.spawn((Transform::identity(),));

        let contact = contact_between(
            None,
            Some(cube),
            Vec3::ZERO,
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::ZERO,
            Vec3::Y,
        );
        let mut manifold = manifold_with(&world, floor, cube, contact);
        let mut bodies = BodySet::gather(&world, std::slice::from_ref(&manifold));
        precalculate_effective_masses(&bodies, &mut manifold, 0.0);
        // Only the cube contributes.
        assert!((manifold.contacts[0].effective_mass - 1.0).abs() < 1e-5);

        for _ in 0..8 {
            solve_contact_constraints(&mut bodies, &mut manifold, 1.0 / 60.0, 0.0, 0.0);
        }
        bodies.write_back(&mut world);
        let rb = world.get::<&RigidBody>(cube).unwrap();
        assert!(rb.velocity.y > -1e-3, "cube still falling: {}", rb.velocity.y);
    }

    #[test]
    fn test_warm_start_applies_seeded_impulse() {
        let (world, a, b, mut manifold) = head_on_world(0.0, 0.0);
        let mut bodies = BodySet::gather(&world, std::slice::from_ref(&manifold));
        precalculate_effective_masses(&bodies, &mut manifold, 0.0);
        manifold.contacts[0].total_lambda = 1.5;
        apply_warm_start(&mut bodies, &manifold);
        let _ = (a, b);
        // Bodies were at rest; the seeded impulse separates them.
        let jv = bodies.relative_velocity(&manifold.contacts[0], Vec3::X);
        assert!((jv - 3.0).abs() < 1e-4); // 1.5 impulse on two unit masses
    }
}
