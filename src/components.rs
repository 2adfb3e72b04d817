//! ECS components consumed and produced by the physics pipeline.

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::collider::{Aabb, Collider, ColliderError, ConvexCollider};

/// Local-space transform. Stores position, rotation, and scale separately.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    /// Create an identity transform.
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Create a transform from a position.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Convert to a 4x4 matrix (translation * rotation * scale).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// World-space transform matrix. Refreshed by the pipeline after position
/// integration each fixed step.
#[derive(Debug, Clone, Copy)]
pub struct GlobalTransform(pub Mat4);

impl Default for GlobalTransform {
    fn default() -> Self {
        Self(Mat4::IDENTITY)
    }
}

/// Dynamic rigid body state.
///
/// An entity without this component is treated as a static body: it
/// participates in collision but contributes zero inverse mass/inertia to
/// the solver and is never integrated.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub inv_mass: f32,
    /// Inverse inertia tensor in body space.
    pub inv_inertia_local: Mat3,
    /// Inverse inertia tensor in world space, recomputed from the
    /// orientation after every position integration.
    pub inv_inertia_world: Mat3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force_accumulator: Vec3,
    pub torque_accumulator: Vec3,
    /// Bounciness in [0, 1].
    pub restitution: f32,
    /// Coulomb friction coefficient, >= 0.
    pub friction: f32,
    /// World-space center of mass. Mirrors the entity position each step.
    pub center_of_mass: Vec3,
}

impl RigidBody {
    /// Create a rigid body with the inertia of a unit cube of the given mass.
    pub fn new(mass: f32) -> Self {
        Self::with_box_inertia(mass, Vec3::splat(0.5))
    }

    /// Create a rigid body with the inertia tensor of a solid box with the
    /// given half extents.
    pub fn with_box_inertia(mass: f32, half_extents: Vec3) -> Self {
        let inv_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        let inv_inertia_local = if mass > 0.0 {
            let h = half_extents;
            let ix = mass / 3.0 * (h.y * h.y + h.z * h.z);
            let iy = mass / 3.0 * (h.x * h.x + h.z * h.z);
            let iz = mass / 3.0 * (h.x * h.x + h.y * h.y);
            Mat3::from_diagonal(Vec3::new(1.0 / ix, 1.0 / iy, 1.0 / iz))
        } else {
            Mat3::ZERO
        };
        Self {
            inv_mass,
            inv_inertia_local,
            inv_inertia_world: inv_inertia_local,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force_accumulator: Vec3::ZERO,
            torque_accumulator: Vec3::ZERO,
            restitution: 0.3,
            friction: 0.5,
            center_of_mass: Vec3::ZERO,
        }
    }

    pub fn set_mass(&mut self, mass: f32) {
        self.inv_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution.clamp(0.0, 1.0);
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction.max(0.0);
    }

    /// Accumulate a force acting through the center of mass.
    pub fn add_force(&mut self, force: Vec3) {
        self.force_accumulator += force;
    }

    /// Accumulate a force acting at a world-space point, adding the
    /// resulting torque about the center of mass.
    pub fn add_force_at_point(&mut self, force: Vec3, point: Vec3) {
        self.force_accumulator += force;
        self.torque_accumulator += (point - self.center_of_mass).cross(force);
    }

    pub fn reset_accumulators(&mut self) {
        self.force_accumulator = Vec3::ZERO;
        self.torque_accumulator = Vec3::ZERO;
    }

    /// Rotate the body-space inverse inertia tensor into world space.
    pub fn update_world_inertia(&mut self, rotation: Quat) {
        let r = Mat3::from_quat(rotation);
        self.inv_inertia_world = r * self.inv_inertia_local * r.transpose();
    }
}

impl Default for RigidBody {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Collider list plus trigger flag.
///
/// An entity needs this component (with at least one collider) and a
/// [`Transform`] to take part in collision detection. Entities with an
/// empty collider list are skipped when precursors are built.
#[derive(Default)]
pub struct PhysicsComponent {
    pub colliders: Vec<Collider>,
    /// Trigger colliders report overlaps but are never solved.
    pub is_trigger: bool,
}

impl PhysicsComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an axis-aligned box collider with the given half extents.
    pub fn add_box(&mut self, half_extents: Vec3) {
        self.colliders
            .push(Collider::Convex(ConvexCollider::cuboid(half_extents)));
    }

    /// Attach a convex hull built from a point cloud.
    pub fn attach_convex_hull(&mut self, points: &[Vec3]) -> Result<(), ColliderError> {
        self.colliders
            .push(Collider::Convex(ConvexCollider::convex_hull(points)?));
        Ok(())
    }

    /// Refresh every collider's cached world AABB from the given world
    /// transform and return the combined bounds, or `None` when the
    /// collider list is empty.
    pub fn refresh_aabbs(&mut self, world_transform: &Mat4) -> Option<Aabb> {
        let mut combined: Option<Aabb> = None;
        for collider in &mut self.colliders {
            let Collider::Convex(convex) = collider;
            let aabb = convex.refresh_world_aabb(world_transform);
            combined = Some(match combined {
                Some(acc) => acc.union(&aabb),
                None => aabb,
            });
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_to_matrix() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let m = t.to_matrix();
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_rigid_body_mass() {
        let rb = RigidBody::new(2.0);
        assert!((rb.inv_mass - 0.5).abs() < 1e-6);

        let mut rb = RigidBody::new(1.0);
        rb.set_mass(0.0);
        assert_eq!(rb.inv_mass, 0.0);
    }

    #[test]
    fn test_setters_clamp() {
        let mut rb = RigidBody::new(1.0);
        rb.set_restitution(1.5);
        assert_eq!(rb.restitution, 1.0);
        rb.set_restitution(-0.5);
        assert_eq!(rb.restitution, 0.0);
        rb.set_friction(-1.0);
        assert_eq!(rb.friction, 0.0);
    }

    #[test]
    fn test_force_at_point_builds_torque() {
        let mut rb = RigidBody::new(1.0);
        rb.center_of_mass = Vec3::ZERO;
        rb.add_force_at_point(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(rb.force_accumulator, Vec3::new(0.0, 1.0, 0.0));
        // r x F = (1,0,0) x (0,1,0) = (0,0,1)
        assert!((rb.torque_accumulator - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_world_inertia_tracks_rotation() {
        let mut rb = RigidBody::with_box_inertia(1.0, Vec3::new(0.5, 1.0, 0.5));
        let local = rb.inv_inertia_local;
        // A quarter turn about Y swaps the X and Z principal axes.
        rb.update_world_inertia(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let world = rb.inv_inertia_world;
        assert!((world.x_axis.x - local.z_axis.z).abs() < 1e-4);
        assert!((world.z_axis.z - local.x_axis.x).abs() < 1e-4);
    }

    #[test]
    fn test_empty_component_has_no_bounds() {
        let mut pc = PhysicsComponent::new();
        assert!(pc.refresh_aabbs(&Mat4::IDENTITY).is_none());
        pc.add_box(Vec3::splat(0.5));
        let aabb = pc.refresh_aabbs(&Mat4::IDENTITY).unwrap();
        assert!((aabb.min - Vec3::splat(-0.5)).length() < 1e-5);
        assert!((aabb.max - Vec3::splat(0.5)).length() < 1e-5);
    }
}
