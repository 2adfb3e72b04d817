//! Line-based debug visualization for colliders and contacts.
//!
//! The crate does not render anything itself; callers implement [`DebugDraw`]
//! against whatever line renderer they have and pass it to
//! [`PhysicsWorld::debug_draw`](crate::world::PhysicsWorld::debug_draw).

use glam::{Mat4, Vec3};

use crate::collider::{Collider, ConvexCollider};
use crate::contact::Manifold;

/// Sink for debug line segments, in world space.
pub trait DebugDraw {
    fn line(&mut self, from: Vec3, to: Vec3, color: Vec3);
}

pub const COLLIDER_COLOR: Vec3 = Vec3::new(0.2, 0.9, 0.2);
pub const CONTACT_NORMAL_COLOR: Vec3 = Vec3::new(0.9, 0.2, 0.2);
pub const CONTACT_POINT_COLOR: Vec3 = Vec3::new(0.9, 0.9, 0.2);

/// Draws every physical edge of a collider's hull once.
pub fn draw_collider(draw: &mut dyn DebugDraw, collider: &Collider, world_transform: &Mat4) {
    match collider {
        Collider::Convex(convex) => draw_convex(draw, convex, world_transform),
    }
}

fn draw_convex(draw: &mut dyn DebugDraw, collider: &ConvexCollider, world_transform: &Mat4) {
    let mesh = &collider.mesh;
    for (index, edge) in mesh.edges.iter().enumerate() {
        // Each physical edge is two half-edges; draw it from the lower index.
        if (index as u32) > edge.pairing {
            continue;
        }
        let from = world_transform.transform_point3(edge.position);
        let to = world_transform.transform_point3(mesh.edges[edge.next as usize].position);
        draw.line(from, to, COLLIDER_COLOR);
    }
}

/// Draws contact points as small crosses and their normals as rays.
pub fn draw_manifold(draw: &mut dyn DebugDraw, manifold: &Manifold, normal_length: f32) {
    for contact in &manifold.contacts {
        let p = contact.ref_contact;
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            let arm = axis * 0.05;
            draw.line(p - arm, p + arm, CONTACT_POINT_COLOR);
        }
        draw.line(p, p + contact.normal * normal_length, CONTACT_NORMAL_COLOR);
    }
}
