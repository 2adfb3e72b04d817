//! Collision and trigger notifications.
//!
//! Events are buffered on the [`PhysicsWorld`](crate::world::PhysicsWorld)
//! while a tick runs and handed out through `drain_events` once resolution
//! is done, so no listener can mutate rigidbody state mid-tick. Each event
//! carries a snapshot of the manifold that raised it: the normal,
//! penetration depth, contact point pairs, and the tick's timestep.

use glam::Vec3;
use hecs::Entity;

/// World-space contact point pair captured into an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub on_reference: Vec3,
    pub on_incident: Vec3,
}

/// Manifold snapshot shared by both notification kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapInfo {
    pub entity_a: Entity,
    pub entity_b: Entity,
    /// World normal, from the reference collider toward the incident one.
    pub normal: Vec3,
    /// Negative when the hulls interpenetrate.
    pub penetration: f32,
    pub contacts: Vec<ContactPoint>,
    pub dt: f32,
}

/// Fire-and-forget notification raised by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsEvent {
    /// A pair with at least one rigidbody and no trigger collided and was
    /// solved this tick.
    Collision(OverlapInfo),
    /// A pair involving a trigger overlapped this tick; never solved. At
    /// most one is raised per entity pair per tick.
    Trigger(OverlapInfo),
}

impl PhysicsEvent {
    pub fn info(&self) -> &OverlapInfo {
        match self {
            PhysicsEvent::Collision(info) | PhysicsEvent::Trigger(info) => info,
        }
    }

    pub fn participants(&self) -> (Entity, Entity) {
        let info = self.info();
        (info.entity_a, info.entity_b)
    }

    pub fn involves(&self, entity: Entity) -> bool {
        let (a, b) = self.participants();
        a == entity || b == entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participants() {
        let mut world = hecs::World::new();
        let a = world.spawn(());
        let b = world.spawn(());
        let event = PhysicsEvent::Trigger(OverlapInfo {
            entity_a: a,
            entity_b: b,
            normal: Vec3::Y,
            penetration: -0.01,
            contacts: Vec::new(),
            dt: 0.016,
        });
        assert_eq!(event.participants(), (a, b));
        assert!(event.involves(a));
        assert!(event.involves(b));

        let c = world.spawn(());
        assert!(!event.involves(c));
    }
}
