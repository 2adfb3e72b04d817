//! Keel
//!
//! Rigid-body collision detection and contact resolution on half-edge
//! convex hulls, driven through a `hecs` world.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **mesh** - Half-edge polyhedra, convex hull construction, feature labels
//! 2. **collider** - Convex collider wrapper, world-space AABBs
//! 3. **components** - `Transform`, `RigidBody`, `PhysicsComponent`
//! 4. **broadphase** - Pluggable candidate-pair strategies (uniform grid, brute force)
//! 5. **narrowphase** - Separating-axis tests over hull features
//! 6. **contact** - Manifolds and clipped contact points
//! 7. **solver** - Sequential-impulse contact and friction resolution
//! 8. **rigid_body** - Semi-implicit Euler integration
//! 9. **world** - `PhysicsWorld`: the fixed-step pipeline, events, debug draw

pub mod broadphase;
pub mod collider;
pub mod components;
pub mod contact;
pub mod debug_draw;
pub mod events;
pub mod mesh;
pub mod narrowphase;
pub mod rigid_body;
pub mod solver;
pub mod world;

// Re-export commonly used types
pub use broadphase::{BroadPhase, BruteForce, ManifoldPrecursor, UniformGrid};
pub use collider::{Aabb, Collider, ColliderError, ConvexCollider};
pub use components::{GlobalTransform, PhysicsComponent, RigidBody, Transform};
pub use contact::{Contact, Manifold};
pub use debug_draw::DebugDraw;
pub use events::{ContactPoint, OverlapInfo, PhysicsEvent};
pub use mesh::{EdgeLabel, HalfEdgeMesh, MeshError};
pub use narrowphase::PenetrationQuery;
pub use world::{PhysicsConfig, PhysicsWorld};

// Re-export the math and ECS crates for convenience
pub use glam;
pub use hecs;
