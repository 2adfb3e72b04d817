//! Top-level simulation driver.
//!
//! [`PhysicsWorld`] owns the tuning surface, the broad-phase strategy, the
//! warm-start cache and the event buffer, and advances a `hecs::World` in
//! fixed increments: integrate velocities, detect, resolve, integrate
//! positions. Callers feed it wall-clock deltas through [`PhysicsWorld::step`]
//! and drain events afterwards.

use std::collections::{HashMap, HashSet};

use glam::Vec3;
use tracing::{debug, warn};

use crate::broadphase::{BroadPhase, ManifoldPrecursor, UniformGrid};
use crate::collider::Collider;
use crate::components::{PhysicsComponent, RigidBody, Transform};
use crate::contact::{populate_contact_points, ContactStamp, Manifold};
use crate::debug_draw::{self, DebugDraw};
use crate::events::{ContactPoint, OverlapInfo, PhysicsEvent};
use crate::mesh::EdgeLabel;
use crate::narrowphase;
use crate::rigid_body;
use crate::solver::{self, BodySet};

/// Tuning knobs for the whole pipeline. The defaults are what the rest of
/// the crate's tests run with.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    /// Simulation increment in seconds; `step` consumes wall time in these.
    pub fixed_timestep: f64,
    /// Cap on substeps per `step` call before accumulated time is dropped.
    pub max_substeps: u32,
    pub contact_iterations: u32,
    pub friction_iterations: u32,
    /// Fraction of leftover penetration converted to velocity per tick.
    pub baumgarte_coefficient: f32,
    /// Penetration depth tolerated without positional correction.
    pub baumgarte_slop: f32,
    /// Approach speed below which restitution is ignored.
    pub restitution_slop: f32,
    /// Clipped points further than this from the reference face are culled.
    pub contact_offset: f32,
    /// Band around the clip planes inside which points are kept.
    pub clip_threshold: f32,
    /// Preference margin for A's face over B's equally deep face.
    pub face_to_face_bias: f32,
    /// Preference margin for face contacts over edge contacts.
    pub face_to_edge_bias: f32,
    pub broadphase_cell_size: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 4,
            contact_iterations: 8,
            friction_iterations: 4,
            baumgarte_coefficient: 0.2,
            baumgarte_slop: 0.01,
            restitution_slop: 0.5,
            contact_offset: 0.01,
            clip_threshold: 0.005,
            face_to_face_bias: 0.005,
            face_to_edge_bias: 0.05,
            broadphase_cell_size: 4.0,
        }
    }
}

/// Canonical manifold identity: entity bits in ascending order plus the
/// collider indices on each side. Stable across ticks regardless of the
/// order the broad phase emitted the pair in.
type ManifoldKey = (u64, u64, usize, usize);

#[derive(Debug, Clone, Copy)]
struct CachedImpulse {
    label: EdgeLabel,
    total_lambda: f32,
    tangent1_lambda: f32,
    tangent2_lambda: f32,
}

pub struct PhysicsWorld {
    pub config: PhysicsConfig,
    accumulator: f64,
    broadphase: Box<dyn BroadPhase>,
    /// Impulses from the previous tick, keyed by manifold and matched back
    /// onto this tick's contacts by feature label.
    contact_cache: HashMap<ManifoldKey, Vec<CachedImpulse>>,
    manifolds: Vec<Manifold>,
    events: Vec<PhysicsEvent>,
    paused: bool,
    step_once: bool,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        let cell_size = config.broadphase_cell_size;
        Self::with_broadphase(config, Box::new(UniformGrid::new(cell_size)))
    }

    pub fn with_broadphase(config: PhysicsConfig, broadphase: Box<dyn BroadPhase>) -> Self {
        Self {
            config,
            accumulator: 0.0,
            broadphase,
            contact_cache: HashMap::new(),
            manifolds: Vec::new(),
            events: Vec::new(),
            paused: false,
            step_once: false,
        }
    }

    /// Swap the broad-phase strategy. Invalidates nothing; the warm-start
    /// cache is keyed by manifold identity, not by strategy.
    pub fn set_broadphase(&mut self, broadphase: Box<dyn BroadPhase>) {
        self.broadphase = broadphase;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// While paused, lets exactly one fixed step through.
    pub fn single_step(&mut self) {
        self.step_once = true;
    }

    /// Manifolds produced by the most recent fixed step.
    pub fn manifolds(&self) -> &[Manifold] {
        &self.manifolds
    }

    /// Hand out and clear the events buffered since the last drain.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, PhysicsEvent> {
        self.events.drain(..)
    }

    /// Consume wall-clock time, running as many fixed steps as it covers.
    /// When more than `max_substeps` steps worth of time has accumulated the
    /// excess is dropped so a slow frame cannot spiral.
    pub fn step(&mut self, world: &mut hecs::World, delta_seconds: f32) {
        self.accumulator += delta_seconds as f64;
        let dt = self.config.fixed_timestep;
        let mut substeps = 0u32;
        while self.accumulator >= dt {
            if substeps >= self.config.max_substeps {
                warn!(
                    dropped_seconds = self.accumulator,
                    "simulation falling behind, dropping accumulated time"
                );
                self.accumulator = 0.0;
                break;
            }
            self.fixed_step(world, dt as f32);
            self.accumulator -= dt;
            substeps += 1;
        }
    }

    /// One full pipeline tick at exactly `dt`. `step` calls this; tests and
    /// lockstep callers may drive it directly.
    pub fn fixed_step(&mut self, world: &mut hecs::World, dt: f32) {
        if self.paused && !self.step_once {
            return;
        }
        self.step_once = false;

        rigid_body::integrate_velocities(world, self.config.gravity, dt);

        let precursors = build_precursors(world);
        let groups = self.broadphase.collect_pairs(&precursors);
        self.run_narrowphase(world, &precursors, &groups, dt);
        debug!(
            precursors = precursors.len(),
            groups = groups.len(),
            manifolds = self.manifolds.len(),
            "narrow phase done"
        );

        self.solve(world, dt);
        self.refresh_cache();

        rigid_body::integrate_positions(world, dt);
        rigid_body::sync_transforms(world);
    }

    /// Render collider wireframes and current contacts into `draw`.
    pub fn debug_draw(&self, world: &hecs::World, draw: &mut dyn DebugDraw) {
        for (_, (transform, physics)) in world.query::<(&Transform, &PhysicsComponent)>().iter() {
            let world_transform = transform.to_matrix();
            for collider in &physics.colliders {
                debug_draw::draw_collider(draw, collider, &world_transform);
            }
        }
        for manifold in &self.manifolds {
            debug_draw::draw_manifold(draw, manifold, 0.3);
        }
    }

    fn run_narrowphase(
        &mut self,
        world: &hecs::World,
        precursors: &[ManifoldPrecursor],
        groups: &[Vec<usize>],
        dt: f32,
    ) {
        self.manifolds.clear();
        // Grid cells overlap, so the same pair can show up in several groups.
        let mut visited: HashSet<(u64, u64)> = HashSet::new();

        for group in groups {
            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    let (mut pa, mut pb) = (&precursors[group[i]], &precursors[group[j]]);
                    if pa.entity.to_bits().get() > pb.entity.to_bits().get() {
                        std::mem::swap(&mut pa, &mut pb);
                    }
                    let pair = (pa.entity.to_bits().get(), pb.entity.to_bits().get());
                    if !visited.insert(pair) {
                        continue;
                    }
                    if !pa.aabb.overlaps(&pb.aabb) {
                        continue;
                    }
                    self.collide_pair(world, pa, pb, dt);
                }
            }
        }
    }

    fn collide_pair(
        &mut self,
        world: &hecs::World,
        pa: &ManifoldPrecursor,
        pb: &ManifoldPrecursor,
        dt: f32,
    ) {
        let (Ok(comp_a), Ok(comp_b)) = (
            world.get::<&PhysicsComponent>(pa.entity),
            world.get::<&PhysicsComponent>(pb.entity),
        ) else {
            return;
        };

        let rb_a = world.get::<&RigidBody>(pa.entity).is_ok();
        let rb_b = world.get::<&RigidBody>(pb.entity).is_ok();
        let trigger_pair = comp_a.is_trigger != comp_b.is_trigger;
        if comp_a.is_trigger && comp_b.is_trigger {
            return;
        }
        if !trigger_pair && !rb_a && !rb_b {
            // Two static solids never need a response.
            return;
        }

        for (ci, collider_a) in comp_a.colliders.iter().enumerate() {
            for (cj, collider_b) in comp_b.colliders.iter().enumerate() {
                let Some(query) = narrowphase::collide(
                    collider_a,
                    &pa.world_transform,
                    collider_b,
                    &pb.world_transform,
                    self.config.face_to_face_bias,
                    self.config.face_to_edge_bias,
                ) else {
                    continue;
                };

                let mut manifold = Manifold::new(
                    pa.entity,
                    pb.entity,
                    ci,
                    cj,
                    pa.world_transform,
                    pb.world_transform,
                );
                manifold.penetration = Some(query);
                manifold.is_colliding = true;

                let stamp = if manifold.a_is_reference() {
                    ContactStamp {
                        ref_rigidbody: rb_a.then_some(pa.entity),
                        inc_rigidbody: rb_b.then_some(pb.entity),
                        ref_centroid: pa.world_transform.w_axis.truncate(),
                        inc_centroid: pb.world_transform.w_axis.truncate(),
                    }
                } else {
                    ContactStamp {
                        ref_rigidbody: rb_b.then_some(pb.entity),
                        inc_rigidbody: rb_a.then_some(pa.entity),
                        ref_centroid: pb.world_transform.w_axis.truncate(),
                        inc_centroid: pa.world_transform.w_axis.truncate(),
                    }
                };

                let Collider::Convex(convex_a) = collider_a;
                let Collider::Convex(convex_b) = collider_b;
                populate_contact_points(
                    &mut manifold,
                    convex_a,
                    convex_b,
                    &stamp,
                    self.config.contact_offset,
                    self.config.clip_threshold,
                );

                let info = OverlapInfo {
                    entity_a: pa.entity,
                    entity_b: pb.entity,
                    normal: query.normal(),
                    penetration: query.separation(),
                    contacts: manifold
                        .contacts
                        .iter()
                        .map(|c| ContactPoint {
                            on_reference: c.ref_contact,
                            on_incident: c.inc_contact,
                        })
                        .collect(),
                    dt,
                };

                if trigger_pair {
                    // One notification per entity pair per tick, even when
                    // several collider combinations overlap. The manifold is
                    // dropped: trigger overlaps are never solved.
                    self.events.push(PhysicsEvent::Trigger(info));
                    return;
                }

                self.events.push(PhysicsEvent::Collision(info));
                self.manifolds.push(manifold);
            }
        }
    }

    fn solve(&mut self, world: &mut hecs::World, dt: f32) {
        if self.manifolds.is_empty() {
            return;
        }

        let mut bodies = BodySet::gather(world, &self.manifolds);

        for manifold in &mut self.manifolds {
            solver::precalculate_effective_masses(&bodies, manifold, self.config.restitution_slop);
            if let Some(cached) = self.contact_cache.get(&manifold_key(manifold)) {
                for contact in &mut manifold.contacts {
                    if let Some(hit) = cached.iter().find(|c| c.label == contact.label) {
                        contact.total_lambda = hit.total_lambda;
                        contact.tangent1_lambda = hit.tangent1_lambda;
                        contact.tangent2_lambda = hit.tangent2_lambda;
                    }
                }
            }
            solver::apply_warm_start(&mut bodies, manifold);
        }

        for _ in 0..self.config.contact_iterations {
            for manifold in &mut self.manifolds {
                solver::solve_contact_constraints(
                    &mut bodies,
                    manifold,
                    dt,
                    self.config.baumgarte_coefficient,
                    self.config.baumgarte_slop,
                );
            }
        }
        for _ in 0..self.config.friction_iterations {
            for manifold in &mut self.manifolds {
                solver::solve_friction_constraints(&mut bodies, manifold);
            }
        }

        bodies.write_back(world);
    }

    fn refresh_cache(&mut self) {
        self.contact_cache.clear();
        for manifold in &self.manifolds {
            let cached: Vec<CachedImpulse> = manifold
                .contacts
                .iter()
                .filter(|c| c.label.is_set())
                .map(|c| CachedImpulse {
                    label: c.label,
                    total_lambda: c.total_lambda,
                    tangent1_lambda: c.tangent1_lambda,
                    tangent2_lambda: c.tangent2_lambda,
                })
                .collect();
            if !cached.is_empty() {
                self.contact_cache.insert(manifold_key(manifold), cached);
            }
        }
    }
}

fn manifold_key(manifold: &Manifold) -> ManifoldKey {
    (
        manifold.entity_a.to_bits().get(),
        manifold.entity_b.to_bits().get(),
        manifold.collider_a,
        manifold.collider_b,
    )
}

fn build_precursors(world: &mut hecs::World) -> Vec<ManifoldPrecursor> {
    let mut precursors = Vec::new();
    for (entity, (transform, physics)) in
        world.query_mut::<(&Transform, &mut PhysicsComponent)>()
    {
        let world_transform = transform.to_matrix();
        let Some(aabb) = physics.refresh_aabbs(&world_transform) else {
            continue;
        };
        let index = precursors.len();
        precursors.push(ManifoldPrecursor {
            entity,
            world_transform,
            aabb,
            index,
        });
    }
    precursors
}
