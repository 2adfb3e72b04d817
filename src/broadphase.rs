//! Broad-phase grouping of manifold precursors.
//!
//! The contract: any two precursors that might collide must land in at
//! least one common group (no false negatives). False positives are fine,
//! the narrow phase resolves them. Strategies are swappable behind
//! [`BroadPhase`] without touching the narrow/solve phases.

use std::collections::HashMap;

use glam::{IVec3, Mat4, Vec3};

use crate::collider::Aabb;

/// Transient per-entity snapshot for one tick: the composed world
/// transform, the combined world AABB of the entity's colliders, a stable
/// index into the tick's precursor list, and the owning entity.
#[derive(Debug, Clone, Copy)]
pub struct ManifoldPrecursor {
    pub entity: hecs::Entity,
    pub world_transform: Mat4,
    pub aabb: Aabb,
    pub index: usize,
}

/// Pluggable broad-phase strategy.
pub trait BroadPhase: Send {
    /// Partition the tick's precursors into candidate groups of indices.
    fn collect_pairs(&mut self, precursors: &[ManifoldPrecursor]) -> Vec<Vec<usize>>;
}

/// Single-group fallback: everything is a candidate of everything.
/// Correctness baseline for testing grid strategies against.
#[derive(Debug, Default)]
pub struct BruteForce;

impl BruteForce {
    pub fn new() -> Self {
        Self
    }
}

impl BroadPhase for BruteForce {
    fn collect_pairs(&mut self, precursors: &[ManifoldPrecursor]) -> Vec<Vec<usize>> {
        if precursors.len() < 2 {
            return Vec::new();
        }
        vec![(0..precursors.len()).collect()]
    }
}

/// Uniform spatial grid rebuilt every tick. Each precursor is inserted into
/// every cell its AABB touches; each non-empty cell becomes one group.
/// Pairs that share several cells are deduplicated by the pipeline's
/// canonical-pair set.
#[derive(Debug)]
pub struct UniformGrid {
    pub cell_size: f32,
}

impl UniformGrid {
    pub fn new(cell_size: f32) -> Self {
        debug_assert!(cell_size > 0.0);
        Self { cell_size }
    }

    #[inline]
    fn cell_coord(&self, point: Vec3) -> IVec3 {
        // floor keeps negative coordinates in the right cell.
        (point / self.cell_size).floor().as_ivec3()
    }
}

impl BroadPhase for UniformGrid {
    fn collect_pairs(&mut self, precursors: &[ManifoldPrecursor]) -> Vec<Vec<usize>> {
        let mut cells: HashMap<IVec3, Vec<usize>> = HashMap::new();

        for precursor in precursors {
            let min = self.cell_coord(precursor.aabb.min);
            let max = self.cell_coord(precursor.aabb.max);
            for x in min.x..=max.x {
                for y in min.y..=max.y {
                    for z in min.z..=max.z {
                        cells
                            .entry(IVec3::new(x, y, z))
                            .or_default()
                            .push(precursor.index);
                    }
                }
            }
        }

        cells.into_values().filter(|group| group.len() > 1).collect()
    }
}
