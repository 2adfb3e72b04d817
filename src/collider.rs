//! Convex colliders and world-space bounds.

use glam::{Mat4, Vec3};
use thiserror::Error;

use crate::mesh::{HalfEdgeMesh, MeshError, INVALID_INDEX};

/// Axis-aligned bounding box used by the broad phase and the narrow-phase
/// early-out.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Aabb {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for p in points {
            min = min.min(p);
            max = max.max(p);
        }
        Aabb { min, max }
    }
}

#[derive(Debug, Error)]
pub enum ColliderError {
    #[error("convex hull construction failed: {0}")]
    Hull(#[from] MeshError),
}

/// A convex hull as a half-edge graph, plus caches derived from it: the
/// deduplicated vertex list (support queries, AABB refresh), the local
/// centroid, and the world AABB of the current tick.
#[derive(Debug, Clone)]
pub struct ConvexCollider {
    pub mesh: HalfEdgeMesh,
    vertices: Vec<Vec3>,
    local_centroid: Vec3,
    world_aabb: Aabb,
}

impl ConvexCollider {
    fn from_mesh(mesh: HalfEdgeMesh) -> Self {
        let mut vertices: Vec<Vec3> = Vec::new();
        for e in &mesh.edges {
            if e.face == INVALID_INDEX {
                continue;
            }
            if !vertices
                .iter()
                .any(|v| (*v - e.position).length_squared() < 1e-12)
            {
                vertices.push(e.position);
            }
        }
        let local_centroid =
            vertices.iter().copied().sum::<Vec3>() / vertices.len().max(1) as f32;
        let world_aabb = Aabb::from_points(vertices.iter().copied());
        Self {
            mesh,
            vertices,
            local_centroid,
            world_aabb,
        }
    }

    /// Box collider with the given half extents, centered at the origin.
    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::from_mesh(HalfEdgeMesh::cuboid(half_extents))
    }

    /// Convex hull of a point cloud.
    pub fn convex_hull(points: &[Vec3]) -> Result<Self, ColliderError> {
        Ok(Self::from_mesh(HalfEdgeMesh::convex_hull(points)?))
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn local_centroid(&self) -> Vec3 {
        self.local_centroid
    }

    /// Extreme vertex along a local-space direction.
    #[inline]
    pub fn support_point(&self, local_direction: Vec3) -> Vec3 {
        let mut best = self.vertices[0];
        let mut best_dot = best.dot(local_direction);
        for v in &self.vertices[1..] {
            let d = v.dot(local_direction);
            if d > best_dot {
                best_dot = d;
                best = *v;
            }
        }
        best
    }

    /// Recompute the cached world AABB from the current world transform.
    /// Must run once per tick before any narrow-phase test against this
    /// collider.
    pub fn refresh_world_aabb(&mut self, world_transform: &Mat4) -> Aabb {
        self.world_aabb = Aabb::from_points(
            self.vertices
                .iter()
                .map(|v| world_transform.transform_point3(*v)),
        );
        self.world_aabb
    }

    pub fn world_aabb(&self) -> Aabb {
        self.world_aabb
    }
}

/// Closed set of collider kinds. Narrow-phase dispatch is a single match in
/// [`collide`](crate::narrowphase::collide); new kinds extend the enum.
#[derive(Debug, Clone)]
pub enum Collider {
    Convex(ConvexCollider),
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        };
        let b = Aabb {
            min: Vec3::splat(0.5),
            max: Vec3::splat(1.5),
        };
        let c = Aabb {
            min: Vec3::splat(2.0),
            max: Vec3::splat(3.0),
        };
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        // Touching counts as overlapping.
        let d = Aabb {
            min: Vec3::new(1.0, 0.0, 0.0),
            max: Vec3::new(2.0, 1.0, 1.0),
        };
        assert!(a.overlaps(&d));
    }

    #[test]
    fn test_aabb_union() {
        let a = Aabb {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        };
        let b = Aabb {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(0.5),
        };
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::splat(-1.0));
        assert_eq!(u.max, Vec3::ONE);
    }

    #[test]
    fn test_cuboid_support() {
        let c = ConvexCollider::cuboid(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(c.vertices().len(), 8);
        let s = c.support_point(Vec3::new(0.1, -1.0, 0.4));
        assert!((s - Vec3::new(1.0, -2.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn test_world_aabb_rotated() {
        let mut c = ConvexCollider::cuboid(Vec3::splat(0.5));
        let m = Mat4::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
            Vec3::new(10.0, 0.0, 0.0),
        );
        let aabb = c.refresh_world_aabb(&m);
        let half_diag = (0.5f32 * 0.5 + 0.5 * 0.5).sqrt();
        assert!((aabb.max.x - (10.0 + half_diag)).abs() < 1e-4);
        assert!((aabb.min.x - (10.0 - half_diag)).abs() < 1e-4);
        assert!((aabb.max.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_local_centroid() {
        let c = ConvexCollider::cuboid(Vec3::splat(0.5));
        assert!(c.local_centroid().length() < 1e-6);
    }
}
