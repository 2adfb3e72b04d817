//! Narrow-phase collision detection: SAT over half-edge hulls.
//!
//! Face separation is tested by extreme-point projection from both
//! colliders' frames; edge-edge separation through the Gauss map (only
//! edge pairs whose arcs cross can form a Minkowski face). The feature
//! with the shallowest penetration generates the manifold, with small
//! biases so face contacts win near-ties and features don't flutter
//! between frames.

use glam::{Mat3, Mat4, Vec3};

use crate::collider::{Collider, ConvexCollider};
use crate::mesh::{EdgeIndex, FaceIndex};

/// Result of the SAT feature search: which feature pair is shallowest.
/// `separation` is negative when the hulls interpenetrate.
#[derive(Debug, Clone, Copy)]
pub enum PenetrationQuery {
    Face(FaceQuery),
    Edge(EdgeQuery),
}

impl PenetrationQuery {
    pub fn separation(&self) -> f32 {
        match self {
            PenetrationQuery::Face(q) => q.separation,
            PenetrationQuery::Edge(q) => q.separation,
        }
    }

    /// World-space collision normal, pointing from the reference collider
    /// toward the incident one.
    pub fn normal(&self) -> Vec3 {
        match self {
            PenetrationQuery::Face(q) => q.normal,
            PenetrationQuery::Edge(q) => q.normal,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FaceQuery {
    /// Reference face, on collider A when `a_is_reference`.
    pub face: FaceIndex,
    /// World-space normal of the reference face.
    pub normal: Vec3,
    /// World-space centroid of the reference face.
    pub world_centroid: Vec3,
    pub separation: f32,
    pub a_is_reference: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeQuery {
    pub edge_a: EdgeIndex,
    pub edge_b: EdgeIndex,
    /// World-space axis from the edge cross product, oriented from A to B.
    pub normal: Vec3,
    pub separation: f32,
}

/// Dispatch over the closed collider variant. Returns `None` when the
/// colliders don't touch (including the cached-AABB early-out).
pub fn collide(
    a: &Collider,
    ta: &Mat4,
    b: &Collider,
    tb: &Mat4,
    face_to_face_bias: f32,
    face_to_edge_bias: f32,
) -> Option<PenetrationQuery> {
    match (a, b) {
        (Collider::Convex(ca), Collider::Convex(cb)) => {
            convex_convex(ca, ta, cb, tb, face_to_face_bias, face_to_edge_bias)
        }
    }
}

fn convex_convex(
    a: &ConvexCollider,
    ta: &Mat4,
    b: &ConvexCollider,
    tb: &Mat4,
    face_to_face_bias: f32,
    face_to_edge_bias: f32,
) -> Option<PenetrationQuery> {
    if !a.world_aabb().overlaps(&b.world_aabb()) {
        return None;
    }

    let ab = face_separation(a, ta, b, tb, true)?;
    let ba = face_separation(b, tb, a, ta, false)?;
    let edge = edge_separation(a, ta, b, tb);
    if let Some(e) = &edge {
        if e.separation > 0.0 {
            return None;
        }
    }

    // Separations are negative here; the shallower (less negative) feature
    // wins, with a preference for A's face on near-ties and for faces over
    // edges unless the edge is clearly shallower.
    let face = if ab.separation + face_to_face_bias > ba.separation {
        ab
    } else {
        ba
    };

    if let Some(e) = edge {
        if e.separation > face.separation + face_to_edge_bias {
            return Some(PenetrationQuery::Edge(e));
        }
    }
    Some(PenetrationQuery::Face(face))
}

/// Face SAT from the reference collider's frame: project the incident
/// collider's extreme point against every reference face and keep the
/// maximum separation. Returns `None` as soon as a positive separation
/// proves the hulls disjoint.
fn face_separation(
    reference: &ConvexCollider,
    ref_transform: &Mat4,
    incident: &ConvexCollider,
    inc_transform: &Mat4,
    a_is_reference: bool,
) -> Option<FaceQuery> {
    let ref_linear = Mat3::from_mat4(*ref_transform);
    let ref_normal_mat = ref_linear.inverse().transpose();
    let inc_linear = Mat3::from_mat4(*inc_transform).transpose();

    let mut best: Option<FaceQuery> = None;
    for (idx, face) in reference.mesh.faces.iter().enumerate() {
        let normal = (ref_normal_mat * face.normal).normalize();
        let world_centroid = ref_transform.transform_point3(face.centroid);

        // Incident support along -normal, pulled into its local frame.
        let local_dir = inc_linear * -normal;
        let support = inc_transform.transform_point3(incident.support_point(local_dir));
        let separation = (support - world_centroid).dot(normal);

        if separation > 0.0 {
            return None; // separating axis found
        }
        if best.map_or(true, |q| separation > q.separation) {
            best = Some(FaceQuery {
                face: idx as FaceIndex,
                normal,
                world_centroid,
                separation,
                a_is_reference,
            });
        }
    }
    best
}

/// Edge SAT via the Gauss map: for every edge pair whose arcs cross, the
/// normalized cross product of the world edge directions is a candidate
/// axis; the maximum separation over all candidates is kept. `None` when
/// no edge pair forms a Minkowski face.
fn edge_separation(
    a: &ConvexCollider,
    ta: &Mat4,
    b: &ConvexCollider,
    tb: &Mat4,
) -> Option<EdgeQuery> {
    let a_linear = Mat3::from_mat4(*ta);
    let a_normal_mat = a_linear.inverse().transpose();
    let b_linear = Mat3::from_mat4(*tb);
    let b_normal_mat = b_linear.inverse().transpose();
    let a_centroid = ta.transform_point3(a.local_centroid());

    let mut best: Option<EdgeQuery> = None;

    for (ia, ea) in a.mesh.edges.iter().enumerate() {
        // Each physical edge appears as two half-edges; visit it once.
        if (ia as EdgeIndex) > ea.pairing {
            continue;
        }
        let a_dir = a_linear * a.mesh.edge_direction(ia as EdgeIndex);
        let a_face_n = a_normal_mat * a.mesh.faces[ea.face as usize].normal;
        let a_twin_n = a_normal_mat * a.mesh.faces[a.mesh.edges[ea.pairing as usize].face as usize].normal;
        let a_pos = ta.transform_point3(ea.position);

        for (ib, eb) in b.mesh.edges.iter().enumerate() {
            if (ib as EdgeIndex) > eb.pairing {
                continue;
            }
            let b_dir = b_linear * b.mesh.edge_direction(ib as EdgeIndex);
            let b_face_n = b_normal_mat * b.mesh.faces[eb.face as usize].normal;
            let b_twin_n = b_normal_mat * b.mesh.faces[b.mesh.edges[eb.pairing as usize].face as usize].normal;

            if !is_minkowski_face(a_face_n, a_twin_n, -b_face_n, -b_twin_n, a_dir, b_dir) {
                continue;
            }

            let axis = a_dir.cross(b_dir);
            if axis.length_squared() < 1e-8 {
                continue; // near-parallel edges
            }
            let mut axis = axis.normalize();
            // Orient away from A's centroid.
            if axis.dot(a_pos - a_centroid) < 0.0 {
                axis = -axis;
            }

            let b_pos = tb.transform_point3(eb.position);
            let separation = (b_pos - a_pos).dot(axis);

            if best.map_or(true, |q| separation > q.separation) {
                best = Some(EdgeQuery {
                    edge_a: ia as EdgeIndex,
                    edge_b: ib as EdgeIndex,
                    normal: axis,
                    separation,
                });
            }
        }
    }
    best
}

/// Two edges form a face of the Minkowski difference iff their Gauss-map
/// arcs intersect. `a`/`b` are the face normals adjacent to the first
/// edge, `c`/`d` the negated normals adjacent to the second; `bxa`/`dxc`
/// are the edge directions.
fn is_minkowski_face(a: Vec3, b: Vec3, c: Vec3, d: Vec3, bxa: Vec3, dxc: Vec3) -> bool {
    let cba = c.dot(bxa);
    let dba = d.dot(bxa);
    let adc = a.dot(dxc);
    let bdc = b.dot(dxc);
    cba * dba < 0.0 && adc * bdc < 0.0 && cba * bdc > 0.0
}

// --- shared geometric helpers -------------------------------------------

/// Signed distance from a point to the plane through `plane_point` with
/// unit `normal`.
#[inline]
pub fn point_distance_to_plane(point: Vec3, normal: Vec3, plane_point: Vec3) -> f32 {
    (point - plane_point).dot(normal)
}

/// Intersection of the segment `start..end` with a plane. Caller ensures
/// the segment actually crosses (the clipper only calls it on sign
/// change).
pub fn line_plane_intersection(start: Vec3, end: Vec3, normal: Vec3, plane_point: Vec3) -> Vec3 {
    let direction = end - start;
    let denom = normal.dot(direction);
    if denom.abs() < f32::EPSILON {
        return start;
    }
    let t = normal.dot(plane_point - start) / denom;
    start + direction * t
}

/// Closest points between two segments, solving the 2x2 normal equations
/// (Cramer) with interpolants clamped to the segment ranges.
pub fn closest_points_between_segments(
    a_start: Vec3,
    a_end: Vec3,
    b_start: Vec3,
    b_end: Vec3,
) -> (Vec3, Vec3) {
    let d1 = a_end - a_start;
    let d2 = b_end - b_start;
    let r = a_start - b_start;
    let aa = d1.dot(d1);
    let ee = d2.dot(d2);
    let ff = d2.dot(r);
    let cc = d1.dot(r);
    let bb = d1.dot(d2);

    let denom = aa * ee - bb * bb;
    let mut s = if denom.abs() > f32::EPSILON {
        ((bb * ff - cc * ee) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let t = if ee > f32::EPSILON {
        ((bb * s + ff) / ee).clamp(0.0, 1.0)
    } else {
        0.0
    };
    // Re-derive s against the clamped t.
    if aa > f32::EPSILON {
        s = ((bb * t - cc) / aa).clamp(0.0, 1.0);
    }
    (a_start + d1 * s, b_start + d2 * t)
}
