//! Contact manifolds and contact-point generation.
//!
//! Face-face manifolds clip the incident face against the reference face's
//! side planes (Sutherland-Hodgman); edge-edge manifolds take the closest
//! point pair between the two segments. Every contact carries the
//! [`EdgeLabel`] of the feature pair that generated it so the solver can
//! match it against last tick's contacts when warm-starting.

use glam::{Mat3, Mat4, Vec3};
use hecs::Entity;

use crate::collider::ConvexCollider;
use crate::mesh::{EdgeLabel, FaceIndex};
use crate::narrowphase::{
    closest_points_between_segments, line_plane_intersection, point_distance_to_plane,
    PenetrationQuery,
};

/// One resolved contact point. Created during population, mutated in place
/// by the solver, discarded at end of tick (lambdas survive through the
/// warm-start store).
#[derive(Debug, Clone)]
pub struct Contact {
    /// World contact on the reference feature.
    pub ref_contact: Vec3,
    /// World contact on the incident feature.
    pub inc_contact: Vec3,
    /// Collision normal, reference toward incident.
    pub normal: Vec3,
    pub tangent1: Vec3,
    pub tangent2: Vec3,
    /// World centers of mass, stamped at population.
    pub ref_centroid: Vec3,
    pub inc_centroid: Vec3,
    pub ref_rigidbody: Option<Entity>,
    pub inc_rigidbody: Option<Entity>,
    /// Accumulated impulse scalars.
    pub total_lambda: f32,
    pub tangent1_lambda: f32,
    pub tangent2_lambda: f32,
    /// Effective masses, filled by solver precalculation.
    pub effective_mass: f32,
    pub tangent1_mass: f32,
    pub tangent2_mass: f32,
    /// Velocity bias from restitution, fixed at precalculation.
    pub restitution_bias: f32,
    pub label: EdgeLabel,
}

impl Contact {
    fn new(ref_contact: Vec3, inc_contact: Vec3, normal: Vec3, label: EdgeLabel) -> Self {
        Self {
            ref_contact,
            inc_contact,
            normal,
            tangent1: Vec3::ZERO,
            tangent2: Vec3::ZERO,
            ref_centroid: Vec3::ZERO,
            inc_centroid: Vec3::ZERO,
            ref_rigidbody: None,
            inc_rigidbody: None,
            total_lambda: 0.0,
            tangent1_lambda: 0.0,
            tangent2_lambda: 0.0,
            effective_mass: 0.0,
            tangent1_mass: 0.0,
            tangent2_mass: 0.0,
            restitution_bias: 0.0,
            label,
        }
    }
}

/// Per-colliding-pair record for one tick.
#[derive(Debug)]
pub struct Manifold {
    pub entity_a: Entity,
    pub entity_b: Entity,
    /// Indices into each entity's collider list.
    pub collider_a: usize,
    pub collider_b: usize,
    pub transform_a: Mat4,
    pub transform_b: Mat4,
    pub penetration: Option<PenetrationQuery>,
    pub is_colliding: bool,
    pub contacts: Vec<Contact>,
}

impl Manifold {
    pub fn new(
        entity_a: Entity,
        entity_b: Entity,
        collider_a: usize,
        collider_b: usize,
        transform_a: Mat4,
        transform_b: Mat4,
    ) -> Self {
        Self {
            entity_a,
            entity_b,
            collider_a,
            collider_b,
            transform_a,
            transform_b,
            penetration: None,
            is_colliding: false,
            contacts: Vec::new(),
        }
    }

    /// Whether collider A is the reference side of the chosen feature.
    /// Edge queries always measure from A.
    pub fn a_is_reference(&self) -> bool {
        match self.penetration {
            Some(PenetrationQuery::Face(q)) => q.a_is_reference,
            Some(PenetrationQuery::Edge(_)) | None => true,
        }
    }
}

/// Rigidbody handles and world centers of mass for the two sides of a
/// manifold, already ordered reference-first.
#[derive(Debug, Clone, Copy)]
pub struct ContactStamp {
    pub ref_rigidbody: Option<Entity>,
    pub inc_rigidbody: Option<Entity>,
    pub ref_centroid: Vec3,
    pub inc_centroid: Vec3,
}

/// Vertex flowing through the clipper, carrying its feature label.
#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    position: Vec3,
    label: EdgeLabel,
}

/// Generate the manifold's contact points from its penetration query and
/// stamp each with the rigidbody handles and centroids.
pub fn populate_contact_points(
    manifold: &mut Manifold,
    collider_a: &ConvexCollider,
    collider_b: &ConvexCollider,
    stamp: &ContactStamp,
    contact_offset: f32,
    clip_threshold: f32,
) {
    let Some(query) = manifold.penetration else {
        return;
    };
    manifold.contacts.clear();

    match query {
        PenetrationQuery::Face(face) => {
            let (reference, ref_t, incident, inc_t) = if face.a_is_reference {
                (collider_a, manifold.transform_a, collider_b, manifold.transform_b)
            } else {
                (collider_b, manifold.transform_b, collider_a, manifold.transform_a)
            };
            populate_face_contacts(
                manifold,
                reference,
                &ref_t,
                incident,
                &inc_t,
                face.face,
                face.normal,
                face.world_centroid,
                contact_offset,
                clip_threshold,
            );
        }
        PenetrationQuery::Edge(edge) => {
            let ea = &collider_a.mesh.edges[edge.edge_a as usize];
            let eb = &collider_b.mesh.edges[edge.edge_b as usize];
            let a0 = manifold.transform_a.transform_point3(ea.position);
            let a1 = manifold
                .transform_a
                .transform_point3(collider_a.mesh.edges[ea.next as usize].position);
            let b0 = manifold.transform_b.transform_point3(eb.position);
            let b1 = manifold
                .transform_b
                .transform_point3(collider_b.mesh.edges[eb.next as usize].position);

            let (on_a, on_b) = closest_points_between_segments(a0, a1, b0, b1);
            let label = EdgeLabel::new(ea.label.first_edge, eb.label.first_edge);
            manifold
                .contacts
                .push(Contact::new(on_a, on_b, edge.normal, label));
        }
    }

    for contact in &mut manifold.contacts {
        contact.ref_rigidbody = stamp.ref_rigidbody;
        contact.inc_rigidbody = stamp.inc_rigidbody;
        contact.ref_centroid = stamp.ref_centroid;
        contact.inc_centroid = stamp.inc_centroid;
    }
}

#[allow(clippy::too_many_arguments)]
fn populate_face_contacts(
    manifold: &mut Manifold,
    reference: &ConvexCollider,
    ref_transform: &Mat4,
    incident: &ConvexCollider,
    inc_transform: &Mat4,
    ref_face: FaceIndex,
    ref_normal: Vec3,
    ref_centroid: Vec3,
    contact_offset: f32,
    clip_threshold: f32,
) {
    // Incident face: most anti-parallel world normal to the reference's.
    let inc_normal_mat = Mat3::from_mat4(*inc_transform).inverse().transpose();
    let mut incident_face = 0 as FaceIndex;
    let mut min_dot = f32::INFINITY;
    for (idx, f) in incident.mesh.faces.iter().enumerate() {
        let world_normal = (inc_normal_mat * f.normal).normalize();
        let d = world_normal.dot(ref_normal);
        if d < min_dot {
            min_dot = d;
            incident_face = idx as FaceIndex;
        }
    }

    let mut polygon: Vec<ClipVertex> = Vec::new();
    incident.mesh.for_each_edge(incident_face, |_, e| {
        polygon.push(ClipVertex {
            position: inc_transform.transform_point3(e.position),
            label: e.label,
        });
    });

    // Clip against every side plane of the reference face: the plane
    // through the ring edge with the pairing face's world normal.
    let ref_normal_mat = Mat3::from_mat4(*ref_transform).inverse().transpose();
    let mut side_planes: Vec<(Vec3, Vec3, EdgeLabel)> = Vec::new();
    reference.mesh.for_each_edge(ref_face, |_, e| {
        let neighbor = reference.mesh.edges[e.pairing as usize].face;
        let plane_normal =
            (ref_normal_mat * reference.mesh.faces[neighbor as usize].normal).normalize();
        let plane_point = ref_transform.transform_point3(e.position);
        side_planes.push((plane_normal, plane_point, e.label));
    });
    for (plane_normal, plane_point, clip_label) in side_planes {
        polygon = sutherland_hodgman_clip(
            &polygon,
            plane_normal,
            plane_point,
            clip_label,
            clip_threshold,
        );
        if polygon.is_empty() {
            break;
        }
    }

    for vertex in polygon {
        let distance = point_distance_to_plane(vertex.position, ref_normal, ref_centroid);
        if distance < contact_offset {
            let ref_contact = vertex.position - ref_normal * distance;
            manifold
                .contacts
                .push(Contact::new(ref_contact, vertex.position, ref_normal, vertex.label));
        }
    }
}

/// Clip a polygon against one plane, keeping vertices up to `threshold`
/// on the outside. Intersection vertices combine the clipped vertex's
/// first feature id with the clipping edge's second, which keeps their
/// labels stable across frames.
fn sutherland_hodgman_clip(
    input: &[ClipVertex],
    plane_normal: Vec3,
    plane_point: Vec3,
    clipping_label: EdgeLabel,
    threshold: f32,
) -> Vec<ClipVertex> {
    let mut output = Vec::with_capacity(input.len() + 1);
    for i in 0..input.len() {
        let current = input[i];
        let next = input[(i + 1) % input.len()];
        let current_dist = point_distance_to_plane(current.position, plane_normal, plane_point);
        let next_dist = point_distance_to_plane(next.position, plane_normal, plane_point);
        let current_inside = current_dist < threshold;
        let next_inside = next_dist < threshold;

        if current_inside {
            output.push(current);
            if !next_inside {
                let position = line_plane_intersection(
                    current.position,
                    next.position,
                    plane_normal,
                    plane_point,
                );
                output.push(ClipVertex {
                    position,
                    label: EdgeLabel::new(current.label.first_edge, clipping_label.next_edge),
                });
            }
        } else if next_inside {
            let position = line_plane_intersection(
                current.position,
                next.position,
                plane_normal,
                plane_point,
            );
            output.push(ClipVertex {
                position,
                label: EdgeLabel::new(current.label.first_edge, clipping_label.next_edge),
            });
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrowphase;
    use glam::Quat;

    const CONTACT_OFFSET: f32 = 0.01;
    const CLIP_THRESHOLD: f32 = 0.005;

    fn detect(
        a: &mut ConvexCollider,
        ta: Mat4,
        b: &mut ConvexCollider,
        tb: Mat4,
    ) -> Manifold {
        a.refresh_world_aabb(&ta);
        b.refresh_world_aabb(&tb);
        let mut world = hecs::World::new();
        let ea = world.spawn(());
        let eb = world.spawn(());
        let mut manifold = Manifold::new(ea, eb, 0, 0, ta, tb);
        manifold.penetration = narrowphase::collide(
            &crate::collider::Collider::Convex(a.clone()),
            &ta,
            &crate::collider::Collider::Convex(b.clone()),
            &tb,
            0.005,
            0.05,
        );
        manifold.is_colliding = manifold.penetration.is_some();
        manifold
    }

    fn stamp() -> ContactStamp {
        ContactStamp {
            ref_rigidbody: None,
            inc_rigidbody: None,
            ref_centroid: Vec3::ZERO,
            inc_centroid: Vec3::ZERO,
        }
    }

    #[test]
    fn test_resting_box_four_contacts() {
        // Unit box 0.05 into the top of a wide floor slab.
        let mut floor = ConvexCollider::cuboid(Vec3::new(5.0, 0.5, 5.0));
        let mut cube = ConvexCollider::cuboid(Vec3::splat(0.5));
        let ta = Mat4::IDENTITY;
        let tb = Mat4::from_translation(Vec3::new(0.0, 0.95, 0.0));

        let mut manifold = detect(&mut floor, ta, &mut cube, tb);
        assert!(manifold.is_colliding);
        populate_contact_points(
            &mut manifold,
            &floor,
            &cube,
            &stamp(),
            CONTACT_OFFSET,
            CLIP_THRESHOLD,
        );

        assert_eq!(manifold.contacts.len(), 4);
        for c in &manifold.contacts {
            assert!((c.normal - Vec3::Y).length() < 1e-4);
            assert!((c.ref_contact.y - 0.5).abs() < 1e-4);
            assert!((c.inc_contact.y - 0.45).abs() < 1e-4);
            assert!(c.label.is_set());
        }
        // Labels identify distinct generating features.
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_ne!(manifold.contacts[i].label, manifold.contacts[j].label);
            }
        }
    }

    #[test]
    fn test_overhanging_box_is_clipped() {
        // Box overhanging the +x edge of the floor: the clipper must cut
        // the incident face back to the floor's footprint.
        let mut floor = ConvexCollider::cuboid(Vec3::new(5.0, 0.5, 5.0));
        let mut cube = ConvexCollider::cuboid(Vec3::splat(0.5));
        let ta = Mat4::IDENTITY;
        let tb = Mat4::from_translation(Vec3::new(4.75, 0.95, 0.0));

        let mut manifold = detect(&mut floor, ta, &mut cube, tb);
        assert!(manifold.is_colliding);
        populate_contact_points(
            &mut manifold,
            &floor,
            &cube,
            &stamp(),
            CONTACT_OFFSET,
            CLIP_THRESHOLD,
        );

        assert!(!manifold.contacts.is_empty());
        for c in &manifold.contacts {
            assert!(
                c.ref_contact.x <= 5.0 + CLIP_THRESHOLD + 1e-4,
                "contact outside the reference face: {:?}",
                c.ref_contact
            );
        }
    }

    #[test]
    fn test_edge_edge_single_contact() {
        // Crossed 45-degree boxes: one contact at the closest point pair.
        let half_diag = std::f32::consts::SQRT_2 / 2.0;
        let ta = Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4);
        let tb = Mat4::from_rotation_translation(
            Quat::from_rotation_x(std::f32::consts::FRAC_PI_4),
            Vec3::new(0.0, 2.0 * half_diag - 0.05, 0.0),
        );
        let mut a = ConvexCollider::cuboid(Vec3::splat(0.5));
        let mut b = ConvexCollider::cuboid(Vec3::splat(0.5));

        let mut manifold = detect(&mut a, ta, &mut b, tb);
        assert!(manifold.is_colliding);
        assert!(matches!(
            manifold.penetration,
            Some(PenetrationQuery::Edge(_))
        ));
        populate_contact_points(&mut manifold, &a, &b, &stamp(), CONTACT_OFFSET, CLIP_THRESHOLD);

        assert_eq!(manifold.contacts.len(), 1);
        let c = &manifold.contacts[0];
        assert!((c.ref_contact - Vec3::new(0.0, half_diag, 0.0)).length() < 1e-3);
        assert!((c.inc_contact - Vec3::new(0.0, half_diag - 0.05, 0.0)).length() < 1e-3);
        assert!((c.normal - Vec3::Y).length() < 1e-3);
    }

    #[test]
    fn test_stamp_applied() {
        let mut floor = ConvexCollider::cuboid(Vec3::new(5.0, 0.5, 5.0));
        let mut cube = ConvexCollider::cuboid(Vec3::splat(0.5));
        let ta = Mat4::IDENTITY;
        let tb = Mat4::from_translation(Vec3::new(0.0, 0.95, 0.0));
        let mut manifold = detect(&mut floor, ta, &mut cube, tb);

        let mut world = hecs::World::new();
        let rb_entity = world.spawn(());
        let stamp = ContactStamp {
            ref_rigidbody: None,
            inc_rigidbody: Some(rb_entity),
            ref_centroid: Vec3::ZERO,
            inc_centroid: Vec3::new(0.0, 0.95, 0.0),
        };
        populate_contact_points(&mut manifold, &floor, &cube, &stamp, CONTACT_OFFSET, CLIP_THRESHOLD);
        for c in &manifold.contacts {
            assert_eq!(c.inc_rigidbody, Some(rb_entity));
            assert!(c.ref_rigidbody.is_none());
            assert!((c.inc_centroid.y - 0.95).abs() < 1e-6);
        }
    }
}
