//! Half-edge boundary representation of a convex polyhedron.
//!
//! Faces and edges live in contiguous arenas addressed by `u32` indices;
//! `next`/`prev`/`pairing`/`face` are index fields checked against
//! [`INVALID_INDEX`] instead of null pointers. Ring traversal, winding
//! inversion, and coplanar-face merging operate on those indices, so the
//! algorithms stay identical whether the mesh came from the box builder or
//! from hull generation.

use std::collections::HashMap;

use glam::Vec3;
use thiserror::Error;

pub type EdgeIndex = u32;
pub type FaceIndex = u32;

/// Sentinel for absent links.
pub const INVALID_INDEX: u32 = u32::MAX;

/// Identifier of the feature pair that generated a contact point.
///
/// Assigned per half-edge at construction as two `(face, edge-in-face)` id
/// pairs. Equality of labels is the key used to match contacts across
/// frames when warm-starting the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeLabel {
    pub first_edge: (u32, u32),
    pub next_edge: (u32, u32),
}

impl EdgeLabel {
    pub const UNSET: EdgeLabel = EdgeLabel {
        first_edge: (u32::MAX, u32::MAX),
        next_edge: (u32::MAX, u32::MAX),
    };

    pub fn new(first_edge: (u32, u32), next_edge: (u32, u32)) -> Self {
        Self {
            first_edge,
            next_edge,
        }
    }

    pub fn is_set(&self) -> bool {
        *self != Self::UNSET
    }
}

impl Default for EdgeLabel {
    fn default() -> Self {
        Self::UNSET
    }
}

/// One directed half of a polyhedron edge. `position` is the origin vertex;
/// the edge runs toward `next`'s origin.
#[derive(Debug, Clone, Copy)]
pub struct HalfEdge {
    pub position: Vec3,
    pub next: EdgeIndex,
    pub prev: EdgeIndex,
    /// Twin edge on the neighboring face (the Gauss-map adjacency).
    pub pairing: EdgeIndex,
    pub face: FaceIndex,
    pub label: EdgeLabel,
}

#[derive(Debug, Clone, Copy)]
pub struct Face {
    pub start_edge: EdgeIndex,
    pub normal: Vec3,
    pub centroid: Vec3,
}

/// Relation between two faces of the mesh, from the signed distance of one
/// face's centroid to the other's plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceRelation {
    Convex,
    Concave,
    Coplanar,
}

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("convex hull needs at least 4 distinct points, got {0}")]
    TooFewPoints(usize),
    #[error("input points are degenerate (collinear or coplanar)")]
    DegenerateInput,
    #[error("polygon soup is not a closed manifold (unpaired edge)")]
    OpenTopology,
    #[error("face with fewer than 3 vertices")]
    DegenerateFace,
}

#[derive(Debug, Clone, Default)]
pub struct HalfEdgeMesh {
    pub edges: Vec<HalfEdge>,
    pub faces: Vec<Face>,
}

impl HalfEdgeMesh {
    /// Visit every edge of `face`'s ring in winding order. The walk stops
    /// when it returns to the start edge or meets an invalid link, so a
    /// malformed ring cannot loop forever.
    pub fn for_each_edge<F: FnMut(EdgeIndex, &HalfEdge)>(&self, face: FaceIndex, mut visit: F) {
        let start = self.faces[face as usize].start_edge;
        let mut current = start;
        let mut steps = 0usize;
        while current != INVALID_INDEX && steps <= self.edges.len() {
            let edge = self.edges[current as usize];
            visit(current, &edge);
            current = edge.next;
            steps += 1;
            if current == start {
                break;
            }
        }
        debug_assert!(steps <= self.edges.len(), "unclosed face ring");
    }

    /// Visit the ring in reverse winding order via `prev` links.
    pub fn for_each_edge_reverse<F: FnMut(EdgeIndex, &HalfEdge)>(
        &self,
        face: FaceIndex,
        mut visit: F,
    ) {
        let start = self.faces[face as usize].start_edge;
        let mut current = start;
        let mut steps = 0usize;
        while current != INVALID_INDEX && steps <= self.edges.len() {
            let edge = self.edges[current as usize];
            visit(current, &edge);
            current = edge.prev;
            steps += 1;
            if current == start {
                break;
            }
        }
        debug_assert!(steps <= self.edges.len(), "unclosed face ring");
    }

    pub fn face_edge_count(&self, face: FaceIndex) -> usize {
        let mut count = 0;
        self.for_each_edge(face, |_, _| count += 1);
        count
    }

    /// Origin positions of `face`'s ring in winding order.
    pub fn face_vertices(&self, face: FaceIndex) -> Vec<Vec3> {
        let mut verts = Vec::new();
        self.for_each_edge(face, |_, e| verts.push(e.position));
        verts
    }

    /// Direction of an edge in mesh-local space (not normalized).
    pub fn edge_direction(&self, edge: EdgeIndex) -> Vec3 {
        let e = &self.edges[edge as usize];
        self.edges[e.next as usize].position - e.position
    }

    /// Extreme vertex along `direction` (mesh-local space).
    pub fn support_point(&self, direction: Vec3) -> Vec3 {
        let mut best = Vec3::ZERO;
        let mut best_dot = f32::NEG_INFINITY;
        for e in &self.edges {
            if e.face == INVALID_INDEX {
                continue;
            }
            let d = e.position.dot(direction);
            if d > best_dot {
                best_dot = d;
                best = e.position;
            }
        }
        best
    }

    /// Flip a face's winding: swap every ring edge's prev/next links, shift
    /// origins to the old targets, and negate the normal.
    pub fn invert_face(&mut self, face: FaceIndex) {
        let mut ring = Vec::new();
        self.for_each_edge(face, |idx, e| {
            ring.push((idx, e.next, self.edges[e.next as usize].position));
        });
        for &(idx, old_next, old_next_pos) in &ring {
            let e = &mut self.edges[idx as usize];
            let old_prev = e.prev;
            e.next = old_prev;
            e.prev = old_next;
            e.position = old_next_pos;
        }
        self.faces[face as usize].normal = -self.faces[face as usize].normal;
    }

    /// Classify the dihedral relation between two faces by the signed
    /// distance of `other`'s centroid to `face`'s plane, with a
    /// `sqrt(machine-epsilon)` coplanarity band.
    pub fn angle_relation(&self, face: FaceIndex, other: FaceIndex) -> FaceRelation {
        let error = f32::EPSILON.sqrt();
        let f = &self.faces[face as usize];
        let o = &self.faces[other as usize];
        let dist = (o.centroid - f.centroid).dot(f.normal);
        if dist < -error {
            FaceRelation::Convex
        } else if dist > error {
            FaceRelation::Concave
        } else {
            FaceRelation::Coplanar
        }
    }

    /// Find an edge of `face` whose pairing belongs to `other`.
    pub fn find_middle_edge(&self, face: FaceIndex, other: FaceIndex) -> Option<EdgeIndex> {
        let mut found = None;
        self.for_each_edge(face, |idx, e| {
            if found.is_none()
                && e.pairing != INVALID_INDEX
                && self.edges[e.pairing as usize].face == other
            {
                found = Some(idx);
            }
        });
        found
    }

    /// Collapse the two faces across `middle` into one, dropping `middle`
    /// and its twin. The absorbed face and the two edges become tombstones
    /// (`INVALID_INDEX` links) until [`compact`](Self::compact) runs.
    pub fn merge_faces(&mut self, middle: EdgeIndex) {
        let twin = self.edges[middle as usize].pairing;
        debug_assert_ne!(twin, INVALID_INDEX);
        let keep = self.edges[middle as usize].face;
        let absorb = self.edges[twin as usize].face;
        debug_assert_ne!(keep, absorb);

        let m_prev = self.edges[middle as usize].prev;
        let m_next = self.edges[middle as usize].next;
        let t_prev = self.edges[twin as usize].prev;
        let t_next = self.edges[twin as usize].next;

        self.edges[m_prev as usize].next = t_next;
        self.edges[t_next as usize].prev = m_prev;
        self.edges[t_prev as usize].next = m_next;
        self.edges[m_next as usize].prev = t_prev;

        self.faces[keep as usize].start_edge = m_prev;

        for e in [middle, twin] {
            let edge = &mut self.edges[e as usize];
            edge.next = INVALID_INDEX;
            edge.prev = INVALID_INDEX;
            edge.pairing = INVALID_INDEX;
            edge.face = INVALID_INDEX;
        }
        self.faces[absorb as usize].start_edge = INVALID_INDEX;

        // Retag and recompute the merged ring.
        let mut ring = Vec::new();
        self.for_each_edge(keep, |idx, _| ring.push(idx));
        let mut centroid = Vec3::ZERO;
        for &idx in &ring {
            self.edges[idx as usize].face = keep;
            centroid += self.edges[idx as usize].position;
        }
        self.faces[keep as usize].centroid = centroid / ring.len() as f32;
    }

    /// Merge every adjacent coplanar face pair. Intended as post-hull
    /// cleanup where triangulation split flat faces.
    pub fn merge_coplanar_neighbors(&mut self) {
        loop {
            let mut candidate = None;
            'outer: for face in 0..self.faces.len() as FaceIndex {
                if self.faces[face as usize].start_edge == INVALID_INDEX {
                    continue;
                }
                let mut ring = Vec::new();
                self.for_each_edge(face, |idx, e| ring.push((idx, e.pairing)));
                for (idx, pairing) in ring {
                    if pairing == INVALID_INDEX {
                        continue;
                    }
                    let other = self.edges[pairing as usize].face;
                    if other == face || other == INVALID_INDEX {
                        continue;
                    }
                    if self.angle_relation(face, other) == FaceRelation::Coplanar
                        && self.shared_edge_count(face, other) == 1
                    {
                        candidate = Some(idx);
                        break 'outer;
                    }
                }
            }
            match candidate {
                Some(middle) => self.merge_faces(middle),
                None => break,
            }
        }
        self.compact();
    }

    fn shared_edge_count(&self, face: FaceIndex, other: FaceIndex) -> usize {
        let mut count = 0;
        self.for_each_edge(face, |_, e| {
            if e.pairing != INVALID_INDEX && self.edges[e.pairing as usize].face == other {
                count += 1;
            }
        });
        count
    }

    /// Drop tombstoned faces/edges and remap all index links.
    pub fn compact(&mut self) {
        let mut face_map = vec![INVALID_INDEX; self.faces.len()];
        let mut edge_map = vec![INVALID_INDEX; self.edges.len()];

        let mut new_faces = Vec::new();
        for (i, f) in self.faces.iter().enumerate() {
            if f.start_edge != INVALID_INDEX {
                face_map[i] = new_faces.len() as FaceIndex;
                new_faces.push(*f);
            }
        }
        let mut new_edges = Vec::new();
        for (i, e) in self.edges.iter().enumerate() {
            if e.face != INVALID_INDEX {
                edge_map[i] = new_edges.len() as EdgeIndex;
                new_edges.push(*e);
            }
        }
        for e in &mut new_edges {
            e.next = edge_map[e.next as usize];
            e.prev = edge_map[e.prev as usize];
            e.pairing = edge_map[e.pairing as usize];
            e.face = face_map[e.face as usize];
        }
        for f in &mut new_faces {
            f.start_edge = edge_map[f.start_edge as usize];
        }
        self.faces = new_faces;
        self.edges = new_edges;
    }

    /// Flip any face whose normal points toward the interior, so all
    /// normals end up outward. `interior` must be a point strictly inside
    /// the polyhedron (the vertex centroid works for convex input).
    pub fn make_normals_outward(&mut self, interior: Vec3) {
        for face in 0..self.faces.len() as FaceIndex {
            let f = self.faces[face as usize];
            if f.normal.dot(f.centroid - interior) < 0.0 {
                self.invert_face(face);
            }
        }
    }

    /// Whether every adjacent face pair meets convexly (or coplanar).
    pub fn is_convex(&self) -> bool {
        for face in 0..self.faces.len() as FaceIndex {
            let mut ok = true;
            self.for_each_edge(face, |_, e| {
                if e.pairing == INVALID_INDEX {
                    ok = false;
                    return;
                }
                let other = self.edges[e.pairing as usize].face;
                if self.angle_relation(face, other) == FaceRelation::Concave {
                    ok = false;
                }
            });
            if !ok {
                return false;
            }
        }
        true
    }

    /// Stamp every edge with its `(face, edge-in-face)` label pair. Run
    /// once topology is final; labels must stay stable across frames.
    pub fn assign_labels(&mut self) {
        for face in 0..self.faces.len() as FaceIndex {
            let mut ring = Vec::new();
            self.for_each_edge(face, |idx, _| ring.push(idx));
            let n = ring.len() as u32;
            for (i, &idx) in ring.iter().enumerate() {
                let i = i as u32;
                self.edges[idx as usize].label =
                    EdgeLabel::new((face, i), (face, (i + 1) % n));
            }
        }
    }

    /// Build a mesh from a closed polygon soup. Every polygon is a ring of
    /// indices into `points`, wound counter-clockwise seen from outside.
    /// Pairings are linked through the directed vertex-pair map; a directed
    /// edge without a twin means the soup is not watertight.
    pub fn from_polygons(points: &[Vec3], polygons: &[Vec<usize>]) -> Result<Self, MeshError> {
        let mut mesh = HalfEdgeMesh::default();
        let mut pair_map: HashMap<(usize, usize), EdgeIndex> = HashMap::new();

        for ring in polygons {
            if ring.len() < 3 {
                return Err(MeshError::DegenerateFace);
            }
            let face = mesh.faces.len() as FaceIndex;
            let base = mesh.edges.len() as EdgeIndex;
            let n = ring.len();

            let mut centroid = Vec3::ZERO;
            for i in 0..n {
                let v = ring[i];
                let v_next = ring[(i + 1) % n];
                let idx = base + i as EdgeIndex;
                mesh.edges.push(HalfEdge {
                    position: points[v],
                    next: base + ((i + 1) % n) as EdgeIndex,
                    prev: base + ((i + n - 1) % n) as EdgeIndex,
                    pairing: INVALID_INDEX,
                    face,
                    label: EdgeLabel::UNSET,
                });
                centroid += points[v];

                if let Some(&twin) = pair_map.get(&(v_next, v)) {
                    mesh.edges[idx as usize].pairing = twin;
                    mesh.edges[twin as usize].pairing = idx;
                } else {
                    pair_map.insert((v, v_next), idx);
                }
            }

            let normal = (points[ring[1]] - points[ring[0]])
                .cross(points[ring[2]] - points[ring[0]])
                .normalize_or_zero();
            if normal == Vec3::ZERO {
                return Err(MeshError::DegenerateFace);
            }
            mesh.faces.push(Face {
                start_edge: base,
                normal,
                centroid: centroid / n as f32,
            });
        }

        if mesh.edges.iter().any(|e| e.pairing == INVALID_INDEX) {
            return Err(MeshError::OpenTopology);
        }
        mesh.assign_labels();
        Ok(mesh)
    }

    /// Axis-aligned box centered at the origin: 8 vertices, 6 quad faces,
    /// 24 half-edges with mutual pairings.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let points = [
            Vec3::new(-h.x, -h.y, -h.z), // 0
            Vec3::new(h.x, -h.y, -h.z),  // 1
            Vec3::new(h.x, h.y, -h.z),   // 2
            Vec3::new(-h.x, h.y, -h.z),  // 3
            Vec3::new(-h.x, -h.y, h.z),  // 4
            Vec3::new(h.x, -h.y, h.z),   // 5
            Vec3::new(h.x, h.y, h.z),    // 6
            Vec3::new(-h.x, h.y, h.z),   // 7
        ];
        let polygons = vec![
            vec![4, 5, 6, 7], // +z
            vec![1, 0, 3, 2], // -z
            vec![5, 1, 2, 6], // +x
            vec![0, 4, 7, 3], // -x
            vec![7, 6, 2, 3], // +y
            vec![0, 1, 5, 4], // -y
        ];
        // A box soup is closed by construction.
        match Self::from_polygons(&points, &polygons) {
            Ok(mesh) => mesh,
            Err(_) => unreachable!("box polygon soup is always closed"),
        }
    }

    /// Incremental convex hull of a point cloud, followed by coplanar-face
    /// merging so flat regions come out as single polygons.
    pub fn convex_hull(input: &[Vec3]) -> Result<Self, MeshError> {
        let points = dedup_points(input);
        if points.len() < 4 {
            return Err(MeshError::TooFewPoints(points.len()));
        }

        // Epsilon scaled by the cloud's extent.
        let mut max_abs = Vec3::ZERO;
        for p in &points {
            max_abs = max_abs.max(p.abs());
        }
        let epsilon = (max_abs.x + max_abs.y + max_abs.z) * f32::EPSILON.sqrt();

        let mut tris = initial_tetrahedron(&points, epsilon)?;
        let used: Vec<usize> = tris.iter().flat_map(|t| t.v).collect();

        for p_idx in 0..points.len() {
            if used.contains(&p_idx) {
                continue;
            }
            let p = points[p_idx];

            let visible: Vec<usize> = tris
                .iter()
                .enumerate()
                .filter(|(_, t)| t.normal.dot(p - points[t.v[0]]) > epsilon)
                .map(|(i, _)| i)
                .collect();
            if visible.is_empty() {
                continue; // inside the current hull
            }

            // Horizon: directed edges of visible faces whose twin face is
            // not visible.
            let mut owner: HashMap<(usize, usize), usize> = HashMap::new();
            for (i, t) in tris.iter().enumerate() {
                for e in t.directed_edges() {
                    owner.insert(e, i);
                }
            }
            let mut horizon = Vec::new();
            for &vi in &visible {
                for (a, b) in tris[vi].directed_edges() {
                    match owner.get(&(b, a)) {
                        Some(&neighbor) if !visible.contains(&neighbor) => horizon.push((a, b)),
                        None => return Err(MeshError::DegenerateInput),
                        _ => {}
                    }
                }
            }

            // Drop visible faces (descending index keeps removals stable),
            // then fan the apex over the horizon.
            let mut visible = visible;
            visible.sort_unstable_by(|a, b| b.cmp(a));
            for vi in visible {
                tris.swap_remove(vi);
            }
            for (a, b) in horizon {
                tris.push(Triangle::new(&points, [a, b, p_idx]));
            }
        }

        let polygons: Vec<Vec<usize>> = tris.iter().map(|t| t.v.to_vec()).collect();
        let mut mesh = Self::from_polygons(&points, &polygons)?;
        mesh.merge_coplanar_neighbors();
        let interior = mesh.faces.iter().map(|f| f.centroid).sum::<Vec3>()
            / mesh.faces.len().max(1) as f32;
        mesh.make_normals_outward(interior);
        mesh.assign_labels();
        debug_assert!(mesh.is_convex());
        Ok(mesh)
    }
}

#[derive(Clone, Copy)]
struct Triangle {
    v: [usize; 3],
    normal: Vec3,
}

impl Triangle {
    fn new(points: &[Vec3], v: [usize; 3]) -> Self {
        let normal = (points[v[1]] - points[v[0]])
            .cross(points[v[2]] - points[v[0]])
            .normalize_or_zero();
        Self { v, normal }
    }

    fn directed_edges(&self) -> [(usize, usize); 3] {
        [
            (self.v[0], self.v[1]),
            (self.v[1], self.v[2]),
            (self.v[2], self.v[0]),
        ]
    }
}

fn dedup_points(input: &[Vec3]) -> Vec<Vec3> {
    let mut points: Vec<Vec3> = Vec::with_capacity(input.len());
    for &p in input {
        if !points.iter().any(|q| (*q - p).length_squared() < 1e-10) {
            points.push(p);
        }
    }
    points
}

/// Pick four non-coplanar points and return the outward-wound faces of
/// their tetrahedron.
fn initial_tetrahedron(points: &[Vec3], epsilon: f32) -> Result<Vec<Triangle>, MeshError> {
    // Most distant pair among the six axis extremes.
    let mut extremes = [0usize; 6];
    for (i, p) in points.iter().enumerate() {
        for axis in 0..3 {
            if p[axis] < points[extremes[axis * 2]][axis] {
                extremes[axis * 2] = i;
            }
            if p[axis] > points[extremes[axis * 2 + 1]][axis] {
                extremes[axis * 2 + 1] = i;
            }
        }
    }
    let (mut a, mut b, mut best) = (0, 0, -1.0f32);
    for &i in &extremes {
        for &j in &extremes {
            let d = (points[i] - points[j]).length_squared();
            if d > best {
                best = d;
                a = i;
                b = j;
            }
        }
    }
    if best <= epsilon * epsilon {
        return Err(MeshError::DegenerateInput);
    }

    // Farthest point from the line ab.
    let ab = (points[b] - points[a]).normalize();
    let (mut c, mut best) = (0, -1.0f32);
    for (i, p) in points.iter().enumerate() {
        let rel = *p - points[a];
        let d = (rel - ab * rel.dot(ab)).length_squared();
        if d > best {
            best = d;
            c = i;
        }
    }
    if best <= epsilon * epsilon {
        return Err(MeshError::DegenerateInput);
    }

    // Farthest point from the plane abc.
    let n = (points[b] - points[a])
        .cross(points[c] - points[a])
        .normalize();
    let (mut d, mut best) = (0, 0.0f32);
    for (i, p) in points.iter().enumerate() {
        let dist = (*p - points[a]).dot(n);
        if dist.abs() > best.abs() {
            best = dist;
            d = i;
        }
    }
    if best.abs() <= epsilon {
        return Err(MeshError::DegenerateInput);
    }

    // Wind so every face looks away from the opposite vertex.
    let faces = if best > 0.0 {
        [[a, c, b], [a, b, d], [b, c, d], [c, a, d]]
    } else {
        [[a, b, c], [b, a, d], [c, b, d], [a, c, d]]
    };
    Ok(faces.iter().map(|&v| Triangle::new(points, v)).collect())
}
