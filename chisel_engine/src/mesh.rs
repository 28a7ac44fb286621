// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use float_ord::FloatOrd;
use glam::DVec3;
use slotmap::SlotMap;

use chisel_commons::geom::{Aabb, Plane, PointStatus, Ray};
use chisel_commons::math::{correct_vec, ALMOST_ZERO, COLINEAR_EPSILON, CORRECT_EPSILON};
use chisel_commons::utils::{rotate_iter, SVec, SliceUtils};

/// Type-safe keys into the per-polyhedron entity arenas
pub mod id_types;
pub use id_types::*;

/// Observer trait reporting structural changes to callers
pub mod callbacks;
pub use callbacks::*;

/// Incremental convex hull construction and vertex removal
pub mod hull;

/// Splitting a polyhedron by a plane
pub mod clip;
pub use clip::ClipStatus;

/// CSG intersection and subtraction
pub mod csg;

/// Read-only geometric queries between polyhedra
pub mod queries;

/// Pairing faces of two polyhedra for attribute transfer
pub mod matcher;
pub use matcher::PolyhedronMatcher;

/// Opaque user data carried on vertices and faces. The engine never
/// interprets it; new entities get the `Default` value.
pub trait Payload: Default + Clone {}
impl<T: Default + Clone> Payload for T {}

#[derive(Debug, Clone)]
pub struct Vertex<VP> {
    position: DVec3,
    leaving: Option<HalfEdgeId>,
    pub payload: VP,
}

impl<VP> Vertex<VP> {
    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// A half edge leaving this vertex.
    pub fn leaving(&self) -> Option<HalfEdgeId> {
        self.leaving
    }
}

#[derive(Debug, Clone)]
pub struct HalfEdge {
    origin: VertexId,
    edge: Option<EdgeId>,
    face: Option<FaceId>,
    next: Option<HalfEdgeId>,
    prev: Option<HalfEdgeId>,
}

impl HalfEdge {
    pub fn origin(&self) -> VertexId {
        self.origin
    }

    pub fn edge(&self) -> Option<EdgeId> {
        self.edge
    }

    pub fn face(&self) -> Option<FaceId> {
        self.face
    }
}

/// An undirected edge. The second half edge is absent while a seam is
/// open during construction, clipping or vertex removal, and in the
/// polygon state where only one face exists.
#[derive(Debug, Clone)]
pub struct Edge {
    first: HalfEdgeId,
    second: Option<HalfEdgeId>,
}

impl Edge {
    pub fn first(&self) -> HalfEdgeId {
        self.first
    }

    pub fn second(&self) -> Option<HalfEdgeId> {
        self.second
    }

    pub fn fully_specified(&self) -> bool {
        self.second.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Face<FP> {
    /// Entry point into the cyclic boundary, counter-clockwise when viewed
    /// along the outward normal.
    boundary: HalfEdgeId,
    pub payload: FP,
}

impl<FP> Face<FP> {
    pub fn boundary(&self) -> HalfEdgeId {
        self.boundary
    }
}

/// The result of picking a face with a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceHit {
    pub face: FaceId,
    pub distance: f64,
}

/// A convex polyhedron stored as a half-edge mesh over four entity arenas.
/// Depending on how many points have been added it passes through the
/// topological states empty, point, edge, polygon and polyhedron.
#[derive(Debug, Clone)]
pub struct Polyhedron<VP: Payload = (), FP: Payload = ()> {
    vertices: SlotMap<VertexId, Vertex<VP>>,
    halfedges: SlotMap<HalfEdgeId, HalfEdge>,
    edges: SlotMap<EdgeId, Edge>,
    faces: SlotMap<FaceId, Face<FP>>,
    bounds: Aabb,
}

impl<VP: Payload, FP: Payload> Default for Polyhedron<VP, FP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<VP: Payload, FP: Payload> Polyhedron<VP, FP> {
    pub fn new() -> Self {
        Self {
            vertices: SlotMap::with_key(),
            halfedges: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            faces: SlotMap::with_key(),
            bounds: Aabb::empty(),
        }
    }

    /// Builds the convex hull of the given points.
    pub fn from_points(points: &[DVec3]) -> Self {
        let mut poly = Self::new();
        poly.add_points(points.iter().copied());
        poly
    }

    /// Builds an axis-aligned cuboid spanning `bounds`.
    pub fn from_bounds(bounds: &Aabb) -> Self {
        let (min, max) = (bounds.min, bounds.max);
        Self::from_points(&[
            DVec3::new(min.x, min.y, min.z),
            DVec3::new(min.x, min.y, max.z),
            DVec3::new(min.x, max.y, min.z),
            DVec3::new(min.x, max.y, max.z),
            DVec3::new(max.x, min.y, min.z),
            DVec3::new(max.x, min.y, max.z),
            DVec3::new(max.x, max.y, min.z),
            DVec3::new(max.x, max.y, max.z),
        ])
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.halfedges.clear();
        self.edges.clear();
        self.faces.clear();
        self.bounds = Aabb::empty();
    }

    /* ============================ */
    /*   Counts, states, accessors  */
    /* ============================ */

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn is_point(&self) -> bool {
        self.vertices.len() == 1
    }

    pub fn is_edge(&self) -> bool {
        self.vertices.len() == 2
    }

    pub fn is_polygon(&self) -> bool {
        self.faces.len() == 1
    }

    pub fn is_polyhedron(&self) -> bool {
        self.faces.len() > 1
    }

    /// A polyhedron is closed when every edge has both half edges.
    pub fn is_closed(&self) -> bool {
        self.is_polyhedron() && self.edges.values().all(Edge::fully_specified)
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex<VP> {
        &self.vertices[id]
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex<VP> {
        &mut self.vertices[id]
    }

    pub fn halfedge(&self, id: HalfEdgeId) -> &HalfEdge {
        &self.halfedges[id]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn face(&self, id: FaceId) -> &Face<FP> {
        &self.faces[id]
    }

    pub fn face_mut(&mut self, id: FaceId) -> &mut Face<FP> {
        &mut self.faces[id]
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.keys()
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.keys()
    }

    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces.keys()
    }

    pub fn vertex_positions(&self) -> Vec<DVec3> {
        self.vertices.values().map(Vertex::position).collect()
    }

    /* ========================= */
    /*   Half edge traversal     */
    /* ========================= */

    pub fn he_origin(&self, h: HalfEdgeId) -> VertexId {
        self.halfedges[h].origin
    }

    pub fn he_next(&self, h: HalfEdgeId) -> HalfEdgeId {
        self.halfedges[h].next.expect("half edge has no next")
    }

    pub fn he_prev(&self, h: HalfEdgeId) -> HalfEdgeId {
        self.halfedges[h].prev.expect("half edge has no prev")
    }

    pub fn he_destination(&self, h: HalfEdgeId) -> VertexId {
        self.he_origin(self.he_next(h))
    }

    pub fn he_twin(&self, h: HalfEdgeId) -> HalfEdgeId {
        let edge = self.halfedges[h].edge.expect("half edge has no edge");
        self.edge_twin(edge, h)
    }

    pub fn he_vector(&self, h: HalfEdgeId) -> DVec3 {
        self.position(self.he_destination(h)) - self.position(self.he_origin(h))
    }

    /// The next half edge leaving the same origin vertex, rotating around
    /// the vertex fan.
    pub fn he_next_incident(&self, h: HalfEdgeId) -> HalfEdgeId {
        self.he_twin(self.he_prev(h))
    }

    pub fn position(&self, v: VertexId) -> DVec3 {
        self.vertices[v].position
    }

    /// Whether the vertex touches the given face.
    pub fn vertex_incident(&self, v: VertexId, face: FaceId) -> bool {
        let first = self.vertices[v].leaving.expect("vertex has no leaving edge");
        let mut current = first;
        loop {
            if self.halfedges[current].face == Some(face) {
                return true;
            }
            current = self.he_next_incident(current);
            if current == first {
                return false;
            }
        }
    }

    /// Classifies `point` against the plane through the half edge's origin
    /// that is perpendicular to the face, facing away from the boundary.
    pub(crate) fn he_point_status(
        &self,
        h: HalfEdgeId,
        face_normal: DVec3,
        point: DVec3,
    ) -> PointStatus {
        let normal = self
            .he_vector(h)
            .normalize()
            .cross(face_normal)
            .normalize();
        let plane = Plane::new(self.position(self.he_origin(h)), normal);
        plane.point_status(point)
    }

    /* ================= */
    /*   Edge accessors  */
    /* ================= */

    pub fn edge_first_vertex(&self, e: EdgeId) -> VertexId {
        self.he_origin(self.edges[e].first)
    }

    pub fn edge_second_vertex(&self, e: EdgeId) -> VertexId {
        match self.edges[e].second {
            Some(second) => self.he_origin(second),
            None => self.he_destination(self.edges[e].first),
        }
    }

    pub fn edge_vector(&self, e: EdgeId) -> DVec3 {
        self.position(self.edge_second_vertex(e)) - self.position(self.edge_first_vertex(e))
    }

    pub fn edge_center(&self, e: EdgeId) -> DVec3 {
        (self.position(self.edge_first_vertex(e)) + self.position(self.edge_second_vertex(e)))
            / 2.0
    }

    pub fn edge_first_face(&self, e: EdgeId) -> Option<FaceId> {
        self.halfedges[self.edges[e].first].face
    }

    pub fn edge_second_face(&self, e: EdgeId) -> Option<FaceId> {
        self.edges[e].second.and_then(|h| self.halfedges[h].face)
    }

    pub fn edge_twin(&self, e: EdgeId, h: HalfEdgeId) -> HalfEdgeId {
        let edge = &self.edges[e];
        if edge.first == h {
            edge.second.expect("edge has no second half edge")
        } else {
            debug_assert_eq!(edge.second, Some(h));
            edge.first
        }
    }

    pub fn edge_has_position(&self, e: EdgeId, position: DVec3, epsilon: f64) -> bool {
        self.position(self.edge_first_vertex(e))
            .abs_diff_eq(position, epsilon)
            || self
                .position(self.edge_second_vertex(e))
                .abs_diff_eq(position, epsilon)
    }

    pub fn edge_has_positions(
        &self,
        e: EdgeId,
        position1: DVec3,
        position2: DVec3,
        epsilon: f64,
    ) -> bool {
        let first = self.position(self.edge_first_vertex(e));
        let second = self.position(self.edge_second_vertex(e));
        (first.abs_diff_eq(position1, epsilon) && second.abs_diff_eq(position2, epsilon))
            || (first.abs_diff_eq(position2, epsilon) && second.abs_diff_eq(position1, epsilon))
    }

    pub(crate) fn edge_flip(&mut self, e: EdgeId) {
        let edge = &mut self.edges[e];
        if let Some(second) = edge.second {
            edge.second = Some(edge.first);
            edge.first = second;
        }
    }

    pub(crate) fn edge_make_first(&mut self, e: EdgeId, h: HalfEdgeId) {
        if self.edges[e].first != h {
            self.edge_flip(e);
        }
        debug_assert_eq!(self.edges[e].first, h);
    }

    pub(crate) fn edge_make_second(&mut self, e: EdgeId, h: HalfEdgeId) {
        if self.edges[e].second != Some(h) {
            self.edge_flip(e);
        }
        debug_assert_eq!(self.edges[e].second, Some(h));
    }

    pub(crate) fn edge_unset_second(&mut self, e: EdgeId) {
        let second = self.edges[e]
            .second
            .take()
            .expect("edge has no second half edge");
        self.halfedges[second].edge = None;
    }

    pub(crate) fn edge_set_second(&mut self, e: EdgeId, h: HalfEdgeId) {
        debug_assert!(self.edges[e].second.is_none());
        debug_assert!(self.halfedges[h].edge.is_none());
        self.edges[e].second = Some(h);
        self.halfedges[h].edge = Some(e);
    }

    pub(crate) fn edge_set_first_as_leaving(&mut self, e: EdgeId) {
        let first = self.edges[e].first;
        self.set_as_leaving(first);
    }

    /* ================== */
    /*   Face traversal   */
    /* ================== */

    /// The half edges of a face boundary in cycle order.
    pub fn face_halfedges(&self, face: FaceId) -> SVec<HalfEdgeId> {
        let mut result = SVec::new();
        let first = self.faces[face].boundary;
        let mut current = first;
        loop {
            result.push(current);
            current = self.he_next(current);
            if current == first {
                break;
            }
        }
        result
    }

    pub fn face_vertices(&self, face: FaceId) -> SVec<VertexId> {
        self.face_halfedges(face)
            .iter()
            .map(|&h| self.he_origin(h))
            .collect()
    }

    pub fn face_vertex_positions(&self, face: FaceId) -> Vec<DVec3> {
        self.face_halfedges(face)
            .iter()
            .map(|&h| self.position(self.he_origin(h)))
            .collect()
    }

    pub fn face_vertex_count(&self, face: FaceId) -> usize {
        self.face_halfedges(face).len()
    }

    pub fn face_origin(&self, face: FaceId) -> DVec3 {
        self.position(self.he_origin(self.faces[face].boundary))
    }

    /// The outward normal, derived from the first non-degenerate corner of
    /// the boundary.
    pub fn face_normal(&self, face: FaceId) -> DVec3 {
        let first = self.faces[face].boundary;
        let mut current = first;
        let mut normal = DVec3::ZERO;
        loop {
            let p1 = self.position(self.he_origin(current));
            let p2 = self.position(self.he_origin(self.he_next(current)));
            let p3 = self.position(self.he_origin(self.he_next(self.he_next(current))));
            normal = (p2 - p1).cross(p3 - p1);
            if normal.length_squared() > ALMOST_ZERO {
                return normal.normalize();
            }
            current = self.he_next(current);
            if current == first {
                return normal;
            }
        }
    }

    pub fn face_plane(&self, face: FaceId) -> Plane {
        Plane::new(self.face_origin(face), self.face_normal(face))
    }

    pub fn face_center(&self, face: FaceId) -> DVec3 {
        let positions = self.face_vertex_positions(face);
        positions.iter().sum::<DVec3>() / positions.len() as f64
    }

    pub fn face_point_status(&self, face: FaceId, point: DVec3) -> PointStatus {
        let normal = self.face_normal(face);
        Plane::new(self.face_origin(face), normal).point_status(point)
    }

    /// Whether all boundary vertices lie on the given plane.
    pub fn face_vertices_on_plane(&self, face: FaceId, plane: &Plane) -> bool {
        self.face_halfedges(face).iter().all(|&h| {
            plane.point_status(self.position(self.he_origin(h))) == PointStatus::Inside
        })
    }

    pub fn face_coplanar(&self, face: FaceId, other: FaceId) -> bool {
        if 1.0 - self.face_normal(face).dot(self.face_normal(other)) >= COLINEAR_EPSILON {
            return false;
        }
        let my_plane = self.face_plane(face);
        if !self.face_vertices_on_plane(other, &my_plane) {
            return false;
        }
        let other_plane = self.face_plane(other);
        self.face_vertices_on_plane(face, &other_plane)
    }

    pub fn face_shared_vertex_count(&self, face: FaceId, other: FaceId) -> usize {
        let mine: std::collections::HashSet<VertexId> =
            self.face_vertices(face).into_iter().collect();
        self.face_vertices(other)
            .into_iter()
            .filter(|v| mine.contains(v))
            .count()
    }

    /// Distance along the ray to the face, `None` if it misses. The flag
    /// reports whether the front of the face was hit.
    pub(crate) fn face_intersect_with_ray(
        &self,
        face: FaceId,
        ray: &Ray,
    ) -> Option<(bool, f64)> {
        let plane = self.face_plane(face);
        let cos = plane.normal.dot(ray.direction);
        if cos.abs() < ALMOST_ZERO {
            return None;
        }
        let distance = ray.intersect_polygon(&plane, &self.face_vertex_positions(face))?;
        Some((cos < 0.0, distance))
    }

    /// Reverses the boundary cycle, flipping the face normal.
    pub(crate) fn face_flip(&mut self, face: FaceId) {
        for h in self.face_halfedges(face) {
            let halfedge = &mut self.halfedges[h];
            std::mem::swap(&mut halfedge.next, &mut halfedge.prev);
        }
    }

    /* ======================= */
    /*   Position based lookup */
    /* ======================= */

    pub fn find_vertex_by_position(&self, position: DVec3, epsilon: f64) -> Option<VertexId> {
        self.vertices
            .iter()
            .find(|(_, v)| v.position.abs_diff_eq(position, epsilon))
            .map(|(id, _)| id)
    }

    pub fn find_closest_vertex(&self, position: DVec3) -> Option<VertexId> {
        self.vertices
            .iter()
            .min_by_key(|(_, v)| FloatOrd((v.position - position).length_squared()))
            .map(|(id, _)| id)
    }

    pub fn find_edge_by_positions(
        &self,
        position1: DVec3,
        position2: DVec3,
        epsilon: f64,
    ) -> Option<EdgeId> {
        self.edges
            .keys()
            .find(|&e| self.edge_has_positions(e, position1, position2, epsilon))
    }

    pub fn find_face_by_positions(
        &self,
        positions: &[DVec3],
        epsilon: f64,
    ) -> Option<FaceId> {
        self.faces
            .keys()
            .find(|&f| self.face_has_vertex_positions(f, positions, epsilon))
    }

    pub fn has_vertex(&self, position: DVec3, epsilon: f64) -> bool {
        self.find_vertex_by_position(position, epsilon).is_some()
    }

    pub fn has_all_vertices(&self, positions: &[DVec3], epsilon: f64) -> bool {
        positions.len() == self.vertex_count()
            && positions.iter().all(|&p| self.has_vertex(p, epsilon))
    }

    pub fn has_edge(&self, position1: DVec3, position2: DVec3, epsilon: f64) -> bool {
        self.find_edge_by_positions(position1, position2, epsilon)
            .is_some()
    }

    pub fn has_face(&self, positions: &[DVec3], epsilon: f64) -> bool {
        self.find_face_by_positions(positions, epsilon).is_some()
    }

    /// Whether the face boundary matches the given position ring, at any
    /// rotation.
    pub fn face_has_vertex_positions(
        &self,
        face: FaceId,
        positions: &[DVec3],
        epsilon: f64,
    ) -> bool {
        let halfedges = self.face_halfedges(face);
        if halfedges.len() != positions.len() {
            return false;
        }
        (0..halfedges.len()).any(|shift| {
            rotate_iter(halfedges.iter_cpy(), shift, halfedges.len())
                .zip(positions.iter_cpy())
                .all(|(h, p)| self.position(self.he_origin(h)).abs_diff_eq(p, epsilon))
        })
    }

    /// The nearest face hit by the ray from the front side.
    pub fn pick_face(&self, ray: &Ray) -> Option<FaceHit> {
        let mut best: Option<FaceHit> = None;
        for face in self.faces.keys() {
            if let Some((front, distance)) = self.face_intersect_with_ray(face, ray) {
                if front && best.map_or(true, |hit| distance < hit.distance) {
                    best = Some(FaceHit { face, distance });
                }
            }
        }
        best
    }

    /* ==================== */
    /*   Mutation helpers   */
    /* ==================== */

    pub(crate) fn alloc_vertex(&mut self, position: DVec3) -> VertexId {
        self.vertices.insert(Vertex {
            position,
            leaving: None,
            payload: VP::default(),
        })
    }

    /// Allocates a half edge at `origin` and makes it the origin's leaving
    /// edge.
    pub(crate) fn alloc_halfedge(&mut self, origin: VertexId) -> HalfEdgeId {
        let h = self.halfedges.insert(HalfEdge {
            origin,
            edge: None,
            face: None,
            next: None,
            prev: None,
        });
        self.vertices[origin].leaving = Some(h);
        h
    }

    pub(crate) fn alloc_edge(&mut self, first: HalfEdgeId, second: Option<HalfEdgeId>) -> EdgeId {
        let e = self.edges.insert(Edge { first, second });
        self.halfedges[first].edge = Some(e);
        if let Some(second) = second {
            self.halfedges[second].edge = Some(e);
        }
        e
    }

    /// Links the given half edges into a cycle and creates a face around
    /// them.
    pub(crate) fn make_face(&mut self, boundary: &[HalfEdgeId]) -> FaceId {
        debug_assert!(boundary.len() >= 3);
        let face = self.faces.insert(Face {
            boundary: boundary[0],
            payload: FP::default(),
        });
        for i in 0..boundary.len() {
            let next = boundary[(i + 1) % boundary.len()];
            self.link(boundary[i], next);
            self.halfedges[boundary[i]].face = Some(face);
        }
        face
    }

    pub(crate) fn link(&mut self, a: HalfEdgeId, b: HalfEdgeId) {
        self.halfedges[a].next = Some(b);
        self.halfedges[b].prev = Some(a);
    }

    pub(crate) fn set_as_leaving(&mut self, h: HalfEdgeId) {
        let origin = self.halfedges[h].origin;
        self.vertices[origin].leaving = Some(h);
    }

    pub(crate) fn remove_halfedge(&mut self, h: HalfEdgeId) {
        let origin = self.halfedges[h].origin;
        if let Some(vertex) = self.vertices.get_mut(origin) {
            if vertex.leaving == Some(h) {
                vertex.leaving = None;
            }
        }
        self.halfedges.remove(h);
    }

    pub(crate) fn remove_vertex_entity(&mut self, v: VertexId) {
        self.vertices.remove(v);
    }

    pub(crate) fn remove_edge_entity(&mut self, e: EdgeId) {
        self.edges.remove(e);
    }

    pub(crate) fn remove_face_entity(&mut self, f: FaceId) {
        self.faces.remove(f);
    }

    /// Inserts `new_h` into the boundary of `face` directly after `after`.
    pub(crate) fn insert_into_boundary_after(
        &mut self,
        face: FaceId,
        after: HalfEdgeId,
        new_h: HalfEdgeId,
    ) {
        debug_assert_eq!(self.halfedges[after].face, Some(face));
        debug_assert!(self.halfedges[new_h].face.is_none());
        let next = self.he_next(after);
        self.link(after, new_h);
        self.link(new_h, next);
        self.halfedges[new_h].face = Some(face);
    }

    /// Unlinks the inclusive range `[from, to]` from the boundary of
    /// `face`. The removed half edges are joined into their own cycle with
    /// their face pointers cleared; the face's entry half edge is moved to
    /// a surviving half edge.
    pub(crate) fn remove_from_boundary(
        &mut self,
        face: FaceId,
        from: HalfEdgeId,
        to: HalfEdgeId,
    ) {
        debug_assert_eq!(self.halfedges[from].face, Some(face));
        debug_assert_eq!(self.halfedges[to].face, Some(face));

        let before = self.he_prev(from);
        let after = self.he_next(to);

        // Clear faces along the removed range.
        let mut current = from;
        loop {
            self.halfedges[current].face = None;
            if current == to {
                break;
            }
            current = self.he_next(current);
        }

        self.link(before, after);
        self.link(to, from);

        if self.halfedges[after].face == Some(face) {
            self.faces[face].boundary = after;
        }
    }

    pub(crate) fn update_bounds(&mut self) {
        let mut bounds = Aabb::empty();
        for vertex in self.vertices.values() {
            bounds = bounds.merged_with(vertex.position);
        }
        self.bounds = bounds;
    }

    pub(crate) fn merge_bounds_with(&mut self, point: DVec3) {
        if self.vertices.len() <= 1 {
            self.bounds = Aabb::from_point(point);
        } else {
            self.bounds = self.bounds.merged_with(point);
        }
    }

    /// Snaps all vertex coordinates to `decimals` decimal places where they
    /// are within `epsilon`, cancelling accumulated float drift.
    pub fn correct_vertex_positions(&mut self, decimals: u32, epsilon: f64) {
        for vertex in self.vertices.values_mut() {
            vertex.position = correct_vec(vertex.position, decimals, epsilon);
        }
        self.update_bounds();
    }

    /// [`Polyhedron::correct_vertex_positions`] with the default tolerance.
    pub fn correct_vertex_positions_default(&mut self) {
        self.correct_vertex_positions(0, CORRECT_EPSILON);
    }

    /* ==================== */
    /*   Invariant checks   */
    /* ==================== */

    /// V - E + F = 2 must hold for any closed polyhedron.
    pub fn check_euler_characteristic(&self) -> bool {
        if !self.is_polyhedron() {
            return true;
        }
        let v = self.vertices.len() as i64;
        let e = self.edges.len() as i64;
        let f = self.faces.len() as i64;
        v - e + f == 2
    }

    /// Every edge has both half edges and they point back at it.
    pub fn check_edges(&self) -> bool {
        self.edges.iter().all(|(id, edge)| {
            if self.halfedges[edge.first].edge != Some(id) {
                return false;
            }
            match edge.second {
                Some(second) => {
                    self.halfedges[second].edge == Some(id)
                        && self.he_origin(edge.first) != self.he_origin(second)
                        && self.he_origin(edge.first) == self.he_destination(second)
                        && self.he_origin(second) == self.he_destination(edge.first)
                }
                None => !self.is_polyhedron(),
            }
        })
    }

    /// Face pointers and next/prev links of every boundary are consistent.
    pub fn check_face_boundaries(&self) -> bool {
        self.faces.keys().all(|face| {
            let halfedges = self.face_halfedges(face);
            halfedges.len() >= 3
                && halfedges.iter().all(|&h| {
                    self.halfedges[h].face == Some(face)
                        && self.he_prev(self.he_next(h)) == h
                })
        })
    }

    /// Each vertex's leaving half edge leaves it.
    pub fn check_leaving_edges(&self) -> bool {
        self.vertices.iter().all(|(id, vertex)| match vertex.leaving {
            Some(h) => self.halfedges[h].origin == id,
            None => self.is_point(),
        })
    }

    /// No vertex lies strictly above any face plane.
    pub fn check_convex(&self) -> bool {
        self.faces.keys().all(|face| {
            let plane = self.face_plane(face);
            self.vertices
                .values()
                .all(|v| plane.point_status(v.position) != PointStatus::Above)
        })
    }

    /// No two neighbouring faces are coplanar.
    pub fn check_no_coplanar_faces(&self) -> bool {
        self.edges.values().all(|edge| {
            let first = match self.halfedges[edge.first].face {
                Some(f) => f,
                None => return true,
            };
            let second = match edge.second.and_then(|h| self.halfedges[h].face) {
                Some(f) => f,
                None => return true,
            };
            !self.face_coplanar(first, second)
        })
    }

    /// No two faces share more than one edge.
    pub fn check_no_shared_edges(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.edges.values().all(|edge| {
            let first = self.halfedges[edge.first].face;
            let second = edge.second.and_then(|h| self.halfedges[h].face);
            match (first, second) {
                (Some(a), Some(b)) => seen.insert(if a < b { (a, b) } else { (b, a) }),
                _ => true,
            }
        })
    }

    /// The conjunction of all structural invariants for the current state.
    pub fn check_invariant(&self) -> bool {
        match (self.is_empty(), self.is_point(), self.is_edge()) {
            (true, _, _) => self.edges.is_empty() && self.faces.is_empty(),
            (_, true, _) => self.edges.is_empty() && self.faces.is_empty(),
            (_, _, true) => self.edges.len() == 1 && self.faces.is_empty(),
            _ if self.is_polygon() => {
                self.check_face_boundaries() && self.check_leaving_edges()
            }
            _ => {
                self.check_euler_characteristic()
                    && self.is_closed()
                    && self.check_edges()
                    && self.check_face_boundaries()
                    && self.check_leaving_edges()
                    && self.check_convex()
                    && self.check_no_shared_edges()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cube() -> Polyhedron {
        Polyhedron::from_bounds(&Aabb::from_min_max(DVec3::splat(-1.0), DVec3::splat(1.0)))
    }

    #[test]
    fn test_face_ring_matching() {
        let cube = cube();
        let top = [
            DVec3::new(-1.0, -1.0, 1.0),
            DVec3::new(1.0, -1.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(-1.0, 1.0, 1.0),
        ];
        assert!(cube.has_face(&top, ALMOST_ZERO));

        let not_a_face = [
            DVec3::new(-1.0, -1.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(1.0, -1.0, 1.0),
            DVec3::new(-1.0, 1.0, 1.0),
        ];
        assert!(!cube.has_face(&not_a_face, ALMOST_ZERO));
    }

    #[test]
    fn test_face_normals_point_outward() {
        let cube = cube();
        for face in cube.face_ids().collect::<Vec<_>>() {
            let normal = cube.face_normal(face);
            let center = cube.face_center(face);
            // The normal must point away from the cube center.
            assert!(normal.dot(center) > 0.0, "face normal points inward");
        }
    }

    #[test]
    fn test_pick_face() {
        let cube = cube();
        let ray = Ray::new(DVec3::new(5.0, 0.0, 0.0), DVec3::new(-1.0, 0.0, 0.0));
        let hit = cube.pick_face(&ray).unwrap();
        assert!((hit.distance - 4.0).abs() < ALMOST_ZERO);
        let normal = cube.face_normal(hit.face);
        assert!(normal.abs_diff_eq(DVec3::X, ALMOST_ZERO));

        let miss = Ray::new(DVec3::new(5.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0));
        assert!(cube.pick_face(&miss).is_none());
    }

    #[test]
    fn test_correct_vertex_positions() {
        let mut poly = Polyhedron::<(), ()>::from_points(&[
            DVec3::new(0.0000001, 0.0, 0.0),
            DVec3::new(0.9999999, 0.0, 0.0),
        ]);
        poly.correct_vertex_positions_default();
        assert!(poly.has_vertex(DVec3::ZERO, ALMOST_ZERO));
        assert!(poly.has_vertex(DVec3::X, ALMOST_ZERO));
    }
}
