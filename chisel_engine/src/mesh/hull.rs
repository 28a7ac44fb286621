// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use glam::DVec3;
use smallvec::smallvec;

use chisel_commons::geom::{Plane, PointStatus, Segment};
use chisel_commons::math::{colinear, ALMOST_ZERO};
use chisel_commons::utils::SVec;

use super::{Callbacks, EdgeId, FaceId, HalfEdgeId, NullCallbacks, Payload, Polyhedron, VertexId};

/* ======== */
/*   Seam   */
/* ======== */

/// A directed cycle of edges separating the faces of a polyhedron into two
/// sets. Seam edges are consecutive: each edge's second vertex is the
/// previous edge's first vertex. They are oriented such that the first
/// face satisfies the splitting criterion and the second does not.
#[derive(Debug, Default, Clone)]
pub(crate) struct Seam {
    edges: Vec<EdgeId>,
}

impl Seam {
    pub fn push<VP: Payload, FP: Payload>(
        &mut self,
        poly: &Polyhedron<VP, FP>,
        edge: EdgeId,
    ) {
        debug_assert!(self.edges.last() != Some(&edge));
        debug_assert!(self.connects(poly, edge));
        self.edges.push(edge);
    }

    fn connects<VP: Payload, FP: Payload>(
        &self,
        poly: &Polyhedron<VP, FP>,
        edge: EdgeId,
    ) -> bool {
        match self.edges.last() {
            None => true,
            Some(&last) => poly.edge_first_vertex(last) == poly.edge_second_vertex(edge),
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn first(&self) -> EdgeId {
        self.edges[0]
    }

    pub fn second(&self) -> EdgeId {
        self.edges[1]
    }

    pub fn last(&self) -> EdgeId {
        *self.edges.last().expect("seam is empty")
    }

    pub fn get(&self, index: usize) -> EdgeId {
        self.edges[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.iter().copied()
    }

    /// Moves the front edge to the back.
    pub fn shift(&mut self) {
        self.edges.rotate_left(1);
    }

    /// Shifts until the criterion accepts the seam, at most one full
    /// rotation. Returns whether the criterion was satisfied.
    pub fn shift_until(&mut self, criterion: impl Fn(&Seam) -> bool) -> bool {
        for _ in 0..self.edges.len() {
            if criterion(self) {
                return true;
            }
            self.shift();
        }
        false
    }

    /// Replaces the edges in `[0, end)` with a single edge.
    pub fn replace(&mut self, end: usize, replacement: EdgeId) {
        self.edges.drain(0..end);
        self.edges.insert(0, replacement);
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    /// A well formed seam visits each vertex once. Multiple loops indicate
    /// numerical degeneracy near an existing vertex.
    pub fn has_multiple_loops<VP: Payload, FP: Payload>(
        &self,
        poly: &Polyhedron<VP, FP>,
    ) -> bool {
        let mut visited = HashSet::new();
        self.edges
            .iter()
            .any(|&e| !visited.insert(poly.edge_second_vertex(e)))
    }
}

/* ========================== */
/*   Splitting criteria       */
/* ========================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchResult {
    First,
    Second,
    Both,
    Neither,
}

/// Decides which faces stay on the retained side of a seam.
pub(crate) trait SplitCriterion<VP: Payload, FP: Payload> {
    fn matches(&self, poly: &Polyhedron<VP, FP>, face: FaceId) -> bool;

    fn matches_edge(&self, poly: &Polyhedron<VP, FP>, edge: EdgeId) -> MatchResult {
        let first = matches!(poly.edge_first_face(edge), Some(f) if self.matches(poly, f));
        let second = matches!(poly.edge_second_face(edge), Some(f) if self.matches(poly, f));
        match (first, second) {
            (true, true) => MatchResult::Both,
            (true, false) => MatchResult::First,
            (false, true) => MatchResult::Second,
            (false, false) => MatchResult::Neither,
        }
    }

    /// Finds an edge on the border between matching and non-matching
    /// faces, flipped so its first face matches.
    fn find_first_splitting_edge(&self, poly: &mut Polyhedron<VP, FP>) -> Option<EdgeId> {
        let candidates: Vec<EdgeId> = poly.edge_ids().collect();
        for edge in candidates {
            match self.matches_edge(poly, edge) {
                MatchResult::First => return Some(edge),
                MatchResult::Second => {
                    poly.edge_flip(edge);
                    return Some(edge);
                }
                MatchResult::Both | MatchResult::Neither => {}
            }
        }
        None
    }

    /// Finds the next seam edge in counter clockwise orientation by
    /// rotating around the first vertex of `last`.
    fn find_next_splitting_edge(
        &self,
        poly: &mut Polyhedron<VP, FP>,
        last: EdgeId,
    ) -> Option<EdgeId> {
        let mut halfedge = poly.he_prev(poly.edge(last).first());
        let mut next = poly.halfedge(halfedge).edge().expect("half edge has no edge");

        loop {
            match self.matches_edge(poly, next) {
                MatchResult::First => return Some(next),
                MatchResult::Second => {
                    poly.edge_flip(next);
                    return Some(next);
                }
                _ => {}
            }
            if next == last {
                return None;
            }
            halfedge = poly.he_prev(poly.he_twin(halfedge));
            next = poly.halfedge(halfedge).edge().expect("half edge has no edge");
        }
    }
}

/// Faces that cannot see `point` are retained; a face sees the point when
/// it lies strictly above the face's plane.
pub(crate) struct VisibilityCriterion {
    pub point: DVec3,
}

impl<VP: Payload, FP: Payload> SplitCriterion<VP, FP> for VisibilityCriterion {
    fn matches(&self, poly: &Polyhedron<VP, FP>, face: FaceId) -> bool {
        poly.face_point_status(face, self.point) == PointStatus::Below
    }
}

/// Faces not incident to `vertex` are retained.
pub(crate) struct ConnectivityCriterion {
    pub vertex: VertexId,
}

impl<VP: Payload, FP: Payload> SplitCriterion<VP, FP> for ConnectivityCriterion {
    fn matches(&self, poly: &Polyhedron<VP, FP>, face: FaceId) -> bool {
        !poly.vertex_incident(self.vertex, face)
    }
}

/// Faces with at least one vertex below `plane` are retained.
pub(crate) struct PlaneCriterion {
    pub plane: Plane,
}

impl<VP: Payload, FP: Payload> SplitCriterion<VP, FP> for PlaneCriterion {
    fn matches(&self, poly: &Polyhedron<VP, FP>, face: FaceId) -> bool {
        poly.face_halfedges(face).iter().any(|&h| {
            self.plane.point_status(poly.position(poly.he_origin(h))) == PointStatus::Below
        })
    }
}

/* ========================== */
/*   Convex hull insertion    */
/* ========================== */

impl<VP: Payload, FP: Payload> Polyhedron<VP, FP> {
    pub fn add_points(&mut self, points: impl IntoIterator<Item = DVec3>) {
        for point in points {
            self.add_point(point);
        }
    }

    pub fn add_points_with<C: Callbacks<VP, FP>>(
        &mut self,
        points: impl IntoIterator<Item = DVec3>,
        callback: &mut C,
    ) {
        for point in points {
            self.add_point_with(point, callback);
        }
    }

    /// Adds a point to the convex hull. Returns the vertex at the point's
    /// position, or `None` if the point lies inside the hull or coincides
    /// with existing geometry.
    pub fn add_point(&mut self, position: DVec3) -> Option<VertexId> {
        self.add_point_with(position, &mut NullCallbacks)
    }

    #[profiling::function]
    pub fn add_point_with<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> Option<VertexId> {
        let result = match self.vertex_count() {
            0 => Some(self.add_first_point(position, callback)),
            1 => self.add_second_point(position, callback),
            2 => self.add_third_point(position, callback),
            _ => self.add_further_point(position, callback),
        };
        if let Some(vertex) = result {
            self.merge_bounds_with(position);
            callback.vertex_was_added(self, vertex);
        }
        result
    }

    /// Adds all vertices of `other` to this hull.
    pub fn merge(&mut self, other: &Polyhedron<VP, FP>) {
        self.merge_with(other, &mut NullCallbacks);
    }

    pub fn merge_with<C: Callbacks<VP, FP>>(
        &mut self,
        other: &Polyhedron<VP, FP>,
        callback: &mut C,
    ) {
        self.add_points_with(other.vertex_positions(), callback);
    }

    fn add_first_point<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> VertexId {
        debug_assert!(self.is_empty());
        let vertex = self.alloc_vertex(position);
        callback.vertex_was_created(self, vertex);
        vertex
    }

    fn add_second_point<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> Option<VertexId> {
        debug_assert!(self.is_point());

        let only_vertex = self.vertex_ids().next().unwrap();
        if position == self.position(only_vertex) {
            return None;
        }

        let new_vertex = self.alloc_vertex(position);
        callback.vertex_was_created(self, new_vertex);

        let h1 = self.alloc_halfedge(only_vertex);
        let h2 = self.alloc_halfedge(new_vertex);
        // In the edge state the two half edges are their own loops.
        self.link(h1, h1);
        self.link(h2, h2);
        self.alloc_edge(h1, Some(h2));
        Some(new_vertex)
    }

    fn add_third_point<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> Option<VertexId> {
        debug_assert!(self.is_edge());

        let mut vertices = self.vertex_ids();
        let v1 = vertices.next().unwrap();
        let v2 = vertices.next().unwrap();
        drop(vertices);

        if colinear(self.position(v1), self.position(v2), position) {
            self.add_colinear_third_point(position)
        } else {
            Some(self.add_non_colinear_third_point(position, callback))
        }
    }

    /// A collinear point either lies on the existing segment or extends it
    /// by replacing the endpoint it is farther from.
    fn add_colinear_third_point(&mut self, position: DVec3) -> Option<VertexId> {
        let mut vertices = self.vertex_ids();
        let v1 = vertices.next().unwrap();
        let v2 = vertices.next().unwrap();
        drop(vertices);
        let p1 = self.position(v1);
        let p2 = self.position(v2);

        if Segment::new(p1, p2).contains(position, ALMOST_ZERO) {
            return None;
        }
        if Segment::new(position, p2).contains(p1, ALMOST_ZERO) {
            self.vertices[v1].position = position;
            return Some(v1);
        }
        debug_assert!(Segment::new(position, p1).contains(p2, ALMOST_ZERO));
        self.vertices[v2].position = position;
        Some(v2)
    }

    fn add_non_colinear_third_point<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> VertexId {
        let mut vertices = self.vertex_ids();
        let v1 = vertices.next().unwrap();
        let v2 = vertices.next().unwrap();
        drop(vertices);

        let h1 = self.vertex(v1).leaving().unwrap();
        let h2 = self.vertex(v2).leaving().unwrap();
        debug_assert_eq!(self.he_next(h1), h1);
        debug_assert_eq!(self.he_next(h2), h2);

        let v3 = self.alloc_vertex(position);
        let h3 = self.alloc_halfedge(v3);

        // The existing edge keeps only the half edge at v1; the other two
        // edges of the first triangle are created half open.
        let e1 = self.edge_ids().next().unwrap();
        self.edge_make_first(e1, h1);
        self.edge_unset_second(e1);

        let face = self.make_face(&[h1, h2, h3]);

        self.alloc_edge(h2, None);
        self.alloc_edge(h3, None);

        callback.vertex_was_created(self, v3);
        callback.face_was_created(self, face);
        v3
    }

    fn add_further_point<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> Option<VertexId> {
        if self.is_polygon() {
            self.add_further_point_to_polygon(position, callback)
        } else {
            self.add_further_point_to_polyhedron(position, callback)
        }
    }

    /// A point added to a polygon either extends the polygon (coplanar) or
    /// turns it into a polyhedron.
    fn add_further_point_to_polygon<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> Option<VertexId> {
        let face = self.face_ids().next().unwrap();
        match self.face_point_status(face, position) {
            PointStatus::Inside => self.add_point_to_polygon(position, callback),
            PointStatus::Above => {
                self.face_flip(face);
                callback.face_was_flipped(self, face);
                Some(self.make_polyhedron(position, callback))
            }
            PointStatus::Below => Some(self.make_polyhedron(position, callback)),
        }
    }

    /// Extends the polygon with a coplanar point by replacing the boundary
    /// arc visible from the point with two new edges.
    fn add_point_to_polygon<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> Option<VertexId> {
        debug_assert!(self.is_polygon());

        let face = self.face_ids().next().unwrap();
        let face_normal = callback.plane(self, face).normal;

        let mut first_visible = None;
        let mut last_visible = None;

        let first_edge = self.face(face).boundary();
        let mut current = first_edge;
        loop {
            let prev = self.he_prev(current);
            let next = self.he_next(current);
            let prev_status = self.he_point_status(prev, face_normal, position);
            let cur_status = self.he_point_status(current, face_normal, position);
            let next_status = self.he_point_status(next, face_normal, position);

            // A point on the boundary is not added.
            if cur_status == PointStatus::Inside {
                let start = self.position(self.he_origin(current));
                let end = self.position(self.he_destination(current));
                if Segment::new(start, end).contains(position, ALMOST_ZERO) {
                    return None;
                }
            }

            if prev_status == PointStatus::Below && cur_status != PointStatus::Below {
                first_visible = Some(current);
            }
            if cur_status != PointStatus::Below && next_status == PointStatus::Below {
                last_visible = Some(current);
            }

            current = next;
            if current == first_edge || (first_visible.is_some() && last_visible.is_some()) {
                break;
            }
        }

        // No visible arc: the point is contained in the polygon.
        let (first_visible, last_visible) = match (first_visible, last_visible) {
            (Some(f), Some(l)) => (f, l),
            _ => return None,
        };

        let new_vertex = self.alloc_vertex(position);
        let h1 = self.alloc_halfedge(self.he_origin(first_visible));
        let h2 = self.alloc_halfedge(new_vertex);

        self.insert_into_boundary_after(face, last_visible, h1);
        self.insert_into_boundary_after(face, h1, h2);
        self.remove_from_boundary(face, first_visible, last_visible);

        self.set_as_leaving(h1);

        self.alloc_edge(h1, None);
        self.alloc_edge(h2, None);

        // Delete the detached arc: its edges, interior vertices and half
        // edges.
        let mut current = first_visible;
        loop {
            let next = self.he_next(current);

            let edge = self.halfedge(current).edge().expect("arc edge missing");
            self.remove_edge_entity(edge);

            if current != first_visible {
                let origin = self.he_origin(current);
                callback.vertex_will_be_deleted(self, origin);
                self.remove_vertex_entity(origin);
            }
            self.halfedges.remove(current);

            current = next;
            if current == first_visible {
                break;
            }
        }

        callback.vertex_was_created(self, new_vertex);
        callback.face_did_change(self, face);
        Some(new_vertex)
    }

    /// Turns the polygon into a polyhedron by weaving a cone from the
    /// polygon boundary to the new, non-coplanar point.
    fn make_polyhedron<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> VertexId {
        debug_assert!(self.is_polygon());

        let face = self.face_ids().next().unwrap();
        let mut seam = Seam::default();
        let first = self.face(face).boundary();
        let mut current = first;
        loop {
            let edge = self.halfedge(current).edge().expect("boundary edge missing");
            seam.push(self, edge);
            // The seam must be counter clockwise, so iterate in reverse.
            current = self.he_prev(current);
            if current == first {
                break;
            }
        }

        self.add_point_to_polyhedron(position, seam, callback)
    }

    /// Adds a point that lies outside the polyhedron: removes all faces
    /// visible from the point and weaves a new cap connecting the point to
    /// the seam.
    fn add_further_point_to_polyhedron<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        callback: &mut C,
    ) -> Option<VertexId> {
        debug_assert!(self.is_polyhedron());
        if self.contains_point_with(position, callback) {
            return None;
        }

        let seam = self.create_seam(&VisibilityCriterion { point: position });

        // An empty or multi-loop seam indicates the point is so close to
        // existing geometry that no reliable seam exists; treat it as
        // inside.
        if seam.is_empty() || seam.has_multiple_loops(self) {
            return None;
        }

        self.split(&seam, callback);
        Some(self.add_point_to_polyhedron(position, seam, callback))
    }

    fn add_point_to_polyhedron<C: Callbacks<VP, FP>>(
        &mut self,
        position: DVec3,
        seam: Seam,
        callback: &mut C,
    ) -> VertexId {
        debug_assert!(seam.len() >= 3);
        debug_assert!(!seam.has_multiple_loops(self));
        let vertex = self.weave(seam, position, callback);
        debug_assert!(self.is_polyhedron());
        vertex
    }

    /* ================== */
    /*   Seam machinery   */
    /* ================== */

    pub(crate) fn create_seam(&mut self, criterion: &impl SplitCriterion<VP, FP>) -> Seam {
        let mut seam = Seam::default();

        if let Some(first) = criterion.find_first_splitting_edge(self) {
            let mut current = first;
            loop {
                seam.push(self, current);
                current = match criterion.find_next_splitting_edge(self, current) {
                    Some(next) => next,
                    // No continuation: the criterion does not describe a
                    // closed loop. Report the degeneracy as an empty seam.
                    None => return Seam::default(),
                };
                if current == first {
                    break;
                }
            }
        }

        seam
    }

    /// Splits the polyhedron along the seam, deleting all faces, edges and
    /// vertices on the seam's second side. The seam edges remain half open
    /// until a cap is woven or sealed over them.
    pub(crate) fn split<C: Callbacks<VP, FP>>(&mut self, seam: &Seam, callback: &mut C) {
        debug_assert!(seam.len() >= 3);
        debug_assert!(!seam.has_multiple_loops(self));

        // Remember the doomed side, then open every seam edge. Marking the
        // first half edge as leaving protects the seam vertices from
        // deletion below.
        let doomed = self.edge(seam.first()).second().expect("seam edge not full");
        for edge in seam.iter() {
            self.edge_set_first_as_leaving(edge);
            self.edge_unset_second(edge);
        }

        let mut visited = HashSet::new();
        let mut dead_vertices = Vec::new();
        self.delete_faces(doomed, &mut visited, &mut dead_vertices, callback);
        for vertex in dead_vertices {
            self.remove_vertex_entity(vertex);
        }
    }

    /// Deletes the face containing `first` and recursively every face
    /// reachable across fully specified edges. Vertices whose leaving half
    /// edge lies in the doomed region are collected for deferred removal.
    fn delete_faces<C: Callbacks<VP, FP>>(
        &mut self,
        first: HalfEdgeId,
        visited: &mut HashSet<FaceId>,
        dead_vertices: &mut Vec<VertexId>,
        callback: &mut C,
    ) {
        let face = self.halfedge(first).face().expect("half edge has no face");
        if !visited.insert(face) {
            return;
        }
        callback.face_will_be_deleted(self, face);

        let chain = self.face_halfedges(face);
        for &current in &chain {
            if let Some(edge) = self.halfedge(current).edge() {
                if self.edge(edge).fully_specified() {
                    let twin = self.edge_twin(edge, current);
                    self.delete_faces(twin, visited, dead_vertices, callback);
                }
                if self.edge(edge).fully_specified() {
                    // The neighbour is deleted by one of our callers; open
                    // the edge so it is not considered again.
                    self.edge_make_second(edge, current);
                    self.edge_unset_second(edge);
                } else {
                    // The neighbour is already gone; the edge dies with us.
                    self.halfedges[current].edge = None;
                    self.remove_edge_entity(edge);
                }
            }

            let origin = self.he_origin(current);
            if self.vertex(origin).leaving() == Some(current) {
                // Seam vertices had a surviving half edge set as leaving
                // before the split, so anything still pointing here dies.
                callback.vertex_will_be_deleted(self, origin);
                dead_vertices.push(origin);
            }
        }

        self.remove_face_entity(face);
        for &h in &chain {
            self.halfedges.remove(h);
        }
    }

    /// Closes the seam with a single polygon. All seam vertices must be
    /// coplanar.
    pub(crate) fn seal_with_single_polygon<C: Callbacks<VP, FP>>(
        &mut self,
        seam: &Seam,
        callback: &mut C,
    ) {
        debug_assert!(seam.len() >= 3);
        debug_assert!(!seam.has_multiple_loops(self));

        let mut boundary: SVec<HalfEdgeId> = SVec::with_capacity(seam.len());
        for edge in seam.iter() {
            debug_assert!(!self.edge(edge).fully_specified());
            let origin = self.edge_second_vertex(edge);
            let boundary_edge = self.alloc_halfedge(origin);
            boundary.push(boundary_edge);
            self.edge_set_second(edge, boundary_edge);
        }

        let face = self.make_face(&boundary);
        callback.face_was_created(self, face);
    }

    /// Accepts a seam rotation if the plane through the first three seam
    /// vertices is a valid cap: the first two edges come from different
    /// faces, the seam's far end lies strictly below the plane, and no
    /// remaining seam vertex lies above it.
    fn seal_shift_ok(&self, seam: &Seam) -> bool {
        let first = seam.first();
        let second = seam.second();

        if self.edge_first_face(first) == self.edge_first_face(second) {
            return false;
        }

        let v1 = self.position(self.edge_first_vertex(first));
        let v2 = self.position(self.edge_second_vertex(first));
        let v3 = self.position(self.edge_first_vertex(second));
        let plane = match Plane::from_points(v1, v2, v3) {
            Some(plane) => plane,
            None => return false,
        };

        let v4 = self.position(self.edge_second_vertex(seam.last()));
        if plane.point_status(v4) != PointStatus::Below {
            return false;
        }

        if seam.len() >= 5 {
            for i in 2..seam.len() - 1 {
                let vertex = self.position(self.edge_first_vertex(seam.get(i)));
                if plane.point_status(vertex) == PointStatus::Above {
                    return false;
                }
            }
        }
        true
    }

    /// Closes the seam with as few convex polygons as possible: walk the
    /// seam, absorb further edges while they stay coplanar with the first
    /// triangle, close one face, and repeat until the seam is empty.
    pub(crate) fn seal_with_multiple_polygons<C: Callbacks<VP, FP>>(
        &mut self,
        mut seam: Seam,
        callback: &mut C,
    ) {
        debug_assert!(seam.len() >= 3);
        debug_assert!(!seam.has_multiple_loops(self));

        if seam.len() == 3 {
            self.seal_with_single_polygon(&seam, callback);
            return;
        }

        while !seam.is_empty() {
            debug_assert!(seam.len() >= 3);

            if seam.len() > 3 {
                seam.shift_until(|s| self.seal_shift_ok(s));
            }

            let first_edge = seam.get(0);
            let second_edge = seam.get(1);

            let first_boundary = self.alloc_halfedge(self.edge_second_vertex(first_edge));
            let second_boundary = self.alloc_halfedge(self.edge_second_vertex(second_edge));
            let mut boundary: SVec<HalfEdgeId> = smallvec![first_boundary, second_boundary];

            self.edge_set_second(first_edge, first_boundary);
            self.edge_set_second(second_edge, second_boundary);

            let v1 = self.position(self.edge_first_vertex(first_edge));
            let v2 = self.position(self.edge_second_vertex(first_edge));
            let v3 = self.position(self.edge_first_vertex(second_edge));
            let plane = Plane::from_points(v1, v2, v3).expect("cap plane is degenerate");

            // Absorb as many further edges as stay on the cap plane.
            let mut last_vertex = self.edge_first_vertex(second_edge);
            let mut end = 2;
            while end < seam.len() {
                let current = seam.get(end);
                let status =
                    plane.point_status(self.position(self.edge_first_vertex(current)));
                if status != PointStatus::Inside {
                    break;
                }
                let current_boundary =
                    self.alloc_halfedge(self.edge_second_vertex(current));
                boundary.push(current_boundary);
                self.edge_set_second(current, current_boundary);
                last_vertex = self.edge_first_vertex(current);
                end += 1;
            }

            if end < seam.len() {
                // The cap is partial: close it with a new edge that becomes
                // part of the remaining seam.
                let closing = self.alloc_halfedge(last_vertex);
                boundary.push(closing);
                let new_edge = self.alloc_edge(closing, None);
                seam.replace(end, new_edge);
            } else {
                seam.clear();
            }

            let face = self.make_face(&boundary);
            callback.face_was_created(self, face);
        }
    }

    /// Accepts a seam rotation for weaving when the cap face started at the
    /// seam's last edge will not be coplanar with the face of its first
    /// edge.
    fn weave_shift_ok(&self, seam: &Seam, position: DVec3) -> bool {
        let last = seam.last();
        let first = seam.first();

        let v1 = self.edge_first_vertex(last);
        let v2 = self.edge_second_vertex(last);
        let v3 = self.edge_first_vertex(first);
        debug_assert!(v3 != v1);
        debug_assert!(v3 != v2);

        let last_plane =
            match Plane::from_points(position, self.position(v1), self.position(v2)) {
                Some(plane) => plane,
                None => return false,
            };
        last_plane.point_status(self.position(v3)) == PointStatus::Below
    }

    /// Weaves a cap of new faces connecting `position` to every seam edge.
    /// Consecutive seam edges that are coplanar with the current cap face
    /// extend it instead of starting a new triangle, so the cap consists of
    /// general convex polygons.
    #[profiling::function]
    pub(crate) fn weave<C: Callbacks<VP, FP>>(
        &mut self,
        mut seam: Seam,
        position: DVec3,
        callback: &mut C,
    ) -> VertexId {
        debug_assert!(seam.len() >= 3);
        debug_assert!(!seam.has_multiple_loops(self));

        let shifted = seam.shift_until(|s| self.weave_shift_ok(s, position));
        debug_assert!(shifted);

        let top = self.alloc_vertex(position);

        let mut first: Option<HalfEdgeId> = None;
        let mut last: Option<HalfEdgeId> = None;

        let mut i = 0;
        while i < seam.len() {
            let edge = seam.get(i);
            i += 1;

            debug_assert!(!self.edge(edge).fully_specified());
            let v1 = self.edge_second_vertex(edge);
            let v2 = self.edge_first_vertex(edge);

            let h1 = self.alloc_halfedge(top);
            let h2 = self.alloc_halfedge(v1);
            let h3 = self.alloc_halfedge(v2);
            let mut h = h3;

            let mut boundary: SVec<HalfEdgeId> = smallvec![h1, h2, h3];
            self.edge_set_second(edge, h2);

            if i < seam.len() {
                let plane = Plane::from_points(
                    position,
                    self.position(v2),
                    self.position(v1),
                )
                .expect("cap plane is degenerate");

                // Extend the current face while the next seam edge stays in
                // its plane.
                while i < seam.len() {
                    let next = seam.get(i);
                    let next_pos = self.position(self.edge_first_vertex(next));
                    if plane.point_status(next_pos) != PointStatus::Inside {
                        break;
                    }
                    self.edge_set_second(next, h);
                    let v = self.edge_first_vertex(next);
                    h = self.alloc_halfedge(v);
                    boundary.push(h);
                    i += 1;
                }
            }

            let face = self.make_face(&boundary);
            callback.face_was_created(self, face);

            if let Some(last) = last {
                self.alloc_edge(h1, Some(last));
            }
            if first.is_none() {
                first = Some(h1);
            }
            last = Some(h);
        }

        let first = first.expect("seam was empty");
        let last = last.expect("seam was empty");
        debug_assert!(self.halfedge(first).face() != self.halfedge(last).face());
        self.alloc_edge(first, Some(last));

        callback.vertex_was_created(self, top);
        top
    }

    /* ==================== */
    /*   Vertex removal     */
    /* ==================== */

    /// Removes a vertex, reshaping the polyhedron into the convex hull of
    /// the remaining vertices.
    pub fn remove_vertex(&mut self, vertex: VertexId) {
        self.remove_vertex_with(vertex, &mut NullCallbacks);
    }

    #[profiling::function]
    pub fn remove_vertex_with<C: Callbacks<VP, FP>>(
        &mut self,
        vertex: VertexId,
        callback: &mut C,
    ) {
        callback.vertex_will_be_removed(self, vertex);

        if self.is_point() {
            self.remove_single_vertex(vertex, callback);
        } else if self.is_edge() {
            self.remove_vertex_from_edge(vertex, callback);
        } else if self.is_polygon() {
            self.remove_vertex_from_polygon(vertex, callback);
        } else {
            self.remove_vertex_from_polyhedron(vertex, callback);
        }
        self.update_bounds();
    }

    pub fn remove_vertex_by_position(&mut self, position: DVec3) -> bool {
        match self.find_vertex_by_position(position, ALMOST_ZERO) {
            Some(vertex) => {
                self.remove_vertex(vertex);
                true
            }
            None => false,
        }
    }

    fn remove_single_vertex<C: Callbacks<VP, FP>>(&mut self, vertex: VertexId, callback: &mut C) {
        callback.vertex_will_be_deleted(self, vertex);
        self.remove_vertex_entity(vertex);
        debug_assert!(self.is_empty());
    }

    fn remove_vertex_from_edge<C: Callbacks<VP, FP>>(
        &mut self,
        vertex: VertexId,
        callback: &mut C,
    ) {
        let halfedge = self.vertex(vertex).leaving().unwrap();
        let edge = self.halfedge(halfedge).edge().unwrap();
        let twin = self.edge_twin(edge, halfedge);

        self.remove_halfedge(twin);
        self.remove_halfedge(halfedge);
        self.remove_edge_entity(edge);

        callback.vertex_will_be_deleted(self, vertex);
        self.remove_vertex_entity(vertex);
        debug_assert!(self.is_point());
    }

    fn remove_vertex_from_polygon<C: Callbacks<VP, FP>>(
        &mut self,
        vertex: VertexId,
        callback: &mut C,
    ) {
        if self.vertex_count() == 3 {
            self.remove_third_vertex_from_polygon(vertex, callback);
        } else {
            self.remove_further_vertex_from_polygon(vertex, callback);
        }
    }

    fn remove_third_vertex_from_polygon<C: Callbacks<VP, FP>>(
        &mut self,
        vertex: VertexId,
        callback: &mut C,
    ) {
        debug_assert_eq!(self.vertex_count(), 3);

        let removed = self.vertex(vertex).leaving().unwrap();
        let first_remaining = self.he_next(removed);
        let second_remaining = self.he_next(first_remaining);

        let remaining_edge = self.halfedge(first_remaining).edge().unwrap();
        let first_removed_edge = self.halfedge(removed).edge().unwrap();
        let second_removed_edge = self.halfedge(second_remaining).edge().unwrap();

        let face = self.halfedge(removed).face().unwrap();
        callback.face_will_be_deleted(self, face);

        // Detach the remaining half edges one by one so each becomes its
        // own loop, as the edge state requires.
        self.remove_from_boundary(face, first_remaining, first_remaining);
        self.remove_from_boundary(face, second_remaining, second_remaining);

        self.halfedges[removed].face = None;
        self.remove_face_entity(face);

        // The surviving edge is re-spanned by the two remaining half edges.
        self.halfedges[second_remaining].edge = None;
        self.edge_make_first(remaining_edge, first_remaining);
        self.edge_set_second(remaining_edge, second_remaining);
        self.set_as_leaving(second_remaining);

        self.remove_edge_entity(first_removed_edge);
        self.remove_edge_entity(second_removed_edge);
        self.remove_halfedge(removed);

        callback.vertex_will_be_deleted(self, vertex);
        self.remove_vertex_entity(vertex);
        debug_assert!(self.is_edge());
    }

    fn remove_further_vertex_from_polygon<C: Callbacks<VP, FP>>(
        &mut self,
        vertex: VertexId,
        callback: &mut C,
    ) {
        debug_assert!(self.is_polygon() && self.vertex_count() > 3);

        let outgoing = self.vertex(vertex).leaving().unwrap();
        let outgoing_edge = self.halfedge(outgoing).edge().unwrap();
        let face = self.halfedge(outgoing).face().unwrap();

        self.remove_from_boundary(face, outgoing, outgoing);
        self.remove_edge_entity(outgoing_edge);
        self.remove_halfedge(outgoing);

        callback.vertex_will_be_deleted(self, vertex);
        self.remove_vertex_entity(vertex);
        callback.face_did_change(self, face);
        debug_assert!(self.is_polygon());
    }

    fn remove_vertex_from_polyhedron<C: Callbacks<VP, FP>>(
        &mut self,
        vertex: VertexId,
        callback: &mut C,
    ) {
        debug_assert!(self.is_polyhedron());

        let seam = self.create_seam(&ConnectivityCriterion { vertex });
        self.split(&seam, callback);

        if self.face_count() > 1 {
            self.seal_with_multiple_polygons(seam, callback);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chisel_commons::geom::Aabb;

    fn cube_points() -> Vec<DVec3> {
        let mut points = Vec::new();
        for &x in &[-1.0, 1.0] {
            for &y in &[-1.0, 1.0] {
                for &z in &[-1.0, 1.0] {
                    points.push(DVec3::new(x, y, z));
                }
            }
        }
        points
    }

    #[test]
    fn test_states() {
        let mut poly = Polyhedron::<(), ()>::new();
        assert!(poly.is_empty());

        poly.add_point(DVec3::ZERO);
        assert!(poly.is_point());

        poly.add_point(DVec3::X);
        assert!(poly.is_edge());
        assert_eq!(poly.edge_count(), 1);

        poly.add_point(DVec3::Y);
        assert!(poly.is_polygon());
        assert_eq!(poly.vertex_count(), 3);
        assert_eq!(poly.edge_count(), 3);
        assert_eq!(poly.face_count(), 1);

        poly.add_point(DVec3::Z);
        assert!(poly.is_polyhedron());
        assert!(poly.is_closed());
        assert_eq!(poly.vertex_count(), 4);
        assert_eq!(poly.edge_count(), 6);
        assert_eq!(poly.face_count(), 4);
        assert!(poly.check_invariant());
    }

    #[test]
    fn test_duplicate_points_are_rejected() {
        let mut poly = Polyhedron::<(), ()>::new();
        poly.add_point(DVec3::ZERO);
        assert!(poly.add_point(DVec3::ZERO).is_none());

        poly.add_point(DVec3::X);
        // A point on the existing segment is not added.
        assert!(poly.add_point(DVec3::new(0.5, 0.0, 0.0)).is_none());
        assert!(poly.is_edge());
    }

    #[test]
    fn test_colinear_point_extends_edge() {
        let mut poly = Polyhedron::<(), ()>::new();
        poly.add_point(DVec3::ZERO);
        poly.add_point(DVec3::X);
        let extended = poly.add_point(DVec3::new(3.0, 0.0, 0.0));
        assert!(extended.is_some());
        assert!(poly.is_edge());
        assert!(poly.has_vertex(DVec3::ZERO, ALMOST_ZERO));
        assert!(poly.has_vertex(DVec3::new(3.0, 0.0, 0.0), ALMOST_ZERO));
        assert!(!poly.has_vertex(DVec3::X, ALMOST_ZERO));
    }

    #[test]
    fn test_coplanar_points_form_polygon() {
        let mut poly = Polyhedron::<(), ()>::new();
        poly.add_points([
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(2.0, 2.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
        ]);
        assert!(poly.is_polygon());
        assert_eq!(poly.vertex_count(), 4);
        assert_eq!(poly.edge_count(), 4);

        // An interior coplanar point is rejected.
        assert!(poly.add_point(DVec3::new(1.0, 1.0, 0.0)).is_none());
        // A boundary point is rejected as well.
        assert!(poly.add_point(DVec3::new(1.0, 0.0, 0.0)).is_none());
        // An exterior coplanar point extends the polygon.
        assert!(poly.add_point(DVec3::new(4.0, 1.0, 0.0)).is_some());
        assert!(poly.is_polygon());
        assert_eq!(poly.vertex_count(), 5);
    }

    #[test]
    fn test_polygon_point_replaces_covered_vertices() {
        let mut poly = Polyhedron::<(), ()>::new();
        poly.add_points([
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(2.0, 2.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
        ]);
        // A far point along the diagonal makes the corner at (2, 2)
        // redundant.
        assert!(poly.add_point(DVec3::new(6.0, 6.0, 0.0)).is_some());
        assert!(poly.is_polygon());
        assert_eq!(poly.vertex_count(), 4);
        assert!(!poly.has_vertex(DVec3::new(2.0, 2.0, 0.0), ALMOST_ZERO));
    }

    #[test]
    fn test_cube_from_corners() {
        let poly = Polyhedron::<(), ()>::from_points(&cube_points());
        assert_eq!(poly.vertex_count(), 8);
        assert_eq!(poly.edge_count(), 12);
        assert_eq!(poly.face_count(), 6);
        assert!(poly.check_invariant());
        assert_eq!(
            poly.bounds(),
            Aabb::from_min_max(DVec3::splat(-1.0), DVec3::splat(1.0))
        );
    }

    #[test]
    fn test_interior_point_is_rejected() {
        let mut poly = Polyhedron::<(), ()>::from_points(&cube_points());
        assert!(poly.add_point(DVec3::ZERO).is_none());
        assert!(poly.add_point(DVec3::new(0.9, 0.9, 0.9)).is_none());
        // Points on the surface are inside as well.
        assert!(poly.add_point(DVec3::new(1.0, 0.0, 0.0)).is_none());
        assert_eq!(poly.vertex_count(), 8);
    }

    #[test]
    fn test_exterior_point_grows_hull() {
        let mut poly = Polyhedron::<(), ()>::from_points(&cube_points());
        let apex = DVec3::new(0.0, 0.0, 3.0);
        assert!(poly.add_point(apex).is_some());
        assert!(poly.check_invariant());
        assert!(poly.has_vertex(apex, ALMOST_ZERO));
        // The apex sees only the top face; all four top corners remain.
        assert_eq!(poly.vertex_count(), 9);
        assert_eq!(poly.face_count(), 9);
        assert_eq!(poly.edge_count(), 16);
    }

    #[test]
    fn test_point_covering_vertices_removes_them() {
        let mut poly = Polyhedron::<(), ()>::from_points(&[
            DVec3::new(-1.0, -1.0, 0.0),
            DVec3::new(1.0, -1.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(-1.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
        ]);
        assert_eq!(poly.vertex_count(), 5);

        // A point straight above the apex makes the apex redundant.
        assert!(poly.add_point(DVec3::new(0.0, 0.0, 4.0)).is_some());
        assert!(poly.check_invariant());
        assert_eq!(poly.vertex_count(), 5);
        assert!(!poly.has_vertex(DVec3::new(0.0, 0.0, 1.0), ALMOST_ZERO));
    }

    #[test]
    fn test_merge() {
        let mut left = Polyhedron::<(), ()>::from_points(&[
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
        ]);
        assert!(left.is_polygon());

        let mut right = Polyhedron::<(), ()>::new();
        right.add_point(DVec3::new(0.0, 0.0, 2.0));
        assert!(right.is_point());

        left.merge(&right);
        assert!(left.is_polyhedron());
        assert_eq!(left.vertex_count(), 4);
        assert_eq!(left.edge_count(), 6);
        assert_eq!(left.face_count(), 4);
        assert!(left.check_invariant());
        assert_eq!(
            left.bounds(),
            Aabb::from_min_max(DVec3::ZERO, DVec3::new(2.0, 2.0, 2.0))
        );
    }

    #[test]
    fn test_remove_vertex_small_states() {
        let mut poly = Polyhedron::<(), ()>::new();
        let v = poly.add_point(DVec3::ZERO).unwrap();
        poly.remove_vertex(v);
        assert!(poly.is_empty());

        poly.add_point(DVec3::ZERO);
        let w = poly.add_point(DVec3::X).unwrap();
        poly.remove_vertex(w);
        assert!(poly.is_point());

        let mut triangle = Polyhedron::<(), ()>::from_points(&[
            DVec3::ZERO,
            DVec3::X,
            DVec3::Y,
        ]);
        let v = triangle.find_vertex_by_position(DVec3::X, ALMOST_ZERO).unwrap();
        triangle.remove_vertex(v);
        assert!(triangle.is_edge());
        assert_eq!(triangle.vertex_count(), 2);
    }

    #[test]
    fn test_remove_vertex_from_polygon() {
        let mut poly = Polyhedron::<(), ()>::from_points(&[
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(2.0, 2.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
        ]);
        let v = poly
            .find_vertex_by_position(DVec3::new(2.0, 2.0, 0.0), ALMOST_ZERO)
            .unwrap();
        poly.remove_vertex(v);
        assert!(poly.is_polygon());
        assert_eq!(poly.vertex_count(), 3);
        assert_eq!(poly.edge_count(), 3);
    }

    #[test]
    fn test_remove_vertex_from_polyhedron() {
        let mut poly = Polyhedron::<(), ()>::from_points(&cube_points());
        let apex = DVec3::new(0.0, 0.0, 3.0);
        poly.add_point(apex);
        assert_eq!(poly.vertex_count(), 9);

        let v = poly.find_vertex_by_position(apex, ALMOST_ZERO).unwrap();
        poly.remove_vertex(v);
        assert!(poly.check_invariant());
        assert_eq!(poly.vertex_count(), 8);
        assert_eq!(poly.edge_count(), 12);
        assert_eq!(poly.face_count(), 6);
        assert!(!poly.has_vertex(apex, ALMOST_ZERO));
    }

    #[test]
    fn test_hull_idempotence() {
        let points = cube_points();
        let mut poly = Polyhedron::<(), ()>::from_points(&points);
        for &p in &points {
            assert!(poly.add_point(p).is_none());
        }
        assert_eq!(poly.vertex_count(), 8);
        assert_eq!(poly.edge_count(), 12);
        assert_eq!(poly.face_count(), 6);
        assert!(poly.check_invariant());
    }
}
