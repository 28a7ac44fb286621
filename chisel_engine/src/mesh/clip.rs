// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use glam::DVec3;

use chisel_commons::geom::{Plane, PointStatus};

use super::hull::PlaneCriterion;
use super::{Callbacks, EdgeId, HalfEdgeId, NullCallbacks, Payload, Polyhedron};

/// The outcome of clipping a polyhedron with a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipStatus {
    /// The polyhedron lies entirely below or on the plane.
    Unchanged,
    /// The polyhedron lies entirely above or on the plane; clipping it
    /// would leave nothing. The polyhedron is not modified.
    Empty,
    /// The polyhedron was split and the part below the plane kept.
    Success,
}

impl ClipStatus {
    pub fn is_unchanged(self) -> bool {
        self == ClipStatus::Unchanged
    }

    pub fn is_empty(self) -> bool {
        self == ClipStatus::Empty
    }

    pub fn is_success(self) -> bool {
        self == ClipStatus::Success
    }
}

impl<VP: Payload, FP: Payload> Polyhedron<VP, FP> {
    /// Clips the polyhedron with a plane, keeping the part below it.
    pub fn clip(&mut self, plane: &Plane) -> ClipStatus {
        self.clip_with(plane, &mut NullCallbacks)
    }

    #[profiling::function]
    pub fn clip_with<C: Callbacks<VP, FP>>(
        &mut self,
        plane: &Plane,
        callback: &mut C,
    ) -> ClipStatus {
        if self.is_coplanar_to_any_face(plane, callback) {
            return ClipStatus::Unchanged;
        }

        let status = self.check_intersects(plane);
        if !status.is_success() {
            return status;
        }

        // Degenerate states cannot be split; the vertex classification
        // above already answered the containment question.
        if !self.is_polyhedron() {
            return ClipStatus::Unchanged;
        }

        // Now we know the polyhedron will be split.
        self.intersect_with_plane(plane, callback);
        let seam = self.create_seam(&PlaneCriterion { plane: *plane });
        self.split(&seam, callback);
        self.seal_with_single_polygon(&seam, callback);
        self.update_bounds();
        debug_assert!(self.check_invariant());

        ClipStatus::Success
    }

    /// Clips this polyhedron with every face plane of `other`.
    pub fn clip_by(&mut self, other: &Polyhedron<VP, FP>) -> ClipStatus {
        self.clip_by_with(other, &mut NullCallbacks)
    }

    pub fn clip_by_with<C: Callbacks<VP, FP>>(
        &mut self,
        other: &Polyhedron<VP, FP>,
        callback: &mut C,
    ) -> ClipStatus {
        let planes: Vec<Plane> = other
            .face_ids()
            .map(|face| callback.plane(other, face))
            .collect();

        let mut any_change = false;
        for plane in &planes {
            match self.clip_with(plane, callback) {
                ClipStatus::Empty => return ClipStatus::Empty,
                ClipStatus::Success => any_change = true,
                ClipStatus::Unchanged => {}
            }
        }
        if any_change {
            ClipStatus::Success
        } else {
            ClipStatus::Unchanged
        }
    }

    fn is_coplanar_to_any_face<C: Callbacks<VP, FP>>(
        &self,
        plane: &Plane,
        callback: &C,
    ) -> bool {
        self.face_ids()
            .any(|face| plane.is_equal(&callback.plane(self, face)))
    }

    /// Classifies all vertices against the plane to detect the trivial
    /// outcomes.
    pub(crate) fn check_intersects(&self, plane: &Plane) -> ClipStatus {
        let mut above = 0usize;
        let mut below = 0usize;
        let mut inside = 0usize;

        for vertex in self.vertex_ids() {
            match plane.point_status(self.position(vertex)) {
                PointStatus::Above => above += 1,
                PointStatus::Below => below += 1,
                PointStatus::Inside => inside += 1,
            }
        }

        let total = self.vertex_count();
        debug_assert_eq!(above + below + inside, total);
        if below + inside == total {
            ClipStatus::Unchanged
        } else if above + inside == total {
            ClipStatus::Empty
        } else {
            ClipStatus::Success
        }
    }

    /// Inserts vertices and edges along the intersection of the plane with
    /// the polyhedron's surface: splits every crossing edge, then splits
    /// every touched face so the intersection becomes a closed chain of
    /// edges lying on the plane.
    fn intersect_with_plane<C: Callbacks<VP, FP>>(&mut self, plane: &Plane, callback: &mut C) {
        let initial = self
            .find_initial_intersecting_edge(plane)
            .expect("the plane does not intersect the polyhedron");

        let first = self.intersect_and_find_next(initial, plane, callback);
        let mut current = first;
        loop {
            current = self.intersect_and_find_next(current, plane, callback);
            if current == first {
                break;
            }
        }
    }

    fn find_initial_intersecting_edge(&self, plane: &Plane) -> Option<HalfEdgeId> {
        for edge in self.edge_ids() {
            let halfedge = self.edge(edge).first();
            let os = plane.point_status(self.position(self.he_origin(halfedge)));
            let ds = plane.point_status(self.position(self.he_destination(halfedge)));
            if os == PointStatus::Inside
                || (os == PointStatus::Below && ds == PointStatus::Above)
                || (os == PointStatus::Above && ds == PointStatus::Below)
            {
                return Some(halfedge);
            }
        }
        None
    }

    /// Walks the boundary of the face containing `first_boundary_edge`,
    /// finds the two points on the plane (splitting crossing edges as
    /// needed), inserts a new edge between them unless one already exists,
    /// and returns a half edge of the neighbouring face where the walk
    /// continues.
    fn intersect_and_find_next<C: Callbacks<VP, FP>>(
        &mut self,
        first_boundary_edge: HalfEdgeId,
        plane: &Plane,
        callback: &mut C,
    ) -> HalfEdgeId {
        let mut seam_origin = None;
        let mut seam_destination = None;

        let mut current = first_boundary_edge;
        loop {
            let os = plane.point_status(self.position(self.he_origin(current)));
            let ds = plane.point_status(self.position(self.he_destination(current)));

            if os == PointStatus::Inside {
                if seam_origin.is_none() {
                    seam_origin = Some(current);
                } else {
                    seam_destination = Some(current);
                }
                current = self.he_next(current);
            } else if (os == PointStatus::Below && ds == PointStatus::Above)
                || (os == PointStatus::Above && ds == PointStatus::Below)
            {
                // Split the edge; the new vertex lies on the plane and is
                // examined in the next iteration.
                let edge = self.halfedge(current).edge().expect("boundary edge missing");
                self.split_edge(edge, plane);
                current = self.he_next(current);
            } else {
                current = self.he_next(current);
            }

            if seam_destination.is_some() || current == first_boundary_edge {
                break;
            }
        }

        let seam_origin = seam_origin.expect("no seam origin found");
        let seam_destination = seam_destination.expect("no seam destination found");

        let mut next_edge = self.he_next(self.he_twin(seam_destination));

        if self.he_next(seam_origin) != seam_destination
            && self.he_next(seam_destination) != seam_origin
        {
            // The two on-plane vertices are not adjacent: split the face
            // with a new edge between them and continue across the twin of
            // the destination half edge.
            self.split_face(seam_origin, seam_destination, callback);
        } else {
            // They are already connected. Rotate around the destination
            // vertex until a face that is actually split by the plane comes
            // up.
            let last_edge = self.he_twin(self.he_prev(seam_destination));
            next_edge = self.he_next(self.he_twin(next_edge));
            loop {
                let v1 = self.position(self.he_destination(next_edge));
                let v2 = self.position(self.he_origin(self.he_prev(next_edge)));
                let s1 = plane.point_status(v1);
                let s2 = plane.point_status(v2);
                if s1 == PointStatus::Inside || s2 == PointStatus::Inside || s1 != s2 {
                    break;
                }
                next_edge = self.he_next(self.he_twin(next_edge));
                if next_edge == last_edge {
                    break;
                }
            }
        }

        next_edge
    }

    /// Splits the edge at its intersection with the plane. Axis components
    /// of an axis-aligned plane are taken from the plane directly so
    /// aligned coordinates stay bit-exact.
    pub(crate) fn split_edge(&mut self, edge: EdgeId, plane: &Plane) -> EdgeId {
        let start = self.position(self.edge_first_vertex(edge));
        let end = self.position(self.edge_second_vertex(edge));

        let start_dist = plane.point_distance(start);
        let end_dist = plane.point_distance(end);
        debug_assert!(start_dist != end_dist);
        let dot = start_dist / (start_dist - end_dist);

        let mut position = DVec3::ZERO;
        for i in 0..3 {
            position[i] = if plane.normal[i] == 1.0 {
                plane.distance
            } else if plane.normal[i] == -1.0 {
                -plane.distance
            } else {
                start[i] + dot * (end[i] - start[i])
            };
        }

        self.insert_vertex_on_edge(edge, position)
    }

    /// Splits `edge` by inserting a new vertex. The original edge keeps its
    /// first half; a new edge spans the second half.
    pub(crate) fn insert_vertex_on_edge(&mut self, edge: EdgeId, position: DVec3) -> EdgeId {
        let old_first = self.edge(edge).first();
        let old_second = self.edge(edge).second().expect("edge is not fully specified");
        let first_face = self.halfedge(old_first).face().expect("edge has no first face");
        let second_face = self
            .halfedge(old_second)
            .face()
            .expect("edge has no second face");

        let new_vertex = self.alloc_vertex(position);
        let new_first = self.alloc_halfedge(new_vertex);
        let new_second = self.alloc_halfedge(new_vertex);

        self.insert_into_boundary_after(first_face, old_first, new_first);
        self.insert_into_boundary_after(second_face, old_second, new_second);

        self.edge_set_first_as_leaving(edge);
        self.edge_unset_second(edge);
        self.edge_set_second(edge, new_second);

        self.alloc_edge(new_first, Some(old_second))
    }

    /// Splits the face whose boundary contains both half edges by inserting
    /// a new edge from `old_boundary_first`'s origin to
    /// `new_boundary_first`'s origin. The half edges from
    /// `new_boundary_first` up to `old_boundary_first` move to a new face.
    fn split_face<C: Callbacks<VP, FP>>(
        &mut self,
        old_boundary_first: HalfEdgeId,
        new_boundary_first: HalfEdgeId,
        callback: &mut C,
    ) {
        let old_face = self
            .halfedge(old_boundary_first)
            .face()
            .expect("half edge has no face");
        debug_assert_eq!(self.halfedge(new_boundary_first).face(), Some(old_face));

        let old_boundary_last = self.he_prev(new_boundary_first);
        let new_boundary_last = self.he_prev(old_boundary_first);

        let old_splitter = self.alloc_halfedge(self.he_origin(new_boundary_first));
        let new_splitter = self.alloc_halfedge(self.he_origin(old_boundary_first));

        // Close the old face with its splitter.
        self.link(old_boundary_last, old_splitter);
        self.link(old_splitter, old_boundary_first);
        self.halfedges[old_splitter].face = Some(old_face);
        self.faces[old_face].boundary = old_boundary_first;

        // Collect the half edges that move to the new face.
        let mut new_boundary = vec![new_splitter];
        let mut current = new_boundary_first;
        loop {
            new_boundary.push(current);
            self.halfedges[current].face = None;
            if current == new_boundary_last {
                break;
            }
            current = self.he_next(current);
        }

        let new_face = self.make_face(&new_boundary);
        self.alloc_edge(old_splitter, Some(new_splitter));

        callback.face_was_split(self, old_face, new_face);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chisel_commons::geom::Aabb;
    use chisel_commons::math::ALMOST_ZERO;

    fn cube() -> Polyhedron {
        Polyhedron::from_bounds(&Aabb::from_min_max(DVec3::splat(-1.0), DVec3::splat(1.0)))
    }

    #[test]
    fn test_clip_through_center() {
        let mut poly = cube();
        let status = poly.clip(&Plane::new(DVec3::ZERO, DVec3::X));
        assert!(status.is_success());
        assert!(poly.check_invariant());

        assert_eq!(poly.vertex_count(), 8);
        assert_eq!(poly.edge_count(), 12);
        assert_eq!(poly.face_count(), 6);
        assert_eq!(
            poly.bounds(),
            Aabb::from_min_max(DVec3::splat(-1.0), DVec3::new(0.0, 1.0, 1.0))
        );
        for &y in &[-1.0, 1.0] {
            for &z in &[-1.0, 1.0] {
                assert!(poly.has_vertex(DVec3::new(0.0, y, z), ALMOST_ZERO));
                assert!(poly.has_vertex(DVec3::new(-1.0, y, z), ALMOST_ZERO));
            }
        }
    }

    #[test]
    fn test_clip_is_bit_exact_on_axis_planes() {
        let mut poly = cube();
        poly.clip(&Plane::new(DVec3::new(0.25, 0.0, 0.0), DVec3::X));
        for position in poly.vertex_positions() {
            assert!(position.x == 0.25 || position.x == -1.0);
        }
    }

    #[test]
    fn test_clip_misses() {
        let mut poly = cube();
        assert!(poly
            .clip(&Plane::new(DVec3::new(2.0, 0.0, 0.0), DVec3::X))
            .is_unchanged());
        assert_eq!(poly.vertex_count(), 8);

        assert!(poly
            .clip(&Plane::new(DVec3::new(-2.0, 0.0, 0.0), DVec3::X))
            .is_empty());
        // A clip that would empty the polyhedron does not modify it.
        assert_eq!(poly.vertex_count(), 8);
    }

    #[test]
    fn test_clip_coplanar_face_is_unchanged() {
        let mut poly = cube();
        assert!(poly
            .clip(&Plane::new(DVec3::new(1.0, 0.0, 0.0), DVec3::X))
            .is_unchanged());
    }

    #[test]
    fn test_clip_corner() {
        let mut poly = cube();
        let normal = DVec3::ONE.normalize();
        let status = poly.clip(&Plane::new(DVec3::new(1.0, 1.0, 0.0), normal));
        assert!(status.is_success());
        assert!(poly.check_invariant());
        // The corner at (1, 1, 1) is cut off by a triangle.
        assert!(!poly.has_vertex(DVec3::ONE, ALMOST_ZERO));
        assert_eq!(poly.vertex_count(), 10);
        assert_eq!(poly.face_count(), 7);
        assert_eq!(poly.edge_count(), 15);
    }

    #[test]
    fn test_clip_through_edge_produces_coplanar_face() {
        let mut poly = cube();
        // A diagonal plane through the edges at (1, *, 1) and (-1, *, -1).
        let normal = DVec3::new(1.0, 0.0, -1.0).normalize();
        let status = poly.clip(&Plane::new(DVec3::new(1.0, 0.0, 1.0), normal));
        assert!(status.is_success());
        assert!(poly.check_invariant());
        // The cube is cut into a triangular prism along the diagonal; no
        // new vertices appear because the plane passes through existing
        // edges, which are kept on the coplanar cap.
        assert_eq!(poly.vertex_count(), 6);
        assert_eq!(poly.face_count(), 5);
        assert_eq!(poly.edge_count(), 9);
        for &y in &[-1.0, 1.0] {
            assert!(poly.has_vertex(DVec3::new(1.0, y, 1.0), ALMOST_ZERO));
            assert!(poly.has_vertex(DVec3::new(-1.0, y, -1.0), ALMOST_ZERO));
            assert!(!poly.has_vertex(DVec3::new(1.0, y, -1.0), ALMOST_ZERO));
        }
    }

    #[test]
    fn test_clip_by_polyhedron() {
        let mut poly = cube();
        let other = Polyhedron::from_bounds(&Aabb::from_min_max(
            DVec3::new(0.0, -2.0, -2.0),
            DVec3::new(2.0, 2.0, 2.0),
        ));
        let status = poly.clip_by(&other);
        assert!(status.is_success());
        // Clipping by the other polyhedron's planes keeps the overlap.
        assert_eq!(
            poly.bounds(),
            Aabb::from_min_max(DVec3::new(0.0, -1.0, -1.0), DVec3::splat(1.0))
        );
        assert!(poly.has_vertex(DVec3::new(0.0, 1.0, 1.0), ALMOST_ZERO));
        assert!(poly.has_vertex(DVec3::new(1.0, 1.0, 1.0), ALMOST_ZERO));
        assert!(!poly.has_vertex(DVec3::new(-1.0, 1.0, 1.0), ALMOST_ZERO));
    }
}
