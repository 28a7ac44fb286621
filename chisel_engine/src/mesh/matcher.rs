// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, HashSet};

use glam::DVec3;

use chisel_commons::math::{ToOrd, Vec3Ord, ALMOST_ZERO};

use super::{FaceId, Payload, Polyhedron, VertexId};

/// A bidirectional many-to-many relation between the vertices of two
/// polyhedra.
#[derive(Debug, Default, Clone)]
struct VertexRelation {
    left_to_right: HashMap<VertexId, Vec<VertexId>>,
    right_to_left: HashMap<VertexId, Vec<VertexId>>,
    size: usize,
}

impl VertexRelation {
    fn insert(&mut self, left: VertexId, right: VertexId) {
        let rights = self.left_to_right.entry(left).or_default();
        if rights.contains(&right) {
            return;
        }
        rights.push(right);
        self.right_to_left.entry(right).or_default().push(left);
        self.size += 1;
    }

    fn right_range(&self, left: VertexId) -> &[VertexId] {
        self.left_to_right.get(&left).map_or(&[], Vec::as_slice)
    }

    fn left_range(&self, right: VertexId) -> &[VertexId] {
        self.right_to_left.get(&right).map_or(&[], Vec::as_slice)
    }

    fn count_right(&self, left: VertexId) -> usize {
        self.right_range(left).len()
    }

    fn count_left(&self, right: VertexId) -> usize {
        self.left_range(right).len()
    }

    fn size(&self) -> usize {
        self.size
    }
}

/// Pairs each face of the right polyhedron with its best matching face of
/// the left polyhedron, driven by a vertex correspondence. Used to
/// transfer face attributes when a polyhedron is reshaped.
pub struct PolyhedronMatcher<'a, VP: Payload = (), FP: Payload = ()> {
    left: &'a Polyhedron<VP, FP>,
    right: &'a Polyhedron<VP, FP>,
    relation: VertexRelation,
}

impl<'a, VP: Payload, FP: Payload> PolyhedronMatcher<'a, VP, FP> {
    /// Corresponds vertices with equal positions.
    pub fn new(left: &'a Polyhedron<VP, FP>, right: &'a Polyhedron<VP, FP>) -> Self {
        let mut relation = VertexRelation::default();
        for left_vertex in left.vertex_ids() {
            let position = left.position(left_vertex);
            if let Some(right_vertex) = right.find_vertex_by_position(position, ALMOST_ZERO) {
                relation.insert(left_vertex, right_vertex);
            }
        }
        Self::expand(left, right, relation)
    }

    /// Corresponds the vertices in `moved` with their positions translated
    /// by `delta`; all other left vertices correspond positionally where
    /// possible.
    pub fn with_delta(
        left: &'a Polyhedron<VP, FP>,
        right: &'a Polyhedron<VP, FP>,
        moved: &[DVec3],
        delta: DVec3,
    ) -> Self {
        let moved: HashSet<Vec3Ord> = moved.iter().map(ToOrd::to_ord).collect();
        let mut vertex_map = Vec::new();
        for left_vertex in left.vertex_ids() {
            let position = left.position(left_vertex);
            if moved.contains(&position.to_ord()) {
                debug_assert!(right.has_vertex(position + delta, ALMOST_ZERO));
                vertex_map.push((position, position + delta));
            } else if right.has_vertex(position, ALMOST_ZERO) {
                vertex_map.push((position, position));
            }
        }
        Self::with_map(left, right, &vertex_map)
    }

    /// Corresponds vertices through an explicit map from left positions to
    /// right positions.
    pub fn with_map(
        left: &'a Polyhedron<VP, FP>,
        right: &'a Polyhedron<VP, FP>,
        vertex_map: &[(DVec3, DVec3)],
    ) -> Self {
        let mut relation = VertexRelation::default();
        for &(left_position, right_position) in vertex_map {
            let left_vertex = left
                .find_vertex_by_position(left_position, ALMOST_ZERO)
                .expect("left position not found");
            let right_vertex = right
                .find_vertex_by_position(right_position, ALMOST_ZERO)
                .expect("right position not found");
            relation.insert(left_vertex, right_vertex);
        }
        Self::expand(left, right, relation)
    }

    /// Expands the initial correspondence to a fixpoint: any vertex on one
    /// side without a partner is linked to every partner of each of its
    /// neighbours, repeatedly.
    fn expand(
        left: &'a Polyhedron<VP, FP>,
        right: &'a Polyhedron<VP, FP>,
        initial: VertexRelation,
    ) -> Self {
        let added: Vec<VertexId> = right
            .vertex_ids()
            .filter(|&v| initial.count_left(v) == 0)
            .collect();
        let removed: Vec<VertexId> = left
            .vertex_ids()
            .filter(|&v| initial.count_right(v) == 0)
            .collect();

        let mut relation = initial;

        loop {
            let previous_size = relation.size();
            for &added_vertex in &added {
                for neighbour in vertex_neighbours(right, added_vertex) {
                    for left_vertex in relation.left_range(neighbour).to_vec() {
                        relation.insert(left_vertex, added_vertex);
                    }
                }
            }
            if relation.size() == previous_size {
                break;
            }
        }

        loop {
            let previous_size = relation.size();
            for &removed_vertex in &removed {
                for neighbour in vertex_neighbours(left, removed_vertex) {
                    for right_vertex in relation.right_range(neighbour).to_vec() {
                        relation.insert(removed_vertex, right_vertex);
                    }
                }
            }
            if relation.size() == previous_size {
                break;
            }
        }

        Self {
            left,
            right,
            relation,
        }
    }

    /// Calls `callback` with the best matching left face for every right
    /// face. Exactly one left face is selected per right face.
    pub fn process_right_faces(&self, mut callback: impl FnMut(FaceId, FaceId)) {
        for right_face in self.right.face_ids() {
            let left_face = self.find_best_matching_left_face(right_face);
            callback(left_face, right_face);
        }
    }

    /// The matching left face with the highest shared-pair score; ties are
    /// broken by the most anti-parallel normal.
    pub fn find_best_matching_left_face(&self, right_face: FaceId) -> FaceId {
        let candidates = self.find_matching_left_faces(right_face);
        debug_assert!(!candidates.is_empty());

        let right_normal = self.right.face_normal(right_face);
        let mut candidates = candidates.into_iter();
        let mut result = candidates.next().expect("no matching face found");
        let mut best_dot = right_normal.dot(self.left.face_normal(result));

        for candidate in candidates {
            let dot = right_normal.dot(self.left.face_normal(candidate));
            if dot < best_dot {
                result = candidate;
                best_dot = dot;
            }
        }
        result
    }

    fn find_matching_left_faces(&self, right_face: FaceId) -> Vec<FaceId> {
        let mut result = Vec::new();
        let mut best_score = 0usize;

        for left_face in self.left.face_ids() {
            let score = self.compute_match_score(left_face, right_face);
            if score > best_score {
                result.clear();
                result.push(left_face);
                best_score = score;
            } else if score == best_score {
                result.push(left_face);
            }
        }
        result
    }

    /// Counts correspondence pairs with one endpoint on each face.
    fn compute_match_score(&self, left_face: FaceId, right_face: FaceId) -> usize {
        let mut score = 0;
        for left_vertex in self.left.face_vertices(left_face) {
            for &right_vertex in self.relation.right_range(left_vertex) {
                if self.right.vertex_incident(right_vertex, right_face) {
                    score += 1;
                }
            }
        }
        score
    }
}

/// The destinations of all half edges leaving the vertex.
fn vertex_neighbours<VP: Payload, FP: Payload>(
    poly: &Polyhedron<VP, FP>,
    vertex: VertexId,
) -> Vec<VertexId> {
    let mut neighbours = Vec::new();
    let first = match poly.vertex(vertex).leaving() {
        Some(h) => h,
        None => return neighbours,
    };
    let mut current = first;
    loop {
        neighbours.push(poly.he_destination(current));
        current = poly.he_next_incident(current);
        if current == first {
            break;
        }
    }
    neighbours
}

#[cfg(test)]
mod test {
    use super::*;
    use chisel_commons::geom::Aabb;

    fn unit_cube_at(offset: DVec3) -> Polyhedron {
        Polyhedron::from_bounds(&Aabb::from_min_max(offset, offset + DVec3::ONE))
    }

    fn collect_pairs(matcher: &PolyhedronMatcher) -> Vec<(FaceId, FaceId)> {
        let mut pairs = Vec::new();
        matcher.process_right_faces(|left, right| pairs.push((left, right)));
        pairs
    }

    #[test]
    fn test_empty_correspondence_matches_opposing_faces() {
        let left = unit_cube_at(DVec3::ZERO);
        let right = unit_cube_at(DVec3::new(0.0, 0.0, 1.0));

        // With no vertex pairs every left face ties at score zero, so the
        // normal tie breaker pairs each right face with the opposing one.
        let matcher = PolyhedronMatcher::with_map(&left, &right, &[]);
        let pairs = collect_pairs(&matcher);
        assert_eq!(pairs.len(), right.face_count());

        for (left_face, right_face) in pairs {
            let left_normal = left.face_normal(left_face);
            let right_normal = right.face_normal(right_face);
            assert!((left_normal.dot(right_normal) + 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_positional_correspondence_matches_co_oriented_faces() {
        let left = unit_cube_at(DVec3::ZERO);
        let right = unit_cube_at(DVec3::new(0.0, 0.0, 1.0));

        let moved = left.vertex_positions();
        let matcher =
            PolyhedronMatcher::with_delta(&left, &right, &moved, DVec3::new(0.0, 0.0, 1.0));
        let pairs = collect_pairs(&matcher);
        assert_eq!(pairs.len(), right.face_count());

        for (left_face, right_face) in pairs {
            let left_normal = left.face_normal(left_face);
            let right_normal = right.face_normal(right_face);
            assert!((left_normal.dot(right_normal) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_added_vertex_is_linked_through_neighbours() {
        let left = unit_cube_at(DVec3::ZERO);
        let mut right = unit_cube_at(DVec3::ZERO);
        let apex = DVec3::new(0.5, 0.5, 1.5);
        right.add_point(apex).unwrap();

        let matcher = PolyhedronMatcher::new(&left, &right);
        let pairs = collect_pairs(&matcher);
        assert_eq!(pairs.len(), right.face_count());

        // The four cap triangles around the apex all inherit from the left
        // top face.
        let left_top = left
            .face_ids()
            .find(|&f| left.face_normal(f).abs_diff_eq(DVec3::Z, 1e-9))
            .unwrap();
        for (left_face, right_face) in pairs {
            if right
                .face_vertex_positions(right_face)
                .iter()
                .any(|p| p.abs_diff_eq(apex, 1e-9))
            {
                assert_eq!(left_face, left_top);
            }
        }
    }

    #[test]
    fn test_identical_polyhedra_match_identically() {
        let left = unit_cube_at(DVec3::ZERO);
        let right = unit_cube_at(DVec3::ZERO);

        let matcher = PolyhedronMatcher::new(&left, &right);
        let pairs = collect_pairs(&matcher);
        assert_eq!(pairs.len(), 6);
        for (left_face, right_face) in pairs {
            assert!(left
                .face_normal(left_face)
                .abs_diff_eq(right.face_normal(right_face), 1e-9));
        }
    }
}
