// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use glam::DVec3;
use itertools::Itertools;

use chisel_commons::geom::{polygon_contains_point, Plane, PointStatus, Ray, Segment};
use chisel_commons::math::ALMOST_ZERO;
use chisel_commons::utils::SliceUtils;

use super::{Callbacks, EdgeId, FaceId, NullCallbacks, Payload, Polyhedron};

impl<VP: Payload, FP: Payload> Polyhedron<VP, FP> {
    /// Whether the point lies inside or on the surface. Only meaningful in
    /// the polyhedron state; lesser states contain nothing.
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.contains_point_with(point, &NullCallbacks)
    }

    pub fn contains_point_with<C: Callbacks<VP, FP>>(
        &self,
        point: DVec3,
        callback: &C,
    ) -> bool {
        if !self.is_polyhedron() {
            return false;
        }
        if !self.bounds().contains_point(point) {
            return false;
        }
        self.face_ids().all(|face| {
            callback.plane(self, face).point_status(point) != PointStatus::Above
        })
    }

    /// Whether `other` lies entirely inside this polyhedron.
    pub fn contains(&self, other: &Polyhedron<VP, FP>) -> bool {
        self.contains_with(other, &NullCallbacks)
    }

    pub fn contains_with<C: Callbacks<VP, FP>>(
        &self,
        other: &Polyhedron<VP, FP>,
        callback: &C,
    ) -> bool {
        if !self.is_polyhedron() {
            return false;
        }
        if !self.bounds().contains(&other.bounds()) {
            return false;
        }
        other
            .vertex_positions()
            .into_iter()
            .all(|position| self.contains_point_with(position, callback))
    }

    /// Whether the two polyhedra share at least one point, dispatched over
    /// the topological states of both operands.
    pub fn intersects(&self, other: &Polyhedron<VP, FP>) -> bool {
        self.intersects_with(other, &NullCallbacks)
    }

    pub fn intersects_with<C: Callbacks<VP, FP>>(
        &self,
        other: &Polyhedron<VP, FP>,
        callback: &C,
    ) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if !self.bounds().intersects(&other.bounds()) {
            return false;
        }

        if self.is_point() {
            if other.is_point() {
                point_intersects_point(self, other)
            } else if other.is_edge() {
                point_intersects_edge(self, other)
            } else if other.is_polygon() {
                point_intersects_polygon(self, other, callback)
            } else {
                point_intersects_polyhedron(self, other, callback)
            }
        } else if self.is_edge() {
            if other.is_point() {
                point_intersects_edge(other, self)
            } else if other.is_edge() {
                edge_intersects_edge(self, other)
            } else if other.is_polygon() {
                edge_intersects_polygon(self, other)
            } else {
                edge_intersects_polyhedron(self, other)
            }
        } else if self.is_polygon() {
            if other.is_point() {
                point_intersects_polygon(other, self, callback)
            } else if other.is_edge() {
                edge_intersects_polygon(other, self)
            } else if other.is_polygon() {
                polygon_intersects_polygon(self, other)
            } else {
                polygon_intersects_polyhedron(self, other)
            }
        } else if other.is_point() {
            point_intersects_polyhedron(other, self, callback)
        } else if other.is_edge() {
            edge_intersects_polyhedron(other, self)
        } else if other.is_polygon() {
            polygon_intersects_polyhedron(other, self)
        } else {
            polyhedron_intersects_polyhedron(self, other, callback)
        }
    }

    fn single_vertex_position(&self) -> DVec3 {
        self.position(self.vertex_ids().next().expect("polyhedron is empty"))
    }

    fn single_edge(&self) -> EdgeId {
        self.edge_ids().next().expect("polyhedron has no edge")
    }

    fn single_face(&self) -> FaceId {
        self.face_ids().next().expect("polyhedron has no face")
    }

    fn edge_endpoints(&self, edge: EdgeId) -> (DVec3, DVec3) {
        (
            self.position(self.edge_first_vertex(edge)),
            self.position(self.edge_second_vertex(edge)),
        )
    }
}

fn point_intersects_point<VP: Payload, FP: Payload>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
) -> bool {
    lhs.single_vertex_position() == rhs.single_vertex_position()
}

fn point_intersects_edge<VP: Payload, FP: Payload>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
) -> bool {
    let point = lhs.single_vertex_position();
    let (start, end) = rhs.edge_endpoints(rhs.single_edge());
    Segment::new(start, end).contains(point, ALMOST_ZERO)
}

fn point_intersects_polygon<VP: Payload, FP: Payload, C: Callbacks<VP, FP>>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
    callback: &C,
) -> bool {
    let point = lhs.single_vertex_position();
    let face = rhs.single_face();
    let normal = callback.plane(rhs, face).normal;
    let positions = rhs.face_vertex_positions(face);

    // The point must lie in the polygon's plane, not merely project into
    // the polygon.
    if Plane::new(positions[0], normal).point_status(point) != PointStatus::Inside {
        return false;
    }
    polygon_contains_point(point, Some(normal), &positions)
}

fn point_intersects_polyhedron<VP: Payload, FP: Payload, C: Callbacks<VP, FP>>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
    callback: &C,
) -> bool {
    rhs.contains_point_with(lhs.single_vertex_position(), callback)
}

fn edge_intersects_edge<VP: Payload, FP: Payload>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
) -> bool {
    let (lhs_start, lhs_end) = lhs.edge_endpoints(lhs.single_edge());
    let rhs_edge = rhs.single_edge();

    if rhs.edge_has_position(rhs_edge, lhs_start, ALMOST_ZERO)
        || rhs.edge_has_position(rhs_edge, lhs_end, ALMOST_ZERO)
    {
        return true;
    }

    let (rhs_start, rhs_end) = rhs.edge_endpoints(rhs_edge);
    let lhs_ray = Ray::new(lhs_start, lhs_end - lhs_start);
    let distance = lhs_ray.squared_distance_to_segment(rhs_start, rhs_end);
    let ray_len = lhs_ray.distance_to_point_on_ray(lhs_end);

    if distance.parallel {
        if !distance.colinear {
            return false;
        }
        let rhs_start_dist = lhs_ray.distance_to_point_on_ray(rhs_start);
        let rhs_end_dist = lhs_ray.distance_to_point_on_ray(rhs_end);
        return (0.0..=ray_len).contains(&rhs_start_dist)        // lhs contains rhs start
            || (0.0..=ray_len).contains(&rhs_end_dist)          // lhs contains rhs end
            || (rhs_start_dist > 0.0) != (rhs_end_dist > 0.0); // rhs contains lhs
    }

    distance.squared_distance < ALMOST_ZERO * ALMOST_ZERO && distance.ray_distance <= ray_len
}

fn edge_intersects_polygon<VP: Payload, FP: Payload>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
) -> bool {
    let (start, end) = lhs.edge_endpoints(lhs.single_edge());
    edge_intersects_face(start, end, rhs, rhs.single_face())
}

fn edge_intersects_polyhedron<VP: Payload, FP: Payload>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
) -> bool {
    let (start, end) = lhs.edge_endpoints(lhs.single_edge());
    let ray = Ray::new(start, end - start);
    let ray_len = (end - start).dot(ray.direction);

    let mut front_hit = false;
    let mut back_hit = false;

    for face in rhs.face_ids() {
        if let Some((front, distance)) = rhs.face_intersect_with_ray(face, &ray) {
            if distance <= ray_len {
                return true;
            }
            if front {
                front_hit = true;
            } else {
                back_hit = true;
            }
        }
    }

    // Only back faces beyond the edge means the edge lies inside.
    back_hit && !front_hit
}

fn edge_intersects_face<VP: Payload, FP: Payload>(
    start: DVec3,
    end: DVec3,
    rhs: &Polyhedron<VP, FP>,
    face: FaceId,
) -> bool {
    let ray = Ray::new(start, end - start);
    let positions = rhs.face_vertex_positions(face);
    let plane = rhs.face_plane(face);

    let cos = plane.normal.dot(ray.direction);
    if cos.abs() < ALMOST_ZERO {
        // Edge and face are parallel; compare against the boundary edges.
        let max_distance = ALMOST_ZERO * ALMOST_ZERO;
        for (a, b) in positions.iter_cpy().circular_tuple_windows() {
            if ray.squared_distance_to_segment(a, b).squared_distance <= max_distance {
                return true;
            }
        }
        return false;
    }

    match ray.intersect_polygon(&plane, &positions) {
        Some(distance) => distance <= (end - start).dot(ray.direction),
        None => false,
    }
}

fn polygon_intersects_polygon<VP: Payload, FP: Payload>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
) -> bool {
    face_intersects_face(lhs, lhs.single_face(), rhs, rhs.single_face())
}

fn polygon_intersects_polyhedron<VP: Payload, FP: Payload>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
) -> bool {
    let lhs_face = lhs.single_face();
    for rhs_face in rhs.face_ids() {
        if face_intersects_face(lhs, lhs_face, rhs, rhs_face) {
            return true;
        }
    }
    // The polygon may lie entirely inside the polyhedron.
    rhs.contains_point(lhs.single_vertex_position())
}

fn face_intersects_face<VP: Payload, FP: Payload>(
    lhs: &Polyhedron<VP, FP>,
    lhs_face: FaceId,
    rhs: &Polyhedron<VP, FP>,
    rhs_face: FaceId,
) -> bool {
    let lhs_positions = lhs.face_vertex_positions(lhs_face);
    let rhs_positions = rhs.face_vertex_positions(rhs_face);

    for (start, end) in lhs_positions.iter_cpy().circular_tuple_windows() {
        if edge_intersects_face(start, end, rhs, rhs_face) {
            return true;
        }
    }

    polygon_contains_point(lhs_positions[0], None, &rhs_positions)
        || polygon_contains_point(rhs_positions[0], None, &lhs_positions)
}

/// Separating axis test over the face planes of both operands and the
/// cross products of every edge pair.
fn polyhedron_intersects_polyhedron<VP: Payload, FP: Payload, C: Callbacks<VP, FP>>(
    lhs: &Polyhedron<VP, FP>,
    rhs: &Polyhedron<VP, FP>,
    callback: &C,
) -> bool {
    debug_assert!(lhs.is_polyhedron());
    debug_assert!(rhs.is_polyhedron());

    if separate(lhs, rhs, callback) || separate(rhs, lhs, callback) {
        return false;
    }

    let lhs_positions = lhs.vertex_positions();
    let rhs_positions = rhs.vertex_positions();

    for lhs_edge in lhs.edge_ids() {
        let lhs_vector = lhs.edge_vector(lhs_edge);
        let lhs_origin = lhs.position(lhs.edge_first_vertex(lhs_edge));

        for rhs_edge in rhs.edge_ids() {
            let rhs_vector = rhs.edge_vector(rhs_edge);
            let direction = lhs_vector.cross(rhs_vector);
            if direction.length_squared() < ALMOST_ZERO {
                continue;
            }

            let plane = Plane::new(lhs_origin, direction);
            let lhs_status = vertices_point_status(&plane, &lhs_positions);
            if lhs_status != PointStatus::Inside {
                let rhs_status = vertices_point_status(&plane, &rhs_positions);
                if rhs_status != PointStatus::Inside && lhs_status != rhs_status {
                    return false;
                }
            }
        }
    }

    true
}

/// Whether any face plane of `faces_of` has all of `vertices_of`'s
/// vertices strictly above it.
fn separate<VP: Payload, FP: Payload, C: Callbacks<VP, FP>>(
    faces_of: &Polyhedron<VP, FP>,
    vertices_of: &Polyhedron<VP, FP>,
    callback: &C,
) -> bool {
    let positions = vertices_of.vertex_positions();
    faces_of.face_ids().any(|face| {
        let plane = callback.plane(faces_of, face);
        vertices_point_status(&plane, &positions) == PointStatus::Above
    })
}

/// Where a vertex cloud lies relative to a plane: `Inside` when it spans
/// the plane, otherwise the side it is on.
fn vertices_point_status(plane: &Plane, positions: &[DVec3]) -> PointStatus {
    let mut above = 0usize;
    let mut below = 0usize;
    for &position in positions {
        match plane.point_status(position) {
            PointStatus::Above => above += 1,
            PointStatus::Below => below += 1,
            PointStatus::Inside => {}
        }
        if above > 0 && below > 0 {
            return PointStatus::Inside;
        }
    }
    if above > 0 {
        PointStatus::Above
    } else {
        PointStatus::Below
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chisel_commons::geom::Aabb;

    fn point_poly(p: DVec3) -> Polyhedron {
        Polyhedron::from_points(&[p])
    }

    fn edge_poly(a: DVec3, b: DVec3) -> Polyhedron {
        Polyhedron::from_points(&[a, b])
    }

    fn square(z: f64) -> Polyhedron {
        Polyhedron::from_points(&[
            DVec3::new(-1.0, -1.0, z),
            DVec3::new(1.0, -1.0, z),
            DVec3::new(1.0, 1.0, z),
            DVec3::new(-1.0, 1.0, z),
        ])
    }

    fn cube() -> Polyhedron {
        Polyhedron::from_bounds(&Aabb::from_min_max(DVec3::splat(-1.0), DVec3::splat(1.0)))
    }

    fn check_symmetric(a: &Polyhedron, b: &Polyhedron, expected: bool) {
        assert_eq!(a.intersects(b), expected);
        assert_eq!(b.intersects(a), expected);
    }

    #[test]
    fn test_contains_point() {
        let cube = cube();
        assert!(cube.contains_point(DVec3::ZERO));
        assert!(cube.contains_point(DVec3::ONE));
        assert!(cube.contains_point(DVec3::new(1.0, 0.0, 0.0)));
        assert!(!cube.contains_point(DVec3::new(1.0001, 0.0, 0.0)));
        assert!(!cube.contains_point(DVec3::new(2.0, 2.0, 2.0)));
    }

    #[test]
    fn test_contains_polyhedron() {
        let outer = cube();
        let inner = Polyhedron::from_bounds(&Aabb::from_min_max(
            DVec3::splat(-0.5),
            DVec3::splat(0.5),
        ));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_point_point() {
        check_symmetric(&point_poly(DVec3::ONE), &point_poly(DVec3::ONE), true);
        check_symmetric(&point_poly(DVec3::ONE), &point_poly(DVec3::ZERO), false);
    }

    #[test]
    fn test_point_edge() {
        let edge = edge_poly(DVec3::new(-1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0));
        check_symmetric(&point_poly(DVec3::ZERO), &edge, true);
        check_symmetric(&point_poly(DVec3::new(1.0, 0.0, 0.0)), &edge, true);
        check_symmetric(&point_poly(DVec3::new(0.0, 0.5, 0.0)), &edge, false);
    }

    #[test]
    fn test_point_polygon() {
        let polygon = square(0.0);
        check_symmetric(&point_poly(DVec3::ZERO), &polygon, true);
        check_symmetric(&point_poly(DVec3::new(0.5, 0.5, 0.0)), &polygon, true);
        check_symmetric(&point_poly(DVec3::new(2.0, 0.0, 0.0)), &polygon, false);
        // Above the polygon's plane.
        check_symmetric(&point_poly(DVec3::new(0.0, 0.0, 1.0)), &polygon, false);
    }

    #[test]
    fn test_point_polyhedron() {
        let cube = cube();
        check_symmetric(&point_poly(DVec3::ZERO), &cube, true);
        check_symmetric(&point_poly(DVec3::new(0.0, 0.0, 3.0)), &cube, false);
    }

    #[test]
    fn test_edge_edge() {
        let a = edge_poly(DVec3::new(-1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0));
        // Crossing.
        check_symmetric(
            &a,
            &edge_poly(DVec3::new(0.0, -1.0, 0.0), DVec3::new(0.0, 1.0, 0.0)),
            true,
        );
        // Skew, above.
        check_symmetric(
            &a,
            &edge_poly(DVec3::new(0.0, -1.0, 1.0), DVec3::new(0.0, 1.0, 1.0)),
            false,
        );
        // Collinear, overlapping.
        check_symmetric(
            &a,
            &edge_poly(DVec3::new(0.5, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0)),
            true,
        );
        // Collinear, containing.
        check_symmetric(
            &a,
            &edge_poly(DVec3::new(-3.0, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0)),
            true,
        );
        // Collinear, disjoint.
        check_symmetric(
            &a,
            &edge_poly(DVec3::new(2.0, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0)),
            false,
        );
        // Parallel.
        check_symmetric(
            &a,
            &edge_poly(DVec3::new(-1.0, 1.0, 0.0), DVec3::new(1.0, 1.0, 0.0)),
            false,
        );
    }

    #[test]
    fn test_edge_polygon() {
        let polygon = square(0.0);
        // Piercing.
        check_symmetric(
            &edge_poly(DVec3::new(0.0, 0.0, -1.0), DVec3::new(0.0, 0.0, 1.0)),
            &polygon,
            true,
        );
        // Stopping short.
        check_symmetric(
            &edge_poly(DVec3::new(0.0, 0.0, 2.0), DVec3::new(0.0, 0.0, 1.0)),
            &polygon,
            false,
        );
        // In plane, crossing the boundary.
        check_symmetric(
            &edge_poly(DVec3::new(0.5, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0)),
            &polygon,
            true,
        );
        // Outside, beside the polygon.
        check_symmetric(
            &edge_poly(DVec3::new(2.0, -1.0, 0.0), DVec3::new(2.0, 1.0, 0.0)),
            &polygon,
            false,
        );
    }

    #[test]
    fn test_edge_polyhedron() {
        let cube = cube();
        // Piercing straight through.
        check_symmetric(
            &edge_poly(DVec3::new(-2.0, 0.0, 0.0), DVec3::new(2.0, 0.0, 0.0)),
            &cube,
            true,
        );
        // Fully inside.
        check_symmetric(
            &edge_poly(DVec3::new(-0.5, 0.0, 0.0), DVec3::new(0.5, 0.0, 0.0)),
            &cube,
            true,
        );
        // Reaching in.
        check_symmetric(
            &edge_poly(DVec3::new(0.0, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0)),
            &cube,
            true,
        );
        // Outside.
        check_symmetric(
            &edge_poly(DVec3::new(2.0, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0)),
            &cube,
            false,
        );
    }

    #[test]
    fn test_polygon_polygon() {
        let a = square(0.0);
        // Crossing squares in perpendicular planes.
        let b = Polyhedron::from_points(&[
            DVec3::new(0.0, -1.0, -1.0),
            DVec3::new(0.0, 1.0, -1.0),
            DVec3::new(0.0, 1.0, 1.0),
            DVec3::new(0.0, -1.0, 1.0),
        ]);
        check_symmetric(&a, &b, true);
        check_symmetric(&a, &square(1.0), false);

        // Coplanar, overlapping.
        let c = Polyhedron::from_points(&[
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(3.0, 0.0, 0.0),
            DVec3::new(3.0, 3.0, 0.0),
            DVec3::new(0.0, 3.0, 0.0),
        ]);
        check_symmetric(&a, &c, true);
    }

    #[test]
    fn test_polygon_polyhedron() {
        let cube = cube();
        check_symmetric(&square(0.0), &cube, true);
        check_symmetric(&square(2.0), &cube, false);
        // A small polygon fully inside the cube.
        let inner = Polyhedron::from_points(&[
            DVec3::new(-0.25, -0.25, 0.0),
            DVec3::new(0.25, -0.25, 0.0),
            DVec3::new(0.25, 0.25, 0.0),
            DVec3::new(-0.25, 0.25, 0.0),
        ]);
        check_symmetric(&inner, &cube, true);
    }

    #[test]
    fn test_polyhedron_polyhedron() {
        let a = cube();
        let b = Polyhedron::from_bounds(&Aabb::from_min_max(
            DVec3::splat(0.5),
            DVec3::splat(2.5),
        ));
        check_symmetric(&a, &b, true);

        let c = Polyhedron::from_bounds(&Aabb::from_min_max(
            DVec3::splat(3.0),
            DVec3::splat(4.0),
        ));
        check_symmetric(&a, &c, false);

        // Cubes touching along a face are separated by the shared plane:
        // vertices on the plane count to neither side.
        let d = Polyhedron::from_bounds(&Aabb::from_min_max(
            DVec3::new(1.0, -1.0, -1.0),
            DVec3::new(2.0, 1.0, 1.0),
        ));
        check_symmetric(&a, &d, false);

        // A tetrahedron poking into the cube.
        let e = Polyhedron::from_points(&[
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(3.0, 0.0, 0.0),
            DVec3::new(3.0, 3.0, 0.0),
            DVec3::new(3.0, 0.0, 3.0),
        ]);
        check_symmetric(&a, &e, true);
    }
}
