// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use glam::DVec3;

use crate::math::{ALMOST_ZERO, COLINEAR_EPSILON, POINT_STATUS_EPSILON};

/// Classification of a point against an oriented plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointStatus {
    Above,
    Below,
    Inside,
}

/// An oriented plane in normal/distance form: a point `p` lies on the plane
/// iff `dot(normal, p) == distance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(anchor: DVec3, normal: DVec3) -> Self {
        Self {
            normal,
            distance: normal.dot(anchor),
        }
    }

    /// The plane through three points listed clockwise when viewed from the
    /// front, as brush planes are: the normal is `(p3-p1) x (p2-p1)`.
    /// Returns `None` if the points are collinear.
    pub fn from_points(p1: DVec3, p2: DVec3, p3: DVec3) -> Option<Self> {
        let normal = (p3 - p1).cross(p2 - p1).try_normalize()?;
        Some(Self::new(p1, normal))
    }

    pub fn anchor(&self) -> DVec3 {
        self.normal * self.distance
    }

    /// Signed distance of `point` from the plane.
    pub fn point_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) - self.distance
    }

    pub fn point_status(&self, point: DVec3) -> PointStatus {
        self.point_status_eps(point, POINT_STATUS_EPSILON)
    }

    pub fn point_status_eps(&self, point: DVec3, epsilon: f64) -> PointStatus {
        let distance = self.point_distance(point);
        if distance > epsilon {
            PointStatus::Above
        } else if distance < -epsilon {
            PointStatus::Below
        } else {
            PointStatus::Inside
        }
    }

    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            distance: -self.distance,
        }
    }

    /// Whether the two planes describe the same oriented plane.
    pub fn is_equal(&self, other: &Plane) -> bool {
        self.normal.dot(other.normal) > 1.0 - COLINEAR_EPSILON
            && (self.distance - other.distance).abs() < POINT_STATUS_EPSILON
    }

    /// Orthogonal projection of `point` onto the plane.
    pub fn project_point(&self, point: DVec3) -> DVec3 {
        point - self.normal * self.point_distance(point)
    }
}

/// A ray with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn point_at(&self, distance: f64) -> DVec3 {
        self.origin + self.direction * distance
    }

    /// Distance along the ray of the orthogonal projection of `point`.
    pub fn distance_to_point_on_ray(&self, point: DVec3) -> f64 {
        (point - self.origin).dot(self.direction)
    }

    /// Distance along the ray at which it pierces `plane`, if it does so in
    /// front of the origin and is not parallel to it.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<f64> {
        let cos = plane.normal.dot(self.direction);
        if cos.abs() < ALMOST_ZERO {
            return None;
        }
        let distance = -plane.point_distance(self.origin) / cos;
        if distance < 0.0 {
            None
        } else {
            Some(distance)
        }
    }

    /// Distance along the ray at which it pierces the convex polygon given
    /// by `vertices` (in boundary order, lying on `plane`).
    pub fn intersect_polygon(&self, plane: &Plane, vertices: &[DVec3]) -> Option<f64> {
        let distance = self.intersect_plane(plane)?;
        let point = self.point_at(distance);
        if polygon_contains_point(point, Some(plane.normal), vertices) {
            Some(distance)
        } else {
            None
        }
    }

    pub fn squared_distance_to_segment(&self, start: DVec3, end: DVec3) -> RaySegmentDistance {
        let u = end - start;
        let v = self.direction;
        let w0 = start - self.origin;

        let a = u.dot(u);
        let b = u.dot(v);
        let c = v.dot(v);
        let d = u.dot(w0);
        let e = v.dot(w0);

        let denom = a * c - b * b;
        if denom.abs() < ALMOST_ZERO {
            // Segment is parallel to the ray.
            let colinear = u.cross(w0).length_squared() < ALMOST_ZERO
                || w0.length_squared() < ALMOST_ZERO;
            let ray_distance = e.max(0.0);
            let closest_on_ray = self.point_at(ray_distance);
            let squared_distance =
                point_segment_squared_distance(closest_on_ray, start, end);
            return RaySegmentDistance {
                parallel: true,
                colinear,
                squared_distance,
                ray_distance,
            };
        }

        // Closest parameters of the infinite lines, then clamped to the
        // segment and the forward half of the ray.
        let sc = ((b * e - c * d) / denom).clamp(0.0, 1.0);
        let on_segment = start + u * sc;
        let ray_distance = self.distance_to_point_on_ray(on_segment).max(0.0);
        let on_ray = self.point_at(ray_distance);
        let squared_distance = point_segment_squared_distance(on_ray, start, end);

        RaySegmentDistance {
            parallel: false,
            colinear: false,
            squared_distance,
            ray_distance,
        }
    }
}

/// Result of a ray/segment distance query.
#[derive(Debug, Clone, Copy)]
pub struct RaySegmentDistance {
    pub parallel: bool,
    pub colinear: bool,
    pub squared_distance: f64,
    pub ray_distance: f64,
}

/// A line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: DVec3,
    pub end: DVec3,
}

impl Segment {
    pub fn new(start: DVec3, end: DVec3) -> Self {
        Self { start, end }
    }

    pub fn center(&self) -> DVec3 {
        (self.start + self.end) / 2.0
    }

    pub fn direction(&self) -> DVec3 {
        (self.end - self.start).normalize_or_zero()
    }

    pub fn contains(&self, point: DVec3, epsilon: f64) -> bool {
        point_segment_squared_distance(point, self.start, self.end) < epsilon * epsilon
    }
}

/// Squared distance of `point` from the segment `[start, end]`.
pub fn point_segment_squared_distance(point: DVec3, start: DVec3, end: DVec3) -> f64 {
    let dir = end - start;
    let len_sq = dir.length_squared();
    if len_sq < ALMOST_ZERO {
        return (point - start).length_squared();
    }
    let t = ((point - start).dot(dir) / len_sq).clamp(0.0, 1.0);
    (start + dir * t - point).length_squared()
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// An empty box that expands to the first merged point.
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::MAX),
            max: DVec3::splat(f64::MIN),
        }
    }

    pub fn from_point(point: DVec3) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    pub fn from_min_max(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn merged_with(&self, point: DVec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) / 2.0
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }
}

/// The normal of the polygon given by `vertices`, derived from the first
/// non-degenerate corner.
pub fn polygon_normal(vertices: &[DVec3]) -> Option<DVec3> {
    let n = vertices.len();
    for i in 0..n {
        let p1 = vertices[i];
        let p2 = vertices[(i + 1) % n];
        let p3 = vertices[(i + 2) % n];
        let normal = (p2 - p1).cross(p3 - p1);
        if normal.length_squared() > ALMOST_ZERO {
            return Some(normal.normalize());
        }
    }
    None
}

/// Whether `point` lies inside the convex polygon given by `vertices`,
/// assuming the point lies in the polygon's plane. The test projects onto
/// the dominant axis plane of the normal and runs an even-odd crossing test.
pub fn polygon_contains_point(
    point: DVec3,
    normal: Option<DVec3>,
    vertices: &[DVec3],
) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let normal = match normal.or_else(|| polygon_normal(vertices)) {
        Some(n) => n,
        None => return false,
    };

    // Select the two coordinates spanning the plane of maximal projection.
    let abs = normal.abs();
    let (u, v) = if abs.x >= abs.y && abs.x >= abs.z {
        (1, 2)
    } else if abs.y >= abs.x && abs.y >= abs.z {
        (0, 2)
    } else {
        (0, 1)
    };

    let px = point[u];
    let py = point[v];

    let mut contained = false;
    let n = vertices.len();
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let (ax, ay) = (a[u], a[v]);
        let (bx, by) = (b[u], b[v]);

        // Points on the boundary count as contained.
        if point_segment_squared_distance(
            DVec3::new(px, py, 0.0),
            DVec3::new(ax, ay, 0.0),
            DVec3::new(bx, by, 0.0),
        ) < ALMOST_ZERO
        {
            return true;
        }

        if (ay > py) != (by > py) {
            let x = ax + (py - ay) / (by - ay) * (bx - ax);
            if px < x {
                contained = !contained;
            }
        }
    }
    contained
}
