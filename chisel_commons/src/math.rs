// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ops::{Add, Mul, Sub};

use float_ord::FloatOrd;
use glam::DVec3;

/// Distances below this are treated as zero.
pub const ALMOST_ZERO: f64 = 1e-9;

/// Tolerance for collinearity and normal-alignment tests.
pub const COLINEAR_EPSILON: f64 = 1e-5;

/// Tolerance for classifying a point against a plane. Brush geometry is
/// authored on integer grids, so this is deliberately coarse.
pub const POINT_STATUS_EPSILON: f64 = 1e-2;

/// Tolerance for snapping vertex components to rounded values.
pub const CORRECT_EPSILON: f64 = 1e-3;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vec3Ord([FloatOrd<f64>; 3]);

pub trait ToOrd<T>
where
    T: Eq + PartialEq + Ord + PartialOrd + std::hash::Hash + Copy,
{
    fn to_ord(&self) -> T;
}

impl ToOrd<Vec3Ord> for DVec3 {
    fn to_ord(&self) -> Vec3Ord {
        Vec3Ord([FloatOrd(self.x), FloatOrd(self.y), FloatOrd(self.z)])
    }
}

pub trait ToVec<T> {
    fn to_vec(&self) -> T;
}

impl ToVec<DVec3> for Vec3Ord {
    fn to_vec(&self) -> DVec3 {
        DVec3::new(self.0[0].0, self.0[1].0, self.0[2].0)
    }
}

pub fn lerp<T>(start: T, end: T, t: f64) -> T
where
    T: Copy + Add<Output = T> + Sub<Output = T> + Mul<f64, Output = T>,
{
    start + (end - start) * t
}

/// Snaps `value` to `decimals` decimal places when it is within `epsilon`
/// of the snapped value. Used to cancel accumulated float drift.
pub fn correct(value: f64, decimals: u32, epsilon: f64) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if (value - rounded).abs() < epsilon {
        rounded
    } else {
        value
    }
}

/// Componentwise [`correct`].
pub fn correct_vec(v: DVec3, decimals: u32, epsilon: f64) -> DVec3 {
    DVec3::new(
        correct(v.x, decimals, epsilon),
        correct(v.y, decimals, epsilon),
        correct(v.z, decimals, epsilon),
    )
}

/// Whether the three points lie on a common line.
pub fn colinear(p0: DVec3, p1: DVec3, p2: DVec3) -> bool {
    let v1 = (p1 - p0).normalize_or_zero();
    let v2 = (p2 - p0).normalize_or_zero();
    v1.cross(v2).length_squared() < COLINEAR_EPSILON
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_correct() {
        assert_eq!(correct(0.9999999, 0, CORRECT_EPSILON), 1.0);
        assert_eq!(correct(1.0000001, 0, CORRECT_EPSILON), 1.0);
        assert_eq!(correct(1.25, 0, CORRECT_EPSILON), 1.25);
        assert_eq!(correct(1.2500004, 2, CORRECT_EPSILON), 1.25);
    }

    #[test]
    fn test_colinear() {
        let a = DVec3::new(0.0, 0.0, 0.0);
        let b = DVec3::new(1.0, 1.0, 0.0);
        let c = DVec3::new(3.0, 3.0, 0.0);
        assert!(colinear(a, b, c));
        assert!(colinear(c, a, b));
        assert!(!colinear(a, b, DVec3::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_ord_roundtrip() {
        let v = DVec3::new(1.5, -2.25, 0.0);
        assert_eq!(v.to_ord().to_vec(), v);
    }
}
