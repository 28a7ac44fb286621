// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use glam::DVec3;

use chisel_commons::geom::Plane;

use super::{Callbacks, NullCallbacks, Payload, Polyhedron};

impl<VP: Payload, FP: Payload> Polyhedron<VP, FP> {
    /// The intersection of this polyhedron with `other`. Returns an empty
    /// polyhedron if they do not overlap.
    pub fn intersect(&self, other: &Polyhedron<VP, FP>) -> Polyhedron<VP, FP> {
        self.intersect_with(other, &mut NullCallbacks)
    }

    #[profiling::function]
    pub fn intersect_with<C: Callbacks<VP, FP>>(
        &self,
        other: &Polyhedron<VP, FP>,
        callback: &mut C,
    ) -> Polyhedron<VP, FP> {
        let mut result = other.clone();
        for face in self.face_ids() {
            let plane = callback.plane(self, face);
            if result.clip_with(&plane, callback).is_empty() {
                return Polyhedron::new();
            }
        }
        result
    }

    /// Subtracts `subtrahend` from this polyhedron. The result is a list
    /// of convex fragments whose union is the difference; it is empty when
    /// the subtrahend covers this polyhedron entirely, and `[self]` when
    /// the two are disjoint.
    pub fn subtract(&self, subtrahend: &Polyhedron<VP, FP>) -> Vec<Polyhedron<VP, FP>> {
        self.subtract_with(subtrahend, &mut NullCallbacks)
    }

    #[profiling::function]
    pub fn subtract_with<C: Callbacks<VP, FP>>(
        &self,
        subtrahend: &Polyhedron<VP, FP>,
        callback: &mut C,
    ) -> Vec<Polyhedron<VP, FP>> {
        // Clip away the parts of the subtrahend outside the minuend; they
        // cannot affect the result but would produce needless fragments.
        let mut clipped = subtrahend.clone();
        for face in self.face_ids() {
            let plane = callback.plane(self, face);
            if clipped.clip_with(&plane, callback).is_empty() {
                // Disjoint operands leave the minuend untouched.
                return vec![self.clone()];
            }
        }

        let planes = sort_planes(
            clipped
                .face_ids()
                .map(|face| callback.plane(&clipped, face))
                .collect(),
        );

        let mut fragments = Vec::new();
        self.do_subtract(vec![self.clone()], &planes, &mut fragments, callback);
        fragments
    }

    /// Splits each fragment by the current plane: the part in front lies
    /// outside the subtrahend and is emitted, the part behind is processed
    /// against the remaining planes. Whatever ends up behind every plane
    /// lies inside the subtrahend and is discarded.
    fn do_subtract<C: Callbacks<VP, FP>>(
        &self,
        fragments: Vec<Polyhedron<VP, FP>>,
        planes: &[Plane],
        result: &mut Vec<Polyhedron<VP, FP>>,
        callback: &mut C,
    ) {
        let (current, remaining) = match planes.split_first() {
            Some(split) => split,
            None => return,
        };
        if fragments.is_empty() {
            return;
        }

        let inverted = current.flipped();
        let mut back_fragments = Vec::new();

        for fragment in fragments {
            let mut in_front = fragment.clone();
            if !in_front.clip_with(&inverted, callback).is_empty() {
                result.push(in_front);
            }

            let mut behind = fragment;
            if !behind.clip_with(current, callback).is_empty() {
                back_fragments.push(behind);
            }
        }

        self.do_subtract(back_fragments, remaining, result, callback);
    }
}

/* ======================== */
/*   Plane ordering         */
/* ======================== */

/// Orders the subtrahend's planes so that axis-aligned cuts come first:
/// one pass per axis picks the plane most anti-aligned with the axis and
/// then the one most aligned with the first pick's opposite. Ambiguities
/// fall through to the later axes. The ordering reduces fragment count and
/// keeps the early cuts numerically benign.
pub(crate) fn sort_planes(mut planes: Vec<Plane>) -> Vec<Plane> {
    let mut begin = 0;
    begin = sort_planes_for_axes(&mut planes, begin, &[DVec3::X, DVec3::Y, DVec3::Z]);
    begin = sort_planes_for_axes(&mut planes, begin, &[DVec3::Y, DVec3::X, DVec3::Z]);
    sort_planes_for_axes(&mut planes, begin, &[DVec3::Z, DVec3::X, DVec3::Y]);
    planes
}

fn sort_planes_for_axes(planes: &mut [Plane], begin: usize, axes: &[DVec3]) -> usize {
    let end = planes.len();
    if begin == end {
        return end;
    }

    let mut it = begin;
    while it != end {
        let next = select_planes(planes, it, axes);
        if next == it || next == end {
            break;
        }
        it = next;
    }
    it
}

/// Moves the two best planes for the primary axis to the front of the
/// unsorted range and returns the new start of the unsorted range.
fn select_planes(planes: &mut [Plane], mut begin: usize, axes: &[DVec3]) -> usize {
    let end = planes.len();
    debug_assert!(begin != end);
    debug_assert!(!axes.is_empty());

    let mut axis = axes[0];
    let mut best: Option<usize> = None;
    for current in begin..end {
        let mut new_best = select_plane(planes, current, best, axis);
        if new_best.is_none() {
            // Ambiguous under the primary axis; let the other axes decide.
            for &alternate in &axes[1..] {
                new_best = select_plane(planes, current, best, alternate);
                if new_best.is_some() {
                    break;
                }
            }
        }
        if new_best.is_some() {
            best = new_best;
        }
    }

    let best_index = match best {
        Some(index) => index,
        None => return end,
    };
    if planes[best_index].normal.dot(axis).abs() < 0.5 {
        // Nothing sufficiently aligned with this axis; no progress.
        return begin;
    }

    axis = -planes[best_index].normal;
    planes.swap(begin, best_index);
    begin += 1;

    // Select the counterpart pointing the other way.
    let mut best: Option<usize> = None;
    for current in begin..end {
        let best_dot = best.map_or(0.0, |b| planes[b].normal.dot(axis));
        let current_dot = planes[current].normal.dot(axis);
        if current_dot > best_dot {
            best = Some(current);
        }
        if best_dot == 1.0 {
            break;
        }
    }

    if let Some(second) = best {
        planes.swap(begin, second);
        begin += 1;
    }
    begin
}

/// Compares the plane at `current` with the best so far under `axis`.
/// Returns the better of the two, or `None` when the primary axis cannot
/// break the tie.
fn select_plane(
    planes: &[Plane],
    current: usize,
    best: Option<usize>,
    axis: DVec3,
) -> Option<usize> {
    let current_dot = planes[current].normal.dot(axis);
    if current_dot == 0.0 {
        return best;
    }
    if current_dot == 1.0 {
        return Some(current);
    }

    let best_dot = best.map_or(0.0, |b| planes[b].normal.dot(axis));
    if current_dot.abs() > best_dot.abs() {
        return Some(current);
    }
    if current_dot.abs() == best_dot.abs() {
        if best_dot < 0.0 && current_dot > 0.0 {
            // Prefer normals pointing with the axis.
            return Some(current);
        }
        return None;
    }
    best
}
