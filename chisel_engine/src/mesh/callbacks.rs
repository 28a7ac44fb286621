// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chisel_commons::geom::Plane;

use super::{FaceId, Payload, Polyhedron, VertexId};

/// Observers for structural changes of a polyhedron. Every mutating
/// operation has a `_with` variant that reports created, deleted and
/// changed entities through this trait, so callers can keep payloads and
/// derived data in sync. All methods have no-op defaults.
pub trait Callbacks<VP: Payload, FP: Payload> {
    fn vertex_was_created(&mut self, _poly: &Polyhedron<VP, FP>, _vertex: VertexId) {}
    fn vertex_will_be_deleted(&mut self, _poly: &Polyhedron<VP, FP>, _vertex: VertexId) {}
    fn vertex_was_added(&mut self, _poly: &Polyhedron<VP, FP>, _vertex: VertexId) {}
    fn vertex_will_be_removed(&mut self, _poly: &Polyhedron<VP, FP>, _vertex: VertexId) {}

    /// The plane of a face. The default derives it from the boundary; a
    /// caller that stores authoritative planes in face payloads can
    /// override this. Must be pure and deterministic; clipping and CSG
    /// rely on repeated calls agreeing with each other.
    fn plane(&self, poly: &Polyhedron<VP, FP>, face: FaceId) -> Plane {
        poly.face_plane(face)
    }

    fn face_was_created(&mut self, _poly: &Polyhedron<VP, FP>, _face: FaceId) {}
    fn face_will_be_deleted(&mut self, _poly: &Polyhedron<VP, FP>, _face: FaceId) {}
    fn face_did_change(&mut self, _poly: &Polyhedron<VP, FP>, _face: FaceId) {}
    fn face_was_flipped(&mut self, _poly: &Polyhedron<VP, FP>, _face: FaceId) {}
    fn face_was_split(
        &mut self,
        _poly: &Polyhedron<VP, FP>,
        _original: FaceId,
        _clone: FaceId,
    ) {
    }
    fn faces_will_be_merged(
        &mut self,
        _poly: &Polyhedron<VP, FP>,
        _remaining: FaceId,
        _to_delete: FaceId,
    ) {
    }
}

/// The do-nothing observer used by the callback-free operation variants.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCallbacks;

impl<VP: Payload, FP: Payload> Callbacks<VP, FP> for NullCallbacks {}
