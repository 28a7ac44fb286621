// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Ordered float wrappers and scalar helpers
pub mod math;

/// Planes, rays, segments, bounding boxes and the predicates built on them
pub mod geom;

/// Small-vector aliases and iterator helpers
pub mod utils;
