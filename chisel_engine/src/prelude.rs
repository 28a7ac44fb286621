// Copyright (C) 2023 the chisel contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub use glam::DVec3;

pub use itertools::Itertools;
pub use std::collections::{BTreeMap, HashMap, HashSet};

pub use crate::mesh;
pub use crate::mesh::*;

pub use chisel_commons::geom::*;
pub use chisel_commons::math::*;
pub use chisel_commons::utils::*;
