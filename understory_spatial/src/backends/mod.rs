// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Index implementations.
//!
//! - `tree`: adaptive region trees over a fixed box. [`OctreeMap`] splits each
//!   node into eight children, [`QuadMap`] into four and ignores `z`. Leaves
//!   subdivide past the divide threshold and collapse back below the unify
//!   threshold, so the shape tracks the data.
//! - `sweep`: [`SweepAndPrune`], a flat list sorted lazily along the axis of
//!   greatest spread. Cheap to mutate, and needs no bounds.
//!
//! Ownership is half-open
//! ----------------------
//! A node splits its box at the midpoint. Coordinates at or above the
//! midpoint along an axis belong to the upper child, so every point has
//! exactly one owner. The outer maximum edge of the tree is inclusive.

pub(crate) mod sweep;
pub(crate) mod tree;

pub use sweep::{SweepAndPrune, SweepCursor, SweepIter};
pub use tree::{
    AdaptiveTree, Dim2, Dim3, Dimension, NodeView, OctreeMap, QuadMap, TreeCursor, TreeIter,
};
