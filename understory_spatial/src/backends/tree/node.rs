// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node storage for the adaptive trees: dimensionality, slot masks, and the node arena.

use core::fmt::Debug;

use smallvec::SmallVec;

use crate::entry::EntryKey;
use crate::types::{Aabb3D, Axis, BoundingVolume, Point3};

/// Dimensionality of an adaptive tree.
///
/// A node splits at its midpoint along each of the first [`AXES`](Self::AXES)
/// axes, giving `2^AXES` child slots. Axes beyond that are ignored and points
/// are flattened onto them.
pub trait Dimension: Copy + Debug + Default + 'static {
    /// Number of axes the tree splits along.
    const AXES: usize;

    /// Number of child slots of an internal node.
    const SLOTS: usize = 1 << Self::AXES;

    /// Fixed-size child storage.
    type Slots<T: Copy + Default + Debug>: Copy + Default + Debug + AsRef<[T]> + AsMut<[T]>;

    /// Project a point onto the space this tree indexes.
    fn flatten(p: Point3) -> Point3;
}

/// Three axes, eight children per node.
#[derive(Copy, Clone, Debug, Default)]
pub struct Dim3;

impl Dimension for Dim3 {
    const AXES: usize = 3;

    type Slots<T: Copy + Default + Debug> = [T; 8];

    #[inline]
    fn flatten(p: Point3) -> Point3 {
        p
    }
}

/// Two axes (`z` is pinned to zero), four children per node.
#[derive(Copy, Clone, Debug, Default)]
pub struct Dim2;

impl Dimension for Dim2 {
    const AXES: usize = 2;

    type Slots<T: Copy + Default + Debug> = [T; 4];

    #[inline]
    fn flatten(p: Point3) -> Point3 {
        Point3::new(p.x, p.y, 0.0)
    }
}

bitflags::bitflags! {
    /// Set of child slots, one bit per slot.
    ///
    /// Bit `a` of a slot index is set when the slot covers the upper half of
    /// axis `a` (x = bit 0, y = bit 1, z = bit 2).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub(crate) struct SlotMask: u8 {
        const LOW_X_LOW_Y_LOW_Z = 1 << 0;
        const HIGH_X_LOW_Y_LOW_Z = 1 << 1;
        const LOW_X_HIGH_Y_LOW_Z = 1 << 2;
        const HIGH_X_HIGH_Y_LOW_Z = 1 << 3;
        const LOW_X_LOW_Y_HIGH_Z = 1 << 4;
        const HIGH_X_LOW_Y_HIGH_Z = 1 << 5;
        const LOW_X_HIGH_Y_HIGH_Z = 1 << 6;
        const HIGH_X_HIGH_Y_HIGH_Z = 1 << 7;
    }
}

impl SlotMask {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Slot indices are below 8."
    )]
    #[inline]
    pub(crate) fn slot(slot: usize) -> Self {
        debug_assert!(slot < 8, "slot index out of range: {slot}");
        Self::from_bits_retain(1_u8 << slot as u8)
    }

    #[inline]
    pub(crate) fn has(self, slot: usize) -> bool {
        self.contains(Self::slot(slot))
    }

    /// Slots of a node split at `mid` whose region may overlap `volume`.
    pub(crate) fn overlapping<D: Dimension, B: BoundingVolume + ?Sized>(
        mid: Point3,
        volume: &B,
    ) -> Self {
        let mut lower = [true; 3];
        let mut upper = [true; 3];
        for &axis in &Axis::ALL[..D::AXES] {
            let m = mid.get(axis);
            lower[axis.index()] = volume.min(axis) < m;
            upper[axis.index()] = volume.max(axis) >= m;
        }
        let mut mask = Self::empty();
        for slot in 0..D::SLOTS {
            let hit = Axis::ALL[..D::AXES].iter().all(|&axis| {
                if slot & (1 << axis.index()) != 0 {
                    upper[axis.index()]
                } else {
                    lower[axis.index()]
                }
            });
            if hit {
                mask |= Self::slot(slot);
            }
        }
        mask
    }
}

/// Child slot of a node split at `mid` that `p` routes to.
#[inline]
pub(crate) fn slot_of<D: Dimension>(mid: Point3, p: Point3) -> usize {
    let mut slot = 0;
    for &axis in &Axis::ALL[..D::AXES] {
        if p.get(axis) >= mid.get(axis) {
            slot |= 1 << axis.index();
        }
    }
    slot
}

/// Bounds of child `slot` of a node with `bounds` split at `mid`.
pub(crate) fn child_bounds<D: Dimension>(bounds: &Aabb3D, mid: Point3, slot: usize) -> Aabb3D {
    let mut min = bounds.min;
    let mut max = bounds.max;
    for &axis in &Axis::ALL[..D::AXES] {
        let (lo, hi) = if slot & (1 << axis.index()) != 0 {
            (mid.get(axis), bounds.max.get(axis))
        } else {
            (bounds.min.get(axis), mid.get(axis))
        };
        match axis {
            Axis::X => (min.x, max.x) = (lo, hi),
            Axis::Y => (min.y, max.y) = (lo, hi),
            Axis::Z => (min.z, max.z) = (lo, hi),
        }
    }
    Aabb3D { min, max }
}

/// Identifier for a node in the arena (generational).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32, u32);

impl NodeId {
    const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }
}

pub(crate) type LeafEntries = SmallVec<[EntryKey; 8]>;

#[derive(Clone, Debug)]
pub(crate) enum NodeKind<D: Dimension> {
    Leaf(LeafEntries),
    Internal(D::Slots<Option<NodeId>>),
}

#[derive(Clone, Debug)]
pub(crate) struct Node<D: Dimension> {
    generation: u32,
    pub(crate) parent: Option<NodeId>,
    pub(crate) bounds: Aabb3D,
    pub(crate) mid: Point3,
    pub(crate) depth: u16,
    /// Entries in this subtree.
    pub(crate) len: usize,
    /// Bumped on every structural change to this node or its subtree count.
    pub(crate) mod_count: u64,
    pub(crate) kind: NodeKind<D>,
}

impl<D: Dimension> Node<D> {
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub(crate) fn touch(&mut self) {
        self.mod_count = self.mod_count.wrapping_add(1);
    }

    /// Whether `p` routes through this node.
    ///
    /// Lower edges are inclusive and upper edges exclusive, except where the
    /// upper edge is the edge of the whole tree (`outer`).
    pub(crate) fn owns(&self, p: Point3, outer: &Aabb3D) -> bool {
        Axis::ALL[..D::AXES].iter().all(|&axis| {
            let v = p.get(axis);
            let hi = self.bounds.max.get(axis);
            v >= self.bounds.min.get(axis) && (v < hi || (v == hi && hi == outer.max.get(axis)))
        })
    }

    /// Present child ids, by slot.
    pub(crate) fn children(&self) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        let slots: &[Option<NodeId>] = match &self.kind {
            NodeKind::Leaf(_) => &[],
            NodeKind::Internal(children) => children.as_ref(),
        };
        slots
            .iter()
            .enumerate()
            .filter_map(|(slot, child)| child.map(|c| (slot, c)))
    }
}

/// Arena of tree nodes. Freed slots are reused with a bumped generation.
#[derive(Clone, Debug)]
pub(crate) struct NodeArena<D: Dimension> {
    nodes: Vec<Option<Node<D>>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl<D: Dimension> Default for NodeArena<D> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }
}

impl<D: Dimension> NodeArena<D> {
    /// Allocate an empty leaf.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "NodeId uses 32-bit indices by design."
    )]
    pub(crate) fn alloc(&mut self, parent: Option<NodeId>, bounds: Aabb3D, depth: u16) -> NodeId {
        let make = |generation| Node {
            generation,
            parent,
            bounds,
            mid: bounds.center(),
            depth,
            len: 0,
            mod_count: 0,
            kind: NodeKind::Leaf(LeafEntries::new()),
        };
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].wrapping_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(make(generation));
            (idx, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(make(generation)));
            self.generations.push(generation);
            (self.nodes.len() - 1, generation)
        };
        NodeId::new(idx as u32, generation)
    }

    pub(crate) fn free(&mut self, id: NodeId) {
        if self.get(id).is_some() {
            self.nodes[id.idx()] = None;
            self.free_list.push(id.idx());
        }
    }

    /// Drop every node and allocate a fresh root leaf.
    pub(crate) fn reset(&mut self, bounds: Aabb3D) -> NodeId {
        for (idx, node) in self.nodes.iter_mut().enumerate() {
            if node.take().is_some() {
                self.free_list.push(idx);
            }
        }
        self.alloc(None, bounds, 0)
    }

    /// The node, if `id` is still alive.
    pub(crate) fn get(&self, id: NodeId) -> Option<&Node<D>> {
        self.nodes
            .get(id.idx())?
            .as_ref()
            .filter(|n| n.generation == id.1)
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node<D> {
        self.get(id).expect("dangling NodeId")
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node<D> {
        self.nodes
            .get_mut(id.idx())
            .and_then(Option::as_mut)
            .filter(|n| n.generation == id.1)
            .expect("dangling NodeId")
    }

    /// Number of live nodes.
    pub(crate) fn live(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }
}
