// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adaptive octree and quadtree over a fixed region.
//!
//! Leaves split into `2^AXES` children at their midpoint once they would
//! reach the divide threshold, and internal nodes collapse back into a leaf
//! once their subtree holds no more than the unify threshold.
//!
//! Ownership along each split axis is half-open: a point exactly on a
//! midpoint belongs to the upper child. The outer maximum of the tree is
//! the one upper edge that is inclusive, so the whole closed region is
//! addressable.

mod cursor;
mod node;
mod rebuild;
mod view;

use core::fmt::Debug;
use std::path::PathBuf;

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::trace;

use crate::config::TreeConfig;
use crate::entry::{EntryArena, EntryKey};
use crate::error::{Result, SpatialError};
use crate::index::{SpatialIndex, Visitor, nearest_within};
use crate::types::{Aabb3D, BoundingVolume, Point3};

pub use cursor::{TreeCursor, TreeIter};
pub use node::{Dim2, Dim3, Dimension};
pub use view::NodeView;

use node::{LeafEntries, NodeArena, NodeId, NodeKind, SlotMask, child_bounds, slot_of};

/// Adaptive octree: eight children per internal node.
pub type OctreeMap<V> = AdaptiveTree<V, Dim3>;

/// Adaptive quadtree: four children per internal node, `z` pinned to zero.
pub type QuadMap<V> = AdaptiveTree<V, Dim2>;

#[derive(Clone, Debug)]
enum Lifecycle {
    Live,
    /// Entries live in the file at this path.
    Hibernating(PathBuf),
}

struct TreeInner<V, D: Dimension> {
    config: TreeConfig,
    bounds: Aabb3D,
    nodes: NodeArena<D>,
    entries: EntryArena<V, NodeId>,
    root: NodeId,
    lifecycle: Lifecycle,
}

impl<V, D: Dimension> TreeInner<V, D> {
    fn new(bounds: Aabb3D, config: TreeConfig) -> Self {
        let bounds = Aabb3D::new(D::flatten(bounds.min), D::flatten(bounds.max));
        let mut nodes = NodeArena::default();
        let root = nodes.reset(bounds);
        Self {
            config,
            bounds,
            nodes,
            entries: EntryArena::default(),
            root,
            lifecycle: Lifecycle::Live,
        }
    }

    fn ensure_live(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Live => Ok(()),
            Lifecycle::Hibernating(_) => Err(SpatialError::Hibernating),
        }
    }

    /// Flatten `p` and check it against the tree bounds.
    fn admit(&self, p: Point3) -> Result<Point3> {
        let p = D::flatten(p);
        if self.nodes.node(self.root).owns(p, &self.bounds) {
            Ok(p)
        } else {
            Err(SpatialError::out_of_bounds(p))
        }
    }

    /// Drop every entry and node, keeping key generations.
    fn reset(&mut self) {
        self.root = self.nodes.reset(self.bounds);
        self.entries.clear();
    }

    fn insert(&mut self, value: V, point: Point3) -> Result<EntryKey> {
        self.ensure_live()?;
        let point = self.admit(point)?;
        let key = self.entries.insert(point, value, self.root);
        self.add_at(self.root, key, point);
        Ok(key)
    }

    /// Route `key` down from `id`, splitting any leaf that fills up.
    fn add_at(&mut self, mut id: NodeId, key: EntryKey, point: Point3) {
        let divide = self.config.divide_threshold();
        let max_depth = self.config.max_depth();
        loop {
            let node = self.nodes.node_mut(id);
            node.len += 1;
            node.touch();
            let depth = node.depth;
            if let NodeKind::Leaf(entries) = &mut node.kind {
                if entries.len() + 1 < divide || depth >= max_depth {
                    entries.push(key);
                    self.entries.slot_mut(key).owner = id;
                    return;
                }
                let moved = core::mem::take(entries);
                node.kind = NodeKind::Internal(Default::default());
                self.redistribute(id, moved);
            }
            let mid = self.nodes.node(id).mid;
            id = self.child_or_create(id, slot_of::<D>(mid, point));
        }
    }

    /// Hand the entries of a leaf that just became internal to its children.
    fn redistribute(&mut self, id: NodeId, entries: LeafEntries) {
        trace!(
            node = ?id,
            depth = self.nodes.node(id).depth,
            entries = entries.len(),
            "subdivide"
        );
        let mid = self.nodes.node(id).mid;
        for key in entries {
            let point = self.entries.slot(key).point;
            let child = self.child_or_create(id, slot_of::<D>(mid, point));
            self.add_at(child, key, point);
        }
    }

    fn child_or_create(&mut self, id: NodeId, slot: usize) -> NodeId {
        let node = self.nodes.node(id);
        let existing = match &node.kind {
            NodeKind::Internal(children) => children.as_ref()[slot],
            NodeKind::Leaf(_) => None,
        };
        if let Some(child) = existing {
            return child;
        }
        let (bounds, depth) = (child_bounds::<D>(&node.bounds, node.mid, slot), node.depth + 1);
        let child = self.nodes.alloc(Some(id), bounds, depth);
        if let NodeKind::Internal(children) = &mut self.nodes.node_mut(id).kind {
            children.as_mut()[slot] = Some(child);
        }
        child
    }

    /// Unlink `key` from its leaf and fix counts up to and including `top`,
    /// collapsing the highest node on that path that fell to the unify
    /// threshold. The entry slot itself is left alone.
    fn detach(&mut self, key: EntryKey, top: NodeId) {
        let leaf = self.entries.slot(key).owner;
        if let NodeKind::Leaf(entries) = &mut self.nodes.node_mut(leaf).kind
            && let Some(pos) = entries.iter().position(|&k| k == key)
        {
            entries.swap_remove(pos);
        }
        let unify = self.config.unify_threshold();
        let mut collapse = None;
        let mut cur = leaf;
        loop {
            let node = self.nodes.node_mut(cur);
            node.len -= 1;
            node.touch();
            if !node.is_leaf() && node.len <= unify {
                collapse = Some(cur);
            }
            if cur == top {
                break;
            }
            cur = node.parent.expect("detach stops at an ancestor of the leaf");
        }
        if let Some(id) = collapse {
            self.unify(id);
        }
    }

    /// Turn an internal node back into a leaf holding its whole subtree.
    fn unify(&mut self, id: NodeId) {
        let mut gathered = LeafEntries::new();
        self.drain(id, &mut gathered);
        for &key in &gathered {
            self.entries.slot_mut(key).owner = id;
        }
        let node = self.nodes.node_mut(id);
        trace!(node = ?id, depth = node.depth, entries = gathered.len(), "unify");
        node.kind = NodeKind::Leaf(gathered);
        node.touch();
    }

    /// Move every entry below `id` into `out` in traversal order, freeing the
    /// descendants of `id`.
    fn drain(&mut self, id: NodeId, out: &mut LeafEntries) {
        let node = self.nodes.node_mut(id);
        match core::mem::replace(&mut node.kind, NodeKind::Leaf(LeafEntries::new())) {
            NodeKind::Leaf(entries) => out.extend(entries),
            NodeKind::Internal(children) => {
                for &child in children.as_ref().iter().flatten() {
                    self.drain(child, out);
                    self.nodes.free(child);
                }
            }
        }
    }

    fn remove(&mut self, key: EntryKey) -> Result<V> {
        self.ensure_live()?;
        self.entries.get(key)?;
        self.detach(key, self.root);
        Ok(self.entries.remove(key)?.value)
    }

    fn move_entry(&mut self, key: EntryKey, point: Point3) -> Result<()> {
        self.ensure_live()?;
        let point = self.admit(point)?;
        let leaf = self.entries.get(key)?.owner;
        let mut anchor = leaf;
        while !self.nodes.node(anchor).owns(point, &self.bounds) {
            anchor = self
                .nodes
                .node(anchor)
                .parent
                .expect("the root owns every admitted point");
        }
        if anchor == leaf {
            self.entries.slot_mut(key).point = point;
            self.nodes.node_mut(leaf).touch();
            return Ok(());
        }
        self.detach(key, anchor);
        self.entries.slot_mut(key).point = point;
        self.add_at(anchor, key, point);
        Ok(())
    }

    fn intersect<B, C>(&self, region: &B, visitor: &mut C) -> usize
    where
        B: BoundingVolume + ?Sized,
        C: Visitor<V>,
    {
        let mut hits = 0;
        let mut stack: SmallVec<[NodeId; 32]> = SmallVec::new();
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            let node = self.nodes.node(id);
            if node.len == 0 || !node.bounds.overlaps_volume(region, D::AXES) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(entries) => {
                    for &key in entries {
                        let slot = self.entries.slot(key);
                        let p = slot.point;
                        if region.includes(p.x, p.y, p.z) {
                            visitor.found(key, &slot.value, p);
                            hits += 1;
                        }
                    }
                }
                NodeKind::Internal(children) => {
                    let mask = SlotMask::overlapping::<D, B>(node.mid, region);
                    // Reversed so children pop in slot order.
                    for (slot, child) in children.as_ref().iter().enumerate().rev() {
                        if let Some(child) = child
                            && mask.has(slot)
                        {
                            stack.push(*child);
                        }
                    }
                }
            }
        }
        hits
    }

    /// The leaf `p` routes to, if the path exists.
    fn leaf_for(&self, p: Point3) -> Option<&LeafEntries> {
        let mut id = self.root;
        loop {
            let node = self.nodes.node(id);
            match &node.kind {
                NodeKind::Leaf(entries) => return Some(entries),
                NodeKind::Internal(children) => {
                    id = children.as_ref()[slot_of::<D>(node.mid, p)]?;
                }
            }
        }
    }

    fn find_exact(&self, p: Point3) -> Option<EntryKey> {
        let p = self.admit(p).ok()?;
        self.leaf_for(p)?
            .iter()
            .copied()
            .find(|&k| self.entries.slot(k).point == p)
    }
}

/// Adaptive spatial tree over a fixed region.
///
/// Use through the [`OctreeMap`] and [`QuadMap`] aliases. The tree owns its
/// entries; callers hold [`EntryKey`] handles to move or remove them.
///
/// All operations take `&self` and synchronize on one reader-writer lock per
/// tree: queries run concurrently with each other, and mutations are
/// exclusive. Visitors passed to [`intersect`](SpatialIndex::intersect) run
/// under the read lock and must not mutate the tree.
///
/// ```rust
/// use understory_spatial::{Aabb3D, OctreeMap, Point3, SpatialIndex, TreeConfig};
///
/// let tree = OctreeMap::new(
///     Aabb3D::from_coords(-10., -10., -10., 10., 10., 10.),
///     TreeConfig::new(6, 2).unwrap(),
/// );
/// let k = tree.insert("a", Point3::new(5., 5., 5.)).unwrap();
/// assert_eq!(tree.get_within(5., 5., 5., 0.01).unwrap(), Some("a"));
/// tree.move_entry(k, Point3::new(-5., -5., -5.)).unwrap();
/// assert!(tree.contains(-5., -5., -5.).unwrap());
/// assert_eq!(tree.remove(k).unwrap(), "a");
/// ```
pub struct AdaptiveTree<V, D: Dimension> {
    inner: RwLock<TreeInner<V, D>>,
}

impl<V, D: Dimension> Debug for AdaptiveTree<V, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.read_recursive();
        f.debug_struct("AdaptiveTree")
            .field("bounds", &inner.bounds)
            .field("config", &inner.config)
            .field("len", &inner.entries.len())
            .field("nodes", &inner.nodes.live())
            .field("lifecycle", &inner.lifecycle)
            .finish_non_exhaustive()
    }
}

impl<V, D: Dimension> AdaptiveTree<V, D> {
    /// Create an empty tree covering `bounds` (edges included).
    ///
    /// Planar trees ignore the `z` extent of `bounds`.
    pub fn new(bounds: Aabb3D, config: TreeConfig) -> Self {
        Self {
            inner: RwLock::new(TreeInner::new(bounds, config)),
        }
    }

    /// Region covered by the tree.
    pub fn bounds(&self) -> Aabb3D {
        self.inner.read_recursive().bounds
    }

    /// Subdivision thresholds in use.
    pub fn config(&self) -> TreeConfig {
        self.inner.read_recursive().config
    }

    /// Whether the entries currently live in a hibernation file.
    pub fn is_hibernating(&self) -> bool {
        matches!(self.inner.read_recursive().lifecycle, Lifecycle::Hibernating(_))
    }

    /// Number of live tree nodes, the root included.
    pub fn node_count(&self) -> Result<usize> {
        let inner = self.inner.read_recursive();
        inner.ensure_live()?;
        Ok(inner.nodes.live())
    }

    /// Snapshot handle on the root node.
    pub fn root_view(&self) -> Result<NodeView<'_, V, D>> {
        let inner = self.inner.read_recursive();
        inner.ensure_live()?;
        Ok(NodeView::capture(self, &*inner, inner.root))
    }

    /// Iterate every entry, depth first in slot order.
    ///
    /// The iterator holds the read lock until dropped, so the tree cannot be
    /// mutated while it is alive; use [`cursor`](Self::cursor) to remove
    /// entries during iteration.
    pub fn iter(&self) -> Result<TreeIter<'_, V, D>> {
        let inner = self.inner.read_recursive();
        inner.ensure_live()?;
        Ok(TreeIter::new(inner))
    }

    /// Exclusive iteration that can remove the entry it just yielded.
    pub fn cursor(&mut self) -> Result<TreeCursor<'_, V, D>> {
        let inner = self.inner.get_mut();
        inner.ensure_live()?;
        Ok(TreeCursor::new(inner))
    }

    /// Key of some entry sitting exactly at `point`.
    pub fn key_at(&self, point: Point3) -> Result<Option<EntryKey>> {
        let inner = self.inner.read_recursive();
        inner.ensure_live()?;
        Ok(inner.find_exact(point))
    }
}

impl<V> QuadMap<V> {
    /// Create an empty quadtree covering `rect`.
    pub fn from_rect(rect: kurbo::Rect, config: TreeConfig) -> Self {
        Self::new(Aabb3D::from_rect(rect), config)
    }
}

impl<V, D: Dimension> SpatialIndex<V> for AdaptiveTree<V, D> {
    fn insert(&self, value: V, point: Point3) -> Result<EntryKey> {
        self.inner.write().insert(value, point)
    }

    fn remove(&self, key: EntryKey) -> Result<V> {
        self.inner.write().remove(key)
    }

    fn move_entry(&self, key: EntryKey, point: Point3) -> Result<()> {
        self.inner.write().move_entry(key, point)
    }

    fn position(&self, key: EntryKey) -> Result<Point3> {
        let inner = self.inner.read_recursive();
        inner.ensure_live()?;
        Ok(inner.entries.get(key)?.point)
    }

    fn intersect<B, C>(&self, region: &B, mut visitor: C) -> Result<usize>
    where
        B: BoundingVolume + ?Sized,
        C: Visitor<V>,
    {
        let inner = self.inner.read_recursive();
        inner.ensure_live()?;
        Ok(inner.intersect(region, &mut visitor))
    }

    fn len(&self) -> Result<usize> {
        let inner = self.inner.read_recursive();
        inner.ensure_live()?;
        Ok(inner.entries.len())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_live()?;
        inner.reset();
        Ok(())
    }

    fn contains(&self, x: f64, y: f64, z: f64) -> Result<bool> {
        Ok(self.key_at(Point3::new(x, y, z))?.is_some())
    }

    fn get(&self, x: f64, y: f64, z: f64) -> Result<Option<V>>
    where
        V: Clone,
    {
        let inner = self.inner.read_recursive();
        inner.ensure_live()?;
        Ok(inner
            .find_exact(Point3::new(x, y, z))
            .map(|k| inner.entries.slot(k).value.clone()))
    }

    fn get_within(&self, x: f64, y: f64, z: f64, radius: f64) -> Result<Option<V>>
    where
        V: Clone,
    {
        nearest_within(self, D::flatten(Point3::new(x, y, z)), radius)
    }
}
