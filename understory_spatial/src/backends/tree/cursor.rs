// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Depth-first iteration over tree entries.

use core::fmt::Debug;

use parking_lot::RwLockReadGuard;
use smallvec::SmallVec;

use super::node::{Dimension, NodeArena, NodeId, NodeKind};
use super::TreeInner;
use crate::entry::{Entry, EntryKey};

#[derive(Copy, Clone, Debug)]
enum Frame {
    /// `yielded` doubles as the index of the next entry in the leaf.
    Leaf { node: NodeId, yielded: usize },
    Internal {
        node: NodeId,
        next_slot: usize,
        yielded: usize,
    },
}

impl Frame {
    fn start<D: Dimension>(nodes: &NodeArena<D>, node: NodeId) -> Self {
        if nodes.node(node).is_leaf() {
            Self::Leaf { node, yielded: 0 }
        } else {
            Self::Internal {
                node,
                next_slot: 0,
                yielded: 0,
            }
        }
    }

    fn yielded_mut(&mut self) -> &mut usize {
        match self {
            Self::Leaf { yielded, .. } | Self::Internal { yielded, .. } => yielded,
        }
    }
}

/// Stack of per-node positions, from the root down to the current leaf.
///
/// Each frame counts how many entries of its subtree have been yielded.
/// Subtree order matches the order in which unification gathers entries, so
/// when a removal collapses a subtree into a leaf, the count of the
/// collapsed frame is also the index of the next entry in the new leaf.
#[derive(Clone, Debug)]
struct Walk {
    stack: SmallVec<[Frame; 16]>,
}

impl Walk {
    fn new<V, D: Dimension>(inner: &TreeInner<V, D>) -> Self {
        let mut stack = SmallVec::new();
        stack.push(Frame::start(&inner.nodes, inner.root));
        Self { stack }
    }

    fn advance<V, D: Dimension>(&mut self, inner: &TreeInner<V, D>) -> Option<EntryKey> {
        loop {
            let top = self.stack.last_mut()?;
            match *top {
                Frame::Leaf { node, yielded } => {
                    let next = match &inner.nodes.node(node).kind {
                        NodeKind::Leaf(entries) => entries.get(yielded).copied(),
                        NodeKind::Internal(_) => None,
                    };
                    match next {
                        Some(key) => {
                            for frame in &mut self.stack {
                                *frame.yielded_mut() += 1;
                            }
                            return Some(key);
                        }
                        None => {
                            self.stack.pop();
                        }
                    }
                }
                Frame::Internal {
                    node, next_slot, ..
                } => {
                    let child = inner
                        .nodes
                        .node(node)
                        .children()
                        .find(|&(slot, c)| slot >= next_slot && inner.nodes.node(c).len > 0);
                    match child {
                        Some((slot, child)) => {
                            if let Frame::Internal { next_slot, .. } = top {
                                *next_slot = slot + 1;
                            }
                            let frame = Frame::start(&inner.nodes, child);
                            self.stack.push(frame);
                        }
                        None => {
                            self.stack.pop();
                        }
                    }
                }
            }
        }
    }

    /// Re-align after the entry yielded last was removed.
    fn removed<V, D: Dimension>(&mut self, inner: &TreeInner<V, D>) {
        for frame in &mut self.stack {
            *frame.yielded_mut() -= 1;
        }
        let collapsed = self.stack.iter().position(|frame| match *frame {
            Frame::Internal { node, .. } => inner.nodes.get(node).is_none_or(|n| n.is_leaf()),
            Frame::Leaf { .. } => false,
        });
        if let Some(depth) = collapsed
            && let Frame::Internal { node, yielded, .. } = self.stack[depth]
        {
            self.stack.truncate(depth);
            self.stack.push(Frame::Leaf { node, yielded });
        }
    }
}

/// Shared iterator over the entries of a tree.
///
/// Holds the tree's read lock for its whole lifetime.
pub struct TreeIter<'a, V, D: Dimension> {
    guard: RwLockReadGuard<'a, TreeInner<V, D>>,
    walk: Walk,
    remaining: usize,
}

impl<'a, V, D: Dimension> TreeIter<'a, V, D> {
    pub(super) fn new(guard: RwLockReadGuard<'a, TreeInner<V, D>>) -> Self {
        let walk = Walk::new(&*guard);
        let remaining = guard.entries.len();
        Self {
            guard,
            walk,
            remaining,
        }
    }
}

impl<V, D: Dimension> Debug for TreeIter<'_, V, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TreeIter")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl<V: Clone, D: Dimension> Iterator for TreeIter<'_, V, D> {
    type Item = Entry<V>;

    fn next(&mut self) -> Option<Entry<V>> {
        let key = self.walk.advance(&*self.guard)?;
        self.remaining = self.remaining.saturating_sub(1);
        let slot = self.guard.entries.slot(key);
        Some(Entry {
            key,
            point: slot.point,
            value: slot.value.clone(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V: Clone, D: Dimension> ExactSizeIterator for TreeIter<'_, V, D> {}

/// Exclusive iterator that can remove entries as it goes.
///
/// ```rust
/// use understory_spatial::{Aabb3D, OctreeMap, Point3, SpatialIndex, TreeConfig};
///
/// let mut tree = OctreeMap::new(
///     Aabb3D::from_coords(0., 0., 0., 10., 10., 10.),
///     TreeConfig::new(4, 2).unwrap(),
/// );
/// for i in 0..10 {
///     tree.insert(i, Point3::new(i as f64, 1., 1.)).unwrap();
/// }
/// let mut cursor = tree.cursor().unwrap();
/// while let Some(entry) = cursor.next() {
///     if entry.value % 2 == 0 {
///         cursor.remove();
///     }
/// }
/// assert_eq!(tree.len().unwrap(), 5);
/// ```
pub struct TreeCursor<'a, V, D: Dimension> {
    inner: &'a mut TreeInner<V, D>,
    walk: Walk,
    last: Option<EntryKey>,
}

impl<'a, V, D: Dimension> TreeCursor<'a, V, D> {
    pub(super) fn new(inner: &'a mut TreeInner<V, D>) -> Self {
        let walk = Walk::new(inner);
        Self {
            inner,
            walk,
            last: None,
        }
    }

    /// Key of the next entry, without cloning its value.
    pub fn next_key(&mut self) -> Option<EntryKey> {
        self.last = self.walk.advance(self.inner);
        self.last
    }

    /// Remove the entry yielded last and return its value.
    ///
    /// Returns `None` if nothing has been yielded since the previous removal.
    /// The iteration continues with the entry that would have followed.
    pub fn remove(&mut self) -> Option<V> {
        let key = self.last.take()?;
        let value = self.inner.remove(key).ok()?;
        self.walk.removed(self.inner);
        Some(value)
    }
}

impl<V, D: Dimension> Debug for TreeCursor<'_, V, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TreeCursor")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl<V: Clone, D: Dimension> Iterator for TreeCursor<'_, V, D> {
    type Item = Entry<V>;

    fn next(&mut self) -> Option<Entry<V>> {
        let key = self.next_key()?;
        let slot = self.inner.entries.slot(key);
        Some(Entry {
            key,
            point: slot.point,
            value: slot.value.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::{Aabb3D, OctreeMap, Point3, QuadMap, SpatialIndex, TreeConfig};

    fn filled(n: u32, seed: u64) -> OctreeMap<u32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let tree = OctreeMap::new(
            Aabb3D::from_coords(-10., -10., -10., 10., 10., 10.),
            TreeConfig::new(5, 2).unwrap(),
        );
        for i in 0..n {
            let p = Point3::new(
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
            );
            tree.insert(i, p).unwrap();
        }
        tree
    }

    #[test]
    fn iter_yields_every_entry_once() {
        let tree = filled(300, 1);
        let it = tree.iter().unwrap();
        assert_eq!(it.len(), 300);
        let seen: HashSet<u32> = it.map(|e| e.value).collect();
        assert_eq!(seen.len(), 300);
        // Reads may nest inside an iteration.
        for entry in tree.iter().unwrap().take(3) {
            assert_eq!(tree.position(entry.key).unwrap(), entry.point);
        }
    }

    #[test]
    fn empty_tree_iterates_nothing() {
        let mut tree: QuadMap<()> =
            QuadMap::from_rect(kurbo::Rect::new(0., 0., 1., 1.), TreeConfig::default());
        assert_eq!(tree.iter().unwrap().count(), 0);
        assert_eq!(tree.cursor().unwrap().next_key(), None);
    }

    #[test]
    fn cursor_removal_through_collapses() {
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(100 + seed);
            let mut tree = filled(200, seed);
            let mut kept = HashSet::new();
            let mut removed = HashSet::new();
            let mut cursor = tree.cursor().unwrap();
            while let Some(entry) = cursor.next() {
                assert!(!kept.contains(&entry.value) && !removed.contains(&entry.value));
                if rng.gen_bool(0.8) {
                    assert_eq!(cursor.remove(), Some(entry.value));
                    assert_eq!(cursor.remove(), None);
                    removed.insert(entry.value);
                } else {
                    kept.insert(entry.value);
                }
            }
            assert_eq!(kept.len() + removed.len(), 200);
            let left: HashSet<u32> = tree.iter().unwrap().map(|e| e.value).collect();
            assert_eq!(left, kept);
        }
    }

    #[test]
    fn cursor_can_drain_everything() {
        let mut tree = filled(64, 9);
        let mut cursor = tree.cursor().unwrap();
        let mut n = 0;
        while cursor.next_key().is_some() {
            cursor.remove().unwrap();
            n += 1;
        }
        assert_eq!(n, 64);
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.node_count().unwrap(), 1);
    }
}
