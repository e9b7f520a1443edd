// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Read-only snapshots of individual tree nodes.

use core::fmt::Debug;

use super::node::{Dimension, Node, NodeId, NodeKind};
use super::{AdaptiveTree, TreeInner};
use crate::entry::EntryKey;
use crate::error::{Result, SpatialError};
use crate::types::Aabb3D;

/// Handle on one node of a tree, for inspecting its shape.
///
/// A view remembers the node's modification count when it was taken. Any
/// insert, removal, or move that touches the node or its subtree afterwards
/// makes every accessor fail with
/// [`ConcurrentModification`](SpatialError::ConcurrentModification); take a
/// fresh view from [`AdaptiveTree::root_view`] to continue.
pub struct NodeView<'a, V, D: Dimension> {
    tree: &'a AdaptiveTree<V, D>,
    id: NodeId,
    mod_count: u64,
}

impl<V, D: Dimension> Clone for NodeView<'_, V, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V, D: Dimension> Copy for NodeView<'_, V, D> {}

impl<V, D: Dimension> Debug for NodeView<'_, V, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeView")
            .field("id", &self.id)
            .field("mod_count", &self.mod_count)
            .finish_non_exhaustive()
    }
}

impl<'a, V, D: Dimension> NodeView<'a, V, D> {
    pub(super) fn capture(
        tree: &'a AdaptiveTree<V, D>,
        inner: &TreeInner<V, D>,
        id: NodeId,
    ) -> Self {
        Self {
            tree,
            id,
            mod_count: inner.nodes.node(id).mod_count,
        }
    }

    fn read<R>(&self, f: impl FnOnce(&TreeInner<V, D>, &Node<D>) -> R) -> Result<R> {
        let inner = self.tree.inner.read_recursive();
        inner.ensure_live()?;
        match inner.nodes.get(self.id) {
            Some(node) if node.mod_count == self.mod_count => Ok(f(&inner, node)),
            _ => Err(SpatialError::ConcurrentModification),
        }
    }

    /// Region this node covers.
    pub fn bounds(&self) -> Result<Aabb3D> {
        self.read(|_, node| node.bounds)
    }

    /// Depth below the root (the root is 0).
    pub fn depth(&self) -> Result<u16> {
        self.read(|_, node| node.depth)
    }

    /// Whether the node holds entries directly rather than children.
    pub fn is_leaf(&self) -> Result<bool> {
        self.read(|_, node| node.is_leaf())
    }

    /// Number of entries in this subtree.
    pub fn len(&self) -> Result<usize> {
        self.read(|_, node| node.len)
    }

    /// Whether this subtree holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Entries held directly by a leaf; empty for internal nodes.
    pub fn entries(&self) -> Result<Vec<EntryKey>> {
        self.read(|_, node| match &node.kind {
            NodeKind::Leaf(entries) => entries.to_vec(),
            NodeKind::Internal(_) => Vec::new(),
        })
    }

    /// Child in `slot`, if one has been created.
    pub fn child(&self, slot: usize) -> Result<Option<Self>> {
        let tree = self.tree;
        self.read(|inner, node| {
            node.children()
                .find(|&(s, _)| s == slot)
                .map(|(_, c)| Self::capture(tree, inner, c))
        })
    }

    /// Every created child, with its slot index.
    pub fn children(&self) -> Result<Vec<(usize, Self)>> {
        let tree = self.tree;
        self.read(|inner, node| {
            node.children()
                .map(|(slot, c)| (slot, Self::capture(tree, inner, c)))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{Aabb3D, OctreeMap, Point3, SpatialError, SpatialIndex, TreeConfig};

    #[test]
    fn views_go_stale_after_mutation() {
        let tree = OctreeMap::new(
            Aabb3D::from_coords(0., 0., 0., 8., 8., 8.),
            TreeConfig::new(3, 2).unwrap(),
        );
        let a = tree.insert('a', Point3::new(1., 1., 1.)).unwrap();
        let root = tree.root_view().unwrap();
        assert!(root.is_leaf().unwrap());
        assert_eq!(root.entries().unwrap(), vec![a]);
        assert_eq!(root.bounds().unwrap(), tree.bounds());

        tree.insert('b', Point3::new(7., 7., 7.)).unwrap();
        assert!(matches!(
            root.len(),
            Err(SpatialError::ConcurrentModification)
        ));

        tree.insert('c', Point3::new(1., 1., 7.)).unwrap();
        let root = tree.root_view().unwrap();
        assert!(!root.is_leaf().unwrap());
        let slots: Vec<_> = root.children().unwrap().iter().map(|(s, _)| *s).collect();
        assert_eq!(slots, [0, 4, 7]);
        let low = root.child(0).unwrap().unwrap();
        assert_eq!(low.depth().unwrap(), 1);
        assert_eq!(low.bounds().unwrap(), Aabb3D::from_coords(0., 0., 0., 4., 4., 4.));
        assert!(root.child(3).unwrap().is_none());

        // A move within one leaf only touches that leaf.
        let high = root.child(7).unwrap().unwrap();
        tree.move_entry(a, Point3::new(2., 2., 2.)).unwrap();
        assert!(high.len().is_ok());
        assert!(low.len().is_err());
    }
}
