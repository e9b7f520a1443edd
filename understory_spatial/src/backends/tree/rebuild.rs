// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hibernation: dumping a tree to a reconstruction stream and replaying it.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use hashbrown::HashSet;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{info, warn};

use super::node::{Dimension, NodeId, NodeKind};
use super::{AdaptiveTree, Lifecycle, TreeInner};
use crate::config::TreeConfig;
use crate::error::{Result, SpatialError};
use crate::hibernate::{Payload, ReconstructOp, write_add_entry, write_descend};
use crate::types::Aabb3D;

/// How replayed entries get their keys.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Restore {
    /// Back into the slots they were hibernated from, so old keys stay valid.
    InPlace,
    /// Into a fresh arena; sequence numbers only need to be unique.
    Fresh,
}

impl<V: Payload, D: Dimension> TreeInner<V, D> {
    fn write_ops<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<usize> {
        self.write_node(self.root, w)?;
        ReconstructOp::<V>::End.write_to(w)?;
        Ok(self.entries.len())
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "Child slots are below 8."
    )]
    fn write_node<W: Write + ?Sized>(&self, id: NodeId, w: &mut W) -> io::Result<()> {
        let node = self.nodes.node(id);
        match &node.kind {
            NodeKind::Leaf(entries) => {
                for &key in entries {
                    let slot = self.entries.slot(key);
                    write_add_entry(w, key.slot(), slot.point, &slot.value)?;
                }
            }
            NodeKind::Internal(_) => {
                for (slot, child) in node.children() {
                    if self.nodes.node(child).len == 0 {
                        continue;
                    }
                    write_descend(w, slot as u8)?;
                    self.write_node(child, w)?;
                    ReconstructOp::<V>::AscendToParent.write_to(w)?;
                }
            }
        }
        Ok(())
    }

    /// Rebuild the tree from a stream. The tree must be empty.
    fn replay<R: Read + ?Sized>(&mut self, r: &mut R, mode: Restore) -> Result<usize> {
        let mut path: SmallVec<[NodeId; 32]> = SmallVec::new();
        path.push(self.root);
        let mut seen = HashSet::new();
        loop {
            let Some(&current) = path.last() else {
                return Err(SpatialError::Corrupt("ascended above the root"));
            };
            match ReconstructOp::<V>::read_from(r)? {
                ReconstructOp::End => {
                    if path.len() != 1 {
                        return Err(SpatialError::Corrupt("End record below the root"));
                    }
                    if mode == Restore::InPlace {
                        self.entries.rebuild_free_list();
                    }
                    return Ok(self.entries.len());
                }
                ReconstructOp::AscendToParent => {
                    if path.len() == 1 {
                        return Err(SpatialError::Corrupt("ascended above the root"));
                    }
                    if self.nodes.node(current).len == 0 {
                        return Err(SpatialError::Corrupt("empty subtree"));
                    }
                    path.pop();
                }
                ReconstructOp::DescendToNewChild(slot) => {
                    let slot = usize::from(slot);
                    if slot >= D::SLOTS {
                        return Err(SpatialError::Corrupt("child slot out of range"));
                    }
                    let node = self.nodes.node_mut(current);
                    if node.depth >= self.config.max_depth() {
                        return Err(SpatialError::Corrupt("descended past the maximum depth"));
                    }
                    let was_leaf = match &node.kind {
                        NodeKind::Leaf(entries) if !entries.is_empty() => {
                            return Err(SpatialError::Corrupt(
                                "descended from a leaf holding entries",
                            ));
                        }
                        NodeKind::Leaf(_) => true,
                        NodeKind::Internal(children) if children.as_ref()[slot].is_some() => {
                            return Err(SpatialError::Corrupt(
                                "descended into the same child twice",
                            ));
                        }
                        NodeKind::Internal(_) => false,
                    };
                    if was_leaf {
                        node.kind = NodeKind::Internal(Default::default());
                    }
                    path.push(self.child_or_create(current, slot));
                }
                ReconstructOp::AddEntry {
                    sequence,
                    point,
                    value,
                } => {
                    let point = D::flatten(point);
                    let node = self.nodes.node(current);
                    if !node.is_leaf() {
                        return Err(SpatialError::Corrupt("entry added to an internal node"));
                    }
                    if !node.owns(point, &self.bounds) {
                        return Err(SpatialError::Corrupt("entry lies outside its node"));
                    }
                    let key = match mode {
                        Restore::InPlace => {
                            let idx = sequence as usize;
                            if idx >= self.entries.slot_count() {
                                return Err(SpatialError::Corrupt("sequence number out of range"));
                            }
                            self.entries
                                .restore(idx, point, value, current)
                                .ok_or(SpatialError::Corrupt("duplicate sequence number"))?
                        }
                        Restore::Fresh => {
                            if !seen.insert(sequence) {
                                return Err(SpatialError::Corrupt("duplicate sequence number"));
                            }
                            self.entries.insert(point, value, current)
                        }
                    };
                    if let NodeKind::Leaf(entries) = &mut self.nodes.node_mut(current).kind {
                        entries.push(key);
                    }
                    for &id in &path {
                        let node = self.nodes.node_mut(id);
                        node.len += 1;
                        node.touch();
                    }
                }
            }
        }
    }
}

fn write_file<V: Payload, D: Dimension>(inner: &TreeInner<V, D>, file: File) -> Result<usize> {
    let mut w = BufWriter::new(file);
    let n = inner.write_ops(&mut w)?;
    let file = w.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.sync_all()?;
    Ok(n)
}

impl<V: Payload, D: Dimension> AdaptiveTree<V, D> {
    /// Write the whole tree to `w` as a reconstruction stream.
    ///
    /// Returns the number of entries written. The tree is left untouched.
    pub fn write_stream<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize> {
        let inner = self.inner.read_recursive();
        inner.ensure_live()?;
        Ok(inner.write_ops(w)?)
    }

    /// Build a tree from a stream written by [`write_stream`](Self::write_stream)
    /// or [`hibernate`](Self::hibernate).
    ///
    /// The node structure is reproduced as written; entries get fresh keys.
    /// `config` must allow at least the depth of the written tree.
    pub fn from_stream<R: Read + ?Sized>(
        bounds: Aabb3D,
        config: TreeConfig,
        r: &mut R,
    ) -> Result<Self> {
        let mut inner = TreeInner::new(bounds, config);
        inner.replay(r, Restore::Fresh)?;
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Move every entry out of memory into the file at `path`.
    ///
    /// On success the tree holds nothing until [`resuscitate`](Self::resuscitate)
    /// is called, and every other operation fails with
    /// [`Hibernating`](SpatialError::Hibernating). Keys issued before
    /// hibernating stay valid across the round trip.
    ///
    /// On failure the tree is left as it was and any partial file is removed.
    pub fn hibernate(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut inner = self.inner.write();
        inner.ensure_live()?;
        let file = File::create(path)?;
        match write_file(&*inner, file) {
            Ok(n) => {
                inner.reset();
                inner.lifecycle = Lifecycle::Hibernating(path.to_path_buf());
                info!(path = %path.display(), entries = n, "hibernated");
                Ok(n)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(path) {
                    warn!(
                        path = %path.display(),
                        error = %rm,
                        "failed to remove partial hibernation file"
                    );
                }
                Err(e)
            }
        }
    }

    /// Load the entries back from the hibernation file and delete it.
    ///
    /// If the file is unreadable or corrupt the tree stays hibernating, the
    /// file is kept, and the error is returned.
    pub fn resuscitate(&self) -> Result<usize> {
        let mut inner = self.inner.write();
        let Lifecycle::Hibernating(path) = inner.lifecycle.clone() else {
            return Err(SpatialError::NotHibernating);
        };
        let mut r = BufReader::new(File::open(&path)?);
        match inner.replay(&mut r, Restore::InPlace) {
            Ok(n) => {
                inner.lifecycle = Lifecycle::Live;
                drop(r);
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove hibernation file");
                }
                info!(path = %path.display(), entries = n, "resuscitated");
                Ok(n)
            }
            Err(e) => {
                inner.reset();
                Err(e)
            }
        }
    }
}
