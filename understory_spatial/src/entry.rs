// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Entry handles and the slot arena every index stores its entries in.

use core::fmt::Debug;

use crate::error::{Result, SpatialError};
use crate::types::Point3;

/// Generational handle for an entry.
///
/// Handles are issued by an index when a value is inserted and stay valid
/// until that entry is removed. A handle whose entry is gone is an *orphan*:
/// moving or removing through it fails with [`SpatialError::OrphanEntry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntryKey(u32, u32);

impl EntryKey {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Entry keys are intentionally 32-bit; higher bits are truncated by design."
    )]
    pub(crate) const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    /// Slot index of this entry. Hibernation uses it as the sequence number.
    pub const fn slot(self) -> u32 {
        self.0
    }
}

/// A positioned value, as yielded by iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry<V> {
    /// Handle of the entry inside its index.
    pub key: EntryKey,
    /// Current position.
    pub point: Point3,
    /// Stored value.
    pub value: V,
}

#[derive(Clone, Debug)]
pub(crate) struct Slot<V, O> {
    pub(crate) point: Point3,
    pub(crate) value: V,
    /// Back-reference to whatever currently holds the entry.
    pub(crate) owner: O,
}

/// Slot arena holding the entries of one index.
///
/// `O` is the back-reference type: tree nodes for the adaptive trees and a
/// list position for sweep-and-prune. Generations persist across frees and
/// across [`clear`](Self::clear), so stale keys never alias a new entry.
#[derive(Clone)]
pub(crate) struct EntryArena<V, O> {
    slots: Vec<Option<Slot<V, O>>>,
    /// last generation per slot
    generations: Vec<u32>,
    free_list: Vec<usize>,
    len: usize,
}

impl<V, O: Debug> Debug for EntryArena<V, O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntryArena")
            .field("slots_total", &self.slots.len())
            .field("live", &self.len)
            .field("free_list", &self.free_list.len())
            .finish_non_exhaustive()
    }
}

impl<V, O> Default for EntryArena<V, O> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }
}

impl<V, O> EntryArena<V, O> {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Allocate a slot and return its key.
    pub(crate) fn insert(&mut self, point: Point3, value: V, owner: O) -> EntryKey {
        let slot = Slot {
            point,
            value,
            owner,
        };
        let idx = if let Some(idx) = self.free_list.pop() {
            self.generations[idx] += 1;
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.generations.push(1);
            self.slots.len() - 1
        };
        self.len += 1;
        EntryKey::new(idx, self.generations[idx])
    }

    /// Free the slot, returning its contents. The key becomes an orphan.
    pub(crate) fn remove(&mut self, key: EntryKey) -> Result<Slot<V, O>> {
        self.get(key)?;
        let slot = self.slots[key.idx()]
            .take()
            .expect("entry arena invariant violated: validated slot is vacant");
        self.free_list.push(key.idx());
        self.len -= 1;
        Ok(slot)
    }

    pub(crate) fn get(&self, key: EntryKey) -> Result<&Slot<V, O>> {
        match (self.slots.get(key.idx()), self.generations.get(key.idx())) {
            (Some(Some(slot)), Some(&generation)) if generation == key.1 => Ok(slot),
            _ => Err(SpatialError::OrphanEntry(key)),
        }
    }

    pub(crate) fn get_mut(&mut self, key: EntryKey) -> Result<&mut Slot<V, O>> {
        match (self.slots.get_mut(key.idx()), self.generations.get(key.idx())) {
            (Some(Some(slot)), Some(&generation)) if generation == key.1 => Ok(slot),
            _ => Err(SpatialError::OrphanEntry(key)),
        }
    }

    /// Access a slot the caller knows is live.
    pub(crate) fn slot(&self, key: EntryKey) -> &Slot<V, O> {
        self.get(key)
            .expect("entry arena invariant violated: dangling entry key")
    }

    pub(crate) fn slot_mut(&mut self, key: EntryKey) -> &mut Slot<V, O> {
        self.get_mut(key)
            .expect("entry arena invariant violated: dangling entry key")
    }

    /// Drop every entry while keeping generations, so every key issued so far
    /// becomes an orphan.
    pub(crate) fn clear(&mut self) {
        self.free_list.clear();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            *slot = None;
            self.free_list.push(idx);
        }
        // Hand out low slots first.
        self.free_list.reverse();
        self.len = 0;
    }

    /// Place an entry at a fixed slot index during reconstruction.
    ///
    /// The slot keeps the generation it had before the arena was cleared, or
    /// starts at 1 if it never existed. Returns `None` if the slot is already
    /// occupied. Call [`rebuild_free_list`](Self::rebuild_free_list) once all
    /// entries are restored.
    pub(crate) fn restore(
        &mut self,
        idx: usize,
        point: Point3,
        value: V,
        owner: O,
    ) -> Option<EntryKey> {
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || None);
            self.generations.resize(idx + 1, 0);
        }
        if self.slots[idx].is_some() {
            return None;
        }
        if self.generations[idx] == 0 {
            self.generations[idx] = 1;
        }
        self.slots[idx] = Some(Slot {
            point,
            value,
            owner,
        });
        self.len += 1;
        Some(EntryKey::new(idx, self.generations[idx]))
    }

    pub(crate) fn rebuild_free_list(&mut self) {
        self.free_list.clear();
        for idx in (0..self.slots.len()).rev() {
            if self.slots[idx].is_none() {
                self.free_list.push(idx);
            }
        }
    }

    /// Number of slots ever allocated, live or free.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_key_is_orphan() {
        let mut arena: EntryArena<&str, ()> = EntryArena::default();
        let k = arena.insert(Point3::ORIGIN, "a", ());
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.remove(k).map(|s| s.value).ok(), Some("a"));
        assert!(matches!(arena.remove(k), Err(SpatialError::OrphanEntry(_))));
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn reused_slot_bumps_generation() {
        let mut arena: EntryArena<u32, ()> = EntryArena::default();
        let k1 = arena.insert(Point3::ORIGIN, 1, ());
        arena.remove(k1).expect("k1 is live");
        let k2 = arena.insert(Point3::ORIGIN, 2, ());
        assert_eq!(k1.slot(), k2.slot());
        assert_ne!(k1, k2);
        assert!(arena.get(k1).is_err());
        assert_eq!(arena.get(k2).map(|s| s.value).ok(), Some(2));
    }

    #[test]
    fn clear_orphans_every_key() {
        let mut arena: EntryArena<u32, ()> = EntryArena::default();
        let keys: Vec<_> = (0..4).map(|i| arena.insert(Point3::ORIGIN, i, ())).collect();
        arena.clear();
        assert_eq!(arena.len(), 0);
        assert!(keys.iter().all(|&k| arena.get(k).is_err()));
        let k = arena.insert(Point3::ORIGIN, 9, ());
        assert_eq!(k.slot(), 0, "lowest slot is reused first");
        assert!(!keys.contains(&k));
    }

    #[test]
    fn restore_keeps_generation() {
        let mut arena: EntryArena<u32, ()> = EntryArena::default();
        let k1 = arena.insert(Point3::ORIGIN, 1, ());
        arena.remove(k1).expect("k1 is live");
        let k2 = arena.insert(Point3::ORIGIN, 2, ());
        arena.clear();
        let restored = arena.restore(k2.idx(), Point3::ORIGIN, 2, ());
        assert_eq!(restored, Some(k2));
        assert_eq!(arena.restore(k2.idx(), Point3::ORIGIN, 3, ()), None);
        let far = arena.restore(5, Point3::ORIGIN, 5, ());
        assert_eq!(far.map(EntryKey::slot), Some(5));
        arena.rebuild_free_list();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.slot_count(), 6);
        assert_eq!(arena.insert(Point3::ORIGIN, 7, ()).slot(), 1);
    }
}
