// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sweep-and-prune: a flat entry list with a lazily sorted order.
//!
//! Entries are kept in insertion order (with swap-removal), and an `order`
//! array is re-sorted on demand along the axis of greatest spread, ties
//! broken on the next axis in the `X → Y → Z` rotation and then on the
//! previous one. Queries binary-search that order for the band of
//! candidates, then test each candidate against the query volume.

use core::cmp::Ordering;
use core::fmt::Debug;
use core::ops::Range;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::entry::{Entry, EntryArena, EntryKey};
use crate::error::{Result, SpatialError};
use crate::index::{SpatialIndex, Visitor};
use crate::types::{Aabb3D, Axis, BoundingVolume, Point3, max_t, min_t};

struct SweepInner<V> {
    bounds: Option<Aabb3D>,
    /// Owner is the entry's position in `list`.
    entries: EntryArena<V, usize>,
    list: Vec<EntryKey>,
    /// Positions in `list`, sorted by the comparator over `axes`.
    order: Vec<usize>,
    dirty: bool,
    /// Primary, secondary and tertiary axis; `None` until the next sort picks them.
    axes: Option<[Axis; 3]>,
}

impl<V> SweepInner<V> {
    fn point_at(&self, pos: usize) -> Point3 {
        self.entries.slot(self.list[pos]).point
    }

    fn admit(&self, p: Point3) -> Result<Point3> {
        let finite = !(p.x.is_nan() || p.y.is_nan() || p.z.is_nan());
        if finite && self.bounds.is_none_or(|b| b.contains_point(p)) {
            Ok(p)
        } else {
            Err(SpatialError::out_of_bounds(p))
        }
    }

    fn invalidate(&mut self, axes: bool) {
        self.dirty = true;
        if axes {
            self.axes = None;
        }
    }

    /// Axis with the greatest spread first; ties keep `X → Y → Z` order.
    fn pick_axes(&self) -> [Axis; 3] {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for &key in &self.list {
            let p = self.entries.slot(key).point;
            for axis in Axis::ALL {
                let i = axis.index();
                lo[i] = min_t(lo[i], p.get(axis));
                hi[i] = max_t(hi[i], p.get(axis));
            }
        }
        let mut primary = Axis::X;
        for axis in [Axis::Y, Axis::Z] {
            let spread = |a: Axis| hi[a.index()] - lo[a.index()];
            if spread(axis) > spread(primary) {
                primary = axis;
            }
        }
        [primary, primary.next(), primary.prev()]
    }

    fn compare(&self, axes: [Axis; 3], a: Point3, b: Point3) -> Ordering {
        axes.iter()
            .map(|&axis| a.get(axis).partial_cmp(&b.get(axis)).unwrap_or(Ordering::Equal))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn sort(&mut self) {
        let axes = match self.axes {
            Some(axes) => axes,
            None => {
                let axes = self.pick_axes();
                self.axes = Some(axes);
                axes
            }
        };
        let mut order: Vec<usize> = (0..self.list.len()).collect();
        order.sort_by(|&a, &b| self.compare(axes, self.point_at(a), self.point_at(b)));
        self.order = order;
        self.dirty = false;
        debug!(primary = ?axes[0], entries = self.list.len(), "sweep re-sort");
    }

    /// Sub-range of `band` (a slice of `order`) whose `axis` coordinate lies in `lo..=hi`.
    ///
    /// `order[band]` must be sorted along `axis`.
    fn narrow(&self, band: Range<usize>, axis: Axis, lo: f64, hi: f64) -> Range<usize> {
        let slice = &self.order[band.clone()];
        let start = slice.partition_point(|&pos| self.point_at(pos).get(axis) < lo);
        let end = slice.partition_point(|&pos| self.point_at(pos).get(axis) <= hi);
        band.start + start..band.start + end.max(start)
    }

    /// Candidates for `region`, narrowed as far as the sort order allows.
    ///
    /// The order is only sorted along the secondary axis within a run of equal
    /// primary coordinates, so narrowing goes one stage further only when the
    /// region is flat along the previous stage's axis.
    fn candidates<B: BoundingVolume + ?Sized>(&self, region: &B) -> Range<usize> {
        let Some(axes) = self.axes else {
            return 0..self.order.len();
        };
        let mut band = 0..self.order.len();
        for axis in axes {
            let (lo, hi) = (region.min(axis), region.max(axis));
            band = self.narrow(band, axis, lo, hi);
            if lo != hi {
                break;
            }
        }
        band
    }

    fn intersect<B, C>(&self, region: &B, visitor: &mut C) -> usize
    where
        B: BoundingVolume + ?Sized,
        C: Visitor<V>,
    {
        let mut hits = 0;
        for &pos in &self.order[self.candidates(region)] {
            let key = self.list[pos];
            let slot = self.entries.slot(key);
            let p = slot.point;
            let in_slabs = Axis::ALL
                .iter()
                .all(|&axis| region.min(axis) <= p.get(axis) && p.get(axis) <= region.max(axis));
            if in_slabs && region.includes(p.x, p.y, p.z) {
                visitor.found(key, &slot.value, p);
                hits += 1;
            }
        }
        hits
    }

    fn remove(&mut self, key: EntryKey) -> Result<V> {
        let pos = self.entries.get(key)?.owner;
        self.list.swap_remove(pos);
        if let Some(&moved) = self.list.get(pos) {
            self.entries.slot_mut(moved).owner = pos;
        }
        self.invalidate(true);
        Ok(self.entries.remove(key)?.value)
    }
}

/// Flat spatial index with lazily sorted sweep order.
///
/// Unlike the trees, the region is optional: without one, any non-NaN
/// coordinate is accepted. Every mutation marks the order dirty; the next
/// query re-sorts under the write lock and then proceeds under a read lock.
///
/// ```rust
/// use understory_spatial::{Aabb3D, Axis, Point3, SpatialIndex, SweepAndPrune};
///
/// let index = SweepAndPrune::new();
/// index.insert("near", Point3::new(1., 0., 0.)).unwrap();
/// index.insert("far", Point3::new(100., 1., 0.)).unwrap();
/// assert!(index.contains(100., 1., 0.).unwrap());
/// assert_eq!(index.primary_axis().unwrap(), Some(Axis::X));
///
/// let region = Aabb3D::from_coords(0., -1., -1., 2., 1., 1.);
/// let mut hits = Vec::new();
/// index.visit(&region, |_, v, _| hits.push(*v)).unwrap();
/// assert_eq!(hits, ["near"]);
/// ```
pub struct SweepAndPrune<V> {
    inner: RwLock<SweepInner<V>>,
}

impl<V> Debug for SweepAndPrune<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.read_recursive();
        f.debug_struct("SweepAndPrune")
            .field("bounds", &inner.bounds)
            .field("len", &inner.list.len())
            .field("dirty", &inner.dirty)
            .field("axes", &inner.axes)
            .finish_non_exhaustive()
    }
}

impl<V> Default for SweepAndPrune<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> SweepAndPrune<V> {
    /// Create an empty, unbounded index.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SweepInner {
                bounds: None,
                entries: EntryArena::default(),
                list: Vec::new(),
                order: Vec::new(),
                dirty: false,
                axes: None,
            }),
        }
    }

    /// Create an empty index that rejects positions outside `bounds`.
    pub fn with_bounds(bounds: Aabb3D) -> Self {
        let index = Self::new();
        index.inner.write().bounds = Some(bounds);
        index
    }

    /// Region positions must lie in, if any.
    pub fn bounds(&self) -> Option<Aabb3D> {
        self.inner.read_recursive().bounds
    }

    /// Read guard over a sorted order.
    fn sorted(&self) -> RwLockReadGuard<'_, SweepInner<V>> {
        let guard = self.inner.read_recursive();
        if !guard.dirty {
            return guard;
        }
        drop(guard);
        let mut guard = self.inner.write();
        // Another thread may have sorted while we waited.
        if guard.dirty {
            guard.sort();
        }
        RwLockWriteGuard::downgrade(guard)
    }

    /// Re-sort now if anything changed since the last sort.
    pub fn sort(&self) {
        drop(self.sorted());
    }

    /// Axis the order is currently sorted along, sorting first if needed.
    ///
    /// `None` until the index has been mutated at least once.
    pub fn primary_axis(&self) -> Result<Option<Axis>> {
        Ok(self.sorted().axes.map(|axes| axes[0]))
    }

    /// Keys in sweep order, sorting first if needed.
    pub fn sorted_keys(&self) -> Result<Vec<EntryKey>> {
        let inner = self.sorted();
        Ok(inner.order.iter().map(|&pos| inner.list[pos]).collect())
    }

    /// Iterate entries in list order. Holds the read lock until dropped.
    ///
    /// The order is brought up to date first, so queries made while the
    /// iterator is alive never need the write lock.
    pub fn iter(&self) -> SweepIter<'_, V> {
        SweepIter {
            guard: self.sorted(),
            next: 0,
        }
    }

    /// Exclusive iteration that can remove the entry it just yielded.
    pub fn cursor(&mut self) -> SweepCursor<'_, V> {
        SweepCursor {
            inner: self.inner.get_mut(),
            next: 0,
            last: None,
        }
    }
}

impl<V> SpatialIndex<V> for SweepAndPrune<V> {
    fn insert(&self, value: V, point: Point3) -> Result<EntryKey> {
        let mut inner = self.inner.write();
        let point = inner.admit(point)?;
        let pos = inner.list.len();
        let key = inner.entries.insert(point, value, pos);
        inner.list.push(key);
        inner.invalidate(true);
        Ok(key)
    }

    fn remove(&self, key: EntryKey) -> Result<V> {
        self.inner.write().remove(key)
    }

    fn move_entry(&self, key: EntryKey, point: Point3) -> Result<()> {
        let mut inner = self.inner.write();
        let point = inner.admit(point)?;
        inner.entries.get_mut(key)?.point = point;
        inner.invalidate(false);
        Ok(())
    }

    fn position(&self, key: EntryKey) -> Result<Point3> {
        Ok(self.inner.read_recursive().entries.get(key)?.point)
    }

    fn intersect<B, C>(&self, region: &B, mut visitor: C) -> Result<usize>
    where
        B: BoundingVolume + ?Sized,
        C: Visitor<V>,
    {
        Ok(self.sorted().intersect(region, &mut visitor))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner.read_recursive().list.len())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.list.clear();
        inner.order.clear();
        inner.invalidate(true);
        Ok(())
    }

    fn contains(&self, x: f64, y: f64, z: f64) -> Result<bool> {
        let inner = self.sorted();
        let p = Point3::new(x, y, z);
        let Some(axes) = inner.axes else {
            return Ok(false);
        };
        let mut band = 0..inner.order.len();
        for axis in axes {
            band = inner.narrow(band, axis, p.get(axis), p.get(axis));
        }
        Ok(!band.is_empty())
    }
}

/// Shared iterator over a [`SweepAndPrune`] in list order.
pub struct SweepIter<'a, V> {
    guard: RwLockReadGuard<'a, SweepInner<V>>,
    next: usize,
}

impl<V> Debug for SweepIter<'_, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SweepIter")
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> Iterator for SweepIter<'_, V> {
    type Item = Entry<V>;

    fn next(&mut self) -> Option<Entry<V>> {
        let key = *self.guard.list.get(self.next)?;
        self.next += 1;
        let slot = self.guard.entries.slot(key);
        Some(Entry {
            key,
            point: slot.point,
            value: slot.value.clone(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.guard.list.len() - self.next;
        (n, Some(n))
    }
}

impl<V: Clone> ExactSizeIterator for SweepIter<'_, V> {}

/// Exclusive iterator over a [`SweepAndPrune`] that can remove entries.
pub struct SweepCursor<'a, V> {
    inner: &'a mut SweepInner<V>,
    next: usize,
    last: Option<EntryKey>,
}

impl<V> SweepCursor<'_, V> {
    /// Key of the next entry, without cloning its value.
    pub fn next_key(&mut self) -> Option<EntryKey> {
        self.last = self.inner.list.get(self.next).copied();
        if self.last.is_some() {
            self.next += 1;
        }
        self.last
    }

    /// Remove the entry yielded last and return its value.
    ///
    /// Returns `None` if nothing has been yielded since the previous removal.
    pub fn remove(&mut self) -> Option<V> {
        let key = self.last.take()?;
        let value = self.inner.remove(key).ok()?;
        // The last entry was swapped into the vacated position.
        self.next -= 1;
        Some(value)
    }
}

impl<V> Debug for SweepCursor<'_, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SweepCursor")
            .field("next", &self.next)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> Iterator for SweepCursor<'_, V> {
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
