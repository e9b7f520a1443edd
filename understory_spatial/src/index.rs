// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The contract shared by every index, plus the query visitors.

use crate::entry::EntryKey;
use crate::error::Result;
use crate::types::{Aabb3D, BoundingVolume, Point3, Sphere, Unbounded};

/// Callback invoked once per hit during a range query.
///
/// Closures `FnMut(EntryKey, &V, Point3)` are visitors too; see
/// [`SpatialIndex::visit`] for the closure-friendly entry point.
pub trait Visitor<V> {
    /// Called with the entry handle, its value, and its resolved coordinates.
    fn found(&mut self, key: EntryKey, value: &V, point: Point3);
}

impl<V, F> Visitor<V> for F
where
    F: FnMut(EntryKey, &V, Point3),
{
    #[inline]
    fn found(&mut self, key: EntryKey, value: &V, point: Point3) {
        self(key, value, point);
    }
}

/// Visitor that ignores every hit, for count-only queries.
///
/// ```rust
/// use understory_spatial::{Aabb3D, CountOnly, OctreeMap, Point3, SpatialIndex};
///
/// let tree = OctreeMap::new(Aabb3D::from_coords(0., 0., 0., 8., 8., 8.), Default::default());
/// tree.insert("a", Point3::new(1., 1., 1.)).unwrap();
/// tree.insert("b", Point3::new(7., 7., 7.)).unwrap();
/// let region = Aabb3D::from_coords(0., 0., 0., 4., 4., 4.);
/// assert_eq!(tree.intersect(&region, CountOnly).unwrap(), 1);
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct CountOnly;

impl<V> Visitor<V> for CountOnly {
    #[inline]
    fn found(&mut self, _key: EntryKey, _value: &V, _point: Point3) {}
}

/// Operations every spatial index exposes.
///
/// Every method takes `&self`: implementations synchronize internally, so an
/// index can be shared between threads behind an `Arc`. Visitors run while the
/// index is read-locked; they may call read-only methods on the same index
/// but must not mutate it.
///
/// Duplicates are allowed: inserting the same value at the same position
/// twice stores two distinct entries.
pub trait SpatialIndex<V> {
    /// Insert `value` at `point` and return its handle.
    ///
    /// Fails with [`OutOfBounds`](crate::SpatialError::OutOfBounds) if the index
    /// is bounded and `point` lies outside it; the index is left unchanged.
    fn insert(&self, value: V, point: Point3) -> Result<EntryKey>;

    /// Remove an entry, returning its value. The key becomes an orphan.
    fn remove(&self, key: EntryKey) -> Result<V>;

    /// Relocate an entry in place; its key stays valid.
    fn move_entry(&self, key: EntryKey, point: Point3) -> Result<()>;

    /// Current position of an entry.
    fn position(&self, key: EntryKey) -> Result<Point3>;

    /// Visit every entry `region` includes, exactly once each, in unspecified
    /// order. Returns the number of entries visited.
    fn intersect<B, C>(&self, region: &B, visitor: C) -> Result<usize>
    where
        B: BoundingVolume + ?Sized,
        C: Visitor<V>;

    /// Number of entries.
    fn len(&self) -> Result<usize>;

    /// Remove every entry. Every key issued so far becomes an orphan.
    fn clear(&self) -> Result<()>;

    /// Like [`intersect`](Self::intersect), for closures.
    fn visit<B, F>(&self, region: &B, f: F) -> Result<usize>
    where
        B: BoundingVolume + ?Sized,
        F: FnMut(EntryKey, &V, Point3),
    {
        self.intersect(region, f)
    }

    /// Insert by coordinates. Always `Ok(true)` on success, because duplicate
    /// entries are permitted.
    fn add(&self, value: V, x: f64, y: f64, z: f64) -> Result<bool> {
        self.insert(value, Point3::new(x, y, z)).map(|_| true)
    }

    /// Whether any entry sits exactly at the given coordinates.
    ///
    /// Two-dimensional indexes ignore `z`, as they do everywhere else.
    fn contains(&self, x: f64, y: f64, z: f64) -> Result<bool> {
        let probe = Aabb3D::from_point(Point3::new(x, y, z));
        Ok(self.intersect(&probe, CountOnly)? > 0)
    }

    /// Whether the index holds no entries.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Value of some entry sitting exactly at the given coordinates.
    fn get(&self, x: f64, y: f64, z: f64) -> Result<Option<V>>
    where
        V: Clone,
    {
        let probe = Aabb3D::from_point(Point3::new(x, y, z));
        let mut hit = None;
        self.visit(&probe, |_, value, _| {
            if hit.is_none() {
                hit = Some(value.clone());
            }
        })?;
        Ok(hit)
    }

    /// Value of the entry closest to the given coordinates, within `radius`.
    ///
    /// A negative or NaN `radius` matches nothing.
    ///
    /// Ties between equally distant entries resolve to whichever the
    /// traversal meets first, which differs between backends.
    fn get_within(&self, x: f64, y: f64, z: f64, radius: f64) -> Result<Option<V>>
    where
        V: Clone,
    {
        nearest_within(self, Point3::new(x, y, z), radius)
    }

    /// All values, as a sized, read-only sequence.
    fn values(&self) -> Result<std::vec::IntoIter<V>>
    where
        V: Clone,
    {
        let mut out = Vec::with_capacity(self.len()?);
        self.visit(&Unbounded, |_, value, _| out.push(value.clone()))?;
        Ok(out.into_iter())
    }
}

/// Closest entry to `center` inside a ball of `radius`.
pub(crate) fn nearest_within<V, I>(index: &I, center: Point3, radius: f64) -> Result<Option<V>>
where
    V: Clone,
    I: SpatialIndex<V> + ?Sized,
{
    if radius.is_nan() || radius < 0.0 {
        return Ok(None);
    }
    let mut best: Option<(f64, V)> = None;
    index.visit(&Sphere::new(center, radius), |_, value, point| {
        let d = center.distance_squared(point);
        if best.as_ref().is_none_or(|(bd, _)| d < *bd) {
            best = Some((d, value.clone()));
        }
    })?;
    Ok(best.map(|(_, v)| v))
}
