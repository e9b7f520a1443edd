// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types and the [`BoundingVolume`] query contract.

use core::cmp::Ordering;

/// One of the three coordinate axes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    /// The x axis.
    X,
    /// The y axis.
    Y,
    /// The z axis.
    Z,
}

impl Axis {
    /// All axes in rotation order.
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    /// The next axis in the fixed `X → Y → Z → X` rotation.
    #[inline]
    pub const fn next(self) -> Self {
        match self {
            Self::X => Self::Y,
            Self::Y => Self::Z,
            Self::Z => Self::X,
        }
    }

    /// The previous axis in the fixed `X → Y → Z → X` rotation.
    #[inline]
    pub const fn prev(self) -> Self {
        match self {
            Self::X => Self::Z,
            Self::Y => Self::X,
            Self::Z => Self::Y,
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// A position in 3D space. 2D indexes keep `z` at zero.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point3 {
    /// x coordinate
    pub x: f64,
    /// y coordinate
    pub y: f64,
    /// z coordinate
    pub z: f64,
}

impl Point3 {
    /// The origin.
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    /// Create a new point.
    #[inline(always)]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The coordinate along `axis`.
    #[inline]
    pub const fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Squared Euclidean distance to `other`.
    #[inline]
    pub fn distance_squared(&self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Euclidean distance to `other`.
    #[inline]
    pub fn distance(&self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Component-wise midpoint between `self` and `other`.
    #[inline]
    pub fn midpoint(&self, other: Self) -> Self {
        Self::new(
            0.5 * (self.x + other.x),
            0.5 * (self.y + other.y),
            0.5 * (self.z + other.z),
        )
    }
}

impl From<kurbo::Point> for Point3 {
    fn from(p: kurbo::Point) -> Self {
        Self::new(p.x, p.y, 0.0)
    }
}

/// A region that range queries can be run against.
///
/// Indexes prune with the per-axis extents and then call
/// [`includes`](Self::includes) on every surviving candidate, so `includes`
/// may describe any shape that fits inside the extents.
pub trait BoundingVolume {
    /// Smallest coordinate of the volume along `axis`.
    fn min(&self, axis: Axis) -> f64;

    /// Largest coordinate of the volume along `axis`.
    fn max(&self, axis: Axis) -> f64;

    /// Whether the point lies inside the volume.
    fn includes(&self, x: f64, y: f64, z: f64) -> bool;
}

impl<B: BoundingVolume + ?Sized> BoundingVolume for &B {
    #[inline]
    fn min(&self, axis: Axis) -> f64 {
        (**self).min(axis)
    }

    #[inline]
    fn max(&self, axis: Axis) -> f64 {
        (**self).max(axis)
    }

    #[inline]
    fn includes(&self, x: f64, y: f64, z: f64) -> bool {
        (**self).includes(x, y, z)
    }
}

/// Axis-aligned bounding box in 3D.
///
/// Edges are part of the box.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3D {
    /// Minimum corner
    pub min: Point3,
    /// Maximum corner
    pub max: Point3,
}

impl Aabb3D {
    /// Create a new AABB from two opposite corners.
    ///
    /// The corners are normalized, so any two opposite corners may be passed.
    #[inline]
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(min_t(a.x, b.x), min_t(a.y, b.y), min_t(a.z, b.z)),
            max: Point3::new(max_t(a.x, b.x), max_t(a.y, b.y), max_t(a.z, b.z)),
        }
    }

    /// Create an AABB from min/max coordinates.
    #[inline]
    pub fn from_coords(
        min_x: f64,
        min_y: f64,
        min_z: f64,
        max_x: f64,
        max_y: f64,
        max_z: f64,
    ) -> Self {
        Self::new(
            Point3::new(min_x, min_y, min_z),
            Point3::new(max_x, max_y, max_z),
        )
    }

    /// A degenerate box holding exactly one point.
    #[inline]
    pub const fn from_point(p: Point3) -> Self {
        Self { min: p, max: p }
    }

    /// A 2D box on the `z = 0` plane.
    #[inline]
    pub fn from_rect(rect: kurbo::Rect) -> Self {
        let rect = rect.abs();
        Self::from_coords(rect.x0, rect.y0, 0.0, rect.x1, rect.y1, 0.0)
    }

    /// Center of the box.
    #[inline]
    pub fn center(&self) -> Point3 {
        self.min.midpoint(self.max)
    }

    /// Whether this AABB contains the point.
    #[inline]
    pub fn contains_point(&self, p: Point3) -> bool {
        self.min.x <= p.x
            && self.min.y <= p.y
            && self.min.z <= p.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }

    /// Whether the extents of `volume` overlap this box along the first `axes` axes.
    ///
    /// Shared edges count as overlap.
    #[inline]
    pub(crate) fn overlaps_volume<B: BoundingVolume + ?Sized>(
        &self,
        volume: &B,
        axes: usize,
    ) -> bool {
        Axis::ALL[..axes].iter().all(|&axis| {
            volume.min(axis) <= self.max.get(axis) && volume.max(axis) >= self.min.get(axis)
        })
    }
}

impl BoundingVolume for Aabb3D {
    #[inline]
    fn min(&self, axis: Axis) -> f64 {
        self.min.get(axis)
    }

    #[inline]
    fn max(&self, axis: Axis) -> f64 {
        self.max.get(axis)
    }

    #[inline]
    fn includes(&self, x: f64, y: f64, z: f64) -> bool {
        self.contains_point(Point3::new(x, y, z))
    }
}

/// A ball, used for nearest-within-radius lookups.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sphere {
    /// Center of the sphere
    pub center: Point3,
    /// Radius of the sphere (non-negative)
    pub radius: f64,
}

impl Sphere {
    /// Create a new sphere.
    #[inline]
    pub fn new(center: Point3, radius: f64) -> Self {
        debug_assert!(radius >= 0.0, "sphere radius must be non-negative");
        Self { center, radius }
    }
}

impl BoundingVolume for Sphere {
    #[inline]
    fn min(&self, axis: Axis) -> f64 {
        self.center.get(axis) - self.radius
    }

    #[inline]
    fn max(&self, axis: Axis) -> f64 {
        self.center.get(axis) + self.radius
    }

    #[inline]
    fn includes(&self, x: f64, y: f64, z: f64) -> bool {
        self.center.distance_squared(Point3::new(x, y, z)) <= self.radius * self.radius
    }
}

/// A volume that includes every point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Unbounded;

impl BoundingVolume for Unbounded {
    #[inline]
    fn min(&self, _axis: Axis) -> f64 {
        f64::NEG_INFINITY
    }

    #[inline]
    fn max(&self, _axis: Axis) -> f64 {
        f64::INFINITY
    }

    #[inline]
    fn includes(&self, _x: f64, _y: f64, _z: f64) -> bool {
        true
    }
}

/// Rectangles are prisms, unbounded along `z`.
impl BoundingVolume for kurbo::Rect {
    #[inline]
    fn min(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => min_t(self.x0, self.x1),
            Axis::Y => min_t(self.y0, self.y1),
            Axis::Z => f64::NEG_INFINITY,
        }
    }

    #[inline]
    fn max(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => max_t(self.x0, self.x1),
            Axis::Y => max_t(self.y0, self.y1),
            Axis::Z => f64::INFINITY,
        }
    }

    #[inline]
    fn includes(&self, x: f64, y: f64, _z: f64) -> bool {
        let r = self.abs();
        r.x0 <= x && x <= r.x1 && r.y0 <= y && y <= r.y1
    }
}

pub(crate) fn min_t<T: PartialOrd + Copy>(a: T, b: T) -> T {
    match a.partial_cmp(&b) {
        Some(Ordering::Greater) => b,
        _ => a,
    }
}

pub(crate) fn max_t<T: PartialOrd + Copy>(a: T, b: T) -> T {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => b,
        _ => a,
    }
}
