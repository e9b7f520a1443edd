// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Spatial: concurrent point indexes in two and three dimensions.
//!
//! Understory Spatial stores values at points and answers region queries.
//!
//! - Insert, move, and remove point entries through stable [`EntryKey`] handles.
//! - Query by box, sphere, rectangle, or any custom [`BoundingVolume`].
//! - Share an index between threads: every operation takes `&self` and locks internally.
//! - Hibernate a tree to disk and bring it back with the same keys.
//!
//! Every index implements [`SpatialIndex`], so callers can swap strategies without
//! API churn.
//!
//! # Example
//!
//! ```rust
//! use understory_spatial::{Aabb3D, OctreeMap, Point3, SpatialIndex, Sphere, TreeConfig};
//!
//! // A tree over a 100-unit cube; leaves split past 8 entries and merge at 2.
//! let tree = OctreeMap::new(
//!     Aabb3D::from_coords(0., 0., 0., 100., 100., 100.),
//!     TreeConfig::new(8, 2).unwrap(),
//! );
//! let ship = tree.insert("ship", Point3::new(10., 10., 10.)).unwrap();
//! tree.insert("buoy", Point3::new(90., 90., 90.)).unwrap();
//!
//! // Move the first entry; its key stays valid.
//! tree.move_entry(ship, Point3::new(12., 10., 10.)).unwrap();
//!
//! // Query a sphere around it.
//! let mut hits = Vec::new();
//! tree.visit(&Sphere::new(Point3::new(10., 10., 10.), 5.), |_, v, _| hits.push(*v))
//!     .unwrap();
//! assert_eq!(hits, ["ship"]);
//! assert_eq!(tree.get_within(89., 90., 90., 2.).unwrap(), Some("buoy"));
//! ```
//!
//! A quadtree works on `kurbo` rectangles and ignores `z` entirely:
//!
//! ```rust
//! use kurbo::Rect;
//! use understory_spatial::{CountOnly, Point3, QuadMap, SpatialIndex, TreeConfig};
//!
//! let map = QuadMap::from_rect(Rect::new(0., 0., 64., 64.), TreeConfig::default());
//! let key = map.insert(7_u32, Point3::new(3., 4., 1000.)).unwrap();
//! assert_eq!(map.position(key).unwrap(), Point3::new(3., 4., 0.));
//!
//! let hits = map.intersect(&Rect::new(0., 0., 8., 8.), CountOnly).unwrap();
//! assert_eq!(hits, 1);
//! ```
//!
//! ## Choosing an index
//!
//! - [`OctreeMap`] / [`QuadMap`]: adaptive trees over a fixed region. Queries prune whole
//!   subtrees, and the structure adapts as entries arrive and leave. Trees can
//!   [hibernate](AdaptiveTree::hibernate) to a file and [resuscitate](AdaptiveTree::resuscitate).
//! - [`SweepAndPrune`]: a flat list kept sorted along its widest axis. Mutations are cheap and
//!   the order is rebuilt lazily on the next query. Bounds are optional.
//!
//! ### Float semantics
//!
//! NaN coordinates are rejected as out of bounds. Region tests are inclusive at both ends.
//!
//! ## Logging
//!
//! Structural changes are reported through [`tracing`]: subdivisions and merges at `trace`,
//! sweep re-sorts at `debug`, hibernation at `info`. Install any subscriber to see them.

mod config;
mod entry;
mod error;
pub mod hibernate;
mod index;
mod types;

pub mod backends;

pub use backends::{
    AdaptiveTree, Dim2, Dim3, Dimension, NodeView, OctreeMap, QuadMap, SweepAndPrune,
    SweepCursor, SweepIter, TreeCursor, TreeIter,
};
pub use config::TreeConfig;
pub use entry::{Entry, EntryKey};
pub use error::{Result, SpatialError};
pub use hibernate::{Payload, ReconstructOp};
pub use index::{CountOnly, SpatialIndex, Visitor};
pub use types::{Aabb3D, Axis, BoundingVolume, Point3, Sphere, Unbounded};

#[cfg(test)]
mod tests {
    use super::*;

    // Everything sits at z = 0 so the quadtree sees the same points.
    fn exercise<I: SpatialIndex<u32>>(index: &I) {
        let a = index.insert(1, Point3::new(1., 1., 0.)).unwrap();
        let b = index.insert(2, Point3::new(9., 9., 0.)).unwrap();
        assert!(index.add(3, 9., 9., 0.).unwrap());
        assert_eq!(index.len().unwrap(), 3);
        assert!(index.contains(9., 9., 0.).unwrap());
        assert!(!index.contains(5., 5., 0.).unwrap());

        index.move_entry(a, Point3::new(5., 5., 0.)).unwrap();
        assert_eq!(index.position(a).unwrap(), Point3::new(5., 5., 0.));
        assert_eq!(index.get(5., 5., 0.).unwrap(), Some(1));

        let low = Aabb3D::from_coords(0., 0., 0., 6., 6., 6.);
        assert_eq!(index.intersect(&low, CountOnly).unwrap(), 1);
        let mut values: Vec<u32> = index.values().unwrap().collect();
        values.sort_unstable();
        assert_eq!(values, [1, 2, 3]);

        assert_eq!(index.remove(b).unwrap(), 2);
        assert!(matches!(index.position(b), Err(SpatialError::OrphanEntry(_))));
        index.clear().unwrap();
        assert!(index.is_empty().unwrap());
        assert!(matches!(index.remove(a), Err(SpatialError::OrphanEntry(_))));
    }

    #[test]
    fn every_index_honors_the_contract() {
        let cube = Aabb3D::from_coords(0., 0., 0., 10., 10., 10.);
        exercise(&OctreeMap::new(cube, TreeConfig::new(3, 2).unwrap()));
        exercise(&OctreeMap::new(cube, TreeConfig::default()));
        exercise(&QuadMap::new(cube, TreeConfig::default()));
        exercise(&SweepAndPrune::new());
        exercise(&SweepAndPrune::with_bounds(cube));
    }
}
