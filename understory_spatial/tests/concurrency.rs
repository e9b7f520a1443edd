// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sharing indexes between threads.

use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use understory_spatial::{
    Aabb3D, CountOnly, OctreeMap, Point3, SpatialIndex, SweepAndPrune, TreeConfig, Unbounded,
};

const WRITERS: usize = 4;
const PER_WRITER: u32 = 250;
const KEPT: usize = WRITERS * PER_WRITER.div_ceil(3) as usize;

fn random_point(rng: &mut StdRng) -> Point3 {
    Point3::new(
        rng.gen_range(0.0..100.0),
        rng.gen_range(0.0..100.0),
        rng.gen_range(0.0..100.0),
    )
}

/// Writers insert, move, and remove while readers query. Each writer keeps
/// every third entry, so the final count is known.
fn hammer<I>(index: Arc<I>)
where
    I: SpatialIndex<u32> + Send + Sync + 'static,
{
    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(w as u64);
                for i in 0..PER_WRITER {
                    let key = index.insert(i, random_point(&mut rng)).unwrap();
                    let to = random_point(&mut rng);
                    index.move_entry(key, to).unwrap();
                    assert_eq!(index.position(key).unwrap(), to);
                    if i % 3 != 0 {
                        assert_eq!(index.remove(key).unwrap(), i);
                    }
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..2_u64)
        .map(|r| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + r);
                for _ in 0..200 {
                    let a = random_point(&mut rng);
                    let b = random_point(&mut rng);
                    let hits = index.intersect(&Aabb3D::new(a, b), CountOnly).unwrap();
                    // At most one unsettled entry per writer.
                    assert!(hits <= KEPT + WRITERS);
                    let _ = index.get_within(a.x, a.y, a.z, 10.).unwrap();
                }
            })
        })
        .collect();
    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    assert_eq!(index.len().unwrap(), KEPT);
    assert_eq!(index.intersect(&Unbounded, CountOnly).unwrap(), KEPT);
}

#[test]
fn octree_survives_concurrent_use() {
    let tree = OctreeMap::new(
        Aabb3D::from_coords(0., 0., 0., 100., 100., 100.),
        TreeConfig::new(8, 3).unwrap(),
    );
    hammer(Arc::new(tree));
}

#[test]
fn sweep_survives_concurrent_use() {
    hammer(Arc::new(SweepAndPrune::new()));
}

#[test]
fn readers_may_nest_queries() {
    let index = SweepAndPrune::new();
    for i in 0..50_u32 {
        index.add(i, f64::from(i), 0., 0.).unwrap();
    }
    // A visitor may read the index it is visiting.
    let mut checked = 0;
    index
        .visit(&Unbounded, |key, _, point| {
            assert_eq!(index.position(key).unwrap(), point);
            checked += 1;
        })
        .unwrap();
    assert_eq!(checked, 50);
}
