// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hibernating trees to disk and bringing them back.

use std::fs;
use std::io::{self, Read, Write};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use understory_spatial::{
    Aabb3D, EntryKey, OctreeMap, Payload, Point3, QuadMap, SpatialError, SpatialIndex,
    TreeConfig,
};

fn cube() -> Aabb3D {
    Aabb3D::from_coords(-50., -50., -50., 50., 50., 50.)
}

fn populated(seed: u64) -> (OctreeMap<u64>, Vec<(EntryKey, u64, Point3)>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let tree = OctreeMap::new(cube(), TreeConfig::new(6, 2).unwrap());
    let mut expected = Vec::new();
    for i in 0..500_u64 {
        let p = Point3::new(
            rng.gen_range(-50.0..=50.0),
            rng.gen_range(-50.0..=50.0),
            rng.gen_range(-50.0..=50.0),
        );
        expected.push((tree.insert(i, p).unwrap(), i, p));
    }
    // Leave holes in the key space.
    expected.retain(|&(key, value, _)| {
        if value % 7 == 0 {
            tree.remove(key).unwrap();
            false
        } else {
            true
        }
    });
    (tree, expected)
}

#[test]
fn round_trip_keeps_keys_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.bin");
    let (tree, expected) = populated(11);

    assert_eq!(tree.hibernate(&path).unwrap(), expected.len());
    assert!(tree.is_hibernating());
    assert!(path.exists());

    assert_eq!(tree.resuscitate().unwrap(), expected.len());
    assert!(!tree.is_hibernating());
    assert!(!path.exists());
    assert_eq!(tree.len().unwrap(), expected.len());
    for &(key, value, point) in &expected {
        assert_eq!(tree.position(key).unwrap(), point);
        assert_eq!(tree.get(point.x, point.y, point.z).unwrap(), Some(value));
    }

    // Freed slots are reused without reviving old keys.
    let fresh = tree.insert(9999, Point3::ORIGIN).unwrap();
    assert!(expected.iter().all(|&(key, _, _)| key != fresh));
    assert_eq!(tree.remove(fresh).unwrap(), 9999);
}

#[test]
fn hibernating_tree_refuses_work() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.bin");
    let (tree, expected) = populated(12);
    let (key, _, point) = expected[0];
    tree.hibernate(&path).unwrap();

    assert!(matches!(tree.len(), Err(SpatialError::Hibernating)));
    assert!(matches!(
        tree.insert(1, Point3::ORIGIN),
        Err(SpatialError::Hibernating)
    ));
    assert!(matches!(tree.position(key), Err(SpatialError::Hibernating)));
    assert!(matches!(
        tree.move_entry(key, point),
        Err(SpatialError::Hibernating)
    ));
    assert!(matches!(
        tree.contains(point.x, point.y, point.z),
        Err(SpatialError::Hibernating)
    ));
    assert!(matches!(tree.root_view(), Err(SpatialError::Hibernating)));
    assert!(matches!(
        tree.hibernate(dir.path().join("again.bin")),
        Err(SpatialError::Hibernating)
    ));

    tree.resuscitate().unwrap();
    assert!(matches!(tree.resuscitate(), Err(SpatialError::NotHibernating)));
}

#[test]
fn failed_hibernation_leaves_tree_intact() {
    let dir = tempfile::tempdir().unwrap();
    let (tree, expected) = populated(13);
    let err = tree
        .hibernate(dir.path().join("missing").join("tree.bin"))
        .unwrap_err();
    assert!(matches!(err, SpatialError::Io(_)));
    assert!(!tree.is_hibernating());
    assert_eq!(tree.len().unwrap(), expected.len());
}

/// Value whose encoding fails for one particular id.
#[derive(Clone, Debug, PartialEq)]
struct Fragile(u32);

const UNWRITABLE: u32 = 6;

impl Payload for Fragile {
    fn write_payload<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        if self.0 == UNWRITABLE {
            return Err(io::Error::other("value cannot be encoded"));
        }
        self.0.write_payload(w)
    }

    fn read_payload<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        u32::read_payload(r).map(Self)
    }
}

#[test]
fn failed_write_removes_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.bin");
    let tree = OctreeMap::new(cube(), TreeConfig::new(3, 2).unwrap());
    let keys: Vec<_> = (0..10_u32)
        .map(|i| {
            let f = f64::from(i) * 9.0 - 45.0;
            tree.insert(Fragile(i), Point3::new(f, -f, f * 0.5)).unwrap()
        })
        .collect();

    let err = tree.hibernate(&path).unwrap_err();
    assert!(matches!(err, SpatialError::Io(_)));
    assert!(!path.exists());
    assert!(!tree.is_hibernating());
    assert_eq!(tree.len().unwrap(), 10);
    for (i, key) in (0..10_u32).zip(keys) {
        let p = tree.position(key).unwrap();
        assert_eq!(tree.get(p.x, p.y, p.z).unwrap(), Some(Fragile(i)));
    }
}

#[test]
fn corrupt_file_keeps_tree_hibernating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.bin");
    let (tree, expected) = populated(14);
    tree.hibernate(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(tree.resuscitate(), Err(SpatialError::Corrupt(_))));
    assert!(tree.is_hibernating());
    assert!(path.exists());

    // Repairing the file lets the tree wake up.
    fs::write(&path, &bytes).unwrap();
    assert_eq!(tree.resuscitate().unwrap(), expected.len());
}

#[test]
fn missing_file_keeps_tree_hibernating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.bin");
    let (tree, _) = populated(15);
    tree.hibernate(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert!(matches!(tree.resuscitate(), Err(SpatialError::Io(_))));
    assert!(tree.is_hibernating());
}

#[test]
fn quadtree_hibernates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quad.bin");
    let map = QuadMap::from_rect(
        kurbo::Rect::new(0., 0., 16., 16.),
        TreeConfig::new(4, 2).unwrap(),
    );
    let keys: Vec<_> = (0..40_u32)
        .map(|i| {
            let p = Point3::new(f64::from(i % 16), f64::from(i / 4), 0.);
            (map.insert([f64::from(i), -1.], p).unwrap(), i)
        })
        .collect();
    map.hibernate(&path).unwrap();
    map.resuscitate().unwrap();
    for (key, i) in keys {
        let p = map.position(key).unwrap();
        assert_eq!(map.get(p.x, p.y, p.z).unwrap(), Some([f64::from(i), -1.]));
        assert_eq!(p, Point3::new(f64::from(i % 16), f64::from(i / 4), 0.));
    }
}
