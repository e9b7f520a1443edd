// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type shared by every index.

use crate::entry::EntryKey;

/// Result type alias using [`SpatialError`].
pub type Result<T> = core::result::Result<T, SpatialError>;

/// Errors reported by the spatial indexes.
///
/// All of these are reported synchronously by the call that hit them; nothing
/// is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Thresholds violate `2 <= unify < divide`.
    #[error("invalid thresholds: divide={divide}, unify={unify} (need 2 <= unify < divide)")]
    InvalidConfig {
        /// Requested divide threshold.
        divide: usize,
        /// Requested unify threshold.
        unify: usize,
    },

    /// The position lies outside the region of a bounded index.
    #[error("position ({x}, {y}, {z}) lies outside the index bounds")]
    OutOfBounds {
        /// x coordinate
        x: f64,
        /// y coordinate
        y: f64,
        /// z coordinate
        z: f64,
    },

    /// The key refers to an entry that is no longer held by this index.
    #[error("entry {0:?} is not attached to this index")]
    OrphanEntry(EntryKey),

    /// A node snapshot was used after the tree changed underneath it.
    #[error("node snapshot is stale: the tree was modified")]
    ConcurrentModification,

    /// The index is hibernating; call `resuscitate` first.
    #[error("index is hibernating")]
    Hibernating,

    /// `resuscitate` was called on a live index.
    #[error("index is not hibernating")]
    NotHibernating,

    /// The reconstruction stream violates the tree grammar.
    #[error("corrupt reconstruction stream: {0}")]
    Corrupt(&'static str),

    /// Reading or writing a hibernation stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpatialError {
    pub(crate) fn out_of_bounds(p: crate::Point3) -> Self {
        Self::OutOfBounds {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}
