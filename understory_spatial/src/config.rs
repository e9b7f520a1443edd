// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subdivision thresholds for the adaptive trees.

use crate::error::{Result, SpatialError};

/// Thresholds controlling when tree nodes subdivide and unify.
///
/// A leaf holds at most `divide_threshold - 1` entries; inserting one more
/// splits it. An internal node whose subtree shrinks to `unify_threshold`
/// entries or fewer collapses back into a leaf.
///
/// ```rust
/// use understory_spatial::TreeConfig;
///
/// let config = TreeConfig::new(6, 2).unwrap();
/// assert_eq!(config.divide_threshold(), 6);
/// assert!(TreeConfig::new(4, 4).is_err());
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "UncheckedConfig"))]
pub struct TreeConfig {
    divide_threshold: usize,
    unify_threshold: usize,
    max_depth: u16,
}

impl TreeConfig {
    /// Default maximum subdivision depth.
    pub const DEFAULT_MAX_DEPTH: u16 = 32;

    /// Validate and create a configuration.
    pub fn new(divide_threshold: usize, unify_threshold: usize) -> Result<Self> {
        if divide_threshold < 2 || unify_threshold < 2 || unify_threshold >= divide_threshold {
            return Err(SpatialError::InvalidConfig {
                divide: divide_threshold,
                unify: unify_threshold,
            });
        }
        Ok(Self {
            divide_threshold,
            unify_threshold,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        })
    }

    /// Cap the subdivision depth.
    ///
    /// Leaves at this depth never split and grow without bound instead. This
    /// is what keeps many entries at identical coordinates from recursing
    /// forever.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u16) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Entry count at which a leaf subdivides.
    pub const fn divide_threshold(&self) -> usize {
        self.divide_threshold
    }

    /// Entry count at or below which an internal node unifies.
    pub const fn unify_threshold(&self) -> usize {
        self.unify_threshold
    }

    /// Maximum depth of any node (the root is depth 0).
    pub const fn max_depth(&self) -> u16 {
        self.max_depth
    }
}

/// Deserialized thresholds, checked by [`TreeConfig::new`] before use.
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct UncheckedConfig {
    divide_threshold: usize,
    unify_threshold: usize,
    #[serde(default = "default_max_depth")]
    max_depth: u16,
}

#[cfg(feature = "serde")]
fn default_max_depth() -> u16 {
    TreeConfig::DEFAULT_MAX_DEPTH
}

#[cfg(feature = "serde")]
impl TryFrom<UncheckedConfig> for TreeConfig {
    type Error = SpatialError;

    fn try_from(raw: UncheckedConfig) -> Result<Self> {
        Ok(Self::new(raw.divide_threshold, raw.unify_threshold)?.with_max_depth(raw.max_depth))
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            divide_threshold: 16,
            unify_threshold: 4,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_thresholds() {
        assert!(matches!(
            TreeConfig::new(1, 0),
            Err(SpatialError::InvalidConfig { divide: 1, unify: 0 })
        ));
        assert!(TreeConfig::new(5, 5).is_err());
        assert!(TreeConfig::new(5, 7).is_err());
        assert!(TreeConfig::new(5, 1).is_err());
        assert!(TreeConfig::new(3, 2).is_ok());
    }

    #[test]
    fn default_is_valid() {
        let d = TreeConfig::default();
        let checked = TreeConfig::new(d.divide_threshold(), d.unify_threshold())
            .expect("default thresholds must validate");
        assert_eq!(checked, d);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializing_validates_thresholds() {
        let bad = r#"{"divide_threshold":2,"unify_threshold":9,"max_depth":32}"#;
        let err = serde_json::from_str::<TreeConfig>(bad).unwrap_err();
        assert!(err.to_string().contains("divide"), "{err}");

        let good = r#"{"divide_threshold":8,"unify_threshold":3}"#;
        let config: TreeConfig = serde_json::from_str(good).unwrap();
        assert_eq!(config, TreeConfig::new(8, 3).unwrap());

        let text = serde_json::to_string(&config.with_max_depth(5)).unwrap();
        let back: TreeConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.max_depth(), 5);
    }
}
