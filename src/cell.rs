// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

// Sharding/ownership units addressed by an application's map function.

use std::collections::BTreeSet;
use std::fmt;

/// The name of a state dictionary within a bee.
pub type DictName = String;

/// A key within a dictionary.
pub type Key = String;

/// A unit of sharding/ownership: a single bee owns a set of these.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CellKey {
    pub dict: DictName,
    pub key: Key,
}

impl CellKey {
    pub fn new(dict: impl Into<DictName>, key: impl Into<Key>) -> Self {
        Self {
            dict: dict.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dict, self.key)
    }
}

/// The unordered set of cells an application's map function returns for a
/// message, or the special [`MappedCells::LocalBroadcast`] marker.
///
/// Backed by a `BTreeSet` (rather than a `HashSet`) so that the set itself
/// is `Hash`/`Ord` and can key the registry's `MappedCells -> Colony` map.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum MappedCells {
    /// Route to every local bee instead of a single owner.
    LocalBroadcast,
    /// Route to the bee owning this set of cells.
    Cells(BTreeSet<CellKey>),
}

impl MappedCells {
    pub fn empty() -> Self {
        Self::Cells(BTreeSet::new())
    }

    pub fn of(cells: impl IntoIterator<Item = CellKey>) -> Self {
        Self::Cells(cells.into_iter().collect())
    }

    pub fn single(cell: CellKey) -> Self {
        let mut set = BTreeSet::new();
        set.insert(cell);
        Self::Cells(set)
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::LocalBroadcast)
    }

    pub fn cells(&self) -> Option<&BTreeSet<CellKey>> {
        match self {
            Self::LocalBroadcast => None,
            Self::Cells(cells) => Some(cells),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_cell_sets_compare_equal_regardless_of_insertion_order() {
        let a = MappedCells::of([CellKey::new("d", "k1"), CellKey::new("d", "k2")]);
        let b = MappedCells::of([CellKey::new("d", "k2"), CellKey::new("d", "k1")]);
        assert_eq!(a, b, "MappedCells must key the registry regardless of map-function ordering");
    }

    #[test]
    fn broadcast_is_not_a_cell_set() {
        assert!(MappedCells::LocalBroadcast.is_broadcast());
        assert!(MappedCells::LocalBroadcast.cells().is_none());
        assert!(!MappedCells::empty().is_broadcast());
    }

    #[test]
    fn single_produces_a_one_element_set() {
        let cells = MappedCells::single(CellKey::new("d", "k"));
        assert_eq!(cells.cells().unwrap().len(), 1);
    }
}
