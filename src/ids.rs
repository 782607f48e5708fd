// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

// Identity types for hives and bees.

use std::fmt;

/// Identifies a single node ("hive") in the cluster.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct HiveId(u64);

impl HiveId {
    /// Creates a new hive identity from a raw numeric id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hive-{}", self.0)
    }
}

/// Globally unique, stable identity of a bee: (hive, app, local sequence, detached).
///
/// Equality is by tuple value, matching the data model's identity semantics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BeeId {
    pub hive_id: HiveId,
    pub app_name: &'static str,
    pub local_seq: u64,
    pub detached: bool,
}

impl BeeId {
    pub fn new(hive_id: HiveId, app_name: &'static str, local_seq: u64, detached: bool) -> Self {
        Self {
            hive_id,
            app_name,
            local_seq,
            detached,
        }
    }

    /// Whether this id names a bee hosted on `hive_id`.
    pub fn is_local_to(&self, hive_id: HiveId) -> bool {
        self.hive_id == hive_id
    }
}

impl fmt::Display for BeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}{}",
            self.hive_id,
            self.app_name,
            self.local_seq,
            if self.detached { "/detached" } else { "" }
        )
    }
}

/// Allocates monotonically increasing local sequence numbers for a single queen.
///
/// Owned exclusively by the queen loop (never shared across threads), so a
/// speculative allocation made while routing a non-unicast message can be
/// rolled back with a plain decrement instead of a CAS.
#[derive(Default)]
pub(crate) struct BeeIdAllocator {
    next: u64,
}

impl BeeIdAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, hive_id: HiveId, app_name: &'static str) -> BeeId {
        let seq = self.next;
        self.next += 1;
        BeeId::new(hive_id, app_name, seq, false)
    }

    /// Releases a speculatively allocated id back to the counter.
    ///
    /// Only valid immediately after `alloc` returned `id` and nothing else
    /// has allocated since.
    pub(crate) fn release(&mut self, id: BeeId) {
        if self.next == id.local_seq + 1 {
            self.next = id.local_seq;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_produces_dense_increasing_sequence_numbers() {
        let mut alloc = BeeIdAllocator::new();
        let hive = HiveId::new(1);
        let a = alloc.alloc(hive, "app");
        let b = alloc.alloc(hive, "app");
        assert_eq!(a.local_seq, 0);
        assert_eq!(b.local_seq, 1);
    }

    #[test]
    fn release_rolls_back_an_immediately_preceding_allocation() {
        let mut alloc = BeeIdAllocator::new();
        let hive = HiveId::new(1);
        let speculative = alloc.alloc(hive, "app");
        alloc.release(speculative);
        let reused = alloc.alloc(hive, "app");
        assert_eq!(reused.local_seq, speculative.local_seq, "release must make the id available again");
    }

    #[test]
    fn release_is_a_no_op_once_something_else_has_allocated_since() {
        let mut alloc = BeeIdAllocator::new();
        let hive = HiveId::new(1);
        let first = alloc.alloc(hive, "app");
        let _second = alloc.alloc(hive, "app");
        alloc.release(first);
        let next = alloc.alloc(hive, "app");
        assert_eq!(next.local_seq, 2, "a stale release must not roll back past a newer allocation");
    }

    #[test]
    fn bee_id_is_local_to_its_own_hive_only() {
        let id = BeeId::new(HiveId::new(1), "app", 0, false);
        assert!(id.is_local_to(HiveId::new(1)));
        assert!(!id.is_local_to(HiveId::new(2)));
    }
}
