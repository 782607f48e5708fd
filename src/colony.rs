// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

// Replication group descriptor and the per-bee transaction-log view used
// during failover reconciliation.

use std::collections::HashSet;

use crate::ids::BeeId;

/// A replication group: one master plus its slaves.
///
/// Invariants (enforced by the constructors below, not by field access):
/// master is never a slave; slaves live on distinct hives, none of which is
/// the master's hive; `generation` strictly increases across every
/// published mutation (enforced by the publishing call sites, see
/// `colony::replicate` and `colony::failover`).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Colony {
    pub master: BeeId,
    pub slaves: HashSet<BeeId>,
    pub generation: u64,
}

impl Colony {
    /// Creates a freshly formed colony at generation 0 with no slaves yet.
    pub fn new(master: BeeId) -> Self {
        Self {
            master,
            slaves: HashSet::new(),
            generation: 0,
        }
    }

    /// Returns `true` if the colony's invariants hold.
    pub fn is_well_formed(&self) -> bool {
        !self.slaves.contains(&self.master)
            && self.slaves.iter().all(|s| s.hive_id != self.master.hive_id)
            && {
                let mut hives: Vec<_> = self.slaves.iter().map(|s| s.hive_id).collect();
                hives.sort();
                hives.dedup();
                hives.len() == self.slaves.len()
            }
    }

    /// Returns a copy bumped to the next generation, ready for mutation
    /// before a `compareAndSet` publish.
    pub fn next_generation(&self) -> Self {
        let mut next = self.clone();
        next.generation += 1;
        next
    }

    pub fn contains(&self, id: &BeeId) -> bool {
        &self.master == id || self.slaves.contains(id)
    }

    /// All surviving peers of `id` within this colony (master and slaves,
    /// minus `id` itself).
    pub fn peers_of(&self, id: &BeeId) -> Vec<BeeId> {
        let mut peers = Vec::with_capacity(self.slaves.len());
        if &self.master != id {
            peers.push(self.master);
        }
        peers.extend(self.slaves.iter().filter(|s| *s != id).copied());
        peers
    }
}

/// A bee's view of its colony's transaction log state, exchanged during
/// failover reconciliation.
///
/// Invariant: `last_committed <= last_buffered`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TxInfo {
    pub generation: u64,
    pub last_buffered: u64,
    pub last_committed: u64,
}

impl TxInfo {
    pub fn new(generation: u64, last_buffered: u64, last_committed: u64) -> Self {
        Self {
            generation,
            last_buffered,
            last_committed,
        }
    }

    /// Clamps `last_committed` down to `last_buffered` if the invariant is
    /// violated, returning whether a clamp was necessary. Callers log a
    /// warning when this returns `true` rather than aborting the promotion.
    pub fn repair_invariant(&mut self) -> bool {
        if self.last_committed > self.last_buffered {
            self.last_committed = self.last_buffered;
            true
        } else {
            false
        }
    }
}
