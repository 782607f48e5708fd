// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Pluggable selection of candidate hives for slave recruitment.

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::ids::HiveId;

/// Supplies candidate hives to recruit slaves on. Must not return
/// blacklisted hives; may return fewer than `n`.
#[async_trait]
pub trait ReplicationStrategy: Send + Sync {
    async fn select_slave_hives(&self, blacklist: &[HiveId], n: usize) -> Vec<HiveId>;
}

/// A strategy that shuffles a fixed catalog of known hives and filters out
/// the blacklist. Stands in for a real cluster-membership-aware strategy
/// until one is plugged in.
pub struct RandomStrategy {
    catalog: Vec<HiveId>,
}

impl RandomStrategy {
    pub fn new(catalog: Vec<HiveId>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ReplicationStrategy for RandomStrategy {
    async fn select_slave_hives(&self, blacklist: &[HiveId], n: usize) -> Vec<HiveId> {
        let mut candidates: Vec<HiveId> = self
            .catalog
            .iter()
            .filter(|h| !blacklist.contains(h))
            .copied()
            .collect();

        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(n);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_returns_blacklisted_hives() {
        let catalog = (1..=5).map(HiveId::new).collect();
        let strategy = RandomStrategy::new(catalog);
        let blacklist = vec![HiveId::new(1), HiveId::new(2)];

        let picked = strategy.select_slave_hives(&blacklist, 10).await;

        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|h| !blacklist.contains(h)));
    }

    #[tokio::test]
    async fn returns_fewer_than_n_when_catalog_is_small() {
        let strategy = RandomStrategy::new(vec![HiveId::new(1)]);
        let picked = strategy.select_slave_hives(&[], 5).await;
        assert_eq!(picked.len(), 1);
    }
}
