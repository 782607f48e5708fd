// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! `tryToRecruitSlaves`: the steady-state colony-size maintenance
//! reconciliation primitive.

use crate::app::Application;
use crate::bee::local::LocalBeeWorker;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::replication::recruit::create_slaves_for_colony;
use crate::strategy::ReplicationStrategy;
use crate::transport::RemoteHiveTransport;

/// Tops a master's colony up to `replication_factor - 1` slaves and
/// publishes the result via CAS. Returns `Ok(())` when the colony is at or
/// above the commit threshold, `Err(UnderReplicated)` as a warning-level
/// signal otherwise (the colony is still installed and running).
pub(crate) async fn try_to_recruit_slaves<A, R, T, S>(worker: &mut LocalBeeWorker<A, R, T, S>) -> Result<()>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    let id = worker.id_of();
    if worker.colony_ref().master != id {
        return Ok(());
    }

    let replication_factor = worker.hive_ref().config().replication_factor;
    let commit_threshold = worker.hive_ref().config().commit_threshold;
    let current_slaves = worker.colony_ref().slaves.len();
    let need = replication_factor.saturating_sub(current_slaves + 1);
    if need == 0 {
        return Ok(());
    }

    let old = worker.colony_ref().clone();
    let candidate = create_slaves_for_colony(worker.hive_ref(), worker.buffer_ref(), old.clone(), need).await;
    let new = candidate.next_generation();

    let cells = worker.cells_ref().clone();
    match worker.hive_ref().registry().compare_and_set(&cells, &old, new.clone()) {
        Ok(installed) => {
            let slave_count = installed.slaves.len();
            *worker.colony_mut() = installed;
            if slave_count < commit_threshold {
                log::warn!("Colony for bee {} is under-replicated: {} slave(s).", id, slave_count);
                Err(Error::UnderReplicated {
                    have: slave_count,
                    need: commit_threshold,
                })
            } else {
                Ok(())
            }
        }
        Err((_, err)) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bee::local::LocalBeeWorker;
    use crate::cell::{CellKey, MappedCells};
    use crate::colony::Colony;
    use crate::config::HiveConfig;
    use crate::hive::Hive;
    use crate::ids::{BeeId, HiveId};
    use crate::registry::InMemoryRegistry;
    use crate::strategy::RandomStrategy;
    use crate::testutil::Echo;
    use crate::transport::{remote_inbound_chan, InProcessTransport};
    use crate::tx::TxBuffer;

    fn bee(hive: u64) -> BeeId {
        BeeId::new(HiveId::new(hive), "echo", 0, false)
    }

    #[tokio::test]
    async fn already_at_the_replication_factor_is_a_no_op() {
        let transport = InProcessTransport::new();
        let self_id = bee(1);
        let mut colony = Colony::new(self_id);
        colony.slaves.insert(bee(2));

        let config = HiveConfig {
            replication_factor: 2,
            commit_threshold: 1,
            isolated: true,
            ..HiveConfig::default()
        };
        let hive = Hive::new(HiveId::new(1), Echo, InMemoryRegistry::new(), transport, RandomStrategy::new(vec![]), config);
        let mut worker = LocalBeeWorker::new_for_test(self_id, hive, MappedCells::empty(), colony.clone(), TxBuffer::new());

        assert!(try_to_recruit_slaves(&mut worker).await.is_ok());
        assert_eq!(worker.colony_ref(), &colony, "a colony already at its replication factor must not be republished");
    }

    #[tokio::test]
    async fn non_master_is_a_no_op() {
        let transport = InProcessTransport::new();
        let self_id = bee(1);
        let colony = Colony::new(bee(9));

        let hive = Hive::new(
            HiveId::new(1),
            Echo,
            InMemoryRegistry::new(),
            transport,
            RandomStrategy::new(vec![]),
            HiveConfig { isolated: true, ..HiveConfig::default() },
        );
        let mut worker = LocalBeeWorker::new_for_test(self_id, hive, MappedCells::empty(), colony, TxBuffer::new());

        assert!(try_to_recruit_slaves(&mut worker).await.is_ok());
    }

    #[tokio::test]
    async fn recruits_up_to_the_replication_factor_and_publishes_via_cas() {
        let transport = InProcessTransport::new();
        let registry = InMemoryRegistry::new();
        let self_id = bee(1);
        let candidate_hive = HiveId::new(2);

        let colony = Colony::new(self_id);
        let cells = MappedCells::single(CellKey::new("echo", "k"));
        registry.set(&cells, colony.clone());

        let config = HiveConfig {
            replication_factor: 2,
            commit_threshold: 1,
            isolated: true,
            ..HiveConfig::default()
        };
        let hive = Hive::new(
            HiveId::new(1),
            Echo,
            registry.clone(),
            transport.clone(),
            RandomStrategy::new(vec![candidate_hive]),
            config,
        );

        let candidate = Hive::new(
            candidate_hive,
            Echo,
            InMemoryRegistry::new(),
            transport.clone(),
            RandomStrategy::new(vec![]),
            HiveConfig { isolated: true, ..HiveConfig::default() },
        );
        let (tx, rx) = remote_inbound_chan();
        transport.register(candidate.id(), tx);
        let _candidate_queen = candidate.spawn_queen(rx);

        let mut worker = LocalBeeWorker::new_for_test(self_id, hive, cells, colony, TxBuffer::new());

        assert!(try_to_recruit_slaves(&mut worker).await.is_ok());
        assert_eq!(worker.colony_ref().slaves.len(), 1);
        assert_eq!(worker.colony_ref().generation, 1);
    }
}
