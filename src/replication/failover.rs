// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The failure-handler branches: slave-failure master recovery and
//! master-failure slave-promotion.

use std::collections::HashSet;

use crate::app::Application;
use crate::bee::local::{probe_peers, LocalBeeWorker};
use crate::colony::TxInfo;
use crate::ids::BeeId;
use crate::registry::Registry;
use crate::replication::recruit::create_slaves_for_colony;
use crate::strategy::ReplicationStrategy;
use crate::transport::{RemoteCmd, RemoteHiveTransport, RemoteReply};

/// A slave died and self (the master) recruits a replacement. Returns
/// `true` if self must stop (the registry no longer agrees with our view
/// of the colony).
pub(crate) async fn recover_slave<A, R, T, S>(worker: &mut LocalBeeWorker<A, R, T, S>, failed: BeeId) -> bool
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    let old = worker.colony_ref().clone();
    let mut candidate = old.clone();
    candidate.slaves.remove(&failed);

    let candidate = create_slaves_for_colony(worker.hive_ref(), worker.buffer_ref(), candidate, 1).await;
    let new = candidate.next_generation();
    let cells = worker.cells_ref().clone();

    match worker.hive_ref().registry().compare_and_set(&cells, &old, new) {
        Ok(installed) => {
            *worker.colony_mut() = installed;
            false
        }
        Err(_) => {
            worker.stop_self("registry view is stale after a slave failure");
            true
        }
    }
}

/// The master died and self is one of its slaves. Probes peers, reconciles
/// logs, recruits replacements and races to publish the new colony via
/// CAS. Returns `true` if self must stop.
pub(crate) async fn promote_self<A, R, T, S>(worker: &mut LocalBeeWorker<A, R, T, S>) -> bool
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    let old = worker.colony_ref().clone();
    let self_id = worker.id_of();
    let self_generation = old.generation;

    let mut surviving: HashSet<BeeId> = old.slaves.clone();
    surviving.remove(&self_id);
    let peer_slaves: Vec<BeeId> = surviving.iter().copied().collect();

    let (probes, unreachable) = probe_peers(worker, &peer_slaves).await;

    if probes.iter().any(|p| p.info.generation > self_generation) {
        worker.stop_self("a newer quorum already elected a master");
        return true;
    }

    if worker.hive_ref().registry().mapped_cells(&old).is_none() {
        worker.stop_self("colony was already rewritten before promotion");
        return true;
    }
    let cells = worker.cells_ref().clone();

    let mut max_buffered = worker.buffer_ref().last_buffered();
    let mut max_committed = worker.buffer_ref().last_committed();
    let mut last_buffered_peer: Option<BeeId> = None;
    for p in &probes {
        if p.info.generation == self_generation {
            if p.info.last_buffered > max_buffered {
                max_buffered = p.info.last_buffered;
                last_buffered_peer = Some(p.bee);
            }
            if p.info.last_committed > max_committed {
                max_committed = p.info.last_committed;
            }
        }
    }

    let mut max_info = TxInfo::new(self_generation, max_buffered, max_committed);
    if max_info.repair_invariant() {
        log::warn!(
            "Bee {} observed last_committed > last_buffered during promotion; clamped.",
            self_id
        );
    }

    if let Some(peer) = last_buffered_peer {
        let from = worker.buffer_ref().last_buffered() + 1;
        let to = max_info.last_buffered;
        if from <= to {
            match worker
                .hive_ref()
                .transport()
                .send_cmd(peer.hive_id, RemoteCmd::GetTx { bee: peer, from, to })
                .await
            {
                Ok(RemoteReply::Txs(txs)) => {
                    for tx in txs {
                        worker.buffer_mut().append_foreign(tx, max_info.last_committed);
                    }
                }
                _ => log::warn!("Bee {} could not catch up from {}; proceeding with what it has.", self_id, peer),
            }
        }
    }

    let mut failed_peers: HashSet<BeeId> = unreachable.into_iter().collect();
    for p in &probes {
        if p.info.last_buffered < max_info.last_buffered {
            let txs = worker.buffer_ref().after(p.info.last_buffered);
            let mut ok = true;
            for tx in txs {
                if worker
                    .hive_ref()
                    .transport()
                    .send_cmd(p.bee.hive_id, RemoteCmd::BufferTx { bee: p.bee, tx })
                    .await
                    .is_err()
                {
                    ok = false;
                    break;
                }
            }
            if !ok {
                failed_peers.insert(p.bee);
            }
        }
    }
    for p in &probes {
        if failed_peers.contains(&p.bee) {
            continue;
        }
        if p.info.last_committed < max_info.last_committed {
            if worker
                .hive_ref()
                .transport()
                .send_cmd(
                    p.bee.hive_id,
                    RemoteCmd::CommitTx {
                        bee: p.bee,
                        upto: max_info.last_committed,
                    },
                )
                .await
                .is_err()
            {
                failed_peers.insert(p.bee);
            }
        }
    }

    let mut candidate = old.clone();
    candidate.master = self_id;
    candidate.slaves = surviving.difference(&failed_peers).copied().collect();

    let replication_factor = worker.hive_ref().config().replication_factor;
    let commit_threshold = worker.hive_ref().config().commit_threshold;
    let need = replication_factor.saturating_sub(candidate.slaves.len() + 1);
    let candidate = create_slaves_for_colony(worker.hive_ref(), worker.buffer_ref(), candidate, need).await;
    if candidate.slaves.len() < commit_threshold {
        log::warn!(
            "Bee {} promoted to master with only {} slave(s), below the commit threshold.",
            self_id,
            candidate.slaves.len()
        );
    }

    let new = candidate.next_generation();
    let installed = match worker.hive_ref().registry().compare_and_set(&cells, &old, new) {
        Ok(installed) => installed,
        Err(_) => {
            worker.stop_self("a competing slave won the promotion race");
            return true;
        }
    };

    for &slave in installed.slaves.iter() {
        if worker
            .hive_ref()
            .transport()
            .send_cmd(slave.hive_id, RemoteCmd::JoinColony { bee: slave, colony: installed.clone() })
            .await
            .is_err()
        {
            log::warn!("Bee {} could not announce the new colony to {}.", self_id, slave);
        }
    }

    *worker.colony_mut() = installed;
    worker.set_cells(cells);
    worker.commit_and_apply(max_info.last_buffered);
    worker.buffer_mut().advance_to(max_info.last_buffered);

    false
}
