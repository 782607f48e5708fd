// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! `createSlavesForColony`: the slave-recruitment primitive shared by
//! steady-state replication and both failure-handler branches.

use crate::app::Application;
use crate::colony::Colony;
use crate::hive::Hive;
use crate::ids::HiveId;
use crate::registry::Registry;
use crate::strategy::ReplicationStrategy;
use crate::transport::{RemoteCmd, RemoteHiveTransport, RemoteReply};
use crate::tx::TxBuffer;

/// Recruits up to `n` new slaves into `colony`, replicating the full
/// transaction buffer to each. Bounded at `config.max_recruit_rounds`
/// rounds of candidate selection, so a replication strategy that keeps
/// returning candidates which all fail cannot loop forever.
pub(crate) async fn create_slaves_for_colony<A, R, T, S>(
    hive: &Hive<A, R, T, S>,
    buffer: &TxBuffer,
    mut colony: Colony,
    n: usize,
) -> Colony
where
    A: Application,
    R: Registry,
    T: RemoteHiveTransport,
    S: ReplicationStrategy,
{
    if n == 0 {
        return colony;
    }

    let mut blacklist: Vec<HiveId> = colony
        .slaves
        .iter()
        .map(|s| s.hive_id)
        .chain(std::iter::once(colony.master.hive_id))
        .collect();
    let mut recruited = 0usize;
    let max_rounds = hive.config().max_recruit_rounds;

    for _round in 0..max_rounds {
        if recruited >= n {
            break;
        }
        let need = n - recruited;
        let candidates = hive.strategy().select_slave_hives(&blacklist, need).await;
        if candidates.is_empty() {
            log::warn!("No more candidate hives for slave recruitment; recruited {}/{}.", recruited, n);
            break;
        }

        for candidate_hive in candidates {
            if recruited >= n {
                break;
            }

            let new_bee = match hive
                .transport()
                .send_cmd(candidate_hive, RemoteCmd::CreateBee { app: hive.app().name() })
                .await
            {
                Ok(RemoteReply::Bee(id)) => id,
                _ => {
                    blacklist.push(candidate_hive);
                    continue;
                }
            };

            colony.slaves.insert(new_bee);
            if hive
                .transport()
                .send_cmd(candidate_hive, RemoteCmd::JoinColony { bee: new_bee, colony: colony.clone() })
                .await
                .is_err()
            {
                colony.slaves.remove(&new_bee);
                blacklist.push(candidate_hive);
                continue;
            }

            let mut replicated = true;
            for tx in buffer.range(0, buffer.last_buffered()) {
                let ok = hive
                    .transport()
                    .send_cmd(candidate_hive, RemoteCmd::BufferTx { bee: new_bee, tx })
                    .await
                    .is_ok();
                if !ok {
                    replicated = false;
                    break;
                }
            }
            if replicated {
                replicated = hive
                    .transport()
                    .send_cmd(
                        candidate_hive,
                        RemoteCmd::CommitTx {
                            bee: new_bee,
                            upto: buffer.last_committed(),
                        },
                    )
                    .await
                    .is_ok();
            }

            if !replicated {
                colony.slaves.remove(&new_bee);
                blacklist.push(candidate_hive);
                continue;
            }

            recruited += 1;
        }
    }

    colony
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::Colony;
    use crate::ids::{BeeId, HiveId};
    use crate::testutil::test_hive;
    use crate::transport::remote_inbound_chan;

    fn bee(hive: u64) -> BeeId {
        BeeId::new(HiveId::new(hive), "echo", 0, false)
    }

    #[tokio::test]
    async fn recruits_the_requested_number_and_replicates_the_full_buffer() {
        let transport = crate::transport::InProcessTransport::new();
        let candidate_a = HiveId::new(2);
        let candidate_b = HiveId::new(3);
        let hive = test_hive(HiveId::new(1), vec![candidate_a, candidate_b], transport.clone());

        // Spawn real queens on the candidate hives so the CreateBee/JoinColony
        // /BufferTx/CommitTx RPCs below are actually served.
        let mut candidate_queens = Vec::new();
        for id in [candidate_a, candidate_b] {
            let h = test_hive(id, vec![], transport.clone());
            let (tx, rx) = remote_inbound_chan();
            transport.register(h.id(), tx);
            candidate_queens.push(h.spawn_queen(rx));
        }

        let mut buffer = TxBuffer::new();
        buffer.append(vec![1]);
        buffer.append(vec![2]);
        buffer.commit_up_to(1);

        let colony = Colony::new(bee(1));
        let result = create_slaves_for_colony(&hive, &buffer, colony, 2).await;

        assert_eq!(result.slaves.len(), 2);
        for &slave in result.slaves.iter() {
            let info = match hive
                .transport()
                .send_cmd(slave.hive_id, RemoteCmd::GetTxInfo { bee: slave })
                .await
                .unwrap()
            {
                RemoteReply::TxInfo(info) => info,
                other => panic!("expected TxInfo, got {:?}", other),
            };
            assert_eq!(info.last_buffered, 1, "tx #0 must not be dropped when recruiting");
            assert_eq!(info.last_committed, 1);
        }
    }

    #[tokio::test]
    async fn zero_requested_slaves_is_a_no_op() {
        let transport = crate::transport::InProcessTransport::new();
        let hive = test_hive(HiveId::new(1), vec![], transport);
        let colony = Colony::new(bee(1));
        let result = create_slaves_for_colony(&hive, &TxBuffer::new(), colony.clone(), 0).await;
        assert_eq!(result, colony);
    }

    #[tokio::test]
    async fn recruits_nothing_when_no_candidate_hives_are_known() {
        let transport = crate::transport::InProcessTransport::new();
        let hive = test_hive(HiveId::new(1), vec![], transport);
        let colony = Colony::new(bee(1));
        let result = create_slaves_for_colony(&hive, &TxBuffer::new(), colony, 1).await;
        assert!(result.slaves.is_empty());
    }
}
