// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A local bee: owns cells, holds state, runs a serial transaction loop. A
//! struct wrapping shared context plus an owned receiver, spawned via
//! [`crate::task::Spawner`] and driven by a `tokio::select!` loop.

use tokio::sync::mpsc;

use crate::app::{catch_panic, Application};
use crate::bee::{BeeCommand, BeeHandle, Envelope};
use crate::cell::MappedCells;
use crate::colony::{Colony, TxInfo};
use crate::error::{Error, Result};
use crate::hive::Hive;
use crate::ids::BeeId;
use crate::registry::Registry;
use crate::state::BeeState;
use crate::strategy::ReplicationStrategy;
use crate::task::{Runnable, ShutdownRx};
use crate::transport::{RemoteCmd, RemoteHiveTransport, RemoteReply};
use crate::tx::{Tx, TxBuffer, TxStatus};

type EnvelopeTx<A> = mpsc::UnboundedSender<Envelope<<A as Application>::Message>>;
type EnvelopeRx<A> = mpsc::UnboundedReceiver<Envelope<<A as Application>::Message>>;

/// A cheap-to-clone reference installed in a queen's indices.
pub(crate) struct LocalBee<A: Application> {
    id: BeeId,
    tx: EnvelopeTx<A>,
}

impl<A: Application> Clone for LocalBee<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
        }
    }
}

impl<A: Application> BeeHandle<A> for LocalBee<A> {
    fn id(&self) -> BeeId {
        self.id
    }

    fn enqueue_message(&self, msg: A::Message) -> Result<()> {
        self.tx
            .send(Envelope::Data(msg))
            .map_err(|_| Error::Unreachable {
                bee: self.id,
                reason: "local bee channel closed".into(),
            })
    }

    fn enqueue_command(&self, cmd: BeeCommand) -> Result<()> {
        self.tx
            .send(Envelope::Ctrl(cmd))
            .map_err(|_| Error::Unreachable {
                bee: self.id,
                reason: "local bee channel closed".into(),
            })
    }
}

/// Constructs a fresh local bee: the handle installed in the queen's
/// indices plus the worker task ready to spawn.
pub(crate) fn spawn_local<A, R, T, S>(
    id: BeeId,
    hive: Hive<A, R, T, S>,
    cells: MappedCells,
    colony: Colony,
    shutdown_rx: ShutdownRx,
) -> LocalBee<A>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = LocalBeeWorker {
        id,
        hive,
        cells,
        colony,
        state: BeeState::new(),
        buffer: TxBuffer::new(),
        rx,
    };
    crate::task::Spawner::spawn_runnable(worker, shutdown_rx);
    LocalBee { id, tx }
}

pub(crate) struct LocalBeeWorker<A, R, T, S>
where
    A: Application,
    R: Registry,
    T: RemoteHiveTransport,
    S: ReplicationStrategy,
{
    id: BeeId,
    hive: Hive<A, R, T, S>,
    cells: MappedCells,
    colony: Colony,
    state: BeeState,
    buffer: TxBuffer,
    rx: EnvelopeRx<A>,
}

#[async_trait::async_trait]
impl<A, R, T, S> Runnable for LocalBeeWorker<A, R, T, S>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    const NAME: &'static str = "local-bee";

    async fn run(mut self, mut shutdown_rx: ShutdownRx) {
        let mut recruit_tick = tokio::time::interval(std::time::Duration::from_secs(30));
        recruit_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    log::debug!("Bee {} shut down without a Stop command.", self.id);
                    return;
                }
                envelope = self.rx.recv() => {
                    match envelope {
                        Some(Envelope::Data(msg)) => self.handle_message(msg).await,
                        Some(Envelope::Ctrl(cmd)) => {
                            if self.handle_command(cmd).await {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                _ = recruit_tick.tick() => {
                    if self.is_master() {
                        if let Err(err) = crate::replication::replicate::try_to_recruit_slaves(&mut self).await {
                            log::warn!("Bee {} colony maintenance: {}.", self.id, err);
                        }
                    }
                }
            }
        }
    }
}

impl<A, R, T, S> LocalBeeWorker<A, R, T, S>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    fn is_master(&self) -> bool {
        self.colony.master == self.id
    }

    async fn handle_message(&mut self, msg: A::Message) {
        let app = self.hive.app().clone();
        let payload = match catch_panic(|| app.handle(msg)) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("Bee {} dropped a message: {}.", self.id, err);
                return;
            }
        };

        if !self.is_master() {
            log::warn!("Bee {} received a message while not master; dropping.", self.id);
            return;
        }

        let seq = self.buffer.append(payload.clone());
        let quorum_needed = self.hive.config().commit_threshold;
        let mut acked = 0usize;

        for slave in self.colony.slaves.iter().copied() {
            let tx = Tx {
                seq,
                payload: payload.clone(),
                status: TxStatus::Buffered,
            };
            match self
                .hive
                .transport()
                .send_cmd(slave.hive_id, RemoteCmd::BufferTx { bee: slave, tx })
                .await
            {
                Ok(RemoteReply::Ack) => acked += 1,
                Ok(_) | Err(_) => {
                    log::warn!("Bee {} failed to replicate seq {} to slave {}.", self.id, seq, slave);
                }
            }
        }

        if acked >= quorum_needed || self.colony.slaves.is_empty() {
            self.buffer.commit_up_to(seq);
            self.apply_committed(seq);
            for slave in self.colony.slaves.iter().copied() {
                let _ = self
                    .hive
                    .transport()
                    .send_cmd(slave.hive_id, RemoteCmd::CommitTx { bee: slave, upto: seq })
                    .await;
            }
        }
    }

    fn apply_committed(&mut self, upto: u64) {
        let app = self.hive.app().clone();
        for tx in self.buffer.range(0, upto) {
            if tx.status == TxStatus::Committed {
                app.apply(&mut self.state, &tx.payload);
            }
        }
    }

    /// Returns `true` if the worker should terminate after this command.
    async fn handle_command(&mut self, cmd: BeeCommand) -> bool {
        match cmd {
            BeeCommand::Stop { reply } => {
                let _ = reply.send(());
                return true;
            }
            BeeCommand::JoinColony { colony, reply } => {
                self.colony = colony;
                let _ = reply.send(Ok(()));
            }
            BeeCommand::GetTxInfo { reply } => {
                let info = TxInfo::new(self.colony.generation, self.buffer.last_buffered(), self.buffer.last_committed());
                let _ = reply.send(Ok(info));
            }
            BeeCommand::GetTx { from, to, reply } => {
                let _ = reply.send(Ok(self.buffer.range(from, to)));
            }
            BeeCommand::BufferTx { tx, reply } => {
                self.buffer.append_foreign(tx, self.buffer.last_committed());
                let _ = reply.send(Ok(()));
            }
            BeeCommand::CommitTx { upto, reply } => {
                self.buffer.commit_up_to(upto);
                self.apply_committed(upto);
                let _ = reply.send(Ok(()));
            }
            BeeCommand::BeeFailed { failed } => {
                return self.on_bee_failed(failed).await;
            }
            BeeCommand::GetSnapshot { reply } => {
                let _ = reply.send(Ok(self.state.snapshot()));
            }
            BeeCommand::Restore { snapshot, reply } => {
                self.state = BeeState::restore(snapshot);
                self.colony = Colony::new(self.id);
                let _ = reply.send(Ok(()));
            }
        }
        false
    }

    /// The failure-handler entry point: acquires the app-lock, then
    /// dispatches on whether the failed peer was a slave (we stay master)
    /// or the master (we must try to win promotion). Returns `true` if the
    /// worker must now stop (a stale view of the colony).
    async fn on_bee_failed(&mut self, failed: BeeId) -> bool {
        if !self.colony.contains(&failed) || failed == self.id {
            return false;
        }

        let mut delay = crate::delay::lock_retry_delay(self.hive.config().lock_timeout());
        loop {
            match self.hive.registry().try_lock_app(self.id).await {
                Ok(()) => break,
                Err(Error::LockContention { .. }) => match delay.next() {
                    Some(d) => tokio::time::sleep(d).await,
                    None => {
                        log::warn!("Bee {} gave up waiting for the app lock after a failure.", self.id);
                        return false;
                    }
                },
                Err(err) => {
                    log::warn!("Bee {} failed to acquire the app lock: {}.", self.id, err);
                    return false;
                }
            }
        }

        let stop = if failed == self.colony.master {
            crate::replication::failover::promote_self(self).await
        } else if self.is_master() {
            crate::replication::failover::recover_slave(self, failed).await
        } else {
            false
        };

        let _ = self.hive.registry().unlock_app(self.id).await;
        stop
    }
}

// Accessors used by `crate::replication` without widening field visibility
// across the whole crate.
impl<A, R, T, S> LocalBeeWorker<A, R, T, S>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    pub(crate) fn id_of(&self) -> BeeId {
        self.id
    }

    pub(crate) fn hive_ref(&self) -> &Hive<A, R, T, S> {
        &self.hive
    }

    pub(crate) fn colony_ref(&self) -> &Colony {
        &self.colony
    }

    pub(crate) fn colony_mut(&mut self) -> &mut Colony {
        &mut self.colony
    }

    pub(crate) fn cells_ref(&self) -> &MappedCells {
        &self.cells
    }

    pub(crate) fn set_cells(&mut self, cells: MappedCells) {
        self.cells = cells;
    }

    pub(crate) fn buffer_ref(&self) -> &TxBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut TxBuffer {
        &mut self.buffer
    }

    pub(crate) fn state_mut(&mut self) -> &mut BeeState {
        &mut self.state
    }

    pub(crate) fn stop_self(&self, reason: &str) {
        log::info!("Bee {} stopping: {}.", self.id, reason);
    }

    pub(crate) fn commit_and_apply(&mut self, upto: u64) {
        self.buffer.commit_up_to(upto);
        self.apply_committed(upto);
    }
}

/// A snapshot of a colony peer's replicated-log position, gathered during
/// the peer-probe step of the master-promotion protocol.
pub(crate) struct PeerProbe {
    pub bee: BeeId,
    pub info: TxInfo,
}

#[cfg(test)]
impl<A, R, T, S> LocalBeeWorker<A, R, T, S>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    /// Builds a worker directly, bypassing `spawn_local`'s task spawn, so
    /// failure-handler logic can be driven from a test without a live
    /// envelope channel.
    pub(crate) fn new_for_test(id: BeeId, hive: Hive<A, R, T, S>, cells: MappedCells, colony: Colony, buffer: TxBuffer) -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self {
            id,
            hive,
            cells,
            colony,
            state: BeeState::new(),
            buffer,
            rx,
        }
    }
}

pub(crate) async fn probe_peers<A, R, T, S>(
    worker: &LocalBeeWorker<A, R, T, S>,
    peers: &[BeeId],
) -> (Vec<PeerProbe>, Vec<BeeId>)
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    let mut reachable = Vec::new();
    let mut failed = Vec::new();
    for &peer in peers {
        match worker
            .hive_ref()
            .transport()
            .send_cmd(peer.hive_id, RemoteCmd::GetTxInfo { bee: peer })
            .await
        {
            Ok(RemoteReply::TxInfo(info)) => reachable.push(PeerProbe { bee: peer, info }),
            _ => failed.push(peer),
        }
    }
    (reachable, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colony::Colony;
    use crate::ids::HiveId;
    use crate::testutil::test_hive;

    fn worker_with_colony(
        id: BeeId,
        colony: Colony,
    ) -> LocalBeeWorker<
        crate::testutil::Echo,
        crate::registry::InMemoryRegistry,
        crate::transport::InProcessTransport,
        crate::strategy::RandomStrategy,
    > {
        let hive = test_hive(id.hive_id, vec![], crate::transport::InProcessTransport::new());
        LocalBeeWorker::new_for_test(id, hive, MappedCells::empty(), colony, TxBuffer::new())
    }

    #[tokio::test]
    async fn on_bee_failed_is_a_no_op_for_a_stranger_outside_the_colony() {
        let self_id = BeeId::new(HiveId::new(1), "echo", 0, false);
        let stranger = BeeId::new(HiveId::new(2), "echo", 0, false);
        let mut worker = worker_with_colony(self_id, Colony::new(self_id));

        let stop = worker.on_bee_failed(stranger).await;

        assert!(!stop, "a failure notification about a peer outside the colony must be ignored");
    }

    #[tokio::test]
    async fn on_bee_failed_is_a_no_op_when_the_failed_id_is_self() {
        let self_id = BeeId::new(HiveId::new(1), "echo", 0, false);
        let mut worker = worker_with_colony(self_id, Colony::new(self_id));

        let stop = worker.on_bee_failed(self_id).await;

        assert!(!stop, "a bee cannot react to its own failure notification");
    }
}
