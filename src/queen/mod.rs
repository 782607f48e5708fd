// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The per-(hive, application) router: a single-threaded event loop over a
//! data channel and a control channel, owning the `byID`/`byCell` indices.

pub(crate) mod migrate;
pub(crate) mod routing;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::app::Application;
use crate::bee::{Bee, BeeCommand, BeeHandle};
use crate::cell::CellKey;
use crate::command::{command_chan, CommandRx, CommandTx, QueenCommand};
use crate::error::{Error, Result};
use crate::hive::Hive;
use crate::ids::{BeeId, BeeIdAllocator, HiveId};
use crate::registry::Registry;
use crate::strategy::ReplicationStrategy;
use crate::task::{shutdown_chan, Runnable, ShutdownRx, ShutdownTx, Spawner};
use crate::transport::{RemoteHiveTransport, RemoteRequest};

/// A message on the data channel: either addressed directly to a known
/// bee, or subject to the application's map function.
pub(crate) enum RoutedMessage<M> {
    Unicast(BeeId, M),
    Mapped(M),
}

type DataTx<A> = mpsc::UnboundedSender<RoutedMessage<<A as Application>::Message>>;
type DataRx<A> = mpsc::UnboundedReceiver<RoutedMessage<<A as Application>::Message>>;

/// The externally held reference to a running queen.
///
/// Holds the queen task's shutdown sender: the task runs for as long as
/// any clone of this handle is alive, and tears down (ungracefully,
/// logged as such) once the last clone drops. Call [`QueenHandle::stop`]
/// for a graceful shutdown instead.
pub struct QueenHandle<A: Application> {
    data_tx: DataTx<A>,
    ctrl_tx: CommandTx<A>,
    _shutdown: Arc<ShutdownTx>,
}

impl<A: Application> Clone for QueenHandle<A> {
    fn clone(&self) -> Self {
        Self {
            data_tx: self.data_tx.clone(),
            ctrl_tx: self.ctrl_tx.clone(),
            _shutdown: self._shutdown.clone(),
        }
    }
}

impl<A: Application> QueenHandle<A> {
    pub fn send_unicast(&self, target: BeeId, msg: A::Message) -> Result<()> {
        self.data_tx
            .send(RoutedMessage::Unicast(target, msg))
            .map_err(|_| Error::Unreachable {
                bee: target,
                reason: "queen data channel closed".into(),
            })
    }

    pub fn send_mapped(&self, msg: A::Message) -> Result<()> {
        self.data_tx.send(RoutedMessage::Mapped(msg)).map_err(|_| {
            Error::NotFound("queen data channel closed".into())
        })
    }

    pub async fn find_bee(&self, id: BeeId) -> Result<BeeId> {
        let (reply, rx) = oneshot::channel();
        self.ctrl_tx
            .send(QueenCommand::FindBee { id, reply })
            .map_err(|_| Error::NotFound("queen control channel closed".into()))?;
        rx.await.map_err(|_| Error::NotFound("queen dropped the reply".into()))?
    }

    pub async fn start_detached(&self, seed: A::Message) -> Result<BeeId> {
        let (reply, rx) = oneshot::channel();
        self.ctrl_tx
            .send(QueenCommand::StartDetached { seed, reply })
            .map_err(|_| Error::NotFound("queen control channel closed".into()))?;
        rx.await.map_err(|_| Error::NotFound("queen dropped the reply".into()))?
    }

    pub async fn create_bee(&self) -> Result<BeeId> {
        let (reply, rx) = oneshot::channel();
        self.ctrl_tx
            .send(QueenCommand::CreateBee { reply })
            .map_err(|_| Error::NotFound("queen control channel closed".into()))?;
        rx.await.map_err(|_| Error::NotFound("queen dropped the reply".into()))?
    }

    pub async fn migrate_bee(&self, id: BeeId, target: HiveId) -> Result<BeeId> {
        let (reply, rx) = oneshot::channel();
        self.ctrl_tx
            .send(QueenCommand::MigrateBee { id, target, reply })
            .map_err(|_| Error::NotFound("queen control channel closed".into()))?;
        rx.await.map_err(|_| Error::NotFound("queen dropped the reply".into()))?
    }

    pub async fn lock_mapped_cells(&self, cells: crate::cell::MappedCells, owner: BeeId) -> Result<BeeId> {
        let (reply, rx) = oneshot::channel();
        self.ctrl_tx
            .send(QueenCommand::LockMappedCells { cells, owner, reply })
            .map_err(|_| Error::NotFound("queen control channel closed".into()))?;
        rx.await.map_err(|_| Error::NotFound("queen dropped the reply".into()))?
    }

    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.ctrl_tx
            .send(QueenCommand::Stop { reply })
            .map_err(|_| Error::NotFound("queen control channel closed".into()))?;
        rx.await.map_err(|_| Error::NotFound("queen dropped the reply".into()))
    }
}

pub(crate) struct Queen<A, R, T, S>
where
    A: Application,
    R: Registry,
    T: RemoteHiveTransport,
    S: ReplicationStrategy,
{
    hive: Hive<A, R, T, S>,
    by_id: HashMap<BeeId, Bee<A>>,
    by_cell: HashMap<CellKey, BeeId>,
    id_alloc: BeeIdAllocator,
    data_rx: DataRx<A>,
    ctrl_rx: CommandRx<A>,
    inbound_rpc_rx: mpsc::UnboundedReceiver<RemoteRequest>,
    // Kept alive only so bee tasks aren't orphaned when the queen itself
    // is torn down; individual bees stop via their own `Stop` command.
    bee_shutdowns: Vec<ShutdownTx>,
}

/// Spawns a queen. The caller is responsible for registering
/// `inbound_rpc_rx`'s paired sender with the transport under `hive.id()`
/// before other hives can reach it.
pub(crate) fn spawn_queen<A, R, T, S>(
    hive: Hive<A, R, T, S>,
    inbound_rpc_rx: mpsc::UnboundedReceiver<RemoteRequest>,
) -> QueenHandle<A>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    let (data_tx, data_rx) = mpsc::unbounded_channel();
    let (ctrl_tx, ctrl_rx) = command_chan();
    let (shutdown_tx, shutdown_rx) = shutdown_chan();

    let queen = Queen {
        hive,
        by_id: HashMap::new(),
        by_cell: HashMap::new(),
        id_alloc: BeeIdAllocator::new(),
        data_rx,
        ctrl_rx,
        inbound_rpc_rx,
        bee_shutdowns: Vec::new(),
    };
    Spawner::spawn_runnable(queen, shutdown_rx);

    QueenHandle {
        data_tx,
        ctrl_tx,
        _shutdown: Arc::new(shutdown_tx),
    }
}

#[async_trait::async_trait]
impl<A, R, T, S> Runnable for Queen<A, R, T, S>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    const NAME: &'static str = "queen";

    async fn run(mut self, mut shutdown_rx: ShutdownRx) {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    log::debug!("Queen for {} torn down without a graceful Stop.", self.hive.app().name());
                    return;
                }
                routed = self.data_rx.recv() => {
                    match routed {
                        Some(routed) => routing::route_message(&mut self, routed).await,
                        None => return,
                    }
                }
                cmd = self.ctrl_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                req = self.inbound_rpc_rx.recv() => {
                    match req {
                        Some(req) => self.handle_remote_rpc(req).await,
                        None => {}
                    }
                }
            }
        }
    }
}

impl<A, R, T, S> Queen<A, R, T, S>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    /// Returns `true` if the loop must now exit.
    async fn handle_command(&mut self, cmd: QueenCommand<A>) -> bool {
        match cmd {
            QueenCommand::Stop { reply } => {
                for bee in self.by_id.values() {
                    let (tx, rx) = oneshot::channel();
                    if bee.enqueue_command(BeeCommand::Stop { reply: tx }).is_ok() {
                        let _ = rx.await;
                    }
                }
                let _ = reply.send(());
                return true;
            }
            QueenCommand::FindBee { id, reply } => {
                let result = self
                    .by_id
                    .get(&id)
                    .map(|b| b.id())
                    .ok_or_else(|| Error::NotFound(format!("bee {} not found", id)));
                let _ = reply.send(result);
            }
            QueenCommand::CreateBee { reply } => {
                let id = self.id_alloc.alloc(self.hive.id(), self.hive.app().name());
                self.spawn_local_bee(id, crate::cell::MappedCells::empty(), crate::colony::Colony::new(id));
                let _ = reply.send(Ok(id));
            }
            QueenCommand::MigrateBee { id, target, reply } => {
                let result = migrate::migrate_bee(self, id, target).await;
                let _ = reply.send(result);
            }
            QueenCommand::ReplaceBee {
                old,
                new,
                snapshot,
                cells,
                reply,
            } => {
                let result = migrate::replace_bee(self, old, new, snapshot, cells).await;
                let _ = reply.send(result);
            }
            QueenCommand::LockMappedCells { cells, owner, reply } => {
                let result = routing::lock(self, &cells, owner, true).await;
                if let Ok(owner) = result {
                    routing::lock_locally(self, owner, &cells);
                }
                let _ = reply.send(result);
            }
            QueenCommand::StartDetached { seed, reply } => {
                let id = self.id_alloc.alloc(self.hive.id(), self.hive.app().name());
                let bee = self.spawn_local_bee(id, crate::cell::MappedCells::empty(), crate::colony::Colony::new(id));
                let _ = bee.enqueue_message(seed);
                let _ = reply.send(Ok(id));
            }
        }
        false
    }

    fn spawn_local_bee(
        &mut self,
        id: BeeId,
        cells: crate::cell::MappedCells,
        colony: crate::colony::Colony,
    ) -> Bee<A> {
        let (shutdown_tx, shutdown_rx) = shutdown_chan();
        let handle = crate::bee::local::spawn_local(id, self.hive.clone(), cells, colony, shutdown_rx);
        self.bee_shutdowns.push(shutdown_tx);
        let bee = Bee::Local(handle);
        self.by_id.insert(id, bee.clone());
        bee
    }

    async fn handle_remote_rpc(&mut self, req: RemoteRequest) {
        use crate::transport::{RemoteCmd, RemoteReply};

        match req.cmd {
            RemoteCmd::CreateBee { .. } => {
                let id = self.id_alloc.alloc(self.hive.id(), self.hive.app().name());
                self.spawn_local_bee(id, crate::cell::MappedCells::empty(), crate::colony::Colony::new(id));
                let _ = req.reply_tx.send(Ok(RemoteReply::Bee(id)));
            }
            RemoteCmd::ReplaceBee {
                old,
                new,
                snapshot,
                cells,
            } => {
                let result = migrate::replace_bee(self, old, new, snapshot, cells).await.map(RemoteReply::Bee);
                let _ = req.reply_tx.send(result);
            }
            RemoteCmd::JoinColony { bee, colony } => {
                let result = self.forward_to_bee(bee, |reply| BeeCommand::JoinColony { colony, reply }).await;
                let _ = req.reply_tx.send(result.map(|()| RemoteReply::Ack));
            }
            RemoteCmd::GetTxInfo { bee } => {
                let result = self.forward_to_bee(bee, |reply| BeeCommand::GetTxInfo { reply }).await;
                let _ = req.reply_tx.send(result.map(RemoteReply::TxInfo));
            }
            RemoteCmd::GetTx { bee, from, to } => {
                let result = self.forward_to_bee(bee, |reply| BeeCommand::GetTx { from, to, reply }).await;
                let _ = req.reply_tx.send(result.map(RemoteReply::Txs));
            }
            RemoteCmd::BufferTx { bee, tx } => {
                let result = self.forward_to_bee(bee, |reply| BeeCommand::BufferTx { tx, reply }).await;
                let _ = req.reply_tx.send(result.map(|()| RemoteReply::Ack));
            }
            RemoteCmd::CommitTx { bee, upto } => {
                let result = self.forward_to_bee(bee, |reply| BeeCommand::CommitTx { upto, reply }).await;
                let _ = req.reply_tx.send(result.map(|()| RemoteReply::Ack));
            }
        }
    }

    /// Builds a `BeeCommand` addressed to `bee` via `build`, enqueues it,
    /// and awaits the reply.
    pub(crate) async fn forward_to_bee<V>(
        &self,
        bee: BeeId,
        build: impl FnOnce(oneshot::Sender<Result<V>>) -> BeeCommand,
    ) -> Result<V> {
        let handle = self
            .by_id
            .get(&bee)
            .ok_or_else(|| Error::NotFound(format!("bee {} not known to this hive", bee)))?;
        let (reply, rx) = oneshot::channel();
        handle.enqueue_command(build(reply))?;
        rx.await.map_err(|_| Error::Unreachable {
            bee,
            reason: "bee dropped the reply".into(),
        })?
    }
}
