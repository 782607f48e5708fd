// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A proxy bee: a local stand-in that forwards messages and commands to a
//! bee living on another hive.

use tokio::sync::mpsc;

use crate::app::Application;
use crate::bee::{BeeCommand, BeeHandle, Envelope};
use crate::error::{Error, Result};
use crate::hive::Hive;
use crate::ids::{BeeId, HiveId};
use crate::registry::Registry;
use crate::strategy::ReplicationStrategy;
use crate::task::{Runnable, ShutdownRx, Spawner};
use crate::transport::{RemoteCmd, RemoteHiveTransport};

type EnvelopeTx<A> = mpsc::UnboundedSender<Envelope<<A as Application>::Message>>;
type EnvelopeRx<A> = mpsc::UnboundedReceiver<Envelope<<A as Application>::Message>>;

pub(crate) struct ProxyBee<A: Application> {
    id: BeeId,
    tx: EnvelopeTx<A>,
}

impl<A: Application> Clone for ProxyBee<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
        }
    }
}

impl<A: Application> BeeHandle<A> for ProxyBee<A> {
    fn id(&self) -> BeeId {
        self.id
    }

    fn enqueue_message(&self, msg: A::Message) -> Result<()> {
        self.tx.send(Envelope::Data(msg)).map_err(|_| Error::Unreachable {
            bee: self.id,
            reason: "proxy bee channel closed".into(),
        })
    }

    fn enqueue_command(&self, cmd: BeeCommand) -> Result<()> {
        self.tx.send(Envelope::Ctrl(cmd)).map_err(|_| Error::Unreachable {
            bee: self.id,
            reason: "proxy bee channel closed".into(),
        })
    }
}

/// Spawns a proxy's forwarding loop and returns the handle to install in
/// the queen's indices under both the old local id and the new remote id.
pub(crate) fn spawn_proxy<A, R, T, S>(
    local_id: BeeId,
    remote: BeeId,
    remote_hive: HiveId,
    hive: Hive<A, R, T, S>,
    shutdown_rx: ShutdownRx,
) -> ProxyBee<A>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = ProxyWorker {
        local_id,
        remote,
        remote_hive,
        hive,
        rx,
    };
    Spawner::spawn_runnable(worker, shutdown_rx);
    ProxyBee { id: local_id, tx }
}

struct ProxyWorker<A, R, T, S>
where
    A: Application,
    R: Registry,
    T: RemoteHiveTransport,
    S: ReplicationStrategy,
{
    local_id: BeeId,
    remote: BeeId,
    remote_hive: HiveId,
    hive: Hive<A, R, T, S>,
    rx: EnvelopeRx<A>,
}

#[async_trait::async_trait]
impl<A, R, T, S> Runnable for ProxyWorker<A, R, T, S>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    const NAME: &'static str = "proxy-bee";

    async fn run(mut self, mut shutdown_rx: ShutdownRx) {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => return,
                envelope = self.rx.recv() => match envelope {
                    Some(Envelope::Data(_msg)) => {
                        // Forwarding a data message requires re-running the
                        // application's map on the remote hive, which owns
                        // a `RemoteCmd` variant outside this crate's wire
                        // surface. Commands still forward transparently.
                        log::warn!(
                            "Proxy {} cannot forward a data message to {}: no wire encoding configured.",
                            self.local_id,
                            self.remote
                        );
                    }
                    Some(Envelope::Ctrl(BeeCommand::Stop { reply })) => {
                        let _ = reply.send(());
                        return;
                    }
                    Some(Envelope::Ctrl(BeeCommand::JoinColony { colony, reply })) => {
                        let result = self
                            .hive
                            .transport()
                            .send_cmd(self.remote_hive, RemoteCmd::JoinColony { bee: self.remote, colony })
                            .await
                            .map(|_| ());
                        let _ = reply.send(result);
                    }
                    Some(Envelope::Ctrl(BeeCommand::GetTxInfo { reply })) => {
                        let result = self
                            .hive
                            .transport()
                            .send_cmd(self.remote_hive, RemoteCmd::GetTxInfo { bee: self.remote })
                            .await
                            .and_then(|r| match r {
                                crate::transport::RemoteReply::TxInfo(info) => Ok(info),
                                _ => Err(Error::Unreachable { bee: self.remote, reason: "unexpected reply".into() }),
                            });
                        let _ = reply.send(result);
                    }
                    Some(Envelope::Ctrl(BeeCommand::GetTx { from, to, reply })) => {
                        let result = self
                            .hive
                            .transport()
                            .send_cmd(self.remote_hive, RemoteCmd::GetTx { bee: self.remote, from, to })
                            .await
                            .and_then(|r| match r {
                                crate::transport::RemoteReply::Txs(txs) => Ok(txs),
                                _ => Err(Error::Unreachable { bee: self.remote, reason: "unexpected reply".into() }),
                            });
                        let _ = reply.send(result);
                    }
                    Some(Envelope::Ctrl(BeeCommand::BufferTx { tx, reply })) => {
                        let result = self
                            .hive
                            .transport()
                            .send_cmd(self.remote_hive, RemoteCmd::BufferTx { bee: self.remote, tx })
                            .await
                            .map(|_| ());
                        let _ = reply.send(result);
                    }
                    Some(Envelope::Ctrl(BeeCommand::CommitTx { upto, reply })) => {
                        let result = self
                            .hive
                            .transport()
                            .send_cmd(self.remote_hive, RemoteCmd::CommitTx { bee: self.remote, upto })
                            .await
                            .map(|_| ());
                        let _ = reply.send(result);
                    }
                    Some(Envelope::Ctrl(BeeCommand::BeeFailed { failed })) => {
                        log::debug!(
                            "Proxy {} ignoring failure notification for {}: failure handling runs on the real bee.",
                            self.local_id,
                            failed
                        );
                    }
                    Some(Envelope::Ctrl(BeeCommand::GetSnapshot { reply })) => {
                        log::warn!(
                            "Proxy {} dropping GetSnapshot: migration commands are local-only.",
                            self.local_id
                        );
                        let _ = reply.send(Err(Error::Unreachable {
                            bee: self.remote,
                            reason: "migration commands cannot be forwarded through a proxy".into(),
                        }));
                    }
                    Some(Envelope::Ctrl(BeeCommand::Restore { reply, .. })) => {
                        log::warn!(
                            "Proxy {} dropping Restore: migration commands are local-only.",
                            self.local_id
                        );
                        let _ = reply.send(Err(Error::Unreachable {
                            bee: self.remote,
                            reason: "migration commands cannot be forwarded through a proxy".into(),
                        }));
                    }
                    None => return,
                }
            }
        }
    }
}
