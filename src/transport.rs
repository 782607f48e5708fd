// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The remote-hive RPC surface: `NewProxy(HiveID).SendCmd(RemoteCmd)`.
//!
//! Wire framing is out of scope; [`RemoteCmd`] and [`RemoteReply`] are
//! in-process Rust values, never serialized. A real deployment swaps
//! [`InProcessTransport`] for one that actually crosses the network.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::cell::MappedCells;
use crate::colony::{Colony, TxInfo};
use crate::error::{Error, Result};
use crate::ids::{BeeId, HiveId};
use crate::state::{DictName, Key, Value};
use crate::tx::Tx;

/// Commands carried across the remote-hive RPC boundary.
#[derive(Debug, Clone)]
pub enum RemoteCmd {
    CreateBee { app: &'static str },
    ReplaceBee {
        old: BeeId,
        new: BeeId,
        snapshot: Vec<(DictName, Key, Value)>,
        cells: MappedCells,
    },
    JoinColony { bee: BeeId, colony: Colony },
    GetTxInfo { bee: BeeId },
    GetTx { bee: BeeId, from: u64, to: u64 },
    BufferTx { bee: BeeId, tx: Tx },
    CommitTx { bee: BeeId, upto: u64 },
}

/// Replies to [`RemoteCmd`]s.
#[derive(Debug, Clone)]
pub enum RemoteReply {
    Bee(BeeId),
    TxInfo(TxInfo),
    Txs(Vec<Tx>),
    Ack,
}

/// A request/reply pair in flight over a transport.
pub struct RemoteRequest {
    pub cmd: RemoteCmd,
    pub reply_tx: oneshot::Sender<Result<RemoteReply>>,
}

/// `NewProxy(HiveID).SendCmd(RemoteCmd) -> (data, error)`.
#[async_trait]
pub trait RemoteHiveTransport: Send + Sync {
    async fn send_cmd(&self, hive: HiveId, cmd: RemoteCmd) -> Result<RemoteReply>;
}

type InboundTx = mpsc::UnboundedSender<RemoteRequest>;

/// An in-process stand-in transport: dispatches to other [`Queen`]s
/// registered in the same process instead of a real network socket.
///
/// [`Queen`]: crate::queen::Queen
#[derive(Clone, Default)]
pub struct InProcessTransport {
    inbound: Arc<RwLock<HashMap<HiveId, InboundTx>>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hive's inbound RPC channel. A queen calls this once at
    /// startup so that other queens' `send_cmd` calls can reach it.
    pub fn register(&self, hive: HiveId, inbound: InboundTx) {
        self.inbound.write().expect("transport lock poisoned").insert(hive, inbound);
    }

    pub fn unregister(&self, hive: HiveId) {
        self.inbound.write().expect("transport lock poisoned").remove(&hive);
    }
}

#[async_trait]
impl RemoteHiveTransport for InProcessTransport {
    async fn send_cmd(&self, hive: HiveId, cmd: RemoteCmd) -> Result<RemoteReply> {
        let inbound = self
            .inbound
            .read()
            .expect("transport lock poisoned")
            .get(&hive)
            .cloned()
            .ok_or_else(|| Error::Unreachable {
                bee: BeeId::new(hive, "", 0, false),
                reason: "hive not registered with transport".into(),
            })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        inbound
            .send(RemoteRequest { cmd, reply_tx })
            .map_err(|_| Error::Unreachable {
                bee: BeeId::new(hive, "", 0, false),
                reason: "inbound channel closed".into(),
            })?;

        reply_rx.await.map_err(|_| Error::Unreachable {
            bee: BeeId::new(hive, "", 0, false),
            reason: "reply channel dropped".into(),
        })?
    }
}

/// Creates the inbound half of an in-process transport endpoint for one
/// hive, and the sender half to hand to [`InProcessTransport::register`].
pub fn remote_inbound_chan() -> (InboundTx, mpsc::UnboundedReceiver<RemoteRequest>) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_cmd_to_an_unregistered_hive_is_unreachable() {
        let transport = InProcessTransport::new();
        let err = transport.send_cmd(HiveId::new(1), RemoteCmd::CreateBee { app: "app" }).await;
        assert!(matches!(err, Err(Error::Unreachable { .. })));
    }

    #[tokio::test]
    async fn send_cmd_round_trips_through_a_registered_inbound_channel() {
        let transport = InProcessTransport::new();
        let (tx, mut rx) = remote_inbound_chan();
        transport.register(HiveId::new(1), tx);

        let responder = tokio::spawn(async move {
            let req = rx.recv().await.expect("request delivered");
            assert!(matches!(req.cmd, RemoteCmd::CreateBee { app: "app" }));
            let _ = req.reply_tx.send(Ok(RemoteReply::Bee(BeeId::new(HiveId::new(1), "app", 0, false))));
        });

        let reply = transport.send_cmd(HiveId::new(1), RemoteCmd::CreateBee { app: "app" }).await.unwrap();
        assert!(matches!(reply, RemoteReply::Bee(_)));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn unregister_makes_a_hive_unreachable_again() {
        let transport = InProcessTransport::new();
        let (tx, _rx) = remote_inbound_chan();
        transport.register(HiveId::new(1), tx);
        transport.unregister(HiveId::new(1));

        let err = transport.send_cmd(HiveId::new(1), RemoteCmd::CreateBee { app: "app" }).await;
        assert!(matches!(err, Err(Error::Unreachable { .. })));
    }
}
