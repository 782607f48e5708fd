// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A bee's capability set — enqueue message, enqueue command, id, start —
//! and the tagged sum of its three variants.

pub(crate) mod local;
pub(crate) mod proxy;

use tokio::sync::oneshot;

use crate::app::Application;
use crate::colony::{Colony, TxInfo};
use crate::error::Result;
use crate::ids::BeeId;
use crate::state::{DictName, Key, Value};
use crate::tx::Tx;

pub(crate) use local::LocalBee;
pub(crate) use proxy::ProxyBee;

/// A message or command delivered to a bee's own channel.
pub(crate) enum Envelope<M> {
    Data(M),
    Ctrl(BeeCommand),
}

/// Commands a bee itself understands, as opposed to the queen-level
/// commands in [`crate::command::QueenCommand`].
pub(crate) enum BeeCommand {
    Stop {
        reply: oneshot::Sender<()>,
    },
    JoinColony {
        colony: Colony,
        reply: oneshot::Sender<Result<()>>,
    },
    GetTxInfo {
        reply: oneshot::Sender<Result<TxInfo>>,
    },
    GetTx {
        from: u64,
        to: u64,
        reply: oneshot::Sender<Result<Vec<Tx>>>,
    },
    BufferTx {
        tx: Tx,
        reply: oneshot::Sender<Result<()>>,
    },
    CommitTx {
        upto: u64,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Notifies the receiver that a colony peer has failed; triggers the
    /// failure handler. Fire-and-forget, no reply.
    BeeFailed {
        failed: BeeId,
    },
    /// Flattens this bee's state for transfer ahead of a migration.
    GetSnapshot {
        reply: oneshot::Sender<Result<Vec<(DictName, Key, Value)>>>,
    },
    /// Overwrites this bee's state from a migration snapshot and makes it
    /// master of its own (initially slave-less) colony.
    Restore {
        snapshot: Vec<(DictName, Key, Value)>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// The small interface every bee variant implements; avoids routing
/// through a virtual dispatch chain by keeping the sum closed to three
/// known shapes.
pub(crate) trait BeeHandle<A: Application>: Send + Sync {
    fn id(&self) -> BeeId;
    fn enqueue_message(&self, msg: A::Message) -> Result<()>;
    fn enqueue_command(&self, cmd: BeeCommand) -> Result<()>;
}

/// A bee as known to the queen's indices: local, a forwarding proxy to a
/// remote bee, or a detached bee driven outside the cell-routing path.
pub(crate) enum Bee<A: Application> {
    Local(LocalBee<A>),
    Proxy(ProxyBee<A>),
    Detached(LocalBee<A>),
}

impl<A: Application> Clone for Bee<A> {
    fn clone(&self) -> Self {
        match self {
            Bee::Local(h) => Bee::Local(h.clone()),
            Bee::Proxy(h) => Bee::Proxy(h.clone()),
            Bee::Detached(h) => Bee::Detached(h.clone()),
        }
    }
}

impl<A: Application> Bee<A> {
    pub fn id(&self) -> BeeId {
        match self {
            Bee::Local(h) => h.id(),
            Bee::Proxy(h) => h.id(),
            Bee::Detached(h) => h.id(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Bee::Local(_) | Bee::Detached(_))
    }

    pub fn enqueue_message(&self, msg: A::Message) -> Result<()> {
        match self {
            Bee::Local(h) => h.enqueue_message(msg),
            Bee::Proxy(h) => h.enqueue_message(msg),
            Bee::Detached(h) => h.enqueue_message(msg),
        }
    }

    pub fn enqueue_command(&self, cmd: BeeCommand) -> Result<()> {
        match self {
            Bee::Local(h) => h.enqueue_command(cmd),
            Bee::Proxy(h) => h.enqueue_command(cmd),
            Bee::Detached(h) => h.enqueue_command(cmd),
        }
    }
}
