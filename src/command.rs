// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Control commands accepted on a queen's control channel.

use tokio::sync::{mpsc, oneshot};

use crate::app::Application;
use crate::cell::MappedCells;
use crate::error::Result;
use crate::ids::{BeeId, HiveId};
use crate::state::{DictName, Key, Value};

/// A control command plus the channel its result is reported back on.
pub(crate) enum QueenCommand<A: Application> {
    /// Send `Stop` to every local bee, await each ack, then close both
    /// channels.
    Stop { reply: oneshot::Sender<()> },
    /// Index lookup by id.
    FindBee {
        id: BeeId,
        reply: oneshot::Sender<Result<BeeId>>,
    },
    /// Allocate the next id, instantiate and start a local bee.
    CreateBee { reply: oneshot::Sender<Result<BeeId>> },
    /// Relocate a local bee to another hive.
    MigrateBee {
        id: BeeId,
        target: HiveId,
        reply: oneshot::Sender<Result<BeeId>>,
    },
    /// Accept a migrated bee's state and take over its cells.
    ReplaceBee {
        old: BeeId,
        new: BeeId,
        snapshot: Vec<(DictName, Key, Value)>,
        cells: MappedCells,
        reply: oneshot::Sender<Result<BeeId>>,
    },
    /// Force-set registry ownership of cells to a bee and install local
    /// index entries.
    LockMappedCells {
        cells: MappedCells,
        owner: BeeId,
        reply: oneshot::Sender<Result<BeeId>>,
    },
    /// Create a detached bee driven by the given message, not bound to any
    /// cell.
    StartDetached {
        seed: A::Message,
        reply: oneshot::Sender<Result<BeeId>>,
    },
}

pub(crate) type CommandRx<A> = mpsc::UnboundedReceiver<QueenCommand<A>>;
pub(crate) type CommandTx<A> = mpsc::UnboundedSender<QueenCommand<A>>;

pub(crate) fn command_chan<A: Application>() -> (CommandTx<A>, CommandRx<A>) {
    mpsc::unbounded_channel()
}
