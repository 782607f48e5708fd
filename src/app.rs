// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The application contract: naming, replication parameters, the map
//! function that addresses a message to cells, and the handler that turns a
//! message into a transaction payload.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::cell::MappedCells;
use crate::error::{Error, Result};
use crate::state::BeeState;

/// Provided by the embedding program; the queen and bees call through this
/// for everything application-specific.
pub trait Application: Send + Sync + 'static {
    /// Must be cheap to clone: a [`MappedCells::LocalBroadcast`] message is
    /// fanned out to every local bee.
    type Message: Send + Clone + 'static;

    fn name(&self) -> &'static str;
    fn replication_factor(&self) -> usize;
    fn commit_threshold(&self) -> usize;

    /// Resolves the cells a message addresses. Returning
    /// [`MappedCells::LocalBroadcast`] fans the message out to every local
    /// bee instead of routing to a single owner.
    fn map(&self, msg: &Self::Message) -> MappedCells;

    /// Turns a message into the payload that becomes a transaction. Runs on
    /// the owning bee's loop before the transaction is buffered.
    fn handle(&self, msg: Self::Message) -> Vec<u8>;

    /// Applies a committed transaction's payload to state. Runs on every
    /// replica that commits the transaction, so it must be deterministic.
    fn apply(&self, state: &mut BeeState, payload: &[u8]);
}

/// Invokes `f`, turning a panic into [`Error::HandlerFault`] instead of
/// unwinding into the queen or bee loop.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        Error::HandlerFault(msg)
    })
}
