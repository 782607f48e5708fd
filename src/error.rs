// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

// Error kinds the core surfaces to callers and to its own control loops.

use crate::ids::BeeId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The registry's `compareAndSet` rejected our old view; the local bee
    /// no longer represents truth and must stop.
    #[error("stale colony view for {bee}: registry CAS rejected")]
    StaleColony { bee: BeeId },

    /// An RPC to a peer failed; the peer is treated as dead where the
    /// protocol supports continuing without it.
    #[error("peer {bee} unreachable: {reason}")]
    Unreachable { bee: BeeId, reason: String },

    /// The registry's per-colony app-lock is busy; retry after the bounded
    /// backoff in `HiveConfig::lock_timeout`.
    #[error("lock contention on app lock for {bee}")]
    LockContention { bee: BeeId },

    /// A control-plane lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Cell-owner disagreement, or a missing local bee for a local id:
    /// fatal, the hive process is expected to be restarted.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A panic inside the application's map/handler function was caught.
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// The colony is under-replicated after an otherwise successful
    /// operation (warning-level, not a hard failure).
    #[error("colony under-replicated: have {have}, need {need}")]
    UnderReplicated { have: usize, need: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
