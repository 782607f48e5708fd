// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The cluster-wide authority for `MappedCells -> Colony` bindings.
//!
//! Persistence is left to whatever `Registry` impl the embedder plugs in;
//! [`InMemoryRegistry`] is the bundled default, sufficient for a single
//! process or for tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::cell::MappedCells;
use crate::colony::Colony;
use crate::error::{Error, Result};
use crate::ids::BeeId;

/// Mandatory functionality of any registry backing store.
#[async_trait]
pub trait Registry: Clone + Send + Sync {
    /// Acquires an exclusive advisory lock on a colony's namespace.
    async fn try_lock_app(&self, bee: BeeId) -> Result<()>;
    /// Releases a previously acquired app lock. Must be safe to call even
    /// if the lock was never held by `bee` (idempotent on the release path).
    async fn unlock_app(&self, bee: BeeId) -> Result<()>;

    /// Inserts `colony` for `cells` iff absent, otherwise returns the
    /// existing owner unchanged.
    fn store_or_get(&self, cells: &MappedCells, colony: Colony) -> Colony;

    /// Unconditionally overwrites the colony bound to `cells`.
    fn set(&self, cells: &MappedCells, colony: Colony);

    /// Atomically swaps the colony descriptor for `cells` iff the current
    /// value equals `old`; otherwise returns the observed value and
    /// [`Error::StaleColony`].
    fn compare_and_set(&self, cells: &MappedCells, old: &Colony, new: Colony) -> std::result::Result<Colony, (Colony, Error)>;

    /// Looks up the cells a colony is currently bound to, if any.
    fn mapped_cells(&self, colony: &Colony) -> Option<MappedCells>;
}

#[derive(Default)]
struct Inner {
    colonies: HashMap<MappedCells, Colony>,
    locks: HashMap<BeeId, ()>,
}

/// An in-memory, single-process registry. Sufficient for isolated-mode
/// deployments and for tests; a real cluster plugs in its own `Registry`.
#[derive(Clone, Default)]
pub struct InMemoryRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("registry lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("registry lock poisoned")
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn try_lock_app(&self, bee: BeeId) -> Result<()> {
        let mut write = self.write();
        if write.locks.contains_key(&bee) {
            Err(Error::LockContention { bee })
        } else {
            write.locks.insert(bee, ());
            Ok(())
        }
    }

    async fn unlock_app(&self, bee: BeeId) -> Result<()> {
        self.write().locks.remove(&bee);
        Ok(())
    }

    fn store_or_get(&self, cells: &MappedCells, colony: Colony) -> Colony {
        let mut write = self.write();
        write.colonies.entry(cells.clone()).or_insert(colony).clone()
    }

    fn set(&self, cells: &MappedCells, colony: Colony) {
        self.write().colonies.insert(cells.clone(), colony);
    }

    fn compare_and_set(
        &self,
        cells: &MappedCells,
        old: &Colony,
        new: Colony,
    ) -> std::result::Result<Colony, (Colony, Error)> {
        let mut write = self.write();
        match write.colonies.get(cells) {
            Some(current) if current == old => {
                write.colonies.insert(cells.clone(), new.clone());
                Ok(new)
            }
            Some(current) => {
                let observed = current.clone();
                Err((
                    observed.clone(),
                    Error::StaleColony {
                        bee: observed.master,
                    },
                ))
            }
            None => Err((old.clone(), Error::NotFound("no colony registered for cells".into()))),
        }
    }

    fn mapped_cells(&self, colony: &Colony) -> Option<MappedCells> {
        self.read()
            .colonies
            .iter()
            .find(|(_, c)| c.master == colony.master)
            .map(|(cells, _)| cells.clone())
    }
}
