// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

// A bee's in-memory state: a set of named dictionaries. Mutated only by the
// owning local bee during transaction application.

use std::collections::HashMap;

pub use crate::cell::{DictName, Key};

/// Opaque application value, stored and transferred as bytes.
pub type Value = Vec<u8>;

/// A set of named dictionaries mapping `Key -> Value`.
#[derive(Clone, Default, Debug)]
pub struct BeeState {
    dicts: HashMap<DictName, HashMap<Key, Value>>,
}

impl BeeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dict: &str, key: &str) -> Option<&Value> {
        self.dicts.get(dict).and_then(|d| d.get(key))
    }

    pub fn set(&mut self, dict: impl Into<DictName>, key: impl Into<Key>, value: Value) {
        self.dicts.entry(dict.into()).or_default().insert(key.into(), value);
    }

    pub fn remove(&mut self, dict: &str, key: &str) -> Option<Value> {
        self.dicts.get_mut(dict).and_then(|d| d.remove(key))
    }

    /// Flattens the state into `(dict, key, value)` triples, for snapshotting
    /// a bee's state ahead of a migration.
    pub fn snapshot(&self) -> Vec<(DictName, Key, Value)> {
        let mut out = Vec::new();
        for (dict, kvs) in &self.dicts {
            for (key, value) in kvs {
                out.push((dict.clone(), key.clone(), value.clone()));
            }
        }
        out
    }

    /// Restores state from a snapshot produced by [`BeeState::snapshot`],
    /// used on the migration target when a bee is replaced in place.
    pub fn restore(snapshot: Vec<(DictName, Key, Value)>) -> Self {
        let mut state = Self::new();
        for (dict, key, value) in snapshot {
            state.set(dict, key, value);
        }
        state
    }
}
