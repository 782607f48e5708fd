// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A distributed actor runtime.
//!
//! An [`Application`] maps each message to the cells of state it touches;
//! a [`Hive`] spawns one per-application [`Queen`](queen) per process, and
//! the queen routes messages to the [`bee`] that owns those cells,
//! spawning it on demand and consulting the [`Registry`] when ownership
//! is unknown. Each bee replicates its committed transaction log to a
//! [`Colony`] of slave bees and fails over via compare-and-set against
//! the registry when a colony peer disappears.
//!
//! ## Example
//!
//! ```no_run
//! use beehive::{Application, Hive, HiveConfig};
//! use beehive::cell::{CellKey, MappedCells};
//! use beehive::ids::HiveId;
//! use beehive::registry::InMemoryRegistry;
//! use beehive::strategy::RandomStrategy;
//! use beehive::state::BeeState;
//! use beehive::transport::InProcessTransport;
//!
//! #[derive(Clone)]
//! struct Increment(String);
//!
//! struct Counters;
//!
//! impl Application for Counters {
//!     type Message = Increment;
//!
//!     fn name(&self) -> &'static str {
//!         "counters"
//!     }
//!
//!     fn replication_factor(&self) -> usize {
//!         3
//!     }
//!
//!     fn commit_threshold(&self) -> usize {
//!         1
//!     }
//!
//!     fn map(&self, msg: &Self::Message) -> MappedCells {
//!         MappedCells::single(CellKey::new("counters", msg.0.clone()))
//!     }
//!
//!     fn handle(&self, msg: Self::Message) -> Vec<u8> {
//!         msg.0.into_bytes()
//!     }
//!
//!     fn apply(&self, state: &mut BeeState, payload: &[u8]) {
//!         let key = String::from_utf8_lossy(payload).into_owned();
//!         let count = state.get("counts", &key).map(|v| v[0]).unwrap_or(0);
//!         state.set("counts", key, vec![count + 1]);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let hive = Hive::new(
//!         HiveId::new(1),
//!         Counters,
//!         InMemoryRegistry::new(),
//!         InProcessTransport::new(),
//!         RandomStrategy::new(vec![HiveId::new(1)]),
//!         HiveConfig::default(),
//!     );
//!     let _ = hive;
//! }
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

mod app;
mod bee;
pub mod cell;
mod colony;
mod command;
pub mod config;
mod delay;
pub mod error;
mod hive;
pub mod ids;
mod queen;
pub mod registry;
pub mod state;
pub mod strategy;
mod task;
#[cfg(test)]
pub(crate) mod testutil;
pub mod transport;
mod tx;
mod replication;

pub use app::Application;
pub use error::{Error, Result};
pub use hive::Hive;
pub use config::HiveConfig;
pub use queen::QueenHandle;
