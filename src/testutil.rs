// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for unit tests scattered across the crate: a minimal
//! `Application` and a same-process hive constructor, so each test module
//! doesn't reinvent one.

use crate::app::Application;
use crate::cell::{CellKey, MappedCells};
use crate::config::HiveConfig;
use crate::hive::Hive;
use crate::ids::HiveId;
use crate::registry::InMemoryRegistry;
use crate::state::BeeState;
use crate::strategy::RandomStrategy;
use crate::transport::InProcessTransport;

#[derive(Clone)]
pub(crate) enum Msg {
    Touch(String),
}

pub(crate) struct Echo;

impl Application for Echo {
    type Message = Msg;

    fn name(&self) -> &'static str {
        "echo"
    }

    fn replication_factor(&self) -> usize {
        1
    }

    fn commit_threshold(&self) -> usize {
        1
    }

    fn map(&self, msg: &Self::Message) -> MappedCells {
        match msg {
            Msg::Touch(key) => MappedCells::single(CellKey::new("echo", key.clone())),
        }
    }

    fn handle(&self, msg: Self::Message) -> Vec<u8> {
        match msg {
            Msg::Touch(key) => key.into_bytes(),
        }
    }

    fn apply(&self, state: &mut BeeState, payload: &[u8]) {
        let key = String::from_utf8_lossy(payload).into_owned();
        state.set("touched", key, vec![1]);
    }
}

/// An isolated-mode hive sharing `transport`, with `catalog` as its
/// replication strategy's candidate pool.
pub(crate) fn test_hive(
    id: HiveId,
    catalog: Vec<HiveId>,
    transport: InProcessTransport,
) -> Hive<Echo, InMemoryRegistry, InProcessTransport, RandomStrategy> {
    Hive::new(
        id,
        Echo,
        InMemoryRegistry::new(),
        transport,
        RandomStrategy::new(catalog),
        HiveConfig {
            isolated: true,
            ..HiveConfig::default()
        },
    )
}
