// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Two in-process hives running the same application, talking to each
//! other over `InProcessTransport`. One hive creates a bee and drives a
//! few messages through it, then migrates the bee to the other hive.

#![allow(warnings)]

use beehive::cell::{CellKey, MappedCells};
use beehive::ids::HiveId;
use beehive::registry::InMemoryRegistry;
use beehive::state::BeeState;
use beehive::strategy::RandomStrategy;
use beehive::transport::{remote_inbound_chan, InProcessTransport};
use beehive::{Application, Hive, HiveConfig};

use log::LevelFilter;
use std::io;

fn setup_logger(level: LevelFilter) {
    fern::Dispatch::new().level(level).chain(io::stdout()).apply().expect("fern");
}

#[derive(Clone, Debug)]
struct Ping(String);

struct Counters;

impl Application for Counters {
    type Message = Ping;

    fn name(&self) -> &'static str {
        "counters"
    }

    fn replication_factor(&self) -> usize {
        1
    }

    fn commit_threshold(&self) -> usize {
        1
    }

    fn map(&self, msg: &Self::Message) -> MappedCells {
        MappedCells::single(CellKey::new("counters", msg.0.clone()))
    }

    fn handle(&self, msg: Self::Message) -> Vec<u8> {
        msg.0.into_bytes()
    }

    fn apply(&self, state: &mut BeeState, payload: &[u8]) {
        let key = String::from_utf8_lossy(payload).into_owned();
        let count = state.get("counts", &key).map(|v| v[0]).unwrap_or(0);
        state.set("counts", key, vec![count + 1]);
    }
}

#[tokio::main]
async fn main() {
    setup_logger(LevelFilter::Info);

    let transport = InProcessTransport::new();
    let catalog = vec![HiveId::new(1), HiveId::new(2)];
    let config = HiveConfig::default();

    let hive_a = Hive::new(
        HiveId::new(1),
        Counters,
        InMemoryRegistry::new(),
        transport.clone(),
        RandomStrategy::new(catalog.clone()),
        config.clone(),
    );
    let hive_b = Hive::new(
        HiveId::new(2),
        Counters,
        InMemoryRegistry::new(),
        transport.clone(),
        RandomStrategy::new(catalog),
        config,
    );

    let (inbound_a_tx, inbound_a_rx) = remote_inbound_chan();
    transport.register(hive_a.id(), inbound_a_tx);
    let queen_a = hive_a.spawn_queen(inbound_a_rx);

    let (inbound_b_tx, inbound_b_rx) = remote_inbound_chan();
    transport.register(hive_b.id(), inbound_b_tx);
    let _queen_b = hive_b.spawn_queen(inbound_b_rx);

    queen_a.send_mapped(Ping("alice".into())).expect("hive A queen is running");
    queen_a.send_mapped(Ping("alice".into())).expect("hive A queen is running");

    let bee_id = queen_a.create_bee().await.expect("create a detached bee");
    log::info!("Created bee {}.", bee_id);

    let migrated = queen_a
        .migrate_bee(bee_id, hive_b.id())
        .await
        .expect("migrate the bee to hive B");
    log::info!("Bee {} migrated to {} as {}.", bee_id, hive_b.id(), migrated);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    queen_a.stop().await.expect("graceful shutdown of hive A's queen");
}
