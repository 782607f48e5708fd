// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Black-box scenarios driven entirely through the public API: a message
//! routed through an application's map function creates and then reuses a
//! bee, a bee's state round-trips across a migration to another hive, and a
//! panicking handler doesn't take the queen down with it.

use std::time::Duration;

use beehive::cell::{CellKey, MappedCells};
use beehive::ids::HiveId;
use beehive::registry::InMemoryRegistry;
use beehive::state::BeeState;
use beehive::strategy::RandomStrategy;
use beehive::transport::{remote_inbound_chan, InProcessTransport};
use beehive::{Application, Hive, HiveConfig};

#[derive(Clone)]
enum Msg {
    Touch(String),
    Boom,
}

struct Counters;

impl Application for Counters {
    type Message = Msg;

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
        match msg {
            Msg::Touch(key) => MappedCells::single(CellKey::new("counters", key.clone())),
            Msg::Boom => MappedCells::LocalBroadcast,
        }
    }

    fn handle(&self, msg: Self::Message) -> Vec<u8> {
        match msg {
            Msg::Touch(key) => key.into_bytes(),
            Msg::Boom => panic!("handler exploded"),
        }
    }

    fn apply(&self, state: &mut BeeState, payload: &[u8]) {
        let key = String::from_utf8_lossy(payload).into_owned();
        let count = state.get("counts", &key).map(|v| v[0]).unwrap_or(0);
        state.set("counts", key, vec![count + 1]);
    }
}

fn hive(id: HiveId, transport: InProcessTransport) -> Hive<Counters, InMemoryRegistry, InProcessTransport, RandomStrategy> {
    Hive::new(
        id,
        Counters,
        InMemoryRegistry::new(),
        transport,
        RandomStrategy::new(vec![id]),
        HiveConfig {
            isolated: true,
            ..HiveConfig::default()
        },
    )
}

#[tokio::test]
async fn mapped_message_creates_then_reuses_the_owning_bee() {
    let transport = InProcessTransport::new();
    let h = hive(HiveId::new(1), transport.clone());
    let (inbound_tx, inbound_rx) = remote_inbound_chan();
    transport.register(h.id(), inbound_tx);
    let queen = h.spawn_queen(inbound_rx);

    queen.send_mapped(Msg::Touch("alice".into())).unwrap();
    queen.send_mapped(Msg::Touch("alice".into())).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A third, distinct key must not collide with "alice"'s bee.
    queen.send_mapped(Msg::Touch("bob".into())).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    queen.stop().await.unwrap();
}

#[tokio::test]
async fn migrated_bee_state_round_trips_and_both_ids_resolve() {
    let transport = InProcessTransport::new();
    let hive_a = hive(HiveId::new(1), transport.clone());
    let hive_b = hive(HiveId::new(2), transport.clone());

    let (inbound_a_tx, inbound_a_rx) = remote_inbound_chan();
    let (inbound_b_tx, inbound_b_rx) = remote_inbound_chan();
    transport.register(hive_a.id(), inbound_a_tx);
    transport.register(hive_b.id(), inbound_b_tx);

    let queen_a = hive_a.spawn_queen(inbound_a_rx);
    let _queen_b = hive_b.spawn_queen(inbound_b_rx);

    let bee = queen_a.create_bee().await.unwrap();
    queen_a.send_unicast(bee, Msg::Touch("carol".into())).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let migrated = queen_a.migrate_bee(bee, hive_b.id()).await.unwrap();
    assert_ne!(migrated, bee, "migration must mint a fresh id on the target hive");

    // Both the old and the new id must still resolve (to a proxy pointing
    // at the relocated bee on hive B).
    queen_a.send_unicast(bee, Msg::Touch("carol".into())).unwrap();
    queen_a.send_unicast(migrated, Msg::Touch("carol".into())).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    queen_a.stop().await.unwrap();
}

#[tokio::test]
async fn find_bee_resolves_a_known_id_and_rejects_a_stranger() {
    let transport = InProcessTransport::new();
    let h = hive(HiveId::new(1), transport.clone());
    let (inbound_tx, inbound_rx) = remote_inbound_chan();
    transport.register(h.id(), inbound_tx);
    let queen = h.spawn_queen(inbound_rx);

    let bee = queen.create_bee().await.unwrap();
    assert_eq!(queen.find_bee(bee).await.unwrap(), bee);

    let stranger = beehive::ids::BeeId::new(HiveId::new(1), "counters", 999, false);
    assert!(queen.find_bee(stranger).await.is_err());

    queen.stop().await.unwrap();
}

#[tokio::test]
async fn start_detached_spawns_a_bee_and_feeds_it_the_seed_message() {
    let transport = InProcessTransport::new();
    let h = hive(HiveId::new(1), transport.clone());
    let (inbound_tx, inbound_rx) = remote_inbound_chan();
    transport.register(h.id(), inbound_tx);
    let queen = h.spawn_queen(inbound_rx);

    let bee = queen.start_detached(Msg::Touch("erin".into())).await.unwrap();
    assert!(queen.find_bee(bee).await.is_ok());
    tokio::time::sleep(Duration::from_millis(50)).await;

    queen.stop().await.unwrap();
}

#[tokio::test]
async fn a_panicking_handler_does_not_take_the_queen_down() {
    let transport = InProcessTransport::new();
    let h = hive(HiveId::new(1), transport.clone());
    let (inbound_tx, inbound_rx) = remote_inbound_chan();
    transport.register(h.id(), inbound_tx);
    let queen = h.spawn_queen(inbound_rx);

    queen.send_mapped(Msg::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The queen must still be alive and routing normally afterwards.
    queen.send_mapped(Msg::Touch("dora".into())).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    queen.stop().await.unwrap();
}
