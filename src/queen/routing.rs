// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Message routing: unicast delivery and map-function-addressed delivery,
//! plus the `lock`/`lockLocally` ownership primitives shared with
//! migration.

use crate::app::{catch_panic, Application};
use crate::bee::{proxy::spawn_proxy, Bee, BeeHandle};
use crate::cell::MappedCells;
use crate::colony::Colony;
use crate::error::{Error, Result};
use crate::ids::BeeId;
use crate::queen::{Queen, RoutedMessage};
use crate::registry::Registry;
use crate::strategy::ReplicationStrategy;
use crate::task::shutdown_chan;
use crate::transport::RemoteHiveTransport;

pub(crate) async fn route_message<A, R, T, S>(queen: &mut Queen<A, R, T, S>, routed: RoutedMessage<A::Message>)
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    match routed {
        RoutedMessage::Unicast(target, msg) => route_unicast(queen, target, msg),
        RoutedMessage::Mapped(msg) => route_mapped(queen, msg).await,
    }
}

fn route_unicast<A, R, T, S>(queen: &mut Queen<A, R, T, S>, target: BeeId, msg: A::Message)
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    if let Some(bee) = queen.by_id.get(&target) {
        if let Err(err) = bee.enqueue_message(msg) {
            log::warn!("Could not deliver a unicast message to {}: {}.", target, err);
        }
        return;
    }

    if target.is_local_to(queen.hive.id()) {
        let err = Error::InvariantViolation(format!("local bee {} is missing from the queen's index", target));
        log::error!("{}", err);
        panic!("{}", err);
    }

    let (shutdown_tx, shutdown_rx) = shutdown_chan();
    let proxy = spawn_proxy(target, target, target.hive_id, queen.hive.clone(), shutdown_rx);
    queen.bee_shutdowns.push(shutdown_tx);
    if let Err(err) = proxy.enqueue_message(msg) {
        log::warn!("Could not deliver a unicast message to new proxy {}: {}.", target, err);
    }
    queen.by_id.insert(target, Bee::Proxy(proxy));
}

async fn route_mapped<A, R, T, S>(queen: &mut Queen<A, R, T, S>, msg: A::Message)
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    let app = queen.hive.app().clone();
    let cells = match catch_panic(|| app.map(&msg)) {
        Ok(cells) => cells,
        Err(err) => {
            log::warn!("Dropped a message: {}.", err);
            return;
        }
    };

    if cells.is_broadcast() {
        for bee in queen.by_id.values() {
            if let Err(err) = bee.enqueue_message(msg.clone()) {
                log::warn!("Broadcast delivery to {} failed: {}.", bee.id(), err);
            }
        }
        return;
    }

    let cell_set = cells.cells().expect("non-broadcast MappedCells always carries cells").clone();

    let mut found_owner = None;
    for cell in &cell_set {
        if let Some(&id) = queen.by_cell.get(cell) {
            found_owner = Some(id);
            break;
        }
    }

    let owner_id = match found_owner {
        Some(id) => id,
        None => {
            let speculative = queen.id_alloc.alloc(queen.hive.id(), app.name());
            let colony = queen.hive.registry().store_or_get(&cells, Colony::new(speculative));
            if colony.master == speculative {
                queen.spawn_local_bee(speculative, cells.clone(), colony.clone());
            } else {
                queen.id_alloc.release(speculative);
            }
            colony.master
        }
    };

    if !queen.by_id.contains_key(&owner_id) {
        if owner_id.is_local_to(queen.hive.id()) {
            let err = Error::InvariantViolation(format!("local bee {} is missing from the queen's index", owner_id));
            log::error!("{}", err);
            panic!("{}", err);
        }
        let (shutdown_tx, shutdown_rx) = shutdown_chan();
        let proxy = spawn_proxy(owner_id, owner_id, owner_id.hive_id, queen.hive.clone(), shutdown_rx);
        queen.bee_shutdowns.push(shutdown_tx);
        queen.by_id.insert(owner_id, Bee::Proxy(proxy));
    }

    for cell in &cell_set {
        match queen.by_cell.get(cell) {
            Some(&existing) if existing != owner_id => {
                let err = Error::InvariantViolation(format!("cell {} is claimed by both {} and {}", cell, existing, owner_id));
                log::error!("{}", err);
                panic!("{}", err);
            }
            Some(_) => {}
            None => {
                queen.by_cell.insert(cell.clone(), owner_id);
            }
        }
    }

    if let Some(bee) = queen.by_id.get(&owner_id) {
        if let Err(err) = bee.enqueue_message(msg) {
            log::warn!("Delivery to {} failed: {}.", owner_id, err);
        }
    }
}

/// `lock(cells, bee, force)`: in isolated mode, a no-op that returns `bee`
/// unchanged. Otherwise `force` takes unconditional ownership via
/// `registry.set`; without it, `storeOrGet` yields the cells' current
/// owner (possibly pre-existing).
pub(crate) async fn lock<A, R, T, S>(
    queen: &Queen<A, R, T, S>,
    cells: &MappedCells,
    bee: BeeId,
    force: bool,
) -> Result<BeeId>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    if queen.hive.config().isolated {
        return Ok(bee);
    }
    if force {
        queen.hive.registry().set(cells, Colony::new(bee));
        Ok(bee)
    } else {
        let colony = queen.hive.registry().store_or_get(cells, Colony::new(bee));
        Ok(colony.master)
    }
}

/// `lockLocally`: installs `byCell` entries for every cell in `cells`,
/// pointing at `owner`. The queen's authoritative local view.
pub(crate) fn lock_locally<A, R, T, S>(queen: &mut Queen<A, R, T, S>, owner: BeeId, cells: &MappedCells)
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    if let Some(cell_set) = cells.cells() {
        for cell in cell_set {
            queen.by_cell.insert(cell.clone(), owner);
        }
    }
}
