// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Relocating a bee to another hive: stop the source, transfer its state,
//! and leave a forwarding proxy behind under both the old and new ids.

use tokio::sync::oneshot;

use crate::app::Application;
use crate::bee::{Bee, BeeCommand};
use crate::cell::{CellKey, MappedCells};
use crate::error::{Error, Result};
use crate::ids::{BeeId, HiveId};
use crate::queen::{routing, Queen};
use crate::registry::Registry;
use crate::state::{DictName, Key, Value};
use crate::strategy::ReplicationStrategy;
use crate::task::shutdown_chan;
use crate::transport::{RemoteCmd, RemoteHiveTransport, RemoteReply};

pub(crate) async fn migrate_bee<A, R, T, S>(
    queen: &mut Queen<A, R, T, S>,
    id: BeeId,
    target: HiveId,
) -> Result<BeeId>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    match queen.by_id.get(&id) {
        Some(Bee::Local(_)) => {}
        Some(Bee::Detached(_)) => {
            return Err(Error::NotFound(format!("bee {} is detached and cannot be migrated", id)))
        }
        Some(Bee::Proxy(_)) => {
            return Err(Error::NotFound(format!("bee {} is not local to this hive", id)))
        }
        None => return Err(Error::NotFound(format!("bee {} not known to this hive", id))),
    }

    let new_id = match queen
        .hive
        .transport()
        .send_cmd(target, RemoteCmd::CreateBee { app: queen.hive.app().name() })
        .await?
    {
        RemoteReply::Bee(id) => id,
        _ => return Err(Error::Unreachable { bee: id, reason: "unexpected reply to CreateBee".into() }),
    };

    let snapshot = queen.forward_to_bee(id, |reply| BeeCommand::GetSnapshot { reply }).await?;

    let (stop_tx, stop_rx) = oneshot::channel();
    queen
        .by_id
        .get(&id)
        .ok_or_else(|| Error::NotFound(format!("bee {} not known to this hive", id)))?
        .enqueue_command(BeeCommand::Stop { reply: stop_tx })?;
    let _ = stop_rx.await;

    let cells = cells_owned_by(queen, id);

    match queen
        .hive
        .transport()
        .send_cmd(
            target,
            RemoteCmd::ReplaceBee {
                old: id,
                new: new_id,
                snapshot,
                cells: cells.clone(),
            },
        )
        .await?
    {
        RemoteReply::Bee(confirmed) if confirmed == new_id => {}
        _ => return Err(Error::Unreachable { bee: id, reason: "unexpected reply to ReplaceBee".into() }),
    }

    let (shutdown_tx, shutdown_rx) = shutdown_chan();
    let proxy = crate::bee::proxy::spawn_proxy(id, new_id, target, queen.hive.clone(), shutdown_rx);
    queen.bee_shutdowns.push(shutdown_tx);
    let proxy_bee = Bee::Proxy(proxy);
    queen.by_id.insert(id, proxy_bee.clone());
    queen.by_id.insert(new_id, proxy_bee);

    if let Some(cell_set) = cells.cells() {
        for cell in cell_set {
            queen.by_cell.insert(cell.clone(), new_id);
        }
    }

    Ok(new_id)
}

/// Accepts a migrated bee's state on the target hive: restores it into the
/// already-created local bee `new`, then takes registry ownership of
/// `cells` and installs the local index entries.
pub(crate) async fn replace_bee<A, R, T, S>(
    queen: &mut Queen<A, R, T, S>,
    old: BeeId,
    new: BeeId,
    snapshot: Vec<(DictName, Key, Value)>,
    cells: MappedCells,
) -> Result<BeeId>
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    log::info!("Accepting migrated bee {} as {}.", old, new);

    queen.forward_to_bee(new, |reply| BeeCommand::Restore { snapshot, reply }).await?;

    let owner = routing::lock(queen, &cells, new, true).await?;
    routing::lock_locally(queen, owner, &cells);

    Ok(new)
}

fn cells_owned_by<A, R, T, S>(queen: &Queen<A, R, T, S>, id: BeeId) -> MappedCells
where
    A: Application,
    R: Registry + 'static,
    T: RemoteHiveTransport + 'static,
    S: ReplicationStrategy + 'static,
{
    let owned: std::collections::BTreeSet<CellKey> = queen
        .by_cell
        .iter()
        .filter(|(_, &owner)| owner == id)
        .map(|(cell, _)| cell.clone())
        .collect();
    MappedCells::of(owned)
}
