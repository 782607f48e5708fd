// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The per-process, per-application singleton: registry, transport,
//! replication strategy and config, passed around as explicit context
//! rather than reached for as ambient state.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::app::Application;
use crate::config::HiveConfig;
use crate::ids::HiveId;
use crate::queen::QueenHandle;
use crate::registry::Registry;
use crate::strategy::ReplicationStrategy;
use crate::transport::{RemoteHiveTransport, RemoteRequest};

struct HiveInner<A, R, T, S> {
    id: HiveId,
    app: Arc<A>,
    registry: R,
    transport: T,
    strategy: S,
    config: HiveConfig,
}

/// Cheap to clone; every bee and every queen task holds one.
pub struct Hive<A, R, T, S>
where
    A: Application,
    R: Registry,
    T: RemoteHiveTransport,
    S: ReplicationStrategy,
{
    inner: Arc<HiveInner<A, R, T, S>>,
}

impl<A, R, T, S> Clone for Hive<A, R, T, S>
where
    A: Application,
    R: Registry,
    T: RemoteHiveTransport,
    S: ReplicationStrategy,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, R, T, S> Hive<A, R, T, S>
where
    A: Application,
    R: Registry,
    T: RemoteHiveTransport,
    S: ReplicationStrategy,
{
    pub fn new(id: HiveId, app: A, registry: R, transport: T, strategy: S, config: HiveConfig) -> Self {
        Self {
            inner: Arc::new(HiveInner {
                id,
                app: Arc::new(app),
                registry,
                transport,
                strategy,
                config,
            }),
        }
    }

    pub fn id(&self) -> HiveId {
        self.inner.id
    }

    pub fn app(&self) -> &Arc<A> {
        &self.inner.app
    }

    pub fn registry(&self) -> &R {
        &self.inner.registry
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn strategy(&self) -> &S {
        &self.inner.strategy
    }

    pub fn config(&self) -> &HiveConfig {
        &self.inner.config
    }

    /// Spawns this hive's queen. `inbound_rpc_rx` is the receiving half of
    /// the channel whose sender must be registered with `T` under
    /// [`Hive::id`] before other hives' `RemoteHiveTransport::send_cmd`
    /// calls can reach it (e.g. via `InProcessTransport::register`).
    pub fn spawn_queen(&self, inbound_rpc_rx: mpsc::UnboundedReceiver<RemoteRequest>) -> QueenHandle<A>
    where
        R: 'static,
        T: 'static,
        S: 'static,
    {
        crate::queen::spawn_queen(self.clone(), inbound_rpc_rx)
    }
}
