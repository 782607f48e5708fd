// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

// Task spawning and graceful shutdown via a `Runnable`/`Spawner` pair.

use std::future::Future;

use tokio::sync::oneshot;

pub(crate) type ShutdownRx = oneshot::Receiver<()>;
pub(crate) type ShutdownTx = oneshot::Sender<()>;

pub(crate) fn shutdown_chan() -> (ShutdownTx, ShutdownRx) {
    oneshot::channel()
}

/// A long-running loop (a bee's or a queen's) that can be cancelled via a
/// shutdown signal.
#[async_trait::async_trait]
pub(crate) trait Runnable {
    const NAME: &'static str;

    async fn run(self, shutdown_rx: ShutdownRx);
}

pub(crate) struct Spawner;

impl Spawner {
    pub(crate) fn spawn_runnable<R>(runnable: R, shutdown_rx: ShutdownRx)
    where
        R: Runnable + Send + 'static,
    {
        log::debug!("Spawning `{}`.", R::NAME);

        tokio::spawn(runnable.run(shutdown_rx));
    }

    pub(crate) fn spawn<F>(fut: F, task_name: &str)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        log::debug!("Spawning `{}` task.", task_name);

        tokio::spawn(fut);
    }
}
