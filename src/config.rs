// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Hive configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_lock_timeout_ms() -> u64 {
    500
}

fn default_max_recruit_rounds() -> usize {
    8
}

#[rustfmt::skip]
// # Example
// ```json
// "hive": {
//     "replicationFactor": 3,
//     "commitThreshold": 2,
//     "lockTimeoutMs": 500,
//     "isolated": false
// }
// ```

/// Per-application runtime configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename = "hive")]
pub struct HiveConfig {
    /// Desired colony size (master + slaves).
    #[serde(rename = "replicationFactor")]
    pub replication_factor: usize,
    /// Minimum slave count below which a colony is considered under-replicated.
    #[serde(rename = "commitThreshold")]
    pub commit_threshold: usize,
    /// Backoff before retrying a message snoozed on app-lock contention.
    #[serde(rename = "lockTimeoutMs", default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Whether this hive runs without a registry (single-hive, `lock` is a no-op).
    #[serde(rename = "isolated", default)]
    pub isolated: bool,
    /// Upper bound on `createSlavesForColony` retry rounds.
    #[serde(rename = "maxRecruitRounds", default = "default_max_recruit_rounds")]
    pub max_recruit_rounds: usize,
}

impl HiveConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            replication_factor: 3,
            commit_threshold: 1,
            lock_timeout_ms: default_lock_timeout_ms(),
            isolated: false,
            max_recruit_rounds: default_max_recruit_rounds(),
        }
    }
}
