// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Colony membership maintenance: steady-state slave recruitment and the
//! failure-handler state machine.

pub(crate) mod failover;
pub(crate) mod recruit;
pub(crate) mod replicate;

pub(crate) use recruit::create_slaves_for_colony;
