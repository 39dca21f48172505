// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the capgrid CLI

pub mod account;
pub mod create;
pub mod node;

pub use self::account::AddAccountArgs;
pub use self::create::{CreateArgs, IntroducerArgs};
pub use self::node::{RunArgs, StopArgs};
