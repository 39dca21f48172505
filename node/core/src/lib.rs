// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0
//! capgrid node core
//!
//! Maps remote file-transfer sessions onto a capability-secured virtual
//! filesystem and keeps the node's advertised furls stable across restarts.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain types, gateway use cases and their adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
