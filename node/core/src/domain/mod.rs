// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Capability references, directory entries, accounts, furls and the
//! store trait the rest of the crate is written against.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer

pub mod capability;
pub mod directory;
pub mod storage;
pub mod path_sanitizer;
pub mod vfs;
pub mod account;
pub mod furl;
pub mod events;
pub mod node_config;
