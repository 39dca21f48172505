// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0
//! capgrid CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Node directory creation, account provisioning and the
//!   foreground node runner

pub mod commands;
pub mod daemon;
