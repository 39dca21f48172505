// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

//! Gateway Server Infrastructure
//!
//! ```text
//! file-transfer client -> newline-delimited JSON over TCP
//!   -> GatewayServer (one task per connection)
//!   -> Session (auth state, cwd, handle table)
//!   -> FileHandleManager / DirectoryMutationEngine
//!   -> CapabilityStore
//! ```

pub mod protocol;
pub mod server;

pub use protocol::{Reply, Request, Response, WireOpenMode};
pub use server::{GatewayServer, GatewayServerError};
