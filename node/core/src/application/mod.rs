// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

pub mod resolver;
pub mod mutation;
pub mod file_handles;
pub mod auth;
pub mod session;
pub mod node_identity;
pub mod gateway;
pub mod node;

pub use auth::{AuthChallenge, AuthenticationGateway, Credential};
pub use node::{Node, NodeDirectory, NodeError, RunningNode};
pub use session::{GatewayContext, Session};
