// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

pub mod storage;
pub mod event_bus;
pub mod furl_file;
pub mod tub;
pub mod gateway;
