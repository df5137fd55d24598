// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lichsu session: authentication and token-refresh client core for the
//! lichsu history site.
//!
//! A [`SessionManager`](manager::SessionManager) owns the persisted login
//! contexts (end-user and admin) and a single-flight
//! [`RefreshOrchestrator`](refresh::RefreshOrchestrator). The
//! [`ApiClient`](client::ApiClient) keeps requests authenticated, and the
//! [`triggers`] refresh the token on activity and on a timer.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod refresh;
pub mod session;
pub mod store;
pub mod supersede;
pub mod token;
pub mod triggers;

#[cfg(test)]
mod test_support;
