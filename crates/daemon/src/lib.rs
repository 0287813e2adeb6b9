// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wardropd: receives change sets over TCP and runs the full-restart
//! sequence on this host.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod logging;
pub mod process;
pub mod service;
pub mod sessions;

pub use config::{CommandSet, ConfigError, ServerConfig};
pub use lifecycle::{Config, LifecycleError, RecoveryReport};
pub use listener::Listener;
pub use process::CommandProcessManager;
pub use service::DeployService;
pub use sessions::{ChunkedSession, SessionError, SessionStore};

#[cfg(test)]
mod test_helpers;
