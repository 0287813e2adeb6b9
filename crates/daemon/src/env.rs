// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Default TCP port for `wardropd`.
pub const DEFAULT_PORT: u16 = wd_wire::DEFAULT_PORT;

/// Resolve state directory: WARDROP_STATE_DIR > XDG_STATE_HOME/wardrop > ~/.local/state/wardrop
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("WARDROP_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("wardrop"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/wardrop"))
}

/// Server definition file: WARDROP_SERVER_CONFIG > `<state_dir>/server.toml`
pub fn server_config_path(state_dir: &Path) -> PathBuf {
    std::env::var("WARDROP_SERVER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join("server.toml"))
}

/// TCP port to listen on
pub fn port() -> u16 {
    std::env::var("WARDROP_PORT").ok().and_then(|s| s.parse::<u16>().ok()).unwrap_or(DEFAULT_PORT)
}

/// Per-frame read/write timeout on client connections
pub fn ipc_timeout() -> Duration {
    std::env::var("WARDROP_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Age after which a deployment lock is treated as abandoned
pub fn lock_stale_after() -> Duration {
    secs_var("WARDROP_LOCK_STALE_SECS", 600)
}

/// Lifetime of an uncommitted chunked session
pub fn session_ttl() -> Duration {
    secs_var("WARDROP_SESSION_TTL_SECS", 1800)
}

/// Maximum number of concurrent chunked sessions
pub fn max_sessions() -> usize {
    std::env::var("WARDROP_MAX_SESSIONS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(10)
}

fn secs_var(name: &str, default: u64) -> Duration {
    Duration::from_secs(std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok()).unwrap_or(default))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
