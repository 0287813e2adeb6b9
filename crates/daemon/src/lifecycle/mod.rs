// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, recovery inspection, shutdown.

mod startup;
pub use startup::{inspect_state, startup, Daemon};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wd_storage::{install_os_dispatch, JournalCheckpoint, JournalError, LockError, LockRecord, SignalRegistry};

use crate::config::ConfigError;
use crate::env;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/wardrop)
    pub state_dir: PathBuf,
    /// Deployment lock record
    pub lock_path: PathBuf,
    /// Deployment journal checkpoint
    pub journal_path: PathBuf,
    pub log_path: PathBuf,
    pub server_config_path: PathBuf,
    pub port: u16,
    pub io_timeout: Duration,
    pub lock_stale_after: Duration,
    pub session_ttl: Duration,
    pub max_sessions: usize,
}

impl Config {
    /// Paths under the resolved state directory, tunables from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::for_state_dir(env::state_dir()?))
    }

    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            lock_path: state_dir.join("deploy.lock"),
            journal_path: state_dir.join("journal.json"),
            log_path: state_dir.join("daemon.log"),
            server_config_path: env::server_config_path(&state_dir),
            port: env::port(),
            io_timeout: env::ipc_timeout(),
            lock_stale_after: env::lock_stale_after(),
            session_ttl: env::session_ttl(),
            max_sessions: env::max_sessions(),
            state_dir,
        }
    }
}

/// What startup found left behind by an earlier process.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Journal checkpoint of a deployment that never completed
    pub incomplete: Option<JournalCheckpoint>,
    pub resumable: bool,
    /// Lock record of a live deployment in another process
    pub lock_holder: Option<LockRecord>,
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start up, route OS `SIGTERM` into the global registry and serve.
pub async fn run(config: Config) -> Result<(), LifecycleError> {
    let signals = SignalRegistry::global();
    let daemon = startup(&config, Arc::clone(&signals)).await?;
    let dispatch = install_os_dispatch(Arc::clone(&signals))?;
    let result = serve(daemon, signals).await;
    dispatch.abort();
    result
}

/// Serve until `signals` delivers a termination.
///
/// While a deployment holds the lock the delivery is deferred, so shutdown
/// never interrupts a restart sequence.
pub async fn serve(daemon: Daemon, signals: Arc<SignalRegistry>) -> Result<(), LifecycleError> {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handler = signals.register(move || token.cancel());

    info!(
        addr = %daemon.listener.local_addr()?,
        app = %daemon.server.app_name,
        "wardropd ready"
    );
    daemon.listener.run(shutdown).await;

    signals.unregister(handler);
    info!("daemon shutdown complete");
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
