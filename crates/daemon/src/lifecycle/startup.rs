// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};
use wd_core::{Clock, SystemClock};
use wd_engine::RestartOrchestrator;
use wd_storage::{DeploymentJournal, DeploymentLock, SignalRegistry, DEFAULT_REDELIVER_AFTER};

use crate::config::ServerConfig;
use crate::listener::Listener;
use crate::process::CommandProcessManager;
use crate::service::DeployService;
use crate::sessions::SessionStore;

use super::{Config, LifecycleError, RecoveryReport};

/// A started daemon, ready to serve.
pub struct Daemon {
    pub server: ServerConfig,
    pub service: Arc<DeployService<CommandProcessManager>>,
    pub listener: Listener<CommandProcessManager>,
    pub recovery: RecoveryReport,
}

/// Load the server definition, inspect leftover state and bind the listener.
///
/// The deployment lock defers termination delivered through `signals`.
pub async fn startup(config: &Config, signals: Arc<SignalRegistry>) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    let server = ServerConfig::load(&config.server_config_path)?;
    info!(
        app = %server.app_name,
        archive = %server.archive_path.display(),
        config = %config.server_config_path.display(),
        "loaded server config"
    );

    let journal = Arc::new(DeploymentJournal::new(&config.journal_path));
    let lock = DeploymentLock::new(&config.lock_path).stale_after(config.lock_stale_after);
    let recovery = inspect_state(&journal, &lock, config.lock_stale_after)?;

    let orchestrator = RestartOrchestrator::new(
        server.restart_options(),
        CommandProcessManager::new(&server),
        lock.clone().defer_signals(signals, DEFAULT_REDELIVER_AFTER),
        journal,
        SystemClock,
    );
    let sessions = SessionStore::new(config.session_ttl, config.max_sessions);
    let service =
        Arc::new(DeployService::new(orchestrator, sessions, lock, config.lock_stale_after));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let tcp = TcpListener::bind(addr).await.map_err(|e| LifecycleError::BindFailed(addr, e))?;
    let listener = Listener::new(tcp, Arc::clone(&service), config.io_timeout);

    Ok(Daemon { server, service, listener, recovery })
}

/// Report an interrupted deployment and a live lock holder.
///
/// Nothing is resumed automatically; the report is diagnostic.
pub fn inspect_state<C: Clock>(
    journal: &DeploymentJournal,
    lock: &DeploymentLock<C>,
    stale_after: Duration,
) -> Result<RecoveryReport, LifecycleError> {
    let incomplete = journal.get_incomplete()?;
    let resumable = incomplete.as_ref().is_some_and(DeploymentJournal::can_resume);
    if let Some(checkpoint) = &incomplete {
        warn!(
            deployment_id = %checkpoint.deployment_id,
            step = %checkpoint.step,
            started = %checkpoint.started,
            resumable,
            "found incomplete deployment from an earlier run"
        );
    }

    let lock_holder = lock.is_locked(stale_after)?;
    if let Some(record) = &lock_holder {
        warn!(
            deployment_id = %record.deployment_id,
            pid = record.pid,
            step = %record.step,
            "deployment lock is held by a live process"
        );
    }

    Ok(RecoveryReport { incomplete, resumable, lock_holder })
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
