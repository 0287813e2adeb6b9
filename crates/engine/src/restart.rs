// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full-restart sequence for one host.
//!
//! `init → war-update → undeploy → stop → kill → start → deploy → verify →
//! complete`, each step recorded in the lock and the journal before it runs.
//! A failed step ends the sequence with the journal left in place and the
//! lock released.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use wd_archive::ArchiveError;
use wd_core::{
    format_elapsed_ms, Clock, DeployResult, DeploymentId, DeploymentStep, FileEntry, StepTiming,
    SystemClock,
};
use wd_storage::{DeploymentInfo, DeploymentJournal, DeploymentLock, JournalError, LockError};

use crate::process::{ProcessError, ProcessManager};

#[derive(Debug, Error)]
pub enum RestartError {
    #[error("a deployment is already running in this process")]
    Busy,

    #[error(transparent)]
    Locked(#[from] LockError),
}

/// What to restart and how long to wait for it.
#[derive(Debug, Clone)]
pub struct RestartOptions {
    pub(crate) app_name: String,
    pub(crate) context_root: String,
    pub(crate) archive_path: PathBuf,
    pub(crate) stop_timeout: Duration,
    pub(crate) health_timeout: Duration,
    pub(crate) poll_interval: Duration,
}

impl RestartOptions {
    pub fn new(
        app_name: impl Into<String>,
        context_root: impl Into<String>,
        archive_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            context_root: context_root.into(),
            archive_path: archive_path.into(),
            stop_timeout: Duration::from_secs(60),
            health_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(2),
        }
    }

    wd_core::setters! {
        set {
            stop_timeout: Duration,
            health_timeout: Duration,
            poll_interval: Duration,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn archive_path(&self) -> &std::path::Path {
        &self.archive_path
    }
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("journal: {0}")]
    Journal(#[from] JournalError),

    #[error("server process still running after {0}s")]
    StillRunning(u64),

    #[error("server not healthy after {0}s")]
    Unhealthy(u64),

    #[error("application {0} not listed after deploy")]
    NotListed(String),

    #[error("archive update task failed: {0}")]
    Task(String),
}

/// Runs the restart sequence. One sequence at a time per orchestrator, and
/// one per host through the deployment lock.
pub struct RestartOrchestrator<P: ProcessManager, C: Clock = SystemClock> {
    options: RestartOptions,
    process: P,
    lock: DeploymentLock<C>,
    journal: Arc<DeploymentJournal>,
    clock: C,
    busy: AtomicBool,
}

/// Clears the in-process busy flag on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P: ProcessManager, C: Clock> RestartOrchestrator<P, C> {
    pub fn new(
        options: RestartOptions,
        process: P,
        lock: DeploymentLock<C>,
        journal: Arc<DeploymentJournal>,
        clock: C,
    ) -> Self {
        Self { options, process, lock, journal, clock, busy: AtomicBool::new(false) }
    }

    pub fn options(&self) -> &RestartOptions {
        &self.options
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Apply `files`/`deletions` to the archive and restart the server.
    ///
    /// `Err` only when the sequence could not start; a failing step is
    /// reported through an unsuccessful [`DeployResult`].
    pub async fn run(
        &self,
        deployment_id: DeploymentId,
        files: Vec<FileEntry>,
        deletions: Vec<String>,
    ) -> Result<DeployResult, RestartError> {
        self.run_shared(deployment_id, Arc::new(files), Arc::new(deletions)).await
    }

    /// [`run`](Self::run) for a change set the caller keeps a handle on. When
    /// the sequence cannot start, every clone taken here is dropped before
    /// returning, so the caller's `Arc` is unique again.
    pub async fn run_shared(
        &self,
        deployment_id: DeploymentId,
        files: Arc<Vec<FileEntry>>,
        deletions: Arc<Vec<String>>,
    ) -> Result<DeployResult, RestartError> {
        if self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(RestartError::Busy);
        }
        let _busy = BusyGuard(&self.busy);

        let mut held = self.lock.acquire(&deployment_id)?;
        let started_at_ms = self.clock.epoch_ms();
        let files_changed = files.len();
        let files_deleted = deletions.len();

        tracing::info!(
            deployment_id = %deployment_id,
            app = %self.options.app_name,
            files_changed,
            files_deleted,
            "restart sequence started"
        );

        let mut timings = Vec::new();
        let mut failure = None;
        for step in DeploymentStep::ALL {
            held.update_step(step);
            let begun = Instant::now();
            let outcome = match self.checkpoint(step, &deployment_id, &files, &deletions) {
                Ok(()) => self.execute(step, &files, &deletions).await,
                Err(e) => Err(e),
            };
            let elapsed_ms = begun.elapsed().as_millis() as u64;
            timings.push(StepTiming { step, elapsed_ms });

            match outcome {
                Ok(()) => tracing::info!(
                    deployment_id = %deployment_id,
                    step = %step,
                    elapsed = %format_elapsed_ms(elapsed_ms),
                    "step finished"
                ),
                Err(e) => {
                    tracing::error!(deployment_id = %deployment_id, step = %step, error = %e, "step failed");
                    failure = Some((step, e));
                    break;
                }
            }
        }

        if held.release() {
            tracing::warn!(deployment_id = %deployment_id, "termination requested during restart");
        }

        let finished_at_ms = self.clock.epoch_ms();
        let total = format_elapsed_ms(finished_at_ms.saturating_sub(started_at_ms));
        let (success, message, failed_step) = match failure {
            None => (
                true,
                format!("deployed {files_changed} changed, {files_deleted} deleted in {total}"),
                None,
            ),
            Some((step, e)) => (false, format!("{step} failed: {e}"), Some(step)),
        };

        Ok(DeployResult {
            deployment_id,
            success,
            message,
            failed_step,
            started_at_ms,
            finished_at_ms,
            files_changed,
            files_deleted,
            timings,
        })
    }

    fn checkpoint(
        &self,
        step: DeploymentStep,
        deployment_id: &DeploymentId,
        files: &[FileEntry],
        deletions: &[String],
    ) -> Result<(), StepError> {
        if step == DeploymentStep::Init {
            self.journal.start(DeploymentInfo {
                deployment_id: deployment_id.clone(),
                archive_path: self.options.archive_path.clone(),
                app_name: self.options.app_name.clone(),
                context_root: self.options.context_root.clone(),
                changed_files: files.iter().map(|f| f.path.clone()).collect(),
                deleted_files: deletions.to_vec(),
            })?;
        } else {
            self.journal.update_step(step, None)?;
        }
        Ok(())
    }

    async fn execute(
        &self,
        step: DeploymentStep,
        files: &Arc<Vec<FileEntry>>,
        deletions: &Arc<Vec<String>>,
    ) -> Result<(), StepError> {
        let process = &self.process;
        let options = &self.options;
        match step {
            DeploymentStep::Init => Ok(()),

            DeploymentStep::WarUpdate => self.update_archive(files, deletions).await,

            DeploymentStep::Undeploy => {
                match process.list_applications().await {
                    Ok(apps) if apps.iter().any(|a| *a == options.app_name) => {
                        if let Err(e) = process.undeploy(&options.app_name).await {
                            tracing::warn!(app = %options.app_name, error = %e, "undeploy failed, continuing");
                        }
                    }
                    Ok(_) => tracing::debug!(app = %options.app_name, "not deployed, skipping undeploy"),
                    Err(e) => tracing::warn!(error = %e, "could not list applications, skipping undeploy"),
                }
                Ok(())
            }

            DeploymentStep::Stop => {
                // The kill step terminates whatever survives a failed stop
                if let Err(e) = process.stop().await {
                    tracing::warn!(error = %e, "graceful stop failed");
                }
                Ok(())
            }

            DeploymentStep::Kill => {
                let killed = process.aggressive_stop().await?;
                if killed > 0 {
                    tracing::info!(killed, "force-terminated server processes");
                }
                self.journal.update_step(
                    DeploymentStep::Kill,
                    Some(BTreeMap::from([("killed_processes".to_string(), killed.into())])),
                )?;
                self.wait_stopped().await
            }

            DeploymentStep::Start => {
                if process.is_running().await? {
                    tracing::warn!("server process reappeared before start, terminating it");
                    process.aggressive_stop().await?;
                    self.wait_stopped().await?;
                }
                process.prepare_config().await?;
                process.start().await?;
                let healthy = self
                    .poll_until(options.health_timeout, move || async move {
                        match process.is_healthy().await {
                            Ok(healthy) => Ok(healthy),
                            Err(e) => {
                                tracing::debug!(error = %e, "health check errored");
                                Ok(false)
                            }
                        }
                    })
                    .await?;
                if healthy {
                    Ok(())
                } else {
                    Err(StepError::Unhealthy(options.health_timeout.as_secs()))
                }
            }

            DeploymentStep::Deploy => {
                process
                    .deploy(&options.archive_path, &options.app_name, &options.context_root)
                    .await?;
                Ok(())
            }

            DeploymentStep::Verify => {
                let apps = process.list_applications().await?;
                if apps.iter().any(|a| *a == options.app_name) {
                    Ok(())
                } else {
                    Err(StepError::NotListed(options.app_name.clone()))
                }
            }

            DeploymentStep::Complete => Ok(self.journal.complete()?),
        }
    }

    async fn update_archive(
        &self,
        files: &Arc<Vec<FileEntry>>,
        deletions: &Arc<Vec<String>>,
    ) -> Result<(), StepError> {
        if files.is_empty() && deletions.is_empty() {
            tracing::debug!("no archive changes");
            return Ok(());
        }
        let archive = self.options.archive_path.clone();
        let files = Arc::clone(files);
        let deletions = Arc::clone(deletions);
        tokio::task::spawn_blocking(move || {
            wd_archive::apply_changes(&archive, &files, &deletions)
        })
        .await
        .map_err(|e| StepError::Task(e.to_string()))??;
        Ok(())
    }

    async fn wait_stopped(&self) -> Result<(), StepError> {
        let process = &self.process;
        let stopped = self
            .poll_until(self.options.stop_timeout, move || async move {
                Ok(!process.is_running().await?)
            })
            .await?;
        if stopped {
            Ok(())
        } else {
            Err(StepError::StillRunning(self.options.stop_timeout.as_secs()))
        }
    }

    /// Poll `probe` at the configured interval until it returns true or
    /// `timeout` passes. The probe always runs at least once.
    async fn poll_until<F, Fut>(&self, timeout: Duration, mut probe: F) -> Result<bool, StepError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ProcessError>>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if probe().await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

#[cfg(test)]
#[path = "restart_tests.rs"]
mod tests;
