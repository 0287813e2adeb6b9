// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process deployment lock.
//!
//! The lock is a JSON record created with create-or-fail semantics: the
//! record is staged in a temp file and hard-linked to the lock path, so a
//! competing process either sees no file or a complete record. A record is
//! stale once it is older than the threshold or its pid no longer exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wd_core::{Clock, DeploymentId, DeploymentStep, SystemClock};

use crate::atomic::{stage_json, write_json};
use crate::signal::{ScopedSignalGuard, SignalRegistry};

/// Default age after which a lock is considered abandoned.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

/// Delay between releasing the lock and re-delivering a deferred signal.
pub const DEFAULT_REDELIVER_AFTER: Duration = Duration::from_millis(100);

/// Persisted lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub started_at_ms: u64,
    pub deployment_id: DeploymentId,
    pub step: DeploymentStep,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "deployment {deployment_id} already in progress (pid {pid}, step {step}, {age_secs}s old)"
    )]
    AlreadyInProgress {
        deployment_id: DeploymentId,
        pid: u32,
        age_secs: u64,
        step: DeploymentStep,
    },
    #[error("lock file {} kept changing while acquiring", .0.display())]
    Contended(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a process with this pid currently exists.
///
/// `EPERM` means the process exists but belongs to someone else.
pub fn pid_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // pid 0 and out-of-range values would address process groups
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Factory for the lock at one path.
#[derive(Clone)]
pub struct DeploymentLock<C: Clock = SystemClock> {
    path: PathBuf,
    stale_after: Duration,
    clock: C,
    signals: Option<Arc<SignalRegistry>>,
    redeliver_after: Duration,
}

impl DeploymentLock<SystemClock> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, SystemClock)
    }
}

impl<C: Clock> DeploymentLock<C> {
    pub fn with_clock(path: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            path: path.into(),
            stale_after: DEFAULT_STALE_AFTER,
            clock,
            signals: None,
            redeliver_after: DEFAULT_REDELIVER_AFTER,
        }
    }

    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Defer termination signals from `registry` while the lock is held.
    pub fn defer_signals(mut self, registry: Arc<SignalRegistry>, redeliver_after: Duration) -> Self {
        self.signals = Some(registry);
        self.redeliver_after = redeliver_after;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock for `deployment_id`, failing fast if a live deployment
    /// holds it. A stale record is removed first.
    pub fn acquire(&self, deployment_id: &DeploymentId) -> Result<HeldLock, LockError> {
        let record = LockRecord {
            pid: std::process::id(),
            started_at_ms: self.clock.epoch_ms(),
            deployment_id: deployment_id.clone(),
            step: DeploymentStep::Init,
        };

        // One retry covers removing a stale record; losing twice means
        // another process is racing for the same lock.
        for _ in 0..2 {
            let staged = stage_json(&self.path, &record)?;
            match std::fs::hard_link(staged.path(), &self.path) {
                Ok(()) => {
                    tracing::info!(deployment_id = %deployment_id, path = %self.path.display(), "deployment lock acquired");
                    let guard = self
                        .signals
                        .as_ref()
                        .map(|r| ScopedSignalGuard::install(Arc::clone(r), self.redeliver_after));
                    return Ok(HeldLock {
                        path: self.path.clone(),
                        record,
                        guard,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Some(existing) = self.live_record()? {
                        return Err(LockError::AlreadyInProgress {
                            age_secs: self.age(&existing).as_secs(),
                            deployment_id: existing.deployment_id,
                            pid: existing.pid,
                            step: existing.step,
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LockError::Contended(self.path.clone()))
    }

    /// The current holder, if one is live and younger than `max_age`.
    ///
    /// Only reports: a record older than `max_age` is left in place. A record
    /// whose owner is dead, older than the lock's own stale threshold, or
    /// unreadable is removed, exactly as `acquire` would remove it.
    pub fn is_locked(&self, max_age: Duration) -> Result<Option<LockRecord>, LockError> {
        Ok(self.live_record()?.filter(|record| self.age(record) <= max_age))
    }

    fn live_record(&self) -> Result<Option<LockRecord>, LockError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = match serde_json::from_slice::<LockRecord>(&content) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "removing unreadable lock file");
                self.remove_if_unchanged(&content)?;
                return Ok(None);
            }
        };

        let age = self.age(&record);
        let alive = pid_alive(record.pid);
        if age <= self.stale_after && alive {
            return Ok(Some(record));
        }
        tracing::warn!(
            deployment_id = %record.deployment_id,
            pid = record.pid,
            age_secs = age.as_secs(),
            pid_alive = alive,
            "removing stale deployment lock"
        );
        self.remove_if_unchanged(&content)?;
        Ok(None)
    }

    /// Remove the lock file only if it still holds `expected`, so a record
    /// written by a competitor in the meantime survives.
    fn remove_if_unchanged(&self, expected: &[u8]) -> Result<(), LockError> {
        match std::fs::read(&self.path) {
            Ok(current) if current == expected => match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn age(&self, record: &LockRecord) -> Duration {
        self.clock.elapsed_since(record.started_at_ms)
    }
}

/// A held deployment lock. Released by [`release`](Self::release) or on drop.
pub struct HeldLock {
    path: PathBuf,
    record: LockRecord,
    guard: Option<ScopedSignalGuard>,
    released: bool,
}

impl HeldLock {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    /// Record the step about to run. Failure is logged, never fatal.
    pub fn update_step(&mut self, step: DeploymentStep) {
        self.record.step = step;
        if let Err(e) = write_json(&self.path, &self.record) {
            tracing::warn!(
                deployment_id = %self.record.deployment_id,
                step = %step,
                error = %e,
                "failed to update lock step"
            );
        }
    }

    /// Whether a termination signal arrived while the lock was held.
    pub fn signal_pending(&self) -> bool {
        self.guard.as_ref().is_some_and(ScopedSignalGuard::is_pending)
    }

    /// Remove the record and restore signal handlers. Returns true when a
    /// deferred termination signal was scheduled for re-delivery.
    pub fn release(mut self) -> bool {
        self.release_inner()
    }

    fn release_inner(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        match std::fs::read(&self.path) {
            Ok(content) => match serde_json::from_slice::<LockRecord>(&content) {
                Ok(on_disk) if on_disk.deployment_id != self.record.deployment_id => {
                    tracing::warn!(
                        deployment_id = %self.record.deployment_id,
                        holder = %on_disk.deployment_id,
                        "lock was taken over, leaving it in place"
                    );
                }
                _ => {
                    if let Err(e) = std::fs::remove_file(&self.path) {
                        tracing::warn!(error = %e, "failed to remove deployment lock");
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, "failed to read deployment lock on release"),
        }
        tracing::info!(deployment_id = %self.record.deployment_id, "deployment lock released");

        self.guard.take().is_some_and(ScopedSignalGuard::restore)
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
