// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment journal: a single checkpoint recording how far the current
//! restart got.
//!
//! Written synchronously before each step runs and cleared once the restart
//! completes. A checkpoint found at startup means the previous daemon died
//! mid-deployment; it is reported, never replayed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wd_core::{DeploymentId, DeploymentStep};

use crate::atomic::write_json;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("no deployment has been started in this journal")]
    NotStarted,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a deployment is about to do, captured at `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentInfo {
    pub deployment_id: DeploymentId,
    pub archive_path: PathBuf,
    pub app_name: String,
    pub context_root: String,
    pub changed_files: Vec<String>,
    pub deleted_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalCheckpoint {
    pub deployment_id: DeploymentId,
    pub started: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub step: DeploymentStep,
    pub archive_path: PathBuf,
    pub app_name: String,
    pub context_root: String,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default)]
    pub deleted_files: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

pub struct DeploymentJournal {
    path: PathBuf,
    current: Mutex<Option<JournalCheckpoint>>,
}

impl DeploymentJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), current: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin a deployment, replacing any previous checkpoint.
    pub fn start(&self, info: DeploymentInfo) -> Result<JournalCheckpoint, JournalError> {
        let now = Utc::now();
        let checkpoint = JournalCheckpoint {
            deployment_id: info.deployment_id,
            started: now,
            last_updated: now,
            step: DeploymentStep::Init,
            archive_path: info.archive_path,
            app_name: info.app_name,
            context_root: info.context_root,
            changed_files: info.changed_files,
            deleted_files: info.deleted_files,
            metadata: BTreeMap::new(),
        };
        let mut current = self.current.lock();
        write_json(&self.path, &checkpoint)?;
        tracing::debug!(deployment_id = %checkpoint.deployment_id, "journal started");
        *current = Some(checkpoint.clone());
        Ok(checkpoint)
    }

    /// Advance to `step`, merging `metadata` into the checkpoint. Returns only
    /// once the checkpoint is on disk.
    pub fn update_step(
        &self,
        step: DeploymentStep,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Result<(), JournalError> {
        let mut current = self.current.lock();
        let Some(checkpoint) = current.as_mut() else {
            return Err(JournalError::NotStarted);
        };
        let mut next = checkpoint.clone();
        next.step = step;
        next.last_updated = Utc::now();
        if let Some(metadata) = metadata {
            next.metadata.extend(metadata);
        }
        write_json(&self.path, &next)?;
        *checkpoint = next;
        Ok(())
    }

    /// Clear the checkpoint after a successful deployment.
    pub fn complete(&self) -> Result<(), JournalError> {
        let mut current = self.current.lock();
        remove_if_exists(&self.path)?;
        if let Some(checkpoint) = current.take() {
            tracing::debug!(deployment_id = %checkpoint.deployment_id, "journal cleared");
        }
        Ok(())
    }

    /// Load a checkpoint left behind by an interrupted deployment.
    ///
    /// A checkpoint already at `complete` is cleared. An unreadable one is
    /// moved aside to `<path>.bak` and treated as absent.
    pub fn get_incomplete(&self) -> Result<Option<JournalCheckpoint>, JournalError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint = match serde_json::from_slice::<JournalCheckpoint>(&content) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                let backup = self.backup_path();
                tracing::warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "moving corrupt journal aside"
                );
                std::fs::rename(&self.path, &backup)?;
                return Ok(None);
            }
        };

        if checkpoint.step == DeploymentStep::Complete {
            tracing::debug!(deployment_id = %checkpoint.deployment_id, "clearing completed journal");
            remove_if_exists(&self.path)?;
            return Ok(None);
        }
        Ok(Some(checkpoint))
    }

    /// Whether an interrupted deployment stopped early enough to be retried
    /// without touching the server.
    pub fn can_resume(checkpoint: &JournalCheckpoint) -> bool {
        checkpoint.step.is_resumable()
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
