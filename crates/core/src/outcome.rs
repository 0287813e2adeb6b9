// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Results reported by a restart on one host and by a whole rollout.

use serde::{Deserialize, Serialize};

use crate::{DeploymentId, DeploymentStep};

/// Wall time spent in one restart step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: DeploymentStep,
    pub elapsed_ms: u64,
}

/// Result of one full-restart sequence on the receiving host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResult {
    pub deployment_id: DeploymentId,
    pub success: bool,
    pub message: String,
    /// Step that failed, `None` on success.
    #[serde(default)]
    pub failed_step: Option<DeploymentStep>,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub files_changed: usize,
    pub files_deleted: usize,
    #[serde(default)]
    pub timings: Vec<StepTiming>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Succeeded,
    Failed,
    /// Never attempted because an earlier canary batch failed.
    Skipped,
}

crate::simple_display! {
    HostStatus {
        Succeeded => "succeeded",
        Failed => "failed",
        Skipped => "skipped",
    }
}

/// Outcome of deploying to one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostOutcome {
    pub host: String,
    pub status: HostStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub files_changed: usize,
    pub files_deleted: usize,
}

impl HostOutcome {
    pub fn succeeded(host: impl Into<String>, files_changed: usize, files_deleted: usize) -> Self {
        Self {
            host: host.into(),
            status: HostStatus::Succeeded,
            error: None,
            files_changed,
            files_deleted,
        }
    }

    pub fn failed(host: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            status: HostStatus::Failed,
            error: Some(error.into()),
            files_changed: 0,
            files_deleted: 0,
        }
    }

    pub fn skipped(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            status: HostStatus::Skipped,
            error: None,
            files_changed: 0,
            files_deleted: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == HostStatus::Succeeded
    }
}

/// Aggregate of a rollout across all hosts, in host-list order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutSummary {
    pub outcomes: Vec<HostOutcome>,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: bool,
    /// 1-based index of the canary batch that caused the abort.
    #[serde(default)]
    pub failed_batch: Option<usize>,
}

impl RolloutSummary {
    pub fn from_outcomes(outcomes: Vec<HostOutcome>, failed_batch: Option<usize>) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            successful: count(HostStatus::Succeeded),
            failed: count(HostStatus::Failed),
            skipped: count(HostStatus::Skipped),
            aborted: failed_batch.is_some(),
            failed_batch,
            outcomes,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
