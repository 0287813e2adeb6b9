// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Custom error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, allowing `main()` to handle process termination.

use std::fmt;

use wd_core::RolloutSummary;

pub mod codes {
    pub const FAILURE: i32 = 1;
    /// At least one host failed; every host was attempted.
    pub const HOSTS_FAILED: i32 = 2;
    /// A canary batch failed and later hosts were skipped.
    pub const ROLLOUT_ABORTED: i32 = 3;
}

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The error for a rollout that did not reach every host successfully.
    pub fn from_summary(summary: &RolloutSummary) -> Option<Self> {
        if summary.all_succeeded() {
            return None;
        }
        if summary.aborted {
            let batch = summary.failed_batch.unwrap_or_default();
            return Some(Self::new(
                codes::ROLLOUT_ABORTED,
                format!(
                    "rollout aborted after canary batch {batch} failed; {} host(s) skipped",
                    summary.skipped
                ),
            ));
        }
        Some(Self::new(
            codes::HOSTS_FAILED,
            format!("{} of {} host(s) failed", summary.failed, summary.outcomes.len()),
        ))
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

#[cfg(test)]
#[path = "exit_error_tests.rs"]
mod tests;
