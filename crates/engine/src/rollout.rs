// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-host rollout.
//!
//! Hosts are split into batches by the strategy. Hosts inside a batch run
//! concurrently and the next batch starts only after the whole batch is done.
//! Canary strategies abort at the first batch with a failure and mark every
//! later host skipped; sequential and parallel always reach every host.

use std::fmt::Display;
use std::future::Future;

use futures_util::future::join_all;
use wd_core::{HostOutcome, RolloutStrategy, RolloutSummary};

/// What a successful per-host deployment changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostReport {
    pub files_changed: usize,
    pub files_deleted: usize,
}

/// Deploy to `hosts` with `deploy` according to `strategy`.
///
/// Outcomes come back in host-list order.
pub async fn run_rollout<F, Fut, E>(
    hosts: &[String],
    strategy: &RolloutStrategy,
    deploy: F,
) -> RolloutSummary
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<HostReport, E>>,
    E: Display,
{
    let batches = strategy.partition(hosts);
    let total = batches.len();
    let mut outcomes = Vec::with_capacity(hosts.len());
    let mut failed_batch = None;

    for (index, batch) in batches.into_iter().enumerate() {
        let number = index + 1;
        if failed_batch.is_some() {
            outcomes.extend(batch.into_iter().map(HostOutcome::skipped));
            continue;
        }

        tracing::info!(batch = number, of = total, hosts = batch.len(), %strategy, "starting batch");
        let results = join_all(batch.iter().map(|host| deploy(host.clone()))).await;

        let mut batch_failed = false;
        for (host, result) in batch.into_iter().zip(results) {
            let outcome = match result {
                Ok(report) => {
                    HostOutcome::succeeded(host, report.files_changed, report.files_deleted)
                }
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "host deployment failed");
                    batch_failed = true;
                    HostOutcome::failed(host, e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        // A failure in the final batch has nothing left to abort
        if batch_failed && strategy.is_canary() && number < total {
            tracing::warn!(batch = number, "canary batch failed, aborting rollout");
            failed_batch = Some(number);
        }
    }

    let summary = RolloutSummary::from_outcomes(outcomes, failed_batch);
    tracing::info!(
        successful = summary.successful,
        failed = summary.failed,
        skipped = summary.skipped,
        aborted = summary.aborted,
        "rollout finished"
    );
    summary
}

#[cfg(test)]
#[path = "rollout_tests.rs"]
mod tests;
