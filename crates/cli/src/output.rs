// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text and JSON rendering for command results.

use clap::ValueEnum;
use wd_core::{format_elapsed_ms, ChangeSet, DeployResult, HostStatus, RolloutSummary};
use wd_wire::{LockHolder, Response};

use crate::color;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Per-host outcomes followed by the aggregate line.
pub fn format_summary(summary: &RolloutSummary, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(summary)?);
    }

    let width = summary.outcomes.iter().map(|o| o.host.len()).max().unwrap_or(0);
    let mut lines = Vec::with_capacity(summary.outcomes.len() + 2);
    for outcome in &summary.outcomes {
        let detail = match outcome.status {
            HostStatus::Succeeded if outcome.files_changed == 0 && outcome.files_deleted == 0 => {
                "up to date".to_string()
            }
            HostStatus::Succeeded => {
                format!("{} changed, {} deleted", outcome.files_changed, outcome.files_deleted)
            }
            HostStatus::Failed => outcome.error.clone().unwrap_or_default(),
            HostStatus::Skipped => String::new(),
        };
        let line = format!("{:<width$}  {}  {}", outcome.host, color::status(outcome.status), detail);
        lines.push(line.trim_end().to_string());
    }

    lines.push(String::new());
    lines.push(format!(
        "{} succeeded, {} failed, {} skipped",
        summary.successful, summary.failed, summary.skipped
    ));
    if let Some(batch) = summary.failed_batch {
        lines.push(format!("Rollout aborted: canary batch {} failed", batch));
    }
    Ok(lines.join("\n"))
}

/// A host's answer to `Status`.
pub fn format_status(host: &str, response: &Response, format: OutputFormat) -> anyhow::Result<String> {
    let Response::Status { last_result, lock } = response else {
        anyhow::bail!("unexpected response from {}: {:?}", host, response);
    };

    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(&serde_json::json!({
            "host": host,
            "last_result": last_result,
            "lock": lock,
        }))?);
    }

    let mut lines = vec![color::header(host)];
    match last_result {
        Some(result) => lines.extend(format_result(result)),
        None => lines.push("  Last deployment: none".to_string()),
    }
    lines.push(format_lock(lock.as_ref()));
    Ok(lines.join("\n"))
}

fn format_result(result: &DeployResult) -> Vec<String> {
    let elapsed = format_elapsed_ms(result.finished_at_ms.saturating_sub(result.started_at_ms));
    let outcome = match (&result.failed_step, result.success) {
        (_, true) => color::status(HostStatus::Succeeded),
        (Some(step), false) => format!("{} at {}", color::status(HostStatus::Failed), step),
        (None, false) => color::status(HostStatus::Failed),
    };
    let mut lines = vec![
        format!("  Last deployment: {} {} in {}", result.deployment_id, outcome, elapsed),
        format!("  {}", result.message),
        format!("  Files: {} changed, {} deleted", result.files_changed, result.files_deleted),
    ];
    if !result.timings.is_empty() {
        let steps: Vec<String> = result
            .timings
            .iter()
            .map(|t| format!("{} {}", t.step, format_elapsed_ms(t.elapsed_ms)))
            .collect();
        lines.push(color::context(&format!("  Steps: {}", steps.join(", "))));
    }
    lines
}

fn format_lock(lock: Option<&LockHolder>) -> String {
    match lock {
        Some(lock) => format!(
            "  Lock: held by {} (pid {}, step {})",
            lock.deployment_id, lock.pid, lock.step
        ),
        None => "  Lock: free".to_string(),
    }
}

/// What a deploy to `host` would send.
pub fn format_changes(host: &str, changes: &ChangeSet, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(&serde_json::json!({
            "host": host,
            "changed": changes.changed,
            "deleted": changes.deleted,
        }))?);
    }

    if changes.is_empty() {
        return Ok(format!("{}: up to date", host));
    }
    let mut lines = vec![color::header(host)];
    lines.extend(changes.changed.iter().map(|path| format!("  M {}", path)));
    lines.extend(changes.deleted.iter().map(|path| format!("  D {}", path)));
    lines.push(format!("{} changed, {} deleted", changes.changed.len(), changes.deleted.len()));
    Ok(lines.join("\n"))
}
