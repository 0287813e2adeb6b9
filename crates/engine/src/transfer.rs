// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client side of the diff/transfer protocol.
//!
//! Fetch the host's content hashes, diff them against the local archive and
//! send only what changed: one `Deploy` request for small change sets,
//! a session of `Chunk` requests otherwise. A mutating request that times out
//! or meets a running deployment is never re-sent; the client polls `Status`
//! for a result newer than its own request instead.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use wd_archive::ArchiveError;
use wd_core::{
    total_bytes, ArchiveHashMap, ChangeSet, Clock, DeployResult, DeploymentStep, FileEntry,
    SessionId, SystemClock,
};
use wd_wire::{ProtocolError, Request, Response};

use crate::rollout::HostReport;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("host error: {0}")]
    Remote(String),

    #[error("unexpected response: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("deployment {step} failed: {message}")]
    DeployFailed { step: DeploymentStep, message: String },

    #[error("host received {received} files, expected {expected}")]
    CountMismatch { expected: usize, received: usize },

    #[error("no deployment result after waiting {0}s")]
    StatusWaitExpired(u64),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<ProtocolError> for TransferError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Timeout => TransferError::Timeout,
            other => TransferError::Protocol(other),
        }
    }
}

impl TransferError {
    /// Whether retrying the same read may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Connect { .. } | TransferError::Timeout => true,
            TransferError::Protocol(ProtocolError::Io(_) | ProtocolError::ConnectionClosed) => true,
            _ => false,
        }
    }
}

/// Carries one request to a host and brings back its response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: Request, timeout: Duration) -> Result<Response, TransferError>;
}

/// Bounded exponential backoff for idempotent reads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Run `op` until it succeeds, fails permanently or runs out of attempts.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                tracing::debug!(what, attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub(crate) chunk_max_files: usize,
    pub(crate) chunk_max_bytes: usize,
    pub(crate) read_timeout: Duration,
    pub(crate) deploy_timeout: Duration,
    pub(crate) status_wait: Duration,
    pub(crate) status_interval: Duration,
    pub(crate) retry: RetryPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_max_files: 200,
            chunk_max_bytes: 16 * 1024 * 1024,
            read_timeout: Duration::from_secs(15),
            deploy_timeout: Duration::from_secs(600),
            status_wait: Duration::from_secs(900),
            status_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransferOptions {
    wd_core::setters! {
        set {
            chunk_max_files: usize,
            chunk_max_bytes: usize,
            read_timeout: Duration,
            deploy_timeout: Duration,
            status_wait: Duration,
            status_interval: Duration,
            retry: RetryPolicy,
        }
    }
}

/// Split `files` into chunks of at most `max_files` entries and, where a
/// single file allows it, at most `max_bytes` of content.
pub fn plan_chunks(files: Vec<FileEntry>, max_files: usize, max_bytes: usize) -> Vec<Vec<FileEntry>> {
    let max_files = max_files.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<FileEntry> = Vec::new();
    let mut current_bytes = 0;
    for file in files {
        let size = file.content.len();
        if !current.is_empty() && (current.len() >= max_files || current_bytes + size > max_bytes) {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += size;
        current.push(file);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Talks to one host.
pub struct TransferClient<T: Transport, C: Clock = SystemClock> {
    transport: T,
    options: TransferOptions,
    clock: C,
}

impl<T: Transport> TransferClient<T, SystemClock> {
    pub fn new(transport: T, options: TransferOptions) -> Self {
        Self::with_clock(transport, options, SystemClock)
    }
}

impl<T: Transport, C: Clock> TransferClient<T, C> {
    pub fn with_clock(transport: T, options: TransferOptions, clock: C) -> Self {
        Self { transport, options, clock }
    }

    pub async fn remote_hashes(&self) -> Result<ArchiveHashMap, TransferError> {
        with_retry(&self.options.retry, "get hashes", move || async move {
            match self.transport.call(Request::GetHashes, self.options.read_timeout).await? {
                Response::Hashes { hashes } => Ok(hashes),
                other => Err(unexpected(other)),
            }
        })
        .await
    }

    /// Changes needed to turn the host's archive into `local`.
    pub async fn diff(&self, local: &ArchiveHashMap) -> Result<ChangeSet, TransferError> {
        let remote = self.remote_hashes().await?;
        Ok(wd_archive::diff(local, &remote))
    }

    /// Last deployment result reported by the host.
    pub async fn status(&self) -> Result<Response, TransferError> {
        with_retry(&self.options.retry, "status", move || async move {
            self.transport.call(Request::Status, self.options.read_timeout).await
        })
        .await
    }

    /// Bring the host's archive in line with the archive at `archive` whose
    /// hashes are `local`, restarting the host when anything changed.
    pub async fn sync(&self, archive: &Path, local: &ArchiveHashMap) -> Result<HostReport, TransferError> {
        let changes = self.diff(local).await?;
        let report = HostReport {
            files_changed: changes.changed.len(),
            files_deleted: changes.deleted.len(),
        };
        if changes.is_empty() {
            tracing::info!("host already up to date");
            return Ok(report);
        }

        let files = load_entries(archive.to_path_buf(), changes.changed).await?;
        let bytes = total_bytes(&files);
        let requested_at_ms = self.clock.epoch_ms();

        let response = if files.len() <= self.options.chunk_max_files
            && bytes <= self.options.chunk_max_bytes
        {
            tracing::info!(files = files.len(), deletions = changes.deleted.len(), bytes, "sending single deploy request");
            let request = Request::Deploy { files, deletions: changes.deleted };
            self.transport.call(request, self.options.deploy_timeout).await
        } else {
            self.send_chunked(files, changes.deleted).await?
        };

        self.settle(response, requested_at_ms).await?;
        Ok(report)
    }

    /// Upload in a chunk session. Returns the outcome of the committing chunk.
    async fn send_chunked(
        &self,
        files: Vec<FileEntry>,
        deletions: Vec<String>,
    ) -> Result<Result<Response, TransferError>, TransferError> {
        let expected = files.len();
        let chunks = plan_chunks(files, self.options.chunk_max_files, self.options.chunk_max_bytes);
        let last = chunks.len().saturating_sub(1);
        tracing::info!(files = expected, chunks = chunks.len(), "sending chunked deploy");

        let mut session_id: Option<SessionId> = None;
        let mut deletions = Some(deletions);
        let mut sent = 0;
        for (index, chunk) in chunks.into_iter().enumerate() {
            sent += chunk.len();
            let commit = index == last;
            let request = Request::Chunk {
                session_id: session_id.clone(),
                files: chunk,
                deletions: deletions.take().unwrap_or_default(),
                expected_file_count: expected,
                commit,
            };
            if commit {
                return Ok(self.transport.call(request, self.options.deploy_timeout).await);
            }

            let accepted = match self.transport.call(request, self.options.deploy_timeout).await {
                Ok(Response::ChunkAccepted { session_id, files_received }) => {
                    Ok((session_id, files_received))
                }
                Ok(Response::Error { message }) => Err(TransferError::Remote(message)),
                Ok(other) => Err(unexpected(other)),
                Err(e) => Err(e),
            };
            match accepted {
                Ok((id, files_received)) if files_received == sent => {
                    tracing::debug!(session_id = %id, files_received, expected, "chunk accepted");
                    session_id = Some(id);
                }
                Ok((id, files_received)) => {
                    self.cancel(&id).await;
                    return Err(TransferError::CountMismatch { expected: sent, received: files_received });
                }
                Err(e) => {
                    if let Some(id) = &session_id {
                        self.cancel(id).await;
                    }
                    return Err(e);
                }
            }
        }
        // Only reachable with no files, which `sync` never sends
        Err(TransferError::Unexpected("empty chunk session".to_string()))
    }

    async fn cancel(&self, session_id: &SessionId) {
        let request = Request::CancelSession { session_id: session_id.clone() };
        if let Err(e) = self.transport.call(request, self.options.read_timeout).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to cancel chunk session");
        }
    }

    /// Turn the response to a mutating request into a final outcome.
    async fn settle(
        &self,
        response: Result<Response, TransferError>,
        requested_at_ms: u64,
    ) -> Result<DeployResult, TransferError> {
        match response {
            Ok(Response::Deployed { result }) => check_result(result),
            Ok(Response::Conflict { message }) => {
                tracing::warn!(%message, "host busy, waiting for deployment status");
                self.await_result(requested_at_ms).await
            }
            Err(TransferError::Timeout) => {
                tracing::warn!("deploy request timed out, waiting for deployment status");
                self.await_result(requested_at_ms).await
            }
            Ok(Response::Error { message }) => Err(TransferError::Remote(message)),
            Ok(other) => Err(unexpected(other)),
            Err(e) => Err(e),
        }
    }

    /// Poll `Status` until the host reports a result that started no earlier
    /// than `requested_at_ms`.
    async fn await_result(&self, requested_at_ms: u64) -> Result<DeployResult, TransferError> {
        let deadline = Instant::now() + self.options.status_wait;
        loop {
            match self.transport.call(Request::Status, self.options.read_timeout).await {
                Ok(Response::Status { last_result: Some(result), .. })
                    if result.started_at_ms >= requested_at_ms =>
                {
                    return check_result(result);
                }
                Ok(Response::Status { lock, .. }) => {
                    if let Some(lock) = lock {
                        tracing::debug!(deployment_id = %lock.deployment_id, step = %lock.step, "deployment still running");
                    }
                }
                Ok(other) => return Err(unexpected(other)),
                Err(e) if e.is_transient() => tracing::debug!(error = %e, "status poll failed"),
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(TransferError::StatusWaitExpired(self.options.status_wait.as_secs()));
            }
            tokio::time::sleep(self.options.status_interval).await;
        }
    }
}

fn check_result(result: DeployResult) -> Result<DeployResult, TransferError> {
    if result.success {
        tracing::info!(deployment_id = %result.deployment_id, message = %result.message, "host deployed");
        return Ok(result);
    }
    Err(TransferError::DeployFailed {
        step: result.failed_step.unwrap_or(DeploymentStep::Init),
        message: result.message,
    })
}

fn unexpected(response: Response) -> TransferError {
    match response {
        Response::Error { message } => TransferError::Remote(message),
        other => TransferError::Unexpected(format!("{other:?}")),
    }
}

async fn load_entries(archive: PathBuf, paths: Vec<String>) -> Result<Vec<FileEntry>, TransferError> {
    tokio::task::spawn_blocking(move || wd_archive::read_entries(&archive, &paths))
        .await
        .map_err(|e| TransferError::Task(e.to_string()))?
        .map_err(TransferError::from)
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
