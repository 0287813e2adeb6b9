// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch for the receiving host.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use wd_core::{Clock, DeployResult, DeploymentId, FileEntry, SessionId, SystemClock};
use wd_engine::{ProcessManager, RestartError, RestartOrchestrator};
use wd_storage::{DeploymentLock, LockError};
use wd_wire::{LockHolder, Request, Response, PROTOCOL_VERSION};

use crate::sessions::{SessionError, SessionStore};

/// Answers one request at a time per connection; shared across connections.
pub struct DeployService<P: ProcessManager, C: Clock = SystemClock> {
    orchestrator: RestartOrchestrator<P, C>,
    sessions: SessionStore<C>,
    /// Reads the same lock file the orchestrator takes, for status reports
    lock_probe: DeploymentLock<C>,
    stale_after: Duration,
    last_result: Mutex<Option<DeployResult>>,
}

impl<P: ProcessManager, C: Clock> DeployService<P, C> {
    pub fn new(
        orchestrator: RestartOrchestrator<P, C>,
        sessions: SessionStore<C>,
        lock_probe: DeploymentLock<C>,
        stale_after: Duration,
    ) -> Self {
        Self { orchestrator, sessions, lock_probe, stale_after, last_result: Mutex::new(None) }
    }

    pub fn sessions(&self) -> &SessionStore<C> {
        &self.sessions
    }

    pub fn last_result(&self) -> Option<DeployResult> {
        self.last_result.lock().clone()
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Hello { version } => {
                if version != PROTOCOL_VERSION {
                    tracing::warn!(client = %version, server = PROTOCOL_VERSION, "protocol version mismatch");
                }
                Response::Hello { version: PROTOCOL_VERSION.to_string() }
            }

            Request::GetHashes => self.hashes().await,

            Request::Deploy { files, deletions } => self.deploy(files, deletions).await,

            Request::Chunk { session_id, files, deletions, expected_file_count, commit } => {
                self.chunk(session_id, files, deletions, expected_file_count, commit).await
            }

            Request::CancelSession { session_id } => {
                self.sessions.delete(&session_id);
                tracing::info!(session_id = %session_id, "session cancelled");
                Response::SessionCancelled { session_id }
            }

            Request::Status => Response::Status { last_result: self.last_result(), lock: self.lock_holder() },
        }
    }

    async fn hashes(&self) -> Response {
        let archive = self.orchestrator.options().archive_path().to_path_buf();
        match tokio::task::spawn_blocking(move || wd_archive::compute_hashes(&archive)).await {
            Ok(Ok(hashes)) => Response::Hashes { hashes },
            Ok(Err(e)) => {
                tracing::error!(error = %e, "hashing the deployed archive failed");
                Response::Error { message: e.to_string() }
            }
            Err(e) => Response::Error { message: format!("hashing task failed: {e}") },
        }
    }

    async fn chunk(
        &self,
        session_id: Option<SessionId>,
        files: Vec<FileEntry>,
        deletions: Vec<String>,
        expected_file_count: usize,
        commit: bool,
    ) -> Response {
        let id = match session_id {
            Some(id) => id,
            None => self.sessions.create(deletions, expected_file_count),
        };
        if !self.sessions.add_files(&id, files) {
            return Response::Error { message: SessionError::NotFound(id).to_string() };
        }
        if !commit {
            let files_received = self.sessions.get(&id).map(|s| s.files_received()).unwrap_or(0);
            tracing::debug!(session_id = %id, files_received, "chunk accepted");
            return Response::ChunkAccepted { session_id: id, files_received };
        }

        let mut session = match self.sessions.take(&id) {
            Ok(session) => session,
            Err(e) => return Response::Error { message: e.to_string() },
        };
        if let Err(e) = session.verify_count() {
            tracing::warn!(session_id = %id, error = %e, "commit rejected");
            return Response::Error { message: e.to_string() };
        }
        tracing::info!(session_id = %id, files = session.files.len(), "session committed");

        let files = Arc::new(std::mem::take(&mut session.files));
        let deletions = Arc::new(std::mem::take(&mut session.deletions));
        let response = self.deploy_shared(Arc::clone(&files), Arc::clone(&deletions)).await;
        if matches!(response, Response::Conflict { .. }) {
            // Nothing ran; keep the session so the client can retry or cancel
            session.files = Arc::try_unwrap(files).unwrap_or_else(|shared| shared.as_ref().clone());
            session.deletions = Arc::try_unwrap(deletions).unwrap_or_else(|shared| shared.as_ref().clone());
            self.sessions.restore(session);
        }
        response
    }

    async fn deploy(&self, files: Vec<FileEntry>, deletions: Vec<String>) -> Response {
        self.deploy_shared(Arc::new(files), Arc::new(deletions)).await
    }

    async fn deploy_shared(&self, files: Arc<Vec<FileEntry>>, deletions: Arc<Vec<String>>) -> Response {
        if self.orchestrator.is_busy() {
            return Response::Conflict { message: RestartError::Busy.to_string() };
        }
        match self.orchestrator.run_shared(DeploymentId::new(), files, deletions).await {
            Ok(result) => {
                *self.last_result.lock() = Some(result.clone());
                Response::Deployed { result }
            }
            Err(e @ RestartError::Busy)
            | Err(e @ RestartError::Locked(LockError::AlreadyInProgress { .. })) => {
                tracing::warn!(error = %e, "deploy rejected");
                Response::Conflict { message: e.to_string() }
            }
            Err(e) => {
                tracing::error!(error = %e, "deploy could not start");
                Response::Error { message: e.to_string() }
            }
        }
    }

    fn lock_holder(&self) -> Option<LockHolder> {
        match self.lock_probe.is_locked(self.stale_after) {
            Ok(record) => record.map(|r| LockHolder {
                deployment_id: r.deployment_id,
                pid: r.pid,
                started_at_ms: r.started_at_ms,
                step: r.step,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "could not read deployment lock");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
