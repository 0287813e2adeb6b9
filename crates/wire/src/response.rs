// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use wd_core::{ArchiveHashMap, DeployResult, DeploymentId, DeploymentStep, SessionId};

/// Response from a receiving host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Response {
    /// Version handshake response
    Hello { version: String },

    Hashes { hashes: ArchiveHashMap },

    /// A restart ran to completion or failure
    Deployed { result: DeployResult },

    /// Chunk stored; `files_received` is cumulative for the session
    ChunkAccepted { session_id: SessionId, files_received: usize },

    SessionCancelled { session_id: SessionId },

    Status {
        #[serde(default)]
        last_result: Option<DeployResult>,
        #[serde(default)]
        lock: Option<LockHolder>,
    },

    /// Another deployment is already running on this host
    Conflict { message: String },

    /// Error response
    Error { message: String },
}

/// The deployment currently holding a host's lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockHolder {
    pub deployment_id: DeploymentId,
    pub pid: u32,
    pub started_at_ms: u64,
    pub step: DeploymentStep,
}
