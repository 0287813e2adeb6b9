// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use wd_core::{FileEntry, SessionId};

/// Request from the client to a receiving host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Request {
    /// Version handshake
    Hello { version: String },

    /// Content hashes of the currently deployed archive
    GetHashes,

    /// Apply a whole change set in one request and restart
    Deploy {
        files: Vec<FileEntry>,
        #[serde(default)]
        deletions: Vec<String>,
    },

    /// One part of a multi-request transfer.
    ///
    /// The first chunk has no session id and carries the deletions and the
    /// expected file count; the last one sets `commit`.
    Chunk {
        #[serde(default)]
        session_id: Option<SessionId>,
        files: Vec<FileEntry>,
        #[serde(default)]
        deletions: Vec<String>,
        #[serde(default)]
        expected_file_count: usize,
        #[serde(default)]
        commit: bool,
    },

    /// Drop a partially transferred session
    CancelSession { session_id: SessionId },

    /// Last deployment result and current lock holder
    Status,
}

impl Request {
    /// Whether the request may change the deployed application.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Request::Deploy { .. } | Request::Chunk { commit: true, .. })
    }
}
