// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store of partially transferred change sets.
//!
//! Sessions expire `ttl` after creation, checked lazily on every access.
//! The store holds at most `max_sessions`; creating one more evicts the
//! oldest by creation time.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use wd_core::{Clock, FileEntry, SessionId, SystemClock};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} not found or expired")]
    NotFound(SessionId),

    #[error("session received {received} files but {expected} were announced")]
    CountMismatch { expected: usize, received: usize },
}

/// Accumulated chunks of one transfer.
#[derive(Debug, Clone)]
pub struct ChunkedSession {
    pub id: SessionId,
    pub created_at_ms: u64,
    pub files: Vec<FileEntry>,
    pub deletions: Vec<String>,
    pub expected_file_count: usize,
    // Creation order; breaks ties between sessions created in the same millisecond
    seq: u64,
}

impl ChunkedSession {
    pub fn files_received(&self) -> usize {
        self.files.len()
    }

    /// Check the received file count against the announced one.
    pub fn verify_count(&self) -> Result<(), SessionError> {
        if self.files.len() == self.expected_file_count {
            Ok(())
        } else {
            Err(SessionError::CountMismatch {
                expected: self.expected_file_count,
                received: self.files.len(),
            })
        }
    }
}

struct Inner {
    sessions: HashMap<SessionId, ChunkedSession>,
    next_seq: u64,
}

pub struct SessionStore<C: Clock = SystemClock> {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_sessions: usize,
    clock: C,
}

impl SessionStore<SystemClock> {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self::with_clock(ttl, max_sessions, SystemClock)
    }
}

impl<C: Clock> SessionStore<C> {
    pub fn with_clock(ttl: Duration, max_sessions: usize, clock: C) -> Self {
        Self {
            inner: Mutex::new(Inner { sessions: HashMap::new(), next_seq: 0 }),
            ttl,
            max_sessions: max_sessions.max(1),
            clock,
        }
    }

    /// Open a session, making room for it first.
    pub fn create(&self, deletions: Vec<String>, expected_file_count: usize) -> SessionId {
        let now = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        self.remove_expired(&mut inner, now);
        while inner.sessions.len() >= self.max_sessions {
            let Some(oldest) = inner
                .sessions
                .values()
                .min_by_key(|s| (s.created_at_ms, s.seq))
                .map(|s| s.id.clone())
            else {
                break;
            };
            inner.sessions.remove(&oldest);
            tracing::warn!(session_id = %oldest, "session limit reached, evicted oldest session");
        }

        let id = SessionId::new();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.sessions.insert(
            id.clone(),
            ChunkedSession {
                id: id.clone(),
                created_at_ms: now,
                files: Vec::new(),
                deletions,
                expected_file_count,
                seq,
            },
        );
        tracing::debug!(session_id = %id, expected_file_count, "session created");
        id
    }

    /// Snapshot of a live session.
    pub fn get(&self, id: &SessionId) -> Option<ChunkedSession> {
        let now = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        self.live(&mut inner, id, now).cloned()
    }

    /// Append files to a live session; false if it is unknown or expired.
    pub fn add_files(&self, id: &SessionId, files: Vec<FileEntry>) -> bool {
        let now = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        match self.live(&mut inner, id, now) {
            Some(session) => {
                session.files.extend(files);
                true
            }
            None => false,
        }
    }

    /// Remove a session and hand it to the caller.
    pub fn take(&self, id: &SessionId) -> Result<ChunkedSession, SessionError> {
        let now = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        if self.live(&mut inner, id, now).is_none() {
            return Err(SessionError::NotFound(id.clone()));
        }
        inner.sessions.remove(id).ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// Put back a session taken for a commit that could not run. It keeps its
    /// creation time, so the TTL still counts from the first chunk.
    pub fn restore(&self, session: ChunkedSession) {
        tracing::debug!(session_id = %session.id, "session restored");
        self.inner.lock().sessions.insert(session.id.clone(), session);
    }

    /// Idempotent.
    pub fn delete(&self, id: &SessionId) {
        self.inner.lock().sessions.remove(id);
    }

    /// Drop every expired session; returns how many went.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        self.remove_expired(&mut inner, now)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, session: &ChunkedSession, now: u64) -> bool {
        now.saturating_sub(session.created_at_ms) > self.ttl.as_millis() as u64
    }

    fn live<'a>(
        &self,
        inner: &'a mut Inner,
        id: &SessionId,
        now: u64,
    ) -> Option<&'a mut ChunkedSession> {
        let expired = self.is_expired(inner.sessions.get(id)?, now);
        if expired {
            inner.sessions.remove(id);
            tracing::debug!(session_id = %id, "session expired");
            return None;
        }
        inner.sessions.get_mut(id)
    }

    fn remove_expired(&self, inner: &mut Inner, now: u64) -> usize {
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| !self.is_expired(s, now));
        let removed = before - inner.sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "expired sessions removed");
        }
        removed
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
