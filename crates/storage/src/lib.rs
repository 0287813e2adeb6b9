// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wd-storage: the cross-process state of a deploying host.
//!
//! - [`DeploymentLock`]: one restart at a time, with stale-lock takeover
//! - [`ScopedSignalGuard`]: defers SIGTERM while the lock is held
//! - [`DeploymentJournal`]: step checkpoint for crash diagnostics

mod atomic;
mod journal;
mod lock;
mod signal;

pub use journal::{DeploymentInfo, DeploymentJournal, JournalCheckpoint, JournalError};
pub use lock::{
    pid_alive, DeploymentLock, HeldLock, LockError, LockRecord, DEFAULT_REDELIVER_AFTER,
    DEFAULT_STALE_AFTER,
};
pub use signal::{install_os_dispatch, HandlerId, ScopedSignalGuard, SignalRegistry};
