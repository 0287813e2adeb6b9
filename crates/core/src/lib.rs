// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wd-core: shared types for the wardrop incremental deployer

pub mod macros;

pub mod change;
pub mod clock;
pub mod id;
pub mod outcome;
pub mod step;
pub mod strategy;
pub mod time_fmt;

pub use change::{total_bytes, ArchiveHashMap, ChangeSet, FileEntry};
pub use clock::{Clock, FakeClock, SystemClock};
pub use id::{DeploymentId, SessionId};
pub use outcome::{DeployResult, HostOutcome, HostStatus, RolloutSummary, StepTiming};
pub use step::{DeploymentStep, UnknownStep};
pub use strategy::{BatchSize, RolloutStrategy, StrategyError};
pub use time_fmt::format_elapsed_ms;
