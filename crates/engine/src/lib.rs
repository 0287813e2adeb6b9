// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wd-engine: what a deployment does.
//!
//! - [`RestartOrchestrator`]: the full-restart sequence on a receiving host
//! - [`run_rollout`]: batching a deployment across hosts
//! - [`TransferClient`]: the diff/transfer protocol from the deploying side

mod process;
mod restart;
mod rollout;
mod transfer;

#[cfg(test)]
mod test_helpers;

pub use process::{ProcessError, ProcessManager};
pub use restart::{RestartError, RestartOptions, RestartOrchestrator};
pub use rollout::{run_rollout, HostReport};
pub use transfer::{
    plan_chunks, with_retry, RetryPolicy, TransferClient, TransferError, TransferOptions, Transport,
};

#[cfg(any(test, feature = "test-support"))]
pub use process::{FakeProcessManager, ProcessCall};
