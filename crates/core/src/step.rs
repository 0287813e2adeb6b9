// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Steps of the full-restart sequence.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One step of the full-restart sequence, in execution order.
///
/// The derived `Ord` follows declaration order, so `a < b` means `a` runs
/// before `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStep {
    Init,
    WarUpdate,
    Undeploy,
    Stop,
    Kill,
    Start,
    Deploy,
    Verify,
    Complete,
}

crate::simple_display! {
    DeploymentStep {
        Init => "init",
        WarUpdate => "war-update",
        Undeploy => "undeploy",
        Stop => "stop",
        Kill => "kill",
        Start => "start",
        Deploy => "deploy",
        Verify => "verify",
        Complete => "complete",
    }
}

impl DeploymentStep {
    pub const ALL: [DeploymentStep; 9] = [
        Self::Init,
        Self::WarUpdate,
        Self::Undeploy,
        Self::Stop,
        Self::Kill,
        Self::Start,
        Self::Deploy,
        Self::Verify,
        Self::Complete,
    ];

    /// The step that follows this one, `None` after `Complete`.
    pub fn next(self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Whether the server has not yet been touched at this step.
    ///
    /// Only the archive may have changed before `undeploy`; after that the
    /// running server is in an intermediate state.
    pub fn is_resumable(self) -> bool {
        matches!(self, Self::Init | Self::WarUpdate)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown deployment step: {0}")]
pub struct UnknownStep(pub String);

impl FromStr for DeploymentStep {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.to_string() == s)
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
