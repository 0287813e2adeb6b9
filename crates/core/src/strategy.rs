// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rollout strategy grammar.
//!
//! ```text
//! strategy := "sequential" | "parallel" | "canary" | batches
//! batches  := count ("+" count)* ("+" "R")?
//! count    := [1-9][0-9]*
//! ```
//!
//! `canary` is shorthand for `1+R`. A batch list always aborts on the first
//! failing batch; `sequential` and `parallel` never abort.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of one canary batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchSize {
    Count(usize),
    /// Every host not claimed by an earlier batch.
    Remainder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutStrategy {
    Sequential,
    Parallel,
    Canary { batches: Vec<BatchSize> },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("empty rollout strategy")]
    Empty,
    #[error("invalid batch size '{0}' (expected a positive count or 'R')")]
    InvalidBatch(String),
    #[error("remainder marker 'R' must be the last batch")]
    RemainderNotLast,
}

impl RolloutStrategy {
    pub fn canary(batches: Vec<BatchSize>) -> Self {
        Self::Canary { batches }
    }

    pub fn is_canary(&self) -> bool {
        matches!(self, Self::Canary { .. })
    }

    /// Split `hosts` into ordered batches.
    ///
    /// Sequential yields one batch per host, parallel a single batch. Canary
    /// batches that would be empty are dropped; hosts left over when the
    /// list has no trailing `R` form an implicit final batch.
    pub fn partition<H: Clone>(&self, hosts: &[H]) -> Vec<Vec<H>> {
        if hosts.is_empty() {
            return Vec::new();
        }
        match self {
            Self::Sequential => hosts.iter().map(|h| vec![h.clone()]).collect(),
            Self::Parallel => vec![hosts.to_vec()],
            Self::Canary { batches } => {
                let mut out = Vec::new();
                let mut rest = hosts;
                for batch in batches {
                    if rest.is_empty() {
                        break;
                    }
                    let take = match batch {
                        BatchSize::Count(n) => (*n).min(rest.len()),
                        BatchSize::Remainder => rest.len(),
                    };
                    let (head, tail) = rest.split_at(take);
                    out.push(head.to_vec());
                    rest = tail;
                }
                if !rest.is_empty() {
                    out.push(rest.to_vec());
                }
                out
            }
        }
    }
}

impl FromStr for RolloutStrategy {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "" => return Err(StrategyError::Empty),
            "sequential" => return Ok(Self::Sequential),
            "parallel" => return Ok(Self::Parallel),
            "canary" => {
                return Ok(Self::canary(vec![BatchSize::Count(1), BatchSize::Remainder]));
            }
            _ => {}
        }

        let tokens: Vec<&str> = s.split('+').map(str::trim).collect();
        let last = tokens.len() - 1;
        let mut batches = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            if token.eq_ignore_ascii_case("r") {
                if i != last {
                    return Err(StrategyError::RemainderNotLast);
                }
                batches.push(BatchSize::Remainder);
                continue;
            }
            match token.parse::<usize>() {
                Ok(n) if n > 0 => batches.push(BatchSize::Count(n)),
                _ => return Err(StrategyError::InvalidBatch(token.to_string())),
            }
        }
        Ok(Self::canary(batches))
    }
}

impl fmt::Display for RolloutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Parallel => f.write_str("parallel"),
            Self::Canary { batches } => {
                let parts: Vec<String> = batches
                    .iter()
                    .map(|b| match b {
                        BatchSize::Count(n) => n.to_string(),
                        BatchSize::Remainder => "R".to_string(),
                    })
                    .collect();
                f.write_str(&parts.join("+"))
            }
        }
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
