// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types.

crate::define_id! {
    /// Identifies one full-restart sequence; shared by the lock record, the
    /// journal checkpoint and the resulting `DeployResult`.
    pub struct DeploymentId("dep-");
}

crate::define_id! {
    /// Identifies a chunked-transfer session on the receiving host.
    pub struct SessionId("ses-");
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
