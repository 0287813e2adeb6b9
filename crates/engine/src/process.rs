// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application-server process management seam.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from process-manager operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{operation} failed: {message}")]
    Failed { operation: &'static str, message: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("failed to spawn {operation}: {source}")]
    Spawn {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Control over the application server on this host.
#[async_trait]
pub trait ProcessManager: Clone + Send + Sync + 'static {
    /// Whether any matching server process is running.
    async fn is_running(&self) -> Result<bool, ProcessError>;

    async fn start(&self) -> Result<(), ProcessError>;

    /// Ask the server to shut down gracefully.
    async fn stop(&self) -> Result<(), ProcessError>;

    /// Force-terminate every remaining matching server process. Returns how
    /// many were signalled.
    async fn aggressive_stop(&self) -> Result<usize, ProcessError>;

    async fn deploy(&self, archive: &Path, app_name: &str, context_root: &str) -> Result<(), ProcessError>;

    async fn undeploy(&self, app_name: &str) -> Result<(), ProcessError>;

    async fn list_applications(&self) -> Result<Vec<String>, ProcessError>;

    async fn is_healthy(&self) -> Result<bool, ProcessError>;

    /// Re-materialize runtime configuration before a start.
    async fn prepare_config(&self) -> Result<(), ProcessError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ProcessError, ProcessManager};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Recorded process-manager call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ProcessCall {
        IsRunning,
        Start,
        Stop,
        AggressiveStop,
        Deploy { archive: PathBuf, app_name: String, context_root: String },
        Undeploy { app_name: String },
        ListApplications,
        IsHealthy,
        PrepareConfig,
    }

    impl ProcessCall {
        fn operation(&self) -> &'static str {
            match self {
                ProcessCall::IsRunning => "is_running",
                ProcessCall::Start => "start",
                ProcessCall::Stop => "stop",
                ProcessCall::AggressiveStop => "aggressive_stop",
                ProcessCall::Deploy { .. } => "deploy",
                ProcessCall::Undeploy { .. } => "undeploy",
                ProcessCall::ListApplications => "list_applications",
                ProcessCall::IsHealthy => "is_healthy",
                ProcessCall::PrepareConfig => "prepare_config",
            }
        }
    }

    struct FakeProcessState {
        running: bool,
        apps: Vec<String>,
        calls: Vec<ProcessCall>,
        failures: HashMap<&'static str, String>,
        /// `is_healthy` answers false this many times after a start
        unhealthy_polls: u32,
        polls_left: u32,
        /// `stop` leaves the process running
        stop_hangs: bool,
        /// `deploy` does not register the application
        deploy_silently_fails: bool,
        /// A kill is followed by the process coming back once it has been
        /// seen stopped, as under a supervisor
        respawns: u32,
        respawn_pending: bool,
        /// Only the first `aggressive_stop` is effective
        resists_later_kills: bool,
        kills: u32,
    }

    /// In-memory application server for tests.
    ///
    /// Starts running with no applications. `start` makes it running,
    /// `stop`/`aggressive_stop` stop it, `deploy` registers the application.
    #[derive(Clone)]
    pub struct FakeProcessManager {
        inner: Arc<Mutex<FakeProcessState>>,
    }

    impl Default for FakeProcessManager {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeProcessState {
                    running: true,
                    apps: Vec::new(),
                    calls: Vec::new(),
                    failures: HashMap::new(),
                    unhealthy_polls: 0,
                    polls_left: 0,
                    stop_hangs: false,
                    deploy_silently_fails: false,
                    respawns: 0,
                    respawn_pending: false,
                    resists_later_kills: false,
                    kills: 0,
                })),
            }
        }
    }

    impl FakeProcessManager {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-register an application as deployed.
        pub fn with_app(self, app_name: &str) -> Self {
            self.inner.lock().apps.push(app_name.to_string());
            self
        }

        pub fn set_running(&self, running: bool) {
            self.inner.lock().running = running;
        }

        /// Make `operation` (a trait method name) fail with `message`.
        pub fn fail(&self, operation: &'static str, message: &str) {
            self.inner.lock().failures.insert(operation, message.to_string());
        }

        pub fn unhealthy_for(&self, polls: u32) {
            self.inner.lock().unhealthy_polls = polls;
        }

        pub fn stop_hangs(&self) {
            self.inner.lock().stop_hangs = true;
        }

        pub fn deploy_silently_fails(&self) {
            self.inner.lock().deploy_silently_fails = true;
        }

        /// After the first kill, the process comes back once the kill has
        /// been confirmed, so it is running again when start checks.
        pub fn reappears_after_kill(&self) {
            self.inner.lock().respawns = 1;
        }

        /// Every `aggressive_stop` after the first leaves the process running.
        pub fn resists_later_kills(&self) {
            self.inner.lock().resists_later_kills = true;
        }

        pub fn calls(&self) -> Vec<ProcessCall> {
            self.inner.lock().calls.clone()
        }

        pub fn apps(&self) -> Vec<String> {
            self.inner.lock().apps.clone()
        }

        pub fn is_running_now(&self) -> bool {
            self.inner.lock().running
        }

        fn record(&self, call: ProcessCall) -> Result<(), ProcessError> {
            let mut state = self.inner.lock();
            let operation = call.operation();
            state.calls.push(call);
            match state.failures.get(operation) {
                Some(message) => Err(ProcessError::Failed { operation, message: message.clone() }),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ProcessManager for FakeProcessManager {
        async fn is_running(&self) -> Result<bool, ProcessError> {
            self.record(ProcessCall::IsRunning)?;
            let mut state = self.inner.lock();
            let running = state.running;
            if !running && state.respawn_pending {
                state.respawn_pending = false;
                state.running = true;
            }
            Ok(running)
        }

        async fn start(&self) -> Result<(), ProcessError> {
            self.record(ProcessCall::Start)?;
            let mut state = self.inner.lock();
            state.running = true;
            state.polls_left = state.unhealthy_polls;
            Ok(())
        }

        async fn stop(&self) -> Result<(), ProcessError> {
            self.record(ProcessCall::Stop)?;
            let mut state = self.inner.lock();
            if !state.stop_hangs {
                state.running = false;
            }
            Ok(())
        }

        async fn aggressive_stop(&self) -> Result<usize, ProcessError> {
            self.record(ProcessCall::AggressiveStop)?;
            let mut state = self.inner.lock();
            state.kills += 1;
            if state.resists_later_kills && state.kills > 1 {
                return Ok(0);
            }
            let killed = usize::from(state.running);
            state.running = false;
            if state.respawns > 0 {
                state.respawns -= 1;
                state.respawn_pending = true;
            }
            Ok(killed)
        }

        async fn deploy(
            &self,
            archive: &Path,
            app_name: &str,
            context_root: &str,
        ) -> Result<(), ProcessError> {
            self.record(ProcessCall::Deploy {
                archive: archive.to_path_buf(),
                app_name: app_name.to_string(),
                context_root: context_root.to_string(),
            })?;
            let mut state = self.inner.lock();
            if !state.deploy_silently_fails && !state.apps.iter().any(|a| a == app_name) {
                state.apps.push(app_name.to_string());
            }
            Ok(())
        }

        async fn undeploy(&self, app_name: &str) -> Result<(), ProcessError> {
            self.record(ProcessCall::Undeploy { app_name: app_name.to_string() })?;
            self.inner.lock().apps.retain(|a| a != app_name);
            Ok(())
        }

        async fn list_applications(&self) -> Result<Vec<String>, ProcessError> {
            self.record(ProcessCall::ListApplications)?;
            Ok(self.inner.lock().apps.clone())
        }

        async fn is_healthy(&self) -> Result<bool, ProcessError> {
            self.record(ProcessCall::IsHealthy)?;
            let mut state = self.inner.lock();
            if !state.running {
                return Ok(false);
            }
            if state.polls_left > 0 {
                state.polls_left -= 1;
                return Ok(false);
            }
            Ok(true)
        }

        async fn prepare_config(&self) -> Result<(), ProcessError> {
            self.record(ProcessCall::PrepareConfig)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcessManager, ProcessCall};
