// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server definition read from `server.toml`.
//!
//! ```toml
//! app_name = "shop"
//! context_root = "/shop"
//! archive_path = "/srv/shop/shop.war"
//! process_pattern = "catalina.base=/srv/shop"
//!
//! [commands]
//! start = "/srv/shop/bin/startup.sh"
//! stop = "/srv/shop/bin/shutdown.sh"
//! deploy = "asadmin deploy --name {app} --contextroot {context_root} {archive}"
//! undeploy = "asadmin undeploy {app}"
//! list_applications = "asadmin list-applications --terse"
//! health = "curl -sf http://localhost:8080/health"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use wd_engine::RestartOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("server config not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid server config {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// Shell command lines used to drive the application server.
///
/// `deploy` and `undeploy` may reference `{archive}`, `{app}` and
/// `{context_root}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSet {
    pub start: String,
    pub stop: String,
    pub deploy: String,
    pub undeploy: String,
    pub list_applications: String,
    pub health: String,
    #[serde(default)]
    pub prepare_config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub app_name: String,
    pub context_root: String,
    pub archive_path: PathBuf,
    /// Substring of a server process command line
    pub process_pattern: String,
    pub commands: CommandSet,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on any single configured command
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_health_timeout_secs() -> u64 {
    180
}

fn default_stop_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_command_timeout_secs() -> u64 {
    120
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()))
            }
            Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
        };
        let config = Self::parse(&contents)
            .map_err(|message| ConfigError::Invalid { path: path.to_path_buf(), message })?;
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self, String> {
        let config: ServerConfig = toml::from_str(contents).map_err(|e| e.to_string())?;
        if config.app_name.trim().is_empty() {
            return Err("app_name must not be empty".into());
        }
        if config.process_pattern.trim().is_empty() {
            return Err("process_pattern must not be empty".into());
        }
        if config.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be positive".into());
        }
        Ok(config)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn restart_options(&self) -> RestartOptions {
        RestartOptions::new(&self.app_name, &self.context_root, &self.archive_path)
            .stop_timeout(Duration::from_secs(self.stop_timeout_secs))
            .health_timeout(Duration::from_secs(self.health_timeout_secs))
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
