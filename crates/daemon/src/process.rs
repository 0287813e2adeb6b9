// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process manager backed by the shell commands in `server.toml`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use wd_engine::{ProcessError, ProcessManager};

use crate::config::{CommandSet, ServerConfig};

/// Drives the application server through configured command lines.
///
/// Server processes are identified by `process_pattern` appearing in their
/// `/proc/<pid>/cmdline`.
#[derive(Debug, Clone)]
pub struct CommandProcessManager {
    commands: CommandSet,
    process_pattern: String,
    command_timeout: Duration,
    proc_root: PathBuf,
}

impl CommandProcessManager {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            commands: config.commands.clone(),
            process_pattern: config.process_pattern.clone(),
            command_timeout: config.command_timeout(),
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Scan a different procfs root.
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    async fn run(&self, operation: &'static str, command: &str) -> Result<Output, ProcessError> {
        tracing::info!(operation, %command, "running server command");
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command).kill_on_drop(true);
        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(ProcessError::Spawn { operation, source }),
            Err(_) => {
                return Err(ProcessError::Timeout { operation, secs: self.command_timeout.as_secs() })
            }
        };
        if !output.stderr.is_empty() {
            tracing::debug!(operation, stderr = %String::from_utf8_lossy(&output.stderr), "command stderr");
        }
        Ok(output)
    }

    /// Run a command that must exit zero.
    async fn run_checked(&self, operation: &'static str, command: &str) -> Result<Output, ProcessError> {
        let output = self.run(operation, command).await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = match output.status.code() {
            Some(code) if stderr.is_empty() => format!("exit code {code}"),
            Some(code) => format!("exit code {code}: {stderr}"),
            None => "terminated by signal".to_string(),
        };
        Err(ProcessError::Failed { operation, message })
    }

    fn matching_pids(&self) -> Vec<i32> {
        find_processes(&self.proc_root, &self.process_pattern, std::process::id())
    }
}

/// Pids under `proc_root` whose command line contains `pattern`, excluding
/// `own_pid`.
pub fn find_processes(proc_root: &Path, pattern: &str, own_pid: u32) -> Vec<i32> {
    let Ok(entries) = std::fs::read_dir(proc_root) else {
        return Vec::new();
    };
    let mut pids: Vec<i32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .filter(|pid| *pid > 0 && *pid as u32 != own_pid)
        .filter(|pid| {
            // Processes can exit between listing and reading
            std::fs::read(proc_root.join(pid.to_string()).join("cmdline"))
                .map(|raw| {
                    let cmdline: String =
                        String::from_utf8_lossy(&raw).replace('\0', " ").trim_end().to_string();
                    cmdline.contains(pattern)
                })
                .unwrap_or(false)
        })
        .collect();
    pids.sort_unstable();
    pids
}

/// Substitute `{archive}`, `{app}` and `{context_root}` in a command line.
pub fn expand_command(template: &str, archive: &Path, app_name: &str, context_root: &str) -> String {
    template
        .replace("{archive}", &archive.display().to_string())
        .replace("{app}", app_name)
        .replace("{context_root}", context_root)
}

#[async_trait]
impl ProcessManager for CommandProcessManager {
    async fn is_running(&self) -> Result<bool, ProcessError> {
        Ok(!self.matching_pids().is_empty())
    }

    async fn start(&self) -> Result<(), ProcessError> {
        self.run_checked("start", &self.commands.start).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        self.run_checked("stop", &self.commands.stop).await?;
        Ok(())
    }

    async fn aggressive_stop(&self) -> Result<usize, ProcessError> {
        let mut killed = 0;
        for pid in self.matching_pids() {
            match kill(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) => {
                    tracing::warn!(pid, pattern = %self.process_pattern, "sent SIGKILL");
                    killed += 1;
                }
                Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => {
                    return Err(ProcessError::Failed {
                        operation: "aggressive_stop",
                        message: format!("kill {pid}: {e}"),
                    })
                }
            }
        }
        Ok(killed)
    }

    async fn deploy(&self, archive: &Path, app_name: &str, context_root: &str) -> Result<(), ProcessError> {
        let command = expand_command(&self.commands.deploy, archive, app_name, context_root);
        self.run_checked("deploy", &command).await?;
        Ok(())
    }

    async fn undeploy(&self, app_name: &str) -> Result<(), ProcessError> {
        let command = expand_command(&self.commands.undeploy, Path::new(""), app_name, "");
        self.run_checked("undeploy", &command).await?;
        Ok(())
    }

    async fn list_applications(&self) -> Result<Vec<String>, ProcessError> {
        let output = self.run_checked("list_applications", &self.commands.list_applications).await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect())
    }

    /// A non-zero exit means unhealthy rather than an error.
    async fn is_healthy(&self) -> Result<bool, ProcessError> {
        let output = self.run("is_healthy", &self.commands.health).await?;
        Ok(output.status.success())
    }

    async fn prepare_config(&self) -> Result<(), ProcessError> {
        match &self.commands.prepare_config {
            Some(command) => {
                self.run_checked("prepare_config", command).await?;
            }
            None => tracing::debug!("no prepare_config command configured"),
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
