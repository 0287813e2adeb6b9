// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures: tar archives and a service wired to fakes.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wd_core::FakeClock;
use wd_engine::{FakeProcessManager, RestartOptions, RestartOrchestrator};
use wd_storage::{DeploymentJournal, DeploymentLock};

use crate::service::DeployService;
use crate::sessions::SessionStore;

pub(crate) fn write_archive(path: &Path, entries: &[(&str, &str)]) {
    let mut builder = tar::Builder::new(std::fs::File::create(path).unwrap());
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content.as_bytes()).unwrap();
    }
    builder.finish().unwrap();
}

/// Regular files of an archive as sorted `(name, content)` pairs.
pub(crate) fn read_archive(path: &Path) -> Vec<(String, String)> {
    let mut archive = tar::Archive::new(std::fs::File::open(path).unwrap());
    let mut out = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path().unwrap().to_string_lossy().trim_start_matches("./").to_string();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        out.push((name, content));
    }
    out.sort();
    out
}

pub(crate) struct ServiceFixture {
    pub dir: TempDir,
    pub process: FakeProcessManager,
    pub clock: FakeClock,
    pub service: Arc<DeployService<FakeProcessManager, FakeClock>>,
}

impl ServiceFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("shop.war");
        write_archive(&archive, &[("index.html", "old"), ("old.css", "body{}")]);

        let clock = FakeClock::new();
        let process = FakeProcessManager::new().with_app("shop");
        let lock = DeploymentLock::with_clock(dir.path().join("deploy.lock"), clock.clone());
        let journal = Arc::new(DeploymentJournal::new(dir.path().join("journal.json")));
        let options = RestartOptions::new("shop", "/shop", &archive)
            .health_timeout(Duration::from_secs(30))
            .poll_interval(Duration::from_secs(1));
        let orchestrator =
            RestartOrchestrator::new(options, process.clone(), lock.clone(), journal, clock.clone());
        let sessions = SessionStore::with_clock(Duration::from_secs(1800), 10, clock.clone());
        let service = Arc::new(DeployService::new(
            orchestrator,
            sessions,
            lock,
            Duration::from_secs(600),
        ));
        Self { dir, process, clock, service }
    }

    pub fn archive(&self) -> PathBuf {
        self.dir.path().join("shop.war")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.path().join("deploy.lock")
    }
}
