// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the specs.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use wd_daemon::{DeployService, Listener, SessionStore};
use wd_engine::{FakeProcessManager, RestartOptions, RestartOrchestrator, TransferError, Transport};
use wd_storage::{DeploymentJournal, DeploymentLock};
use wd_wire::{read_response, write_request, Request, Response};

pub use wd_core::{ArchiveHashMap, FileEntry, HostStatus, RolloutStrategy};
pub use wd_engine::{run_rollout, ProcessCall, TransferClient, TransferOptions};

/// Write a WAR (a zip) holding `entries`.
pub fn write_archive(path: &Path, entries: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        zip.start_file(name.to_string(), options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Regular files of a WAR by name.
pub fn read_archive(path: &Path) -> BTreeMap<String, String> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut out = BTreeMap::new();
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).unwrap();
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        out.insert(name, content);
    }
    out
}

pub fn contents(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub const SERVER_ARCHIVE: &[(&str, &str)] = &[
    ("index.html", "<h1>v1</h1>"),
    ("css/site.css", "body{}"),
    ("WEB-INF/web.xml", "<web-app/>"),
];

/// A receiving host: an application server fake behind the daemon's service.
pub struct Host {
    dir: TempDir,
    pub process: FakeProcessManager,
    pub service: Arc<DeployService<FakeProcessManager>>,
}

impl Host {
    pub fn new() -> Self {
        Self::with_archive(SERVER_ARCHIVE)
    }

    pub fn with_archive(entries: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("shop.war");
        write_archive(&archive, entries);

        let process = FakeProcessManager::new().with_app("shop");
        let lock = DeploymentLock::new(dir.path().join("deploy.lock"));
        let journal = Arc::new(DeploymentJournal::new(dir.path().join("journal.json")));
        let options = RestartOptions::new("shop", "/shop", &archive)
            .stop_timeout(Duration::from_secs(1))
            .health_timeout(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(10));
        let orchestrator = RestartOrchestrator::new(
            options,
            process.clone(),
            lock.clone(),
            journal,
            wd_core::SystemClock,
        );
        let sessions = SessionStore::new(Duration::from_secs(1800), 10);
        let service =
            Arc::new(DeployService::new(orchestrator, sessions, lock, Duration::from_secs(600)));
        Self { dir, process, service }
    }

    pub fn archive(&self) -> PathBuf {
        self.dir.path().join("shop.war")
    }

    pub fn files(&self) -> BTreeMap<String, String> {
        read_archive(&self.archive())
    }

    pub fn transport(&self) -> InProcess {
        InProcess { service: Arc::clone(&self.service) }
    }

    pub fn deployed(&self) -> bool {
        self.process.calls().iter().any(|c| matches!(c, ProcessCall::Deploy { .. }))
    }
}

/// Hands requests straight to a host's service.
#[derive(Clone)]
pub struct InProcess {
    service: Arc<DeployService<FakeProcessManager>>,
}

#[async_trait]
impl Transport for InProcess {
    async fn call(&self, request: Request, _timeout: Duration) -> Result<Response, TransferError> {
        Ok(self.service.handle(request).await)
    }
}

/// One TCP connection per request, as the `wardrop` client does.
pub struct Tcp {
    pub addr: String,
}

#[async_trait]
impl Transport for Tcp {
    async fn call(&self, request: Request, timeout: Duration) -> Result<Response, TransferError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| TransferError::Connect { addr: self.addr.clone(), source })?;
        write_request(&mut stream, &request, timeout).await?;
        Ok(read_response(&mut stream, timeout).await?)
    }
}

/// Serve `host` over TCP on an ephemeral port until the token is cancelled.
pub async fn listen(host: &Host) -> (Tcp, CancellationToken) {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::new(tcp, Arc::clone(&host.service), Duration::from_secs(5));
    let addr = listener.local_addr().unwrap().to_string();
    let token = CancellationToken::new();
    tokio::spawn(listener.run(token.clone()));
    (Tcp { addr }, token)
}

/// A local build of the application and its content hashes.
pub struct Build {
    _dir: TempDir,
    pub path: PathBuf,
    pub hashes: ArchiveHashMap,
}

impl Build {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.war");
        write_archive(&path, entries);
        let hashes = wd_archive::compute_hashes(&path).unwrap();
        Self { _dir: dir, path, hashes }
    }
}
