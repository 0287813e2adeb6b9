// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::write_archive;
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;
use wd_core::{DeploymentId, FakeClock};

type Handler = dyn Fn(&Request) -> Result<Response, TransferError> + Send + Sync;

/// Transport answering from a closure and recording every request.
#[derive(Clone)]
struct FakeTransport {
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl FakeTransport {
    fn new(handler: impl Fn(&Request) -> Result<Response, TransferError> + Send + Sync + 'static) -> Self {
        Self { handler: Arc::new(handler), requests: Arc::new(Mutex::new(Vec::new())) }
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.requests.lock().iter().filter(|r| pred(*r)).count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn call(&self, request: Request, _timeout: Duration) -> Result<Response, TransferError> {
        self.requests.lock().push(request.clone());
        (self.handler)(&request)
    }
}

struct Setup {
    _dir: TempDir,
    archive: PathBuf,
    local: ArchiveHashMap,
}

/// Local archive with `a.txt` (unchanged remotely), `b.txt` (changed) and
/// `c.txt`..`f.txt` (new); the remote also has `gone.txt`.
fn setup() -> (Setup, ArchiveHashMap) {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("app.war");
    write_archive(
        &archive,
        &[("a.txt", "a"), ("b.txt", "b2"), ("c.txt", "c"), ("d.txt", "d"), ("e.txt", "e"), ("f.txt", "f")],
    );
    let local = wd_archive::compute_hashes(&archive).unwrap();
    let remote = ArchiveHashMap::from([
        ("a.txt".to_string(), local["a.txt"].clone()),
        ("b.txt".to_string(), "stale".to_string()),
        ("gone.txt".to_string(), "x".to_string()),
    ]);
    (Setup { _dir: dir, archive, local }, remote)
}

fn result(started_at_ms: u64, success: bool) -> DeployResult {
    DeployResult {
        deployment_id: DeploymentId::from_string("dep-remote"),
        success,
        message: if success { "ok".into() } else { "verify failed: app missing".into() },
        failed_step: (!success).then_some(DeploymentStep::Verify),
        started_at_ms,
        finished_at_ms: started_at_ms + 10,
        files_changed: 5,
        files_deleted: 1,
        timings: vec![],
    }
}

fn client(transport: FakeTransport, options: TransferOptions) -> TransferClient<FakeTransport, FakeClock> {
    TransferClient::with_clock(transport, options, FakeClock::new())
}

fn fast_options() -> TransferOptions {
    TransferOptions::default()
        .status_wait(Duration::from_secs(30))
        .status_interval(Duration::from_secs(5))
}

#[tokio::test]
async fn up_to_date_host_gets_no_deploy() {
    let (setup, _) = setup();
    let local = setup.local.clone();
    let transport = FakeTransport::new(move |_| Ok(Response::Hashes { hashes: local.clone() }));

    let report = client(transport.clone(), fast_options()).sync(&setup.archive, &setup.local).await.unwrap();

    assert_eq!(report, HostReport::default());
    assert_eq!(transport.requests(), vec![Request::GetHashes]);
}

#[tokio::test]
async fn small_change_set_is_one_deploy_request() {
    let (setup, remote) = setup();
    let transport = FakeTransport::new(move |request| match request {
        Request::GetHashes => Ok(Response::Hashes { hashes: remote.clone() }),
        Request::Deploy { .. } => Ok(Response::Deployed { result: result(2_000_000, true) }),
        other => panic!("unexpected {other:?}"),
    });

    let report = client(transport.clone(), fast_options()).sync(&setup.archive, &setup.local).await.unwrap();

    assert_eq!(report, HostReport { files_changed: 5, files_deleted: 1 });
    let requests = transport.requests();
    let Request::Deploy { files, deletions } = &requests[1] else {
        panic!("expected Deploy, got {:?}", requests[1]);
    };
    let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["b.txt", "c.txt", "d.txt", "e.txt", "f.txt"]);
    assert_eq!(files[0].content, b"b2");
    assert_eq!(deletions, &vec!["gone.txt".to_string()]);
}

#[tokio::test]
async fn large_change_set_is_sent_in_chunks() {
    let (setup, remote) = setup();
    let received = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&received);
    let transport = FakeTransport::new(move |request| match request {
        Request::GetHashes => Ok(Response::Hashes { hashes: remote.clone() }),
        Request::Chunk { files, commit, .. } => {
            let mut received = counter.lock();
            *received += files.len();
            if *commit {
                Ok(Response::Deployed { result: result(2_000_000, true) })
            } else {
                Ok(Response::ChunkAccepted {
                    session_id: SessionId::from_string("ses-1"),
                    files_received: *received,
                })
            }
        }
        other => panic!("unexpected {other:?}"),
    });

    let options = fast_options().chunk_max_files(2);
    let report = client(transport.clone(), options).sync(&setup.archive, &setup.local).await.unwrap();

    assert_eq!(report.files_changed, 5);
    assert_eq!(*received.lock(), 5);
    let chunks: Vec<_> = transport
        .requests()
        .into_iter()
        .filter_map(|r| match r {
            Request::Chunk { session_id, files, deletions, expected_file_count, commit } => {
                Some((session_id, files.len(), deletions, expected_file_count, commit))
            }
            _ => None,
        })
        .collect();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0], (None, 2, vec!["gone.txt".to_string()], 5, false));
    assert_eq!(chunks[1], (Some(SessionId::from_string("ses-1")), 2, vec![], 5, false));
    assert_eq!(chunks[2], (Some(SessionId::from_string("ses-1")), 1, vec![], 5, true));
}

#[tokio::test]
async fn chunk_count_mismatch_cancels_session() {
    let (setup, remote) = setup();
    let transport = FakeTransport::new(move |request| match request {
        Request::GetHashes => Ok(Response::Hashes { hashes: remote.clone() }),
        Request::Chunk { .. } => Ok(Response::ChunkAccepted {
            session_id: SessionId::from_string("ses-1"),
            files_received: 1,
        }),
        Request::CancelSession { session_id } => {
            Ok(Response::SessionCancelled { session_id: session_id.clone() })
        }
        other => panic!("unexpected {other:?}"),
    });

    let options = fast_options().chunk_max_files(2);
    let err = client(transport.clone(), options).sync(&setup.archive, &setup.local).await.unwrap_err();

    assert!(matches!(err, TransferError::CountMismatch { expected: 2, received: 1 }));
    assert_eq!(transport.count(|r| matches!(r, Request::CancelSession { .. })), 1);
}

#[tokio::test(start_paused = true)]
async fn conflict_polls_status_until_newer_result() {
    let (setup, remote) = setup();
    let polls = Arc::new(Mutex::new(0));
    let poll_count = Arc::clone(&polls);
    let transport = FakeTransport::new(move |request| match request {
        Request::GetHashes => Ok(Response::Hashes { hashes: remote.clone() }),
        Request::Deploy { .. } => Ok(Response::Conflict { message: "deployment running".into() }),
        Request::Status => {
            let mut polls = poll_count.lock();
            *polls += 1;
            // The first two polls still see the previous deployment
            let started = if *polls < 3 { 500 } else { 2_000_000 };
            Ok(Response::Status { last_result: Some(result(started, true)), lock: None })
        }
        other => panic!("unexpected {other:?}"),
    });

    let report = client(transport.clone(), fast_options()).sync(&setup.archive, &setup.local).await;

    assert!(report.is_ok(), "{report:?}");
    assert_eq!(*polls.lock(), 3);
    assert_eq!(transport.count(|r| matches!(r, Request::Deploy { .. })), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_polls_status_and_reports_failure() {
    let (setup, remote) = setup();
    let transport = FakeTransport::new(move |request| match request {
        Request::GetHashes => Ok(Response::Hashes { hashes: remote.clone() }),
        Request::Deploy { .. } => Err(TransferError::Timeout),
        Request::Status => Ok(Response::Status { last_result: Some(result(1_000_000, false)), lock: None }),
        other => panic!("unexpected {other:?}"),
    });

    let err = client(transport.clone(), fast_options()).sync(&setup.archive, &setup.local).await.unwrap_err();

    match err {
        TransferError::DeployFailed { step, message } => {
            assert_eq!(step, DeploymentStep::Verify);
            assert!(message.contains("app missing"));
        }
        other => panic!("expected DeployFailed, got {other:?}"),
    }
    assert_eq!(transport.count(|r| matches!(r, Request::Deploy { .. })), 1);
}

#[tokio::test(start_paused = true)]
async fn status_wait_gives_up_without_newer_result() {
    let (setup, remote) = setup();
    let transport = FakeTransport::new(move |request| match request {
        Request::GetHashes => Ok(Response::Hashes { hashes: remote.clone() }),
        Request::Deploy { .. } => Err(TransferError::Timeout),
        Request::Status => Ok(Response::Status { last_result: None, lock: None }),
        other => panic!("unexpected {other:?}"),
    });

    let err = client(transport.clone(), fast_options()).sync(&setup.archive, &setup.local).await.unwrap_err();

    assert!(matches!(err, TransferError::StatusWaitExpired(30)));
    // Polls at 0, 5, ..., 30 seconds
    assert_eq!(transport.count(|r| matches!(r, Request::Status)), 7);
}

#[tokio::test]
async fn failed_result_is_reported_with_step() {
    let (setup, remote) = setup();
    let transport = FakeTransport::new(move |request| match request {
        Request::GetHashes => Ok(Response::Hashes { hashes: remote.clone() }),
        Request::Deploy { .. } => Ok(Response::Deployed { result: result(2_000_000, false) }),
        other => panic!("unexpected {other:?}"),
    });

    let err = client(transport, fast_options()).sync(&setup.archive, &setup.local).await.unwrap_err();

    assert!(matches!(err, TransferError::DeployFailed { step: DeploymentStep::Verify, .. }));
}

#[tokio::test(start_paused = true)]
async fn hash_fetch_retries_transient_errors() {
    let attempts = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&attempts);
    let transport = FakeTransport::new(move |_| {
        let mut attempts = counter.lock();
        *attempts += 1;
        if *attempts < 3 {
            Err(TransferError::Timeout)
        } else {
            Ok(Response::Hashes { hashes: ArchiveHashMap::new() })
        }
    });

    let hashes = client(transport, fast_options()).remote_hashes().await.unwrap();

    assert!(hashes.is_empty());
    assert_eq!(*attempts.lock(), 3);
}

#[tokio::test(start_paused = true)]
async fn hash_fetch_gives_up_after_attempts() {
    let transport = FakeTransport::new(|_| Err(TransferError::Timeout));

    let err = client(transport.clone(), fast_options()).remote_hashes().await.unwrap_err();

    assert!(matches!(err, TransferError::Timeout));
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn remote_error_is_not_retried() {
    let transport = FakeTransport::new(|_| Ok(Response::Error { message: "archive missing".into() }));

    let err = client(transport.clone(), fast_options()).remote_hashes().await.unwrap_err();

    assert!(matches!(err, TransferError::Remote(ref m) if m == "archive missing"));
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn plan_chunks_respects_file_and_byte_limits() {
    let files = vec![
        FileEntry::new("a", vec![0u8; 4]),
        FileEntry::new("b", vec![0u8; 4]),
        FileEntry::new("c", vec![0u8; 20]),
        FileEntry::new("d", vec![0u8; 1]),
        FileEntry::new("e", vec![0u8; 1]),
        FileEntry::new("f", vec![0u8; 1]),
    ];

    let chunks = plan_chunks(files, 2, 10);

    let names: Vec<Vec<&str>> =
        chunks.iter().map(|c| c.iter().map(|f| f.path.as_str()).collect()).collect();
    // An oversized file travels alone
    assert_eq!(names, vec![vec!["a", "b"], vec!["c"], vec!["d", "e"], vec!["f"]]);
}

#[test]
fn plan_chunks_of_nothing_is_empty() {
    assert!(plan_chunks(vec![], 10, 10).is_empty());
}

#[test]
fn protocol_timeout_maps_to_transfer_timeout() {
    assert!(matches!(TransferError::from(ProtocolError::Timeout), TransferError::Timeout));
    assert!(TransferError::from(ProtocolError::ConnectionClosed).is_transient());
    assert!(!TransferError::Remote("x".into()).is_transient());
}
