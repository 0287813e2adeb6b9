// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Large change sets travel as a session of chunks committed at the end.

use crate::prelude::*;
use wd_core::SessionId;
use wd_wire::{Request, Response};

fn many_files(count: usize) -> Vec<(String, String)> {
    (0..count).map(|i| (format!("static/page{i:02}.html"), format!("<p>{i}</p>"))).collect()
}

fn as_refs(files: &[(String, String)]) -> Vec<(&str, &str)> {
    files.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

#[tokio::test]
async fn chunked_sync_applies_everything_once() {
    let host = Host::new();
    let files = many_files(7);
    let build = Build::new(&as_refs(&files));
    let options = TransferOptions::default().chunk_max_files(3);
    let client = TransferClient::new(host.transport(), options);

    let report = client.sync(&build.path, &build.hashes).await.unwrap();

    assert_eq!((report.files_changed, report.files_deleted), (7, 3));
    assert_eq!(host.files(), contents(&as_refs(&files)));
    assert!(host.service.sessions().is_empty());
    let deploys = host
        .process
        .calls()
        .iter()
        .filter(|c| matches!(c, ProcessCall::Deploy { .. }))
        .count();
    assert_eq!(deploys, 1);
}

#[tokio::test]
async fn chunked_sync_over_tcp() {
    let host = Host::new();
    let files = many_files(5);
    let build = Build::new(&as_refs(&files));
    let (tcp, shutdown) = listen(&host).await;
    let client = TransferClient::new(tcp, TransferOptions::default().chunk_max_bytes(16));

    let report = client.sync(&build.path, &build.hashes).await.unwrap();

    assert_eq!(report.files_changed, 5);
    assert_eq!(host.files().len(), 5);
    shutdown.cancel();
}

async fn open_session(host: &Host, expected: usize) -> SessionId {
    let response = host
        .service
        .handle(Request::Chunk {
            session_id: None,
            files: vec![FileEntry::new("index.html", "<h1>v2</h1>")],
            deletions: vec!["css/site.css".to_string()],
            expected_file_count: expected,
            commit: false,
        })
        .await;
    let Response::ChunkAccepted { session_id, files_received } = response else {
        panic!("expected ChunkAccepted, got {response:?}");
    };
    assert_eq!(files_received, 1);
    session_id
}

#[tokio::test]
async fn commit_with_missing_files_is_rejected() {
    let host = Host::new();
    let id = open_session(&host, 3).await;

    let response = host
        .service
        .handle(Request::Chunk {
            session_id: Some(id.clone()),
            files: vec![FileEntry::new("js/app.js", "run()")],
            deletions: vec![],
            expected_file_count: 3,
            commit: true,
        })
        .await;

    let Response::Error { message } = response else {
        panic!("expected Error, got {response:?}");
    };
    assert!(message.contains("received 2 files but 3 were announced"), "{message}");
    assert_eq!(host.files(), contents(SERVER_ARCHIVE));
    assert!(!host.deployed());
    assert!(host.service.sessions().get(&id).is_none());
}

#[tokio::test]
async fn cancelled_session_cannot_be_committed() {
    let host = Host::new();
    let id = open_session(&host, 1).await;

    let cancelled = host.service.handle(Request::CancelSession { session_id: id.clone() }).await;
    assert_eq!(cancelled, Response::SessionCancelled { session_id: id.clone() });

    let response = host
        .service
        .handle(Request::Chunk {
            session_id: Some(id),
            files: vec![],
            deletions: vec![],
            expected_file_count: 1,
            commit: true,
        })
        .await;

    assert!(matches!(response, Response::Error { .. }), "{response:?}");
    assert_eq!(host.files(), contents(SERVER_ARCHIVE));
}

#[tokio::test]
async fn unknown_session_is_an_error() {
    let host = Host::new();

    let response = host
        .service
        .handle(Request::Chunk {
            session_id: Some(SessionId::from_string("no-such-session")),
            files: vec![FileEntry::new("a.txt", "x")],
            deletions: vec![],
            expected_file_count: 1,
            commit: false,
        })
        .await;

    let Response::Error { message } = response else {
        panic!("expected Error, got {response:?}");
    };
    assert!(message.contains("no-such-session"));
}
