// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One host, one request: diff, transfer, mutate, restart.

use crate::prelude::*;
use wd_wire::{Request, Response};

const NEW_BUILD: &[(&str, &str)] = &[
    ("index.html", "<h1>v2</h1>"),
    ("WEB-INF/web.xml", "<web-app/>"),
    ("js/app.js", "run()"),
];

#[tokio::test]
async fn sync_sends_only_changes_and_restarts_the_host() {
    let host = Host::new();
    let build = Build::new(NEW_BUILD);
    let client = TransferClient::new(host.transport(), TransferOptions::default());

    let changes = client.diff(&build.hashes).await.unwrap();
    assert_eq!(changes.changed, vec!["index.html".to_string(), "js/app.js".to_string()]);
    assert_eq!(changes.deleted, vec!["css/site.css".to_string()]);

    let report = client.sync(&build.path, &build.hashes).await.unwrap();

    assert_eq!((report.files_changed, report.files_deleted), (2, 1));
    assert_eq!(host.files(), contents(NEW_BUILD));
    assert!(host.deployed());
    let result = host.service.last_result().unwrap();
    assert!(result.success);
    assert_eq!((result.files_changed, result.files_deleted), (2, 1));
}

#[tokio::test]
async fn second_sync_is_a_no_op() {
    let host = Host::new();
    let build = Build::new(NEW_BUILD);
    let client = TransferClient::new(host.transport(), TransferOptions::default());
    client.sync(&build.path, &build.hashes).await.unwrap();
    let calls_after_first = host.process.calls().len();

    let report = client.sync(&build.path, &build.hashes).await.unwrap();

    assert_eq!((report.files_changed, report.files_deleted), (0, 0));
    assert_eq!(host.process.calls().len(), calls_after_first);
}

#[tokio::test]
async fn unsafe_entry_path_fails_without_touching_the_archive() {
    let host = Host::new();

    let response = host
        .service
        .handle(Request::Deploy {
            files: vec![FileEntry::new("../../etc/passwd", "root::0:0")],
            deletions: vec![],
        })
        .await;

    let Response::Deployed { result } = response else {
        panic!("expected Deployed, got {response:?}");
    };
    assert!(!result.success);
    assert_eq!(host.files(), contents(SERVER_ARCHIVE));
    assert!(!host.deployed());
}

#[tokio::test]
async fn failed_start_reports_the_step() {
    let host = Host::new();
    host.process.fail("start", "port 8080 in use");
    let build = Build::new(NEW_BUILD);
    let client = TransferClient::new(host.transport(), TransferOptions::default());

    let err = client.sync(&build.path, &build.hashes).await.unwrap_err();

    assert!(
        matches!(&err, wd_engine::TransferError::DeployFailed { step, .. } if *step == wd_core::DeploymentStep::Start),
        "{err}"
    );
    assert!(!host.service.last_result().unwrap().success);
}

#[tokio::test]
async fn status_over_tcp_reports_the_last_result() {
    let host = Host::new();
    let (tcp, shutdown) = listen(&host).await;
    let build = Build::new(NEW_BUILD);
    let client = TransferClient::new(tcp, TransferOptions::default());

    client.sync(&build.path, &build.hashes).await.unwrap();
    let status = client.status().await.unwrap();

    let Response::Status { last_result: Some(result), lock: None } = status else {
        panic!("expected a result and a free lock, got {status:?}");
    };
    assert!(result.success);
    assert_eq!(host.files(), contents(NEW_BUILD));
    shutdown.cancel();
}
