// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-host rollouts against in-process hosts.

use std::collections::HashMap;

use crate::prelude::*;

const BUILD: &[(&str, &str)] = &[("index.html", "<h1>v2</h1>"), ("WEB-INF/web.xml", "<web-app/>")];

struct Fleet {
    hosts: HashMap<String, Host>,
    names: Vec<String>,
}

impl Fleet {
    fn new(names: &[&str]) -> Self {
        Self {
            hosts: names.iter().map(|n| (n.to_string(), Host::new())).collect(),
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn host(&self, name: &str) -> &Host {
        &self.hosts[name]
    }

    async fn roll_out(&self, strategy: &str, build: &Build) -> wd_core::RolloutSummary {
        let strategy: RolloutStrategy = strategy.parse().unwrap();
        run_rollout(&self.names, &strategy, |name| {
            let client = TransferClient::new(self.host(&name).transport(), TransferOptions::default());
            async move { client.sync(&build.path, &build.hashes).await }
        })
        .await
    }
}

#[tokio::test]
async fn parallel_rollout_updates_every_host() {
    let fleet = Fleet::new(&["a", "b", "c"]);
    let build = Build::new(BUILD);

    let summary = fleet.roll_out("parallel", &build).await;

    assert!(summary.all_succeeded());
    assert_eq!(summary.successful, 3);
    for name in ["a", "b", "c"] {
        assert_eq!(fleet.host(name).files(), contents(BUILD), "host {name}");
    }
}

#[tokio::test]
async fn failed_canary_leaves_later_hosts_untouched() {
    let fleet = Fleet::new(&["canary", "b", "c", "d"]);
    fleet.host("canary").process.fail("start", "port 8080 in use");
    let build = Build::new(BUILD);

    let summary = fleet.roll_out("1+R", &build).await;

    assert!(summary.aborted);
    assert_eq!(summary.failed_batch, Some(1));
    assert_eq!((summary.successful, summary.failed, summary.skipped), (0, 1, 3));
    let statuses: Vec<HostStatus> = summary.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![HostStatus::Failed, HostStatus::Skipped, HostStatus::Skipped, HostStatus::Skipped]
    );
    for name in ["b", "c", "d"] {
        assert_eq!(fleet.host(name).files(), contents(SERVER_ARCHIVE), "host {name}");
        assert!(fleet.host(name).process.calls().is_empty(), "host {name}");
    }
}

#[tokio::test]
async fn sequential_rollout_reaches_hosts_after_a_failure() {
    let fleet = Fleet::new(&["a", "b", "c"]);
    fleet.host("b").process.fail("start", "port 8080 in use");
    let build = Build::new(BUILD);

    let summary = fleet.roll_out("sequential", &build).await;

    assert!(!summary.aborted);
    assert_eq!((summary.successful, summary.failed, summary.skipped), (2, 1, 0));
    assert_eq!(summary.outcomes[1].status, HostStatus::Failed);
    assert_eq!(fleet.host("c").files(), contents(BUILD));
}

#[tokio::test]
async fn canary_batches_run_in_order() {
    let fleet = Fleet::new(&["a", "b", "c", "d", "e"]);
    let build = Build::new(BUILD);

    let summary = fleet.roll_out("1+2+R", &build).await;

    assert!(summary.all_succeeded());
    let hosts: Vec<&str> = summary.outcomes.iter().map(|o| o.host.as_str()).collect();
    assert_eq!(hosts, vec!["a", "b", "c", "d", "e"]);
    assert!(summary.outcomes.iter().all(|o| o.files_changed == 1 && o.files_deleted == 1));
}
