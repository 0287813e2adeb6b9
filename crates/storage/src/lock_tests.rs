// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use tempfile::TempDir;
use wd_core::FakeClock;
use yare::parameterized;

/// A pid that never exists (above the default pid_max).
const DEAD_PID: u32 = i32::MAX as u32;

fn setup() -> (TempDir, PathBuf, FakeClock) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deploy.lock");
    (dir, path, FakeClock::new())
}

fn write_record(path: &Path, pid: u32, started_at_ms: u64, id: &str) {
    let record = LockRecord {
        pid,
        started_at_ms,
        deployment_id: DeploymentId::from_string(id),
        step: DeploymentStep::Stop,
    };
    std::fs::write(path, serde_json::to_vec(&record).unwrap()).unwrap();
}

fn read_record(path: &Path) -> LockRecord {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[parameterized(
    zero = { 0, false },
    beyond_i32 = { u32::MAX, false },
    unused = { DEAD_PID, false },
)]
fn pid_alive_rejects_non_processes(pid: u32, expected: bool) {
    assert_eq!(pid_alive(pid), expected);
}

#[test]
fn pid_alive_sees_current_process() {
    assert!(pid_alive(std::process::id()));
}

#[test]
fn acquire_writes_record_for_current_process() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock.clone());
    let id = DeploymentId::new();

    let held = lock.acquire(&id).unwrap();

    let on_disk = read_record(&path);
    assert_eq!(on_disk, *held.record());
    assert_eq!(on_disk.pid, std::process::id());
    assert_eq!(on_disk.started_at_ms, clock.epoch_ms());
    assert_eq!(on_disk.step, DeploymentStep::Init);
    assert_eq!(on_disk.deployment_id, id);
}

#[test]
fn second_acquire_fails_while_held() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock.clone());
    let first = DeploymentId::new();
    let _held = lock.acquire(&first).unwrap();
    clock.advance(Duration::from_secs(42));

    let err = lock.acquire(&DeploymentId::new()).err().unwrap();

    match err {
        LockError::AlreadyInProgress { deployment_id, pid, age_secs, step } => {
            assert_eq!(deployment_id, first);
            assert_eq!(pid, std::process::id());
            assert_eq!(age_secs, 42);
            assert_eq!(step, DeploymentStep::Init);
        }
        other => panic!("expected AlreadyInProgress, got {other:?}"),
    }
}

#[test]
fn acquire_takes_over_lock_older_than_threshold() {
    let (_dir, path, clock) = setup();
    write_record(&path, std::process::id(), clock.epoch_ms(), "dep-old");
    clock.advance(Duration::from_secs(601));

    let lock = DeploymentLock::with_clock(&path, clock.clone());
    let id = DeploymentId::new();
    let held = lock.acquire(&id).unwrap();

    assert_eq!(held.record().deployment_id, id);
    assert_eq!(read_record(&path).deployment_id, id);
}

#[test]
fn acquire_keeps_lock_exactly_at_threshold() {
    let (_dir, path, clock) = setup();
    write_record(&path, std::process::id(), clock.epoch_ms(), "dep-old");
    clock.advance(Duration::from_secs(600));

    let lock = DeploymentLock::with_clock(&path, clock.clone());
    assert!(matches!(lock.acquire(&DeploymentId::new()), Err(LockError::AlreadyInProgress { .. })));
}

#[test]
fn acquire_takes_over_lock_of_dead_process() {
    let (_dir, path, clock) = setup();
    write_record(&path, DEAD_PID, clock.epoch_ms(), "dep-crashed");

    let lock = DeploymentLock::with_clock(&path, clock);
    let id = DeploymentId::new();
    lock.acquire(&id).unwrap();

    assert_eq!(read_record(&path).deployment_id, id);
}

#[test]
fn acquire_replaces_unreadable_lock() {
    let (_dir, path, clock) = setup();
    std::fs::write(&path, b"{ not json").unwrap();

    let lock = DeploymentLock::with_clock(&path, clock);
    let id = DeploymentId::new();
    lock.acquire(&id).unwrap();

    assert_eq!(read_record(&path).deployment_id, id);
}

#[test]
fn custom_stale_threshold_applies() {
    let (_dir, path, clock) = setup();
    write_record(&path, std::process::id(), clock.epoch_ms(), "dep-old");
    clock.advance(Duration::from_secs(11));

    let lock = DeploymentLock::with_clock(&path, clock).stale_after(Duration::from_secs(10));
    assert!(lock.acquire(&DeploymentId::new()).is_ok());
}

#[test]
fn is_locked_reports_live_holder() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock);
    let id = DeploymentId::new();
    let _held = lock.acquire(&id).unwrap();

    let record = lock.is_locked(Duration::from_secs(600)).unwrap().unwrap();
    assert_eq!(record.deployment_id, id);
}

#[test]
fn is_locked_without_file_is_none() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock);
    assert!(lock.is_locked(Duration::from_secs(600)).unwrap().is_none());
}

#[test]
fn is_locked_removes_stale_record() {
    let (_dir, path, clock) = setup();
    write_record(&path, DEAD_PID, clock.epoch_ms(), "dep-crashed");
    let lock = DeploymentLock::with_clock(&path, clock);

    assert!(lock.is_locked(Duration::from_secs(600)).unwrap().is_none());
    assert!(!path.exists());
}

#[test]
fn is_locked_past_max_age_leaves_live_lock_in_place() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock.clone());
    let _held = lock.acquire(&DeploymentId::from_string("dep-first")).unwrap();
    clock.advance(Duration::from_secs(5));

    assert!(lock.is_locked(Duration::from_secs(4)).unwrap().is_none());
    assert!(path.exists());
    assert_eq!(read_record(&path).deployment_id, "dep-first");

    let err = lock.acquire(&DeploymentId::from_string("dep-second")).err().unwrap();
    assert!(matches!(err, LockError::AlreadyInProgress { ref deployment_id, .. } if *deployment_id == "dep-first"));
}

#[test]
fn is_locked_removes_record_past_stale_threshold() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock.clone()).stale_after(Duration::from_secs(60));
    let held = lock.acquire(&DeploymentId::new()).unwrap();
    clock.advance(Duration::from_secs(61));

    assert!(lock.is_locked(Duration::from_secs(600)).unwrap().is_none());
    assert!(!path.exists());
    // Releasing after a takeover-by-cleanup is harmless
    assert!(!held.release());
}

#[test]
fn update_step_rewrites_record() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock);
    let mut held = lock.acquire(&DeploymentId::new()).unwrap();

    held.update_step(DeploymentStep::Kill);

    assert_eq!(held.record().step, DeploymentStep::Kill);
    assert_eq!(read_record(&path).step, DeploymentStep::Kill);
}

#[test]
fn release_removes_file_and_allows_reacquire() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock);
    let held = lock.acquire(&DeploymentId::new()).unwrap();

    assert!(!held.release());
    assert!(!path.exists());
    assert!(lock.acquire(&DeploymentId::new()).is_ok());
}

#[test]
fn drop_releases_lock() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock);
    {
        let _held = lock.acquire(&DeploymentId::new()).unwrap();
        assert!(path.exists());
    }
    assert!(!path.exists());
}

#[test]
fn release_leaves_lock_taken_over_by_another_deployment() {
    let (_dir, path, clock) = setup();
    let lock = DeploymentLock::with_clock(&path, clock.clone());
    let held = lock.acquire(&DeploymentId::new()).unwrap();
    write_record(&path, std::process::id(), clock.epoch_ms(), "dep-other");

    held.release();

    assert_eq!(read_record(&path).deployment_id, "dep-other");
}

#[test]
fn held_lock_defers_termination_until_release() {
    let (_dir, path, clock) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    let fallback_log = Arc::clone(&log);
    let registry = Arc::new(SignalRegistry::new(move || fallback_log.lock().push("fallback")));
    let handler_log = Arc::clone(&log);
    registry.register(move || handler_log.lock().push("shutdown"));

    let lock = DeploymentLock::with_clock(&path, clock)
        .defer_signals(Arc::clone(&registry), Duration::ZERO);
    let held = lock.acquire(&DeploymentId::new()).unwrap();

    registry.deliver();
    assert!(held.signal_pending());
    assert!(log.lock().is_empty());

    assert!(held.release());
    assert!(!path.exists());
    assert_eq!(registry.handler_count(), 1);

    // Re-delivery runs on a helper thread outside a runtime
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while log.lock().is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(*log.lock(), vec!["shutdown"]);
}

#[test]
fn release_without_signal_does_not_redeliver() {
    let (_dir, path, clock) = setup();
    let registry = Arc::new(SignalRegistry::new(|| {}));
    let lock = DeploymentLock::with_clock(&path, clock).defer_signals(registry, Duration::ZERO);
    let held = lock.acquire(&DeploymentId::new()).unwrap();

    assert!(!held.signal_pending());
    assert!(!held.release());
}
