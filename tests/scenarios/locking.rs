//! Test: Build lock - concurrent runs of one project

use crate::helpers::*;
use autobuild::core::{RunOutcome, SkipReason};
use autobuild::persistence::BuildLock;
use std::time::Duration;

/// A run that finds the lock held is locked out and leaves source/ alone
#[tokio::test]
async fn test_held_lock_locks_out_run() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["make"]));
    let workspace = env.workspace("site");
    workspace.ensure().unwrap();

    let _held = BuildLock::acquire(&workspace.lock_file(), false, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    let report = env.runner().run_project("site", false).await;
    assert_eq!(report.outcome, RunOutcome::Skipped(SkipReason::LockedOut));
    assert!(!workspace.source_dir().exists());
    assert_eq!(env.fetcher.checkouts(), 0);
    assert_eq!(env.runtime.run_count(), 0);
    assert_eq!(env.store("site").last_processed().unwrap(), None);
    assert_eq!(env.store("site").last_failed().unwrap(), None);
    assert!(!workspace.last_log_file().exists());
}

/// Of two overlapping runs exactly one builds
#[tokio::test]
async fn test_concurrent_runs_build_once() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["make"]));
    env.runtime.set_delay(Duration::from_millis(200));
    let runner = env.runner();

    let (a, b) = tokio::join!(
        runner.run_project("site", false),
        runner.run_project("site", false)
    );

    let mut outcomes = vec![a.outcome, b.outcome];
    outcomes.sort_by_key(|o| format!("{:?}", o));
    assert_eq!(
        outcomes,
        vec![RunOutcome::Skipped(SkipReason::LockedOut), RunOutcome::Succeeded]
    );
    assert_eq!(env.runtime.run_count(), 1);
    assert_eq!(env.fetcher.checkouts(), 1);
}

/// The lock is released after a failed run
#[tokio::test]
async fn test_lock_released_after_failure() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["false"]));

    let report = env.runner().run_project("site", false).await;
    assert!(report.outcome.is_failed());

    let lock = BuildLock::acquire(&env.workspace("site").lock_file(), false, Duration::ZERO)
        .await
        .unwrap();
    assert!(lock.is_some());
}
