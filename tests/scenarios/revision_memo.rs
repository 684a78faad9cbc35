//! Test: Revision memoization - skip, retry and force behavior

use crate::helpers::*;
use autobuild::core::{RunOutcome, SkipReason};

/// A second run at the same revision is skipped without touching the source
#[tokio::test]
async fn test_second_run_at_same_revision_is_skipped() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["make"]));
    let runner = env.runner();

    let first = runner.run_project("site", false).await;
    assert_eq!(first.outcome, RunOutcome::Succeeded);
    let processed = env.store("site").last_processed().unwrap();
    assert_eq!(processed.as_deref(), first.revision.as_deref());

    let second = runner.run_project("site", false).await;
    assert_eq!(second.outcome, RunOutcome::Skipped(SkipReason::AlreadyProcessed));
    assert_eq!(second.revision, first.revision);

    // Revision resolved again, but nothing checked out or run
    assert_eq!(env.fetcher.checkouts(), 1);
    assert_eq!(env.runtime.run_count(), 1);
    assert_eq!(env.store("site").last_processed().unwrap(), processed);
    assert_eq!(env.store("site").last_failed().unwrap(), None);
}

/// A failed revision is not retried until forced
#[tokio::test]
async fn test_failed_revision_is_not_retried() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["false"]));
    let runner = env.runner();

    let first = runner.run_project("site", false).await;
    assert!(first.outcome.is_failed());
    assert_eq!(
        env.store("site").last_failed().unwrap().as_deref(),
        first.revision.as_deref()
    );

    let second = runner.run_project("site", false).await;
    assert_eq!(second.outcome, RunOutcome::Skipped(SkipReason::AlreadyFailed));
    assert_eq!(env.runtime.run_count(), 1);

    let forced = runner.run_project("site", true).await;
    assert!(forced.outcome.is_failed());
    assert_eq!(env.runtime.run_count(), 2);
    assert_eq!(env.fetcher.checkouts(), 2);
}

/// A new revision runs even though the previous one failed
#[tokio::test]
async fn test_new_revision_runs_after_failure() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["false"]));
    let runner = env.runner();

    assert!(runner.run_project("site", false).await.outcome.is_failed());

    env.write_project("site", &simple_project(&["make"]));
    env.fetcher.set_revision("2222222222222222222222222222222222222222");
    let report = runner.run_project("site", false).await;
    assert_eq!(report.outcome, RunOutcome::Succeeded);

    // Markers are independent: the old failure stays recorded
    let store = env.store("site");
    assert_eq!(
        store.last_processed().unwrap().as_deref(),
        Some("2222222222222222222222222222222222222222")
    );
    assert_eq!(
        store.last_failed().unwrap().as_deref(),
        Some("1111111111111111111111111111111111111111")
    );
}

/// Force re-runs an already processed revision
#[tokio::test]
async fn test_force_reruns_processed_revision() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["make"]));
    let runner = env.runner();

    runner.run_project("site", false).await;
    let forced = runner.run_project("site", true).await;

    assert_eq!(forced.outcome, RunOutcome::Succeeded);
    assert_eq!(env.runtime.run_count(), 2);
}

/// A fetch failure fails the run before any revision is known
#[tokio::test]
async fn test_fetch_failure_records_nothing() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["make"]));
    env.fetcher.fail_fetch(true);

    let report = env.runner().run_project("site", false).await;
    assert!(report.outcome.is_failed());
    assert_eq!(report.revision, None);
    assert_eq!(env.store("site").last_failed().unwrap(), None);
    assert_eq!(env.runtime.run_count(), 0);
}

/// Batches run every project and survive a failing one
#[tokio::test]
async fn test_batch_continues_after_failure() {
    let env = TestEnv::new();
    env.write_project("alpha", &simple_project(&["false"]));
    env.write_project("beta", &simple_project(&["make"]));

    let reports = env.runner().run_batch(&[], false).await.unwrap();
    let names: Vec<_> = reports.iter().map(|r| r.project.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!(reports[0].outcome.is_failed());
    assert_eq!(reports[1].outcome, RunOutcome::Succeeded);
}

/// The checkout is the resolved commit even if the branch moves before it
#[tokio::test]
async fn test_checkout_matches_recorded_revision() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["make"]));
    env.fetcher.advance_after_resolve("2222222222222222222222222222222222222222");
    let runner = env.runner();

    let report = runner.run_project("site", false).await;
    assert_eq!(report.outcome, RunOutcome::Succeeded);

    let checked_out = std::fs::read_to_string(env.workspace("site").source_dir().join("README")).unwrap();
    assert_eq!(Some(checked_out.as_str()), report.revision.as_deref());
    assert_eq!(
        env.store("site").last_processed().unwrap().as_deref(),
        Some("1111111111111111111111111111111111111111")
    );
}
