//! Test: Step failure - abort on first failing step

use crate::helpers::*;
use autobuild::core::RunOutcome;

const THREE_STEPS: &str = r#"
git: git@example.com:org/site.git
branch: main
steps: [A, B, C]
A: { image: alpine, script: ["touch a.out"] }
B: { image: alpine, script: ["echo testing", "false"] }
C: { image: alpine, script: ["touch c.out"] }
"#;

/// B fails: A's effects stay, C never runs, the run is Failed at B
#[tokio::test]
async fn test_failing_step_aborts_remaining_steps() {
    let env = TestEnv::new();
    env.write_project("site", THREE_STEPS);

    let report = env.runner().run_project("site", false).await;
    match &report.outcome {
        RunOutcome::Failed { step, error } => {
            assert_eq!(step.as_deref(), Some("B"));
            assert!(error.contains("exit status 1"));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let source = env.workspace("site").source_dir();
    assert!(source.join("a.out").exists());
    assert!(!source.join("c.out").exists());
    assert_eq!(env.runtime.run_count(), 2);
    assert_eq!(
        env.store("site").last_failed().unwrap(),
        report.revision
    );
    assert_eq!(env.store("site").last_processed().unwrap(), None);
}

/// Step output lands in both the cumulative and the latest-run log
#[tokio::test]
async fn test_step_output_is_logged() {
    let env = TestEnv::new();
    env.write_project("site", THREE_STEPS);
    env.runner().run_project("site", false).await;

    let workspace = env.workspace("site");
    for log in [workspace.log_file(), workspace.last_log_file()] {
        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("\tsite.B\tINFO\techo testing"), "{}", content);
        assert!(content.contains("\tsite\tERROR\tBuild failed"));
    }
}

/// Each run starts the latest-run log afresh
#[tokio::test]
async fn test_latest_log_holds_only_last_run() {
    let env = TestEnv::new();
    env.write_project("site", THREE_STEPS);
    let runner = env.runner();

    runner.run_project("site", false).await;
    runner.run_project("site", true).await;

    let workspace = env.workspace("site");
    let cumulative = std::fs::read_to_string(workspace.log_file()).unwrap();
    let latest = std::fs::read_to_string(workspace.last_log_file()).unwrap();
    assert_eq!(cumulative.matches("Build failed").count(), 2);
    assert_eq!(latest.matches("Build failed").count(), 1);
}

/// Steps with a build context run in the image built for them
#[tokio::test]
async fn test_dockerfile_step_builds_image() {
    let env = TestEnv::new();
    env.write_project(
        "site",
        r#"
git: git@example.com:org/site.git
branch: main
steps: [Compile]
Compile: { dockerfile: images/rust, script: [make] }
"#,
    );

    let report = env.runner().run_project("site", false).await;
    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert_eq!(
        *env.runtime.builds.lock().unwrap(),
        vec!["autobuild__site_compile".to_string()]
    );
    assert_eq!(env.runtime.last_run().image, "autobuild__site_compile");
}

/// An invalid description fails without fetching anything
#[tokio::test]
async fn test_invalid_description_fails_before_fetch() {
    let env = TestEnv::new();
    env.write_project(
        "site",
        r#"
git: git@example.com:org/site.git
branch: main
steps: [build]
build: { script: [make] }
"#,
    );

    let report = env.runner().run_project("site", false).await;
    assert!(report.outcome.is_failed());
    assert_eq!(report.revision, None);
    assert_eq!(env.fetcher.mirror_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}
