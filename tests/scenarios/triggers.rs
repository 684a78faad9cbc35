//! Test: Trigger directory - dispatch, consumption and watch recovery

use crate::helpers::*;
use autobuild::trigger::{DispatchLog, DispatchOutcome, Dispatcher, TriggerWatcher};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn dispatcher(env: &TestEnv, invoker: &Arc<FakeInvoker>) -> Dispatcher {
    Dispatcher::new(
        env.settings.scripts_dir.clone(),
        invoker.clone(),
        DispatchLog::new(Some(env.path().join("daemon.log"))),
    )
}

/// A trigger named after a project runs it once and is consumed
#[tokio::test]
async fn test_trigger_dispatches_project_once() {
    let env = TestEnv::new();
    env.write_project("build-site", &simple_project(&["make"]));
    let triggers = env.path().join("webhooks");
    fs::create_dir(&triggers).unwrap();
    fs::write(triggers.join("build-site"), "payload").unwrap();

    let invoker = Arc::new(FakeInvoker::default());
    let dispatcher = dispatcher(&env, &invoker);

    let outcomes = dispatcher.scan(&triggers).await;
    assert_eq!(
        outcomes,
        vec![DispatchOutcome::Invoked {
            project: "build-site".to_string(),
            exit_code: Some(0)
        }]
    );
    assert_eq!(invoker.calls(), vec!["build-site"]);
    assert!(!triggers.join("build-site").exists());

    // Nothing left to dispatch on the next scan
    assert!(dispatcher.scan(&triggers).await.is_empty());
    assert_eq!(invoker.calls().len(), 1);

    let log = fs::read_to_string(env.path().join("daemon.log")).unwrap();
    assert!(log.contains("built build-site"));
}

/// Invalid and unknown names are consumed without a build
#[tokio::test]
async fn test_rejected_triggers_are_still_removed() {
    let env = TestEnv::new();
    let triggers = env.path().join("webhooks");
    fs::create_dir(&triggers).unwrap();
    fs::write(triggers.join("not valid!"), "").unwrap();
    fs::write(triggers.join("ghost"), "").unwrap();

    let invoker = Arc::new(FakeInvoker::default());
    let outcomes = dispatcher(&env, &invoker).scan(&triggers).await;

    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::UnknownProject("ghost".to_string()),
            DispatchOutcome::InvalidName("not valid!".to_string()),
        ]
    );
    assert!(invoker.calls().is_empty());
    assert_eq!(fs::read_dir(&triggers).unwrap().count(), 0);
}

/// A path-like name never reaches the invoker
#[tokio::test]
async fn test_path_traversal_name_is_rejected() {
    let env = TestEnv::new();
    let invoker = Arc::new(FakeInvoker::default());
    let outcome = dispatcher(&env, &invoker).dispatch("../etc/passwd").await;

    assert_eq!(outcome, DispatchOutcome::InvalidName("../etc/passwd".to_string()));
    assert!(invoker.calls().is_empty());
}

/// The watcher scans on start-up and on every notification
#[tokio::test]
async fn test_watcher_dispatches_on_change() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["make"]));
    env.write_project("docs", &simple_project(&["make"]));
    let triggers = env.path().join("webhooks");
    fs::create_dir(&triggers).unwrap();
    fs::write(triggers.join("site"), "").unwrap();

    let invoker = Arc::new(FakeInvoker::default());
    let source = Arc::new(FakeWatchSource::default());
    let watcher = TriggerWatcher::new(&triggers, source.clone(), dispatcher(&env, &invoker))
        .with_poll_interval(Duration::from_millis(20));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let drive = async {
        // Written before the watch existed
        wait_until(|| invoker.calls() == vec!["site"]).await;

        fs::write(triggers.join("docs"), "").unwrap();
        source.notify();
        source.notify();
        wait_until(|| invoker.calls().len() == 2).await;

        let _ = stop_tx.send(());
    };
    tokio::join!(
        watcher.run(async {
            let _ = stop_rx.await;
        }),
        drive
    );

    assert_eq!(invoker.calls(), vec!["site", "docs"]);
    assert_eq!(source.watch_count(), 1);
}

/// A removed and recreated directory is watched again
#[tokio::test]
async fn test_watcher_recovers_from_directory_replacement() {
    let env = TestEnv::new();
    env.write_project("site", &simple_project(&["make"]));
    let triggers = env.path().join("webhooks");
    fs::create_dir(&triggers).unwrap();

    let invoker = Arc::new(FakeInvoker::default());
    let source = Arc::new(FakeWatchSource::default());
    let watcher = TriggerWatcher::new(&triggers, source.clone(), dispatcher(&env, &invoker))
        .with_poll_interval(Duration::from_millis(20));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let drive = async {
        wait_until(|| source.watch_count() == 1).await;

        fs::remove_dir(&triggers).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::create_dir(&triggers).unwrap();
        wait_until(|| source.watch_count() == 2).await;

        fs::write(triggers.join("site"), "").unwrap();
        source.notify();
        wait_until(|| invoker.calls().len() == 1).await;

        let _ = stop_tx.send(());
    };
    tokio::join!(
        watcher.run(async {
            let _ = stop_rx.await;
        }),
        drive
    );

    assert_eq!(invoker.calls(), vec!["site"]);
}
