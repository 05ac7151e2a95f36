//! Stream controller tests

mod common;

use std::sync::{Arc, Mutex};

use common::{eventually, settle, Recorder, ScriptedConnector};
use deploywatch::errors::ErrorKind;
use deploywatch::models::status::DeploymentStatus;
use deploywatch::models::task::TaskHandle;
use deploywatch::observe::inference::StatusInference;
use deploywatch::observe::session::{ConnectionState, Notice, ObservationMode};
use deploywatch::workers::stream::StreamController;

fn controller(connector: &Arc<ScriptedConnector>) -> (StreamController<ScriptedConnector>, Recorder) {
    let controller = StreamController::new(connector.clone(), StatusInference::default());
    let recorder = Recorder::default();
    controller.on_update(recorder.callback());
    (controller, recorder)
}

fn texts(controller: &StreamController<ScriptedConnector>) -> Vec<String> {
    controller.snapshot().into_iter().map(|l| l.text).collect()
}

#[tokio::test]
async fn test_structured_happy_path() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, recorder) = controller(&connector);

    let task = TaskHandle::with_project("task-1", "shop");
    let session = controller.start(&task).await;
    feed.text(r#"{"logs":["Building..."],"status":"IN_PROGRESS"}"#);
    feed.text(r#"{"logs":["Building...","Deployed"],"status":"SUCCESS"}"#);

    eventually(|| controller.connection_state() == Some(ConnectionState::Closed)).await;

    assert_eq!(controller.status(), DeploymentStatus::Success);
    assert_eq!(texts(&controller), vec!["Building...", "Deployed"]);
    // channel released as soon as the outcome was known
    assert_eq!(connector.probe.closes(), 1);

    let view = recorder.view(task, Some("42"), session, ObservationMode::Stream);
    assert_eq!(view.status, DeploymentStatus::Success);
    assert_eq!(view.lines.len(), 2);
    assert_eq!(view.connection, ConnectionState::Closed);
    assert_eq!(
        view.artifact_url.as_deref(),
        Some("https://buildbox-frontend.s3.ap-south-1.amazonaws.com/42/shop/Frontend/index.html")
    );

    let notices: Vec<Notice> = recorder.all().into_iter().filter_map(|u| u.notice).collect();
    assert_eq!(notices, vec![Notice::TerminalReached(DeploymentStatus::Success)]);
}

#[tokio::test]
async fn test_sentinel_text_failure() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, recorder) = controller(&connector);

    let task = TaskHandle::new("task-1");
    let session = controller.start(&task).await;
    feed.text("Step 1");
    feed.text("Step 2");
    feed.text("__DONE__:FAILED");
    feed.text("ignored after the outcome");

    eventually(|| controller.connection_state() == Some(ConnectionState::Closed)).await;

    assert_eq!(controller.status(), DeploymentStatus::Failed);
    assert_eq!(texts(&controller), vec!["Step 1", "Step 2", "__DONE__:FAILED"]);

    let view = recorder.view(task, Some("42"), session, ObservationMode::Stream);
    assert_eq!(view.status, DeploymentStatus::Failed);
    assert_eq!(view.artifact_url, None);
    assert_eq!(view.error, None);
}

#[tokio::test]
async fn test_frames_keep_arrival_order() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, _recorder) = controller(&connector);

    controller.start(&TaskHandle::new("task-1")).await;
    for i in 0..100 {
        feed.text(&format!("line {}", i));
    }
    feed.text("__BUILD_STATUS__:SUCCESS");

    eventually(|| controller.status() == DeploymentStatus::Success).await;

    let lines = controller.snapshot();
    assert_eq!(lines.len(), 101);
    for (i, line) in lines.iter().take(100).enumerate() {
        assert_eq!(line.sequence, i as u64);
        assert_eq!(line.text, format!("line {}", i));
    }
}

#[tokio::test]
async fn test_blank_and_ambiguous_frames_dropped() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, _recorder) = controller(&connector);

    controller.start(&TaskHandle::new("task-1")).await;
    feed.text("   ");
    feed.text(r#"{"logs":"not a list"}"#);
    feed.binary(&[0xff, 0xfe]);
    feed.text("compiling");
    feed.binary(b"bundling");

    eventually(|| controller.snapshot().len() == 2).await;
    assert_eq!(texts(&controller), vec!["compiling", "bundling"]);
    assert_eq!(controller.connection_state(), Some(ConnectionState::Open));
}

#[tokio::test]
async fn test_status_never_regresses() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, recorder) = controller(&connector);

    controller.start(&TaskHandle::new("task-1")).await;
    feed.text(r#"{"status":"IN_PROGRESS"}"#);
    feed.text(r#"{"status":"PENDING"}"#);
    feed.text("still building");
    feed.text(r#"{"status":"FAILED"}"#);
    feed.text(r#"{"status":"SUCCESS"}"#);

    eventually(|| controller.connection_state() == Some(ConnectionState::Closed)).await;
    assert_eq!(controller.status(), DeploymentStatus::Failed);

    let statuses: Vec<DeploymentStatus> = recorder.all().into_iter().map(|u| u.status).collect();
    let rank = |s: &DeploymentStatus| match s {
        DeploymentStatus::Pending => 0,
        DeploymentStatus::InProgress => 1,
        _ => 2,
    };
    assert!(statuses.windows(2).all(|w| rank(&w[0]) <= rank(&w[1])));
    assert_eq!(statuses.last(), Some(&DeploymentStatus::Failed));
}

#[tokio::test]
async fn test_structured_without_logs_keeps_buffer() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, _recorder) = controller(&connector);

    controller.start(&TaskHandle::new("task-1")).await;
    feed.text("Installing dependencies");
    feed.text(r#"{"status":"IN_PROGRESS"}"#);

    eventually(|| controller.status() == DeploymentStatus::InProgress).await;
    assert_eq!(texts(&controller), vec!["Installing dependencies"]);
}

#[tokio::test]
async fn test_missing_task_id() {
    let connector = Arc::new(ScriptedConnector::new());
    let (controller, recorder) = controller(&connector);

    let session = controller.start(&TaskHandle::new("  ")).await;
    settle().await;

    assert_eq!(connector.probe.connects(), 0);
    assert_eq!(controller.connection_state(), Some(ConnectionState::Errored));

    let view = recorder.view(TaskHandle::new("  "), None, session, ObservationMode::Stream);
    assert_eq!(view.error, Some(ErrorKind::MissingIdentifier));
    assert_eq!(view.error_message(), Some("No task ID provided"));
}

#[tokio::test]
async fn test_transport_error_is_final() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, recorder) = controller(&connector);

    let session = controller.start(&TaskHandle::new("task-1")).await;
    feed.text("Step 1");
    feed.fail("connection reset by peer");
    feed.text("never read");

    eventually(|| controller.connection_state() == Some(ConnectionState::Errored)).await;
    settle().await;

    assert_eq!(texts(&controller), vec!["Step 1"]);
    assert_eq!(connector.probe.closes(), 1);

    let last = recorder.last().unwrap();
    assert_eq!(last.session_id, session);
    assert_eq!(last.error, Some(ErrorKind::TransportError));
    assert_eq!(last.notice, Some(Notice::ConnectionLost));
    assert_eq!(last.status, DeploymentStatus::Pending);
}

#[tokio::test]
async fn test_remote_close_before_outcome() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, recorder) = controller(&connector);

    controller.start(&TaskHandle::new("task-1")).await;
    feed.text("Step 1");
    drop(feed);

    eventually(|| controller.connection_state() == Some(ConnectionState::Errored)).await;
    assert_eq!(
        recorder.last().and_then(|u| u.error),
        Some(ErrorKind::TransportError)
    );
}

#[tokio::test]
async fn test_unknown_task_on_connect() {
    let connector = Arc::new(ScriptedConnector::not_found());
    let (controller, recorder) = controller(&connector);

    controller.start(&TaskHandle::new("task-1")).await;
    eventually(|| controller.connection_state() == Some(ConnectionState::Errored)).await;

    let last = recorder.last().unwrap();
    assert_eq!(last.error, Some(ErrorKind::TaskNotFound));
    assert_eq!(last.notice, Some(Notice::TaskNotFound));
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, recorder) = controller(&connector);

    let session = controller.start(&TaskHandle::new("task-1")).await;
    feed.text("Step 1");
    eventually(|| controller.snapshot().len() == 1).await;

    controller.stop().await;
    controller.stop().await;
    settle().await;

    // channel released exactly once
    assert_eq!(connector.probe.drops(), 1);
    assert_eq!(controller.connection_state(), Some(ConnectionState::Closed));

    let closed = recorder
        .of(session)
        .into_iter()
        .filter(|u| u.connection == ConnectionState::Closed)
        .count();
    assert_eq!(closed, 1);

    // frames arriving after stop are not applied
    feed.text("Step 2");
    settle().await;
    assert_eq!(texts(&controller), vec!["Step 1"]);
}

#[tokio::test]
async fn test_restart_supersedes_previous_session() {
    let connector = Arc::new(ScriptedConnector::new());
    let first_feed = connector.feed();
    let second_feed = connector.feed();
    let (controller, recorder) = controller(&connector);

    let first = controller.start(&TaskHandle::new("task-1")).await;
    first_feed.text("old build");
    eventually(|| controller.snapshot().len() == 1).await;

    let second = controller.start(&TaskHandle::new("task-2")).await;
    assert_ne!(first, second);
    assert_eq!(controller.session_id(), Some(second));
    assert!(controller.snapshot().is_empty());

    first_feed.text("late line");
    second_feed.text("new build");
    eventually(|| controller.snapshot().len() == 1).await;
    settle().await;

    assert_eq!(texts(&controller), vec!["new build"]);
    assert_eq!(connector.probe.drops(), 1);
    assert!(recorder
        .of(first)
        .iter()
        .all(|u| u.lines.iter().all(|l| l.text != "late line")));
}

#[tokio::test]
async fn test_drop_releases_channel() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let (controller, _recorder) = controller(&connector);

    controller.start(&TaskHandle::new("task-1")).await;
    feed.text("Step 1");
    eventually(|| controller.snapshot().len() == 1).await;

    drop(controller);
    eventually(|| connector.probe.drops() == 1).await;
}

#[tokio::test]
async fn test_callback_can_read_controller_state() {
    let connector = Arc::new(ScriptedConnector::new());
    let feed = connector.feed();
    let controller = Arc::new(StreamController::new(
        connector.clone(),
        StatusInference::default(),
    ));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = Arc::downgrade(&controller);
    controller.on_update(move |update| {
        if let Some(controller) = handle.upgrade() {
            sink.lock().unwrap().push((
                update.connection,
                controller.snapshot().len(),
                controller.status(),
                controller.connection_state(),
            ));
        }
    });

    controller.start(&TaskHandle::new("task-1")).await;
    feed.text("Step 1");
    feed.text("__BUILD_STATUS__:SUCCESS");
    eventually(|| controller.connection_state() == Some(ConnectionState::Closed)).await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen.first(),
        Some(&(
            ConnectionState::Connecting,
            0,
            DeploymentStatus::Pending,
            Some(ConnectionState::Connecting)
        ))
    );
    assert_eq!(
        seen.last(),
        Some(&(
            ConnectionState::Closed,
            2,
            DeploymentStatus::Success,
            Some(ConnectionState::Closed)
        ))
    );
}
