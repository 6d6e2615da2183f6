use super::*;
use crate::model::{Choice, Usage};

fn sample_config() -> CallConfig {
    CallConfig {
        model: "gpt-4".to_string(),
        messages: vec![crate::model::Message::user("hi")],
        question: None,
        response_format: None,
        temperature: None,
        max_tokens: None,
        stream: None,
        stop: None,
        validation: vec![],
        retry_config: crate::model::RetryConfig::default(),
        mcp_config: None,
        wait_for_completion: true,
    }
}

fn sample_response() -> ProviderResponse {
    ProviderResponse {
        id: "r1".to_string(),
        created_ts: 1.0,
        model: "gpt-4".to_string(),
        choices: vec![Choice {
            index: 0,
            message: crate::model::Message::assistant_text("done"),
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::default(),
    }
}

#[test]
fn insert_then_get_round_trips_a_pending_task() {
    let store = TaskStore::open_in_memory().unwrap();
    store.insert_pending("t1", &sample_config(), 100.0).unwrap();
    let task = store.get("t1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.config.model, "gpt-4");
    assert!(task.result.is_none());
}

#[test]
fn get_returns_none_for_unknown_task_id() {
    let store = TaskStore::open_in_memory().unwrap();
    assert!(store.get("missing").unwrap().is_none());
}

#[test]
fn update_status_to_completed_preserves_prior_columns_not_passed() {
    let store = TaskStore::open_in_memory().unwrap();
    store.insert_pending("t1", &sample_config(), 100.0).unwrap();
    let applied = store
        .update_status(
            "t1",
            TaskStatus::Pending,
            TaskStatus::Running,
            Some(101.0),
            None,
            None,
            None,
            Some("starting"),
        )
        .unwrap();
    assert!(applied);
    let applied = store
        .update_status(
            "t1",
            TaskStatus::Running,
            TaskStatus::Completed,
            None,
            Some(105.0),
            Some(&sample_response()),
            None,
            None,
        )
        .unwrap();
    assert!(applied);

    let task = store.get("t1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.started_ts, Some(101.0));
    assert_eq!(task.completed_ts, Some(105.0));
    assert_eq!(task.result.unwrap().primary_text(), "done");
    assert_eq!(task.progress.as_deref(), Some("starting"));
}

#[test]
fn update_status_is_a_noop_when_the_expected_prior_status_does_not_match() {
    let store = TaskStore::open_in_memory().unwrap();
    store.insert_pending("t1", &sample_config(), 100.0).unwrap();

    // t1 is still Pending; claiming it was Running (as a racing writer
    // might) must not apply and must be observable as a conflict.
    let applied = store
        .update_status("t1", TaskStatus::Running, TaskStatus::Completed, None, Some(105.0), None, None, None)
        .unwrap();
    assert!(!applied);

    let task = store.get("t1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.completed_ts.is_none());
}

#[test]
fn list_by_statuses_filters_correctly() {
    let store = TaskStore::open_in_memory().unwrap();
    store.insert_pending("pending-1", &sample_config(), 1.0).unwrap();
    store.insert_pending("running-1", &sample_config(), 2.0).unwrap();
    store
        .update_status("running-1", TaskStatus::Pending, TaskStatus::Running, Some(2.5), None, None, None, None)
        .unwrap();

    let active = store.list_by_statuses(&[TaskStatus::Pending, TaskStatus::Running]).unwrap();
    assert_eq!(active.len(), 2);

    let running_only = store.list_by_statuses(&[TaskStatus::Running]).unwrap();
    assert_eq!(running_only.len(), 1);
    assert_eq!(running_only[0].task_id, "running-1");
}

#[test]
fn sweep_running_to_failed_marks_lost_tasks() {
    let store = TaskStore::open_in_memory().unwrap();
    store.insert_pending("t1", &sample_config(), 1.0).unwrap();
    store
        .update_status("t1", TaskStatus::Pending, TaskStatus::Running, Some(1.5), None, None, None, None)
        .unwrap();

    let count = store.sweep_running_to_failed(10.0).unwrap();
    assert_eq!(count, 1);

    let task = store.get("t1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.unwrap().detail, "lost across restart");
}

#[test]
fn sweep_running_to_failed_does_not_touch_pending_or_terminal_rows() {
    let store = TaskStore::open_in_memory().unwrap();
    store.insert_pending("pending-1", &sample_config(), 1.0).unwrap();
    let count = store.sweep_running_to_failed(10.0).unwrap();
    assert_eq!(count, 0);
    assert_eq!(store.get("pending-1").unwrap().unwrap().status, TaskStatus::Pending);
}
