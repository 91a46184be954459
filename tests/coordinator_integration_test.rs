mod common;

use common::{eventually, listener_executor, local_grid, RecordingSubscriber};
use futures::StreamExt;
use grid_executor::cluster::{ClusteredMap, ClusteredMapExt, GridSession, LocalGrid};
use grid_executor::error::GridError;
use grid_executor::task::{
    CompleteTaskProcessor, ContributeResultProcessor, ExecutorInfo, ExecutorWorker,
    StandardExecutionStrategy, TaskCoordinator, TaskNotification, TaskOrchestrator, TaskOutcome,
    TaskRecord, TaskSubscriber, UpdateExecutionPlanProcessor,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn submit(
    grid: &Arc<LocalGrid>,
    record: TaskRecord,
    subscriber: &Arc<RecordingSubscriber>,
) -> TaskCoordinator {
    let subscribers: Vec<Arc<dyn TaskSubscriber>> = vec![subscriber.clone()];
    TaskCoordinator::submit(record, subscribers, grid.clone(), listener_executor()).unwrap()
}

/// Plan the task onto executor `e1`
fn orchestrate(grid: &Arc<LocalGrid>, task_id: &str) {
    TaskOrchestrator::new(grid.clone(), Arc::new(StandardExecutionStrategy::any()))
        .orchestrate(task_id, &[ExecutorInfo::running("e1")])
        .unwrap();
}

fn contribute(grid: &LocalGrid, task_id: &str, value: serde_json::Value) -> bool {
    grid.task_map()
        .invoke(
            &task_id.to_string(),
            &ContributeResultProcessor::new("e1", TaskOutcome::Value(value)),
        )
        .unwrap()
}

fn complete(grid: &LocalGrid, task_id: &str, outcome: TaskOutcome) -> bool {
    grid.task_map()
        .invoke(
            &task_id.to_string(),
            &CompleteTaskProcessor::new("e1", outcome),
        )
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_results_reach_subscribers_in_order() {
    let grid = local_grid();
    let subscriber = RecordingSubscriber::new();
    let record = TaskRecord::new("t1").with_body(|ctx| {
        ctx.yield_result(json!("partial"))?;
        Ok(json!("final"))
    });
    let coordinator = submit(&grid, record, &subscriber);
    orchestrate(&grid, "t1");

    let worker = ExecutorWorker::new("e1", grid.clone());
    assert_eq!(worker.run_pending().unwrap(), 1);

    assert!(eventually(|| subscriber.terminal().is_some()).await);
    assert_eq!(
        subscriber.received(),
        vec![
            TaskNotification::Next(json!("partial")),
            TaskNotification::Next(json!("final")),
            TaskNotification::Complete,
        ]
    );
    assert!(coordinator.is_done());
    assert_eq!(coordinator.result_version(), 2);
    assert_eq!(
        coordinator.last_result(),
        Some(TaskOutcome::Value(json!("final")))
    );

    // Listeners are detached once the task is done
    assert!(eventually(|| grid.task_storage().listener_count() == 0).await);
    assert!(!coordinator.is_listening());
    assert_eq!(grid.membership().listener_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_submission_is_rejected_and_cleaned_up() {
    let grid = local_grid();
    let first = RecordingSubscriber::new();
    let _coordinator = submit(&grid, TaskRecord::new("t1"), &first);

    let second: Vec<Arc<dyn TaskSubscriber>> = vec![RecordingSubscriber::new()];
    let err = TaskCoordinator::submit(
        TaskRecord::new("t1"),
        second,
        grid.clone(),
        listener_executor(),
    )
    .unwrap_err();

    assert_eq!(
        err,
        GridError::DuplicateTask {
            task_id: "t1".to_string()
        }
    );
    assert!(err.is_illegal_argument());
    assert_eq!(grid.task_map().len().unwrap(), 1);
    assert_eq!(grid.task_storage().listener_count(), 1);
    assert_eq!(grid.membership().listener_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn only_new_result_versions_are_published() {
    let grid = local_grid();
    let subscriber = RecordingSubscriber::new();
    let coordinator = submit(&grid, TaskRecord::new("t1"), &subscriber);
    orchestrate(&grid, "t1");

    // Plan changes leave the result version alone
    let replanned = grid
        .task_map()
        .get(&"t1".to_string())
        .unwrap()
        .unwrap()
        .execution_plan
        .with_action("e2", grid_executor::task::Action::Assign);
    assert!(grid
        .task_map()
        .invoke(&"t1".to_string(), &UpdateExecutionPlanProcessor::new(replanned))
        .unwrap());

    assert!(contribute(&grid, "t1", json!(1)));
    // Repeating a value is a new version and reaches subscribers again
    assert!(contribute(&grid, "t1", json!(1)));
    assert!(contribute(&grid, "t1", json!(2)));

    assert!(eventually(|| subscriber.values().len() == 3).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(subscriber.values(), vec![json!(1), json!(1), json!(2)]);
    assert_eq!(coordinator.result_version(), 3);
    assert!(!coordinator.is_done());
}

#[tokio::test(flavor = "multi_thread")]
async fn completion_callback_runs_once_even_when_it_panics() {
    let grid = local_grid();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let record = TaskRecord::new("t1").with_completion_callback(move |outcome| {
        seen.fetch_add(1, Ordering::SeqCst);
        assert_eq!(outcome, Some(&TaskOutcome::Value(json!("done"))));
        panic!("callback failure");
    });

    let subscriber = RecordingSubscriber::new();
    let coordinator = submit(&grid, record, &subscriber);
    orchestrate(&grid, "t1");
    assert!(complete(&grid, "t1", TaskOutcome::Value(json!("done"))));

    // Snapshot while the callback is still pending on the record
    let pending = grid.task_map().get(&"t1".to_string()).unwrap().unwrap();

    assert!(eventually(|| calls.load(Ordering::SeqCst) == 1).await);
    assert!(
        eventually(|| {
            grid.task_map()
                .get(&"t1".to_string())
                .unwrap()
                .is_some_and(|r| !r.run_completion_callback)
        })
        .await
    );

    // Re-deliver the completed record
    for _ in 0..3 {
        grid.task_map().put("t1".to_string(), pending.clone()).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(subscriber.terminal(), Some(TaskNotification::Complete));
    assert!(coordinator.is_done());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_notifies_subscribers() {
    let grid = local_grid();
    let subscriber = RecordingSubscriber::new();
    let coordinator = submit(&grid, TaskRecord::new("t1"), &subscriber);

    assert!(coordinator.cancel().unwrap());
    assert!(!coordinator.cancel().unwrap());

    assert!(eventually(|| subscriber.terminal().is_some()).await);
    assert_eq!(
        subscriber.terminal(),
        Some(TaskNotification::Error(GridError::TaskCancelled {
            task_id: "t1".to_string()
        }))
    );
    assert!(coordinator.is_cancelled());

    // Late subscribers see the terminal signal straight away
    let late = RecordingSubscriber::new();
    coordinator.subscribe(late.clone());
    assert_eq!(late.terminal(), subscriber.terminal());
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_outcome_is_delivered_as_error() {
    let grid = local_grid();
    let subscriber = RecordingSubscriber::new();
    let _coordinator = submit(&grid, TaskRecord::new("t1"), &subscriber);
    orchestrate(&grid, "t1");

    assert!(complete(&grid, "t1", TaskOutcome::Failure("disk full".into())));

    assert!(eventually(|| subscriber.terminal().is_some()).await);
    assert_eq!(
        subscriber.received(),
        vec![TaskNotification::Error(GridError::TaskFailed {
            task_id: "t1".to_string(),
            reason: "disk full".to_string(),
        })]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_record_ends_the_task() {
    let grid = local_grid();
    let subscriber = RecordingSubscriber::new();
    let coordinator = submit(&grid, TaskRecord::new("t1"), &subscriber);

    grid.task_map().remove(&"t1".to_string()).unwrap();

    assert!(eventually(|| coordinator.is_done()).await);
    assert_eq!(
        subscriber.terminal(),
        Some(TaskNotification::Error(GridError::TaskNotFound {
            task_id: "t1".to_string()
        }))
    );
    assert!(eventually(|| grid.task_storage().listener_count() == 0).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn listener_is_reinstalled_after_reconnect() {
    let grid = local_grid();
    let subscriber = RecordingSubscriber::new();
    let _coordinator = submit(&grid, TaskRecord::new("t1"), &subscriber);
    orchestrate(&grid, "t1");

    grid.simulate_reconnect();
    assert!(eventually(|| grid.task_storage().listener_count() == 1).await);

    assert!(complete(&grid, "t1", TaskOutcome::Value(json!("after"))));
    assert!(eventually(|| subscriber.terminal().is_some()).await);
    assert_eq!(
        subscriber.received(),
        vec![
            TaskNotification::Next(json!("after")),
            TaskNotification::Complete
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn retained_task_replays_last_result() {
    let grid = local_grid();
    let subscriber = RecordingSubscriber::new();
    let record = TaskRecord::new("t1").with_retain_duration(Duration::from_secs(60));
    let coordinator = submit(&grid, record, &subscriber);
    orchestrate(&grid, "t1");
    assert!(complete(&grid, "t1", TaskOutcome::Value(json!(42))));
    assert!(eventually(|| coordinator.is_done()).await);

    let orchestrator =
        TaskOrchestrator::new(grid.clone(), Arc::new(StandardExecutionStrategy::any()));
    assert!(!orchestrator.cleanup("t1").unwrap());

    let late = RecordingSubscriber::new();
    coordinator.subscribe_retained_task(late.clone()).unwrap();
    assert_eq!(
        late.received(),
        vec![TaskNotification::Next(json!(42)), TaskNotification::Complete]
    );

    let deadline = grid
        .task_map()
        .get(&"t1".to_string())
        .unwrap()
        .and_then(|r| r.retain_deadline())
        .unwrap();
    assert_eq!(orchestrator.expire_retained(deadline).unwrap(), 1);

    let err = coordinator
        .subscribe_retained_task(RecordingSubscriber::new())
        .unwrap_err();
    assert!(err.is_illegal_state());
}

#[tokio::test(flavor = "multi_thread")]
async fn attach_follows_an_existing_task() {
    let grid = local_grid();
    grid.task_map()
        .put("t1".to_string(), TaskRecord::new("t1"))
        .unwrap();
    orchestrate(&grid, "t1");
    assert!(contribute(&grid, "t1", json!("early")));

    let coordinator = TaskCoordinator::attach("t1", grid.clone(), listener_executor()).unwrap();
    assert_eq!(coordinator.result_version(), 1);
    assert_eq!(
        coordinator.last_result(),
        Some(TaskOutcome::Value(json!("early")))
    );

    let mut stream = coordinator.subscribe_stream();
    assert!(complete(&grid, "t1", TaskOutcome::Value(json!("late"))));

    let mut received = Vec::new();
    while let Some(notification) = stream.next().await {
        received.push(notification);
    }
    assert_eq!(
        received,
        vec![
            TaskNotification::Next(json!("late")),
            TaskNotification::Complete
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn attach_to_missing_task_fails_without_leaking_listeners() {
    let grid = local_grid();
    let err = TaskCoordinator::attach("ghost", grid.clone(), listener_executor()).unwrap_err();
    assert!(matches!(err, GridError::TaskNotFound { .. }));
    assert_eq!(grid.task_storage().listener_count(), 0);
    assert_eq!(grid.membership().listener_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn shut_down_executor_does_not_block_completion() {
    let grid = local_grid();
    let executor = listener_executor();
    let subscriber = RecordingSubscriber::new();
    let subscribers: Vec<Arc<dyn TaskSubscriber>> = vec![subscriber.clone()];
    let coordinator =
        TaskCoordinator::submit(TaskRecord::new("t1"), subscribers, grid.clone(), executor.clone())
            .unwrap();
    orchestrate(&grid, "t1");

    executor.shutdown();
    assert!(complete(&grid, "t1", TaskOutcome::Value(json!("ok"))));

    assert!(eventually(|| subscriber.terminal().is_some()).await);
    assert!(coordinator.is_done());
    // Detach was rejected, so the record listener stays until close
    assert!(coordinator.is_listening());
    coordinator.close();
    assert_eq!(grid.task_storage().listener_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn close_drops_subscribers_silently() {
    let grid = local_grid();
    let subscriber = RecordingSubscriber::new();
    let coordinator = submit(&grid, TaskRecord::new("t1"), &subscriber);
    assert_eq!(coordinator.subscriber_count(), 1);

    coordinator.close();
    assert_eq!(coordinator.subscriber_count(), 0);
    assert!(subscriber.received().is_empty());
    assert_eq!(grid.task_storage().listener_count(), 0);
    assert_eq!(grid.membership().listener_count(), 0);

    // The clustered task itself is untouched
    assert!(grid.task_map().get(&"t1".to_string()).unwrap().is_some());
}
