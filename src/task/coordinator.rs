//! # Task Coordinator
//!
//! Client-side representative of one clustered task. The coordinator listens
//! to the task's record, republishes each new result version to its local
//! subscribers and tears itself down once the record reports completion or
//! cancellation.
//!
//! ## Event handling
//!
//! Record events arrive on the map's dispatch thread. Handlers only touch
//! local state and never propagate errors; anything that calls back into the
//! map (clearing the completion-callback flag, removing the listener) is
//! submitted to the coordinator's [`ListenerExecutor`]. A rejected submission
//! is logged and dropped.
//!
//! ## Reconnects
//!
//! A membership listener reinstalls the record listener whenever the local
//! member rejoins, fetching a fresh map handle from the session, then catches
//! up on any version missed while disconnected.

use super::processors::{
    ClearCompletionCallbackProcessor, InsertIfAbsentProcessor, TerminateProcessor,
};
use super::record::{CompletionCallback, TaskOutcome, TaskRecord};
use super::subscriber::{ChannelSubscriber, TaskNotification, TaskSubscriber};
use crate::cluster::executor::ListenerExecutor;
use crate::cluster::map::{ClusteredMapExt, ListenerToken, MapEvent, MapListener};
use crate::cluster::member::{MemberEvent, MemberListener};
use crate::cluster::session::{GridSession, TaskMap};
use crate::error::{GridError, GridResult};
use crate::logging::log_coordinator_operation;
use futures::channel::mpsc::UnboundedReceiver;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// How the coordinated task ended
#[derive(Debug, Clone, PartialEq)]
enum Termination {
    Completed,
    Cancelled,
    Failed(String),
    Removed,
    Closed,
}

impl Termination {
    fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
            Self::Removed => "removed",
            Self::Closed => "closed",
        }
    }
}

/// Coordinates one clustered task from the local member
#[derive(Clone)]
pub struct TaskCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl fmt::Debug for TaskCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCoordinator")
            .field("task_id", &self.inner.task_id)
            .field("done", &self.inner.done.load(Ordering::SeqCst))
            .field("result_version", &self.inner.last_version.load(Ordering::SeqCst))
            .finish()
    }
}

impl TaskCoordinator {
    /// Coordinate an existing task. Fails with [`GridError::TaskNotFound`]
    /// when no record exists.
    pub fn attach(
        task_id: impl Into<String>,
        session: Arc<dyn GridSession>,
        executor: Arc<dyn ListenerExecutor>,
    ) -> GridResult<Self> {
        let inner = CoordinatorInner::new(task_id.into(), session, executor);
        inner.install_listener()?;
        inner.install_member_listener();

        let existing = match inner.session.task_map().get(&inner.task_id) {
            Ok(existing) => existing,
            Err(e) => {
                inner.release_listeners();
                return Err(e);
            }
        };
        let Some(record) = existing else {
            inner.release_listeners();
            return Err(GridError::TaskNotFound {
                task_id: inner.task_id.clone(),
            });
        };
        inner.on_record_changed(&record);

        log_coordinator_operation("attach", &inner.task_id, "attached", None);
        Ok(Self { inner })
    }

    /// Create the task record and coordinate it. A record with the same
    /// identity makes this fail with [`GridError::DuplicateTask`], after this
    /// coordinator's listeners have been removed.
    pub fn submit(
        record: TaskRecord,
        subscribers: Vec<Arc<dyn TaskSubscriber>>,
        session: Arc<dyn GridSession>,
        executor: Arc<dyn ListenerExecutor>,
    ) -> GridResult<Self> {
        let inner = CoordinatorInner::new(record.task_id.clone(), session, executor);
        {
            let mut registered = inner.subscribers.write();
            for subscriber in subscribers {
                registered.insert(Uuid::new_v4(), subscriber);
            }
        }
        inner.install_listener()?;
        inner.install_member_listener();

        let inserted = inner
            .session
            .task_map()
            .invoke(&inner.task_id, &InsertIfAbsentProcessor::new(record));
        match inserted {
            Ok(true) => {
                log_coordinator_operation("submit", &inner.task_id, "created", None);
                Ok(Self { inner })
            }
            Ok(false) => {
                inner.release_listeners();
                inner.subscribers.write().clear();
                log_coordinator_operation(
                    "submit",
                    &inner.task_id,
                    "rejected",
                    Some("task already exists"),
                );
                Err(GridError::DuplicateTask {
                    task_id: inner.task_id.clone(),
                })
            }
            Err(e) => {
                inner.release_listeners();
                Err(e)
            }
        }
    }

    pub fn task_id(&self) -> &str {
        &self.inner.task_id
    }

    /// Mark the clustered task cancelled; `false` if it was already done or
    /// has gone
    pub fn cancel(&self) -> GridResult<bool> {
        let cancelled = self
            .inner
            .session
            .task_map()
            .invoke(&self.inner.task_id, &TerminateProcessor::cancel())?;
        log_coordinator_operation(
            "cancel",
            &self.inner.task_id,
            if cancelled { "cancelled" } else { "ignored" },
            None,
        );
        Ok(cancelled)
    }

    /// Stop coordinating: drop subscribers without notifying them and remove
    /// both listeners
    pub fn close(&self) {
        self.inner.subscribers.write().clear();
        self.inner.finish(Termination::Closed);
        self.inner.release_listeners();
    }

    pub fn subscribe(&self, subscriber: Arc<dyn TaskSubscriber>) -> Uuid {
        let id = Uuid::new_v4();
        let slot = self.inner.termination.lock();
        if let Some(termination) = slot.clone() {
            self.inner.replay_terminal(&subscriber, &termination);
            return id;
        }
        // Held across the insert so a concurrent finish cannot miss it
        self.inner.subscribers.write().insert(id, subscriber);
        drop(slot);
        id
    }

    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.inner.subscribers.write().remove(&id).is_some()
    }

    /// Subscribe with a channel; the stream ends after the terminal signal
    pub fn subscribe_stream(&self) -> UnboundedReceiver<TaskNotification> {
        let (subscriber, receiver) = ChannelSubscriber::new();
        self.subscribe(Arc::new(subscriber));
        receiver
    }

    /// Deliver a retained task's last result (or error) and its completion to
    /// a new subscriber. A task still running is subscribed normally.
    pub fn subscribe_retained_task(&self, subscriber: Arc<dyn TaskSubscriber>) -> GridResult<()> {
        let record = self
            .inner
            .session
            .task_map()
            .get(&self.inner.task_id)?
            .ok_or_else(|| GridError::TaskNotFound {
                task_id: self.inner.task_id.clone(),
            })?;

        if !record.is_done() {
            self.inner.subscribe_with_replay(subscriber);
            return Ok(());
        }

        let task_id = &self.inner.task_id;
        if record.cancelled {
            subscriber.on_error(&GridError::TaskCancelled {
                task_id: task_id.clone(),
            });
            return Ok(());
        }
        match &record.last_result {
            Some(TaskOutcome::Failure(reason)) => subscriber.on_error(&GridError::TaskFailed {
                task_id: task_id.clone(),
                reason: reason.clone(),
            }),
            Some(TaskOutcome::Value(value)) => {
                subscriber.on_next(value);
                subscriber.on_complete();
            }
            None => subscriber.on_complete(),
        }
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.inner.termination.lock(), Some(Termination::Cancelled))
    }

    pub fn last_result(&self) -> Option<TaskOutcome> {
        self.inner.last_result.read().clone()
    }

    pub fn result_version(&self) -> u64 {
        self.inner.last_version.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Whether the record listener is currently installed
    pub fn is_listening(&self) -> bool {
        self.inner.registration.lock().is_some()
    }
}

struct CoordinatorInner {
    task_id: String,
    session: Arc<dyn GridSession>,
    executor: Arc<dyn ListenerExecutor>,
    subscribers: RwLock<HashMap<Uuid, Arc<dyn TaskSubscriber>>>,
    registration: Mutex<Option<(TaskMap, ListenerToken)>>,
    /// Serialises the version gate with delivery to subscribers
    publish: Mutex<()>,
    member_listener: Mutex<Option<Uuid>>,
    last_result: RwLock<Option<TaskOutcome>>,
    last_version: AtomicU64,
    done: AtomicBool,
    termination: Mutex<Option<Termination>>,
    callback_ran: AtomicBool,
    weak_self: Weak<CoordinatorInner>,
}

impl CoordinatorInner {
    fn new(
        task_id: String,
        session: Arc<dyn GridSession>,
        executor: Arc<dyn ListenerExecutor>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            task_id,
            session,
            executor,
            subscribers: RwLock::new(HashMap::new()),
            registration: Mutex::new(None),
            publish: Mutex::new(()),
            member_listener: Mutex::new(None),
            last_result: RwLock::new(None),
            last_version: AtomicU64::new(0),
            done: AtomicBool::new(false),
            termination: Mutex::new(None),
            callback_ran: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    fn install_listener(&self) -> GridResult<()> {
        let map = self.session.task_map();
        let listener = Arc::new(RecordListener {
            coordinator: self.weak_self.clone(),
        });
        let token = map.add_map_listener(listener, Some(self.task_id.clone()))?;
        *self.registration.lock() = Some((map, token));
        Ok(())
    }

    fn install_member_listener(&self) {
        let listener = Arc::new(ReconnectListener {
            coordinator: self.weak_self.clone(),
        });
        let id = self.session.membership().add_member_listener(listener);
        *self.member_listener.lock() = Some(id);
    }

    /// Remove the record listener now; returns whether one was removed
    fn detach_listener(&self) -> bool {
        let Some((map, token)) = self.registration.lock().take() else {
            return false;
        };
        match map.remove_map_listener(token) {
            Ok(removed) => removed,
            Err(e) => {
                // A released handle has already dropped its registrations
                debug!(task_id = %self.task_id, error = %e, "Record listener removal skipped");
                false
            }
        }
    }

    fn remove_member_listener(&self) {
        if let Some(id) = self.member_listener.lock().take() {
            self.session.membership().remove_member_listener(id);
        }
    }

    fn release_listeners(&self) {
        self.detach_listener();
        self.remove_member_listener();
    }

    /// React to the current state of the record
    fn on_record_changed(&self, record: &TaskRecord) {
        if self.done.load(Ordering::SeqCst) {
            return;
        }

        {
            let _publish = self.publish.lock();
            // Catch-up reads race queued events; only newer versions pass
            let previous = self
                .last_version
                .fetch_max(record.result_version, Ordering::SeqCst);
            if record.result_version > previous {
                if let Some(outcome) = &record.last_result {
                    *self.last_result.write() = Some(outcome.clone());
                    self.offer(outcome);
                }
            }
        }

        if !(record.cancelled || record.completed) {
            return;
        }

        if record.cancelled {
            self.finish(Termination::Cancelled);
        } else {
            self.finish(Termination::Completed);
        }

        let callback = record
            .completion_callback
            .as_ref()
            .filter(|_| record.run_completion_callback);
        if let Some(callback) = callback {
            self.run_completion_callback(callback, record.last_result.as_ref());
        }
        self.detach_async(callback.is_some());
    }

    fn offer(&self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Value(value) => {
                for subscriber in self.subscriber_snapshot() {
                    guard_subscriber(&self.task_id, || subscriber.on_next(value));
                }
            }
            TaskOutcome::Failure(reason) => self.finish(Termination::Failed(reason.clone())),
        }
    }

    /// Enter the terminal state once, notifying and dropping subscribers
    fn finish(&self, termination: Termination) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscribers: Vec<_> = {
            let mut slot = self.termination.lock();
            *slot = Some(termination.clone());
            self.subscribers.write().drain().map(|(_, s)| s).collect()
        };
        for subscriber in &subscribers {
            self.replay_terminal(subscriber, &termination);
        }
        self.remove_member_listener();

        log_coordinator_operation(
            "terminate",
            &self.task_id,
            termination.label(),
            Some(&format!("subscribers={}", subscribers.len())),
        );
    }

    /// Subscribe, first delivering the last value this coordinator published.
    /// Holding the publish lock keeps a concurrent version from being missed
    /// or delivered twice.
    fn subscribe_with_replay(&self, subscriber: Arc<dyn TaskSubscriber>) {
        let _publish = self.publish.lock();
        let slot = self.termination.lock();
        if let Some(termination) = slot.clone() {
            self.replay_terminal(&subscriber, &termination);
            return;
        }
        let cached = self.last_result.read().clone();
        if let Some(TaskOutcome::Value(value)) = cached {
            guard_subscriber(&self.task_id, || subscriber.on_next(&value));
        }
        self.subscribers.write().insert(Uuid::new_v4(), subscriber);
        drop(slot);
    }

    fn replay_terminal(&self, subscriber: &Arc<dyn TaskSubscriber>, termination: &Termination) {
        let task_id = self.task_id.clone();
        match termination {
            Termination::Completed => guard_subscriber(&self.task_id, || subscriber.on_complete()),
            Termination::Cancelled => guard_subscriber(&self.task_id, || {
                subscriber.on_error(&GridError::TaskCancelled { task_id })
            }),
            Termination::Failed(reason) => guard_subscriber(&self.task_id, || {
                subscriber.on_error(&GridError::TaskFailed {
                    task_id,
                    reason: reason.clone(),
                })
            }),
            Termination::Removed => guard_subscriber(&self.task_id, || {
                subscriber.on_error(&GridError::TaskNotFound { task_id })
            }),
            Termination::Closed => {}
        }
    }

    fn run_completion_callback(&self, callback: &CompletionCallback, outcome: Option<&TaskOutcome>) {
        if self.callback_ran.swap(true, Ordering::SeqCst) {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| callback.call(outcome))).is_err() {
            warn!(task_id = %self.task_id, "Completion callback panicked");
        }
    }

    /// Clear the record's callback flag and drop the record listener off the
    /// dispatch thread
    fn detach_async(&self, clear_callback: bool) {
        let Some(inner) = self.weak_self.upgrade() else {
            return;
        };
        let job = Box::new(move || {
            if clear_callback {
                let cleared = inner
                    .session
                    .task_map()
                    .invoke(&inner.task_id, &ClearCompletionCallbackProcessor);
                if let Err(e) = cleared {
                    debug!(task_id = %inner.task_id, error = %e, "Completion flag not cleared");
                }
            }
            inner.detach_listener();
        });
        if let Err(rejected) = self.executor.execute(job) {
            debug!(task_id = %self.task_id, error = %rejected, "Listener detach rejected");
        }
    }

    fn on_record_deleted(&self) {
        self.finish(Termination::Removed);
        self.detach_async(false);
    }

    /// Reinstall the record listener on a fresh map handle
    fn reattach(&self) {
        if self.done.load(Ordering::SeqCst) {
            return;
        }
        self.detach_listener();
        if let Err(e) = self.install_listener() {
            warn!(task_id = %self.task_id, error = %e, "Failed to reinstall record listener");
            return;
        }
        match self.session.task_map().get(&self.task_id) {
            Ok(Some(record)) => self.on_record_changed(&record),
            Ok(None) => self.on_record_deleted(),
            Err(e) => debug!(task_id = %self.task_id, error = %e, "Catch-up read failed"),
        }
        debug!(task_id = %self.task_id, "Record listener reinstalled");
    }

    fn subscriber_snapshot(&self) -> Vec<Arc<dyn TaskSubscriber>> {
        self.subscribers.read().values().cloned().collect()
    }
}

fn guard_subscriber(task_id: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(task_id = %task_id, "Task subscriber panicked");
    }
}

struct RecordListener {
    coordinator: Weak<CoordinatorInner>,
}

impl MapListener<String, TaskRecord> for RecordListener {
    fn entry_inserted(&self, event: &MapEvent<String, TaskRecord>) {
        if let (Some(coordinator), Some(record)) = (self.coordinator.upgrade(), &event.new_value) {
            coordinator.on_record_changed(record);
        }
    }

    fn entry_updated(&self, event: &MapEvent<String, TaskRecord>) {
        if let (Some(coordinator), Some(record)) = (self.coordinator.upgrade(), &event.new_value) {
            coordinator.on_record_changed(record);
        }
    }

    fn entry_deleted(&self, _event: &MapEvent<String, TaskRecord>) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.on_record_deleted();
        }
    }
}

struct ReconnectListener {
    coordinator: Weak<CoordinatorInner>,
}

impl MemberListener for ReconnectListener {
    fn member_joined(&self, event: &MemberEvent) {
        if !event.local {
            return;
        }
        let Some(coordinator) = self.coordinator.upgrade() else {
            return;
        };
        let executor = Arc::clone(&coordinator.executor);
        let task_id = coordinator.task_id.clone();
        if let Err(rejected) = executor.execute(Box::new(move || coordinator.reattach())) {
            debug!(task_id = %task_id, error = %rejected, "Listener reattach rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::executor::{Job, RejectedExecution};
    use crate::cluster::LocalGrid;
    use crate::config::GridConfig;
    use serde_json::{json, Value};

    /// Runs jobs on the calling thread
    struct InlineExecutor;

    impl ListenerExecutor for InlineExecutor {
        fn execute(&self, job: Job) -> Result<(), RejectedExecution> {
            job();
            Ok(())
        }

        fn is_shutdown(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct Values(Mutex<Vec<Value>>);

    impl TaskSubscriber for Values {
        fn on_next(&self, value: &Value) {
            self.0.lock().push(value.clone());
        }

        fn on_error(&self, _error: &GridError) {}

        fn on_complete(&self) {}
    }

    fn running(task_id: &str) -> (TaskCoordinator, Arc<Values>) {
        let grid = Arc::new(LocalGrid::new(GridConfig::default()));
        let values = Arc::new(Values::default());
        let coordinator = TaskCoordinator::submit(
            TaskRecord::new(task_id),
            vec![values.clone() as Arc<dyn TaskSubscriber>],
            grid,
            Arc::new(InlineExecutor),
        )
        .unwrap();
        (coordinator, values)
    }

    fn at_version(task_id: &str, version: u64, value: Value) -> TaskRecord {
        let mut record = TaskRecord::new(task_id);
        record.result_version = version;
        record.last_result = Some(TaskOutcome::Value(value));
        record
    }

    #[test]
    fn test_stale_versions_are_not_republished() {
        let (coordinator, values) = running("t1");
        let inner = &coordinator.inner;

        inner.on_record_changed(&at_version("t1", 2, json!(2)));
        inner.on_record_changed(&at_version("t1", 1, json!(1)));
        inner.on_record_changed(&at_version("t1", 2, json!(2)));

        assert_eq!(*values.0.lock(), vec![json!(2)]);
        assert_eq!(coordinator.result_version(), 2);
        assert_eq!(
            coordinator.last_result(),
            Some(TaskOutcome::Value(json!(2)))
        );
    }

    #[test]
    fn test_retained_subscribe_replays_cached_value_once() {
        let (coordinator, _) = running("t1");
        let inner = &coordinator.inner;
        // The stored record has no result yet; only the coordinator has seen one
        inner.on_record_changed(&at_version("t1", 1, json!("a")));

        let late = Arc::new(Values::default());
        coordinator.subscribe_retained_task(late.clone()).unwrap();
        inner.on_record_changed(&at_version("t1", 1, json!("a")));
        inner.on_record_changed(&at_version("t1", 2, json!("b")));

        assert_eq!(*late.0.lock(), vec![json!("a"), json!("b")]);
    }
}
