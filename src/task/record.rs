//! # Task Record
//!
//! The clustered record for one submitted task. Executors write results into
//! it through entry processors and coordinators watch it for changes. The
//! `result_version` only moves forward; coordinators republish a result only
//! when they see a version they have not seen before.

use super::plan::ExecutionPlan;
use super::processors::ContributeResultProcessor;
use crate::cluster::map::ClusteredMapExt;
use crate::cluster::session::TaskMap;
use crate::error::GridResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a task record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Created, no execution plan yet
    Pending,
    /// Assigned to executors according to its plan
    Orchestrated,
    /// Completed or cancelled; no further results are accepted
    Terminating,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminating)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Orchestrated => write!(f, "ORCHESTRATED"),
            Self::Terminating => write!(f, "TERMINATING"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ORCHESTRATED" => Ok(Self::Orchestrated),
            "TERMINATING" => Ok(Self::Terminating),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

/// A result published by an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum TaskOutcome {
    Value(serde_json::Value),
    Failure(String),
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

type CompletionFn = dyn Fn(Option<&TaskOutcome>) + Send + Sync;

/// Runs once when the task completes or is cancelled, with the last result
#[derive(Clone)]
pub struct CompletionCallback(Arc<CompletionFn>);

impl CompletionCallback {
    pub fn new(f: impl Fn(Option<&TaskOutcome>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, outcome: Option<&TaskOutcome>) {
        (self.0)(outcome)
    }
}

impl fmt::Debug for CompletionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionCallback")
    }
}

impl PartialEq for CompletionCallback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

type BodyFn = dyn Fn(&TaskContext) -> anyhow::Result<serde_json::Value> + Send + Sync;

/// The work an executor runs for a task
#[derive(Clone)]
pub struct TaskBody(Arc<BodyFn>);

impl TaskBody {
    pub fn new(
        f: impl Fn(&TaskContext) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    pub fn run(&self, context: &TaskContext) -> anyhow::Result<serde_json::Value> {
        (self.0)(context)
    }
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskBody")
    }
}

impl PartialEq for TaskBody {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Handed to a running [`TaskBody`]
pub struct TaskContext {
    task_id: String,
    executor_id: String,
    tasks: TaskMap,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("executor_id", &self.executor_id)
            .finish()
    }
}

impl TaskContext {
    pub fn new(task_id: impl Into<String>, executor_id: impl Into<String>, tasks: TaskMap) -> Self {
        Self {
            task_id: task_id.into(),
            executor_id: executor_id.into(),
            tasks,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    /// Publish an intermediate result; `false` when this executor no longer
    /// owns the task or the task is done
    pub fn yield_result(&self, value: serde_json::Value) -> GridResult<bool> {
        self.tasks.invoke(
            &self.task_id,
            &ContributeResultProcessor::new(self.executor_id.clone(), TaskOutcome::Value(value)),
        )
    }

    /// Whether the task has been cancelled or completed elsewhere
    pub fn is_done(&self) -> GridResult<bool> {
        Ok(self
            .tasks
            .get(&self.task_id)?
            .as_ref()
            .map_or(true, TaskRecord::is_done))
    }
}

/// Clustered lifecycle record of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub state: TaskState,
    pub execution_plan: ExecutionPlan,
    pub last_result: Option<TaskOutcome>,
    pub result_version: u64,
    pub cancelled: bool,
    pub completed: bool,
    #[serde(skip)]
    pub completion_callback: Option<CompletionCallback>,
    /// Whether the completion callback still has to run
    pub run_completion_callback: bool,
    /// Keep the record this long after completion
    pub retain_duration: Option<Duration>,
    #[serde(skip)]
    pub body: Option<TaskBody>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Pending,
            execution_plan: ExecutionPlan::new(),
            last_result: None,
            result_version: 0,
            cancelled: false,
            completed: false,
            completion_callback: None,
            run_completion_callback: false,
            retain_duration: None,
            body: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_body(
        mut self,
        f: impl Fn(&TaskContext) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        self.body = Some(TaskBody::new(f));
        self
    }

    pub fn with_completion_callback(
        mut self,
        f: impl Fn(Option<&TaskOutcome>) + Send + Sync + 'static,
    ) -> Self {
        self.completion_callback = Some(CompletionCallback::new(f));
        self.run_completion_callback = true;
        self
    }

    pub fn with_retain_duration(mut self, retain: Duration) -> Self {
        self.retain_duration = Some(retain);
        self
    }

    pub fn is_done(&self) -> bool {
        self.completed || self.cancelled || self.state.is_terminal()
    }

    pub fn is_owner(&self, executor_id: &str) -> bool {
        self.execution_plan.is_owner(executor_id)
    }

    /// Record a published result; every call bumps the version, even when
    /// the value repeats
    pub fn set_result(&mut self, outcome: TaskOutcome) -> u64 {
        self.last_result = Some(outcome);
        self.result_version += 1;
        self.result_version
    }

    /// Move to `Terminating`, stamping the completion time once
    pub fn terminate(&mut self) {
        self.state = TaskState::Terminating;
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// When a retained record may be removed
    pub fn retain_deadline(&self) -> Option<DateTime<Utc>> {
        let completed_at = self.completed_at?;
        let retain = chrono::Duration::from_std(self.retain_duration?).ok()?;
        completed_at.checked_add_signed(retain)
    }
}
