//! Entry processors for task records. Workers, orchestrators and coordinators
//! only ever change a record through one of these.

use super::plan::ExecutionPlan;
use super::record::{TaskOutcome, TaskRecord, TaskState};
use crate::cluster::map::{EntryProcessor, MapEntry};

/// Creates the record unless one with the same identity exists
#[derive(Debug, Clone, PartialEq)]
pub struct InsertIfAbsentProcessor {
    pub record: TaskRecord,
}

impl InsertIfAbsentProcessor {
    pub fn new(record: TaskRecord) -> Self {
        Self { record }
    }
}

impl EntryProcessor<String, TaskRecord> for InsertIfAbsentProcessor {
    type Output = bool;

    fn process(&self, entry: &mut MapEntry<String, TaskRecord>) -> bool {
        if entry.is_present() {
            return false;
        }
        entry.set_value(self.record.clone());
        true
    }
}

/// Moves a live task to `Terminating`; `false` if absent or already done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminateProcessor {
    pub cancelled: bool,
}

impl TerminateProcessor {
    pub fn cancel() -> Self {
        Self { cancelled: true }
    }
}

impl EntryProcessor<String, TaskRecord> for TerminateProcessor {
    type Output = bool;

    fn process(&self, entry: &mut MapEntry<String, TaskRecord>) -> bool {
        if entry.value().map_or(true, TaskRecord::is_done) {
            return false;
        }
        entry.update(|record| {
            record.cancelled = self.cancelled;
            record.terminate();
        });
        true
    }
}

/// Intermediate result from an owning executor. A failure ends the task.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributeResultProcessor {
    pub executor_id: String,
    pub outcome: TaskOutcome,
}

impl ContributeResultProcessor {
    pub fn new(executor_id: impl Into<String>, outcome: TaskOutcome) -> Self {
        Self {
            executor_id: executor_id.into(),
            outcome,
        }
    }
}

impl EntryProcessor<String, TaskRecord> for ContributeResultProcessor {
    type Output = bool;

    fn process(&self, entry: &mut MapEntry<String, TaskRecord>) -> bool {
        let accepts = entry
            .value()
            .is_some_and(|r| !r.is_done() && r.is_owner(&self.executor_id));
        if !accepts {
            return false;
        }
        entry.update(|record| {
            record.set_result(self.outcome.clone());
            if self.outcome.is_failure() {
                record.completed = true;
                record.terminate();
            }
        });
        true
    }
}

/// Final result from an owning executor
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteTaskProcessor {
    pub executor_id: String,
    pub outcome: TaskOutcome,
}

impl CompleteTaskProcessor {
    pub fn new(executor_id: impl Into<String>, outcome: TaskOutcome) -> Self {
        Self {
            executor_id: executor_id.into(),
            outcome,
        }
    }
}

impl EntryProcessor<String, TaskRecord> for CompleteTaskProcessor {
    type Output = bool;

    fn process(&self, entry: &mut MapEntry<String, TaskRecord>) -> bool {
        let accepts = entry
            .value()
            .is_some_and(|r| !r.is_done() && r.is_owner(&self.executor_id));
        if !accepts {
            return false;
        }
        entry.update(|record| {
            record.set_result(self.outcome.clone());
            record.completed = true;
            record.terminate();
        });
        true
    }
}

/// Stores a new plan and marks a pending task orchestrated
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExecutionPlanProcessor {
    pub plan: ExecutionPlan,
}

impl UpdateExecutionPlanProcessor {
    pub fn new(plan: ExecutionPlan) -> Self {
        Self { plan }
    }
}

impl EntryProcessor<String, TaskRecord> for UpdateExecutionPlanProcessor {
    type Output = bool;

    fn process(&self, entry: &mut MapEntry<String, TaskRecord>) -> bool {
        let applies = entry.value().is_some_and(|r| {
            !r.is_done() && (r.execution_plan != self.plan || r.state == TaskState::Pending)
        });
        if !applies {
            return false;
        }
        entry.update(|record| {
            record.execution_plan = self.plan.clone();
            if record.state == TaskState::Pending {
                record.state = TaskState::Orchestrated;
            }
        });
        true
    }
}

/// Records that the completion callback has been attempted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearCompletionCallbackProcessor;

impl EntryProcessor<String, TaskRecord> for ClearCompletionCallbackProcessor {
    type Output = bool;

    fn process(&self, entry: &mut MapEntry<String, TaskRecord>) -> bool {
        if !entry.value().is_some_and(|r| r.run_completion_callback) {
            return false;
        }
        entry.update(|record| record.run_completion_callback = false);
        true
    }
}
