//! # Executor Worker
//!
//! Executor-side runtime. Picks up `ASSIGNED` records for one executor, moves
//! each through `EXECUTING` to `EXECUTED` with compare-and-set transitions and
//! writes the body's outcome into the task record.

use super::processors::CompleteTaskProcessor;
use super::record::{TaskContext, TaskOutcome};
use crate::assignment::{AssignmentState, AssignmentStore, ClusteredAssignment};
use crate::cluster::map::ClusteredMapExt;
use crate::cluster::session::GridSession;
use crate::error::GridResult;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ExecutorWorker {
    executor_id: String,
    session: Arc<dyn GridSession>,
}

impl fmt::Debug for ExecutorWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorWorker")
            .field("executor_id", &self.executor_id)
            .finish()
    }
}

impl ExecutorWorker {
    pub fn new(executor_id: impl Into<String>, session: Arc<dyn GridSession>) -> Self {
        Self {
            executor_id: executor_id.into(),
            session,
        }
    }

    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    fn assignments(&self) -> AssignmentStore {
        AssignmentStore::from_session(self.session.as_ref())
    }

    /// Assignments waiting to start on this executor
    pub fn pending_assignments(&self) -> GridResult<Vec<ClusteredAssignment>> {
        Ok(self
            .assignments()
            .assignments_for_executor(&self.executor_id)?
            .into_iter()
            .filter(|a| a.state == AssignmentState::Assigned)
            .collect())
    }

    /// Run one task. Returns `false` when the assignment was lost to another
    /// transition or the task was already done.
    pub fn execute_assignment(&self, task_id: &str) -> GridResult<bool> {
        let store = self.assignments();
        let claimed = store.set_state(
            &self.executor_id,
            task_id,
            Some(AssignmentState::Assigned),
            AssignmentState::Executing,
        )?;
        if claimed != Some(AssignmentState::Assigned) {
            debug!(
                executor_id = %self.executor_id,
                task_id = %task_id,
                found = ?claimed,
                "Assignment no longer claimable"
            );
            return Ok(false);
        }

        let tasks = self.session.task_map();
        let record = tasks.get(&task_id.to_string())?;
        let Some(record) = record.filter(|r| !r.is_done()) else {
            self.finish(&store, task_id)?;
            return Ok(false);
        };

        let outcome = match &record.body {
            Some(body) => {
                let context = TaskContext::new(task_id, self.executor_id.clone(), tasks.clone());
                match catch_unwind(AssertUnwindSafe(|| body.run(&context))) {
                    Ok(Ok(value)) => TaskOutcome::Value(value),
                    Ok(Err(e)) => TaskOutcome::Failure(e.to_string()),
                    Err(_) => {
                        warn!(executor_id = %self.executor_id, task_id = %task_id, "Task body panicked");
                        TaskOutcome::Failure("task body panicked".to_string())
                    }
                }
            }
            None => TaskOutcome::Failure("task has no body".to_string()),
        };

        let completed = tasks.invoke(
            &task_id.to_string(),
            &CompleteTaskProcessor::new(self.executor_id.clone(), outcome),
        )?;
        self.finish(&store, task_id)?;

        info!(
            executor_id = %self.executor_id,
            task_id = %task_id,
            completed = completed,
            "Assignment executed"
        );
        Ok(completed)
    }

    fn finish(&self, store: &AssignmentStore, task_id: &str) -> GridResult<()> {
        store.set_state(
            &self.executor_id,
            task_id,
            Some(AssignmentState::Executing),
            AssignmentState::Executed,
        )?;
        Ok(())
    }

    /// Run every pending assignment; returns how many completed their task
    pub fn run_pending(&self) -> GridResult<usize> {
        let mut completed = 0;
        for assignment in self.pending_assignments()? {
            if self.execute_assignment(&assignment.task_id)? {
                completed += 1;
            }
        }
        Ok(completed)
    }
}
