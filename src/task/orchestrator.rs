//! # Task Orchestrator
//!
//! Decides which executors run a task and keeps the assignment store in step
//! with that decision. The pruned plan is written to the task record before
//! any assignment is created, so an executor that sees an assignment always
//! finds itself listed as an owner.

use super::plan::ExecutionPlan;
use super::processors::UpdateExecutionPlanProcessor;
use super::record::TaskRecord;
use super::strategy::{ExecutionStrategy, ExecutorInfo};
use crate::assignment::AssignmentStore;
use crate::cluster::map::ClusteredMapExt;
use crate::cluster::session::GridSession;
use crate::error::{GridError, GridResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct TaskOrchestrator {
    session: Arc<dyn GridSession>,
    strategy: Arc<dyn ExecutionStrategy>,
}

impl fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOrchestrator").finish_non_exhaustive()
    }
}

impl TaskOrchestrator {
    pub fn new(session: Arc<dyn GridSession>, strategy: Arc<dyn ExecutionStrategy>) -> Self {
        Self { session, strategy }
    }

    fn assignments(&self) -> AssignmentStore {
        AssignmentStore::from_session(self.session.as_ref())
    }

    /// Plan the task against the given executors and register the result.
    /// A finished task keeps its current plan.
    pub fn orchestrate(&self, task_id: &str, executors: &[ExecutorInfo]) -> GridResult<ExecutionPlan> {
        let record = self
            .session
            .task_map()
            .get(&task_id.to_string())?
            .ok_or_else(|| GridError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        if record.is_done() {
            debug!(task_id = %task_id, "Task already done, plan unchanged");
            return Ok(record.execution_plan);
        }

        let plan = self.strategy.analyze(&record.execution_plan, executors);
        self.session.task_map().invoke(
            &task_id.to_string(),
            &UpdateExecutionPlanProcessor::new(plan.pruned()),
        )?;
        let changed = self.assignments().register_assignments(task_id, &plan)?;

        info!(
            task_id = %task_id,
            owners = plan.active_count(),
            changed = changed,
            "Task orchestrated"
        );
        Ok(plan)
    }

    /// Re-plan after executors have departed or joined
    pub fn recover(&self, task_id: &str, executors: &[ExecutorInfo]) -> GridResult<ExecutionPlan> {
        debug!(task_id = %task_id, executors = executors.len(), "Recovering task");
        self.orchestrate(task_id, executors)
    }

    /// Drop a finished task's assignments; the record goes too unless it asked
    /// to be retained. Returns whether the record was removed.
    pub fn cleanup(&self, task_id: &str) -> GridResult<bool> {
        self.assignments().remove_assignments(task_id)?;

        let key = task_id.to_string();
        let retained = self
            .session
            .task_map()
            .get(&key)?
            .is_some_and(|record| record.retain_duration.is_some());
        if retained {
            debug!(task_id = %task_id, "Task retained after cleanup");
            return Ok(false);
        }
        Ok(self.session.task_map().remove(&key)?.is_some())
    }

    /// Remove retained records whose deadline has passed
    pub fn expire_retained(&self, now: DateTime<Utc>) -> GridResult<usize> {
        let tasks = self.session.task_map();
        let expired: Vec<String> = tasks
            .entries_matching(&|_, record: &TaskRecord| {
                record.retain_deadline().is_some_and(|deadline| deadline <= now)
            })?
            .into_iter()
            .map(|(task_id, _)| task_id)
            .collect();

        let assignments = self.assignments();
        for task_id in &expired {
            assignments.remove_assignments(task_id)?;
        }
        let removed = tasks.remove_matching(&|task_id: &String, record: &TaskRecord| {
            expired.contains(task_id) && record.retain_deadline().is_some_and(|d| d <= now)
        })?;

        if removed > 0 {
            info!(removed = removed, "Expired retained tasks");
        }
        Ok(removed)
    }
}
