//! # Assignment Store
//!
//! Clustered store of `executorId:taskId` assignment records. Every change is
//! an entry processor invocation; errors from the map propagate unchanged and
//! retry belongs to the scheduling layer above.

use super::model::{compose_key, ClusteredAssignment};
use super::processors::{AssignmentProcessor, SetStateProcessor};
use super::states::AssignmentState;
use crate::cluster::map::ClusteredMapExt;
use crate::cluster::session::{AssignmentMap, GridSession};
use crate::constants::ASSIGNMENT_KEY_SEPARATOR;
use crate::error::{GridError, GridResult};
use crate::logging::log_assignment_operation;
use crate::task::plan::ExecutionPlan;
use std::fmt;
use tracing::debug;

#[derive(Clone)]
pub struct AssignmentStore {
    map: AssignmentMap,
}

impl fmt::Debug for AssignmentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignmentStore")
            .field("map", &self.map.name())
            .finish()
    }
}

impl AssignmentStore {
    pub fn new(map: AssignmentMap) -> Self {
        Self { map }
    }

    pub fn from_session(session: &dyn GridSession) -> Self {
        Self::new(session.assignment_map())
    }

    /// Apply the plan's action for every executor it names; returns the number
    /// of records that changed
    pub fn register_assignments(&self, task_id: &str, plan: &ExecutionPlan) -> GridResult<usize> {
        // Reject the whole plan before any record is written
        for (executor_id, _) in plan.iter() {
            validate_executor_id(executor_id)?;
        }
        let mut changed = 0;
        for (executor_id, action) in plan.iter() {
            let processor =
                AssignmentProcessor::new(ClusteredAssignment::new(executor_id, task_id), action);
            let key = compose_key(executor_id, task_id);
            if self.map.invoke(&key, &processor)? {
                changed += 1;
                log_assignment_operation(
                    "register",
                    executor_id,
                    task_id,
                    None,
                    Some(&action.to_string()),
                );
            }
        }
        debug!(task_id = %task_id, changed = changed, "Registered assignments");
        Ok(changed)
    }

    /// Remove every record belonging to `task_id`
    pub fn remove_assignments(&self, task_id: &str) -> GridResult<usize> {
        let removed = self
            .map
            .remove_matching(&|_, assignment: &ClusteredAssignment| assignment.task_id == task_id)?;
        log_assignment_operation(
            "remove_all",
            "*",
            task_id,
            None,
            Some(&format!("removed={removed}")),
        );
        Ok(removed)
    }

    /// Compare-and-set the state of one record, returning the state found
    pub fn set_state(
        &self,
        executor_id: &str,
        task_id: &str,
        previous: Option<AssignmentState>,
        desired: AssignmentState,
    ) -> GridResult<Option<AssignmentState>> {
        let key = compose_key(executor_id, task_id);
        let found = self
            .map
            .invoke(&key, &SetStateProcessor::new(previous, desired))?;
        let applied = found.is_some() && previous.map_or(true, |p| Some(p) == found);
        log_assignment_operation(
            "set_state",
            executor_id,
            task_id,
            Some(&desired.to_string()),
            Some(if applied { "applied" } else { "skipped" }),
        );
        Ok(found)
    }

    pub fn get(&self, executor_id: &str, task_id: &str) -> GridResult<Option<ClusteredAssignment>> {
        self.map.get(&compose_key(executor_id, task_id))
    }

    pub fn assignments_for_executor(&self, executor_id: &str) -> GridResult<Vec<ClusteredAssignment>> {
        let mut assignments: Vec<_> = self
            .map
            .entries_matching(&|_, assignment: &ClusteredAssignment| {
                assignment.executor_id == executor_id
            })?
            .into_iter()
            .map(|(_, assignment)| assignment)
            .collect();
        assignments.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(assignments)
    }

    pub fn assignments_for_task(&self, task_id: &str) -> GridResult<Vec<ClusteredAssignment>> {
        let mut assignments: Vec<_> = self
            .map
            .entries_matching(&|_, assignment: &ClusteredAssignment| assignment.task_id == task_id)?
            .into_iter()
            .map(|(_, assignment)| assignment)
            .collect();
        assignments.sort_by(|a, b| a.executor_id.cmp(&b.executor_id));
        Ok(assignments)
    }
}

fn validate_executor_id(executor_id: &str) -> GridResult<()> {
    if executor_id.is_empty() || executor_id.contains(ASSIGNMENT_KEY_SEPARATOR) {
        return Err(GridError::InvalidInput(format!(
            "executor id '{executor_id}' must be non-empty and must not contain '{ASSIGNMENT_KEY_SEPARATOR}'"
        )));
    }
    Ok(())
}
