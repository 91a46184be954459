use super::states::AssignmentState;
use crate::constants::ASSIGNMENT_KEY_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binding of a task to one executor, keyed by `executorId:taskId`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusteredAssignment {
    pub executor_id: String,
    pub task_id: String,
    pub state: AssignmentState,
    /// Handed to this executor after the original one was lost
    pub recovered: bool,
}

impl ClusteredAssignment {
    pub fn new(executor_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            executor_id: executor_id.into(),
            task_id: task_id.into(),
            state: AssignmentState::Assigned,
            recovered: false,
        }
    }

    pub fn recovered(mut self, recovered: bool) -> Self {
        self.recovered = recovered;
        self
    }

    pub fn with_state(mut self, state: AssignmentState) -> Self {
        self.state = state;
        self
    }

    pub fn key(&self) -> String {
        compose_key(&self.executor_id, &self.task_id)
    }

    /// Same executor, task and recovery flag, regardless of progress
    pub fn same_binding(&self, other: &ClusteredAssignment) -> bool {
        self.executor_id == other.executor_id
            && self.task_id == other.task_id
            && self.recovered == other.recovered
    }
}

impl fmt::Display for ClusteredAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClusteredAssignment{{executorId={}, taskId={}, state={}, recovered={}}}",
            self.executor_id, self.task_id, self.state, self.recovered
        )
    }
}

pub fn compose_key(executor_id: &str, task_id: &str) -> String {
    format!("{executor_id}{ASSIGNMENT_KEY_SEPARATOR}{task_id}")
}

/// Split a key at the first separator; executor ids never contain one
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(ASSIGNMENT_KEY_SEPARATOR)
}
