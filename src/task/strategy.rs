//! Execution strategies decide which executors run a task.

use super::plan::{Action, ExecutionPlan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What the cluster knows about one executor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: String,
    /// Accepting work; `false` once the executor closed or its member left
    pub running: bool,
}

impl ExecutorInfo {
    pub fn running(executor_id: impl Into<String>) -> Self {
        Self {
            executor_id: executor_id.into(),
            running: true,
        }
    }

    pub fn stopped(executor_id: impl Into<String>) -> Self {
        Self {
            executor_id: executor_id.into(),
            running: false,
        }
    }
}

pub trait ExecutionStrategy: Send + Sync {
    /// Derive the next plan from the current one and the known executors
    fn analyze(&self, current: &ExecutionPlan, executors: &[ExecutorInfo]) -> ExecutionPlan;
}

/// Runs a task on `desired_executors` running executors, or on every running
/// executor when unset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardExecutionStrategy {
    pub desired_executors: Option<usize>,
}

impl StandardExecutionStrategy {
    pub fn all() -> Self {
        Self {
            desired_executors: None,
        }
    }

    pub fn any() -> Self {
        Self::limited(1)
    }

    pub fn limited(desired: usize) -> Self {
        Self {
            desired_executors: Some(desired),
        }
    }
}

impl ExecutionStrategy for StandardExecutionStrategy {
    fn analyze(&self, current: &ExecutionPlan, executors: &[ExecutorInfo]) -> ExecutionPlan {
        let live: BTreeSet<&str> = executors
            .iter()
            .filter(|e| e.running)
            .map(|e| e.executor_id.as_str())
            .collect();

        let mut plan = current.clone();

        // Active executors that went away lose the task
        let mut lost = 0usize;
        for (executor_id, action) in current.iter() {
            if action.is_active() && !live.contains(executor_id) {
                plan.set_action(executor_id, Action::Reassign);
                lost += 1;
            }
        }

        let desired = self.desired_executors.unwrap_or(live.len());
        let mut active = plan.active_count();

        for executor_id in &live {
            if active >= desired {
                break;
            }
            if plan.is_owner(executor_id) {
                continue;
            }
            let action = if lost > 0 {
                lost -= 1;
                Action::Recover
            } else {
                Action::Assign
            };
            plan.set_action(*executor_id, action);
            active += 1;
        }

        if active > desired {
            let surplus: Vec<String> = plan
                .active_executors()
                .rev()
                .take(active - desired)
                .map(str::to_string)
                .collect();
            for executor_id in surplus {
                plan.set_action(executor_id, Action::Release);
            }
        }

        plan
    }
}
