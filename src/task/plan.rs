use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What the assignment store should do for one executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Run the task on this executor
    Assign,
    /// Run the task on this executor in place of a lost one
    Recover,
    /// Take the task away because the executor is gone
    Reassign,
    /// Take the task away because it is no longer needed there
    Release,
}

impl Action {
    /// Whether the executor should hold an assignment after this action
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Assign | Self::Recover)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign => write!(f, "ASSIGN"),
            Self::Recover => write!(f, "RECOVER"),
            Self::Reassign => write!(f, "REASSIGN"),
            Self::Release => write!(f, "RELEASE"),
        }
    }
}

/// Per-task mapping from executor id to action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    actions: BTreeMap<String, Action>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, executor_id: impl Into<String>, action: Action) -> Self {
        self.set_action(executor_id, action);
        self
    }

    pub fn set_action(&mut self, executor_id: impl Into<String>, action: Action) -> Option<Action> {
        self.actions.insert(executor_id.into(), action)
    }

    pub fn action(&self, executor_id: &str) -> Option<Action> {
        self.actions.get(executor_id).copied()
    }

    /// Whether `executor_id` currently holds the task
    pub fn is_owner(&self, executor_id: &str) -> bool {
        self.action(executor_id).is_some_and(|a| a.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.actions.values().filter(|a| a.is_active()).count()
    }

    pub fn active_executors(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.actions
            .iter()
            .filter(|(_, a)| a.is_active())
            .map(|(id, _)| id.as_str())
    }

    /// Only the executors that keep the task
    pub fn pruned(&self) -> Self {
        Self {
            actions: self
                .actions
                .iter()
                .filter(|(_, a)| a.is_active())
                .map(|(id, a)| (id.clone(), *a))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Action)> {
        self.actions.iter().map(|(id, a)| (id.as_str(), *a))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_ownership_and_pruning() {
        let plan = ExecutionPlan::new()
            .with_action("a", Action::Assign)
            .with_action("b", Action::Recover)
            .with_action("c", Action::Reassign)
            .with_action("d", Action::Release);

        assert!(plan.is_owner("a"));
        assert!(plan.is_owner("b"));
        assert!(!plan.is_owner("c"));
        assert!(!plan.is_owner("missing"));
        assert_eq!(plan.active_count(), 2);

        let pruned = plan.pruned();
        assert_eq!(pruned.len(), 2);
        assert_eq!(pruned.active_executors().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(Action::Recover.to_string(), "RECOVER");
        assert_eq!(
            serde_json::to_string(&Action::Reassign).unwrap(),
            "\"REASSIGN\""
        );
    }
}
