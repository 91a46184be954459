//! Entry processors for assignment records. They are the only way assignment
//! records change, so concurrent executors and orchestrators never race on a
//! client-side read-modify-write.

use super::model::ClusteredAssignment;
use super::states::AssignmentState;
use crate::cluster::map::{EntryProcessor, MapEntry};
use crate::task::plan::Action;

/// Applies one plan action to an `executorId:taskId` record; returns whether
/// the record changed
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentProcessor {
    pub assignment: ClusteredAssignment,
    pub action: Action,
}

impl AssignmentProcessor {
    pub fn new(assignment: ClusteredAssignment, action: Action) -> Self {
        Self { assignment, action }
    }
}

impl EntryProcessor<String, ClusteredAssignment> for AssignmentProcessor {
    type Output = bool;

    fn process(&self, entry: &mut MapEntry<String, ClusteredAssignment>) -> bool {
        match self.action {
            Action::Assign | Action::Recover => {
                let desired = ClusteredAssignment {
                    state: AssignmentState::Assigned,
                    recovered: self.action == Action::Recover,
                    ..self.assignment.clone()
                };
                // Retried registration: keep the record and its progress
                if entry
                    .value()
                    .is_some_and(|existing| existing.same_binding(&desired))
                {
                    return false;
                }
                entry.set_value(desired);
                true
            }
            Action::Reassign | Action::Release => {
                let present = entry.is_present();
                entry.remove();
                present
            }
        }
    }
}

/// Compare-and-set of the state field. With no `previous` the state is set
/// unconditionally. Returns the state found, `None` when there is no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetStateProcessor {
    pub previous: Option<AssignmentState>,
    pub desired: AssignmentState,
}

impl SetStateProcessor {
    pub fn new(previous: Option<AssignmentState>, desired: AssignmentState) -> Self {
        Self { previous, desired }
    }

    pub fn transition(previous: AssignmentState, desired: AssignmentState) -> Self {
        Self::new(Some(previous), desired)
    }
}

impl EntryProcessor<String, ClusteredAssignment> for SetStateProcessor {
    type Output = Option<AssignmentState>;

    fn process(
        &self,
        entry: &mut MapEntry<String, ClusteredAssignment>,
    ) -> Option<AssignmentState> {
        let current = entry.value()?.state;
        let expected = self.previous.map_or(true, |previous| previous == current);
        if expected && current != self.desired {
            entry.update(|assignment| assignment.state = self.desired);
        }
        Some(current)
    }
}
