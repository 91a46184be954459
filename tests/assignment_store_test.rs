mod common;

use common::strategies::*;
use common::local_grid;
use grid_executor::assignment::{
    compose_key, AssignmentProcessor, AssignmentState, AssignmentStore, ClusteredAssignment,
    SetStateProcessor,
};
use grid_executor::cluster::{ClusteredMap, ClusteredMapExt, GridSession, LocalClusteredMap};
use grid_executor::task::{Action, ExecutionPlan};
use proptest::prelude::*;
use std::sync::Arc;

fn assignment_map() -> LocalClusteredMap<String, ClusteredAssignment> {
    LocalClusteredMap::standalone("assignments", 31)
}

proptest! {
    /// Property: assigning an identical payload twice leaves the record untouched
    #[test]
    fn repeated_assign_is_idempotent(
        assignment in assignment_strategy(),
        recover in any::<bool>(),
        progressed in assignment_state_strategy(),
    ) {
        let map = assignment_map();
        let key = assignment.key();
        let action = if recover { Action::Recover } else { Action::Assign };
        let processor = AssignmentProcessor::new(assignment.clone(), action);

        prop_assert!(map.invoke(&key, &processor).unwrap());
        map.invoke(&key, &SetStateProcessor::new(None, progressed)).unwrap();
        let before = map.get(&key).unwrap();

        prop_assert!(!map.invoke(&key, &processor).unwrap());
        prop_assert_eq!(map.get(&key).unwrap(), before);
    }

    /// Property: the state only moves when the stored state matches the expected one
    #[test]
    fn set_state_is_compare_and_set(
        assignment in assignment_strategy(),
        expected in assignment_state_strategy(),
        desired in assignment_state_strategy(),
    ) {
        let map = assignment_map();
        let key = assignment.key();
        let stored = assignment.state;
        map.put(key.clone(), assignment).unwrap();

        let found = map.invoke(&key, &SetStateProcessor::new(Some(expected), desired)).unwrap();
        prop_assert_eq!(found, Some(stored));

        let now = map.get(&key).unwrap().unwrap().state;
        if stored == expected {
            prop_assert_eq!(now, desired);
        } else {
            prop_assert_eq!(now, stored);
        }
    }
}

#[test]
fn executed_transition_requires_executing() {
    let map = assignment_map();
    let assignment = ClusteredAssignment::new("e1", "t1");
    let key = assignment.key();
    map.put(key.clone(), assignment).unwrap();

    let cas = SetStateProcessor::transition(AssignmentState::Executing, AssignmentState::Executed);
    assert_eq!(map.invoke(&key, &cas).unwrap(), Some(AssignmentState::Assigned));
    assert_eq!(
        map.get(&key).unwrap().unwrap().state,
        AssignmentState::Assigned
    );

    let claim = SetStateProcessor::transition(AssignmentState::Assigned, AssignmentState::Executing);
    assert_eq!(map.invoke(&key, &claim).unwrap(), Some(AssignmentState::Assigned));
    assert_eq!(map.invoke(&key, &cas).unwrap(), Some(AssignmentState::Executing));
    assert_eq!(
        map.get(&key).unwrap().unwrap().state,
        AssignmentState::Executed
    );
}

#[test]
fn set_state_on_missing_record_returns_none() {
    let map = assignment_map();
    let found = map
        .invoke(
            &compose_key("e1", "t1"),
            &SetStateProcessor::new(None, AssignmentState::Executing),
        )
        .unwrap();
    assert_eq!(found, None);
    assert!(map.is_empty().unwrap());
}

#[test]
fn register_applies_every_plan_action() {
    let grid = local_grid();
    let store = AssignmentStore::from_session(grid.as_ref());

    let plan = ExecutionPlan::new()
        .with_action("e1", Action::Assign)
        .with_action("e2", Action::Assign)
        .with_action("e3", Action::Recover);
    assert_eq!(store.register_assignments("t1", &plan).unwrap(), 3);
    assert_eq!(store.register_assignments("t1", &plan).unwrap(), 0);

    let next = ExecutionPlan::new()
        .with_action("e1", Action::Assign)
        .with_action("e2", Action::Reassign)
        .with_action("e3", Action::Release)
        .with_action("e4", Action::Recover);
    assert_eq!(store.register_assignments("t1", &next).unwrap(), 3);

    let executors: Vec<_> = store
        .assignments_for_task("t1")
        .unwrap()
        .into_iter()
        .map(|a| (a.executor_id, a.recovered))
        .collect();
    assert_eq!(
        executors,
        vec![("e1".to_string(), false), ("e4".to_string(), true)]
    );
}

#[test]
fn remove_assignments_only_touches_one_task() {
    let grid = local_grid();
    let store = AssignmentStore::from_session(grid.as_ref());
    let plan = ExecutionPlan::new()
        .with_action("e1", Action::Assign)
        .with_action("e2", Action::Assign);
    store.register_assignments("t1", &plan).unwrap();
    store.register_assignments("t2", &plan).unwrap();

    assert_eq!(store.remove_assignments("t1").unwrap(), 2);
    assert!(store.assignments_for_task("t1").unwrap().is_empty());
    assert_eq!(store.assignments_for_task("t2").unwrap().len(), 2);
    assert_eq!(grid.assignment_map().len().unwrap(), 2);
}

#[test]
fn invalid_executor_id_is_rejected() {
    let grid = local_grid();
    let store = AssignmentStore::from_session(grid.as_ref());
    let plan = ExecutionPlan::new().with_action("bad:id", Action::Assign);
    let err = store.register_assignments("t1", &plan).unwrap_err();
    assert!(err.is_illegal_argument());
}

#[test]
fn invalid_executor_id_leaves_no_partial_plan() {
    let grid = local_grid();
    let store = AssignmentStore::from_session(grid.as_ref());
    let plan = ExecutionPlan::new()
        .with_action("a1", Action::Assign)
        .with_action("bad:id", Action::Assign)
        .with_action("z9", Action::Assign);

    assert!(store.register_assignments("t1", &plan).is_err());
    assert!(store.assignments_for_task("t1").unwrap().is_empty());
    assert!(grid.assignment_map().is_empty().unwrap());
}

#[test]
fn concurrent_claims_have_one_winner() {
    let grid = local_grid();
    let store = Arc::new(AssignmentStore::from_session(grid.as_ref()));
    store
        .register_assignments("t1", &ExecutionPlan::new().with_action("e1", Action::Assign))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store
                    .set_state(
                        "e1",
                        "t1",
                        Some(AssignmentState::Assigned),
                        AssignmentState::Executing,
                    )
                    .unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|found| *found == Some(AssignmentState::Assigned))
        .count();
    assert_eq!(winners, 1);
}
