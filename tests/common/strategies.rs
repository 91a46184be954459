use grid_executor::assignment::{AssignmentState, ClusteredAssignment};
use grid_executor::partition::PartitionSet;
use proptest::prelude::*;

/// Strategy for partition counts, including counts that are not multiples of 64
pub fn partition_count_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![1u32..=70, Just(257u32), 100u32..=600]
}

/// Strategy for arbitrary (possibly empty) partition sets
pub fn partition_set_strategy() -> impl Strategy<Value = PartitionSet> {
    partition_count_strategy().prop_flat_map(|count| {
        prop::collection::vec(any::<bool>(), count as usize).prop_map(move |bits| {
            PartitionSet::from_partitions(
                count,
                bits.iter()
                    .enumerate()
                    .filter(|(_, set)| **set)
                    .map(|(p, _)| p as u32),
            )
        })
    })
}

/// Strategy for partition sets with at least one member
pub fn non_empty_partition_set_strategy() -> impl Strategy<Value = PartitionSet> {
    partition_set_strategy().prop_filter("partition set must not be empty", |s| !s.is_empty())
}

/// Strategy for identifiers usable as executor or task ids
pub fn id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

pub fn assignment_state_strategy() -> impl Strategy<Value = AssignmentState> {
    prop_oneof![
        Just(AssignmentState::Assigned),
        Just(AssignmentState::Executing),
        Just(AssignmentState::Executed),
    ]
}

pub fn assignment_strategy() -> impl Strategy<Value = ClusteredAssignment> {
    (id_strategy(), id_strategy(), assignment_state_strategy(), any::<bool>()).prop_map(
        |(executor_id, task_id, state, recovered)| {
            ClusteredAssignment::new(executor_id, task_id)
                .with_state(state)
                .recovered(recovered)
        },
    )
}
