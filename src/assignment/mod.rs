//! # Executor Assignments
//!
//! Per-(executor, task) assignment records with the
//! `ASSIGNED -> EXECUTING -> EXECUTED` state machine, the entry processors that
//! mutate them and the store that applies execution plans.

pub mod model;
pub mod processors;
pub mod states;
pub mod store;

pub use model::{compose_key, split_key, ClusteredAssignment};
pub use processors::{AssignmentProcessor, SetStateProcessor};
pub use states::AssignmentState;
pub use store::AssignmentStore;
