//! # Clustered Tasks
//!
//! Task records and their processors, execution planning, the executor-side
//! worker and the client-side [`TaskCoordinator`] that relays results to local
//! subscribers.

pub mod coordinator;
pub mod orchestrator;
pub mod plan;
pub mod processors;
pub mod record;
pub mod strategy;
pub mod subscriber;
pub mod worker;

pub use coordinator::TaskCoordinator;
pub use orchestrator::TaskOrchestrator;
pub use plan::{Action, ExecutionPlan};
pub use processors::{
    ClearCompletionCallbackProcessor, CompleteTaskProcessor, ContributeResultProcessor,
    InsertIfAbsentProcessor, TerminateProcessor, UpdateExecutionPlanProcessor,
};
pub use record::{CompletionCallback, TaskBody, TaskContext, TaskOutcome, TaskRecord, TaskState};
pub use strategy::{ExecutionStrategy, ExecutorInfo, StandardExecutionStrategy};
pub use subscriber::{ChannelSubscriber, TaskNotification, TaskSubscriber};
pub use worker::ExecutorWorker;
