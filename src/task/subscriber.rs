//! Local subscribers to a coordinated task.

use crate::error::GridError;
use futures::channel::mpsc;
use serde_json::Value;
use tracing::trace;

/// Receives a task's results. After `on_error` or `on_complete` nothing
/// further is delivered.
pub trait TaskSubscriber: Send + Sync {
    fn on_next(&self, value: &Value);

    fn on_error(&self, error: &GridError);

    fn on_complete(&self);
}

/// One delivery to a subscriber, as a value
#[derive(Debug, Clone, PartialEq)]
pub enum TaskNotification {
    Next(Value),
    Error(GridError),
    Complete,
}

impl TaskNotification {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }
}

/// Forwards deliveries into an unbounded channel, read as a `Stream`
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<TaskNotification>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskNotification>) {
        let (sender, receiver) = mpsc::unbounded();
        (Self { sender }, receiver)
    }

    fn forward(&self, notification: TaskNotification) {
        let terminal = notification.is_terminal();
        if self.sender.unbounded_send(notification).is_err() {
            trace!("Task notification receiver dropped");
        }
        if terminal {
            self.sender.close_channel();
        }
    }
}

impl TaskSubscriber for ChannelSubscriber {
    fn on_next(&self, value: &Value) {
        self.forward(TaskNotification::Next(value.clone()));
    }

    fn on_error(&self, error: &GridError) {
        self.forward(TaskNotification::Error(error.clone()));
    }

    fn on_complete(&self) {
        self.forward(TaskNotification::Complete);
    }
}
