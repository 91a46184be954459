#![allow(dead_code)]

pub mod strategies;

use grid_executor::cluster::{LocalGrid, TokioListenerExecutor};
use grid_executor::config::GridConfig;
use grid_executor::error::GridError;
use grid_executor::task::{TaskNotification, TaskSubscriber};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub fn local_grid() -> Arc<LocalGrid> {
    Arc::new(LocalGrid::new(GridConfig::default()))
}

/// Listener executor on the current test runtime
pub fn listener_executor() -> Arc<TokioListenerExecutor> {
    Arc::new(
        TokioListenerExecutor::current("test-listeners")
            .expect("tests run inside a tokio runtime"),
    )
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Subscriber that records every delivery
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    received: Mutex<Vec<TaskNotification>>,
}

impl RecordingSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn received(&self) -> Vec<TaskNotification> {
        self.received.lock().clone()
    }

    pub fn values(&self) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter_map(|n| match n {
                TaskNotification::Next(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn terminal(&self) -> Option<TaskNotification> {
        self.received().into_iter().find(TaskNotification::is_terminal)
    }
}

impl TaskSubscriber for RecordingSubscriber {
    fn on_next(&self, value: &Value) {
        self.received.lock().push(TaskNotification::Next(value.clone()));
    }

    fn on_error(&self, error: &GridError) {
        self.received.lock().push(TaskNotification::Error(error.clone()));
    }

    fn on_complete(&self) {
        self.received.lock().push(TaskNotification::Complete);
    }
}
