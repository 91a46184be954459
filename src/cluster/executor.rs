//! Executor used to attach and detach listeners off the event dispatch path.

use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::debug;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Work refused because the executor is shutting down
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Executor '{executor}' rejected work: shutting down")]
pub struct RejectedExecution {
    pub executor: String,
}

pub trait ListenerExecutor: Send + Sync {
    fn execute(&self, job: Job) -> Result<(), RejectedExecution>;

    fn is_shutdown(&self) -> bool;
}

/// Runs jobs on the tokio blocking pool of a runtime
#[derive(Debug)]
pub struct TokioListenerExecutor {
    name: String,
    handle: Handle,
    shutdown: AtomicBool,
}

impl TokioListenerExecutor {
    pub fn new(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Bind to the runtime of the calling task; `None` outside a runtime
    pub fn current(name: impl Into<String>) -> Option<Self> {
        Handle::try_current().ok().map(|handle| Self::new(name, handle))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Refuse all further work
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            debug!(executor = %self.name, "Listener executor shut down");
        }
    }
}

impl ListenerExecutor for TokioListenerExecutor {
    fn execute(&self, job: Job) -> Result<(), RejectedExecution> {
        if self.is_shutdown() {
            return Err(RejectedExecution {
                executor: self.name.clone(),
            });
        }
        // Jobs make blocking map calls, keep them off the async workers
        self.handle.spawn_blocking(job);
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_executes_until_shutdown() {
        let executor = TokioListenerExecutor::current("test-executor").unwrap();
        let (tx, rx) = oneshot::channel();
        executor
            .execute(Box::new(move || {
                let _ = tx.send(42);
            }))
            .unwrap();
        assert_eq!(rx.await.unwrap(), 42);

        executor.shutdown();
        assert!(executor.is_shutdown());
        let err = executor.execute(Box::new(|| {})).unwrap_err();
        assert_eq!(err.executor, "test-executor");
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(TokioListenerExecutor::current("none").is_none());
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let executor: Arc<dyn ListenerExecutor> =
            Arc::new(TokioListenerExecutor::new("owned", runtime.handle().clone()));
        assert!(!executor.is_shutdown());
    }
}
