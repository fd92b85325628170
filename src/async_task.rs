// ============================================================================
// File: packages/adles/src/async_task.rs
// ----------------------------------------------------------------------------
// Spawned-task handles used by driver and executor APIs.
//
// Driver calls return an `AsyncTask` rather than being `async fn`s so trait
// objects stay object safe and callers decide when to await.
// ============================================================================

use std::future::Future;

/// Handle to a spawned task
pub type AsyncTask<T> = tokio::task::JoinHandle<T>;

/// Builder for spawning an [`AsyncTask`]
pub struct AsyncTaskBuilder<F> {
    future: F,
    label: Option<String>,
}

impl<F> AsyncTaskBuilder<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    /// Wrap a future for spawning
    pub fn new(future: F) -> Self {
        Self {
            future,
            label: None,
        }
    }

    /// Attach a label, logged at trace level when the task is spawned
    pub fn with_label<L: Into<String>>(mut self, label: L) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Spawn the future on the current tokio runtime
    pub fn spawn(self) -> AsyncTask<F::Output> {
        if let Some(label) = &self.label {
            log::trace!("spawning task {label}");
        }
        tokio::spawn(self.future)
    }
}
