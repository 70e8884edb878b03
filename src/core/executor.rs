//! Task execution trait and a closure adapter.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use super::{TaskContext, TaskError};

/// Executes task payloads on pool workers.
///
/// The payload is borrowed so the retry policy can run the same input again
/// after a transient failure. Neither the payload nor the output needs to be
/// serializable; outputs may hold channels, handles, and so on.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_task_engine::core::{TaskContext, TaskError, TaskExecutor};
///
/// #[derive(Clone)]
/// struct Fetcher;
///
/// #[async_trait]
/// impl TaskExecutor<String, usize> for Fetcher {
///     async fn execute(&self, url: &String, _ctx: &TaskContext) -> Result<usize, TaskError> {
///         fetch(url).await.map_err(|e| TaskError::transient(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor<P, O>: Send + Sync + Clone + 'static
where
    P: Send + Sync + 'static,
    O: Send + 'static,
{
    /// Run one attempt.
    ///
    /// # Threading
    ///
    /// Called from a dedicated worker thread with its own single-threaded
    /// tokio runtime, so blocking here only stalls that worker.
    ///
    /// # Errors
    ///
    /// Return [`TaskError::transient`] for failures worth retrying and
    /// [`TaskError::permanent`] otherwise. Panics are caught by the worker and
    /// reported as [`TaskError::InternalFault`].
    async fn execute(&self, payload: &P, ctx: &TaskContext) -> Result<O, TaskError>;
}

/// Adapts a synchronous closure into a [`TaskExecutor`].
pub struct FnExecutor<P, O, F> {
    func: Arc<F>,
    _types: PhantomData<fn(&P) -> O>,
}

impl<P, O, F> FnExecutor<P, O, F>
where
    F: Fn(&P, &TaskContext) -> Result<O, TaskError> + Send + Sync + 'static,
{
    /// Wrap a closure.
    pub fn new(func: F) -> Self {
        Self {
            func: Arc::new(func),
            _types: PhantomData,
        }
    }
}

impl<P, O, F> Clone for FnExecutor<P, O, F> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<P, O, F> TaskExecutor<P, O> for FnExecutor<P, O, F>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    F: Fn(&P, &TaskContext) -> Result<O, TaskError> + Send + Sync + 'static,
{
    async fn execute(&self, payload: &P, ctx: &TaskContext) -> Result<O, TaskError> {
        (self.func)(payload, ctx)
    }
}
