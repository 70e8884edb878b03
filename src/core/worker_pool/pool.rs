//! The pool handle: submission, result stream, statistics, and shutdown.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::core::aggregator::ResultAggregator;
use crate::core::{
    PoolError, SubmitOptions, Task, TaskError, TaskExecutor, TaskHandle, TaskMetadata, TaskResult,
};
use crate::infra::queue::PushError;
use crate::infra::JobQueue;
use crate::policy::{AdmissionController, CircuitBreaker, RetryPolicy, TokenBucket, Unlimited};

use super::worker::{spawn_worker, WorkerShared};
use super::{PoolCounters, PoolReport, PoolState, PoolStats, WorkerStats};

/// Fixed-size pool of worker threads executing tasks with admission
/// control, circuit breaking, retries, and bounded queues on both ends.
///
/// # Guarantees
///
/// - Every accepted task yields exactly one [`TaskResult`] on the stream
///   returned by [`results`](Self::results), unless the pool is dropped
///   without calling [`shutdown`](Self::shutdown).
/// - Rejected submissions never produce a result.
/// - The result stream ends only after `shutdown` has joined every worker.
///
/// # Backpressure
///
/// Workers block while the result channel is full. Consume results on
/// another thread while calling `shutdown(true)`, or size
/// `result_capacity` for the whole workload.
pub struct WorkerPool<P, O, E>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    E: TaskExecutor<P, O>,
{
    /// Pool identifier, attached to every log line.
    id: Uuid,

    /// Pool configuration.
    config: PoolConfig,

    /// Shared job queue.
    queue: Arc<JobQueue<P>>,

    /// Admission gate consulted before queueing.
    admission: Arc<dyn AdmissionController>,

    /// Circuit breaker shared with workers.
    breaker: Arc<CircuitBreaker>,

    /// Pool statistics counters (lock-free atomics).
    counters: Arc<PoolCounters>,

    /// Lifecycle state, encoded as [`PoolState::as_u8`].
    state: AtomicU8,

    /// Pool-side result sender, used for cancelled tasks and dropped last.
    results_tx: Mutex<Option<Sender<TaskResult<O>>>>,

    /// Template receiver cloned into every aggregator.
    results_rx: Receiver<TaskResult<O>>,

    /// Cancelled when stopping without draining.
    shutdown_token: CancellationToken,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<WorkerStats>>>,

    /// Report of the first completed shutdown; doubles as the shutdown lock.
    report: Mutex<Option<PoolReport>>,

    /// Task ID counter (lock-free atomic).
    task_id_counter: AtomicU64,

    _executor: PhantomData<E>,
}

impl<P, O, E> WorkerPool<P, O, E>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    E: TaskExecutor<P, O>,
{
    /// Create a pool and start `config.worker_count` workers.
    ///
    /// Admission uses a token bucket when `config.rate_limit` is set and
    /// admits everything otherwise.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::WorkerSpawn` if a worker thread or runtime cannot start
    pub fn new(config: PoolConfig, executor: E) -> Result<Self, PoolError> {
        let admission: Arc<dyn AdmissionController> = match &config.rate_limit {
            Some(rate) => Arc::new(TokenBucket::from_config(rate)),
            None => Arc::new(Unlimited),
        };
        let breaker = Arc::new(CircuitBreaker::new(&config.circuit_breaker));
        Self::with_components(config, executor, admission, breaker)
    }

    /// Create a pool around an explicit admission controller and breaker.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_components(
        config: PoolConfig,
        executor: E,
        admission: Arc<dyn AdmissionController>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let id = Uuid::new_v4();
        let queue = Arc::new(JobQueue::new(config.queue_capacity));
        let (results_tx, results_rx) = bounded(config.result_capacity);
        let counters = Arc::new(PoolCounters::default());
        let shutdown_token = CancellationToken::new();
        let retry = RetryPolicy::new(&config.retry);

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let shared = WorkerShared {
                pool_id: id,
                queue: Arc::clone(&queue),
                results: results_tx.clone(),
                breaker: Arc::clone(&breaker),
                retry: retry.clone(),
                counters: Arc::clone(&counters),
                shutdown: shutdown_token.clone(),
            };
            match spawn_worker(worker_id, shared, executor.clone(), config.thread_stack_size) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    warn!(pool_id = %id, worker_id = worker_id, error = %e, "failed to spawn worker");
                    // Release the workers that did start before bailing out.
                    queue.close();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::WorkerSpawn(e.to_string()));
                }
            }
        }

        info!(
            pool_id = %id,
            worker_count = config.worker_count,
            queue_capacity = config.queue_capacity,
            result_capacity = config.result_capacity,
            rate_limited = config.rate_limit.is_some(),
            "worker pool started"
        );

        Ok(Self {
            id,
            config,
            queue,
            admission,
            breaker,
            counters,
            state: AtomicU8::new(PoolState::Running.as_u8()),
            results_tx: Mutex::new(Some(results_tx)),
            results_rx,
            shutdown_token,
            workers: Mutex::new(workers),
            report: Mutex::new(None),
            task_id_counter: AtomicU64::new(1),
            _executor: PhantomData,
        })
    }

    /// Pool identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Submit a task.
    ///
    /// Checks run in order: pool state, circuit breaker, admission, then the
    /// queue. With `options.timeout == None` the call blocks until queue
    /// space frees up or the pool stops; `Some(Duration::ZERO)` never blocks.
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolStopped` if shutdown has begun
    /// - `PoolError::CircuitOpen` if the breaker is rejecting calls
    /// - `PoolError::AdmissionRejected` if the admission controller refused
    /// - `PoolError::QueueFull` if no queue space appeared within the timeout
    pub fn submit(&self, payload: P, options: SubmitOptions) -> Result<TaskHandle, PoolError> {
        if self.state() != PoolState::Running {
            return Err(self.reject(PoolError::PoolStopped));
        }
        if self.breaker.is_rejecting() {
            return Err(self.reject(PoolError::CircuitOpen));
        }
        if !self.admission.allow(1) {
            return Err(self.reject(PoolError::AdmissionRejected));
        }

        let meta = TaskMetadata {
            id: self.task_id_counter.fetch_add(1, Ordering::Relaxed),
            priority: options.priority,
            submitted_at: Instant::now(),
            deadline: options.deadline,
        };
        let handle = TaskHandle::new(&meta);

        match self.queue.push(Task { meta, payload }, options.timeout) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(pool_id = %self.id, task_id = handle.id(), priority = ?handle.priority(), "task submitted");
                Ok(handle)
            }
            Err(PushError::Full) => Err(self.reject(PoolError::QueueFull)),
            Err(PushError::Closed) => Err(self.reject(PoolError::PoolStopped)),
        }
    }

    /// A stream of task results.
    ///
    /// Every aggregator shares one channel, so each result is delivered to
    /// exactly one of them. The stream ends after [`shutdown`](Self::shutdown)
    /// completes and every buffered result has been taken.
    #[must_use]
    pub fn results(&self) -> ResultAggregator<O> {
        ResultAggregator::new(self.results_rx.clone())
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(
            self.config.worker_count,
            self.state(),
            self.queue.len(),
            self.breaker.state(),
        )
    }

    /// Stop the pool and wait for every worker to exit.
    ///
    /// With `drain == true` queued tasks still run. With `drain == false`
    /// queued tasks are reported as [`TaskError::Cancelled`] and running
    /// executors see [`TaskContext::is_cancelled`](crate::core::TaskContext::is_cancelled)
    /// turn true; in-flight attempts are never interrupted.
    ///
    /// Idempotent: later and concurrent calls wait for the first shutdown and
    /// return its report.
    pub fn shutdown(&self, drain: bool) -> PoolReport {
        let mut report = self.report.lock();
        if let Some(existing) = report.as_ref() {
            return existing.clone();
        }

        let transitional = if drain {
            PoolState::Draining
        } else {
            PoolState::Stopping
        };
        self.state.store(transitional.as_u8(), Ordering::Release);
        info!(pool_id = %self.id, drain = drain, queued = self.queue.len(), "shutting down worker pool");

        let abandoned = if drain {
            self.queue.close();
            Vec::new()
        } else {
            let abandoned = self.queue.abandon();
            self.shutdown_token.cancel();
            abandoned
        };

        let mut worker_stats = Vec::with_capacity(self.config.worker_count);
        let mut lost_workers = 0;
        for (worker_id, handle) in self.workers.lock().drain(..).enumerate() {
            match handle.join() {
                Ok(stats) => {
                    debug!(pool_id = %self.id, worker_id = worker_id, "worker joined");
                    worker_stats.push(stats);
                }
                Err(_) => {
                    warn!(pool_id = %self.id, worker_id = worker_id, "worker thread panicked");
                    lost_workers += 1;
                }
            }
        }

        let abandoned_count = u64::try_from(abandoned.len()).unwrap_or(u64::MAX);
        if let Some(tx) = self.results_tx.lock().take() {
            for task in abandoned {
                let result = TaskResult::not_run(task.meta.id, TaskError::Cancelled, None);
                if tx.send(result).is_err() {
                    break;
                }
            }
        }

        self.state.store(PoolState::Stopped.as_u8(), Ordering::Release);
        let summary = PoolReport::new(drain, worker_stats, abandoned_count, lost_workers);
        info!(
            pool_id = %self.id,
            executed = summary.totals.executed,
            succeeded = summary.totals.succeeded,
            failed = summary.totals.failed,
            abandoned = summary.abandoned,
            "worker pool shut down"
        );
        *report = Some(summary.clone());
        summary
    }

    fn reject(&self, error: PoolError) -> PoolError {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(pool_id = %self.id, error = %error, "submission rejected");
        error
    }
}

impl<P, O, E> Drop for WorkerPool<P, O, E>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    E: TaskExecutor<P, O>,
{
    fn drop(&mut self) {
        // Signal shutdown but don't join; explicit shutdown() is the graceful path.
        if self.report.get_mut().is_none() {
            self.state.store(PoolState::Stopped.as_u8(), Ordering::Release);
            self.shutdown_token.cancel();
            let dropped = self.queue.abandon();
            self.results_tx.get_mut().take();
            debug!(
                pool_id = %self.id,
                dropped_tasks = dropped.len(),
                "worker pool dropped without shutdown, workers detached"
            );
        }
    }
}
