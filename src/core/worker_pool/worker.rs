//! Worker thread loop.

use std::any::Any;
use std::cell::Cell;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::Sender;
use futures::FutureExt;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn};
use uuid::Uuid;

use crate::core::{Task, TaskContext, TaskError, TaskExecutor, TaskResult};
use crate::infra::JobQueue;
use crate::policy::{CircuitBreaker, RetryPolicy};

use super::{PoolCounters, WorkerStats};

/// Everything a worker shares with its pool.
pub(super) struct WorkerShared<P, O> {
    pub pool_id: Uuid,
    pub queue: Arc<JobQueue<P>>,
    pub results: Sender<TaskResult<O>>,
    pub breaker: Arc<CircuitBreaker>,
    pub retry: RetryPolicy,
    pub counters: Arc<PoolCounters>,
    pub shutdown: CancellationToken,
}

/// Spawn one worker thread with its own single-threaded tokio runtime.
///
/// The runtime is built on the calling thread so a failure surfaces as an
/// error instead of a worker that silently never runs.
pub(super) fn spawn_worker<P, O, E>(
    worker_id: usize,
    shared: WorkerShared<P, O>,
    executor: E,
    stack_size: usize,
) -> io::Result<JoinHandle<WorkerStats>>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    E: TaskExecutor<P, O>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name(format!("engine-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || run_worker(worker_id, &shared, &executor, &rt))
}

fn run_worker<P, O, E>(
    worker_id: usize,
    shared: &WorkerShared<P, O>,
    executor: &E,
    rt: &Runtime,
) -> WorkerStats
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    E: TaskExecutor<P, O>,
{
    let span = info_span!("worker", pool_id = %shared.pool_id, worker_id = worker_id);
    let _entered = span.enter();
    debug!("worker thread started");

    let mut stats = WorkerStats::new(worker_id);

    // Blocks on the queue condvar; None means closed-and-drained or abandoned.
    while let Some(task) = shared.queue.pop() {
        shared.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        stats.executed += 1;

        let result = execute_task(worker_id, shared, executor, rt, &task, &mut stats);
        let failed = result.outcome.is_err();

        shared.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
        shared.counters.completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
        }

        // Blocks while the result channel is full.
        if shared.results.send(result).is_err() {
            warn!(task_id = task.meta.id, "result receiver dropped, discarding result");
        }
    }

    debug!(executed = stats.executed, "worker thread exiting");
    stats
}

fn execute_task<P, O, E>(
    worker_id: usize,
    shared: &WorkerShared<P, O>,
    executor: &E,
    rt: &Runtime,
    task: &Task<P>,
    stats: &mut WorkerStats,
) -> TaskResult<O>
where
    P: Send + Sync + 'static,
    O: Send + 'static,
    E: TaskExecutor<P, O>,
{
    let task_id = task.meta.id;

    let Some(permit) = shared.breaker.allow() else {
        debug!(task_id = task_id, "circuit open, task not executed");
        stats.circuit_rejected += 1;
        stats.failed += 1;
        return TaskResult::not_run(task_id, TaskError::CircuitOpen, Some(worker_id));
    };

    debug!(task_id = task_id, priority = ?task.meta.priority, "executing task");
    let started = Instant::now();
    let deadline = task.meta.deadline.or_else(|| shared.retry.deadline());
    let panics = Cell::new(0_u64);

    let run_attempt = |attempt| {
        let ctx = TaskContext {
            meta: task.meta.clone(),
            attempt,
            worker_id,
            shutdown: shared.shutdown.clone(),
        };
        let payload = &task.payload;
        let panics = &panics;
        async move {
            match AssertUnwindSafe(executor.execute(payload, &ctx))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    panics.set(panics.get() + 1);
                    let message = panic_message(panic.as_ref());
                    error!(task_id = ctx.meta.id, attempt = attempt, panic = %message, "executor panicked");
                    Err(TaskError::InternalFault(message))
                }
            }
        }
    };
    let outcome = rt.block_on(shared.retry.execute_cancellable(
        deadline,
        &shared.shutdown,
        run_attempt,
    ));
    let duration = started.elapsed();

    let success = outcome.result.is_ok();
    shared.breaker.record_result(permit, success);

    stats.busy += duration;
    stats.retries += u64::from(outcome.attempts.saturating_sub(1));
    stats.panics += panics.get();
    if success {
        stats.succeeded += 1;
        debug!(task_id = task_id, attempts = outcome.attempts, "task completed");
    } else {
        stats.failed += 1;
        if let Err(err) = &outcome.result {
            warn!(task_id = task_id, attempts = outcome.attempts, error = %err, "task failed");
        }
    }

    TaskResult {
        task_id,
        outcome: outcome.result,
        duration,
        attempts: outcome.attempts,
        worker_id: Some(worker_id),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "executor panicked".to_string())
}
