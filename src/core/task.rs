//! Task, handle, and result types flowing through the pool.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::core::TaskError;
use crate::util::serde::{Priority, TaskId};

/// Metadata describing a submitted task.
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    /// Unique task identifier.
    pub id: TaskId,
    /// Priority used for queue ordering.
    pub priority: Priority,
    /// Submission instant.
    pub submitted_at: Instant,
    /// Total wall-clock budget across all attempts, if any.
    pub deadline: Option<Duration>,
}

/// A task owned by the pool: metadata plus the caller's payload.
#[derive(Debug)]
pub struct Task<P> {
    /// Metadata driving scheduling decisions.
    pub meta: TaskMetadata,
    /// Task payload supplied by caller.
    pub payload: P,
}

/// Options accepted by [`WorkerPool::submit`](crate::core::WorkerPool::submit).
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// How long to wait for queue space. `None` waits until space frees up or
    /// the pool stops; `Some(Duration::ZERO)` never waits.
    pub timeout: Option<Duration>,
    /// Queue priority.
    pub priority: Priority,
    /// Per-task deadline overriding the pool's retry deadline.
    pub deadline: Option<Duration>,
}

impl SubmitOptions {
    /// Default options: normal priority, wait for queue space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue wait timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the per-task deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Receipt for an accepted task. Its id matches the eventual [`TaskResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle {
    id: TaskId,
    priority: Priority,
    submitted_at: Instant,
}

impl TaskHandle {
    pub(crate) const fn new(meta: &TaskMetadata) -> Self {
        Self {
            id: meta.id,
            priority: meta.priority,
            submitted_at: meta.submitted_at,
        }
    }

    /// Task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Priority the task was queued with.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// When the task was accepted.
    #[must_use]
    pub const fn submitted_at(&self) -> Instant {
        self.submitted_at
    }
}

/// Final disposition of one accepted task.
#[derive(Debug)]
pub struct TaskResult<O> {
    /// Identifier of the task this result belongs to.
    pub task_id: TaskId,
    /// Executor output or the reason there is none.
    pub outcome: Result<O, TaskError>,
    /// Time spent executing, including retry backoff.
    pub duration: Duration,
    /// Number of attempts made; zero if the task never ran.
    pub attempts: u32,
    /// Worker that produced the result; `None` for tasks abandoned in the queue.
    pub worker_id: Option<usize>,
}

impl<O> TaskResult<O> {
    /// True if the task produced an output.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The error, if the task failed.
    #[must_use]
    pub fn error(&self) -> Option<&TaskError> {
        self.outcome.as_ref().err()
    }

    pub(crate) fn not_run(task_id: TaskId, error: TaskError, worker_id: Option<usize>) -> Self {
        Self {
            task_id,
            outcome: Err(error),
            duration: Duration::ZERO,
            attempts: 0,
            worker_id,
        }
    }
}

/// Per-attempt context handed to executors.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Task metadata.
    pub meta: TaskMetadata,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// Worker executing this attempt.
    pub worker_id: usize,
    pub(crate) shutdown: CancellationToken,
}

impl TaskContext {
    /// Context for running an executor outside a pool, e.g. in tests.
    #[must_use]
    pub fn new(meta: TaskMetadata, worker_id: usize) -> Self {
        Self {
            meta,
            attempt: 1,
            worker_id,
            shutdown: CancellationToken::new(),
        }
    }

    /// True once the pool has been told to stop without draining.
    ///
    /// Long-running executors may check this at their own checkpoints; the
    /// pool never interrupts a running attempt.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves when the pool is stopping without draining.
    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await;
    }
}
