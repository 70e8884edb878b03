//! In-memory bounded job queue with priority ordering and blocking hand-off.
//!
//! Producers block (optionally with a timeout) while the queue is full;
//! consumers block while it is empty. Both wait on `parking_lot` condition
//! variables, never by polling.
//!
//! A capacity of zero turns the queue into a rendezvous: a push succeeds only
//! when an idle consumer is waiting to take the item.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::Task;

/// Why a push did not enqueue the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// No space became available within the timeout.
    Full,
    /// The queue was closed before or while waiting.
    Closed,
}

/// Heap entry ordered by priority (highest first), then FIFO by sequence.
struct PriorityTask<P> {
    seq: u64,
    task: Task<P>,
}

impl<P> PartialEq for PriorityTask<P> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<P> Eq for PriorityTask<P> {}

impl<P> PartialOrd for PriorityTask<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for PriorityTask<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then lower sequence (reversed for max-heap)
        self.task
            .meta
            .priority
            .cmp(&other.task.meta.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState<P> {
    tasks: BinaryHeap<PriorityTask<P>>,
    next_seq: u64,
    idle_consumers: usize,
    closed: bool,
    abandoned: bool,
}

/// Bounded, blocking, priority-ordered job queue shared by all workers.
pub struct JobQueue<P> {
    capacity: usize,
    state: Mutex<QueueState<P>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<P> JobQueue<P> {
    /// Create a queue holding at most `capacity` tasks (zero = rendezvous).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                tasks: BinaryHeap::with_capacity(capacity.min(1024)),
                next_seq: 0,
                idle_consumers: 0,
                closed: false,
                abandoned: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks waiting for a consumer, never more than the capacity.
    ///
    /// On a rendezvous queue every stored task is already promised to an idle
    /// consumer that has not woken yet, so those hand-offs are not counted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len().min(self.capacity)
    }

    /// True if no task is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once [`close`](Self::close) or [`abandon`](Self::abandon) ran.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Enqueue a task, waiting up to `timeout` for space (`None` = no limit).
    ///
    /// # Errors
    ///
    /// [`PushError::Full`] if the timeout elapsed, [`PushError::Closed`] if the
    /// queue was closed.
    pub fn push(&self, task: Task<P>, timeout: Option<Duration>) -> Result<(), PushError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(PushError::Closed);
            }
            if state.tasks.len() < self.limit(&state) {
                break;
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(PushError::Full);
                    }
                    // Timed-out waits fall through to one last re-check.
                    let _ = self.not_full.wait_until(&mut state, deadline);
                }
                None => self.not_full.wait(&mut state),
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.tasks.push(PriorityTask { seq, task });
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the highest-priority task, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained, or immediately
    /// after [`abandon`](Self::abandon).
    pub fn pop(&self) -> Option<Task<P>> {
        let mut state = self.state.lock();

        loop {
            if state.abandoned {
                return None;
            }
            if let Some(entry) = state.tasks.pop() {
                drop(state);
                self.not_full.notify_all();
                return Some(entry.task);
            }
            if state.closed {
                return None;
            }

            state.idle_consumers += 1;
            // A new idle consumer opens a hand-off slot on rendezvous queues.
            self.not_full.notify_all();
            self.not_empty.wait(&mut state);
            state.idle_consumers -= 1;
        }
    }

    /// Stop accepting tasks. Queued tasks stay available to consumers.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Stop accepting tasks and hand back everything still queued, in the
    /// order it would have been dequeued. Consumers stop dequeuing at once.
    pub fn abandon(&self) -> Vec<Task<P>> {
        let mut state = self.state.lock();
        state.closed = true;
        state.abandoned = true;
        let mut remaining = Vec::with_capacity(state.tasks.len());
        while let Some(entry) = state.tasks.pop() {
            remaining.push(entry.task);
        }
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
        remaining
    }

    fn limit(&self, state: &QueueState<P>) -> usize {
        if self.capacity == 0 {
            state.idle_consumers
        } else {
            self.capacity
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::core::TaskMetadata;
    use crate::util::serde::Priority;

    fn make_task(id: u64, priority: Priority) -> Task<String> {
        Task {
            meta: TaskMetadata {
                id,
                priority,
                submitted_at: Instant::now(),
                deadline: None,
            },
            payload: format!("task-{id}"),
        }
    }

    #[test]
    fn test_priority_ordering() {
        let q = JobQueue::new(100);

        q.push(make_task(1, Priority::Low), None).unwrap();
        q.push(make_task(2, Priority::Critical), None).unwrap();
        q.push(make_task(3, Priority::Normal), None).unwrap();
        q.push(make_task(4, Priority::High), None).unwrap();

        assert_eq!(q.pop().unwrap().meta.id, 2); // Critical
        assert_eq!(q.pop().unwrap().meta.id, 4); // High
        assert_eq!(q.pop().unwrap().meta.id, 3); // Normal
        assert_eq!(q.pop().unwrap().meta.id, 1); // Low
    }

    #[test]
    fn test_fifo_within_priority() {
        let q = JobQueue::new(100);

        q.push(make_task(7, Priority::Normal), None).unwrap();
        q.push(make_task(3, Priority::Normal), None).unwrap();
        q.push(make_task(5, Priority::Normal), None).unwrap();

        assert_eq!(q.pop().unwrap().meta.id, 7);
        assert_eq!(q.pop().unwrap().meta.id, 3);
        assert_eq!(q.pop().unwrap().meta.id, 5);
    }

    #[test]
    fn test_queue_full_times_out() {
        let q = JobQueue::new(2);
        q.push(make_task(1, Priority::Normal), None).unwrap();
        q.push(make_task(2, Priority::Normal), None).unwrap();

        let started = Instant::now();
        let result = q.push(make_task(3, Priority::Normal), Some(Duration::from_millis(30)));
        assert_eq!(result, Err(PushError::Full));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_zero_timeout_never_waits() {
        let q = JobQueue::new(1);
        q.push(make_task(1, Priority::Normal), None).unwrap();
        assert_eq!(
            q.push(make_task(2, Priority::Normal), Some(Duration::ZERO)),
            Err(PushError::Full)
        );
    }

    #[test]
    fn test_blocked_push_proceeds_after_pop() {
        let q = Arc::new(JobQueue::new(1));
        q.push(make_task(1, Priority::Normal), None).unwrap();

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(make_task(2, Priority::Normal), Some(Duration::from_secs(5))))
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.pop().unwrap().meta.id, 1);
        assert_eq!(producer.join().unwrap(), Ok(()));
        assert_eq!(q.pop().unwrap().meta.id, 2);
    }

    #[test]
    fn test_rendezvous_requires_waiting_consumer() {
        let q = Arc::new(JobQueue::new(0));
        assert_eq!(
            q.push(make_task(1, Priority::Normal), Some(Duration::from_millis(10))),
            Err(PushError::Full)
        );

        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop().map(|t| t.meta.id))
        };
        q.push(make_task(2, Priority::Normal), Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(consumer.join().unwrap(), Some(2));
        assert!(q.is_empty());
    }

    #[test]
    fn test_rendezvous_hand_offs_are_not_counted_as_queued() {
        let q = JobQueue::new(0);
        // Two consumers parked but not yet woken.
        q.state.lock().idle_consumers = 2;

        q.push(make_task(1, Priority::Normal), Some(Duration::ZERO))
            .unwrap();
        q.push(make_task(2, Priority::Normal), Some(Duration::ZERO))
            .unwrap();
        assert_eq!(
            q.push(make_task(3, Priority::Normal), Some(Duration::ZERO)),
            Err(PushError::Full)
        );

        assert_eq!(q.state.lock().tasks.len(), 2);
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());
        assert_eq!(q.abandon().len(), 2);
    }

    #[test]
    fn test_close_drains_then_ends() {
        let q = JobQueue::new(4);
        q.push(make_task(1, Priority::Normal), None).unwrap();
        q.close();

        assert_eq!(
            q.push(make_task(2, Priority::Normal), None),
            Err(PushError::Closed)
        );
        assert_eq!(q.pop().unwrap().meta.id, 1);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let q = Arc::new(JobQueue::new(1));
        q.push(make_task(1, Priority::Normal), None).unwrap();

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(make_task(2, Priority::Normal), None))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert_eq!(producer.join().unwrap(), Err(PushError::Closed));
    }

    #[test]
    fn test_abandon_returns_remaining_and_stops_consumers() {
        let q = JobQueue::new(4);
        q.push(make_task(1, Priority::Low), None).unwrap();
        q.push(make_task(2, Priority::High), None).unwrap();

        let remaining: Vec<u64> = q.abandon().into_iter().map(|t| t.meta.id).collect();
        assert_eq!(remaining, vec![2, 1]);
        assert!(q.pop().is_none());
        assert!(q.is_closed());
    }

    #[test]
    fn test_empty_queue_pop_unblocks_on_close() {
        let q = Arc::new(JobQueue::<String>::new(4));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop().is_none())
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(consumer.join().unwrap());
    }
}
