//! Consumer side of the result stream.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::core::TaskResult;
use crate::util::serde::TaskId;

/// Iterator over task results, in completion order.
///
/// Iteration blocks until a result arrives and ends once the pool has shut
/// down and the channel is empty.
pub struct ResultAggregator<O> {
    rx: Receiver<TaskResult<O>>,
    delivered: u64,
}

impl<O> ResultAggregator<O> {
    pub(crate) const fn new(rx: Receiver<TaskResult<O>>) -> Self {
        Self { rx, delivered: 0 }
    }

    /// Results taken through this aggregator so far.
    #[must_use]
    pub const fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Results buffered in the channel and not yet taken.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Take a result if one is buffered, without blocking.
    pub fn try_next(&mut self) -> Option<TaskResult<O>> {
        match self.rx.try_recv() {
            Ok(result) => Some(self.count(result)),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next result.
    ///
    /// Returns `None` on timeout and after the stream has ended.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<TaskResult<O>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(self.count(result)),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain the stream to its end and index the results by task id.
    #[must_use]
    pub fn collect_by_id(self) -> HashMap<TaskId, TaskResult<O>> {
        self.map(|result| (result.task_id, result)).collect()
    }

    fn count(&mut self, result: TaskResult<O>) -> TaskResult<O> {
        self.delivered += 1;
        result
    }
}

impl<O> Iterator for ResultAggregator<O> {
    type Item = TaskResult<O>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.rx.recv().ok()?;
        Some(self.count(result))
    }
}

impl<O> std::fmt::Debug for ResultAggregator<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultAggregator")
            .field("delivered", &self.delivered)
            .field("pending", &self.rx.len())
            .finish()
    }
}
