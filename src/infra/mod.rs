//! Infrastructure adapters backing the pool.

pub mod queue;

pub use queue::JobQueue;
