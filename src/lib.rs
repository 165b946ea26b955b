#![deny(missing_docs)]

//! A fixed-size worker thread pool built on one blocking notification queue.
//!
//! Every worker drains the same mutex-and-condvar guarded FIFO. Callables
//! are submitted through [`submit`] or [`WorkerPool::submit`], which return a
//! [`TaskHandle`] for the eventual value or the panic the callable raised.
//! Dropping the pool shuts the queue down and joins every worker.

mod error;
mod submit;
mod task;
/// Thread pool and its shared task queue.
pub mod thread_pool;

pub use error::{PoolError, Result, TaskPanic};
pub use submit::{submit, PackagedTask, TaskHandle};
pub use task::{Invoke, Task};
pub use thread_pool::{BlockingTaskQueue, PoolBuilder, ThreadPool, WorkerPool};
