use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use super::queue::BlockingTaskQueue;
use super::ThreadPool;
use crate::task::Task;
use crate::{PoolError, Result};

const DEFAULT_THREAD_NAME: &str = "pool-worker";

/// A fixed set of worker threads draining one shared `BlockingTaskQueue`.
///
/// Dropping the pool shuts the queue down and joins every worker. Tasks
/// already queued at that point still run before the workers exit.
pub struct WorkerPool {
    queue: Arc<BlockingTaskQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool with one worker per available hardware thread.
    pub fn with_hardware_concurrency() -> Result<Self> {
        PoolBuilder::new().build()
    }

    /// Returns a builder for configuring the pool before it starts.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Enqueues a task for some worker to run. Never blocks on execution.
    pub fn push(&self, task: Task) {
        self.queue.push(task);
    }

    /// Number of worker threads, fixed for the lifetime of the pool.
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }
}

impl ThreadPool for WorkerPool {
    fn new(threads: u32) -> Result<Self> {
        PoolBuilder::new().num_threads(threads as usize).build()
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Box::new(job));
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        debug!("Shutting down pool of {} workers", self.workers.len());
        self.queue.shutdown();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker thread panicked outside of a task");
            }
        }
    }
}

/// Configures a `WorkerPool` before its threads are started.
#[derive(Debug, Clone)]
pub struct PoolBuilder {
    num_threads: Option<usize>,
    thread_name: String,
}

impl PoolBuilder {
    /// Creates a builder using hardware concurrency and the default thread name.
    pub fn new() -> Self {
        PoolBuilder {
            num_threads: None,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }

    /// Sets the number of worker threads.
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Sets the worker name prefix; workers are named `{prefix}-{index}`.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Starts the workers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidThreadCount` for zero threads, or an IO error if a
    /// worker thread cannot be spawned. Workers started before the failure
    /// are shut down and joined.
    pub fn build(self) -> Result<WorkerPool> {
        let threads = self.num_threads.unwrap_or_else(num_cpus::get);
        if threads == 0 {
            return Err(PoolError::InvalidThreadCount);
        }

        let mut pool = WorkerPool {
            queue: Arc::new(BlockingTaskQueue::new()),
            workers: Vec::with_capacity(threads),
        };
        for id in 0..threads {
            let worker = spawn_worker(id, &self.thread_name, pool.queue.clone())?;
            pool.workers.push(worker);
        }
        debug!("Started pool with {} workers", threads);

        Ok(pool)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_worker(
    id: usize,
    prefix: &str,
    queue: Arc<BlockingTaskQueue>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("{prefix}-{id}"))
        .spawn(move || run(id, &queue))?;
    Ok(handle)
}

/// Pops and runs tasks until the queue is shut down and empty.
fn run(id: usize, queue: &BlockingTaskQueue) {
    debug!("Worker {id} started");
    while let Some(task) = queue.pop() {
        if panic::catch_unwind(AssertUnwindSafe(move || task.call())).is_err() {
            error!("Worker {id} task panicked, continuing");
        }
    }
    debug!("Worker {id}: queue shut down, exiting");
}
