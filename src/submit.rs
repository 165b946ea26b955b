use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use crate::error::TaskPanic;
use crate::task::Invoke;
use crate::thread_pool::{ThreadPool, WorkerPool};
use crate::{PoolError, Result};

enum Slot<T> {
    Pending,
    Ready(T),
    Failed(TaskPanic),
    Taken,
}

/// One-shot cell shared by a `PackagedTask` (writer) and its `TaskHandle` (reader).
struct ResultCell<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> ResultCell<T> {
    fn fill(&self, outcome: thread::Result<T>) {
        *self.lock() = match outcome {
            Ok(value) => Slot::Ready(value),
            Err(payload) => Slot::Failed(TaskPanic::new(payload)),
        };
        self.ready.notify_all();
    }

    fn wait_filled(&self) -> MutexGuard<'_, Slot<T>> {
        let mut slot = self.lock();
        while let Slot::Pending = *slot {
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        slot
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A callable bound to the cell its outcome is delivered into.
pub struct PackagedTask<F, T> {
    func: F,
    cell: Arc<ResultCell<T>>,
}

impl<F, T> PackagedTask<F, T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    /// Packages `func`, returning the task and the handle to its result.
    pub fn new(func: F) -> (Self, TaskHandle<T>) {
        let cell = Arc::new(ResultCell {
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
        });
        let handle = TaskHandle { cell: cell.clone() };
        (PackagedTask { func, cell }, handle)
    }

    /// Runs the callable and stores its return value or panic.
    pub fn run(self) {
        let PackagedTask { func, cell } = self;
        cell.fill(panic::catch_unwind(AssertUnwindSafe(func)));
    }
}

impl<F, T> Invoke for PackagedTask<F, T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    fn call(self: Box<Self>) {
        (*self).run()
    }
}

/// Handle to the eventual result of a submitted callable.
///
/// If the task is dropped without running (it was queued after the pool
/// shut down), the handle stays pending and `get` never returns.
pub struct TaskHandle<T> {
    cell: Arc<ResultCell<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the callable finished, then returns its value.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Panicked` if the callable panicked.
    pub fn get(self) -> Result<T> {
        self.take().map_err(PoolError::Panicked)
    }

    /// Blocks until the callable finished, resuming its panic on this thread
    /// if it had one.
    pub fn join(self) -> T {
        match self.take() {
            Ok(value) => value,
            Err(panic) => panic.resume(),
        }
    }

    /// Blocks until a result is available without taking it.
    pub fn wait(&self) {
        drop(self.cell.wait_filled());
    }

    /// Whether the callable has finished.
    pub fn is_ready(&self) -> bool {
        !matches!(*self.cell.lock(), Slot::Pending)
    }

    fn take(self) -> std::result::Result<T, TaskPanic> {
        let mut slot = self.cell.wait_filled();
        match mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(value) => Ok(value),
            Slot::Failed(panic) => Err(panic),
            Slot::Pending | Slot::Taken => unreachable!("result cell has a single reader"),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Runs `func` on `pool`, returning a handle to its result.
///
/// Never blocks and never runs `func` on the calling thread. Arguments are
/// bound by capturing them in the closure.
pub fn submit<P, F, T>(pool: &P, func: F) -> TaskHandle<T>
where
    P: ThreadPool,
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (task, handle) = PackagedTask::new(func);
    pool.spawn(move || task.run());
    handle
}

impl WorkerPool {
    /// Runs `func` on one of the workers, returning a handle to its result.
    pub fn submit<F, T>(&self, func: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = PackagedTask::new(func);
        self.push(Box::new(task));
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn packaged_task_delivers_value_to_waiting_thread() {
        let (task, handle) = PackagedTask::new(|| 6 * 7);
        assert!(!handle.is_ready());

        let runner = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            task.run();
        });
        handle.wait();
        assert!(handle.is_ready());
        assert_eq!(handle.get().unwrap(), 42);
        runner.join().unwrap();
    }

    #[test]
    fn packaged_task_captures_panic() {
        let (task, handle) = PackagedTask::new(|| -> u32 { panic!("bad input") });
        Box::new(task).call();

        match handle.get() {
            Err(PoolError::Panicked(panic)) => assert_eq!(panic.message(), Some("bad input")),
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn join_resumes_the_original_panic() {
        let (task, handle) = PackagedTask::new(|| -> u8 { panic!("{}", String::from("owned")) });
        task.run();

        let payload = panic::catch_unwind(AssertUnwindSafe(|| handle.join())).unwrap_err();
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("owned"));
    }

    #[test]
    fn submit_runs_off_the_calling_thread() {
        let pool = WorkerPool::builder().num_threads(2).build().unwrap();
        let caller = thread::current().id();
        let handle = pool.submit(move || thread::current().id() != caller);
        assert!(handle.get().unwrap());
    }

    #[test]
    fn submit_through_the_trait_returns_value() {
        let pool = <WorkerPool as ThreadPool>::new(2).unwrap();
        let words = vec!["a", "bb", "ccc"];
        let handle = submit(&pool, move || words.iter().map(|w| w.len()).sum::<usize>());
        assert_eq!(handle.get().unwrap(), 6);
    }

    #[test]
    fn failed_task_does_not_affect_later_tasks() {
        let pool = WorkerPool::builder().num_threads(1).build().unwrap();
        let failed = pool.submit(|| -> i32 { panic!("first") });
        let ok = pool.submit(|| 5);
        assert!(failed.get().is_err());
        assert_eq!(ok.get().unwrap(), 5);
    }

    #[test]
    fn dropped_task_leaves_handle_pending() {
        let ran = Arc::new(AtomicBool::new(false));
        let (task, handle) = {
            let ran = ran.clone();
            PackagedTask::new(move || ran.store(true, Ordering::SeqCst))
        };
        drop(task);
        assert!(!handle.is_ready());
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(format!("{:?}", handle), "TaskHandle { ready: false }");
    }
}
