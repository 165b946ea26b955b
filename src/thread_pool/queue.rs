use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::task::Task;

struct State {
    tasks: VecDeque<Task>,
    done: bool,
}

/// An unbounded FIFO of tasks shared by producers and worker threads.
///
/// One mutex guards both the tasks and the `done` flag. `pop` blocks only
/// while the queue is empty and not done; after `shutdown` the remaining
/// tasks are still handed out until the queue drains.
pub struct BlockingTaskQueue {
    state: Mutex<State>,
    ready: Condvar,
}

impl BlockingTaskQueue {
    /// Creates an empty, open queue.
    pub fn new() -> Self {
        BlockingTaskQueue {
            state: Mutex::new(State {
                tasks: VecDeque::new(),
                done: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Appends a task and wakes one waiting consumer.
    ///
    /// Pushing after `shutdown` is accepted, but once the queue has drained
    /// no consumer is left to run the task.
    pub fn push(&self, task: Task) {
        self.lock().tasks.push_back(task);
        self.ready.notify_one();
    }

    /// Removes the head task, blocking while the queue is empty and open.
    ///
    /// Returns `None` only when the queue is empty and has been shut down.
    pub fn pop(&self) -> Option<Task> {
        let mut state = self.lock();
        while state.tasks.is_empty() && !state.done {
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        state.tasks.pop_front()
    }

    /// Marks the queue done and wakes every blocked consumer. Idempotent.
    pub fn shutdown(&self) {
        self.lock().done = true;
        self.ready.notify_all();
    }

    /// Number of tasks waiting to be popped.
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether no tasks are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Tasks run outside the lock, so a poisoned mutex still holds a
    // consistent deque and flag.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for BlockingTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
