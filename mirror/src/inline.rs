use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::object::Object;
use crate::task::{Task, TaskResult};
use crate::worker::Worker;

/// Worker that runs in the caller's own thread.
///
/// Sent tasks are only buffered; they execute, in order, the next time a
/// result is read or the worker is terminated.
pub struct InlineWorker {
    object: Mutex<Box<dyn Object>>,
    queued: Mutex<VecDeque<Task>>,
    results: Mutex<VecDeque<TaskResult>>,
    terminated: AtomicBool,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InlineWorker {
    pub fn new(object: Box<dyn Object>) -> InlineWorker {
        InlineWorker {
            object: Mutex::new(object),
            queued: Mutex::new(VecDeque::new()),
            results: Mutex::new(VecDeque::new()),
            terminated: AtomicBool::new(false),
        }
    }

    /// Executes every buffered task.
    pub fn run_queued(&self) {
        let mut object = lock(&self.object);

        loop {
            let Some(task) = lock(&self.queued).pop_front() else {
                break;
            };
            let result = task.execute(object.as_mut());
            lock(&self.results).push_back(result);
        }
    }

    pub fn queued_len(&self) -> usize {
        lock(&self.queued).len()
    }
}

impl Worker for InlineWorker {
    fn send(&self, task: Task) -> Result<()> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(Error::Terminated);
        }

        trace!(task_id = %task.id, "buffering task");
        lock(&self.queued).push_back(task);
        Ok(())
    }

    fn recv(&self, _timeout: Option<Duration>) -> Result<TaskResult> {
        self.run_queued();

        // nothing queued and nothing buffered: no result can ever show up
        lock(&self.results).pop_front().ok_or(Error::Disconnected)
    }

    fn terminate(&self) -> Result<()> {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.run_queued();
        debug!("inline worker terminated");
        Ok(())
    }
}

impl Drop for InlineWorker {
    fn drop(&mut self) {
        self.run_queued();
    }
}
