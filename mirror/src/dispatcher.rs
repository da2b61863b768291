use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use bson::{Bson, Document};
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::config::{Mode, Options};
use crate::error::{Error, Result};
use crate::future::{Slot, TaskFuture};
use crate::inline::InlineWorker;
use crate::object::Object;
use crate::task::{Operation, Task, TaskId};
use crate::worker::{ThreadWorker, Worker};


/*
The dispatcher is the only thing talking to the worker. Futures are tracked
weakly: a result whose future was dropped is read and thrown away.
 */

pub struct Dispatcher {
    worker: Box<dyn Worker>,
    next_id: AtomicU64,
    // A dropped future leaves its key here, pointing at nothing, until its
    // result is read. `pending_count` only counts live futures.
    pending: DashMap<TaskId, Weak<Slot>>,
    // keeps ids in channel order
    submitting: Mutex<()>,
    // set while one thread reads results, the others wait on `read_progress`
    reading: Mutex<bool>,
    read_progress: Condvar,
    default_timeout: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    limit: Duration,
    at: Instant,
}

impl Deadline {
    fn after(limit: Option<Duration>) -> Option<Deadline> {
        limit.map(|limit| Deadline {
            limit,
            at: Instant::now() + limit,
        })
    }

    fn remaining(&self) -> Result<Duration> {
        let left = self.at.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(Error::Timeout(self.limit));
        }
        Ok(left)
    }
}

/// Exclusive right to read results, released on drop.
struct Reading<'a> {
    dispatcher: &'a Dispatcher,
}

impl Drop for Reading<'_> {
    fn drop(&mut self) {
        *lock(&self.dispatcher.reading) = false;
        self.dispatcher.read_progress.notify_all();
    }
}

impl Dispatcher {
    pub fn new(worker: Box<dyn Worker>, options: &Options) -> Arc<Dispatcher> {
        Arc::new(Dispatcher {
            worker,
            next_id: AtomicU64::new(0),
            pending: DashMap::new(),
            submitting: Mutex::new(()),
            reading: Mutex::new(false),
            read_progress: Condvar::new(),
            default_timeout: options.default_timeout(),
        })
    }

    pub fn start<O: Object>(object: O, options: &Options) -> Result<Arc<Dispatcher>> {
        match options.mode {
            Mode::Isolated => Dispatcher::isolated(object, options),
            Mode::Local => Ok(Dispatcher::local(object, options)),
        }
    }

    pub fn isolated<O: Object>(object: O, options: &Options) -> Result<Arc<Dispatcher>> {
        let worker = ThreadWorker::start(Box::new(object), &options.thread_name)?;
        Ok(Dispatcher::new(Box::new(worker), options))
    }

    pub fn local<O: Object>(object: O, options: &Options) -> Arc<Dispatcher> {
        Dispatcher::new(Box::new(InlineWorker::new(Box::new(object))), options)
    }

    pub fn submit(self: &Arc<Self>, path: &str, args: Vec<Bson>, kwargs: Document) -> Result<TaskFuture> {
        self.dispatch(path, Operation::Call { args, kwargs })
    }

    pub fn setattr(self: &Arc<Self>, path: &str, name: &str, value: Bson) -> Result<TaskFuture> {
        self.dispatch(
            path,
            Operation::SetAttr {
                name: name.to_string(),
                value,
            },
        )
    }

    pub fn getattr(self: &Arc<Self>, path: &str, name: &str) -> Result<TaskFuture> {
        self.dispatch(
            path,
            Operation::GetAttr {
                name: name.to_string(),
            },
        )
    }

    fn dispatch(self: &Arc<Self>, path: &str, operation: Operation) -> Result<TaskFuture> {
        let _submitting = lock(&self.submitting);

        let task_id = TaskId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        let slot = Arc::new(Slot::new());
        self.pending.insert(task_id, Arc::downgrade(&slot));

        let task = Task {
            id: task_id,
            path: path.to_string(),
            operation,
        };
        let kind = task.kind();

        if let Err(error) = self.worker.send(task) {
            self.pending.remove(&task_id);
            return Err(error);
        }
        debug!(%task_id, path, ?kind, "task submitted");

        Ok(TaskFuture::new(task_id, slot, Arc::clone(self)))
    }

    /// Reads results until the one for `task_id` shows up, resolving every
    /// future met along the way.
    ///
    /// The timeout covers the whole call, including the time spent waiting for
    /// another thread that is already reading.
    pub fn await_result(&self, task_id: TaskId, timeout: Option<Duration>) -> Result<()> {
        let deadline = Deadline::after(timeout.or(self.default_timeout));

        let resolved_elsewhere = || !self.pending.contains_key(&task_id);
        let Some(_reading) = self.start_reading(deadline, resolved_elsewhere)? else {
            return Err(Error::InvalidTaskReference(task_id));
        };
        if resolved_elsewhere() {
            return Err(Error::InvalidTaskReference(task_id));
        }

        while !self.pending.is_empty() {
            if self.read_within(deadline)? == task_id {
                return Ok(());
            }
        }

        Err(Error::InvalidTaskReference(task_id))
    }

    /// Resolves every outstanding future, within the default timeout if one
    /// is configured.
    pub fn drain_all(&self) -> Result<()> {
        let deadline = Deadline::after(self.default_timeout);

        let Some(_reading) = self.start_reading(deadline, || self.pending.is_empty())? else {
            return Ok(());
        };

        while !self.pending.is_empty() {
            self.read_within(deadline)?;
        }
        Ok(())
    }

    pub fn terminate(&self) -> Result<()> {
        self.worker.terminate()
    }

    /// Number of submitted tasks whose future is still alive and unresolved.
    pub fn pending_count(&self) -> usize {
        self.pending
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    /// Waits until no other thread is reading. Gives up with `None` once
    /// `satisfied` holds, and with a timeout once `deadline` passes.
    fn start_reading(
        &self,
        deadline: Option<Deadline>,
        satisfied: impl Fn() -> bool,
    ) -> Result<Option<Reading<'_>>> {
        let mut busy = lock(&self.reading);

        while *busy {
            if satisfied() {
                return Ok(None);
            }
            busy = match deadline {
                Some(deadline) => {
                    self.read_progress
                        .wait_timeout(busy, deadline.remaining()?)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .read_progress
                    .wait(busy)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }

        *busy = true;
        Ok(Some(Reading { dispatcher: self }))
    }

    fn read_within(&self, deadline: Option<Deadline>) -> Result<TaskId> {
        let remaining = deadline.map(|deadline| deadline.remaining()).transpose()?;

        self.resolve_next(remaining).map_err(|error| match (error, deadline) {
            (Error::Timeout(_), Some(deadline)) => Error::Timeout(deadline.limit),
            (error, _) => error,
        })
    }

    fn resolve_next(&self, timeout: Option<Duration>) -> Result<TaskId> {
        let result = self.worker.recv(timeout)?;
        let task_id = result.task_id;

        // finish before removing: a waiter seeing the key gone expects its future done
        let slot = self.pending.get(&task_id).map(|entry| entry.value().upgrade());
        match slot {
            Some(Some(slot)) => {
                trace!(%task_id, "future resolved");
                slot.finish(result.outcome);
            }
            Some(None) => trace!(%task_id, "future was dropped, discarding result"),
            None => warn!(%task_id, "result for a task that is not pending"),
        }
        self.pending.remove(&task_id);

        // taking the lock orders this wake-up after a waiter's pending check
        let _busy = lock(&self.reading);
        self.read_progress.notify_all();

        Ok(task_id)
    }
}
