use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::runtime::{self, Handle, Runtime};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::object::Object;
use crate::task::{Task, TaskResult};

/// The only component allowed to touch the proxied object.
///
/// `send` must never block. `recv` blocks until the next result is available,
/// results coming back in the order their tasks were sent.
pub trait Worker: Send + Sync {
    fn send(&self, task: Task) -> Result<()>;

    fn recv(&self, timeout: Option<Duration>) -> Result<TaskResult>;

    /// Stops serving tasks. Calling it again is a no-op.
    fn terminate(&self) -> Result<()>;
}

pub struct Channel<T> {
    pub tx: UnboundedSender<T>,
    pub rx: UnboundedReceiver<T>,
}

impl<T> Channel<T> {
    pub fn new() -> Channel<T> {
        let (tx, rx) = unbounded_channel();

        Channel { tx, rx }
    }

    pub fn split(self) -> (UnboundedSender<T>, UnboundedReceiver<T>) {
        (self.tx, self.rx)
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Channel::new()
    }
}

struct WorkerLoop {
    object: Box<dyn Object>,
    inbox: UnboundedReceiver<Task>,
    outbox: UnboundedSender<TaskResult>,
    stopping: Arc<AtomicBool>,
}

impl WorkerLoop {
    fn run(mut self) {
        while let Some(task) = self.inbox.blocking_recv() {
            if self.stopping.load(Ordering::SeqCst) {
                debug!("worker received stop signal");
                break;
            }

            let result = task.execute(self.object.as_mut());
            if self.outbox.send(result).is_err() {
                warn!("result channel closed, stopping worker");
                break;
            }
        }
        debug!("worker loop finished");
    }
}

/// Worker owning the object on a dedicated thread, isolated from the caller.
pub struct ThreadWorker {
    // drives timed reads of the result channel, taken on drop
    runtime: Option<Runtime>,
    inbox: Mutex<Option<UnboundedSender<Task>>>,
    results: Mutex<UnboundedReceiver<TaskResult>>,
    stopping: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadWorker {
    pub fn start(object: Box<dyn Object>, thread_name: &str) -> Result<ThreadWorker> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let (inbox_tx, inbox_rx) = Channel::new().split();
        let (outbox_tx, outbox_rx) = Channel::new().split();
        let stopping = Arc::new(AtomicBool::new(false));

        let worker_loop = WorkerLoop {
            object,
            inbox: inbox_rx,
            outbox: outbox_tx,
            stopping: Arc::clone(&stopping),
        };
        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || worker_loop.run())?;
        debug!(thread_name, "worker started");

        Ok(ThreadWorker {
            runtime: Some(runtime),
            inbox: Mutex::new(Some(inbox_tx)),
            results: Mutex::new(outbox_rx),
            stopping,
            handle: Mutex::new(Some(handle)),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Worker for ThreadWorker {
    fn send(&self, task: Task) -> Result<()> {
        match lock(&self.inbox).as_ref() {
            Some(inbox) => inbox.send(task).map_err(|_| Error::Terminated),
            None => Err(Error::Terminated),
        }
    }

    fn recv(&self, timeout: Option<Duration>) -> Result<TaskResult> {
        // both block_on and blocking_recv panic on a runtime thread
        if Handle::try_current().is_ok() {
            return Err(Error::BlockingInRuntime);
        }
        let mut results = lock(&self.results);

        let received = match (timeout, self.runtime.as_ref()) {
            (Some(duration), Some(runtime)) => runtime
                .block_on(async { tokio::time::timeout(duration, results.recv()).await })
                .map_err(|_| Error::Timeout(duration))?,
            _ => results.blocking_recv(),
        };

        received.ok_or(Error::Disconnected)
    }

    fn terminate(&self) -> Result<()> {
        let Some(handle) = lock(&self.handle).take() else {
            return Ok(());
        };

        self.stopping.store(true, Ordering::SeqCst);
        // closing the inbox wakes a loop parked on an empty channel
        lock(&self.inbox).take();

        if handle.join().is_err() {
            warn!("worker thread panicked");
        }
        debug!("worker terminated");
        Ok(())
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        if let Err(error) = self.terminate() {
            warn!(%error, "failed to terminate worker");
        }
        // dropping a runtime blocks, which is refused inside an async context
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
