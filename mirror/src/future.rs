use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bson::Bson;

use crate::dispatcher::Dispatcher;
use crate::error::{Error, RemoteError, Result};
use crate::task::TaskId;

/// Lifecycle of a [`TaskFuture`].
///
/// Only `Running` and `Finished` are ever entered; `Pending` and the cancelled
/// states are reserved until cancellation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Running,
    Cancelled,
    CancelledAndNotified,
    Finished,
}

struct Outcome {
    state: FutureState,
    value: Option<Bson>,
    error: Option<RemoteError>,
}

/// Storage shared by a future's handles and, weakly, by its dispatcher.
pub(crate) struct Slot {
    outcome: Mutex<Outcome>,
}

impl Slot {
    pub(crate) fn new() -> Slot {
        Slot {
            outcome: Mutex::new(Outcome {
                state: FutureState::Running,
                value: None,
                error: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Outcome> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn finish(&self, result: Result<Bson, RemoteError>) {
        let mut outcome = self.lock();
        debug_assert_eq!(outcome.state, FutureState::Running);

        match result {
            Ok(value) => outcome.value = Some(value),
            Err(error) => outcome.error = Some(error),
        }
        outcome.state = FutureState::Finished;
    }
}

/// Handle on the eventual result of one submitted task.
///
/// Waiting on it may resolve other futures of the same dispatcher as a side
/// effect, so a future can become done without its own `result` being called.
#[derive(Clone)]
pub struct TaskFuture {
    task_id: TaskId,
    slot: Arc<Slot>,
    dispatcher: Arc<Dispatcher>,
}

impl TaskFuture {
    pub(crate) fn new(task_id: TaskId, slot: Arc<Slot>, dispatcher: Arc<Dispatcher>) -> Self {
        TaskFuture {
            task_id,
            slot,
            dispatcher,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn state(&self) -> FutureState {
        self.slot.lock().state
    }

    pub fn cancel(&self) -> Result<bool> {
        Err(Error::NotSupported("cancelling a task"))
    }

    pub fn cancelled(&self) -> bool {
        matches!(
            self.state(),
            FutureState::Cancelled | FutureState::CancelledAndNotified
        )
    }

    pub fn running(&self) -> bool {
        self.state() == FutureState::Running
    }

    pub fn done(&self) -> bool {
        matches!(
            self.state(),
            FutureState::Cancelled | FutureState::CancelledAndNotified | FutureState::Finished
        )
    }

    /// Blocks until the task's result arrived, then returns its value or the
    /// error the object raised.
    pub fn result(&self, timeout: Option<Duration>) -> Result<Bson> {
        self.wait(timeout)?;

        let outcome = self.slot.lock();
        match &outcome.error {
            Some(error) => Err(Error::Remote(error.clone())),
            None => Ok(outcome.value.clone().unwrap_or(Bson::Null)),
        }
    }

    /// Like [`result`](Self::result) but hands back the raised error, if any,
    /// instead of failing with it.
    pub fn error(&self, timeout: Option<Duration>) -> Result<Option<RemoteError>> {
        self.wait(timeout)?;

        Ok(self.slot.lock().error.clone())
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        match self.state() {
            FutureState::Cancelled | FutureState::CancelledAndNotified => {
                return Err(Error::Cancelled(self.task_id))
            }
            FutureState::Finished => return Ok(()),
            FutureState::Pending | FutureState::Running => {}
        }

        match self.dispatcher.await_result(self.task_id, timeout) {
            // another waiter drained our result between the state check and the read
            Err(Error::InvalidTaskReference(_)) if self.done() => Ok(()),
            other => other,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: FutureState) {
        self.slot.lock().state = state;
    }
}

impl fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("task_id", &self.task_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bson::{bson, Document};

    use super::*;
    use crate::config::Options;
    use crate::object::Record;

    fn dispatcher() -> Arc<Dispatcher> {
        let object = Record::new()
            .field("var", 5)
            .method("fail", |_, _, _| Err(RemoteError::raised("Test Exception")));
        Dispatcher::local(object, &Options::default())
    }

    fn future() -> TaskFuture {
        dispatcher()
            .getattr("", "var")
            .unwrap()
    }

    #[test]
    fn cancel_is_not_supported() {
        let future = future();

        assert!(matches!(future.cancel(), Err(Error::NotSupported(_))));
    }

    #[test]
    fn new_futures_are_running() {
        let future = future();

        assert!(future.running());
        assert!(!future.done());
        assert!(!future.cancelled());
    }

    #[test]
    fn cancelled_states_are_cancelled_and_done() {
        for state in [FutureState::Cancelled, FutureState::CancelledAndNotified] {
            let future = future();
            future.force_state(state);

            assert!(future.cancelled());
            assert!(future.done());
            assert!(!future.running());
        }
    }

    #[test]
    fn pending_is_neither_running_nor_done() {
        let future = future();
        future.force_state(FutureState::Pending);

        assert!(!future.running());
        assert!(!future.done());
        assert!(!future.cancelled());
    }

    #[test]
    fn result_of_cancelled_future_fails() {
        for state in [FutureState::Cancelled, FutureState::CancelledAndNotified] {
            let future = future();
            future.force_state(state);

            assert!(matches!(future.result(None), Err(Error::Cancelled(_))));
            assert!(matches!(future.error(None), Err(Error::Cancelled(_))));
        }
    }

    #[test]
    fn result_waits_then_finishes() {
        let future = future();

        assert_eq!(future.result(None).unwrap(), bson!(5));
        assert_eq!(future.state(), FutureState::Finished);
        assert!(future.done());
    }

    #[test]
    fn finished_future_does_not_read_again() {
        let dispatcher = dispatcher();
        let future = dispatcher.getattr("", "var").unwrap();
        future.result(None).unwrap();

        // the task id is no longer known to the dispatcher
        assert!(matches!(
            dispatcher.await_result(future.task_id(), None),
            Err(Error::InvalidTaskReference(_))
        ));
        assert_eq!(future.result(None).unwrap(), bson!(5));
    }

    #[test]
    fn raised_error_is_returned_by_result_and_error() {
        let future = dispatcher()
            .submit("fail", vec![], Document::new())
            .unwrap();

        match future.result(None) {
            Err(Error::Remote(error)) => assert_eq!(error, RemoteError::raised("Test Exception")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(
            future.error(None).unwrap(),
            Some(RemoteError::raised("Test Exception"))
        );
    }

    #[test]
    fn error_is_none_on_success() {
        let future = future();

        assert_eq!(future.error(None).unwrap(), None);
    }
}
