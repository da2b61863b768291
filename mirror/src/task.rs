use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::RemoteError;
use crate::object::{resolve, Object};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        TaskId(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Call,
    AttrGet,
    AttrSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Call { args: Vec<Bson>, kwargs: Document },
    GetAttr { name: String },
    SetAttr { name: String, value: Bson },
}

/// A request for the worker: one operation against the object found at `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub path: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub outcome: Result<Bson, RemoteError>,
}

impl Task {
    pub fn kind(&self) -> OperationKind {
        match self.operation {
            Operation::Call { .. } => OperationKind::Call,
            Operation::GetAttr { .. } => OperationKind::AttrGet,
            Operation::SetAttr { .. } => OperationKind::AttrSet,
        }
    }

    /// Runs the task to completion. Never panics: failures inside the object,
    /// panics included, become the error half of the result.
    pub fn execute(self, object: &mut dyn Object) -> TaskResult {
        let task_id = self.id;
        trace!(%task_id, path = %self.path, kind = ?self.kind(), "executing task");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.apply(object)))
            .unwrap_or_else(|payload| Err(RemoteError::Panicked(panic_message(payload))));

        TaskResult { task_id, outcome }
    }

    fn apply(self, object: &mut dyn Object) -> Result<Bson, RemoteError> {
        match self.operation {
            Operation::Call { args, kwargs } => {
                let (owner, method) = match self.path.rsplit_once('.') {
                    Some((owner, method)) => (owner, method),
                    None => ("", self.path.as_str()),
                };
                if method.is_empty() {
                    return Err(RemoteError::NotCallable(self.path.clone()));
                }
                resolve(object, owner)?.call(method, args, kwargs)
            }
            Operation::GetAttr { name } => resolve(object, &self.path)?.get(&name),
            Operation::SetAttr { name, value } => {
                resolve(object, &self.path)?.set(&name, value)?;
                Ok(Bson::Null)
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
