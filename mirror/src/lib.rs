//! Drive an object that lives on a worker as if it were local.
//!
//! A [`Proxy`] turns chained attribute access into a dotted path. Calls, reads
//! and writes on that path become tasks for the worker owning the real object,
//! and come back as [`TaskFuture`]s.
//!
//! ```no_run
//! use bson::{bson, Bson, Document};
//! use mirror::{Proxy, Record};
//!
//! let dog = Record::new().method("bark", |_, _, _| Ok(Bson::from("woof")));
//! let proxy = Proxy::new(Record::new().object("dog", dog))?;
//!
//! let barked = proxy.child("dog").child("bark").call(vec![], Document::new())?;
//! assert_eq!(barked.result(None)?, bson!("woof"));
//!
//! proxy.child("dog").set("age", 3)?;
//! assert_eq!(proxy.child("dog").child("age").retrieve()?.result(None)?, bson!(3));
//!
//! proxy.terminate()?;
//! # Ok::<(), mirror::Error>(())
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod future;
pub mod inline;
pub mod object;
pub mod proxy;
pub mod task;
pub mod worker;

pub use config::{Mode, Options};
pub use dispatcher::Dispatcher;
pub use error::{Error, RemoteError, Result};
pub use future::{FutureState, TaskFuture};
pub use object::{argument, Object, Record};
pub use proxy::Proxy;
pub use task::{Operation, OperationKind, Task, TaskId, TaskResult};
