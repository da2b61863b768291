use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};

use crate::config::Options;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::future::TaskFuture;
use crate::object::Object;

#[cfg(test)]
mod tests;

/// Handle on an attribute path of an object owned by a worker.
///
/// Building paths never talks to the worker and never fails; whether the
/// attribute exists is only known once an operation runs, since the object may
/// grow new attributes after the proxy was built.
#[derive(Clone)]
pub struct Proxy {
    prefix: String,
    name: String,
    dispatcher: Arc<Dispatcher>,
}

impl Proxy {
    /// Moves `object` onto its own worker thread.
    pub fn new<O: Object>(object: O) -> Result<Proxy> {
        Proxy::with_options(object, &Options::default())
    }

    /// Keeps `object` in the calling thread; tasks run when results are awaited.
    pub fn local<O: Object>(object: O) -> Proxy {
        Proxy::from_dispatcher(Dispatcher::local(object, &Options::local()))
    }

    pub fn with_options<O: Object>(object: O, options: &Options) -> Result<Proxy> {
        Ok(Proxy::from_dispatcher(Dispatcher::start(object, options)?))
    }

    pub fn from_dispatcher(dispatcher: Arc<Dispatcher>) -> Proxy {
        Proxy {
            prefix: String::new(),
            name: String::new(),
            dispatcher,
        }
    }

    pub fn path(&self) -> String {
        if self.prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.prefix, self.name)
        }
    }

    pub fn child(&self, name: &str) -> Proxy {
        Proxy {
            prefix: self.path(),
            name: name.to_string(),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }

    /// Invokes the method at this path.
    pub fn call(&self, args: Vec<Bson>, kwargs: Document) -> Result<TaskFuture> {
        self.dispatcher.submit(&self.path(), args, kwargs)
    }

    /// Writes attribute `name` of the object at this path. The future's value is
    /// always null.
    pub fn set(&self, name: &str, value: impl Into<Bson>) -> Result<TaskFuture> {
        self.dispatcher.setattr(&self.path(), name, value.into())
    }

    /// Reads attribute `name` of the object at this path.
    pub fn get(&self, name: &str) -> Result<TaskFuture> {
        self.dispatcher.getattr(&self.path(), name)
    }

    /// Reads the attribute this proxy points at.
    pub fn retrieve(&self) -> Result<TaskFuture> {
        self.dispatcher.getattr(&self.prefix, &self.name)
    }

    pub fn wait_all_futures(&self) -> Result<()> {
        self.dispatcher.drain_all()
    }

    pub fn terminate(&self) -> Result<()> {
        self.dispatcher.terminate()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Proxy").field(&self.path()).finish()
    }
}
