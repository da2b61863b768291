use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};

use crate::error::RemoteError;

/// Something a worker can own and serve requests against.
///
/// The proxy never looks at the concrete type: every access is a name lookup
/// performed here, inside the worker.
pub trait Object: Send + 'static {
    /// Nested object reachable under `name`, used to walk dotted paths.
    fn child(&mut self, name: &str) -> Option<&mut dyn Object>;

    fn get(&self, name: &str) -> Result<Bson, RemoteError>;

    fn set(&mut self, name: &str, value: Bson) -> Result<(), RemoteError>;

    fn call(&mut self, method: &str, args: Vec<Bson>, kwargs: Document)
        -> Result<Bson, RemoteError>;

    /// Value representation of the whole object, returned when a parent reads it
    /// as an attribute.
    fn snapshot(&self) -> Result<Bson, RemoteError> {
        Err(RemoteError::NotAValue(String::new()))
    }
}

/// Walks `path` from `root`. The empty path resolves to the root itself.
pub fn resolve<'a>(root: &'a mut dyn Object, path: &str) -> Result<&'a mut dyn Object, RemoteError> {
    let mut current = root;
    if path.is_empty() {
        return Ok(current);
    }

    for segment in path.split('.') {
        current = current
            .child(segment)
            .ok_or_else(|| RemoteError::NoAttribute(segment.to_string()))?;
    }

    Ok(current)
}

/// Looks an argument up by position first, then by keyword.
pub fn argument<'a>(
    args: &'a [Bson],
    kwargs: &'a Document,
    index: usize,
    name: &str,
) -> Result<&'a Bson, RemoteError> {
    args.get(index)
        .or_else(|| kwargs.get(name))
        .ok_or_else(|| RemoteError::MissingArgument(name.to_string()))
}

pub type Method =
    Arc<dyn Fn(&mut Record, Vec<Bson>, Document) -> Result<Bson, RemoteError> + Send + Sync>;

enum Member {
    Value(Bson),
    Object(Box<dyn Object>),
    Method(Method),
}

/// Dynamic object made of named values, nested objects and methods.
///
/// Writing an attribute that does not exist yet creates it.
#[derive(Default)]
pub struct Record {
    members: BTreeMap<String, Member>,
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    pub fn field(mut self, name: &str, value: impl Into<Bson>) -> Record {
        self.members
            .insert(name.to_string(), Member::Value(value.into()));
        self
    }

    pub fn object(mut self, name: &str, object: impl Object) -> Record {
        self.members
            .insert(name.to_string(), Member::Object(Box::new(object)));
        self
    }

    pub fn method<F>(mut self, name: &str, method: F) -> Record
    where
        F: Fn(&mut Record, Vec<Bson>, Document) -> Result<Bson, RemoteError>
            + Send
            + Sync
            + 'static,
    {
        self.members
            .insert(name.to_string(), Member::Method(Arc::new(method)));
        self
    }

    /// Local read of a plain value field, for use inside methods.
    pub fn value(&self, name: &str) -> Option<&Bson> {
        match self.members.get(name) {
            Some(Member::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn set_value(&mut self, name: &str, value: impl Into<Bson>) {
        self.members
            .insert(name.to_string(), Member::Value(value.into()));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

impl Object for Record {
    fn child(&mut self, name: &str) -> Option<&mut dyn Object> {
        match self.members.get_mut(name) {
            Some(Member::Object(object)) => Some(object.as_mut()),
            _ => None,
        }
    }

    fn get(&self, name: &str) -> Result<Bson, RemoteError> {
        match self.members.get(name) {
            Some(Member::Value(value)) => Ok(value.clone()),
            Some(Member::Object(object)) => object
                .snapshot()
                .map_err(|_| RemoteError::NotAValue(name.to_string())),
            Some(Member::Method(_)) => Err(RemoteError::NotAValue(name.to_string())),
            None => Err(RemoteError::NoAttribute(name.to_string())),
        }
    }

    fn set(&mut self, name: &str, value: Bson) -> Result<(), RemoteError> {
        self.set_value(name, value);
        Ok(())
    }

    fn call(
        &mut self,
        method: &str,
        args: Vec<Bson>,
        kwargs: Document,
    ) -> Result<Bson, RemoteError> {
        let method_fn = match self.members.get(method) {
            Some(Member::Method(method_fn)) => method_fn.clone(),
            Some(_) => return Err(RemoteError::NotCallable(method.to_string())),
            None => return Err(RemoteError::NoAttribute(method.to_string())),
        };

        method_fn(self, args, kwargs)
    }

    fn snapshot(&self) -> Result<Bson, RemoteError> {
        let mut document = Document::new();
        for (name, member) in &self.members {
            match member {
                Member::Value(value) => {
                    document.insert(name, value.clone());
                }
                Member::Object(object) => {
                    if let Ok(value) = object.snapshot() {
                        document.insert(name, value);
                    }
                }
                Member::Method(_) => {}
            }
        }
        Ok(Bson::Document(document))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use bson::{bson, doc};

    use super::*;

    fn dog() -> Record {
        Record::new()
            .field("name", "rex")
            .method("bark", |_, args, kwargs| {
                let loud = argument(&args, &kwargs, 0, "loud")?
                    .as_bool()
                    .unwrap_or(false);
                Ok(Bson::from(if loud { "WOOF-WOOF" } else { "woof-woof" }))
            })
    }

    #[test]
    fn resolve_walks_nested_objects() {
        let mut person = Record::new().object("dog", dog());

        let target = resolve(&mut person, "dog").unwrap();

        assert_eq!(target.get("name").unwrap(), bson!("rex"));
    }

    #[test]
    fn resolve_empty_path_is_root() {
        let mut person = Record::new().field("age", 40);

        let target = resolve(&mut person, "").unwrap();

        assert_eq!(target.get("age").unwrap(), bson!(40));
    }

    #[test]
    fn resolve_reports_missing_segment() {
        let mut person = Record::new().object("dog", dog());

        let result = resolve(&mut person, "dog.collar").map(|_| ());

        assert_eq!(result, Err(RemoteError::NoAttribute("collar".into())));
    }

    #[test]
    fn methods_accept_positional_or_keyword_arguments() {
        let mut dog = dog();

        let positional = dog.call("bark", vec![bson!(true)], Document::new()).unwrap();
        let keyword = dog.call("bark", vec![], doc! { "loud": false }).unwrap();

        assert_eq!(positional, bson!("WOOF-WOOF"));
        assert_eq!(keyword, bson!("woof-woof"));
    }

    #[test]
    fn calling_a_field_is_not_callable() {
        let mut dog = dog();

        let result = dog.call("name", vec![], Document::new());

        assert_eq!(result, Err(RemoteError::NotCallable("name".into())));
    }

    #[test]
    fn set_creates_missing_fields() {
        let mut dog = dog();

        dog.set("age", bson!(3)).unwrap();

        assert_eq!(dog.get("age").unwrap(), bson!(3));
    }

    #[test]
    fn nested_objects_read_as_documents() {
        let person = Record::new().object("dog", dog());

        assert_eq!(person.get("dog").unwrap(), bson!({ "name": "rex" }));
    }
}
