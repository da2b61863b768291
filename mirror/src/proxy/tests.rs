use bson::{bson, doc, Bson, Document};

use crate::error::{Error, RemoteError};
use crate::object::{argument, Record};
use crate::proxy::Proxy;
use crate::task::TaskId;

fn some_object(var: i32) -> Record {
    Record::new()
        .field("var", var)
        .field("not_argument", "foo")
        .object("child", Record::new().field("name", "kid"))
        .method("function", |this, args, kwargs| {
            let number = argument(&args, &kwargs, 0, "number")?
                .as_i32()
                .ok_or_else(|| RemoteError::InvalidArgument {
                    name: "number".into(),
                    reason: "expected an int32".into(),
                })?;
            let var = this.value("var").and_then(Bson::as_i32).unwrap_or_default();
            Ok(Bson::Int32(number + var))
        })
        .method("explode", |_, _, _| {
            Err(RemoteError::raised("something went wrong"))
        })
}

fn proxies() -> Vec<Proxy> {
    vec![
        Proxy::local(some_object(5)),
        Proxy::new(some_object(5)).unwrap(),
    ]
}

#[test]
fn init_isolated() {
    let proxy = Proxy::new(some_object(5)).unwrap();

    proxy.terminate().unwrap();
}

#[test]
fn root_path_is_empty() {
    let proxy = Proxy::local(some_object(5));

    assert_eq!(proxy.path(), "");
}

#[test]
fn child_paths_are_dot_joined() {
    let proxy = Proxy::local(some_object(5));

    assert_eq!(proxy.child("child").path(), "child");
    assert_eq!(proxy.child("child").child("subchild").path(), "child.subchild");
    assert_eq!(
        proxy.child("a").child("b").child("c").child("d").path(),
        "a.b.c.d"
    );
}

#[test]
fn child_never_fails_for_missing_attributes() {
    let proxy = Proxy::local(some_object(5));

    let missing = proxy.child("non_existing_attr");

    assert_eq!(missing.path(), "non_existing_attr");
    assert_eq!(proxy.dispatcher().pending_count(), 0);
}

#[test]
fn building_paths_submits_nothing() {
    let proxy = Proxy::local(some_object(5));

    let _ = proxy.child("child").child("var");

    assert_eq!(proxy.dispatcher().pending_count(), 0);
}

#[test]
fn call_returns_method_result() {
    for proxy in proxies() {
        let future = proxy.child("function").call(vec![bson!(10)], Document::new()).unwrap();

        assert_eq!(future.result(None).unwrap(), bson!(15));
        proxy.terminate().unwrap();
    }
}

#[test]
fn call_accepts_keyword_arguments() {
    for proxy in proxies() {
        let future = proxy
            .child("function")
            .call(vec![], doc! { "number": 1 })
            .unwrap();

        assert_eq!(future.result(None).unwrap(), bson!(6));
    }
}

#[test]
fn set_then_retrieve() {
    for proxy in proxies() {
        let set = proxy.child("child").set("age", 3).unwrap();
        let get = proxy.child("child").child("age").retrieve().unwrap();

        assert_eq!(get.result(None).unwrap(), bson!(3));
        assert!(set.done());
        assert_eq!(set.result(None).unwrap(), Bson::Null);
    }
}

#[test]
fn get_is_retrieve_of_child() {
    for proxy in proxies() {
        let direct = proxy.child("child").get("name").unwrap();
        let retrieved = proxy.child("child").child("name").retrieve().unwrap();

        assert_eq!(direct.result(None).unwrap(), bson!("kid"));
        assert_eq!(retrieved.result(None).unwrap(), bson!("kid"));
    }
}

#[test]
fn retrieve_of_nested_object_returns_its_fields() {
    for proxy in proxies() {
        let future = proxy.child("child").retrieve().unwrap();

        assert_eq!(future.result(None).unwrap(), bson!({ "name": "kid" }));
    }
}

#[test]
fn retrieve_missing_attribute_fails_remotely() {
    for proxy in proxies() {
        let future = proxy.child("non_existing_attr").retrieve().unwrap();

        assert_eq!(
            future.error(None).unwrap(),
            Some(RemoteError::NoAttribute("non_existing_attr".into()))
        );
    }
}

#[test]
fn attributes_created_remotely_become_reachable() {
    for proxy in proxies() {
        proxy.set("late", "arrival").unwrap();

        let future = proxy.child("late").retrieve().unwrap();

        assert_eq!(future.result(None).unwrap(), bson!("arrival"));
    }
}

#[test]
fn raised_error_does_not_stop_the_worker() {
    for proxy in proxies() {
        let failing = proxy.child("explode").call(vec![], Document::new()).unwrap();

        match failing.result(None) {
            Err(Error::Remote(error)) => {
                assert_eq!(error, RemoteError::raised("something went wrong"))
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let next = proxy.child("function").call(vec![bson!(1)], Document::new()).unwrap();
        assert_eq!(next.result(None).unwrap(), bson!(6));
    }
}

#[test]
fn wait_all_futures_resolves_everything() {
    for proxy in proxies() {
        let futures: Vec<_> = (0..3)
            .map(|n| proxy.child("function").call(vec![bson!(n)], Document::new()).unwrap())
            .collect();

        proxy.wait_all_futures().unwrap();

        assert!(futures.iter().all(|future| future.done()));
        assert_eq!(futures[2].result(None).unwrap(), bson!(7));
    }
}

#[test]
fn children_share_the_dispatcher() {
    let proxy = Proxy::local(some_object(5));

    let first = proxy.child("child").get("name").unwrap();
    let second = proxy.child("var").retrieve().unwrap();

    assert_eq!(first.task_id(), TaskId::from(0));
    assert_eq!(second.task_id(), TaskId::from(1));
}

#[test]
fn terminate_is_idempotent() {
    for proxy in proxies() {
        proxy.terminate().unwrap();
        proxy.terminate().unwrap();

        assert!(matches!(proxy.child("var").retrieve(), Err(Error::Terminated)));
    }
}
