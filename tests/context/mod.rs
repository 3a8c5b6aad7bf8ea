// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use relish::*;

use std::cell::RefCell;
use std::rc::Rc;

fn json(s: &str) -> Value {
    match Value::from_json_str(s) {
        Ok(v) => v,
        Err(e) => panic!("bad json {s}: {e}"),
    }
}

fn nested(depth: usize) -> String {
    format!("{}0{}", "(+ 1 ".repeat(depth), ")".repeat(depth))
}

#[test]
fn parent_hops_and_locals() -> Result<()> {
    let root = RootContext::from_value(json(r#"{"x": 1}"#));
    let child = root.extend(Extend::value(json(r#"{"x": 2}"#)));

    assert_eq!(evaluate(&child, "x")?, Value::from(2));
    assert_eq!(evaluate(&child, "^x")?, Value::from(1));
    // Hops past the root stay at the root.
    assert_eq!(evaluate(&child, "^^^x")?, Value::from(1));

    let mut locals = Map::new();
    locals.insert("x".into(), Value::from(3));
    let inner = child.extend(Extend::default().locals(locals));
    assert_eq!(evaluate(&inner, "x")?, Value::from(3));
    assert_eq!(evaluate(&inner, "^x")?, Value::from(2));
    assert_eq!(evaluate(&inner, "~x")?, Value::from(1));
    Ok(())
}

#[test]
fn join_tracks_paths() -> Result<()> {
    let root = RootContext::from_value(json(r#"{"a": {"b": {"c": 7}}}"#));
    let ab = root.join("a.b")?;
    assert_eq!(ab.path(), "a.b");
    assert_eq!(ab.value(), json(r#"{"c": 7}"#));

    let c = ab.join("c")?;
    assert_eq!(c.path(), "a.b.c");
    assert_eq!(c.value(), Value::from(7));
    assert_eq!(evaluate(&ab, "^a.b.c")?, Value::from(7));

    assert!(root.join("a b").is_err());
    Ok(())
}

#[test]
fn sibling_frames_share_a_parent() {
    let root = RootContext::from_value(Value::from(0));
    let child = root.extend(Extend::value(Value::from(1)));
    let sibling = child.extend(Extend::value(Value::from(2)).mode(Extension::Sibling));
    assert!(sibling.parent().is_some_and(Context::is_root));

    // The root has no parent to share, so a sibling of it is its child.
    let below_root = root.extend(Extend::value(Value::from(3)).mode(Extension::Sibling));
    assert!(below_root.parent().is_some_and(Context::is_root));
}

#[test]
fn sources_parse_once_per_root() -> Result<()> {
    let root = RootContext::from_value(json(r#"{"a": 2}"#));
    assert_eq!(evaluate(&root, "a * 3")?, Value::from(6));
    let child = root.extend(Extend::value(json(r#"{"a": 5}"#)));
    assert_eq!(evaluate(&child, "a * 3")?, Value::from(15));
    assert_eq!(root.cached_count("default"), 1);

    let err = match evaluate(&root, "a *") {
        Err(e) => e,
        Ok(v) => panic!("evaluated to {v}"),
    };
    assert!(err.downcast_ref::<ParseError>().is_some());
    assert!(evaluate(&root, "a *").is_err());
    assert_eq!(root.cached_count("default"), 2);

    let other = RootContext::from_value(Value::new_object());
    assert_eq!(other.cached_count("default"), 0);
    Ok(())
}

#[test]
fn depth_is_bounded() -> Result<()> {
    let root = RootContext::new(
        Value::Null,
        RootOptions {
            limits: Limits {
                max_depth: 8,
                ..Default::default()
            },
            ..Default::default()
        },
    );
    assert_eq!(evaluate(&root, nested(5).as_str())?, Value::from(5));

    let err = match evaluate(&root, nested(20).as_str()) {
        Err(e) => e,
        Ok(v) => panic!("evaluated to {v}"),
    };
    assert!(err.to_string().contains("maximum depth"));

    // The counter unwinds after a failure.
    assert_eq!(evaluate(&root, nested(8).as_str())?, Value::from(8));
    Ok(())
}

#[test]
fn limits_deserialize_with_defaults() -> Result<()> {
    let limits: Limits = serde_json::from_str(r#"{"max_depth": 3}"#)?;
    assert_eq!(limits.max_depth, 3);
    assert_eq!(limits.max_iterations, Limits::default().max_iterations);
    Ok(())
}

#[derive(Default)]
struct Capture(RefCell<Vec<(log::Level, String)>>);

impl LogSink for Capture {
    fn log(&self, level: log::Level, message: &str) {
        self.0.borrow_mut().push((level, message.to_string()));
    }
}

#[test]
fn log_goes_to_the_root_sink() -> Result<()> {
    let sink = Rc::new(Capture::default());
    let root = RootContext::new(
        Value::Null,
        RootOptions {
            log: Some(sink.clone()),
            ..Default::default()
        },
    );
    assert_eq!(evaluate(&root, "log('a', 1, level: 'warn')")?, Value::from(1));
    assert_eq!(evaluate(&root, "log('b')")?, Value::from("b"));
    assert_eq!(
        *sink.0.borrow(),
        vec![
            (log::Level::Warn, "a 1".to_string()),
            (log::Level::Info, "b".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn unresolvable_paths_are_undefined() -> Result<()> {
    let root = RootContext::from_value(json(r#"{"a": 1, "s": "text", "n": null}"#));
    for path in [
        "a.b.c",
        "a[5].x",
        "^^^^b",
        "!nope.x",
        "~q.r",
        "*missing.rows",
        "@nothing.here",
        "n.x.y",
        "s.nope",
        "x[y]",
        "[1, 2].7",
    ] {
        assert_eq!(evaluate(&root, path)?, Value::Undefined, "{path}");
    }
    Ok(())
}

#[test]
fn assignments() -> Result<()> {
    let root = RootContext::from_value(Value::new_object());
    safe_set(&root, &parse_path("a.b[1]")?, Value::from(5), Assignment::Set);
    assert_eq!(root.value(), json(r#"{"a": {"b": [null, 5]}}"#));

    let child = root.extend(Extend::value(Value::new_object()));
    safe_set(&child, &parse_path("n")?, Value::from(3), Assignment::Let);
    assert_eq!(evaluate(&child, "n")?, Value::from(3));
    assert_eq!(evaluate(&root, "@locals.n")?, Value::from(3));

    safe_set(&child, &parse_path("~top")?, Value::from(true), Assignment::Set);
    assert_eq!(evaluate(&root, "top")?, Value::from(true));

    // Parent writes are not supported.
    safe_set(&child, &parse_path("^a")?, Value::Null, Assignment::Set);
    assert_eq!(evaluate(&root, "a.b.1")?, Value::from(5));
    Ok(())
}

#[test]
fn far_array_assignments_are_ignored() -> Result<()> {
    let root = RootContext::from_value(Value::Null);
    assert_eq!(
        evaluate(&root, "let x = []; let x[100000000000000] = 1; 2")?,
        Value::from(2)
    );
    assert_eq!(evaluate(&root, "x")?, json("[]"));

    // Growth within the iteration limit pads with null.
    assert_eq!(evaluate(&root, "let y = []; let y[2] = 1; y")?, json("[null, null, 1]"));

    let limited = RootContext::new(
        Value::new_object(),
        RootOptions {
            limits: Limits {
                max_iterations: 4,
                ..Default::default()
            },
            ..Default::default()
        },
    );
    safe_set(&limited, &parse_path("a[3]")?, Value::from(1), Assignment::Set);
    safe_set(&limited, &parse_path("b[4]")?, Value::from(1), Assignment::Set);
    assert_eq!(limited.value(), json(r#"{"a": [null, null, null, 1], "b": []}"#));
    Ok(())
}

#[test]
fn date_special_is_stable() -> Result<()> {
    let root = RootContext::from_value(Value::Null);
    let first = evaluate(&root, "@date")?;
    assert!(matches!(first, Value::Date(_)));
    let child = root.extend(Extend::value(Value::from(1)));
    assert_eq!(evaluate(&child, "@date")?, first);
    Ok(())
}

#[test]
fn root_specials_and_parameters() -> Result<()> {
    let mut special = Map::new();
    special.insert("user".into(), Value::from("ann"));
    let root = RootContext::new(
        Value::Null,
        RootOptions {
            parameters: Some(json(r#"{"limit": 10}"#)),
            special: Some(special),
            ..Default::default()
        },
    );
    assert_eq!(evaluate(&root, "!limit + 1")?, Value::from(11));
    assert_eq!(evaluate(&root, "@user")?, Value::from("ann"));
    assert_eq!(evaluate(&root, "@parameters.limit")?, Value::from(10));
    Ok(())
}
