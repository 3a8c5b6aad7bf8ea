// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use relish::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A root whose registry has a `touch` operator that counts its calls.
fn tracked(data: Value) -> (RootContext, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = builtin_operators();
    let counter = calls.clone();
    registry
        .register(
            "touch",
            Operator::value(move |_, _, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(1))
            }),
        )
        .unwrap();
    let root = RootContext::new(
        data,
        RootOptions {
            operators: Some(Arc::new(registry)),
            ..Default::default()
        },
    );
    (root, calls)
}

#[test]
fn lazy_operators_skip_unneeded_arguments() -> Result<()> {
    for (expr, want) in [
        ("(and false (touch))", Value::Bool(false)),
        ("(or 1 (touch))", Value::from(1)),
        ("(?? 0 (touch))", Value::from(0)),
        ("(if true 1 (touch))", Value::from(1)),
        ("if false then (touch) else 2 end", Value::from(2)),
        ("(unless true (touch) 3)", Value::from(3)),
        ("(case 2 1 (touch) 2 'two')", Value::from("two")),
    ] {
        let (root, hit) = tracked(Value::Null);
        assert_eq!(evaluate(&root, expr)?, want, "{expr}");
        assert_eq!(hit.load(Ordering::SeqCst), 0, "{expr} called touch");
    }

    let (root, hit) = tracked(Value::Null);
    assert_eq!(evaluate(&root, "(and true (touch))")?, Value::from(1));
    assert_eq!(hit.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn builtin_kinds() {
    let kind = |name: &str| get_operator(name).map(|o| o.kind());
    assert_eq!(kind("+"), Some("value"));
    assert_eq!(kind("and"), Some("checked"));
    assert_eq!(kind("each"), Some("checked"));
    assert_eq!(kind("sum"), Some("aggregate"));
    assert_eq!(kind("no such operator"), None);
}

#[test]
fn global_registration() -> Result<()> {
    register_operator(
        "twice",
        Operator::value(|_, args, _, _| {
            let n = args.first().and_then(Value::to_number).unwrap_or(0.0);
            Ok(Value::from(n * 2.0))
        }),
    )?;
    assert!(get_operator_map().contains_key("twice"));
    assert_eq!(evaluate(Value::Null, "twice(21)")?, Value::from(42));
    assert_eq!(evaluate(Value::Null, "(pipe 4 twice twice)")?, Value::from(16));

    assert!(unregister_operator("twice").is_some());
    // Unknown operators evaluate to true.
    assert_eq!(evaluate(Value::Null, "twice(21)")?, Value::Bool(true));

    assert!(register_operator(" ", Operator::value(|_, _, _, _| Ok(Value::Null))).is_err());
    Ok(())
}

/// Returns the first truthy argument without evaluating the rest.
struct FirstTruthy;

impl CheckedOperator for FirstTruthy {
    fn check_arg(&self, check: &ArgCheck) -> Result<CheckResult> {
        Ok(if check.value.is_truthy() {
            CheckResult::Result(check.value.clone())
        } else {
            CheckResult::Continue
        })
    }

    fn apply(&self, _: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
        Ok(Value::from(args.len()))
    }
}

/// Replaces its first argument with a marker and passes over the second.
struct SkipSecond;

impl CheckedOperator for SkipSecond {
    fn check_arg(&self, check: &ArgCheck) -> Result<CheckResult> {
        Ok(match check.index {
            0 => CheckResult::Skip {
                skip: 1,
                splice: vec![Value::from("marker")],
            },
            _ => CheckResult::Continue,
        })
    }

    fn apply(&self, _: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
        Ok(Value::from(args))
    }
}

#[test]
fn custom_checked_operators() -> Result<()> {
    let (root, hit) = tracked(Value::Null);
    root.operators()
        .register("firstof", Operator::checked(FirstTruthy))?;
    root.operators()
        .register("skipper", Operator::checked(SkipSecond))?;

    assert_eq!(evaluate(&root, "(firstof 0 '' 3 (touch))")?, Value::from(3));
    assert_eq!(evaluate(&root, "(firstof 0 null)")?, Value::from(2));
    assert_eq!(
        evaluate(&root, "(skipper 1 (touch) 3)")?,
        Value::from(vec![Value::from("marker"), Value::from(3)])
    );
    assert_eq!(hit.load(Ordering::SeqCst), 0);

    // Registered on this root only.
    assert_eq!(evaluate(Value::Null, "(firstof 0 3)")?, Value::Bool(true));
    Ok(())
}

#[test]
fn custom_aggregate() -> Result<()> {
    let (root, _) = tracked(Value::from_json_str(r#"{"xs": [1, 2, 3]}"#)?);
    root.operators().register(
        "rowcount",
        Operator::aggregate(|_, rows, _, _, _| Ok(Value::from(rows.len()))),
    )?;

    assert_eq!(evaluate(&root, "rowcount(xs)")?, Value::from(3));
    // Without an explicit collection the nearest `@source` is used.
    assert_eq!(evaluate(&root, "rowcount()")?, Value::from(0));
    assert_eq!(
        evaluate(&root, "filter(xs, => _ > rowcount() - 2)")?,
        Value::from(vec![Value::from(2), Value::from(3)])
    );
    Ok(())
}

#[test]
fn aggregate_first_argument_evaluated_once() -> Result<()> {
    let (root, calls) = tracked(Value::from_json_str(r#"{"xs": [1, 2, 3]}"#)?);

    // Not a collection, so it is the projection over the (empty) current source.
    assert_eq!(evaluate(&root, "(count (touch))")?, Value::from(0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A collection is read once and the projection runs per row.
    assert_eq!(evaluate(&root, "sum(xs, => (touch))")?, Value::from(3));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    Ok(())
}

#[test]
fn pipe_matches_nested_calls() -> Result<()> {
    let defs = "let f = |a, b| => a * 10 + b; let g = => _ + 1;";
    let piped = evaluate(Value::Null, format!("{defs} (pipe 2 (f 1) g)").as_str())?;
    let nested = evaluate(Value::Null, format!("{defs} g(f(2, 1))").as_str())?;
    assert_eq!(piped, Value::from(22));
    assert_eq!(piped, nested);
    Ok(())
}

#[test]
fn global_formats() -> Result<()> {
    register_format("shout", |v: &Value, _: &[Value], _: &Value, _: &Context| -> Result<String> {
        Ok(format!("{}!", v.to_text().to_uppercase()))
    })?;
    let data = Value::from_json_str(r#"{"w": "hey"}"#)?;
    assert_eq!(evaluate(data.clone(), "w#shout")?, Value::from("HEY!"));
    assert!(get_format("shout").is_some());

    assert!(unregister_format("shout"));
    assert_eq!(evaluate(data, "w#shout")?, Value::from("hey"));
    Ok(())
}

#[test]
fn root_formats() -> Result<()> {
    let formats = builtin_formats();
    formats.register(
        "stars",
        Arc::new(|v: &Value, _: &[Value], _: &Value, _: &Context| -> Result<String> {
            Ok(format!("*{}*", v.to_text()))
        }),
    )?;
    let data = Value::from_json_str(r#"{"n": 5}"#)?;
    let root = RootContext::new(
        data.clone(),
        RootOptions {
            formats: Some(Arc::new(formats)),
            ..Default::default()
        },
    );
    assert_eq!(evaluate(&root, "n#stars")?, Value::from("*5*"));
    assert_eq!(evaluate(&root, "n#number")?, Value::from("5.00"));
    assert_eq!(evaluate(data, "n#stars")?, Value::from("5"));
    Ok(())
}
