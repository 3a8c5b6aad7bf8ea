// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Application, Expr};
use crate::context::{Context, Extend};
use crate::data::row_specials;
use crate::dates;
use crate::interpreter::eval_apply;
use crate::operators::{add, Operator, OperatorRegistry};
use crate::value::{Map, Value};

use std::rc::Rc;

use anyhow::Result;
use log::warn;

pub fn register(m: &OperatorRegistry) {
    add(m, &["get"], Operator::value(get));
    add(m, &["array"], Operator::value(array));
    add(m, &["object"], Operator::value(object));
    add(m, &["date"], Operator::value(date));
    add(m, &["log"], Operator::value(log_op));
    add(m, &["generate"], Operator::value(generate));
}

/// Argument `i`, or undefined when absent.
pub fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// Named option, or undefined.
pub fn opt<'a>(opts: &'a Value, name: &str) -> &'a Value {
    &opts[name]
}

/// Wrap an unevaluated argument as an application unless it already is one.
pub fn as_application(expr: &Expr) -> Value {
    match expr {
        Expr::Application(app) => Value::Application(app.clone()),
        body => Value::Application(Rc::new(Application {
            body: body.clone(),
            names: None,
        })),
    }
}

/// Call `app` for one row of a collection, exposing `@index`, `@key`, `@first` and
/// `@last`.
pub fn apply_row(
    ctx: &Context,
    app: &Application,
    row: &Value,
    index: usize,
    key: Value,
    len: usize,
) -> Result<Value> {
    let specials = row_specials(index, key, Some(len));
    let anchor = ctx.extend(Extend::value(row.clone()).special(specials.clone()));
    eval_apply(
        &anchor,
        app,
        vec![row.clone(), Value::from(index)],
        Some(specials),
    )
}

fn get(_: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    let mut args = args.into_iter();
    let mut value = args.next().unwrap_or(Value::Undefined);
    for key in args {
        if value.is_nullish() {
            return Ok(Value::Undefined);
        }
        value = value.index(&key);
    }
    Ok(value)
}

fn array(_: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    Ok(Value::from(args))
}

fn object(_: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    let mut fields = Map::new();
    for pair in args.chunks(2) {
        if let [k, v] = pair {
            fields.insert(k.to_text().into(), v.clone());
        }
    }
    Ok(Value::from(fields))
}

fn date(_: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    Ok(match args.first() {
        None => Value::from(dates::now()),
        Some(Value::Date(d)) => Value::Date(*d),
        Some(Value::String(s)) => match dates::relative(s) {
            Some(d) => Value::from(d),
            None => dates::parse_date(s).map_or(Value::Undefined, Value::from),
        },
        Some(Value::Number(ms)) => chrono::DateTime::from_timestamp_millis(*ms as i64)
            .map_or(Value::Undefined, |d| Value::from(d.fixed_offset())),
        Some(_) => Value::Undefined,
    })
}

fn log_op(_: &str, args: Vec<Value>, opts: &Value, ctx: &Context) -> Result<Value> {
    let level = match opt(opts, "level").to_text().to_ascii_lowercase().as_str() {
        "error" => log::Level::Error,
        "warn" => log::Level::Warn,
        "debug" => log::Level::Debug,
        "trace" => log::Level::Trace,
        _ => log::Level::Info,
    };
    let message = args
        .iter()
        .map(Value::to_text)
        .collect::<Vec<_>>()
        .join(" ");
    ctx.log(level, &message);
    Ok(args.last().cloned().unwrap_or(Value::Undefined))
}

/// Call an application with the iteration index and previous result until it
/// yields undefined, up to `max:` or the root's iteration limit.
fn generate(_: &str, args: Vec<Value>, opts: &Value, ctx: &Context) -> Result<Value> {
    let Some(app) = args.first().and_then(Value::as_application) else {
        return Ok(Value::new_array());
    };
    let max = opt(opts, "max")
        .to_number()
        .map_or(ctx.limits().max_iterations, |n| n.max(0.0) as usize);

    let mut out = vec![];
    let mut last = Value::Undefined;
    loop {
        if out.len() >= max {
            warn!("generate stopped after {max} iterations");
            break;
        }
        let index = out.len();
        let mut special = Map::new();
        special.insert("index".into(), Value::from(index));
        special.insert("last".into(), last.clone());
        let next = eval_apply(ctx, app, vec![Value::from(index), last], Some(special))?;
        if next.is_undefined() {
            break;
        }
        out.push(next.clone());
        last = next;
    }
    Ok(Value::from(out))
}
