// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::Expr;
use crate::context::Context;
use crate::data::{self, Extractor, FilterOptions, Group};
use crate::interpreter::eval_value;
use crate::operators::numbers::num;
use crate::operators::utils::{apply_row, opt};
use crate::operators::{add, Operator, OperatorRegistry};
use crate::value::Value;

use std::cmp::Ordering;

use anyhow::Result;

pub fn register(m: &OperatorRegistry) {
    add(
        m,
        &["sum", "avg", "count", "min", "max", "first", "last", "map"],
        Operator::aggregate(reduce),
    );
    add(m, &["filter"], Operator::aggregate(filter));
    add(m, &["sort"], Operator::aggregate(sort));
    add(m, &["group"], Operator::aggregate(group));
}

fn first_arg(ctx: &Context, args: &[Expr]) -> Result<Value> {
    match args.first() {
        Some(e) => eval_value(ctx, e),
        None => Ok(Value::Undefined),
    }
}

/// Per-row values: the rows themselves, or what an application or path string
/// yields for each.
fn project(ctx: &Context, source: &[Value], by: &Value) -> Result<Vec<Value>> {
    let len = source.len();
    match by {
        Value::Application(app) => source
            .iter()
            .enumerate()
            .map(|(i, row)| apply_row(ctx, app, row, i, Value::from(i), len))
            .collect(),
        Value::String(_) => match Extractor::from_value(by) {
            Some(extractor) => source
                .iter()
                .enumerate()
                .map(|(i, row)| extractor.extract(ctx, row, i))
                .collect(),
            None => Ok(vec![Value::Undefined; len]),
        },
        _ => Ok(source.to_vec()),
    }
}

fn extreme(values: &[Value], want: Ordering) -> Value {
    values
        .iter()
        .filter(|v| !v.is_nullish())
        .fold(None, |best: Option<&Value>, v| match best {
            Some(b) if v.loose_cmp(b) != want => Some(b),
            _ => Some(v),
        })
        .cloned()
        .unwrap_or(Value::Undefined)
}

fn reduce(name: &str, source: &[Value], args: &[Expr], _: &Value, ctx: &Context) -> Result<Value> {
    let by = first_arg(ctx, args)?;
    let values = project(ctx, source, &by)?;
    let total = || values.iter().map(num).sum::<f64>();
    Ok(match name {
        "sum" => Value::from(total()),
        "avg" if values.is_empty() => Value::from(0.0),
        "avg" => Value::from(total() / values.len() as f64),
        "count" if by.is_undefined() => Value::from(values.len()),
        "count" => Value::from(values.iter().filter(|v| v.is_truthy()).count()),
        "min" => extreme(&values, Ordering::Less),
        "max" => extreme(&values, Ordering::Greater),
        "first" => values.first().cloned().unwrap_or(Value::Undefined),
        "last" => values.last().cloned().unwrap_or(Value::Undefined),
        _ => Value::from(values),
    })
}

/// `filter(rows, |row| pred, sort: spec, group: spec)`.
fn filter(_: &str, source: &[Value], args: &[Expr], opts: &Value, ctx: &Context) -> Result<Value> {
    let predicate = match first_arg(ctx, args)? {
        Value::Application(app) => Some(app),
        _ => None,
    };
    let present = |v: &Value| (!v.is_undefined()).then(|| v.clone());
    let options = FilterOptions {
        predicate,
        sort: present(opt(opts, "sort")),
        group: present(opt(opts, "group")),
    };
    let ds = data::filter(ctx, &Value::from(source.to_vec()), &options)?;
    Ok(ds.value)
}

fn spec(ctx: &Context, args: &[Expr], opts: &Value) -> Result<Value> {
    match first_arg(ctx, args)? {
        Value::Undefined => Ok(opt(opts, "by").clone()),
        v => Ok(v),
    }
}

fn sort(_: &str, source: &[Value], args: &[Expr], opts: &Value, ctx: &Context) -> Result<Value> {
    let spec = spec(ctx, args, opts)?;
    Ok(Value::from(data::sort(ctx, source, &spec)?))
}

fn group(_: &str, source: &[Value], args: &[Expr], opts: &Value, ctx: &Context) -> Result<Value> {
    let spec = spec(ctx, args, opts)?;
    let groups = data::group(ctx, source, &spec)?;
    Ok(Value::from(
        groups.iter().map(Group::to_value).collect::<Vec<_>>(),
    ))
}
