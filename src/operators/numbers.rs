// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::context::Context;
use crate::dates;
use crate::operators::{add, Operator, OperatorRegistry};
use crate::value::Value;

use anyhow::Result;

pub fn register(m: &OperatorRegistry) {
    add(m, &["+", "-", "*", "/", "%", "/%"], Operator::value(arithmetic));
}

/// Numeric reading of a value. Anything without one counts as zero.
pub fn num(v: &Value) -> f64 {
    match v.to_number() {
        Some(n) if !n.is_nan() => n,
        _ => 0.0,
    }
}

fn plus(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            Value::from(format!("{}{}", a.to_text(), b.to_text()))
        }
        (Value::Date(d), Value::Timespan(t)) | (Value::Timespan(t), Value::Date(d)) => {
            dates::add_span(d, t).map_or(Value::Undefined, Value::from)
        }
        (Value::Timespan(x), Value::Timespan(y)) => Value::from(x.add(y)),
        (Value::Array(x), Value::Array(y)) => {
            Value::from(x.iter().chain(y.iter()).cloned().collect::<Vec<_>>())
        }
        _ => Value::from(num(a) + num(b)),
    }
}

fn minus(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Date(d), Value::Timespan(t)) => {
            dates::add_span(d, &t.negate()).map_or(Value::Undefined, Value::from)
        }
        (Value::Date(x), Value::Date(y)) => Value::from(dates::diff(x, y)),
        (Value::Timespan(x), Value::Timespan(y)) => Value::from(x.add(&y.negate())),
        _ => Value::from(num(a) - num(b)),
    }
}

fn negate(v: &Value) -> Value {
    match v {
        Value::Timespan(t) => Value::from(t.negate()),
        v => Value::from(-num(v)),
    }
}

/// Division by zero yields zero.
fn divide(name: &str, a: f64, b: f64) -> f64 {
    if b == 0.0 {
        return 0.0;
    }
    match name {
        "/" => a / b,
        "%" => a % b,
        _ => (a / b).trunc(),
    }
}

fn arithmetic(name: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(Value::from(if name == "*" { 1.0 } else { 0.0 }));
    };
    let rest: Vec<Value> = args.collect();
    if rest.is_empty() {
        return Ok(match name {
            "-" => negate(&first),
            "+" => match first {
                Value::String(_) | Value::Date(_) | Value::Timespan(_) => first,
                v => Value::from(num(&v)),
            },
            _ => Value::from(num(&first)),
        });
    }

    Ok(rest.iter().fold(first, |acc, v| match name {
        "+" => plus(&acc, v),
        "-" => minus(&acc, v),
        "*" => Value::from(num(&acc) * num(v)),
        _ => Value::from(divide(name, num(&acc), num(v))),
    }))
}
