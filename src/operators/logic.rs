// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::context::Context;
use crate::operators::utils::arg;
use crate::operators::{add, ArgCheck, CheckResult, CheckedOperator, Operator, OperatorRegistry};
use crate::value::Value;

use std::cmp::Ordering;

use anyhow::Result;

pub fn register(m: &OperatorRegistry) {
    add(m, &["not"], Operator::value(not));
    add(
        m,
        &["==", "!=", "<", ">", "<=", ">="],
        Operator::value(compare),
    );
    add(m, &["in"], Operator::value(contains));
    add(m, &["and", "&&"], Operator::checked(Decide::And));
    add(m, &["or", "||"], Operator::checked(Decide::Or));
    add(m, &["??"], Operator::checked(Decide::Nullish));
}

fn not(_: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    Ok(Value::Bool(!arg(&args, 0).is_truthy()))
}

fn compare(name: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    let (a, b) = (arg(&args, 0), arg(&args, 1));
    Ok(Value::Bool(match name {
        "==" => a.loose_eq(&b),
        "!=" => !a.loose_eq(&b),
        "<" => a.loose_cmp(&b) == Ordering::Less,
        ">" => a.loose_cmp(&b) == Ordering::Greater,
        "<=" => a.loose_cmp(&b) != Ordering::Greater,
        ">=" => a.loose_cmp(&b) != Ordering::Less,
        _ => false,
    }))
}

/// `needle in haystack` for arrays, substrings and object keys.
fn contains(_: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    let (needle, haystack) = (arg(&args, 0), arg(&args, 1));
    Ok(Value::Bool(match &haystack {
        Value::Array(items) => items.iter().any(|v| v.loose_eq(&needle)),
        Value::String(s) => s.contains(needle.to_text().as_str()),
        Value::Object(fields) => fields.contains_key(needle.to_text().as_str()),
        _ => false,
    }))
}

/// Operators that return the first argument that decides the result.
pub enum Decide {
    And,
    Or,
    Nullish,
}

impl CheckedOperator for Decide {
    fn check_arg(&self, check: &ArgCheck) -> Result<CheckResult> {
        let decided = match self {
            Decide::And => !check.value.is_truthy(),
            Decide::Or => check.value.is_truthy(),
            Decide::Nullish => !check.value.is_nullish(),
        };
        if decided || check.index == check.last {
            Ok(CheckResult::Result(check.value.clone()))
        } else {
            Ok(CheckResult::Continue)
        }
    }

    fn apply(&self, _: &str, _: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
        Ok(match self {
            Decide::And => Value::Bool(true),
            Decide::Or => Value::Bool(false),
            Decide::Nullish => Value::Undefined,
        })
    }
}
