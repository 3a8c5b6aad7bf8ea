// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::context::{Context, Extend};
use crate::data;
use crate::interpreter::eval_apply;
use crate::operators::utils::{apply_row, arg, as_application};
use crate::operators::{add, ArgCheck, CheckResult, CheckedOperator, Operator, OperatorRegistry};
use crate::parser::parse_path;
use crate::reference::{safe_set, Assignment};
use crate::value::Value;

use anyhow::Result;

pub fn register(m: &OperatorRegistry) {
    add(m, &["if"], Operator::checked(Branch::If));
    add(m, &["unless"], Operator::checked(Branch::Unless));
    add(m, &["case"], Operator::checked(Case));
    add(m, &["each"], Operator::checked(Scoped::Each));
    add(m, &["with"], Operator::checked(Scoped::With));
    add(m, &["block"], Operator::value(block));
    add(m, &["let", "set"], Operator::value(assign));
}

/// `if c1 a1 c2 a2 … else` and its mirror `unless`. Rejected branches are never
/// evaluated.
pub enum Branch {
    If,
    Unless,
}

impl CheckedOperator for Branch {
    fn check_arg(&self, check: &ArgCheck) -> Result<CheckResult> {
        let is_condition = check.index % 2 == 0 && check.index < check.last;
        if !is_condition {
            return Ok(CheckResult::Result(check.value.clone()));
        }
        let take = match self {
            Branch::If => check.value.is_truthy(),
            Branch::Unless => !check.value.is_truthy(),
        };
        Ok(if take {
            CheckResult::Continue
        } else {
            CheckResult::Skip {
                skip: 1,
                splice: vec![],
            }
        })
    }

    fn apply(&self, _: &str, _: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
        Ok(Value::Undefined)
    }
}

/// `case subject when1 body1 when2 body2 … else`. A when-value matches the subject by
/// loose equality, or is an application called with the subject.
pub struct Case;

impl CheckedOperator for Case {
    fn check_arg(&self, check: &ArgCheck) -> Result<CheckResult> {
        if check.index == 0 {
            return Ok(CheckResult::Continue);
        }
        if check.index % 2 == 0 || check.index == check.last {
            return Ok(CheckResult::Result(check.value.clone()));
        }
        let subject = check.values.first().cloned().unwrap_or(Value::Undefined);
        let matched = match check.value {
            Value::Application(app) => {
                eval_apply(check.ctx, app, vec![subject], None)?.is_truthy()
            }
            when => when.loose_eq(&subject),
        };
        Ok(CheckResult::Skip {
            skip: if matched { 0 } else { 1 },
            splice: vec![],
        })
    }

    fn apply(&self, _: &str, _: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
        Ok(Value::Undefined)
    }
}

/// `each source body else` and `with value body else`. Only the source is evaluated
/// eagerly; the body and else branch arrive as applications.
pub enum Scoped {
    Each,
    With,
}

impl CheckedOperator for Scoped {
    fn check_arg(&self, check: &ArgCheck) -> Result<CheckResult> {
        let mut splice = vec![check.value.clone()];
        splice.extend(check.call.args.iter().skip(1).map(as_application));
        Ok(CheckResult::Skip {
            skip: check.last,
            splice,
        })
    }

    fn apply(&self, _: &str, args: Vec<Value>, _: &Value, ctx: &Context) -> Result<Value> {
        let source = arg(&args, 0);
        let body = arg(&args, 1);
        let otherwise = arg(&args, 2);
        match self {
            Scoped::Each => each(ctx, &source, &body, &otherwise),
            Scoped::With => {
                if source.is_truthy() {
                    call_with(ctx, &body, &source)
                } else {
                    call_with(ctx, &otherwise, &source)
                }
            }
        }
    }
}

fn call_with(ctx: &Context, branch: &Value, value: &Value) -> Result<Value> {
    match branch {
        Value::Application(app) => {
            let anchor = ctx.extend(Extend::value(value.clone()));
            eval_apply(&anchor, app, vec![value.clone()], None)
        }
        _ => Ok(Value::Undefined),
    }
}

/// Results are concatenated when every one is text, as template bodies are;
/// otherwise they are collected into an array.
fn each(ctx: &Context, source: &Value, body: &Value, otherwise: &Value) -> Result<Value> {
    let entries = data::entries(source);
    if entries.is_empty() {
        return call_with(ctx, otherwise, source);
    }
    let Value::Application(app) = body else {
        return Ok(Value::Undefined);
    };

    let len = entries.len();
    let mut results = Vec::with_capacity(len);
    for (i, (key, row)) in entries.iter().enumerate() {
        results.push(apply_row(ctx, app, row, i, key.clone(), len)?);
    }
    if results.iter().all(|r| matches!(r, Value::String(_))) {
        return Ok(Value::from(
            results.iter().map(Value::to_text).collect::<String>(),
        ));
    }
    Ok(Value::from(results))
}

fn block(_: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    Ok(args.last().cloned().unwrap_or(Value::Undefined))
}

/// `let path value` binds a local; `set path value` writes the current or root value.
fn assign(name: &str, args: Vec<Value>, _: &Value, ctx: &Context) -> Result<Value> {
    let path = parse_path(&arg(&args, 0).to_text())?;
    let value = arg(&args, 1);
    let mode = if name == "set" {
        Assignment::Set
    } else {
        Assignment::Let
    };
    safe_set(ctx, &path, value.clone(), mode);
    Ok(value)
}
