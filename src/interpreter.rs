// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::context::{Context, Extend, Extension};
use crate::data;
use crate::operators::{ArgCheck, CheckResult, Operator};
use crate::reference::safe_get;
use crate::value::{Map, Value};

use std::rc::Rc;

use anyhow::Result;
use log::{debug, warn};

/// What `eval_parse` accepts: source text, a parsed expression, or a plain value.
pub enum Input<'a> {
    Text(&'a str),
    Expr(&'a Expr),
    Value(Value),
}

impl<'a> From<&'a str> for Input<'a> {
    fn from(s: &'a str) -> Self {
        Input::Text(s)
    }
}

impl<'a> From<&'a String> for Input<'a> {
    fn from(s: &'a String) -> Self {
        Input::Text(s.as_str())
    }
}

impl<'a> From<&'a Expr> for Input<'a> {
    fn from(e: &'a Expr) -> Self {
        Input::Expr(e)
    }
}

impl From<Value> for Input<'_> {
    fn from(v: Value) -> Self {
        Input::Value(v)
    }
}

/// Evaluate source text (parsed once per root and parser namespace), an expression,
/// or a value.
pub fn eval_parse<'a>(ctx: &Context, input: impl Into<Input<'a>>) -> Result<Value> {
    match input.into() {
        Input::Text(text) => {
            let parser = ctx.parser();
            match ctx.parse_cached(parser.as_ref(), text) {
                Ok(expr) => eval_value(ctx, &expr),
                Err(e) => {
                    warn!("failed to parse {text:?}: {}", e.message);
                    Err(e.into())
                }
            }
        }
        Input::Expr(expr) => eval_value(ctx, expr),
        Input::Value(v) => Ok(v),
    }
}

pub fn eval_value(ctx: &Context, expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Reference(path) => Ok(safe_get(ctx, path)),
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Operation(op) => apply_operator(ctx, op),
        Expr::Application(app) => Ok(Value::Application(app.clone())),
    }
}

/// Call `app` with positional `args`. The call frame sits beside `ctx` rather than
/// inside it; `special` is merged over the `@args` special.
pub fn eval_apply(
    ctx: &Context,
    app: &Application,
    args: Vec<Value>,
    special: Option<Map>,
) -> Result<Value> {
    let mut specials = Map::new();
    specials.insert("args".into(), Value::from(args.clone()));
    if let Some(special) = &special {
        for (k, v) in special.iter() {
            specials.insert(k.clone(), v.clone());
        }
    }
    let locals = app.names.as_ref().map(|names| {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), args.get(i).cloned().unwrap_or(Value::Undefined)))
            .collect::<Map>()
    });
    let frame = ctx.extend(Extend {
        value: Some(args.first().cloned().unwrap_or(Value::Undefined)),
        special: Some(specials),
        locals,
        mode: Extension::Sibling,
        ..Default::default()
    });

    match &app.body {
        Expr::Application(inner) => eval_apply(&frame, inner, args, special),
        body => eval_value(&frame, body),
    }
}

fn eval_args(ctx: &Context, args: &[Expr]) -> Result<Vec<Value>> {
    args.iter().map(|a| eval_value(ctx, a)).collect()
}

fn eval_opts(ctx: &Context, op: &Operation) -> Result<Value> {
    match &op.opts {
        Some(opts) => eval_value(ctx, opts),
        None => Ok(Value::Undefined),
    }
}

/// Rows of the nearest `@source`.
fn current_source(ctx: &Context) -> Rc<Vec<Value>> {
    ctx.special("source")
        .and_then(|s| data::rows(&s))
        .unwrap_or_default()
}

/// Dispatch an operation to its registered operator, or to the fallbacks for
/// unregistered names.
pub fn apply_operator(ctx: &Context, op: &Operation) -> Result<Value> {
    let _guard = ctx.enter()?;
    let name = op.op.as_ref();
    match ctx.operators().get(name) {
        Some(Operator::Value(o)) => {
            let args = eval_args(ctx, &op.args)?;
            let opts = eval_opts(ctx, op)?;
            o.apply(name, args, &opts, ctx)
        }
        Some(Operator::Checked(o)) => {
            let opts = eval_opts(ctx, op)?;
            let last = op.args.len().saturating_sub(1);
            let mut values = Vec::with_capacity(op.args.len());
            let mut i = 0;
            while i < op.args.len() {
                let value = eval_value(ctx, &op.args[i])?;
                let check = ArgCheck {
                    name,
                    index: i,
                    last,
                    value: &value,
                    values: &values,
                    opts: &opts,
                    ctx,
                    call: op,
                };
                match o.check_arg(&check)? {
                    CheckResult::Continue => {
                        values.push(value);
                        i += 1;
                    }
                    CheckResult::Result(v) => return Ok(v),
                    CheckResult::Skip { skip, splice } => {
                        values.extend(splice);
                        i += 1 + skip;
                    }
                }
            }
            o.apply(name, values, &opts, ctx)
        }
        Some(Operator::Aggregate(o)) => {
            let opts = eval_opts(ctx, op)?;
            let Some((first, rest)) = op.args.split_first() else {
                return o.apply(name, &current_source(ctx), &[], &opts, ctx);
            };
            let first = eval_value(ctx, first)?;
            if let Some(rows) = data::rows(&first) {
                return o.apply(name, &rows, rest, &opts, ctx);
            }
            // Not a collection: the value already computed becomes the first parameter.
            let mut args = Vec::with_capacity(op.args.len());
            args.push(Expr::Literal(first));
            args.extend_from_slice(rest);
            o.apply(name, &current_source(ctx), &args, &opts, ctx)
        }
        None => fallback(ctx, op),
    }
}

fn fallback(ctx: &Context, op: &Operation) -> Result<Value> {
    let name = op.op.as_ref();
    if let Value::Application(app) = safe_get(ctx, &Keypath::new(vec![Key::Name(op.op.clone())]))
    {
        let args = eval_args(ctx, &op.args)?;
        return eval_apply(ctx, &app, args, None);
    }
    if name == "pipe" {
        return pipe(ctx, op);
    }
    // Unknown operators evaluate to true so that partially written expressions
    // still render.
    debug!("unknown operator `{name}` evaluated to true");
    Ok(Value::Bool(true))
}

fn pipe_ref() -> Expr {
    Expr::reference(Keypath::new(vec![Key::Name("_".into())]))
}

/// Thread a value through each step. Calls that do not mention `_` or `@pipe`
/// receive the running value as their first argument.
fn pipe(ctx: &Context, op: &Operation) -> Result<Value> {
    let Some((first, steps)) = op.args.split_first() else {
        return Ok(Value::Undefined);
    };
    let mut acc = eval_value(ctx, first)?;
    for step in steps {
        let mut special = Map::new();
        special.insert("pipe".into(), acc.clone());
        let frame = ctx.extend(Extend {
            special: Some(special),
            ..Default::default()
        });
        acc = pipe_step(&frame, step, acc)?;
    }
    Ok(acc)
}

fn pipe_step(frame: &Context, step: &Expr, acc: Value) -> Result<Value> {
    match step {
        Expr::Operation(call) if !step.references_pipe() => {
            let mut args = Vec::with_capacity(call.args.len() + 1);
            args.push(pipe_ref());
            args.extend(call.args.iter().cloned());
            let injected = Operation {
                op: call.op.clone(),
                args,
                opts: call.opts.clone(),
            };
            apply_operator(frame, &injected)
        }
        Expr::Reference(path) if path.is_simple_name() => {
            let name = path.head_name().unwrap_or_default();
            if frame.operators().contains(name) {
                let call = Operation {
                    op: name.into(),
                    args: vec![pipe_ref()],
                    opts: None,
                };
                return apply_operator(frame, &call);
            }
            match safe_get(frame, path) {
                Value::Application(app) => eval_apply(frame, &app, vec![acc], None),
                v => Ok(v),
            }
        }
        Expr::Application(app) => eval_apply(frame, app, vec![acc], None),
        step => match eval_value(frame, step)? {
            Value::Application(app) => eval_apply(frame, &app, vec![acc], None),
            v => Ok(v),
        },
    }
}
