// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Expr, Operation};
use crate::context::Context;
use crate::interpreter::apply_operator;
use crate::operators::utils::arg;
use crate::operators::{add, Operator, OperatorRegistry};
use crate::value::Value;

use anyhow::Result;

pub fn register(m: &OperatorRegistry) {
    add(m, &["cat"], Operator::value(cat));
    add(m, &["format", "fmt"], Operator::value(format));
}

fn cat(_: &str, args: Vec<Value>, _: &Value, _: &Context) -> Result<Value> {
    Ok(Value::from(args.iter().map(Value::to_text).collect::<String>()))
}

/// `format(value, name, args…)`: a registered formatter, else an operator of that
/// name called with the value first, else the value as text.
fn format(_: &str, args: Vec<Value>, opts: &Value, ctx: &Context) -> Result<Value> {
    let value = arg(&args, 0);
    let name = arg(&args, 1).to_text();
    let extra = args.get(2..).unwrap_or_default();

    if let Some(formatter) = ctx.formats().get(&name) {
        return Ok(Value::from(formatter.format(&value, extra, opts, ctx)?));
    }
    if ctx.operators().contains(&name) {
        let mut call_args = vec![Expr::Literal(value)];
        call_args.extend(extra.iter().cloned().map(Expr::Literal));
        let call = Operation {
            op: name.into(),
            args: call_args,
            opts: match opts {
                Value::Undefined => None,
                opts => Some(Expr::Literal(opts.clone())),
            },
        };
        return apply_operator(ctx, &call);
    }
    Ok(Value::from(value.to_text()))
}
