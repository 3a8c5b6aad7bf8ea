// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resolution of reference paths against a context chain. Lookups never fail:
//! anything that cannot be resolved is `Value::Undefined`.

use crate::ast::{Key, Keypath, Prefix};
use crate::context::Context;
use crate::dates;
use crate::interpreter;
use crate::value::{resolve_index, Map, Value};

use std::rc::Rc;

fn key_value(ctx: &Context, key: &Key) -> Value {
    match key {
        Key::Name(n) => Value::String(n.clone()),
        Key::Index(i) => Value::from(*i),
        Key::Expr(e) => interpreter::eval_value(ctx, e).unwrap_or(Value::Undefined),
    }
}

fn hop<'a>(ctx: &'a Context, up: usize) -> &'a Context {
    let mut target = ctx;
    for _ in 0..up {
        match target.parent() {
            Some(p) => target = p,
            // Hops past the root stay at the root.
            None => break,
        }
    }
    target
}

/// The value `_` stands for: the nearest pipe accumulator, or the argument of the
/// nearest application call.
fn underscore(ctx: &Context) -> Value {
    let mut frame = Some(ctx);
    while let Some(c) = frame {
        if let Some(v) = c.own_special("pipe") {
            return v;
        }
        if c.own_special("args").is_some() {
            return c.value();
        }
        frame = c.parent();
    }
    ctx.value()
}

fn special(ctx: &Context, name: &str) -> Value {
    match name {
        "locals" => Value::from(ctx.locals()),
        "local" => Value::from(ctx.locals_holder().own_locals()),
        "specials" => Value::from(ctx.specials()),
        "special" => Value::from(ctx.own_specials()),
        "parameters" => ctx.parameters().clone(),
        "sources" => {
            let mut sources = Map::new();
            for name in ctx.source_names() {
                if let Some(s) = ctx.source(&name) {
                    sources.insert(name, s.value);
                }
            }
            Value::from(sources)
        }
        "date" => match ctx.special("date") {
            Some(d) => d,
            None => {
                let now = Value::from(dates::now());
                ctx.root().set_special("date", now.clone());
                now
            }
        },
        _ => ctx.special(name).unwrap_or(Value::Undefined),
    }
}

/// Resolve `path` from `ctx`.
pub fn safe_get(ctx: &Context, path: &Keypath) -> Value {
    let target = hop(ctx, path.up);
    let mut keys = path.keys.iter();
    let base = match path.prefix {
        Some(Prefix::Parameters) => target.parameters().clone(),
        Some(Prefix::Root) => target.root_value(),
        Some(Prefix::Source) => match keys.next() {
            Some(k) => match target.source(&key_value(ctx, k).to_text()) {
                Some(source) => source.value,
                None => Value::Undefined,
            },
            None => special(target, "sources"),
        },
        Some(Prefix::Special) => match keys.next() {
            Some(k) => special(target, &key_value(ctx, k).to_text()),
            None => Value::from(target.specials()),
        },
        None => match keys.next() {
            None => target.value(),
            Some(Key::Name(n)) if n.as_ref() == "_" => underscore(target),
            Some(Key::Name(n)) => match target.local(n) {
                Some(v) => v,
                None => target.value().index(&Value::String(n.clone())),
            },
            Some(k) => target.value().index(&key_value(ctx, k)),
        },
    };

    index_path(ctx, base, keys.as_slice())
}

/// Index `value` by `keys`. Key expressions are evaluated in `ctx`.
pub fn index_path(ctx: &Context, value: Value, keys: &[Key]) -> Value {
    let mut value = value;
    for k in keys {
        if value.is_nullish() {
            return Value::Undefined;
        }
        value = value.index(&key_value(ctx, k));
    }
    value
}

fn container_for(key: &Value) -> Value {
    match key {
        Value::Number(_) => Value::new_array(),
        _ => Value::new_object(),
    }
}

/// Writes `value` at `keys` inside `target`. Arrays grow by at most `growth` slots
/// past their end; farther positions are ignored.
fn assign(target: &mut Value, keys: &[Value], value: Value, growth: usize) {
    let Some((key, rest)) = keys.split_first() else {
        *target = value;
        return;
    };
    if !matches!(target, Value::Object(_) | Value::Array(_)) {
        *target = container_for(key);
    }
    match target {
        Value::Object(fields) => {
            let slot = Rc::make_mut(fields)
                .entry(key.to_text().into())
                .or_insert(Value::Undefined);
            assign(slot, rest, value, growth);
        }
        Value::Array(items) => {
            let Some(n) = key.to_number() else {
                return;
            };
            let items = Rc::make_mut(items);
            let idx = match resolve_index(n, items.len()) {
                Some(i) => i,
                None if n >= 0.0
                    && n.fract() == 0.0
                    && n < items.len().saturating_add(growth) as f64 =>
                {
                    items.resize(n as usize + 1, Value::Null);
                    n as usize
                }
                None => return,
            };
            assign(&mut items[idx], rest, value, growth);
        }
        _ => (),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Bind in the nearest locals holder.
    Let,
    /// Write the frame's own value, or the root value under `~`.
    Set,
}

/// Assign `value` at `path`. Unsupported targets are ignored.
pub fn safe_set(ctx: &Context, path: &Keypath, value: Value, mode: Assignment) {
    let keys: Vec<Value> = path.keys.iter().map(|k| key_value(ctx, k)).collect();
    let growth = ctx.limits().max_iterations;
    match mode {
        Assignment::Let => {
            let Some((first, rest)) = keys.split_first() else {
                return;
            };
            ctx.locals_holder().update_locals(|locals| {
                let slot = locals
                    .entry(first.to_text().into())
                    .or_insert(Value::Undefined);
                assign(slot, rest, value, growth);
            });
        }
        Assignment::Set if path.up > 0 => (),
        Assignment::Set => match path.prefix {
            None => {
                let mut current = ctx.value();
                assign(&mut current, &keys, value, growth);
                ctx.set_value(current);
            }
            Some(Prefix::Root) => {
                let mut current = ctx.root_value();
                assign(&mut current, &keys, value, growth);
                ctx.set_root_value(current);
            }
            _ => (),
        },
    }
}
