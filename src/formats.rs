// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Named formatters used by `format(value, :name)` and the `value#name` postfix.

use crate::context::Context;
use crate::dates;
use crate::registry::{Registry, RegistryError};
use crate::value::Value;

use std::sync::Arc;

use anyhow::Result;
use lazy_static::lazy_static;

pub trait Formatter: Send + Sync {
    fn format(&self, value: &Value, args: &[Value], opts: &Value, ctx: &Context) -> Result<String>;
}

impl<F> Formatter for F
where
    F: Fn(&Value, &[Value], &Value, &Context) -> Result<String> + Send + Sync,
{
    fn format(&self, value: &Value, args: &[Value], opts: &Value, ctx: &Context) -> Result<String> {
        self(value, args, opts, ctx)
    }
}

pub type FormatRegistry = Registry<Arc<dyn Formatter>>;

fn add<F>(m: &FormatRegistry, name: &str, f: F)
where
    F: Fn(&Value, &[Value], &Value, &Context) -> Result<String> + Send + Sync + 'static,
{
    let _ = m.register(name, Arc::new(f));
}

/// A registry holding only the builtin formats.
pub fn builtin_formats() -> FormatRegistry {
    let m = Registry::new("FORMATS");
    add(&m, "number", number);
    add(&m, "int", int);
    add(&m, "upper", |v, _, _, _| Ok(v.to_text().to_uppercase()));
    add(&m, "lower", |v, _, _, _| Ok(v.to_text().to_lowercase()));
    add(&m, "json", |v, _, _, _| Ok(v.to_string()));
    add(&m, "date", date);
    m
}

lazy_static! {
    /// Process-wide format table used by roots that are not given their own.
    pub static ref FORMATS: Arc<FormatRegistry> = Arc::new(builtin_formats());
}

pub fn register_format<F: Formatter + 'static>(name: &str, f: F) -> Result<(), RegistryError> {
    FORMATS.register(name, Arc::new(f)).map(|_| ())
}

pub fn unregister_format(name: &str) -> bool {
    FORMATS.remove(name).is_some()
}

pub fn get_format(name: &str) -> Option<Arc<dyn Formatter>> {
    FORMATS.get(name)
}

/// Fixed decimals with a thousands separator.
pub fn group_digits(n: f64, decimals: usize, separator: &str) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };
    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push_str(separator);
        }
        grouped.push(ch);
    }
    let negative = n < 0.0 && fixed.chars().any(|c| matches!(c, '1'..='9'));
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(f) = frac_part {
        out.push('.');
        out.push_str(f);
    }
    out
}

fn decimals(args: &[Value], opts: &Value, default: usize) -> usize {
    args.first()
        .or(Some(&opts["decimals"]))
        .and_then(Value::to_number)
        .filter(|n| *n >= 0.0)
        .map_or(default, |n| n.min(20.0) as usize)
}

fn separator(opts: &Value) -> String {
    match &opts["separator"] {
        Value::String(s) => s.to_string(),
        _ => ",".to_string(),
    }
}

fn number(v: &Value, args: &[Value], opts: &Value, _: &Context) -> Result<String> {
    Ok(match v.to_number() {
        Some(n) if n.is_finite() => group_digits(n, decimals(args, opts, 2), &separator(opts)),
        _ => v.to_text(),
    })
}

fn int(v: &Value, _: &[Value], opts: &Value, _: &Context) -> Result<String> {
    Ok(match v.to_number() {
        Some(n) if n.is_finite() => group_digits(n.round(), 0, &separator(opts)),
        _ => v.to_text(),
    })
}

fn date(v: &Value, args: &[Value], opts: &Value, _: &Context) -> Result<String> {
    let pattern = match (args.first(), &opts["format"]) {
        (Some(Value::String(p)), _) | (None, Value::String(p)) => p.to_string(),
        _ => "%Y-%m-%d".to_string(),
    };
    let d = match v {
        Value::Date(d) => Some(*d),
        Value::String(s) => dates::parse_date(s),
        _ => None,
    };
    Ok(match d {
        Some(d) => dates::format_date(&d, &pattern),
        None => v.to_text(),
    })
}
