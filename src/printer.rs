// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::dates;
use crate::lexer::{is_ident_char, is_ident_start};
use crate::value::{format_number, Value};

use std::fmt::Write;

/// Render an expression back to source that parses to the same tree.
pub fn stringify(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

pub fn stringify_application(app: &Application) -> String {
    let mut out = String::new();
    write_application(&mut out, app);
    out
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => chars.all(is_ident_char),
        _ => false,
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('\'');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn write_key(out: &mut String, key: &str) {
    if is_ident(key) {
        out.push_str(key);
    } else {
        write_string(out, key);
    }
}

fn write_value(out: &mut String, v: &Value) {
    match v {
        Value::Null => out.push_str("null"),
        Value::Undefined => out.push_str("undefined"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            out.push('{');
            for (i, (k, v)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_key(out, k);
                out.push_str(": ");
                write_value(out, v);
            }
            out.push('}');
        }
        Value::Date(d) => {
            let _ = write!(out, "#{}#", dates::date_text(d));
        }
        Value::Timespan(t) => {
            let _ = write!(out, "#{}#", dates::timespan_text(t));
        }
        Value::Application(app) => write_application(out, app),
    }
}

fn write_application(out: &mut String, app: &Application) {
    if let Some(names) = &app.names {
        out.push('|');
        out.push_str(&names.iter().map(|n| n.as_ref()).collect::<Vec<_>>().join(" "));
        out.push_str("| ");
    }
    out.push_str("=>");
    write_expr(out, &app.body);
}

fn write_keypath(out: &mut String, path: &Keypath) {
    for _ in 0..path.up {
        out.push('^');
    }
    if let Some(prefix) = path.prefix {
        out.push(prefix.as_char());
    }
    for (i, key) in path.keys.iter().enumerate() {
        match key {
            Key::Name(n) if is_ident(n) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(n);
            }
            Key::Name(n) => {
                out.push('[');
                write_string(out, n);
                out.push(']');
            }
            Key::Index(idx) if *idx >= 0 && i > 0 => {
                let _ = write!(out, ".{idx}");
            }
            Key::Index(idx) => {
                let _ = write!(out, "[{idx}]");
            }
            Key::Expr(e) => {
                out.push('[');
                write_expr(out, e);
                out.push(']');
            }
        }
    }
}

fn write_opts(out: &mut String, opts: &Expr) {
    match opts {
        Expr::Literal(Value::Object(fields)) => {
            for (k, v) in fields.iter() {
                let _ = write!(out, " {k}: ");
                write_value(out, v);
            }
        }
        Expr::Operation(op) if op.op.as_ref() == "object" => {
            for pair in op.args.chunks(2) {
                if let [Expr::Literal(k), v] = pair {
                    let _ = write!(out, " {}: ", k.to_text());
                    write_expr(out, v);
                }
            }
        }
        _ => (),
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Literal(v) => write_value(out, v),
        Expr::Reference(path) => write_keypath(out, path),
        Expr::Application(app) => write_application(out, app),
        Expr::Operation(op) => {
            out.push('(');
            out.push_str(&op.op);
            for arg in &op.args {
                out.push(' ');
                match arg {
                    // Would otherwise read as subtraction from the previous argument.
                    Expr::Literal(Value::Number(n)) if n.is_sign_negative() && *n != 0.0 => {
                        let _ = write!(out, "({})", format_number(*n));
                    }
                    arg => write_expr(out, arg),
                }
            }
            if let Some(opts) = &op.opts {
                write_opts(out, opts);
            }
            out.push(')');
        }
    }
}
