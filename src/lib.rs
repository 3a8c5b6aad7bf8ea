// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod ast;
mod context;
mod data;
mod dates;
mod formats;
mod interpreter;
mod lexer;
mod parser;
mod printer;
mod reference;
mod registry;
mod template;
mod value;

pub mod operators;

pub use ast::{Application, Expr, Key, Keypath, Operation, Prefix};
pub use context::{
    Context, DefaultLogSink, Extend, Extension, Limits, LogSink, RootContext, RootOptions,
};
pub use data::{
    filter, group, sort, DataSet, Extractor, FilterOptions, Group, SortBy,
};
pub use dates::Timespan;
pub use formats::{
    builtin_formats, get_format, register_format, unregister_format, FormatRegistry, Formatter,
};
pub use interpreter::{apply_operator, eval_apply, eval_parse, eval_value, Input};
pub use operators::{
    builtin_operators, get_operator, get_operator_map, register_operator, unregister_operator,
    AggregateOperator, ArgCheck, CheckResult, CheckedOperator, Operator, OperatorRegistry,
    ValueOperator,
};
pub use parser::{
    parse, parse_path, parse_with, ExpressionParser, ParseError, ParseOptions, SourceParser,
};
pub use printer::stringify;
pub use reference::{safe_get, safe_set, Assignment};
pub use registry::{Registry, RegistryError};
pub use template::{parse_template, TemplateParser};
pub use value::{Map, Value};

use std::rc::Rc;

use anyhow::Result;

/// Where `evaluate` runs: an existing frame, or plain data that becomes the value of
/// a fresh root.
pub enum Target<'a> {
    Context(&'a Context),
    Data(Value),
}

impl<'a> From<&'a Context> for Target<'a> {
    fn from(ctx: &'a Context) -> Self {
        Target::Context(ctx)
    }
}

impl<'a> From<&'a RootContext> for Target<'a> {
    fn from(root: &'a RootContext) -> Self {
        Target::Context(root.context())
    }
}

impl From<Value> for Target<'_> {
    fn from(data: Value) -> Self {
        Target::Data(data)
    }
}

/// Evaluate an expression against a context, or against data in a new root.
///
/// ```ignore
/// let data = Value::from_json_str(r#"{"foo": [1, 2, 3]}"#)?;
/// assert_eq!(relish::evaluate(data, "(+ foo.1 (- 69 29))")?, Value::from(42));
/// ```
pub fn evaluate<'a, 'e>(
    target: impl Into<Target<'a>>,
    expr: impl Into<Input<'e>>,
) -> Result<Value> {
    match target.into() {
        Target::Context(ctx) => eval_parse(ctx, expr),
        Target::Data(data) => eval_parse(&RootContext::from_value(data), expr),
    }
}

/// Render a template against `ctx`. Parsed templates are cached on the root under
/// their own namespace.
pub fn template(ctx: &Context, text: &str) -> Result<Value> {
    let frame = ctx.extend(Extend {
        parser: Some(Rc::new(TemplateParser)),
        ..Default::default()
    });
    eval_parse(&frame, text)
}
