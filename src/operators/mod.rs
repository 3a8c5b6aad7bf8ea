// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub mod aggregates;
pub mod flow;
pub mod logic;
pub mod numbers;
pub mod strings;
pub mod utils;

use crate::ast::{Expr, Operation};
use crate::context::Context;
use crate::registry::{Registry, RegistryError};
use crate::value::Value;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use lazy_static::lazy_static;

/// Receives every argument evaluated, left to right.
pub trait ValueOperator: Send + Sync {
    fn apply(&self, name: &str, args: Vec<Value>, opts: &Value, ctx: &Context) -> Result<Value>;
}

impl<F> ValueOperator for F
where
    F: Fn(&str, Vec<Value>, &Value, &Context) -> Result<Value> + Send + Sync,
{
    fn apply(&self, name: &str, args: Vec<Value>, opts: &Value, ctx: &Context) -> Result<Value> {
        self(name, args, opts, ctx)
    }
}

/// State visible to a checked operator after each argument is evaluated.
pub struct ArgCheck<'a> {
    pub name: &'a str,
    pub index: usize,
    /// Index of the last argument.
    pub last: usize,
    pub value: &'a Value,
    /// Values accumulated so far.
    pub values: &'a [Value],
    pub opts: &'a Value,
    pub ctx: &'a Context,
    /// The call being evaluated, for operators that need unevaluated arguments.
    pub call: &'a Operation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    /// Keep the value and evaluate the next argument.
    Continue,
    /// Stop and return this value.
    Result(Value),
    /// Replace the current value with `splice` and pass over the next `skip` arguments
    /// without evaluating them.
    Skip { skip: usize, splice: Vec<Value> },
}

/// Evaluates its arguments one at a time, deciding after each how to proceed.
/// Every lazy or short-circuiting construct is one of these.
pub trait CheckedOperator: Send + Sync {
    fn check_arg(&self, check: &ArgCheck) -> Result<CheckResult>;
    fn apply(&self, name: &str, args: Vec<Value>, opts: &Value, ctx: &Context) -> Result<Value>;
}

/// Runs once over a whole collection: an explicit array or DataSet first argument,
/// or else the nearest `@source`.
pub trait AggregateOperator: Send + Sync {
    fn apply(
        &self,
        name: &str,
        source: &[Value],
        args: &[Expr],
        opts: &Value,
        ctx: &Context,
    ) -> Result<Value>;
}

impl<F> AggregateOperator for F
where
    F: Fn(&str, &[Value], &[Expr], &Value, &Context) -> Result<Value> + Send + Sync,
{
    fn apply(
        &self,
        name: &str,
        source: &[Value],
        args: &[Expr],
        opts: &Value,
        ctx: &Context,
    ) -> Result<Value> {
        self(name, source, args, opts, ctx)
    }
}

#[derive(Clone)]
pub enum Operator {
    Value(Arc<dyn ValueOperator>),
    Checked(Arc<dyn CheckedOperator>),
    Aggregate(Arc<dyn AggregateOperator>),
}

impl Operator {
    pub fn value<F>(f: F) -> Operator
    where
        F: Fn(&str, Vec<Value>, &Value, &Context) -> Result<Value> + Send + Sync + 'static,
    {
        Operator::Value(Arc::new(f))
    }

    pub fn checked<C: CheckedOperator + 'static>(c: C) -> Operator {
        Operator::Checked(Arc::new(c))
    }

    pub fn aggregate<F>(f: F) -> Operator
    where
        F: Fn(&str, &[Value], &[Expr], &Value, &Context) -> Result<Value> + Send + Sync + 'static,
    {
        Operator::Aggregate(Arc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operator::Value(_) => "value",
            Operator::Checked(_) => "checked",
            Operator::Aggregate(_) => "aggregate",
        }
    }
}

pub type OperatorRegistry = Registry<Operator>;

pub(crate) fn add(m: &OperatorRegistry, names: &[&str], op: Operator) {
    for name in names {
        // Builtin names are never blank.
        let _ = m.register(name, op.clone());
    }
}

/// A registry holding only the builtin operators.
pub fn builtin_operators() -> OperatorRegistry {
    let m = Registry::new("OPERATORS");
    logic::register(&m);
    numbers::register(&m);
    strings::register(&m);
    flow::register(&m);
    aggregates::register(&m);
    utils::register(&m);
    m
}

lazy_static! {
    /// Process-wide operator table used by roots that are not given their own.
    pub static ref OPERATORS: Arc<OperatorRegistry> = Arc::new(builtin_operators());
}

pub fn register_operator(name: &str, op: Operator) -> Result<(), RegistryError> {
    OPERATORS.register(name, op).map(|_| ())
}

pub fn unregister_operator(name: &str) -> Option<Operator> {
    OPERATORS.remove(name)
}

pub fn get_operator(name: &str) -> Option<Operator> {
    OPERATORS.get(name)
}

pub fn get_operator_map() -> BTreeMap<String, Operator> {
    OPERATORS.entries().into_iter().collect()
}
