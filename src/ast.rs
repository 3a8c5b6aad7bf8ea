// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::value::Value;

use std::rc::Rc;

/// A parsed REL expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ast", derive(serde::Serialize))]
pub enum Expr {
    Reference(Rc<Keypath>),
    Literal(Value),
    Operation(Rc<Operation>),
    Application(Rc<Application>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ast", derive(serde::Serialize))]
pub struct Operation {
    pub op: Rc<str>,
    pub args: Vec<Expr>,
    #[cfg_attr(feature = "ast", serde(skip_serializing_if = "Option::is_none"))]
    pub opts: Option<Expr>,
}

/// An unevaluated body with optional named parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ast", derive(serde::Serialize))]
pub struct Application {
    pub body: Expr,
    #[cfg_attr(feature = "ast", serde(skip_serializing_if = "Option::is_none"))]
    pub names: Option<Vec<Rc<str>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ast", derive(serde::Serialize))]
pub enum Prefix {
    /// `!` root parameters
    Parameters,
    /// `~` root value
    Root,
    /// `*` named data source
    Source,
    /// `@` special reference
    Special,
}

impl Prefix {
    pub fn from_char(ch: char) -> Option<Prefix> {
        match ch {
            '!' => Some(Prefix::Parameters),
            '~' => Some(Prefix::Root),
            '*' => Some(Prefix::Source),
            '@' => Some(Prefix::Special),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Prefix::Parameters => '!',
            Prefix::Root => '~',
            Prefix::Source => '*',
            Prefix::Special => '@',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ast", derive(serde::Serialize))]
pub enum Key {
    Name(Rc<str>),
    Index(i64),
    /// Evaluated when the reference is resolved.
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "ast", derive(serde::Serialize))]
pub struct Keypath {
    pub up: usize,
    #[cfg_attr(feature = "ast", serde(skip_serializing_if = "Option::is_none"))]
    pub prefix: Option<Prefix>,
    pub keys: Vec<Key>,
}

impl Keypath {
    pub fn new(keys: Vec<Key>) -> Keypath {
        Keypath {
            up: 0,
            prefix: None,
            keys,
        }
    }

    /// First key when it is a plain name.
    pub fn head_name(&self) -> Option<&str> {
        match self.keys.first() {
            Some(Key::Name(n)) => Some(n.as_ref()),
            _ => None,
        }
    }

    /// True for a bare, unprefixed, single-name reference such as `foo`.
    pub fn is_simple_name(&self) -> bool {
        self.up == 0 && self.prefix.is_none() && self.keys.len() == 1 && self.head_name().is_some()
    }

    /// Whether the path reads the pipe accumulator (`_` or `@pipe`).
    pub fn is_pipe_ref(&self) -> bool {
        match (self.prefix, self.head_name()) {
            (None, Some("_")) => self.up == 0,
            (Some(Prefix::Special), Some("pipe")) => true,
            _ => false,
        }
    }
}

impl Expr {
    pub fn literal(v: impl Into<Value>) -> Expr {
        Expr::Literal(v.into())
    }

    pub fn reference(path: Keypath) -> Expr {
        Expr::Reference(Rc::new(path))
    }

    pub fn operation(op: &str, args: Vec<Expr>) -> Expr {
        Expr::Operation(Rc::new(Operation {
            op: op.into(),
            args,
            opts: None,
        }))
    }

    pub fn operation_with(op: &str, args: Vec<Expr>, opts: Option<Expr>) -> Expr {
        Expr::Operation(Rc::new(Operation {
            op: op.into(),
            args,
            opts,
        }))
    }

    pub fn application(body: Expr, names: Option<Vec<Rc<str>>>) -> Expr {
        Expr::Application(Rc::new(Application { body, names }))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this expression reads the pipe accumulator anywhere outside a
    /// nested application body.
    pub fn references_pipe(&self) -> bool {
        match self {
            Expr::Reference(k) => {
                k.is_pipe_ref()
                    || k.keys.iter().any(|key| match key {
                        Key::Expr(e) => e.references_pipe(),
                        _ => false,
                    })
            }
            Expr::Literal(_) | Expr::Application(_) => false,
            Expr::Operation(op) => {
                op.args.iter().any(Expr::references_pipe)
                    || op.opts.as_ref().is_some_and(Expr::references_pipe)
            }
        }
    }
}
