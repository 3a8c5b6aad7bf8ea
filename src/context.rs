// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::Expr;
use crate::data::DataSet;
use crate::formats::{FormatRegistry, FORMATS};
use crate::operators::{OperatorRegistry, OPERATORS};
use crate::parser::{ExpressionParser, ParseError, SourceParser};
use crate::reference;
use crate::value::{Map, Value};

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{bail, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Destination for messages produced by the `log` operator.
pub trait LogSink {
    fn log(&self, level: log::Level, message: &str);
}

/// Forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLogSink;

impl LogSink for DefaultLogSink {
    fn log(&self, level: log::Level, message: &str) {
        log::log!(target: "relish", level, "{message}");
    }
}

/// Evaluation bounds for a root context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Nested operator dispatch depth after which evaluation fails.
    pub max_depth: usize,
    /// Default cap for open-ended generators, and for how far an assignment may
    /// grow an array past its end.
    pub max_iterations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 256,
            max_iterations: 10_000,
        }
    }
}

#[derive(Default)]
pub struct RootOptions {
    pub parameters: Option<Value>,
    pub special: Option<Map>,
    pub parser: Option<Rc<dyn SourceParser>>,
    pub log: Option<Rc<dyn LogSink>>,
    pub operators: Option<Arc<OperatorRegistry>>,
    pub formats: Option<Arc<FormatRegistry>>,
    pub limits: Limits,
}

type ParseCache = HashMap<String, HashMap<String, Result<Expr, ParseError>>>;

pub(crate) struct RootState {
    value: Rc<RefCell<Value>>,
    parameters: Value,
    sources: RefCell<IndexMap<Rc<str>, DataSet>>,
    cache: RefCell<ParseCache>,
    log: Rc<dyn LogSink>,
    operators: Arc<OperatorRegistry>,
    formats: Arc<FormatRegistry>,
    limits: Limits,
    depth: Cell<usize>,
}

struct Frame {
    value: Rc<RefCell<Value>>,
    parent: Option<Context>,
    root: Rc<RootState>,
    special: RefCell<Option<Map>>,
    locals: Option<RefCell<Map>>,
    parser: Option<Rc<dyn SourceParser>>,
    path: Rc<str>,
}

/// One evaluation frame. Cloning is cheap and shares the frame.
#[derive(Clone)]
pub struct Context {
    frame: Rc<Frame>,
}

/// How a derived frame attaches to the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Extension {
    /// Child of the current frame.
    #[default]
    Nested,
    /// Sibling of the current frame, sharing its parent. Used for application
    /// calls so the call frame is not a lexical child of its caller.
    Sibling,
}

#[derive(Default)]
pub struct Extend {
    /// Inherits the current value when unset.
    pub value: Option<Value>,
    pub special: Option<Map>,
    /// Makes the new frame a holder for `let` bindings.
    pub locals: Option<Map>,
    pub parser: Option<Rc<dyn SourceParser>>,
    pub path: Option<String>,
    pub mode: Extension,
}

impl Extend {
    pub fn value(value: Value) -> Extend {
        Extend {
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn special(mut self, special: Map) -> Extend {
        self.special = Some(special);
        self
    }

    pub fn locals(mut self, locals: Map) -> Extend {
        self.locals = Some(locals);
        self
    }

    pub fn mode(mut self, mode: Extension) -> Extend {
        self.mode = mode;
        self
    }
}

pub(crate) struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl Context {
    pub fn value(&self) -> Value {
        self.frame.value.borrow().clone()
    }

    pub fn set_value(&self, value: Value) {
        *self.frame.value.borrow_mut() = value;
    }

    pub fn parent(&self) -> Option<&Context> {
        self.frame.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.frame.parent.is_none()
    }

    pub fn path(&self) -> &str {
        &self.frame.path
    }

    /// The root frame of this chain.
    pub fn root(&self) -> Context {
        let mut ctx = self;
        while let Some(parent) = ctx.parent() {
            ctx = parent;
        }
        ctx.clone()
    }

    pub fn root_value(&self) -> Value {
        self.frame.root.value.borrow().clone()
    }

    pub fn set_root_value(&self, value: Value) {
        *self.frame.root.value.borrow_mut() = value;
    }

    pub fn parameters(&self) -> &Value {
        &self.frame.root.parameters
    }

    pub fn limits(&self) -> &Limits {
        &self.frame.root.limits
    }

    pub fn operators(&self) -> &Arc<OperatorRegistry> {
        &self.frame.root.operators
    }

    pub fn formats(&self) -> &Arc<FormatRegistry> {
        &self.frame.root.formats
    }

    pub fn log(&self, level: log::Level, message: &str) {
        self.frame.root.log.log(level, message);
    }

    /// Nearest parser override, or the expression parser.
    pub fn parser(&self) -> Rc<dyn SourceParser> {
        let mut ctx = Some(self);
        while let Some(c) = ctx {
            if let Some(p) = &c.frame.parser {
                return p.clone();
            }
            ctx = c.parent();
        }
        Rc::new(ExpressionParser)
    }

    pub fn extend(&self, opts: Extend) -> Context {
        let parent = match (opts.mode, self.parent()) {
            (Extension::Sibling, Some(parent)) => parent.clone(),
            _ => self.clone(),
        };
        let value = opts.value.unwrap_or_else(|| self.value());
        let path = match opts.path {
            Some(p) => p.into(),
            None => self.frame.path.clone(),
        };
        Context {
            frame: Rc::new(Frame {
                value: Rc::new(RefCell::new(value)),
                parent: Some(parent),
                root: self.frame.root.clone(),
                special: RefCell::new(opts.special),
                locals: opts.locals.map(RefCell::new),
                parser: opts.parser,
                path,
            }),
        }
    }

    /// Child frame focused on the value at `path`.
    pub fn join(&self, path: &str) -> Result<Context> {
        let keypath = crate::parser::parse_path(path)?;
        let value = reference::safe_get(self, &keypath);
        let joined = if self.frame.path.is_empty() {
            path.to_string()
        } else {
            format!("{}.{path}", self.frame.path)
        };
        Ok(self.extend(Extend {
            value: Some(value),
            path: Some(joined),
            ..Default::default()
        }))
    }

    /// Special value defined on this frame.
    pub fn own_special(&self, name: &str) -> Option<Value> {
        self.frame
            .special
            .borrow()
            .as_ref()
            .and_then(|m| m.get(name).cloned())
    }

    /// Nearest special of the given name up the chain.
    pub fn special(&self, name: &str) -> Option<Value> {
        let mut ctx = Some(self);
        while let Some(c) = ctx {
            if let Some(v) = c.own_special(name) {
                return Some(v);
            }
            ctx = c.parent();
        }
        None
    }

    pub fn set_special(&self, name: &str, value: Value) {
        self.frame
            .special
            .borrow_mut()
            .get_or_insert_with(Map::new)
            .insert(name.into(), value);
    }

    /// All specials visible from this frame, nearest first wins.
    pub fn specials(&self) -> Map {
        let mut all = Map::new();
        let mut ctx = Some(self);
        while let Some(c) = ctx {
            if let Some(m) = c.frame.special.borrow().as_ref() {
                for (k, v) in m.iter() {
                    if !all.contains_key(k) {
                        all.insert(k.clone(), v.clone());
                    }
                }
            }
            ctx = c.parent();
        }
        all
    }

    pub fn own_specials(&self) -> Map {
        self.frame.special.borrow().clone().unwrap_or_default()
    }

    pub(crate) fn has_locals(&self) -> bool {
        self.frame.locals.is_some()
    }

    pub(crate) fn own_local(&self, name: &str) -> Option<Value> {
        self.frame
            .locals
            .as_ref()
            .and_then(|l| l.borrow().get(name).cloned())
    }

    /// Nearest binding of `name` in any enclosing locals.
    pub fn local(&self, name: &str) -> Option<Value> {
        let mut ctx = Some(self);
        while let Some(c) = ctx {
            if let Some(v) = c.own_local(name) {
                return Some(v);
            }
            ctx = c.parent();
        }
        None
    }

    /// All bindings visible from this frame, nearest first wins.
    pub fn locals(&self) -> Map {
        let mut all = Map::new();
        let mut ctx = Some(self);
        while let Some(c) = ctx {
            if let Some(l) = &c.frame.locals {
                for (k, v) in l.borrow().iter() {
                    if !all.contains_key(k) {
                        all.insert(k.clone(), v.clone());
                    }
                }
            }
            ctx = c.parent();
        }
        all
    }

    pub fn own_locals(&self) -> Map {
        match &self.frame.locals {
            Some(l) => l.borrow().clone(),
            None => Map::new(),
        }
    }

    /// Nearest frame that holds `let` bindings. The root always does.
    pub(crate) fn locals_holder(&self) -> Context {
        let mut ctx = self;
        loop {
            if ctx.has_locals() {
                return ctx.clone();
            }
            match ctx.parent() {
                Some(p) => ctx = p,
                None => return ctx.clone(),
            }
        }
    }

    pub(crate) fn update_locals<F: FnOnce(&mut Map)>(&self, f: F) {
        if let Some(l) = &self.frame.locals {
            f(&mut l.borrow_mut());
        }
    }

    pub fn source(&self, name: &str) -> Option<DataSet> {
        self.frame.root.sources.borrow().get(name).cloned()
    }

    pub fn source_names(&self) -> Vec<Rc<str>> {
        self.frame.root.sources.borrow().keys().cloned().collect()
    }

    pub fn add_source(&self, name: &str, source: DataSet) {
        self.frame
            .root
            .sources
            .borrow_mut()
            .insert(name.into(), source);
    }

    /// Parse `text` at most once per root for the parser's namespace.
    pub(crate) fn parse_cached(
        &self,
        parser: &dyn SourceParser,
        text: &str,
    ) -> Result<Expr, ParseError> {
        let namespace = parser.namespace();
        if let Some(hit) = self
            .frame
            .root
            .cache
            .borrow()
            .get(namespace)
            .and_then(|entries| entries.get(text))
        {
            return hit.clone();
        }
        let parsed = parser.parse(text);
        log::trace!("cached `{namespace}` parse of {text:?}");
        self.frame
            .root
            .cache
            .borrow_mut()
            .entry(namespace.to_string())
            .or_default()
            .insert(text.to_string(), parsed.clone());
        parsed
    }

    /// Number of sources cached for a namespace.
    pub fn cached_count(&self, namespace: &str) -> usize {
        self.frame
            .root
            .cache
            .borrow()
            .get(namespace)
            .map_or(0, HashMap::len)
    }

    pub(crate) fn enter(&self) -> Result<DepthGuard<'_>> {
        let depth = &self.frame.root.depth;
        if depth.get() >= self.frame.root.limits.max_depth {
            bail!(
                "evaluation exceeded the maximum depth of {}",
                self.frame.root.limits.max_depth
            );
        }
        depth.set(depth.get() + 1);
        Ok(DepthGuard { depth })
    }
}

/// The root of a context chain. Owns parameters, sources and the parse cache.
#[derive(Clone)]
pub struct RootContext(Context);

impl RootContext {
    pub fn new(value: Value, options: RootOptions) -> RootContext {
        let value = Rc::new(RefCell::new(value));
        let root = Rc::new(RootState {
            value: value.clone(),
            parameters: options.parameters.unwrap_or_else(Value::new_object),
            sources: RefCell::new(IndexMap::new()),
            cache: RefCell::new(HashMap::new()),
            log: options.log.unwrap_or_else(|| Rc::new(DefaultLogSink)),
            operators: options.operators.unwrap_or_else(|| OPERATORS.clone()),
            formats: options.formats.unwrap_or_else(|| FORMATS.clone()),
            limits: options.limits,
            depth: Cell::new(0),
        });
        RootContext(Context {
            frame: Rc::new(Frame {
                value,
                parent: None,
                root,
                special: RefCell::new(options.special),
                locals: Some(RefCell::new(Map::new())),
                parser: options.parser,
                path: "".into(),
            }),
        })
    }

    pub fn from_value(value: Value) -> RootContext {
        RootContext::new(value, RootOptions::default())
    }

    pub fn context(&self) -> &Context {
        &self.0
    }
}

impl Deref for RootContext {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Context> for RootContext {
    fn as_ref(&self) -> &Context {
        &self.0
    }
}
