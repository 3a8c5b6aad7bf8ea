// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Data sources and the sort, filter and group algorithms shared by aggregate
//! operators and report sources.

use crate::ast::{Application, Keypath};
use crate::context::{Context, Extend};
use crate::interpreter::eval_apply;
use crate::parser::parse_path;
use crate::reference;
use crate::value::{Map, Value};

use std::cmp::Ordering;
use std::rc::Rc;

use anyhow::Result;

/// Rows supplied by a data source, with an optional schema.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    pub schema: Option<Value>,
    pub value: Value,
}

impl DataSet {
    pub fn new(value: Value) -> DataSet {
        DataSet {
            schema: None,
            value,
        }
    }

    pub fn with_schema(value: Value, schema: Value) -> DataSet {
        DataSet {
            schema: Some(schema),
            value,
        }
    }

    /// Recognizes `{value}` and `{schema, value}` objects.
    pub fn from_value(v: &Value) -> Option<DataSet> {
        let fields = match v {
            Value::Object(fields) => fields,
            _ => return None,
        };
        let value = fields.get("value")?;
        if fields.keys().any(|k| !matches!(k.as_ref(), "value" | "schema")) {
            return None;
        }
        Some(DataSet {
            schema: fields.get("schema").cloned(),
            value: value.clone(),
        })
    }

    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();
        if let Some(schema) = &self.schema {
            fields.insert("schema".into(), schema.clone());
        }
        fields.insert("value".into(), self.value.clone());
        Value::from(fields)
    }
}

/// One partition produced by grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub grouped: bool,
    /// The key shared by every row of the group.
    pub group: Value,
    /// Sub-groups for multi-level grouping, otherwise the rows.
    pub value: Vec<Value>,
    /// Every row of the group.
    pub all: Vec<Value>,
    pub level: usize,
}

impl Group {
    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("grouped".into(), Value::Bool(self.grouped));
        fields.insert("group".into(), self.group.clone());
        fields.insert("value".into(), Value::from(self.value.clone()));
        fields.insert("all".into(), Value::from(self.all.clone()));
        fields.insert("level".into(), Value::from(self.level));
        Value::from(fields)
    }

    pub fn from_value(v: &Value) -> Option<Group> {
        let fields = match v {
            Value::Object(fields) if fields.get("grouped") == Some(&Value::Bool(true)) => fields,
            _ => return None,
        };
        let list = |name: &str| match fields.get(name) {
            Some(Value::Array(a)) => a.as_ref().clone(),
            _ => vec![],
        };
        Some(Group {
            grouped: true,
            group: fields.get("group").cloned().unwrap_or(Value::Undefined),
            value: list("value"),
            all: list("all"),
            level: fields
                .get("level")
                .and_then(Value::to_number)
                .map_or(0, |n| n as usize),
        })
    }
}

/// Rows of an array, DataSet or Group value. `None` for anything else.
pub fn rows(v: &Value) -> Option<Rc<Vec<Value>>> {
    match v {
        Value::Array(a) => Some(a.clone()),
        Value::Object(fields) => {
            if fields.get("grouped") == Some(&Value::Bool(true)) {
                match fields.get("all") {
                    Some(Value::Array(a)) => Some(a.clone()),
                    _ => Some(Rc::new(vec![])),
                }
            } else {
                match DataSet::from_value(v) {
                    Some(DataSet {
                        value: Value::Array(a),
                        ..
                    }) => Some(a),
                    _ => None,
                }
            }
        }
        _ => None,
    }
}

/// `(key, row)` pairs for iteration. Collections are keyed by position, plain objects
/// by field name, and a lone scalar is a single row. Nullish values have no rows.
pub(crate) fn entries(v: &Value) -> Vec<(Value, Value)> {
    match (rows(v), v) {
        (Some(rows), _) => rows
            .iter()
            .enumerate()
            .map(|(i, r)| (Value::from(i), r.clone()))
            .collect(),
        (None, Value::Object(fields)) => fields
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect(),
        (None, v) if v.is_nullish() => vec![],
        (None, v) => vec![(Value::from(0), v.clone())],
    }
}

/// How a sort or group key is computed for a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Extractor {
    Path(Rc<Keypath>),
    Application(Rc<Application>),
}

impl Extractor {
    pub fn from_value(v: &Value) -> Option<Extractor> {
        match v {
            Value::String(s) => parse_path(s).ok().map(|p| Extractor::Path(Rc::new(p))),
            Value::Application(app) => Some(Extractor::Application(app.clone())),
            _ => None,
        }
    }

    /// Key of `row` at position `index` of its collection.
    pub fn extract(&self, ctx: &Context, row: &Value, index: usize) -> Result<Value> {
        match self {
            Extractor::Path(path) if path.up == 0 && path.prefix.is_none() => {
                Ok(reference::index_path(ctx, row.clone(), &path.keys))
            }
            Extractor::Path(path) => {
                let anchor = ctx.extend(Extend::value(row.clone()));
                Ok(reference::safe_get(&anchor, path))
            }
            Extractor::Application(app) => {
                let specials = row_specials(index, Value::from(index), None);
                let anchor = ctx.extend(Extend::value(row.clone()).special(specials.clone()));
                eval_apply(
                    &anchor,
                    app,
                    vec![row.clone(), Value::from(index)],
                    Some(specials),
                )
            }
        }
    }
}

/// Specials exposed to per-row applications.
pub(crate) fn row_specials(index: usize, key: Value, len: Option<usize>) -> Map {
    let mut m = Map::new();
    m.insert("index".into(), Value::from(index));
    m.insert("key".into(), key);
    if let Some(len) = len {
        m.insert("first".into(), Value::Bool(index == 0));
        m.insert("last".into(), Value::Bool(index + 1 == len));
    }
    m
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub by: Extractor,
    pub desc: bool,
}

fn is_desc(v: &Value) -> bool {
    match v {
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "desc" | "descending"),
        v => v.is_truthy(),
    }
}

/// Normalize a sort spec: `'field'`, `'-field'`, `'+field'`, `{by, desc}`, `{by, dir}`,
/// an application, or an array of these.
pub fn sort_specs(spec: &Value) -> Vec<SortBy> {
    let mut specs = vec![];
    collect_specs(spec, &mut specs);
    specs
}

fn collect_specs(spec: &Value, out: &mut Vec<SortBy>) {
    match spec {
        Value::Array(items) => {
            for item in items.iter() {
                collect_specs(item, out);
            }
        }
        Value::String(s) => {
            let (desc, path) = match s.chars().next() {
                Some('-') => (true, &s[1..]),
                Some('+') => (false, &s[1..]),
                _ => (false, s.as_ref()),
            };
            if let Ok(path) = parse_path(path) {
                out.push(SortBy {
                    by: Extractor::Path(Rc::new(path)),
                    desc,
                });
            }
        }
        Value::Application(app) => out.push(SortBy {
            by: Extractor::Application(app.clone()),
            desc: false,
        }),
        Value::Object(fields) => {
            let by = fields.get("by").and_then(Extractor::from_value);
            let desc = match (fields.get("desc"), fields.get("dir")) {
                (Some(d), _) => d.is_truthy(),
                (None, Some(dir)) => is_desc(dir),
                _ => false,
            };
            if let Some(by) = by {
                out.push(SortBy { by, desc });
            }
        }
        _ => (),
    }
}

/// Stable multi-key sort. With no keys the rows themselves are compared.
pub fn sort_with(ctx: &Context, rows: &[Value], by: &[SortBy]) -> Result<Vec<Value>> {
    let mut keyed = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let mut keys = Vec::with_capacity(by.len());
        for spec in by {
            keys.push(spec.by.extract(ctx, row, i)?);
        }
        keyed.push((keys, row.clone()));
    }

    keyed.sort_by(|(a, ra), (b, rb)| {
        if by.is_empty() {
            return ra.loose_cmp(rb);
        }
        for ((x, y), spec) in a.iter().zip(b.iter()).zip(by) {
            let ord = match x.loose_cmp(y) {
                o if spec.desc => o.reverse(),
                o => o,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

pub fn sort(ctx: &Context, rows: &[Value], spec: &Value) -> Result<Vec<Value>> {
    sort_with(ctx, rows, &sort_specs(spec))
}

/// Stable partition by the first extractor, recursing for the rest. Groups keep the
/// order in which their keys were first seen.
pub fn group_with(
    ctx: &Context,
    rows: &[Value],
    by: &[Extractor],
    level: usize,
) -> Result<Vec<Group>> {
    let Some((first, rest)) = by.split_first() else {
        return Ok(vec![]);
    };
    let mut groups: Vec<(Value, Vec<Value>)> = vec![];
    for (i, row) in rows.iter().enumerate() {
        let key = first.extract(ctx, row, i)?;
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row.clone()),
            None => groups.push((key, vec![row.clone()])),
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let value = if rest.is_empty() {
            members.clone()
        } else {
            group_with(ctx, &members, rest, level + 1)?
                .iter()
                .map(Group::to_value)
                .collect()
        };
        out.push(Group {
            grouped: true,
            group: key,
            value,
            all: members,
            level,
        });
    }
    Ok(out)
}

pub fn group_specs(spec: &Value) -> Vec<Extractor> {
    match spec {
        Value::Array(items) => items.iter().filter_map(Extractor::from_value).collect(),
        v => Extractor::from_value(v).into_iter().collect(),
    }
}

pub fn group(ctx: &Context, rows: &[Value], spec: &Value) -> Result<Vec<Group>> {
    group_with(ctx, rows, &group_specs(spec), 0)
}

#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub predicate: Option<Rc<Application>>,
    pub sort: Option<Value>,
    pub group: Option<Value>,
}

/// Filter, then optionally sort and group, the rows of `source`. The predicate sees
/// the source as `@source` and each row's position as `@index` and `@key`.
pub fn filter(ctx: &Context, source: &Value, opts: &FilterOptions) -> Result<DataSet> {
    let schema = DataSet::from_value(source).and_then(|d| d.schema);
    let entries = entries(source);

    let mut frame_specials = Map::new();
    frame_specials.insert("source".into(), source.clone());
    let frame = ctx.extend(Extend::value(source.clone()).special(frame_specials));

    let mut kept = vec![];
    let len = entries.len();
    for (i, (key, row)) in entries.into_iter().enumerate() {
        let keep = match &opts.predicate {
            Some(app) => {
                let specials = row_specials(i, key, Some(len));
                let anchor = frame.extend(Extend::value(row.clone()).special(specials.clone()));
                eval_apply(&anchor, app, vec![row.clone(), Value::from(i)], Some(specials))?
                    .is_truthy()
            }
            None => true,
        };
        if keep {
            kept.push(row);
        }
    }

    if let Some(spec) = &opts.sort {
        kept = sort(&frame, &kept, spec)?;
    }
    let value = match &opts.group {
        Some(spec) => Value::from(
            group(&frame, &kept, spec)?
                .iter()
                .map(Group::to_value)
                .collect::<Vec<_>>(),
        ),
        None => Value::from(kept),
    };
    Ok(DataSet { schema, value })
}
