// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::Application;
use crate::dates::{self, Timespan};
use crate::printer;

use core::fmt;
use std::cmp::Ordering;
use std::ops;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Ordered string-keyed map used for objects, locals and specials.
pub type Map = IndexMap<Rc<str>, Value>;

// serde_json::Value cannot carry dates, closures or the undefined marker, and its
// numbers are not plain f64. Objects keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    // Json data types. serde will automatically map json to these variants.
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Map>),

    // Extra REL data types
    Date(DateTime<FixedOffset>),
    Timespan(Timespan),
    Application(Rc<Application>),

    // Indicate that a value is undefined
    Undefined,
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Undefined => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(s.as_ref()),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    serializer.serialize_i64(*n as i64)
                } else if n.is_finite() {
                    serializer.serialize_f64(*n)
                } else {
                    serializer.serialize_none()
                }
            }
            Value::Array(a) => a.serialize(serializer),
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    map.serialize_entry(k.as_ref(), v)?;
                }
                map.end()
            }
            Value::Date(d) => serializer.serialize_str(&d.to_rfc3339()),
            Value::Timespan(t) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("months", &t.months)?;
                map.serialize_entry("millis", &t.millis)?;
                map.end()
            }
            Value::Application(a) => serializer.serialize_str(&printer::stringify_application(a)),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a value")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v as f64))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v as f64))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(s))
    }

    fn visit_string<E>(self, s: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(s))
    }

    fn visit_seq<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let mut arr = vec![];
        while let Some(v) = visitor.next_element()? {
            arr.push(v);
        }
        Ok(Value::from(arr))
    }

    fn visit_map<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut map = Map::new();
        while let Some((key, value)) = visitor.next_entry::<String, Value>()? {
            map.insert(key.into(), value);
        }
        Ok(Value::from(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{s}"),
            Err(_e) => Err(std::fmt::Error),
        }
    }
}

impl Value {
    pub fn new_object() -> Value {
        Value::from(Map::new())
    }

    pub fn new_array() -> Value {
        Value::from(vec![])
    }

    pub fn from_json_str(json: &str) -> Result<Value> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_str(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Value> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(Rc::new(a))
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Object(Rc::new(m))
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(d: DateTime<FixedOffset>) -> Self {
        Value::Date(d)
    }
}

impl From<Timespan> for Value {
    fn from(t: Timespan) -> Self {
        Value::Timespan(t)
    }
}

impl From<Rc<Application>> for Value {
    fn from(a: Rc<Application>) -> Self {
        Value::Application(a)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for both `null` and the undefined marker.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn is_empty_object(&self) -> bool {
        matches!(self, Value::Object(o) if o.is_empty())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Date(_) => "date",
            Value::Timespan(_) => "timespan",
            Value::Application(_) => "application",
            Value::Undefined => "undefined",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Timespan(t) => !t.is_zero(),
            Value::Object(_) | Value::Date(_) | Value::Application(_) => true,
        }
    }

    pub fn as_bool(&self) -> Result<&bool> {
        match self {
            Value::Bool(b) => Ok(b),
            _ => Err(anyhow!("not a bool")),
        }
    }

    pub fn as_string(&self) -> Result<&Rc<str>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(anyhow!("not a string")),
        }
    }

    pub fn as_number(&self) -> Result<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            _ => Err(anyhow!("not a number")),
        }
    }

    pub fn as_array(&self) -> Result<&Vec<Value>> {
        match self {
            Value::Array(a) => Ok(a),
            _ => Err(anyhow!("not an array")),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Ok(Rc::make_mut(a)),
            _ => Err(anyhow!("not an array")),
        }
    }

    pub fn as_object(&self) -> Result<&Map> {
        match self {
            Value::Object(m) => Ok(m),
            _ => Err(anyhow!("not an object")),
        }
    }

    pub fn as_object_mut(&mut self) -> Result<&mut Map> {
        match self {
            Value::Object(m) => Ok(Rc::make_mut(m)),
            _ => Err(anyhow!("not an object")),
        }
    }

    pub fn as_application(&self) -> Option<&Rc<Application>> {
        match self {
            Value::Application(a) => Some(a),
            _ => None,
        }
    }

    /// Numeric coercion. `None` when the value has no numeric reading.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => Some(0.0),
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else {
                    s.parse::<f64>().ok()
                }
            }
            Value::Date(d) => Some(d.timestamp_millis() as f64),
            _ => None,
        }
    }

    /// Plain-text rendering used by string concatenation and templates.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null | Value::Undefined => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(a) => a
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(_) => self.to_string(),
            Value::Date(d) => dates::date_text(d),
            Value::Timespan(t) => dates::timespan_text(t),
            Value::Application(a) => printer::stringify_application(a),
        }
    }

    /// Equality that tolerates type differences the way report authors expect:
    /// nullish values equal each other and numeric strings equal numbers.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), Value::Number(_))
            | (Value::Number(_), Value::Bool(_)) => match (self.to_number(), other.to_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Value::Application(a), Value::Application(b)) => Rc::ptr_eq(a, b) || a == b,
            (a, b) => a == b,
        }
    }

    /// Rank of a value's kind in the loose ordering. Numbers, booleans, dates and
    /// numeric strings share a rank and compare by their numeric reading.
    fn order_rank(&self) -> u8 {
        match self {
            v if v.is_nullish() => 0,
            Value::Number(n) if n.is_nan() => 2,
            Value::Number(_) | Value::Bool(_) | Value::Date(_) => 1,
            Value::String(_) => match self.to_number() {
                Some(n) if !n.is_nan() => 1,
                _ => 3,
            },
            Value::Timespan(_) => 4,
            Value::Array(_) => 5,
            _ => 6,
        }
    }

    /// Total ordering used by sorting and comparison operators: nullish values, then
    /// numeric values, then `NaN`, then text, timespans, arrays and everything else.
    pub fn loose_cmp(&self, other: &Value) -> Ordering {
        let rank = self.order_rank();
        match rank.cmp(&other.order_rank()) {
            Ordering::Equal => (),
            o => return o,
        }
        match (rank, self, other) {
            (1, a, b) => match (a.to_number(), b.to_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
            (3, Value::String(a), Value::String(b)) => a.cmp(b),
            (4, Value::Timespan(a), Value::Timespan(b)) => a.cmp(b),
            (5, Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.loose_cmp(y) {
                        Ordering::Equal => (),
                        o => return o,
                    }
                }
                a.len().cmp(&b.len())
            }
            (6, a, b) => a.to_text().cmp(&b.to_text()),
            _ => Ordering::Equal,
        }
    }

    /// Index into a collection the way references do: names on objects, (negative)
    /// positions on arrays and strings. Anything else is undefined.
    pub fn index(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::Object(o), _) => match o.get(key.to_text().as_str()) {
                Some(v) => v.clone(),
                None => Value::Undefined,
            },
            (Value::Array(a), Value::String(s)) if s.as_ref() == "length" => Value::from(a.len()),
            (Value::String(s), Value::String(k)) if k.as_ref() == "length" => {
                Value::from(s.chars().count())
            }
            (Value::Array(a), _) => match key.to_number().and_then(|n| resolve_index(n, a.len())) {
                Some(i) => a[i].clone(),
                None => Value::Undefined,
            },
            (Value::String(s), Value::Number(n)) => {
                let len = s.chars().count();
                match resolve_index(*n, len).and_then(|i| s.chars().nth(i)) {
                    Some(c) => Value::from(c.to_string()),
                    None => Value::Undefined,
                }
            }
            _ => Value::Undefined,
        }
    }
}

/// Turn a possibly negative position into an in-bounds index.
pub fn resolve_index(n: f64, len: usize) -> Option<usize> {
    if n.fract() != 0.0 || n.is_nan() {
        return None;
    }
    let i = if n < 0.0 { len as f64 + n } else { n };
    if i >= 0.0 && (i as usize) < len {
        Some(i as usize)
    } else {
        None
    }
}

/// Render a number without a trailing `.0` for integral values.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

impl ops::Index<usize> for Value {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        match self.as_array() {
            Ok(a) if index < a.len() => &a[index],
            _ => &Value::Undefined,
        }
    }
}

impl ops::Index<&str> for Value {
    type Output = Value;

    fn index(&self, key: &str) -> &Self::Output {
        match self {
            Value::Object(o) => match o.get(key) {
                Some(v) => v,
                _ => &Value::Undefined,
            },
            _ => &Value::Undefined,
        }
    }
}
