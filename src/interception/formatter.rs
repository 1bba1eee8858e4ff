// src/interception/formatter.rs
//! Classifying formatter for captured values
//!
//! Console arguments and similar payloads arrive as a [`RawValue`] graph whose
//! container nodes are shared and may reference themselves. The formatter
//! turns that graph into a [`CapturedValue`] tree with hard limits on depth,
//! entries per container and string length. Cycles are detected with a set of
//! the container nodes on the current path.

use crate::tracking::error_tracker::{ErrorReport, ReportHandle};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Error description carried by values and error reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,

    /// Report this value was taken from, if any
    #[serde(skip)]
    pub report: ReportHandle,
}

impl ErrorDescriptor {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<&Arc<ErrorReport>> for ErrorDescriptor {
    fn from(report: &Arc<ErrorReport>) -> Self {
        Self {
            name: report.error_type.clone(),
            message: report.message.clone(),
            stack: report.stack.clone(),
            report: ReportHandle::from(report),
        }
    }
}

/// Shared, mutable list node
#[derive(Debug, Clone, Default)]
pub struct ListRef(Arc<RwLock<Vec<RawValue>>>);

impl ListRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: RawValue) {
        self.0.write().push(value);
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

/// Shared, mutable key/value node (insertion ordered)
#[derive(Debug, Clone, Default)]
pub struct MapRef(Arc<RwLock<Vec<(String, RawValue)>>>);

impl MapRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`
    pub fn insert(&self, key: impl Into<String>, value: RawValue) {
        let key = key.into();
        let mut entries = self.0.write();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => entries.push((key, value)),
        }
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

/// Value as handed over by the host environment
#[derive(Debug, Clone)]
pub enum RawValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Bytes(Bytes),
    Error(ErrorDescriptor),
    Function(String),
    Json(serde_json::Value),
    List(ListRef),
    Map(MapRef),
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

impl From<&Arc<ErrorReport>> for RawValue {
    fn from(report: &Arc<ErrorReport>) -> Self {
        RawValue::Error(ErrorDescriptor::from(report))
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        RawValue::Json(value)
    }
}

/// Scalar values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Primitive {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// Formatted, size-capped value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapturedValue {
    Primitive {
        value: Primitive,
    },
    Array {
        items: Vec<CapturedValue>,
        /// Length before truncation
        total: usize,
    },
    Object {
        entries: Vec<(String, CapturedValue)>,
        /// Entry count before truncation
        total: usize,
    },
    Binary {
        bytes: usize,
    },
    Error {
        error: ErrorDescriptor,
    },
    Function {
        name: String,
    },
    Circular,
    MaxDepth,
}

impl CapturedValue {
    fn primitive(value: Primitive) -> Self {
        CapturedValue::Primitive { value }
    }

    /// One-line rendering used for log messages
    pub fn preview(&self) -> String {
        match self {
            CapturedValue::Primitive { value } => match value {
                Primitive::Undefined => "undefined".to_string(),
                Primitive::Null => "null".to_string(),
                Primitive::Bool(b) => b.to_string(),
                Primitive::Number(n) => format_number(*n),
                Primitive::String(s) => s.clone(),
            },
            CapturedValue::Array { items, total } => {
                let mut parts: Vec<String> = items.iter().map(|v| v.nested_preview()).collect();
                if *total > items.len() {
                    parts.push(format!("… {} more", total - items.len()));
                }
                format!("[{}]", parts.join(", "))
            }
            CapturedValue::Object { entries, total } => {
                let mut parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.nested_preview()))
                    .collect();
                if *total > entries.len() {
                    parts.push(format!("… {} more", total - entries.len()));
                }
                format!("{{{}}}", parts.join(", "))
            }
            CapturedValue::Binary { bytes } => format!("[Binary: {} bytes]", bytes),
            CapturedValue::Error { error } => format!("{}: {}", error.name, error.message),
            CapturedValue::Function { name } => format!("[Function: {}]", name),
            CapturedValue::Circular => "[Circular]".to_string(),
            CapturedValue::MaxDepth => "[Object]".to_string(),
        }
    }

    /// Strings are quoted when nested inside containers
    fn nested_preview(&self) -> String {
        match self {
            CapturedValue::Primitive {
                value: Primitive::String(s),
            } => format!("\"{}\"", s),
            other => other.preview(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Formatter limits
#[derive(Debug, Clone)]
pub struct ValueFormatter {
    /// Containers nested deeper than this render as `MaxDepth`
    pub max_depth: usize,

    /// Entries rendered per array or object
    pub max_entries: usize,

    /// Strings longer than this are cut
    pub max_string_chars: usize,
}

impl Default for ValueFormatter {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_entries: 100,
            max_string_chars: 10_000,
        }
    }
}

impl ValueFormatter {
    pub fn new(max_depth: usize, max_entries: usize, max_string_chars: usize) -> Self {
        Self {
            max_depth,
            max_entries,
            max_string_chars,
        }
    }

    /// Classify a single value
    pub fn format(&self, value: &RawValue) -> CapturedValue {
        let mut path = HashSet::new();
        self.format_raw(value, 0, &mut path)
    }

    /// Classify every argument of a call
    pub fn format_all(&self, values: &[RawValue]) -> Vec<CapturedValue> {
        values.iter().map(|v| self.format(v)).collect()
    }

    fn format_raw(&self, value: &RawValue, depth: usize, path: &mut HashSet<usize>) -> CapturedValue {
        match value {
            RawValue::Undefined => CapturedValue::primitive(Primitive::Undefined),
            RawValue::Null => CapturedValue::primitive(Primitive::Null),
            RawValue::Bool(b) => CapturedValue::primitive(Primitive::Bool(*b)),
            RawValue::Number(n) => CapturedValue::primitive(Primitive::Number(*n)),
            RawValue::Text(s) => CapturedValue::primitive(Primitive::String(self.cap_string(s))),
            RawValue::Bytes(b) => CapturedValue::Binary { bytes: b.len() },
            RawValue::Error(e) => CapturedValue::Error {
                error: ErrorDescriptor {
                    name: e.name.clone(),
                    message: self.cap_string(&e.message),
                    stack: e.stack.as_ref().map(|s| self.cap_string(s)),
                    report: e.report.clone(),
                },
            },
            RawValue::Function(name) => CapturedValue::Function { name: name.clone() },
            RawValue::Json(json) => self.format_json(json, depth),
            RawValue::List(list) => {
                if depth >= self.max_depth {
                    return CapturedValue::MaxDepth;
                }
                let addr = list.addr();
                if !path.insert(addr) {
                    return CapturedValue::Circular;
                }
                let items = list.0.read().clone();
                let formatted = items
                    .iter()
                    .take(self.max_entries)
                    .map(|item| self.format_raw(item, depth + 1, path))
                    .collect();
                path.remove(&addr);
                CapturedValue::Array {
                    items: formatted,
                    total: items.len(),
                }
            }
            RawValue::Map(map) => {
                if depth >= self.max_depth {
                    return CapturedValue::MaxDepth;
                }
                let addr = map.addr();
                if !path.insert(addr) {
                    return CapturedValue::Circular;
                }
                let entries = map.0.read().clone();
                let formatted = entries
                    .iter()
                    .take(self.max_entries)
                    .map(|(key, item)| (key.clone(), self.format_raw(item, depth + 1, path)))
                    .collect();
                path.remove(&addr);
                CapturedValue::Object {
                    entries: formatted,
                    total: entries.len(),
                }
            }
        }
    }

    fn format_json(&self, value: &serde_json::Value, depth: usize) -> CapturedValue {
        use serde_json::Value;

        match value {
            Value::Null => CapturedValue::primitive(Primitive::Null),
            Value::Bool(b) => CapturedValue::primitive(Primitive::Bool(*b)),
            Value::Number(n) => {
                CapturedValue::primitive(Primitive::Number(n.as_f64().unwrap_or(f64::NAN)))
            }
            Value::String(s) => CapturedValue::primitive(Primitive::String(self.cap_string(s))),
            Value::Array(items) => {
                if depth >= self.max_depth {
                    return CapturedValue::MaxDepth;
                }
                CapturedValue::Array {
                    items: items
                        .iter()
                        .take(self.max_entries)
                        .map(|item| self.format_json(item, depth + 1))
                        .collect(),
                    total: items.len(),
                }
            }
            Value::Object(map) => {
                if depth >= self.max_depth {
                    return CapturedValue::MaxDepth;
                }
                CapturedValue::Object {
                    entries: map
                        .iter()
                        .take(self.max_entries)
                        .map(|(k, v)| (k.clone(), self.format_json(v, depth + 1)))
                        .collect(),
                    total: map.len(),
                }
            }
        }
    }

    fn cap_string(&self, s: &str) -> String {
        match s.char_indices().nth(self.max_string_chars) {
            Some((cut, _)) => format!("{}… [{} characters]", &s[..cut], s.chars().count()),
            None => s.to_string(),
        }
    }
}
