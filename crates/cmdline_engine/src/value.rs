//! Typed values produced by parsing and command execution.

use std::{any::Any, fmt, rc::Rc};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Date format used for parsing, display, and JSON projection.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Opaque handle to a host document element.
///
/// Equality is identity of the wrapped element. JSON projection only exposes the query the element
/// was found with, never the element itself.
#[derive(Clone)]
pub struct NodeHandle {
    query: String,
    element: Rc<dyn Any>,
}

impl NodeHandle {
    /// Wraps a host element.
    pub fn new(element: Rc<dyn Any>) -> Self {
        Self {
            query: String::new(),
            element,
        }
    }

    /// Returns a copy remembering the selector that located the element.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Selector the element was found with.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Borrows the host element as a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.element.downcast_ref::<T>()
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.element, &other.element)
    }
}

/// A set of host elements matched by one selector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeList {
    /// Selector text.
    pub query: String,
    /// Matched elements in document order.
    pub nodes: Vec<NodeHandle>,
}

/// Kind of document resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Script resource.
    Script,
    /// Stylesheet resource.
    Sheet,
}

/// Reference to a document resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Display name, usually the URL.
    pub name: String,
    /// Resource kind.
    #[serde(rename = "type")]
    pub kind: ResourceKind,
}

/// Template plus data that an output view renders.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewSpec {
    /// Template markup.
    pub html: String,
    /// Data the template is bound to.
    pub data: Value,
}

/// A parsed or computed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TypedValue {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Ordered list of values.
    Array(Vec<TypedValue>),
    /// Value produced by one alternative of a union type.
    Union {
        /// Name of the alternative that accepted the input.
        type_name: String,
        /// The alternative's value.
        value: Box<TypedValue>,
    },
    /// Single document element.
    Node(NodeHandle),
    /// Document elements.
    NodeList(NodeList),
    /// Document resource.
    Resource(ResourceRef),
    /// Renderable view.
    View(ViewSpec),
    /// Arbitrary structured data.
    Json(Value),
}

impl TypedValue {
    /// Short name of the value's shape, used as the output type when a command declares none.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Union { .. } => "union",
            Self::Node(_) => "node",
            Self::NodeList(_) => "nodelist",
            Self::Resource(_) => "resource",
            Self::View(_) => "view",
            Self::Json(_) => "json",
        }
    }

    /// Borrows the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the numeric payload.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    /// Returns the boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Returns the date payload.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }

    /// Projects the value to JSON for transport.
    ///
    /// Nodes become `{"query": ...}` and dates become `YYYY-MM-DD` strings.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Number(number) => number_to_json(*number),
            Self::String(text) => Value::String(text.clone()),
            Self::Date(date) => Value::String(date.format(DATE_FORMAT).to_string()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Union { type_name, value } => json!({ "type": type_name, "value": value.to_json() }),
            Self::Node(node) => json!({ "query": node.query() }),
            Self::NodeList(list) => json!({ "query": list.query, "length": list.nodes.len() }),
            Self::Resource(resource) => {
                serde_json::to_value(resource).unwrap_or_else(|_| Value::String(resource.name.clone()))
            }
            Self::View(view) => json!({ "html": view.html, "data": view.data }),
            Self::Json(value) => value.clone(),
        }
    }

    /// Lifts JSON received over the bridge into a value.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => number.as_f64().map(Self::Number).unwrap_or(Self::Null),
            Value::String(text) => Self::String(text),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Json(Value::Object(map)),
        }
    }

    /// Default textual rendering, used when no type-specific stringify applies.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(flag) => flag.to_string(),
            Self::Number(number) => format_number(*number),
            Self::String(text) => text.clone(),
            Self::Date(date) => date.format(DATE_FORMAT).to_string(),
            Self::Array(items) => items
                .iter()
                .map(Self::to_display_string)
                .collect::<Vec<_>>()
                .join(" "),
            Self::Union { value, .. } => value.to_display_string(),
            Self::Node(node) => node.query().to_string(),
            Self::NodeList(list) => list.query.clone(),
            Self::Resource(resource) => resource.name.clone(),
            Self::View(view) => view.html.clone(),
            Self::Json(value) => value.to_string(),
        }
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<NaiveDate> for TypedValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

fn number_to_json(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 9.0e15 {
        Value::from(number as i64)
    } else {
        serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Formats a number without float noise: integers without a fraction, others to at most ten
/// decimals with trailing zeros removed.
pub fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 9.0e15 {
        return format!("{}", number as i64);
    }
    let fixed = format!("{number:.10}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
