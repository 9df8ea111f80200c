//! Structured invoice properties.
//!
//! [`InvoiceProperties`] always holds exactly the keys of [`PROPERTY_KEYS`], in
//! that order. Values come from either the regex [`heuristic`] extractor or the
//! [`llm`] extractor and can be scored against ground truth with [`scoring`].

pub mod heuristic;
pub mod llm;
pub mod scoring;

pub use heuristic::extract_heuristic;
pub use llm::extract_with_llm;
pub use scoring::{FieldScore, GroundTruth, GroundTruthScore, load_ground_truth, score};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Every property key, in output order.
pub const PROPERTY_KEYS: [&str; 17] = [
    "Belegnummer",
    "Belegdatum",
    "Lieferant",
    "Lieferdatum",
    "Verknüpfung",
    "Fälligkeit",
    "Kostenstelle",
    "Tags",
    "Kategorie",
    "Betrag (Brutto)",
    "Währung",
    "Umsatzsteuer",
    "Beschreibung",
    "Positionen",
    "Gesamt Netto",
    "Gesamt Umsatzsteuer",
    "Gesamt Betrag",
];

/// Keys whose value is a list of strings.
pub const LIST_KEYS: [&str; 2] = ["Tags", "Positionen"];

/// Separator used when a list value is compared as a string.
pub const LIST_SEPARATOR: &str = " | ";

pub fn is_list_key(key: &str) -> bool {
    LIST_KEYS.contains(&key)
}

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Whitespace regex pattern is valid and should compile"));

/// Collapse whitespace runs to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// A property value: text for scalar keys, a list for [`LIST_KEYS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
}

impl PropertyValue {
    fn default_for(key: &str) -> Self {
        if is_list_key(key) {
            PropertyValue::List(Vec::new())
        } else {
            PropertyValue::Text(String::new())
        }
    }

    /// Comparison form: whitespace collapsed, list items joined with `" | "`.
    pub fn normalized(&self) -> String {
        match self {
            PropertyValue::Text(text) => collapse_whitespace(text),
            PropertyValue::List(items) => join_normalized(items.iter().map(String::as_str)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized().is_empty()
    }
}

fn join_normalized<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Comparison form of an arbitrary JSON value, as used for ground truth.
pub fn normalize_json_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(scalar_to_string)
            .map(|s| collapse_whitespace(&s))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        other => collapse_whitespace(&scalar_to_string(other)),
    }
}

fn coerce_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| collapse_whitespace(&scalar_to_string(v)))
            .filter(|s| !s.is_empty())
            .collect(),
        other => {
            let text = collapse_whitespace(&scalar_to_string(other));
            if text.is_empty() { Vec::new() } else { vec![text] }
        }
    }
}

/// The fixed invoice property mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct InvoiceProperties {
    values: IndexMap<&'static str, PropertyValue>,
}

impl Default for InvoiceProperties {
    fn default() -> Self {
        Self {
            values: PROPERTY_KEYS
                .iter()
                .map(|key| (*key, PropertyValue::default_for(key)))
                .collect(),
        }
    }
}

impl Serialize for InvoiceProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl From<Map<String, Value>> for InvoiceProperties {
    fn from(payload: Map<String, Value>) -> Self {
        Self::coerce(&payload)
    }
}

impl InvoiceProperties {
    /// Every key present with its empty default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an arbitrary JSON object onto the fixed schema.
    ///
    /// Missing keys get their default, unknown keys are dropped, list keys are
    /// always lists of trimmed non-empty strings and scalar keys are strings.
    pub fn coerce(payload: &Map<String, Value>) -> Self {
        let mut props = Self::default();
        for key in PROPERTY_KEYS {
            let Some(value) = payload.get(key) else {
                continue;
            };
            let coerced = if is_list_key(key) {
                PropertyValue::List(coerce_list(value))
            } else {
                PropertyValue::Text(collapse_whitespace(&scalar_to_string(value)))
            };
            props.values.insert(key, coerced);
        }
        props
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    /// Text of a scalar key. Empty for unknown or list keys.
    pub fn text(&self, key: &str) -> &str {
        match self.values.get(key) {
            Some(PropertyValue::Text(text)) => text,
            _ => "",
        }
    }

    /// Items of a list key. Empty for unknown or scalar keys.
    pub fn list(&self, key: &str) -> &[String] {
        match self.values.get(key) {
            Some(PropertyValue::List(items)) => items,
            _ => &[],
        }
    }

    /// Set a scalar key. Returns `false` (and changes nothing) for unknown or list keys.
    pub fn set_text(&mut self, key: &str, value: impl Into<String>) -> bool {
        match self.values.get_mut(key) {
            Some(slot @ PropertyValue::Text(_)) => {
                *slot = PropertyValue::Text(value.into());
                true
            }
            _ => false,
        }
    }

    /// Set a list key. Returns `false` (and changes nothing) for unknown or scalar keys.
    pub fn set_list(&mut self, key: &str, items: Vec<String>) -> bool {
        match self.values.get_mut(key) {
            Some(slot @ PropertyValue::List(_)) => {
                *slot = PropertyValue::List(items);
                true
            }
            _ => false,
        }
    }

    /// Comparison form of `key`, empty for unknown keys.
    pub fn normalized(&self, key: &str) -> String {
        self.values.get(key).map(PropertyValue::normalized).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Number of keys with a non-empty value.
    pub fn filled_count(&self) -> usize {
        self.values.values().filter(|v| !v.is_empty()).count()
    }

    /// `filled_count / 17`.
    pub fn filled_ratio(&self) -> f64 {
        self.filled_count() as f64 / PROPERTY_KEYS.len() as f64
    }
}
