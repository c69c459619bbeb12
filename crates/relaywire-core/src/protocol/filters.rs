//! Subscription filters and their typed wire form.
//!
//! On the wire each field stores up to three typed arrays (strings, numbers,
//! bools) plus an optional single-value slot. Arrays holding one primitive
//! kind keep their order. Mixed arrays come back regrouped by kind: strings,
//! then numbers, then bools. That regrouping is the defined behavior of the
//! wire form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One primitive filter operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Primitive {
    /// Loose equality against a JSON field value.
    pub fn matches(&self, v: &Value) -> bool {
        match (self, v) {
            (Primitive::Bool(a), Value::Bool(b)) => a == b,
            (Primitive::Number(a), Value::Number(b)) => b.as_f64().is_some_and(|b| *a == b),
            (Primitive::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::String(s.to_owned())
    }
}

impl From<f64> for Primitive {
    fn from(n: f64) -> Self {
        Primitive::Number(n)
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Bool(b)
    }
}

/// A filter operand: one primitive or a list of them (membership).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(Primitive),
    List(Vec<Primitive>),
}

impl FilterValue {
    pub fn matches(&self, v: &Value) -> bool {
        match self {
            FilterValue::Single(p) => p.matches(v),
            FilterValue::List(items) => items.iter().any(|p| p.matches(v)),
        }
    }
}

/// Field name -> operand. Ordered so echoes are deterministic.
pub type Filters = BTreeMap<String, FilterValue>;

/// True when every filter field matches the corresponding field of `record`.
/// A missing field never matches.
pub fn matches_filters(filters: &Filters, record: &Value) -> bool {
    filters.iter().all(|(field, op)| match record.get(field) {
        Some(v) => op.matches(v),
        None => false,
    })
}

/// Wire representation of one filter field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFilterField {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub string_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub number_values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bool_values: Vec<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single: Option<Primitive>,
}

pub type WireFilters = BTreeMap<String, WireFilterField>;

pub fn filters_to_wire(filters: &Filters) -> WireFilters {
    filters
        .iter()
        .map(|(k, v)| {
            let mut field = WireFilterField::default();
            match v {
                FilterValue::Single(p) => field.single = Some(p.clone()),
                FilterValue::List(items) => {
                    for p in items {
                        match p {
                            Primitive::String(s) => field.string_values.push(s.clone()),
                            Primitive::Number(n) => field.number_values.push(*n),
                            Primitive::Bool(b) => field.bool_values.push(*b),
                        }
                    }
                }
            }
            (k.clone(), field)
        })
        .collect()
}

pub fn filters_from_wire(wire: &WireFilters) -> Filters {
    wire.iter()
        .map(|(k, field)| {
            let value = match &field.single {
                Some(p) => FilterValue::Single(p.clone()),
                None => {
                    let mut items = Vec::with_capacity(
                        field.string_values.len() + field.number_values.len() + field.bool_values.len(),
                    );
                    items.extend(field.string_values.iter().cloned().map(Primitive::String));
                    items.extend(field.number_values.iter().copied().map(Primitive::Number));
                    items.extend(field.bool_values.iter().copied().map(Primitive::Bool));
                    FilterValue::List(items)
                }
            };
            (k.clone(), value)
        })
        .collect()
}
