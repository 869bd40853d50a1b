use indexmap::{IndexMap, IndexSet};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single scalar as delivered by the API or read from a spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Text coercion used for display and filtering. Null renders empty.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 3,
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::Text(_) => 2,
        }
    }

    /// Total order over defined values: Bool < Number < Text, each compared natively.
    /// Null is placed last, callers that sort in both directions handle it separately.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s),
            // Nested structures are not part of flat reports, keep them readable.
            other => Value::Text(other.to_string()),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Value::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// One row of a report. Field order follows first appearance in the source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Missing fields read as Null.
    pub fn value(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.get(name).unwrap_or(&NULL)
    }

    pub fn text(&self, name: &str) -> String {
        self.value(name).to_text()
    }

    /// Overwrites in place, a known field keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field equality where an absent field and an explicit Null are the same.
    pub fn same_fields(&self, other: &Record) -> bool {
        let covers = |a: &Record, b: &Record| a.iter().all(|(k, v)| b.value(k) == v);
        covers(self, other) && covers(other, self)
    }
}

/// Union of field names in order of first appearance across records.
pub fn field_names(records: &[Record]) -> Vec<String> {
    let mut names: IndexSet<&str> = IndexSet::new();
    for record in records {
        names.extend(record.keys());
    }
    names.into_iter().map(str::to_string).collect()
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a flat JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut record = Record::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            record.insert(key, value);
        }
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_keeps_field_order() {
        let record: Record =
            serde_json::from_str(r#"{"poliza":"100","prima":500,"activo":true,"nota":null}"#)
                .unwrap();
        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["poliza", "prima", "activo", "nota"]);
        assert_eq!(record.value("prima"), &Value::Number(500.0));
        assert_eq!(record.value("nota"), &Value::Null);
        assert_eq!(record.value("missing"), &Value::Null);
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut record = Record::new().with("poliza", "100").with("prima", 500.0);
        record.insert("poliza", "101");
        record.insert("nota", "renovar");
        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["poliza", "prima", "nota"]);
        assert_eq!(record.len(), 3);
        assert_eq!(record.text("poliza"), "101");
    }

    #[test]
    fn text_coercion() {
        assert_eq!(Value::Number(500.0).to_text(), "500");
        assert_eq!(Value::Number(0.25).to_text(), "0.25");
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::Bool(true).to_text(), "true");
    }

    #[test]
    fn mixed_types_have_a_total_order() {
        assert_eq!(
            Value::Number(900.0).total_cmp(&Value::Text("1".into())),
            Ordering::Less
        );
        assert_eq!(
            Value::Bool(true).total_cmp(&Value::Number(-1.0)),
            Ordering::Less
        );
        assert_eq!(
            Value::Text("099".into()).total_cmp(&Value::Text("100".into())),
            Ordering::Less
        );
    }

    #[test]
    fn field_names_are_a_union_in_first_seen_order() {
        let records = vec![
            Record::new().with("a", 1i64).with("b", 2i64),
            Record::new().with("c", 3i64).with("a", 4i64),
        ];
        assert_eq!(field_names(&records), vec!["a", "b", "c"]);
    }

    #[test]
    fn absent_equals_null_in_same_fields() {
        let a = Record::new().with("a", 1i64).with("b", Value::Null);
        let b = Record::new().with("a", 1i64);
        assert!(a.same_fields(&b));
        assert!(!a.same_fields(&Record::new().with("a", 2i64)));
    }
}
