//! Field maps: column name to value, used for filters and writes

use std::fmt;

use chrono::{DateTime, Utc};

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    BigInt(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Name of the value's type as shown in validation errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::BigInt(_) => "bigint",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::BigInt(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::BigInt(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{:?}", v),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::BigInt(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Ordered mapping of column name to value.
///
/// Insertion order is kept so generated SQL is stable. Inserting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, Value)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
    }

    /// Insert only when the value is present (an "unset" field stays unset).
    pub fn insert_opt<T: Into<Value>>(&mut self, field: impl Into<String>, value: Option<T>) {
        if let Some(value) = value {
            self.insert(field, value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find_map(|(k, v)| (k == field).then_some(v))
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == field)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl fmt::Display for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str("}")
    }
}

/// Anything that can be turned into a field map: a raw `FieldMap`, a list
/// of pairs, or a typed input schema whose set fields become entries.
pub trait IntoFields {
    fn into_fields(self) -> FieldMap;
}

impl IntoFields for FieldMap {
    fn into_fields(self) -> FieldMap {
        self
    }
}

impl IntoFields for &FieldMap {
    fn into_fields(self) -> FieldMap {
        self.clone()
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoFields for [(K, V); N] {
    fn into_fields(self) -> FieldMap {
        self.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> IntoFields for Vec<(K, V)> {
    fn into_fields(self) -> FieldMap {
        self.into_iter().collect()
    }
}
