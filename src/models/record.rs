//! Result rows.

use super::value::Value;
use crate::error::{DbError, DbResult};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Column names and their first-occurrence index, shared by every record
/// of one result set.
#[derive(Debug)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn new(names: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            // Duplicate column names resolve to the first occurrence.
            positions.entry(name.clone()).or_insert(idx);
        }
        Self { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// Lookup key for a record column: a position or a column name.
pub trait RecordKey {
    fn position(&self, columns: &ColumnIndex) -> Option<usize>;
    fn describe(&self) -> String;
}

impl RecordKey for usize {
    fn position(&self, columns: &ColumnIndex) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("index {self}")
    }
}

impl RecordKey for &str {
    fn position(&self, columns: &ColumnIndex) -> Option<usize> {
        columns.position(self)
    }

    fn describe(&self) -> String {
        format!("column '{self}'")
    }
}

impl RecordKey for String {
    fn position(&self, columns: &ColumnIndex) -> Option<usize> {
        columns.position(self)
    }

    fn describe(&self) -> String {
        format!("column '{self}'")
    }
}

/// An immutable row with positional and named access.
///
/// Records are never mutated after construction. `keys`, `values` and
/// `items` hand out owned snapshots.
#[derive(Clone)]
pub struct Record {
    columns: Arc<ColumnIndex>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record over a shared column index.
    ///
    /// Returns an error if the value count does not match the column count.
    pub fn new(columns: Arc<ColumnIndex>, values: Vec<Value>) -> DbResult<Self> {
        if columns.len() != values.len() {
            return Err(DbError::internal(format!(
                "Record has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Convenience constructor for a standalone record.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (names, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            columns: Arc::new(ColumnIndex::new(names)),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.position(name).is_some()
    }

    /// Look up a column; `None` on a missing name or out-of-range index.
    pub fn get<K: RecordKey>(&self, key: K) -> Option<&Value> {
        key.position(&self.columns).map(|idx| &self.values[idx])
    }

    /// Look up a column, falling back to `default` when it is missing.
    pub fn get_or<K: RecordKey>(&self, key: K, default: impl Into<Value>) -> Value {
        self.get(key).cloned().unwrap_or_else(|| default.into())
    }

    /// Look up a column, failing with `InvalidInput` when it is missing.
    pub fn try_get<K: RecordKey>(&self, key: K) -> DbResult<&Value> {
        match key.position(&self.columns) {
            Some(idx) => Ok(&self.values[idx]),
            None => Err(DbError::invalid_input(format!(
                "Record has no {}",
                key.describe()
            ))),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.columns.names().to_vec()
    }

    pub fn values(&self) -> Vec<Value> {
        self.values.clone()
    }

    pub fn items(&self) -> Vec<(String, Value)> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    /// Borrowing iterator over `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.columns.names() == other.columns.names() && self.values == other.values
    }
}

impl std::ops::Index<usize> for Record {
    type Output = Value;

    fn index(&self, idx: usize) -> &Value {
        &self.values[idx]
    }
}

impl std::ops::Index<&str> for Record {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        match self.columns.position(name) {
            Some(idx) => &self.values[idx],
            None => panic!("Record has no column '{name}'"),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Record")?;
        for (name, value) in self.iter() {
            write!(f, " {name}={value}")?;
        }
        write!(f, ">")
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
