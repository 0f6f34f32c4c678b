//! Row sets and component values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One record: field name to scalar.
pub type Row = serde_json::Map<String, Value>;

/// Ordered result of a successful fetch. Empty is a valid, loaded state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowSet(Vec<Row>);

impl RowSet {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self(rows)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Row> {
        self.0.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Row> {
        self.0.get_mut(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.0.iter()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Index of the first row whose `field` holds integer key `key`.
    #[must_use]
    pub fn position_by_key(&self, field: &str, key: i64) -> Option<usize> {
        self.0
            .iter()
            .position(|row| row.get(field).and_then(crate::filter::integer_key) == Some(key))
    }
}

impl From<Vec<Row>> for RowSet {
    fn from(rows: Vec<Row>) -> Self {
        Self(rows)
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// What a component currently represents to its dependents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ComponentValue {
    #[default]
    Absent,
    Scalar(Value),
    Record(Row),
}

impl ComponentValue {
    /// Whether dependents must treat this value as "nothing selected".
    ///
    /// Absent, `null`, `false` and the empty string are empty. Numeric zero is
    /// a legitimate key and is not.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Scalar(Value::Null) | Self::Scalar(Value::Bool(false)) => true,
            Self::Scalar(Value::String(s)) => s.is_empty(),
            Self::Scalar(_) | Self::Record(_) => false,
        }
    }

    /// The scalar a dependent filters on.
    ///
    /// Records expose the named field; scalars are their own key.
    #[must_use]
    pub fn key_for(&self, field: &str) -> Option<&Value> {
        match self {
            Self::Absent => None,
            Self::Scalar(value) => Some(value),
            Self::Record(row) => row.get(field),
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&Row> {
        match self {
            Self::Record(row) => Some(row),
            _ => None,
        }
    }
}

impl From<Option<Value>> for ComponentValue {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Absent, Self::Scalar)
    }
}
