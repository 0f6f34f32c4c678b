//! Filter contexts derived from a producer's value.
//!
//! A dependent appends exactly one predicate to its base statement:
//! `<base> where <field> = <integer>`. Anything that cannot be expressed in
//! that shape is an [`IntegrationFailure`], which callers treat as a silent
//! no-op rather than an error.

use serde_json::Value;
use thiserror::Error;

use crate::value::ComponentValue;

/// Why a producer value could not be turned into a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrationFailure {
    #[error("no base statement configured")]
    Unconfigured,
    #[error("base statement already carries a filter")]
    AlreadyFiltered,
    #[error("producer value has no field `{0}`")]
    MissingField(String),
    #[error("producer value `{0}` is not an integer key")]
    NotAnInteger(String),
}

/// The cached predicate linking a dependent's statement to its producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterContext {
    field: String,
    key: i64,
}

impl FilterContext {
    #[must_use]
    pub fn new(field: impl Into<String>, key: i64) -> Self {
        Self {
            field: field.into(),
            key,
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn key(&self) -> i64 {
        self.key
    }

    /// Append this filter to `base`.
    #[must_use]
    pub fn apply(&self, base: &str) -> String {
        format!("{base} where {} = {}", self.field, self.key)
    }
}

/// Whether `statement` already contains a `where` clause.
#[must_use]
pub fn has_filter(statement: &str) -> bool {
    statement
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case("where"))
}

/// Interpret a scalar as an integer key, truncating fractions.
///
/// Numbers and numeric strings qualify; `true` is 1. Non-finite values,
/// blank strings, null, arrays and objects do not.
#[must_use]
pub fn integer_key(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            n.as_f64()?
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        Value::Bool(b) => return Some(i64::from(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if !number.is_finite() {
        return None;
    }
    let truncated = number.trunc();
    // i64::MAX is not representable as f64; 2^63 is the first value out of range.
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

/// Derive the filter a dependent applies for producer value `value`.
pub fn derive_filter(
    base: &str,
    field: &str,
    value: &ComponentValue,
) -> Result<FilterContext, IntegrationFailure> {
    if has_filter(base) {
        return Err(IntegrationFailure::AlreadyFiltered);
    }
    let scalar = value
        .key_for(field)
        .ok_or_else(|| IntegrationFailure::MissingField(field.to_string()))?;
    let key =
        integer_key(scalar).ok_or_else(|| IntegrationFailure::NotAnInteger(scalar.to_string()))?;
    Ok(FilterContext::new(field, key))
}
