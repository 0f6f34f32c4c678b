//! Field lists (`name[:type[:label]],…`) and per-type value handling.

use std::fmt;

use dbweave_core::ConfigError;
use serde::Serialize;
use serde_json::{Number, Value};

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Money,
    Int,
    Date,
    Boolean,
    Checkbox,
    /// Fetched with the record but never edited; used by foreign selectors.
    Ignore,
    Other(String),
}

impl FieldType {
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            "" | "text" => Self::Text,
            "number" => Self::Number,
            "money" => Self::Money,
            "int" => Self::Int,
            "date" => Self::Date,
            "boolean" => Self::Boolean,
            "checkbox" => Self::Checkbox,
            "ignore" => Self::Ignore,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Money => "money",
            Self::Int => "int",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Checkbox => "checkbox",
            Self::Ignore => "ignore",
            Self::Other(tag) => tag,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Self::Number | Self::Money | Self::Int)
    }

    /// Turn raw form input into the value sent as a statement parameter.
    ///
    /// Numeric fields send `null` for blank or unparsable input; checkbox and
    /// boolean fields send a bool. Non-string input is passed through.
    #[must_use]
    pub fn coerce(&self, input: Value) -> Value {
        let Value::String(raw) = input else {
            return input;
        };
        if self.is_numeric() {
            return raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(number)
                .map_or(Value::Null, Value::Number);
        }
        match self {
            Self::Checkbox | Self::Boolean => Value::Bool(matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "on" | "1" | "yes" | "checked"
            )),
            _ => Value::String(raw),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn number(n: f64) -> Option<Number> {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Some(Number::from(n as i64))
    } else {
        Number::from_f64(n)
    }
}

/// One entry of a `fields` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    label: Option<String>,
}

impl FieldSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            label: None,
        }
    }

    /// Text shown next to the input, capitalized.
    #[must_use]
    pub fn label(&self) -> String {
        capitalize(self.label.as_deref().unwrap_or(&self.name))
    }

    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.ty != FieldType::Ignore
    }
}

/// Parse `name[:type[:label]],…`.
pub fn parse_fields(prop: &str, value: &str) -> Result<Vec<FieldSpec>, ConfigError> {
    value
        .split(',')
        .map(|entry| {
            let mut parts = entry.split(':').map(str::trim);
            let name = parts.next().unwrap_or_default();
            if name.is_empty() {
                return Err(ConfigError::invalid(prop, format!("empty field name in `{value}`")));
            }
            let ty = FieldType::parse(parts.next().unwrap_or_default());
            let label = parts.next().filter(|l| !l.is_empty()).map(str::to_string);
            Ok(FieldSpec {
                name: name.to_string(),
                ty,
                label,
            })
        })
        .collect()
}

pub(crate) fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A cell ready for display: CSS-style class and text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub class: String,
    pub text: String,
}

impl Cell {
    fn new(class: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            text: text.into(),
        }
    }
}

/// Display text for `value` in a column of type `ty`.
#[must_use]
pub fn format_cell(ty: &FieldType, value: Option<&Value>) -> Cell {
    let value = value.unwrap_or(&Value::Null);
    match ty {
        FieldType::Boolean => {
            if truthy(value) {
                Cell::new("true", "✓")
            } else {
                Cell::new("false", "✗")
            }
        }
        FieldType::Number => Cell::new("number", numeric(value).map_or("NaN".into(), plain)),
        FieldType::Money => Cell::new(
            "number",
            numeric(value).map_or("NaN".into(), |n| format!("{n:.2}")),
        ),
        FieldType::Int => Cell::new(
            "number",
            numeric(value).map_or("NaN".into(), |n| plain(n.trunc())),
        ),
        FieldType::Date => Cell::new("date", date_part(value)),
        other => Cell::new(other.as_str(), text_of(value)),
    }
}

/// Text of a scalar, with `null` as blank.
#[must_use]
pub fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Date portion of an ISO timestamp.
#[must_use]
pub fn date_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.split('T').next().unwrap_or_default().to_string(),
        other => text_of(other),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn plain(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_field_lists() {
        let fields = parse_fields("fields", "authorid:int, name, born:date:Year of birth").expect("fields");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], FieldSpec::new("authorid", FieldType::Int));
        assert_eq!(fields[1].ty, FieldType::Text);
        assert_eq!(fields[1].label(), "Name");
        assert_eq!(fields[2].label(), "Year of birth");
        assert!(parse_fields("fields", "a,,b").is_err());
    }

    #[test]
    fn formats_cells_like_the_table_renders_them() {
        assert_eq!(format_cell(&FieldType::Boolean, Some(&json!(1))).text, "✓");
        assert_eq!(format_cell(&FieldType::Boolean, None).class, "false");
        assert_eq!(format_cell(&FieldType::Money, Some(&json!("12.5"))).text, "12.50");
        assert_eq!(format_cell(&FieldType::Int, Some(&json!(7.9))).text, "7");
        assert_eq!(format_cell(&FieldType::Number, Some(&json!("abc"))).text, "NaN");
        assert_eq!(
            format_cell(&FieldType::Date, Some(&json!("1952-03-01T00:00:00.000Z"))).text,
            "1952-03-01"
        );
        assert_eq!(format_cell(&FieldType::Text, Some(&Value::Null)).text, "");
        assert_eq!(
            format_cell(&FieldType::Other("email".into()), Some(&json!("a@b.no"))),
            Cell::new("email", "a@b.no")
        );
    }

    #[test]
    fn coerces_form_input() {
        assert_eq!(FieldType::Number.coerce(json!("")), Value::Null);
        assert_eq!(FieldType::Number.coerce(json!("42")), json!(42));
        assert_eq!(FieldType::Money.coerce(json!("9.95")), json!(9.95));
        assert_eq!(FieldType::Checkbox.coerce(json!("on")), json!(true));
        assert_eq!(FieldType::Checkbox.coerce(json!("")), json!(false));
        assert_eq!(FieldType::Text.coerce(json!("Hamsun")), json!("Hamsun"));
        assert_eq!(FieldType::Int.coerce(json!(3)), json!(3));
    }
}
