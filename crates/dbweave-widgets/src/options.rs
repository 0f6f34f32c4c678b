//! Option lists for foreign-key choices.

use std::cell::RefCell;
use std::rc::Rc;

use dbweave_core::{ConfigError, NodeCore, QueryRequest, RowSet};
use serde::Serialize;

use crate::fields::text_of;

/// Label of the blank option that leads fetched lists.
pub const BLANK_LABEL: &str = "..choose..";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    #[must_use]
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }

    #[must_use]
    pub fn blank() -> Self {
        Self::new("", BLANK_LABEL)
    }
}

/// Parse static `name[:value],…` choices; the value defaults to the name.
pub fn parse_values(prop: &str, value: &str) -> Result<Vec<SelectOption>, ConfigError> {
    value
        .split(',')
        .map(|entry| {
            let (name, val) = match entry.split_once(':') {
                Some((name, val)) if !val.trim().is_empty() => (name.trim(), val.trim()),
                Some((name, _)) => (name.trim(), name.trim()),
                None => (entry.trim(), entry.trim()),
            };
            if name.is_empty() {
                return Err(ConfigError::invalid(prop, format!("empty choice in `{value}`")));
            }
            Ok(SelectOption::new(val, name))
        })
        .collect()
}

/// Options built from fetched rows: value from `value_field`, label from
/// `label_fields` joined by spaces.
#[must_use]
pub fn options_from_rows(
    rows: &RowSet,
    value_field: &str,
    label_fields: &[String],
    blank: bool,
) -> Vec<SelectOption> {
    let mut options = Vec::with_capacity(rows.len() + usize::from(blank));
    if blank {
        options.push(SelectOption::blank());
    }
    options.extend(rows.iter().map(|row| {
        let value = row.get(value_field).map(text_of).unwrap_or_default();
        let label: Vec<String> = label_fields
            .iter()
            .map(|f| row.get(f).map(text_of).unwrap_or_default())
            .collect();
        SelectOption::new(value, label.join(" "))
    }));
    options
}

/// A form's `foreign` entry: `table.field[:display[+display…]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignSpec {
    pub table: String,
    pub field: String,
    pub display: Vec<String>,
}

impl ForeignSpec {
    /// Parse a comma-separated list of entries.
    pub fn parse_list(prop: &str, value: &str) -> Result<Vec<Self>, ConfigError> {
        value.split(',').map(|entry| Self::parse(prop, entry)).collect()
    }

    fn parse(prop: &str, entry: &str) -> Result<Self, ConfigError> {
        let malformed = || {
            ConfigError::invalid(prop, format!("expected `table.field[:display]`, got `{entry}`"))
        };
        let (table, rest) = entry.trim().split_once('.').ok_or_else(malformed)?;
        let (field, display) = rest.split_once(':').unwrap_or((rest, ""));
        let (table, field) = (table.trim(), field.trim());
        if table.is_empty() || field.is_empty() {
            return Err(malformed());
        }
        let display: Vec<String> = display
            .split('+')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            table: table.to_string(),
            field: field.to_string(),
            display: if display.is_empty() {
                vec![field.to_string()]
            } else {
                display
            },
        })
    }

    /// Statement fetching the choices for this entry.
    #[must_use]
    pub fn statement(&self) -> String {
        let shown = self.display.join(",");
        if self.display.len() == 1 && self.display[0] == self.field {
            format!("select {} from {} order by {shown}", self.field, self.table)
        } else {
            format!("select {}, {shown} from {} order by {shown}", self.field, self.table)
        }
    }
}

/// A foreign entry together with its fetched options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignField {
    #[serde(skip)]
    pub spec: ForeignSpec,
    pub field: String,
    pub options: Vec<SelectOption>,
}

impl ForeignField {
    fn new(spec: ForeignSpec) -> Self {
        Self {
            field: spec.field.clone(),
            spec,
            options: Vec::new(),
        }
    }
}

pub(crate) type ForeignFields = Rc<RefCell<Vec<ForeignField>>>;

/// Replace `fields` with `specs` and fetch each option list.
///
/// Empty results keep the previous options; failures are logged.
pub(crate) fn load_foreign(core: &NodeCore, fields: &ForeignFields, specs: Vec<ForeignSpec>, blank: bool) {
    *fields.borrow_mut() = specs.into_iter().map(ForeignField::new).collect();
    let statements: Vec<String> = fields.borrow().iter().map(|f| f.spec.statement()).collect();
    for (idx, statement) in statements.into_iter().enumerate() {
        let fields = Rc::clone(fields);
        let id = core.id().clone();
        core.page().run_query(QueryRequest::new(statement), move |result| match result {
            Ok(rows) if rows.is_empty() => {}
            Ok(rows) => {
                if let Some(entry) = fields.borrow_mut().get_mut(idx) {
                    entry.options =
                        options_from_rows(&rows, &entry.spec.field, &entry.spec.display, blank);
                }
            }
            Err(err) => {
                tracing::warn!(message = "options.fault", component = %id, error = %err);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbweave_core::testing::rows;
    use serde_json::json;

    #[test]
    fn static_values_default_to_name() {
        let opts = parse_values("values", "fiction:1, poetry , drama:").expect("values");
        assert_eq!(
            opts,
            vec![
                SelectOption::new("1", "fiction"),
                SelectOption::new("poetry", "poetry"),
                SelectOption::new("drama", "drama"),
            ]
        );
        assert!(parse_values("values", "a,,b").is_err());
    }

    #[test]
    fn foreign_spec_statement() {
        let specs = ForeignSpec::parse_list("foreign", "author.authorid:first+last").expect("parse");
        assert_eq!(specs[0].display, vec!["first".to_string(), "last".to_string()]);
        assert_eq!(
            specs[0].statement(),
            "select authorid, first,last from author order by first,last"
        );

        let plain = ForeignSpec::parse_list("foreign", "genre.genreid").expect("parse");
        assert_eq!(plain[0].statement(), "select genreid from genre order by genreid");
        assert!(ForeignSpec::parse_list("foreign", "authorid").is_err());
    }

    #[test]
    fn rows_become_options() {
        let fetched = rows(json!([
            {"authorid": 1, "first": "Knut", "last": "Hamsun"},
            {"authorid": 2, "first": "Sigrid", "last": "Undset"}
        ]));
        let opts = options_from_rows(&fetched, "authorid", &["first".into(), "last".into()], true);
        assert_eq!(opts[0], SelectOption::blank());
        assert_eq!(opts[2], SelectOption::new("2", "Sigrid Undset"));
    }
}
