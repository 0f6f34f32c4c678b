//! Page manifests: the components of one page, in declaration order.
//!
//! ```json
//! {
//!   "origin": "http://localhost:3000",
//!   "components": [
//!     { "kind": "db-table", "id": "a1", "props": { "sql": "select * from author", "key": "authorid" } },
//!     { "kind": "db-list", "id": "books", "props": { "sql": "select * from book", "connected": "a1:authorid" } }
//!   ]
//! }
//! ```
//!
//! Property order is kept: for a selector, `table` before `selected` is a
//! logged conflict while the reverse is rejected.

use std::path::Path;
use std::time::Duration;

use dbweave_core::{Page, PageConfig};
use dbweave_core::config::{DEFAULT_INITIAL_TRIGGER_DELAY, DEFAULT_SERVICE};
use dbweave_widgets::{Widget, WidgetKind};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{CliError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Scheme and host of the query service.
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_trigger_ms")]
    pub initial_trigger_ms: u64,
    pub components: Vec<ComponentDecl>,
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_trigger_ms() -> u64 {
    DEFAULT_INITIAL_TRIGGER_DELAY.as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentDecl {
    pub kind: WidgetKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub props: Map<String, Value>,
}

impl ComponentDecl {
    /// Properties as `(name, value)` text pairs. Non-string JSON values are
    /// written out as JSON.
    #[must_use]
    pub fn props(&self) -> Vec<(&str, String)> {
        self.props
            .iter()
            .map(|(name, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.as_str(), text)
            })
            .collect()
    }

    /// Declared id, or the one its kind derives from its properties.
    #[must_use]
    pub fn resolved_id(&self) -> Option<String> {
        if let Some(id) = self.id.as_deref().filter(|id| !id.trim().is_empty()) {
            return Some(id.to_string());
        }
        let props = self.props();
        self.kind
            .default_id(props.iter().map(|(name, value)| (*name, value.as_str())))
    }
}

/// Components attached from a manifest, plus everything that went wrong.
#[derive(Debug, Default)]
pub struct Assembly {
    pub widgets: Vec<Widget>,
    pub problems: Vec<String>,
}

impl Assembly {
    /// The widgets, or every problem as one error.
    pub fn into_result(self) -> Result<Vec<Widget>> {
        if self.problems.is_empty() {
            Ok(self.widgets)
        } else {
            Err(CliError::Rejected {
                problems: self.problems,
            })
        }
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CliError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn page_config(&self) -> PageConfig {
        PageConfig::default()
            .with_service(self.service.clone())
            .with_initial_trigger_delay(Duration::from_millis(self.initial_trigger_ms))
    }

    /// Attach and configure every component on `page`, in order.
    ///
    /// A component that cannot be attached is skipped; a property that is
    /// rejected is reported and the remaining properties still apply.
    pub fn assemble(&self, page: &Page) -> Assembly {
        let mut assembly = Assembly::default();
        for (index, decl) in self.components.iter().enumerate() {
            let Some(id) = decl.resolved_id() else {
                assembly
                    .problems
                    .push(format!("component #{index} ({}): no id", decl.kind));
                continue;
            };
            let widget = match Widget::attach(page, decl.kind, &id) {
                Ok(widget) => widget,
                Err(err) => {
                    assembly.problems.push(format!("{id}: {err}"));
                    continue;
                }
            };
            for (name, value) in decl.props() {
                if let Err(err) = widget.configure(name, &value) {
                    tracing::warn!(message = "manifest.rejected", component = %id, property = name, error = %err);
                    assembly.problems.push(format!("{id}: {err}"));
                }
            }
            assembly.widgets.push(widget);
        }
        assembly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(json: &str) -> Manifest {
        serde_json::from_str(json).expect("manifest")
    }

    #[test]
    fn defaults_fill_service_and_delay() {
        let manifest = parse(r#"{"components": []}"#);
        assert_eq!(manifest.service, "/runsql");
        assert_eq!(manifest.initial_trigger_ms, 300);
        assert_eq!(manifest.origin, None);
        assert_eq!(
            manifest.page_config().initial_trigger_delay(),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn props_keep_declaration_order() {
        let manifest = parse(
            r#"{"components": [{"kind": "db-foreign",
                "props": {"foreign": "authorid:writer", "table": "author", "selected": "form", "silent": true}}]}"#,
        );
        let decl = &manifest.components[0];
        assert_eq!(
            decl.props(),
            vec![
                ("foreign", "authorid:writer".to_string()),
                ("table", "author".to_string()),
                ("selected", "form".to_string()),
                ("silent", "true".to_string()),
            ]
        );
        assert_eq!(decl.resolved_id().as_deref(), Some("writer"));
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let result: std::result::Result<Manifest, _> =
            serde_json::from_str(r#"{"components": [{"kind": "db-chart"}]}"#);
        assert!(result.is_err());
    }
}
