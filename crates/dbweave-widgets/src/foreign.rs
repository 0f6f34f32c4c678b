//! `db-foreign`: a choice among foreign-key values.
//!
//! Options come either from a statement yielding `(foreign, field)` pairs or
//! from static `values`. A selector with exactly one static value has no
//! dynamic source, so after mounting it announces itself once, late, giving
//! dependents attached after it a first value.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use dbweave_core::cascade::{FetchSequence, Fault, LoadState};
use dbweave_core::config::{flag_set, required};
use dbweave_core::{
    ComponentId, ComponentValue, ConfigError, Node, NodeCore, Page, PageError, Payload,
    ProducerSignal, QueryRequest,
};
use serde_json::Value;

use crate::error::ActionError;
use crate::fields::{FieldType, text_of};
use crate::options::{SelectOption, options_from_rows, parse_values};

pub const KIND: &str = "db-foreign";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignProp {
    /// `fk[:local]`; `local` names the value and defaults the component id.
    Foreign { key: String, local: String },
    Field(String),
    Label(String),
    Sql(String),
    Values(Vec<SelectOption>),
    Type(FieldType),
    Table(String),
    Selected(ComponentId),
    Silent(bool),
}

impl ForeignProp {
    pub fn parse(name: &str, value: &str) -> Result<Self, ConfigError> {
        Ok(match name {
            "foreign" => {
                let (key, local) = split_foreign(value)
                    .ok_or_else(|| ConfigError::invalid(name, "expected `fk[:local]`"))?;
                Self::Foreign { key, local }
            }
            "field" => Self::Field(required(name, value)?),
            "label" => Self::Label(value.to_string()),
            "sql" => Self::Sql(required(name, value)?),
            "values" => Self::Values(parse_values(name, value)?),
            "type" => Self::Type(FieldType::parse(value.trim())),
            "table" => Self::Table(required(name, value)?),
            "selected" => Self::Selected(ComponentId::new(required(name, value)?)),
            "silent" => Self::Silent(flag_set(value)),
            other => return Err(ConfigError::unknown(KIND, other)),
        })
    }
}

fn split_foreign(value: &str) -> Option<(String, String)> {
    let (key, local) = value.split_once(':').unwrap_or((value, ""));
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let local = match local.trim() {
        "" => key,
        local => local,
    };
    Some((key.to_string(), local.to_string()))
}

/// Id a selector takes when none is given: the local name of `foreign`.
#[must_use]
pub fn default_id(foreign: &str) -> Option<String> {
    split_foreign(foreign).map(|(_, local)| local)
}

#[derive(Debug)]
struct Selector {
    foreign: Option<String>,
    local: Option<String>,
    field: String,
    label: String,
    sql: Option<String>,
    ty: FieldType,
    options: Vec<SelectOption>,
    selected: Option<usize>,
    mono: bool,
    sequence: FetchSequence,
    fault: Option<Fault>,
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            foreign: None,
            local: None,
            field: String::new(),
            label: String::new(),
            sql: None,
            ty: FieldType::Number,
            options: Vec::new(),
            selected: None,
            mono: false,
            sequence: FetchSequence::default(),
            fault: None,
        }
    }
}

impl Selector {
    /// Select the option whose value equals `value`, or none.
    fn set_selected(&mut self, value: &str) {
        self.selected = self.options.iter().position(|o| o.value == value);
    }

    fn current(&self) -> Option<&SelectOption> {
        self.selected.and_then(|i| self.options.get(i))
    }
}

#[derive(Debug)]
pub struct DbForeign {
    core: NodeCore,
    this: Weak<Self>,
    state: RefCell<Selector>,
}

impl DbForeign {
    pub fn attach(page: &Page, id: impl Into<ComponentId>) -> Result<Rc<Self>, PageError> {
        let id = id.into();
        let selector = Rc::new_cyclic(|this| Self {
            core: NodeCore::new(page, id),
            this: this.clone(),
            state: RefCell::default(),
        });
        let node: Rc<dyn Node> = selector.clone();
        page.register(&node)?;
        Ok(selector)
    }

    pub fn configure(&self, prop: ForeignProp) -> Result<(), ConfigError> {
        match prop {
            ForeignProp::Foreign { key, local } => {
                let mut state = self.state.borrow_mut();
                state.foreign = Some(key);
                state.local = Some(local);
            }
            ForeignProp::Field(field) => self.state.borrow_mut().field = field,
            ForeignProp::Label(label) => self.state.borrow_mut().label = label,
            ForeignProp::Sql(sql) => self.state.borrow_mut().sql = Some(sql),
            ForeignProp::Type(ty) => self.state.borrow_mut().ty = ty,
            ForeignProp::Silent(silent) => self.core.set_silent(silent),
            ForeignProp::Values(values) => {
                let mut state = self.state.borrow_mut();
                state.mono = values.len() == 1;
                state.selected = (!values.is_empty()).then_some(0);
                state.options = values;
            }
            ForeignProp::Table(table) => {
                let this = self.this.clone();
                let wired = self.core.wire_table(table, move |_| {
                    if let Some(selector) = this.upgrade() {
                        selector.load_options();
                    }
                });
                crate::accept(&self.core, wired)?;
            }
            ForeignProp::Selected(producer) => {
                let this = self.this.clone();
                let wired = self.core.wire_selection(producer, move |_, signal| {
                    if let Some(selector) = this.upgrade() {
                        selector.follow_record(signal);
                    }
                });
                crate::accept(&self.core, wired)?;
            }
        }
        Ok(())
    }

    /// Fetch options, or schedule the late self-announcement of a
    /// single-valued selector.
    pub fn mount(&self) {
        let (has_sql, mono) = {
            let state = self.state.borrow();
            (state.sql.is_some(), state.mono)
        };
        if has_sql {
            self.load_options();
        } else if mono {
            let this = self.this.clone();
            let delay = self.core.page().config().initial_trigger_delay();
            tracing::debug!(message = "foreign.mono", component = %self.core.id(), delay_ms = delay.as_millis() as u64);
            self.core.page().schedule(delay, move || {
                if let Some(selector) = this.upgrade() {
                    selector.announce();
                }
            });
        }
    }

    /// The user picked `value`.
    pub fn choose(&self, value: &str) -> Result<(), ActionError> {
        {
            let mut state = self.state.borrow_mut();
            let idx = state
                .options
                .iter()
                .position(|o| o.value == value)
                .ok_or_else(|| ActionError::UnknownOption(value.to_string()))?;
            state.selected = Some(idx);
        }
        self.announce();
        Ok(())
    }

    fn announce(&self) {
        let field = self.state.borrow().field.clone();
        self.core.publish_scoped(Payload::field(field));
    }

    fn follow_record(&self, signal: ProducerSignal) {
        let ProducerSignal::Value(current) = signal else {
            return;
        };
        let mut state = self.state.borrow_mut();
        let wanted = current
            .as_record()
            .and_then(|row| row.get(&state.field))
            .map(text_of)
            .unwrap_or_default();
        state.set_selected(&wanted);
        tracing::debug!(
            message = "foreign.follow",
            component = %self.core.id(),
            value = %wanted,
            matched = state.selected.is_some()
        );
    }

    fn load_options(&self) {
        let (statement, ticket) = {
            let mut state = self.state.borrow_mut();
            let Some(sql) = state.sql.clone() else {
                return;
            };
            (sql, state.sequence.issue())
        };
        let this = self.this.clone();
        self.core
            .page()
            .run_query(QueryRequest::new(statement.clone()), move |result| {
                let Some(selector) = this.upgrade() else {
                    return;
                };
                let mut state = selector.state.borrow_mut();
                if !state.sequence.admit(ticket) {
                    return;
                }
                match result {
                    Ok(rows) if rows.is_empty() => {}
                    Ok(rows) => {
                        let previous = state.current().map(|o| o.value.clone());
                        let key = state.foreign.clone().unwrap_or_default();
                        let label = [state.field.clone()];
                        state.options = options_from_rows(&rows, &key, &label, true);
                        state.fault = None;
                        match previous {
                            Some(value) => state.set_selected(&value),
                            None => state.selected = Some(0),
                        }
                    }
                    Err(error) => {
                        tracing::warn!(message = "foreign.fault", component = %selector.core.id(), error = %error);
                        state.fault = Some(Fault { statement, error });
                    }
                }
            });
    }

    #[must_use]
    pub fn options(&self) -> Vec<SelectOption> {
        self.state.borrow().options.clone()
    }

    #[must_use]
    pub fn label(&self) -> String {
        crate::fields::capitalize(&self.state.borrow().label)
    }

    /// Name the chosen value is stored under, from `foreign`.
    #[must_use]
    pub fn local(&self) -> Option<String> {
        self.state.borrow().local.clone()
    }

    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        self.state.borrow().fault.clone()
    }
}

impl Node for DbForeign {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    /// The chosen option's value, typed by `type` (numeric by default).
    ///
    /// An option that does not parse as its type is passed on as text, so
    /// dependents see a malformed key rather than an empty one.
    fn value(&self) -> ComponentValue {
        let state = self.state.borrow();
        let Some(option) = state.current() else {
            return ComponentValue::Absent;
        };
        let raw = Value::String(option.value.clone());
        match state.ty.coerce(raw.clone()) {
            Value::Null => ComponentValue::Scalar(raw),
            typed => ComponentValue::Scalar(typed),
        }
    }

    fn load_state(&self) -> LoadState {
        if self.state.borrow().options.is_empty() {
            LoadState::Unloaded
        } else {
            LoadState::Loaded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbweave_core::testing::ScriptedEndpoint;
    use serde_json::json;
    use tokio::task::LocalSet;

    fn set(selector: &DbForeign, name: &str, value: &str) {
        selector
            .configure(ForeignProp::parse(name, value).expect("parse"))
            .expect("configure");
    }

    #[test]
    fn id_defaults_from_local_name() {
        assert_eq!(default_id("authorid:writer").as_deref(), Some("writer"));
        assert_eq!(default_id("authorid").as_deref(), Some("authorid"));
        assert_eq!(default_id(":x"), None);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn fetched_options_lead_with_blank() {
        let endpoint = ScriptedEndpoint::new();
        endpoint.respond(
            "select authorid, name from author",
            json!([{"authorid": 1, "name": "Hamsun"}, {"authorid": 2, "name": "Undset"}]),
        );
        let page = Page::new(endpoint);
        LocalSet::new()
            .run_until(async {
                let selector = DbForeign::attach(&page, "authorid").expect("attach");
                set(&selector, "foreign", "authorid");
                set(&selector, "field", "name");
                set(&selector, "sql", "select authorid, name from author");
                selector.mount();
                page.settle().await;

                let options = selector.options();
                assert_eq!(options.len(), 3);
                assert_eq!(options[2], SelectOption::new("2", "Undset"));
                assert!(selector.value().is_empty());

                selector.choose("2").expect("choose");
                assert_eq!(selector.value(), ComponentValue::Scalar(json!(2)));
                assert_eq!(
                    selector.choose("7"),
                    Err(ActionError::UnknownOption("7".into()))
                );
            })
            .await;
    }

    #[test]
    fn unparsable_numeric_option_stays_text() {
        let page = Page::new(ScriptedEndpoint::new());
        let selector = DbForeign::attach(&page, "genre").expect("attach");
        set(&selector, "values", "Novel:5,Weird:abc");
        assert_eq!(selector.value(), ComponentValue::Scalar(json!(5)));

        selector.choose("abc").expect("choose");
        assert_eq!(selector.value(), ComponentValue::Scalar(json!("abc")));
        assert!(!selector.value().is_empty());
    }

    #[test]
    fn text_type_keeps_string_value() {
        let page = Page::new(ScriptedEndpoint::new());
        let selector = DbForeign::attach(&page, "genre").expect("attach");
        set(&selector, "values", "Fiction:fic,Poetry:poe");
        set(&selector, "type", "text");
        assert_eq!(selector.value(), ComponentValue::Scalar(json!("fic")));
    }
}
