//! `db-insert`: a form that inserts one record per save.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use dbweave_core::cascade::{Fault, LoadState};
use dbweave_core::config::{flag_set, required};
use dbweave_core::{
    ComponentId, ComponentValue, ConfigError, Mutation, Node, NodeCore, Page, PageError, Payload,
    ProducerRef, ProducerSignal, QueryRequest, Row,
};
use serde_json::Value;

use crate::error::ActionError;
use crate::fields::{FieldSpec, FieldType, parse_fields};
use crate::options::{ForeignField, ForeignFields, ForeignSpec, load_foreign};
use crate::statement;

pub const KIND: &str = "db-insert";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertProp {
    Table(String),
    Fields(Vec<FieldSpec>),
    Foreign(Vec<ForeignSpec>),
    Connected(ProducerRef),
    Silent(bool),
}

impl InsertProp {
    pub fn parse(name: &str, value: &str) -> Result<Self, ConfigError> {
        Ok(match name {
            "table" => Self::Table(required(name, value)?),
            "fields" => Self::Fields(parse_fields(name, value)?),
            "foreign" => Self::Foreign(ForeignSpec::parse_list(name, value)?),
            "connected" => Self::Connected(value.parse()?),
            "silent" => Self::Silent(flag_set(value)),
            other => return Err(ConfigError::unknown(KIND, other)),
        })
    }
}

#[derive(Debug)]
struct Form {
    table: Option<String>,
    fields: Vec<FieldSpec>,
    /// Read-only `field = value` contributed by the producer.
    fixed: Option<(String, Value)>,
    valid: bool,
    fault: Option<Fault>,
}

impl Default for Form {
    fn default() -> Self {
        Self {
            table: None,
            fields: Vec::new(),
            fixed: None,
            valid: true,
            fault: None,
        }
    }
}

#[derive(Debug)]
pub struct DbInsert {
    core: NodeCore,
    this: Weak<Self>,
    form: RefCell<Form>,
    foreign: ForeignFields,
}

impl DbInsert {
    pub fn attach(page: &Page, id: impl Into<ComponentId>) -> Result<Rc<Self>, PageError> {
        let id = id.into();
        let form = Rc::new_cyclic(|this| Self {
            core: NodeCore::new(page, id),
            this: this.clone(),
            form: RefCell::default(),
            foreign: ForeignFields::default(),
        });
        let node: Rc<dyn Node> = form.clone();
        page.register(&node)?;
        Ok(form)
    }

    pub fn configure(&self, prop: InsertProp) -> Result<(), ConfigError> {
        match prop {
            InsertProp::Table(table) => self.form.borrow_mut().table = Some(table),
            InsertProp::Fields(fields) => self.form.borrow_mut().fields = fields,
            InsertProp::Silent(silent) => self.core.set_silent(silent),
            InsertProp::Foreign(specs) => load_foreign(&self.core, &self.foreign, specs, false),
            InsertProp::Connected(producer) => {
                let field = producer.field().to_string();
                let this = self.this.clone();
                let wired = self.core.wire_producer(producer, move |_, signal| {
                    if let Some(form) = this.upgrade() {
                        form.follow(&field, signal);
                    }
                });
                crate::accept(&self.core, wired)?;
            }
        }
        Ok(())
    }

    /// Nothing to load; option lists were requested during configuration.
    pub fn mount(&self) {}

    fn follow(&self, field: &str, signal: ProducerSignal) {
        match signal {
            ProducerSignal::Value(value) => {
                let fixed = value.key_for(field).cloned().unwrap_or(Value::Null);
                let mut form = self.form.borrow_mut();
                form.fixed = Some((field.to_string(), fixed));
                form.valid = true;
            }
            ProducerSignal::Empty => {
                {
                    let mut form = self.form.borrow_mut();
                    form.fixed = None;
                    form.valid = false;
                }
                tracing::debug!(message = "form.invalid", component = %self.core.id());
                self.core.publish_scoped(Payload::changed());
            }
        }
    }

    /// Insert a record from `input` (raw values by field name).
    ///
    /// Missing inputs are sent as blank. The producer's fixed field, when
    /// present, overrides any input of the same name.
    pub fn save(&self, input: &Row) -> Result<(), ActionError> {
        let (table, request) = {
            let form = self.form.borrow();
            if !form.valid {
                let producer = self
                    .core
                    .wiring()
                    .producer()
                    .map(|p| p.producer().to_string())
                    .unwrap_or_default();
                return Err(ActionError::Invalid(producer));
            }
            let table = form.table.clone().ok_or(ActionError::Unconfigured("table"))?;

            let mut names: Vec<String> = Vec::new();
            let mut data = Row::new();
            for field in form.fields.iter().filter(|f| f.is_editable()) {
                let raw = input.get(&field.name).cloned().unwrap_or_else(|| Value::String(String::new()));
                data.insert(field.name.clone(), field.ty.coerce(raw));
                names.push(field.name.clone());
            }
            for foreign in self.foreign.borrow().iter() {
                let raw = input.get(&foreign.field).cloned().unwrap_or(Value::Null);
                data.insert(foreign.field.clone(), FieldType::Number.coerce(raw));
                names.push(foreign.field.clone());
            }
            if let Some((field, value)) = &form.fixed {
                if !names.contains(field) {
                    names.push(field.clone());
                }
                data.insert(field.clone(), value.clone());
            }
            if names.is_empty() {
                return Err(ActionError::Unconfigured("fields"));
            }
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let statement = statement::insert(&table, &names);
            (table, QueryRequest::new(statement).with_parameters(data))
        };

        let this = self.this.clone();
        let statement = request.statement.clone();
        self.core.page().run_query(request, move |result| {
            let Some(me) = this.upgrade() else {
                return;
            };
            match result {
                Ok(_) => {
                    me.form.borrow_mut().fault = None;
                    me.core.announce(&table, Mutation::Insert);
                }
                Err(error) => {
                    tracing::warn!(message = "form.save_failed", component = %me.core.id(), error = %error);
                    me.form.borrow_mut().fault = Some(Fault { statement, error });
                }
            }
        });
        Ok(())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.form.borrow().valid
    }

    /// The producer-supplied field, if any.
    #[must_use]
    pub fn fixed(&self) -> Option<(String, Value)> {
        self.form.borrow().fixed.clone()
    }

    #[must_use]
    pub fn foreign_options(&self) -> Vec<ForeignField> {
        self.foreign.borrow().clone()
    }

    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        self.form.borrow().fault.clone()
    }
}

impl Node for DbInsert {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn value(&self) -> ComponentValue {
        ComponentValue::Absent
    }

    fn load_state(&self) -> LoadState {
        if self.form.borrow().valid {
            LoadState::Loaded
        } else {
            LoadState::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbweave_core::testing::ScriptedEndpoint;
    use dbweave_core::{Channel, Envelope};
    use serde_json::json;
    use tokio::task::LocalSet;

    fn input(value: Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn save_inserts_and_announces() {
        let endpoint = ScriptedEndpoint::new();
        let page = Page::new(endpoint.clone());
        LocalSet::new()
            .run_until(async {
                let form = DbInsert::attach(&page, "author-form").expect("attach");
                form.configure(InsertProp::parse("table", "author").expect("parse"))
                    .expect("table");
                form.configure(InsertProp::parse("fields", "name,born:number").expect("parse"))
                    .expect("fields");
                let notices = Rc::new(RefCell::new(Vec::<Envelope>::new()));
                let sink = Rc::clone(&notices);
                let _sub = page.bus().subscribe(Channel::Global, move |e| {
                    sink.borrow_mut().push(e.clone());
                });

                form.save(&input(json!({"name": "Hamsun", "born": "1859"})))
                    .expect("save");
                page.settle().await;

                let notices = notices.borrow();
                assert_eq!(notices.len(), 1);
                assert_eq!(notices[0].mutation_kind(), Some(Mutation::Insert));
                assert_eq!(notices[0].sig(), Some(form.core().signature()));
            })
            .await;

        let requests = endpoint.requests();
        let request = &requests[0];
        assert_eq!(
            request.statement,
            "insert into author (name,born) values ($[name],$[born])"
        );
        assert_eq!(
            request.parameters,
            Some(input(json!({"name": "Hamsun", "born": 1859})))
        );
    }

    #[test]
    fn producer_empty_invalidates_form() {
        let page = Page::new(ScriptedEndpoint::new());
        let form = DbInsert::attach(&page, "book-form").expect("attach");
        form.configure(InsertProp::parse("table", "book").expect("parse"))
            .expect("table");
        form.follow("authorid", ProducerSignal::Value(ComponentValue::Scalar(json!(3))));
        assert_eq!(form.fixed(), Some(("authorid".to_string(), json!(3))));

        form.follow("authorid", ProducerSignal::Empty);
        assert!(!form.is_valid());
        assert_eq!(form.load_state(), LoadState::Empty);
        assert!(matches!(form.save(&Row::new()), Err(ActionError::Invalid(_))));
    }
}
