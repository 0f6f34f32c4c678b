//! `db-list`: a pure view that repeats a template for every row.

use std::cell::{RefCell, RefMut};
use std::rc::{Rc, Weak};

use dbweave_core::cascade::{self, Fault, LoadState, RowView, ViewHost};
use dbweave_core::config::{flag_set, required};
use dbweave_core::{
    ComponentId, ComponentValue, ConfigError, Node, NodeCore, Page, PageError, ProducerRef,
    QueryRequest, Row,
};
use serde_json::Value;

use crate::fields::text_of;

pub const KIND: &str = "db-list";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListProp {
    Sql(String),
    Connected(ProducerRef),
    Update(String),
    Silent(bool),
    Service(String),
    Template(String),
}

impl ListProp {
    pub fn parse(name: &str, value: &str) -> Result<Self, ConfigError> {
        Ok(match name {
            "sql" => Self::Sql(required(name, value)?),
            "connected" => Self::Connected(value.parse()?),
            "update" => Self::Update(required(name, value)?),
            "silent" => Self::Silent(flag_set(value)),
            "service" => Self::Service(required(name, value)?),
            "template" => Self::Template(value.to_string()),
            other => return Err(ConfigError::unknown(KIND, other)),
        })
    }
}

#[derive(Debug)]
pub struct DbList {
    core: NodeCore,
    this: Weak<Self>,
    view: RefCell<RowView>,
    service: RefCell<Option<String>>,
    template: RefCell<Option<String>>,
}

impl DbList {
    pub fn attach(page: &Page, id: impl Into<ComponentId>) -> Result<Rc<Self>, PageError> {
        let id = id.into();
        let list = Rc::new_cyclic(|this| Self {
            core: NodeCore::new(page, id),
            this: this.clone(),
            view: RefCell::default(),
            service: RefCell::default(),
            template: RefCell::default(),
        });
        let node: Rc<dyn Node> = list.clone();
        page.register(&node)?;
        Ok(list)
    }

    pub fn configure(&self, prop: ListProp) -> Result<(), ConfigError> {
        match prop {
            ListProp::Sql(sql) => self.view.borrow_mut().set_base(sql),
            ListProp::Silent(silent) => self.core.set_silent(silent),
            ListProp::Service(service) => *self.service.borrow_mut() = Some(service),
            ListProp::Template(template) => *self.template.borrow_mut() = Some(template),
            ListProp::Connected(producer) => {
                let field = producer.field().to_string();
                let this = self.this.clone();
                let wired = self.core.wire_producer(producer, move |_, signal| {
                    if let Some(list) = this.upgrade() {
                        cascade::react_to_producer(&*list, &field, &signal);
                    }
                });
                crate::accept(&self.core, wired)?;
            }
            ListProp::Update(table) => {
                let this = self.this.clone();
                let wired = self.core.wire_table(table, move |_| {
                    if let Some(list) = this.upgrade() {
                        cascade::react_to_table_change(&*list);
                    }
                });
                crate::accept(&self.core, wired)?;
            }
        }
        Ok(())
    }

    pub fn mount(&self) {
        let bound = self.core.wiring().is_producer_bound();
        if !bound {
            cascade::load(self);
        }
    }

    /// The template filled once per row. Without a template, each row is
    /// rendered as compact JSON.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let template = self.template.borrow();
        let view = self.view.borrow();
        view.rows()
            .iter()
            .map(|row| match template.as_deref() {
                Some(template) => fill(template, row),
                None => Value::Object(row.clone()).to_string(),
            })
            .collect()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.view.borrow().rows().len()
    }

    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        self.view.borrow().fault().cloned()
    }
}

/// Replace every `${name}` with the row's value; missing or blank values
/// become `#name`.
#[must_use]
pub fn fill(template: &str, row: &Row) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let name = &rest[start + 2..start + 2 + len];
        out.push_str(&rest[..start]);
        match row.get(name).map(text_of).filter(|t| !t.is_empty()) {
            Some(text) => out.push_str(&text),
            None => {
                out.push('#');
                out.push_str(name);
            }
        }
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    out
}

impl Node for DbList {
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
        self.view.borrow().state()
    }
}

impl ViewHost for DbList {
    fn view(&self) -> RefMut<'_, RowView> {
        self.view.borrow_mut()
    }

    fn this(&self) -> Weak<Self> {
        self.this.clone()
    }

    fn request(&self, statement: String) -> QueryRequest {
        let request = QueryRequest::new(statement);
        match self.service.borrow().as_deref() {
            Some(service) => request.with_service(service),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbweave_core::testing::ScriptedEndpoint;
    use proptest::prelude::*;
    use serde_json::json;
    use tokio::task::LocalSet;

    proptest! {
        #[test]
        fn text_without_placeholders_is_unchanged(text in "[^$]{0,40}") {
            prop_assert_eq!(fill(&text, &Row::new()), text);
        }
    }

    #[test]
    fn fill_substitutes_and_marks_missing() {
        let row = json!({"title": "Sult", "year": 1890, "isbn": null})
            .as_object()
            .cloned()
            .expect("object");
        assert_eq!(
            fill("<b>${title}</b> (${year}) ${isbn} ${x", &row),
            "<b>Sult</b> (1890) #isbn ${x"
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn service_override_is_carried_in_requests() {
        let endpoint = ScriptedEndpoint::new();
        endpoint.respond("select * from book", json!([{"title": "Sult"}]));
        let page = Page::new(endpoint.clone());
        LocalSet::new()
            .run_until(async {
                let list = DbList::attach(&page, "books").expect("attach");
                for (name, value) in [
                    ("sql", "select * from book"),
                    ("service", "/reports/runsql"),
                    ("template", "${title}"),
                ] {
                    list.configure(ListProp::parse(name, value).expect("parse"))
                        .expect("configure");
                }
                list.mount();
                page.settle().await;
                assert_eq!(list.render(), vec!["Sult".to_string()]);
                assert_eq!(list.value(), ComponentValue::Absent);
            })
            .await;
        assert_eq!(
            endpoint.requests()[0].service.as_deref(),
            Some("/reports/runsql")
        );
    }
}
