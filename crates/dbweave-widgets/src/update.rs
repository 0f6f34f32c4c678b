//! `db-update`: browse and edit the records of one table.
//!
//! The form loads `select <key>,<fields>,<foreign> from <table> order by
//! <key>` and shows one record at a time. Its value is the shown record.
//! Connected to a producer, it shows the record whose key equals the
//! producer's value instead of offering navigation.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use dbweave_core::cascade::{FetchSequence, Fault, LoadState};
use dbweave_core::config::{flag_set, required};
use dbweave_core::filter::integer_key;
use dbweave_core::{
    ComponentId, ComponentValue, ConfigError, Envelope, Mutation, Node, NodeCore, Page, PageError,
    Payload, ProducerRef, ProducerSignal, QueryRequest, Row, RowSet,
};
use serde_json::Value;

use crate::error::ActionError;
use crate::fields::{FieldSpec, FieldType, parse_fields};
use crate::options::{ForeignField, ForeignFields, ForeignSpec, load_foreign};
use crate::statement;

pub const KIND: &str = "db-update";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateProp {
    Table(String),
    Key(String),
    Fields(Vec<FieldSpec>),
    Foreign(Vec<ForeignSpec>),
    Update(String),
    Connected(ProducerRef),
    Silent(bool),
}

impl UpdateProp {
    pub fn parse(name: &str, value: &str) -> Result<Self, ConfigError> {
        Ok(match name {
            "table" => Self::Table(required(name, value)?),
            "key" => Self::Key(required(name, value)?),
            "fields" => Self::Fields(parse_fields(name, value)?),
            "foreign" => Self::Foreign(ForeignSpec::parse_list(name, value)?),
            "update" => Self::Update(required(name, value)?),
            "connected" => Self::Connected(value.parse()?),
            "silent" => Self::Silent(flag_set(value)),
            other => return Err(ConfigError::unknown(KIND, other)),
        })
    }
}

#[derive(Debug)]
struct Records {
    table: Option<String>,
    key: Option<String>,
    fields: Vec<FieldSpec>,
    update: Option<String>,
    rows: RowSet,
    idx: Option<usize>,
    valid: bool,
    sequence: FetchSequence,
    fault: Option<Fault>,
}

impl Default for Records {
    fn default() -> Self {
        Self {
            table: None,
            key: None,
            fields: Vec::new(),
            update: None,
            rows: RowSet::default(),
            idx: Some(0),
            valid: true,
            sequence: FetchSequence::default(),
            fault: None,
        }
    }
}

impl Records {
    fn current(&self) -> Option<&Row> {
        self.idx.and_then(|i| self.rows.get(i))
    }

    /// Step one record forward or back, wrapping around.
    fn step(&mut self, forward: bool) -> Result<(), ActionError> {
        let len = self.rows.len();
        if len == 0 {
            return Err(ActionError::NoRecord);
        }
        let idx = self.idx.unwrap_or(0);
        self.idx = Some(if forward { (idx + 1) % len } else { (idx + len - 1) % len });
        Ok(())
    }
}

#[derive(Debug)]
pub struct DbUpdate {
    core: NodeCore,
    this: Weak<Self>,
    records: RefCell<Records>,
    foreign: ForeignFields,
}

impl DbUpdate {
    pub fn attach(page: &Page, id: impl Into<ComponentId>) -> Result<Rc<Self>, PageError> {
        let id = id.into();
        let form = Rc::new_cyclic(|this| Self {
            core: NodeCore::new(page, id),
            this: this.clone(),
            records: RefCell::default(),
            foreign: ForeignFields::default(),
        });
        let node: Rc<dyn Node> = form.clone();
        page.register(&node)?;
        Ok(form)
    }

    pub fn configure(&self, prop: UpdateProp) -> Result<(), ConfigError> {
        match prop {
            UpdateProp::Table(table) => self.records.borrow_mut().table = Some(table),
            UpdateProp::Key(key) => self.records.borrow_mut().key = Some(key),
            UpdateProp::Fields(fields) => self.records.borrow_mut().fields = fields,
            UpdateProp::Silent(silent) => self.core.set_silent(silent),
            UpdateProp::Foreign(specs) => load_foreign(&self.core, &self.foreign, specs, true),
            UpdateProp::Update(table) => {
                let this = self.this.clone();
                let wired = self.core.wire_table(table.clone(), move |_| {
                    if let Some(form) = this.upgrade() {
                        form.reload();
                    }
                });
                crate::accept(&self.core, wired)?;
                self.records.borrow_mut().update = Some(table);
            }
            UpdateProp::Connected(producer) => {
                let field = producer.field().to_string();
                let this = self.this.clone();
                let wired = self.core.wire_producer(producer, move |envelope, signal| {
                    if let Some(form) = this.upgrade() {
                        form.follow(envelope, &field, signal);
                    }
                });
                crate::accept(&self.core, wired)?;
            }
        }
        Ok(())
    }

    pub fn mount(&self) {
        self.reload();
    }

    /// Re-read every record of the table.
    pub fn reload(&self) {
        let (statement, ticket) = {
            let mut records = self.records.borrow_mut();
            let (Some(table), Some(key)) = (records.table.clone(), records.key.clone()) else {
                return;
            };
            let fields: Vec<&str> = records.fields.iter().map(|f| f.name.as_str()).collect();
            let foreign: Vec<String> = self.foreign.borrow().iter().map(|f| f.field.clone()).collect();
            let foreign: Vec<&str> = foreign.iter().map(String::as_str).collect();
            let statement = statement::select_records(&table, &key, &fields, &foreign);
            (statement, records.sequence.issue())
        };
        let this = self.this.clone();
        self.core
            .page()
            .run_query(QueryRequest::new(statement.clone()), move |result| {
                let Some(form) = this.upgrade() else {
                    return;
                };
                let shown = {
                    let mut records = form.records.borrow_mut();
                    if !records.sequence.admit(ticket) {
                        return;
                    }
                    match result {
                        Ok(rows) if rows.is_empty() => false,
                        Ok(rows) => {
                            let len = rows.len();
                            records.rows = rows;
                            records.fault = None;
                            if records.idx.is_some_and(|i| i >= len) {
                                records.idx = Some(0);
                            }
                            true
                        }
                        Err(error) => {
                            tracing::warn!(message = "form.load_failed", component = %form.core.id(), error = %error);
                            records.fault = Some(Fault { statement, error });
                            false
                        }
                    }
                };
                if shown {
                    form.show();
                }
            });
    }

    /// Announce the shown record, if any.
    fn show(&self) -> bool {
        {
            let mut records = self.records.borrow_mut();
            if records.current().is_none() {
                return false;
            }
            records.valid = true;
        }
        self.core.publish_scoped(Payload::changed());
        true
    }

    fn follow(&self, envelope: &Envelope, field: &str, signal: ProducerSignal) {
        let table = self.records.borrow().table.clone();
        if table.is_some() && envelope.table() == table.as_deref() {
            self.reload();
            return;
        }
        match signal {
            ProducerSignal::Value(value) => {
                let Some(wanted) = value.key_for(field).and_then(integer_key) else {
                    return;
                };
                let found = {
                    let mut records = self.records.borrow_mut();
                    let Some(key) = records.key.clone() else {
                        return;
                    };
                    let found = records.rows.position_by_key(&key, wanted);
                    if found.is_some() {
                        records.idx = found;
                    }
                    found
                };
                if found.is_some() {
                    self.show();
                }
            }
            ProducerSignal::Empty => {
                {
                    let mut records = self.records.borrow_mut();
                    records.valid = false;
                    records.idx = None;
                }
                tracing::debug!(message = "form.invalid", component = %self.core.id());
                self.core.publish_scoped(Payload::changed());
            }
        }
    }

    pub fn next(&self) -> Result<(), ActionError> {
        self.navigate(true)
    }

    pub fn prev(&self) -> Result<(), ActionError> {
        self.navigate(false)
    }

    fn navigate(&self, forward: bool) -> Result<(), ActionError> {
        if self.core.wiring().producer().is_some() {
            return Err(ActionError::NavigationDisabled);
        }
        self.records.borrow_mut().step(forward)?;
        self.show();
        Ok(())
    }

    /// Write `edits` to the shown record.
    ///
    /// Fields without an edit keep their current value. The key and ignored
    /// fields are never written.
    pub fn save(&self, edits: &Row) -> Result<(), ActionError> {
        let (table, key, key_int, request) = {
            let records = self.records.borrow();
            if records.update.is_none() {
                return Err(ActionError::ReadOnly);
            }
            let table = records.table.clone().ok_or(ActionError::Unconfigured("table"))?;
            let key = records.key.clone().ok_or(ActionError::Unconfigured("key"))?;
            let idx = records.idx.ok_or(ActionError::NoRecord)?;

            let mut typed: Vec<(String, FieldType)> = records
                .fields
                .iter()
                .filter(|f| f.is_editable() && f.name != key)
                .map(|f| (f.name.clone(), f.ty.clone()))
                .collect();
            typed.extend(
                self.foreign
                    .borrow()
                    .iter()
                    .map(|f| (f.field.clone(), FieldType::Number)),
            );

            let current = records.rows.get(idx).ok_or(ActionError::NoRecord)?;
            let key_value = current.get(&key).cloned().unwrap_or(Value::Null);
            let key_int = integer_key(&key_value)
                .ok_or_else(|| ActionError::KeyNotInteger(key_value.to_string()))?;

            let mut data = Row::new();
            for (name, ty) in &typed {
                let value = match edits.get(name) {
                    Some(edit) => ty.coerce(edit.clone()),
                    None => current.get(name).cloned().unwrap_or(Value::Null),
                };
                data.insert(name.clone(), value);
            }
            if typed.is_empty() {
                return Err(ActionError::Unconfigured("fields"));
            }
            let names: Vec<&str> = typed.iter().map(|(n, _)| n.as_str()).collect();
            let statement = statement::update(&table, &names, &key, key_int);
            (table, key, key_int, QueryRequest::new(statement).with_parameters(data))
        };

        let this = self.this.clone();
        let statement = request.statement.clone();
        let written = request.parameters.clone().unwrap_or_default();
        self.core.page().run_query(request, move |result| {
            let Some(me) = this.upgrade() else {
                return;
            };
            match result {
                Ok(_) => {
                    {
                        // The rows may have been reloaded while the write was
                        // in flight; find the record again by its key.
                        let mut records = me.records.borrow_mut();
                        records.fault = None;
                        let at = records.rows.position_by_key(&key, key_int);
                        if let Some(row) = at.and_then(|i| records.rows.get_mut(i)) {
                            row.extend(written);
                        }
                    }
                    me.core.announce(&table, Mutation::Update);
                    me.show();
                }
                Err(error) => {
                    tracing::warn!(message = "form.save_failed", component = %me.core.id(), error = %error);
                    me.records.borrow_mut().fault = Some(Fault { statement, error });
                }
            }
        });
        Ok(())
    }

    /// Zero-based index of the shown record.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        self.records.borrow().idx
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.records.borrow().rows.len()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.records.borrow().valid
    }

    #[must_use]
    pub fn foreign_options(&self) -> Vec<ForeignField> {
        self.foreign.borrow().clone()
    }

    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        self.records.borrow().fault.clone()
    }
}

impl Node for DbUpdate {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn value(&self) -> ComponentValue {
        self.records
            .borrow()
            .current()
            .cloned()
            .map_or(ComponentValue::Absent, ComponentValue::Record)
    }

    fn load_state(&self) -> LoadState {
        let records = self.records.borrow();
        if !records.valid {
            LoadState::Empty
        } else if records.rows.is_empty() {
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

    const SELECT: &str = "select authorid,name,born from author order by authorid";

    fn scripted() -> ScriptedEndpoint {
        let endpoint = ScriptedEndpoint::new();
        endpoint.respond(
            SELECT,
            json!([
                {"authorid": 1, "name": "Hamsun", "born": 1859},
                {"authorid": 2, "name": "Undset", "born": 1882},
                {"authorid": 3, "name": "Ibsen", "born": 1828}
            ]),
        );
        endpoint
    }

    fn configured(page: &Page, extra: &[(&str, &str)]) -> Rc<DbUpdate> {
        let form = DbUpdate::attach(page, "author-edit").expect("attach");
        let base = [
            ("table", "author"),
            ("key", "authorid"),
            ("fields", "name,born:number"),
        ];
        for (name, value) in base.iter().chain(extra) {
            form.configure(UpdateProp::parse(name, value).expect("parse"))
                .expect("configure");
        }
        form
    }

    fn name_of(form: &DbUpdate) -> Option<Value> {
        form.value().as_record().and_then(|r| r.get("name").cloned())
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn navigation_wraps_around() {
        let page = Page::new(scripted());
        LocalSet::new()
            .run_until(async {
                let form = configured(&page, &[]);
                form.mount();
                page.settle().await;
                assert_eq!(name_of(&form), Some(json!("Hamsun")));

                form.prev().expect("prev");
                assert_eq!(name_of(&form), Some(json!("Ibsen")));
                form.next().expect("next");
                form.next().expect("next");
                assert_eq!(form.position(), Some(1));
                assert_eq!(form.save(&Row::new()), Err(ActionError::ReadOnly));
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn save_updates_shown_record_and_announces() {
        let endpoint = scripted();
        let page = Page::new(endpoint.clone());
        LocalSet::new()
            .run_until(async {
                let form = configured(&page, &[("update", "author")]);
                form.mount();
                page.settle().await;
                form.next().expect("next");

                let edits = json!({"name": "Sigrid Undset"}).as_object().cloned().expect("object");
                form.save(&edits).expect("save");
                page.settle().await;
                assert_eq!(name_of(&form), Some(json!("Undset")));
            })
            .await;

        let update = endpoint
            .requests()
            .into_iter()
            .find(|r| r.statement.starts_with("update"))
            .expect("update issued");
        assert_eq!(
            update.statement,
            "update author set name=$[name],born=$[born] where authorid = 2"
        );
        assert_eq!(
            update.parameters,
            json!({"name": "Sigrid Undset", "born": 1882}).as_object().cloned()
        );
        assert_eq!(endpoint.count(SELECT), 2);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn failed_save_keeps_shown_record() {
        let endpoint = scripted();
        endpoint.fail(
            "update author set name=$[name],born=$[born] where authorid = 1",
            "permission denied",
        );
        let page = Page::new(endpoint.clone());
        LocalSet::new()
            .run_until(async {
                let form = configured(&page, &[("update", "author")]);
                form.mount();
                page.settle().await;

                let edits = json!({"name": "Nobody"}).as_object().cloned().expect("object");
                form.save(&edits).expect("save");
                assert_eq!(name_of(&form), Some(json!("Hamsun")));
                page.settle().await;

                assert!(form.fault().is_some());
                assert_eq!(name_of(&form), Some(json!("Hamsun")));
                assert_eq!(endpoint.count(SELECT), 1);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn connected_form_follows_producer_key() {
        let page = Page::new(scripted());
        LocalSet::new()
            .run_until(async {
                let form = configured(&page, &[("connected", "a1:authorid")]);
                form.mount();
                page.settle().await;
                assert_eq!(form.next(), Err(ActionError::NavigationDisabled));

                let producer = NodeCore::new(&page, ComponentId::new("a1"));
                let signal = ProducerSignal::Value(ComponentValue::Scalar(json!("3")));
                let envelope = Envelope::notice(producer.id().clone(), Payload::row(2));
                form.follow(&envelope, "authorid", signal);
                assert_eq!(name_of(&form), Some(json!("Ibsen")));

                form.follow(&envelope, "authorid", ProducerSignal::Empty);
                assert_eq!(form.value(), ComponentValue::Absent);
                assert_eq!(form.load_state(), LoadState::Empty);
            })
            .await;
    }
}
