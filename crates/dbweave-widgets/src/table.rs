//! `db-table`: the rows of a statement, one of which may be selected.
//!
//! The table's value is the `key` column of the selected row. Every applied
//! fetch clears the selection and republishes, so dependents re-derive
//! (usually into Empty) whenever the table reloads.

use std::cell::{RefCell, RefMut};
use std::rc::{Rc, Weak};

use dbweave_core::cascade::{self, Fault, LoadState, RowView, ViewHost};
use dbweave_core::config::{flag_set, required};
use dbweave_core::{
    ComponentId, ComponentValue, ConfigError, Mutation, Node, NodeCore, Page, PageError, Payload,
    ProducerRef, QueryRequest,
};

use crate::error::ActionError;
use crate::fields::{Cell, FieldSpec, format_cell, parse_fields};
use crate::statement;

pub const KIND: &str = "db-table";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableProp {
    Sql(String),
    Fields(Vec<FieldSpec>),
    Key(String),
    Connected(ProducerRef),
    Update(String),
    Delete(String),
    Silent(bool),
}

impl TableProp {
    pub fn parse(name: &str, value: &str) -> Result<Self, ConfigError> {
        Ok(match name {
            "sql" => Self::Sql(required(name, value)?),
            "fields" => Self::Fields(parse_fields(name, value)?),
            "key" => Self::Key(required(name, value)?),
            "connected" => Self::Connected(value.parse()?),
            "update" => Self::Update(required(name, value)?),
            "delete" => Self::Delete(required(name, value)?),
            "silent" => Self::Silent(flag_set(value)),
            other => return Err(ConfigError::unknown(KIND, other)),
        })
    }
}

#[derive(Debug, Default)]
struct Layout {
    fields: Vec<FieldSpec>,
    key: Option<String>,
    delete: Option<String>,
    selected: Option<usize>,
}

#[derive(Debug)]
pub struct DbTable {
    core: NodeCore,
    this: Weak<Self>,
    view: RefCell<RowView>,
    layout: RefCell<Layout>,
}

impl DbTable {
    pub fn attach(page: &Page, id: impl Into<ComponentId>) -> Result<Rc<Self>, PageError> {
        let id = id.into();
        let table = Rc::new_cyclic(|this| Self {
            core: NodeCore::new(page, id),
            this: this.clone(),
            view: RefCell::default(),
            layout: RefCell::default(),
        });
        let node: Rc<dyn Node> = table.clone();
        page.register(&node)?;
        Ok(table)
    }

    pub fn configure(&self, prop: TableProp) -> Result<(), ConfigError> {
        match prop {
            TableProp::Sql(sql) => self.view.borrow_mut().set_base(sql),
            TableProp::Fields(fields) => self.layout.borrow_mut().fields = fields,
            TableProp::Key(key) => self.layout.borrow_mut().key = Some(key),
            TableProp::Delete(table) => self.layout.borrow_mut().delete = Some(table),
            TableProp::Silent(silent) => self.core.set_silent(silent),
            TableProp::Connected(producer) => {
                let field = producer.field().to_string();
                let this = self.this.clone();
                let wired = self.core.wire_producer(producer, move |_, signal| {
                    if let Some(table) = this.upgrade() {
                        cascade::react_to_producer(&*table, &field, &signal);
                    }
                });
                crate::accept(&self.core, wired)?;
            }
            TableProp::Update(table) => {
                let this = self.this.clone();
                let wired = self.core.wire_table(table, move |_| {
                    if let Some(table) = this.upgrade() {
                        cascade::react_to_table_change(&*table);
                    }
                });
                crate::accept(&self.core, wired)?;
            }
        }
        Ok(())
    }

    /// Initial load. A connected table waits for its producer instead.
    pub fn mount(&self) {
        let bound = self.core.wiring().is_producer_bound();
        if !bound {
            cascade::load(self);
        }
    }

    /// Select `row` and announce it to dependents.
    pub fn select_row(&self, row: usize) -> Result<(), ActionError> {
        if row >= self.view.borrow().rows().len() {
            return Err(ActionError::NoSuchRow(row));
        }
        self.layout.borrow_mut().selected = Some(row);
        tracing::debug!(message = "table.select", component = %self.core.id(), row);
        self.core.publish_scoped(Payload::row(row));
        Ok(())
    }

    #[must_use]
    pub fn selected(&self) -> Option<usize> {
        self.layout.borrow().selected
    }

    /// Delete the rows whose first field is one of `keys` from the `delete`
    /// table, then announce the deletion.
    pub fn delete_checked(&self, keys: &[i64]) -> Result<(), ActionError> {
        let (table, leader) = {
            let layout = self.layout.borrow();
            let table = layout.delete.clone().ok_or(ActionError::Unconfigured("delete"))?;
            let leader = layout
                .fields
                .first()
                .map(|f| f.name.clone())
                .ok_or(ActionError::Unconfigured("fields"))?;
            (table, leader)
        };
        if keys.is_empty() {
            return Ok(());
        }
        let statement = statement::delete_in(&table, &leader, keys);
        let this = self.this.clone();
        let request = QueryRequest::new(statement.clone()).with_parameters(Default::default());
        self.core.page().run_query(request, move |result| {
            let Some(me) = this.upgrade() else {
                return;
            };
            match result {
                Ok(_) => me.core.announce(&table, Mutation::Delete),
                Err(err) => {
                    tracing::warn!(message = "table.delete_failed", component = %me.core.id(), error = %err);
                    me.view.borrow_mut().record_fault(&statement, err);
                }
            }
        });
        Ok(())
    }

    /// Display cells of every row, one per declared field.
    #[must_use]
    pub fn cells(&self) -> Vec<Vec<Cell>> {
        let layout = self.layout.borrow();
        let view = self.view.borrow();
        view.rows()
            .iter()
            .map(|row| {
                layout
                    .fields
                    .iter()
                    .map(|f| format_cell(&f.ty, row.get(&f.name)))
                    .collect()
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

impl Node for DbTable {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn value(&self) -> ComponentValue {
        let layout = self.layout.borrow();
        let (Some(idx), Some(key)) = (layout.selected, layout.key.as_deref()) else {
            return ComponentValue::Absent;
        };
        let view = self.view.borrow();
        view.rows()
            .get(idx)
            .and_then(|row| row.get(key))
            .cloned()
            .into()
    }

    fn load_state(&self) -> LoadState {
        self.view.borrow().state()
    }
}

impl ViewHost for DbTable {
    fn view(&self) -> RefMut<'_, RowView> {
        self.view.borrow_mut()
    }

    fn this(&self) -> Weak<Self> {
        self.this.clone()
    }

    fn on_loaded(&self) {
        self.layout.borrow_mut().selected = None;
    }

    fn on_emptied(&self) {
        self.layout.borrow_mut().selected = None;
    }
}
