#![forbid(unsafe_code)]

//! Database-backed page components built on `dbweave-core`.
//!
//! | Kind | Tag | Value |
//! |------|-----|-------|
//! | [`DbTable`] | `db-table` | key of the selected row |
//! | [`DbList`] | `db-list` | none |
//! | [`DbForeign`] | `db-foreign` | chosen option |
//! | [`DbInsert`] | `db-insert` | none |
//! | [`DbUpdate`] | `db-update` | shown record |
//!
//! Each kind parses its properties once, from `(name, value)` pairs, into a
//! typed property enum; [`Widget`] dispatches on the kind tag for callers
//! that assemble pages from markup-like descriptions.

pub mod error;
pub mod fields;
pub mod foreign;
pub mod insert;
pub mod list;
pub mod options;
pub mod statement;
pub mod table;
pub mod update;

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use dbweave_core::cascade::{Fault, LoadState};
use dbweave_core::{ComponentValue, ConfigError, Node, NodeCore, Page, PageError, WiringError};
use serde::{Deserialize, Serialize};

pub use error::ActionError;
pub use fields::{Cell, FieldSpec, FieldType};
pub use foreign::{DbForeign, ForeignProp};
pub use insert::{DbInsert, InsertProp};
pub use list::{DbList, ListProp};
pub use options::{ForeignSpec, SelectOption};
pub use table::{DbTable, TableProp};
pub use update::{DbUpdate, UpdateProp};

/// Record a rejected wiring declaration on `core` and hand it back as a
/// configuration error.
pub(crate) fn accept(core: &NodeCore, wired: Result<(), WiringError>) -> Result<(), ConfigError> {
    match wired {
        Ok(()) => Ok(()),
        Err(err) => {
            core.record(Err(err.clone()));
            Err(err.into())
        }
    }
}

/// Component kind, named by its markup tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WidgetKind {
    #[serde(rename = "db-table")]
    Table,
    #[serde(rename = "db-list")]
    List,
    #[serde(rename = "db-foreign")]
    Foreign,
    #[serde(rename = "db-insert")]
    Insert,
    #[serde(rename = "db-update")]
    Update,
}

impl WidgetKind {
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Table => table::KIND,
            Self::List => list::KIND,
            Self::Foreign => foreign::KIND,
            Self::Insert => insert::KIND,
            Self::Update => update::KIND,
        }
    }

    /// Id to use when a declaration names none. Only selectors have one,
    /// derived from their `foreign` property.
    #[must_use]
    pub fn default_id<'a>(self, props: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<String> {
        if self != Self::Foreign {
            return None;
        }
        props
            .into_iter()
            .find(|(name, _)| *name == "foreign")
            .and_then(|(_, value)| foreign::default_id(value))
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown component kind `{}`", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for WidgetKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Table, Self::List, Self::Foreign, Self::Insert, Self::Update]
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Any attached component.
#[derive(Debug, Clone)]
pub enum Widget {
    Table(Rc<DbTable>),
    List(Rc<DbList>),
    Foreign(Rc<DbForeign>),
    Insert(Rc<DbInsert>),
    Update(Rc<DbUpdate>),
}

impl Widget {
    /// Create a component of `kind` and register it on `page` under `id`.
    pub fn attach(page: &Page, kind: WidgetKind, id: &str) -> Result<Self, PageError> {
        Ok(match kind {
            WidgetKind::Table => Self::Table(DbTable::attach(page, id)?),
            WidgetKind::List => Self::List(DbList::attach(page, id)?),
            WidgetKind::Foreign => Self::Foreign(DbForeign::attach(page, id)?),
            WidgetKind::Insert => Self::Insert(DbInsert::attach(page, id)?),
            WidgetKind::Update => Self::Update(DbUpdate::attach(page, id)?),
        })
    }

    /// Parse and apply one property.
    pub fn configure(&self, name: &str, value: &str) -> Result<(), ConfigError> {
        match self {
            Self::Table(w) => w.configure(TableProp::parse(name, value)?),
            Self::List(w) => w.configure(ListProp::parse(name, value)?),
            Self::Foreign(w) => w.configure(ForeignProp::parse(name, value)?),
            Self::Insert(w) => w.configure(InsertProp::parse(name, value)?),
            Self::Update(w) => w.configure(UpdateProp::parse(name, value)?),
        }
    }

    /// Start loading, once every property is applied.
    pub fn mount(&self) {
        match self {
            Self::Table(w) => w.mount(),
            Self::List(w) => w.mount(),
            Self::Foreign(w) => w.mount(),
            Self::Insert(w) => w.mount(),
            Self::Update(w) => w.mount(),
        }
    }

    #[must_use]
    pub fn node(&self) -> &dyn Node {
        match self {
            Self::Table(w) => &**w,
            Self::List(w) => &**w,
            Self::Foreign(w) => &**w,
            Self::Insert(w) => &**w,
            Self::Update(w) => &**w,
        }
    }

    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        match self {
            Self::Table(w) => w.fault(),
            Self::List(w) => w.fault(),
            Self::Foreign(w) => w.fault(),
            Self::Insert(w) => w.fault(),
            Self::Update(w) => w.fault(),
        }
    }

    fn rows(&self) -> usize {
        match self {
            Self::Table(w) => w.row_count(),
            Self::List(w) => w.row_count(),
            Self::Foreign(w) => w.options().len(),
            Self::Insert(_) => 0,
            Self::Update(w) => w.row_count(),
        }
    }

    /// Serializable summary of the component's current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let node = self.node();
        let core = node.core();
        Snapshot {
            id: core.id().to_string(),
            kind: node.kind(),
            state: node.load_state(),
            value: node.value(),
            rows: self.rows(),
            silent: core.is_silent(),
            fault: self.fault().map(|f| format!("{}: {}", f.statement, f.error)),
            diagnostics: core.diagnostics().iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: String,
    pub kind: &'static str,
    pub state: LoadState,
    pub value: ComponentValue,
    pub rows: usize,
    pub silent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}
