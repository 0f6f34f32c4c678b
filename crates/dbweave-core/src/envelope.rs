//! Event envelopes carried on the bus.
//!
//! An [`Envelope`] is immutable once built. Components never build one
//! directly; they hand a [`Payload`] to their node, which stamps the source
//! (and, for mutations, the signature) before publishing.
//!
//! Serialized form mirrors the page-level event detail:
//! `{source, table?, row?, field?, sig?, insert?: true, delete?: true}`.

use serde::Serialize;

use crate::id::{ComponentId, Signature};

/// Kind of store mutation announced on the global channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    Insert,
    Update,
    Delete,
}

impl Mutation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// The component-supplied part of an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub table: Option<String>,
    pub row: Option<usize>,
    pub field: Option<String>,
}

impl Payload {
    /// A bare "my value changed" notice.
    #[must_use]
    pub fn changed() -> Self {
        Self::default()
    }

    /// Notice carrying the index of the row the user selected.
    #[must_use]
    pub fn row(row: usize) -> Self {
        Self {
            row: Some(row),
            ..Self::default()
        }
    }

    /// Notice carrying the field whose value the user changed.
    #[must_use]
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::default()
        }
    }

    /// Non-mutation notice naming a table.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    source: ComponentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<Signature>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    insert: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    delete: bool,
}

impl Envelope {
    /// Wrap a payload published by `source`.
    #[must_use]
    pub fn notice(source: ComponentId, payload: Payload) -> Self {
        Self {
            source,
            table: payload.table,
            row: payload.row,
            field: payload.field,
            sig: None,
            insert: false,
            delete: false,
        }
    }

    /// Table-mutation notice. Always carries the mutator's signature.
    #[must_use]
    pub fn mutation(sig: &Signature, table: impl Into<String>, kind: Mutation) -> Self {
        Self {
            source: sig.id().clone(),
            table: Some(table.into()),
            row: None,
            field: None,
            sig: Some(sig.clone()),
            insert: kind == Mutation::Insert,
            delete: kind == Mutation::Delete,
        }
    }

    #[must_use]
    pub fn source(&self) -> &ComponentId {
        &self.source
    }

    #[must_use]
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    #[must_use]
    pub fn row(&self) -> Option<usize> {
        self.row
    }

    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    #[must_use]
    pub fn sig(&self) -> Option<&Signature> {
        self.sig.as_ref()
    }

    /// Mutation kind, if this envelope announces a store mutation.
    ///
    /// A signed envelope naming a table is a mutation; the insert/delete flags
    /// pick the kind and their absence means a plain update.
    #[must_use]
    pub fn mutation_kind(&self) -> Option<Mutation> {
        if self.sig.is_none() || self.table.is_none() {
            return None;
        }
        Some(if self.insert {
            Mutation::Insert
        } else if self.delete {
            Mutation::Delete
        } else {
            Mutation::Update
        })
    }

    #[must_use]
    pub fn is_mutation(&self) -> bool {
        self.mutation_kind().is_some()
    }
}
