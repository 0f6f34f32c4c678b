//! Dependency declarations between components.
//!
//! A component may depend on:
//!
//! - a **producer** (`connected = "<producerId>:<fieldName>"`): it listens on
//!   the producer's scoped channel and derives a filter from the producer's
//!   current value;
//! - a **selection producer** (`selected = "<producerId>"`): same channel,
//!   but the value picks an option instead of filtering a statement;
//! - a **table** (`update` / `table = "<name>"`): it listens on the global
//!   channel for notices about that table.
//!
//! # Invariants
//!
//! 1. Every producer edge is recorded in the page's [`DependencyGraph`];
//!    an edge that would close a cycle is rejected before any listener is
//!    registered.
//! 2. A global listener never acts on a non-mutation envelope whose source
//!    is its own component. Mutation notices pass regardless of source.
//! 3. A component holding both a table watch and a selection producer obeys
//!    the selection only. Declaring the table after the selection is
//!    rejected; declaring it before is accepted but shadowed, with a
//!    conflict diagnostic.
//! 4. Delivery from a producer that is not (or no longer) registered is a
//!    no-op.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use ahash::AHashMap;
use thiserror::Error;

use crate::bus::Channel;
use crate::envelope::Envelope;
use crate::id::ComponentId;
use crate::node::NodeCore;
use crate::page::WeakPage;
use crate::value::ComponentValue;

/// Rejected dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    #[error("malformed dependency `{0}`, expected `producer:field`")]
    Malformed(String),

    #[error("component `{0}` cannot depend on itself")]
    SelfDependency(ComponentId),

    #[error("wiring `{producer}` -> `{dependent}` closes the cycle {cycle}")]
    Cycle {
        producer: ComponentId,
        dependent: ComponentId,
        cycle: String,
    },

    #[error("component `{id}` already declares `{what}`")]
    AlreadyWired { id: ComponentId, what: &'static str },

    #[error("component `{id}` watches table `{table}` and follows selection `{producer}`; the selection wins")]
    Conflict {
        id: ComponentId,
        table: String,
        producer: ComponentId,
    },
}

/// A `producer:field` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerRef {
    producer: ComponentId,
    field: String,
}

impl ProducerRef {
    #[must_use]
    pub fn new(producer: impl Into<ComponentId>, field: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            field: field.into(),
        }
    }

    #[must_use]
    pub fn producer(&self) -> &ComponentId {
        &self.producer
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl FromStr for ProducerRef {
    type Err = WiringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || WiringError::Malformed(s.to_string());
        let (producer, field) = s.split_once(':').ok_or_else(malformed)?;
        let (producer, field) = (producer.trim(), field.trim());
        if producer.is_empty() || field.is_empty() {
            return Err(malformed());
        }
        Ok(Self::new(producer, field))
    }
}

impl fmt::Display for ProducerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.producer, self.field)
    }
}

/// The dependencies one component has declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wiring {
    producer: Option<ProducerRef>,
    selection: Option<ComponentId>,
    table: Option<String>,
}

impl Wiring {
    #[must_use]
    pub fn producer(&self) -> Option<&ProducerRef> {
        self.producer.as_ref()
    }

    #[must_use]
    pub fn selection(&self) -> Option<&ComponentId> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Whether a producer drives this component's contents.
    #[must_use]
    pub fn is_producer_bound(&self) -> bool {
        self.producer.is_some() || self.selection.is_some()
    }
}

/// What a dependent learns from its producer on each scoped notice.
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerSignal {
    Value(ComponentValue),
    Empty,
}

impl From<ComponentValue> for ProducerSignal {
    fn from(value: ComponentValue) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Value(value)
        }
    }
}

/// Producer-to-dependent edges of one page.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    dependents: AHashMap<ComponentId, Vec<ComponentId>>,
}

impl DependencyGraph {
    /// Add `producer -> dependent` unless it would close a cycle.
    pub fn link(&mut self, producer: &ComponentId, dependent: &ComponentId) -> Result<(), WiringError> {
        if producer == dependent {
            return Err(WiringError::SelfDependency(dependent.clone()));
        }
        if let Some(path) = self.path(dependent, producer) {
            let mut cycle: Vec<&str> = path.iter().map(ComponentId::as_str).collect();
            cycle.push(dependent.as_str());
            return Err(WiringError::Cycle {
                producer: producer.clone(),
                dependent: dependent.clone(),
                cycle: cycle.join(" -> "),
            });
        }
        let edges = self.dependents.entry(producer.clone()).or_default();
        if !edges.contains(dependent) {
            edges.push(dependent.clone());
        }
        Ok(())
    }

    /// Shortest chain of edges leading from `from` to `to`, both included.
    #[must_use]
    pub fn path(&self, from: &ComponentId, to: &ComponentId) -> Option<Vec<ComponentId>> {
        let mut came_from: AHashMap<&ComponentId, &ComponentId> = AHashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![node.clone()];
                let mut cursor = node;
                while let Some(prev) = came_from.get(cursor) {
                    path.push((*prev).clone());
                    cursor = *prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.dependents_of(node.as_str()) {
                if next != from && !came_from.contains_key(next) {
                    came_from.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    #[must_use]
    pub fn dependents_of(&self, producer: &str) -> &[ComponentId] {
        self.dependents.get(producer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop every edge into `dependent`.
    pub fn remove_dependent(&mut self, dependent: &str) {
        self.dependents.retain(|_, edges| {
            edges.retain(|d| d.as_str() != dependent);
            !edges.is_empty()
        });
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.dependents.values().map(Vec::len).sum()
    }
}

impl NodeCore {
    /// Follow `producer`'s scoped channel and filter on its value.
    ///
    /// `on_signal` receives every notice from the producer together with the
    /// producer's value at delivery time.
    pub fn wire_producer(
        &self,
        producer: ProducerRef,
        on_signal: impl Fn(&Envelope, ProducerSignal) + 'static,
    ) -> Result<(), WiringError> {
        if self.wiring.borrow().producer.is_some() {
            return Err(WiringError::AlreadyWired {
                id: self.id().clone(),
                what: "connected",
            });
        }
        self.follow(producer.producer(), on_signal)?;
        tracing::debug!(message = "wiring.producer", component = %self.id(), producer = %producer);
        self.wiring.borrow_mut().producer = Some(producer);
        Ok(())
    }

    /// Follow `producer`'s scoped channel to pick a selection from its value.
    ///
    /// An earlier table watch stays registered but is shadowed from now on.
    pub fn wire_selection(
        &self,
        producer: ComponentId,
        on_signal: impl Fn(&Envelope, ProducerSignal) + 'static,
    ) -> Result<(), WiringError> {
        if self.wiring.borrow().selection.is_some() {
            return Err(WiringError::AlreadyWired {
                id: self.id().clone(),
                what: "selected",
            });
        }
        self.follow(&producer, on_signal)?;
        let table = self.wiring.borrow().table.clone();
        if let Some(table) = table {
            let conflict = WiringError::Conflict {
                id: self.id().clone(),
                table,
                producer: producer.clone(),
            };
            tracing::warn!(message = "wiring.conflict", component = %self.id(), error = %conflict);
            self.push_diagnostic(conflict);
        }
        tracing::debug!(message = "wiring.selection", component = %self.id(), producer = %producer);
        self.wiring.borrow_mut().selection = Some(producer);
        Ok(())
    }

    /// Watch the global channel for notices about `table`.
    pub fn wire_table(
        &self,
        table: impl Into<String>,
        on_change: impl Fn(&Envelope) + 'static,
    ) -> Result<(), WiringError> {
        let table = table.into();
        {
            let wiring = self.wiring.borrow();
            if wiring.table.is_some() {
                return Err(WiringError::AlreadyWired {
                    id: self.id().clone(),
                    what: "table",
                });
            }
            if let Some(producer) = &wiring.selection {
                return Err(WiringError::Conflict {
                    id: self.id().clone(),
                    table,
                    producer: producer.clone(),
                });
            }
        }

        let own = self.id().clone();
        let wiring = Rc::clone(&self.wiring);
        let watched = table.clone();
        let subscription = self.page().bus().subscribe(Channel::Global, move |envelope| {
            if envelope.table() != Some(watched.as_str()) {
                return;
            }
            if envelope.source() == &own && !envelope.is_mutation() {
                tracing::trace!(message = "wiring.self_suppressed", component = %own, table = %watched);
                return;
            }
            if wiring.borrow().selection.is_some() {
                tracing::trace!(message = "wiring.shadowed", component = %own, table = %watched);
                return;
            }
            on_change(envelope);
        });
        self.hold(subscription);
        tracing::debug!(message = "wiring.table", component = %self.id(), table = %table);
        self.wiring.borrow_mut().table = Some(table);
        Ok(())
    }

    fn follow(
        &self,
        producer: &ComponentId,
        on_signal: impl Fn(&Envelope, ProducerSignal) + 'static,
    ) -> Result<(), WiringError> {
        self.page().link(producer, self.id())?;

        let own = self.id().clone();
        let page: WeakPage = self.page().downgrade();
        let subscription = self
            .page()
            .bus()
            .subscribe(Channel::Scoped(producer.clone()), move |envelope| {
                if envelope.source() == &own && !envelope.is_mutation() {
                    return;
                }
                let Some(page) = page.upgrade() else {
                    return;
                };
                let Some(node) = page.lookup(envelope.source().as_str()) else {
                    tracing::trace!(
                        message = "wiring.unknown_producer",
                        component = %own,
                        producer = %envelope.source()
                    );
                    return;
                };
                let signal = ProducerSignal::from(node.value());
                on_signal(envelope, signal);
            });
        self.hold(subscription);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Mutation, Payload};
    use crate::page::Page;
    use crate::testing::ScriptedEndpoint;
    use std::cell::RefCell;

    fn id(s: &str) -> ComponentId {
        ComponentId::new(s)
    }

    #[test]
    fn producer_ref_parses_and_rejects() {
        let r: ProducerRef = "author-table:authorid".parse().expect("parse");
        assert_eq!(r.producer(), "author-table");
        assert_eq!(r.field(), "authorid");
        assert_eq!(r.to_string(), "author-table:authorid");

        for bad in ["author-table", ":authorid", "author-table:", ""] {
            assert!(matches!(
                bad.parse::<ProducerRef>(),
                Err(WiringError::Malformed(_))
            ));
        }
    }

    #[test]
    fn graph_rejects_cycles_and_self_edges() {
        let mut graph = DependencyGraph::default();
        graph.link(&id("a"), &id("b")).expect("a->b");
        graph.link(&id("b"), &id("c")).expect("b->c");
        assert_eq!(
            graph.link(&id("c"), &id("a")),
            Err(WiringError::Cycle {
                producer: id("c"),
                dependent: id("a"),
                cycle: "a -> b -> c -> a".to_string(),
            })
        );
        assert_eq!(
            graph.link(&id("a"), &id("a")),
            Err(WiringError::SelfDependency(id("a")))
        );
        assert_eq!(graph.edge_count(), 2);

        graph.remove_dependent("b");
        assert!(graph.dependents_of("a").is_empty());
        graph.link(&id("c"), &id("a")).expect("no cycle after removal");
    }

    #[test]
    fn duplicate_edges_are_collapsed() {
        let mut graph = DependencyGraph::default();
        graph.link(&id("a"), &id("b")).expect("first");
        graph.link(&id("a"), &id("b")).expect("second");
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn table_watch_ignores_own_notices_but_not_own_mutations() {
        let page = Page::new(ScriptedEndpoint::new());
        let core = NodeCore::new(&page, id("t1"));
        let hits = Rc::new(RefCell::new(0));
        let h = Rc::clone(&hits);
        core.wire_table("author", move |_| *h.borrow_mut() += 1)
            .expect("wire");

        core.publish_global(Payload::table("author"));
        assert_eq!(*hits.borrow(), 0);

        core.announce("author", Mutation::Update);
        assert_eq!(*hits.borrow(), 1);

        let other = NodeCore::new(&page, id("t2"));
        other.publish_global(Payload::table("author"));
        other.publish_global(Payload::table("book"));
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn table_after_selection_is_a_conflict() {
        let page = Page::new(ScriptedEndpoint::new());
        let core = NodeCore::new(&page, id("f1"));
        core.wire_selection(id("form"), |_, _| {}).expect("selection");
        assert_eq!(
            core.wire_table("author", |_| {}),
            Err(WiringError::Conflict {
                id: id("f1"),
                table: "author".to_string(),
                producer: id("form"),
            })
        );
        assert_eq!(core.wiring().table(), None);
    }

    #[test]
    fn selection_after_table_shadows_the_watch() {
        let page = Page::new(ScriptedEndpoint::new());
        let core = NodeCore::new(&page, id("f1"));
        let hits = Rc::new(RefCell::new(0));
        let h = Rc::clone(&hits);
        core.wire_table("author", move |_| *h.borrow_mut() += 1)
            .expect("table");
        core.wire_selection(id("form"), |_, _| {}).expect("selection");
        assert!(matches!(
            core.diagnostics().as_slice(),
            [WiringError::Conflict { .. }]
        ));

        let other = NodeCore::new(&page, id("t2"));
        other.announce("author", Mutation::Insert);
        assert_eq!(*hits.borrow(), 0);
    }

    #[test]
    fn second_producer_declaration_is_rejected() {
        let page = Page::new(ScriptedEndpoint::new());
        let core = NodeCore::new(&page, id("b1"));
        core.wire_producer(ProducerRef::new("a1", "authorid"), |_, _| {})
            .expect("first");
        assert!(matches!(
            core.wire_producer(ProducerRef::new("a2", "authorid"), |_, _| {}),
            Err(WiringError::AlreadyWired { what: "connected", .. })
        ));
        assert_eq!(core.subscription_count(), 1);
    }

    #[test]
    fn cycle_leaves_no_listener_behind() {
        let page = Page::new(ScriptedEndpoint::new());
        let a = NodeCore::new(&page, id("a"));
        let b = NodeCore::new(&page, id("b"));
        b.wire_producer(ProducerRef::new("a", "k"), |_, _| {})
            .expect("b follows a");
        let err = a
            .wire_producer(ProducerRef::new("b", "k"), |_, _| {})
            .expect_err("cycle");
        assert!(matches!(err, WiringError::Cycle { .. }));
        assert_eq!(a.subscription_count(), 0);
        assert!(a.wiring().producer().is_none());
    }

    #[test]
    fn empty_values_become_empty_signal() {
        assert_eq!(
            ProducerSignal::from(ComponentValue::Absent),
            ProducerSignal::Empty
        );
        assert_eq!(
            ProducerSignal::from(ComponentValue::Scalar(serde_json::json!(0))),
            ProducerSignal::Value(ComponentValue::Scalar(serde_json::json!(0)))
        );
    }
}
