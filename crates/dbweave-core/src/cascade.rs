//! Invalidation cascade: how a data view reacts to its dependencies.
//!
//! [`RowView`] is the pure state machine (base statement, cached filter,
//! rows, load state, fault, fetch sequence). The free functions drive it for
//! any component implementing [`ViewHost`]: they issue the remote fetch,
//! apply the response, and republish on the component's scoped channel.
//!
//! # State machine
//!
//! ```text
//!   Unloaded ──fetch ok──▶ Loaded ──fetch ok──▶ Loaded
//!      │                    │  ▲
//!      └──producer empty──▶ Empty ─producer value, fetch ok─┘
//! ```
//!
//! # Invariants
//!
//! 1. Rows are replaced only by an admitted response; a response whose
//!    ticket is not newer than the last applied one is discarded.
//! 2. Entering Empty clears rows and the filter, issues no fetch, and
//!    supersedes every in-flight fetch.
//! 3. Every applied response and every Empty transition is republished.
//! 4. A remote failure is recorded on the component and never cascades.
//! 5. No `RowView` borrow is held while publishing.

use std::cell::RefMut;
use std::rc::Weak;

use serde::Serialize;

use crate::endpoint::{QueryError, QueryRequest};
use crate::envelope::Payload;
use crate::filter::{self, FilterContext, IntegrationFailure};
use crate::node::Node;
use crate::value::RowSet;
use crate::wiring::ProducerSignal;

/// Load state of a data view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    #[default]
    Unloaded,
    Loaded,
    Empty,
}

/// Identifies one issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// Monotonic fetch numbering for one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSequence {
    issued: u64,
    applied: u64,
}

impl FetchSequence {
    pub fn issue(&mut self) -> FetchTicket {
        self.issued += 1;
        FetchTicket(self.issued)
    }

    /// Accept `ticket` if it is newer than everything applied so far.
    pub fn admit(&mut self, ticket: FetchTicket) -> bool {
        if ticket.0 > self.applied {
            self.applied = ticket.0;
            true
        } else {
            false
        }
    }

    /// Treat every issued fetch as stale.
    pub fn supersede(&mut self) {
        self.applied = self.issued;
    }

    #[must_use]
    pub fn pending(&self) -> bool {
        self.issued > self.applied
    }
}

/// A remote failure recorded on the originating component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub statement: String,
    #[serde(serialize_with = "display")]
    pub error: QueryError,
}

fn display<S: serde::Serializer>(error: &QueryError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// What a dependency notice asks the view to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeStep {
    Refetch(String),
    GoEmpty,
    Ignore(IntegrationFailure),
}

/// Outcome of applying a fetch response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Stale,
    Faulted,
}

#[derive(Debug, Default)]
pub struct RowView {
    base: Option<String>,
    filter: Option<FilterContext>,
    rows: RowSet,
    state: LoadState,
    fault: Option<Fault>,
    sequence: FetchSequence,
}

impl RowView {
    pub fn set_base(&mut self, statement: impl Into<String>) {
        self.base = Some(statement.into());
    }

    #[must_use]
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    #[must_use]
    pub fn filter(&self) -> Option<&FilterContext> {
        self.filter.as_ref()
    }

    #[must_use]
    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut RowSet {
        &mut self.rows
    }

    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    #[must_use]
    pub fn fetch_pending(&self) -> bool {
        self.sequence.pending()
    }

    /// React to a producer notice carrying `signal`, filtering on `field`.
    pub fn on_producer(&mut self, field: &str, signal: &ProducerSignal) -> CascadeStep {
        let value = match signal {
            ProducerSignal::Empty => {
                self.enter_empty();
                return CascadeStep::GoEmpty;
            }
            ProducerSignal::Value(value) => value,
        };
        let Some(base) = self.base.as_deref() else {
            return CascadeStep::Ignore(IntegrationFailure::Unconfigured);
        };
        match filter::derive_filter(base, field, value) {
            Ok(filter) => {
                let statement = filter.apply(base);
                self.filter = Some(filter);
                CascadeStep::Refetch(statement)
            }
            Err(reason) => CascadeStep::Ignore(reason),
        }
    }

    /// Statement to re-run after a notice about the watched table.
    ///
    /// A producer-bound view re-runs only with a cached filter, so a view
    /// waiting for (or emptied by) its producer stays put.
    #[must_use]
    pub fn on_table_change(&self, producer_bound: bool) -> Option<String> {
        let base = self.base.as_deref()?;
        match (&self.filter, producer_bound) {
            (Some(filter), _) => Some(filter.apply(base)),
            (None, true) => None,
            (None, false) => Some(base.to_string()),
        }
    }

    /// Base statement with the cached filter applied, if any.
    #[must_use]
    pub fn current_statement(&self) -> Option<String> {
        let base = self.base.as_deref()?;
        Some(match &self.filter {
            Some(filter) => filter.apply(base),
            None => base.to_string(),
        })
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.sequence.issue()
    }

    /// Apply the response to the fetch identified by `ticket`.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        statement: &str,
        result: Result<RowSet, QueryError>,
    ) -> Completion {
        if !self.sequence.admit(ticket) {
            return Completion::Stale;
        }
        match result {
            Ok(rows) => {
                self.rows = rows;
                self.state = LoadState::Loaded;
                self.fault = None;
                Completion::Applied
            }
            Err(error) => {
                self.fault = Some(Fault {
                    statement: statement.to_string(),
                    error,
                });
                Completion::Faulted
            }
        }
    }

    /// Record the failure of a statement issued outside the fetch cycle,
    /// such as a delete.
    pub fn record_fault(&mut self, statement: &str, error: QueryError) {
        self.fault = Some(Fault {
            statement: statement.to_string(),
            error,
        });
    }

    pub fn enter_empty(&mut self) {
        self.rows.clear();
        self.filter = None;
        self.state = LoadState::Empty;
        self.fault = None;
        self.sequence.supersede();
    }
}

/// A component whose contents are a [`RowView`].
pub trait ViewHost: Node + Sized + 'static {
    fn view(&self) -> RefMut<'_, RowView>;

    fn this(&self) -> Weak<Self>;

    /// Request for `statement`; override to add parameters or a service path.
    fn request(&self, statement: String) -> QueryRequest {
        QueryRequest::new(statement)
    }

    /// Runs after fresh rows were applied, before republication.
    fn on_loaded(&self) {}

    /// Runs after entering Empty, before republication.
    fn on_emptied(&self) {}
}

/// Handle a producer notice.
pub fn react_to_producer<H: ViewHost>(host: &H, field: &str, signal: &ProducerSignal) {
    let step = host.view().on_producer(field, signal);
    match step {
        CascadeStep::Refetch(statement) => refetch(host, statement),
        CascadeStep::GoEmpty => {
            tracing::debug!(message = "cascade.empty", component = %host.core().id());
            host.on_emptied();
            host.core().publish_scoped(Payload::changed());
        }
        CascadeStep::Ignore(reason) => {
            tracing::debug!(
                message = "cascade.ignored",
                component = %host.core().id(),
                reason = %reason
            );
        }
    }
}

/// Handle a notice about the watched table.
pub fn react_to_table_change<H: ViewHost>(host: &H) {
    let bound = host.core().wiring().is_producer_bound();
    let statement = host.view().on_table_change(bound);
    match statement {
        Some(statement) => refetch(host, statement),
        None => tracing::trace!(message = "cascade.skip", component = %host.core().id()),
    }
}

/// Fetch the current statement, if one is configured.
pub fn load<H: ViewHost>(host: &H) {
    let statement = host.view().current_statement();
    if let Some(statement) = statement {
        refetch(host, statement);
    }
}

/// Issue `statement` and apply its response when it arrives.
pub fn refetch<H: ViewHost>(host: &H, statement: String) {
    let ticket = host.view().begin_fetch();
    tracing::debug!(message = "cascade.fetch", component = %host.core().id(), statement = %statement);
    let request = host.request(statement.clone());
    let this = host.this();
    host.core().page().run_query(request, move |result| {
        if let Some(host) = this.upgrade() {
            complete(&*host, ticket, &statement, result);
        }
    });
}

fn complete<H: ViewHost>(
    host: &H,
    ticket: FetchTicket,
    statement: &str,
    result: Result<RowSet, QueryError>,
) {
    let outcome = host.view().complete(ticket, statement, result);
    let id = host.core().id();
    match outcome {
        Completion::Applied => {
            tracing::debug!(
                message = "cascade.loaded",
                component = %id,
                rows = host.view().rows().len()
            );
            host.on_loaded();
            host.core().publish_scoped(Payload::changed());
        }
        Completion::Stale => {
            tracing::debug!(message = "cascade.stale", component = %id, statement);
        }
        Completion::Faulted => {
            if let Some(fault) = host.view().fault() {
                tracing::warn!(message = "cascade.fault", component = %id, error = %fault.error);
            }
        }
    }
}
