//! The page: owner of the bus, the component registry and the local tasks.
//!
//! A [`Page`] replaces ambient, environment-wide registration. Every
//! component is attached to exactly one page and reaches its peers, the bus
//! and the query endpoint only through it, so two pages in one process never
//! see each other's events.
//!
//! # Runtime
//!
//! Remote calls and delayed triggers run as `tokio` local tasks. The page
//! must therefore be driven from inside a [`tokio::task::LocalSet`];
//! [`Page::settle`] resolves once no task is outstanding.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;

use ahash::AHashMap;
use thiserror::Error;
use tokio::sync::Notify;

use crate::bus::Bus;
use crate::config::PageConfig;
use crate::endpoint::{QueryEndpoint, QueryError, QueryRequest};
use crate::id::ComponentId;
use crate::node::Node;
use crate::value::RowSet;
use crate::wiring::{DependencyGraph, WiringError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("component id must not be empty")]
    EmptyId,
    #[error("a live component already uses id `{0}`")]
    DuplicateId(ComponentId),
}

#[derive(Debug, Default)]
struct TaskTracker {
    pending: Cell<usize>,
    idle: Notify,
}

impl TaskTracker {
    fn begin(&self) {
        self.pending.set(self.pending.get() + 1);
    }

    fn end(&self) {
        let left = self.pending.get().saturating_sub(1);
        self.pending.set(left);
        if left == 0 {
            // Every concurrent `settle` is waiting, not just the first.
            self.idle.notify_waiters();
        }
    }
}

struct PageInner {
    config: PageConfig,
    bus: Bus,
    endpoint: Box<dyn QueryEndpoint>,
    registry: RefCell<AHashMap<ComponentId, Weak<dyn Node>>>,
    graph: RefCell<DependencyGraph>,
    tasks: Rc<TaskTracker>,
}

/// Shared handle to a page.
#[derive(Clone)]
pub struct Page {
    inner: Rc<PageInner>,
}

/// Non-owning page handle for listeners, which must not keep the page alive.
#[derive(Clone)]
pub struct WeakPage {
    inner: Weak<PageInner>,
}

impl WeakPage {
    #[must_use]
    pub fn upgrade(&self) -> Option<Page> {
        self.inner.upgrade().map(|inner| Page { inner })
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("config", &self.inner.config)
            .field("components", &self.inner.registry.borrow().len())
            .field("in_flight", &self.inner.tasks.pending.get())
            .finish()
    }
}

impl Page {
    #[must_use]
    pub fn new(endpoint: impl QueryEndpoint + 'static) -> Self {
        Self::with_config(endpoint, PageConfig::default())
    }

    #[must_use]
    pub fn with_config(endpoint: impl QueryEndpoint + 'static, config: PageConfig) -> Self {
        Self {
            inner: Rc::new(PageInner {
                config,
                bus: Bus::new(),
                endpoint: Box::new(endpoint),
                registry: RefCell::new(AHashMap::new()),
                graph: RefCell::new(DependencyGraph::default()),
                tasks: Rc::new(TaskTracker::default()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PageConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakPage {
        WeakPage {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Make `node` discoverable under its id.
    ///
    /// A registry slot whose previous owner was dropped is reused.
    pub fn register(&self, node: &Rc<dyn Node>) -> Result<(), PageError> {
        let id = node.core().id().clone();
        if id.is_empty() {
            return Err(PageError::EmptyId);
        }
        let mut registry = self.inner.registry.borrow_mut();
        if registry.get(&id).is_some_and(|w| w.strong_count() > 0) {
            return Err(PageError::DuplicateId(id));
        }
        tracing::debug!(message = "page.attach", component = %id, kind = node.kind());
        registry.insert(id, Rc::downgrade(node));
        Ok(())
    }

    /// Live component registered under `id`.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<Rc<dyn Node>> {
        self.inner.registry.borrow().get(id).and_then(Weak::upgrade)
    }

    /// Detach the component `id`: drop its subscriptions, its registry slot
    /// and its outgoing dependency edges. Returns whether it was live.
    pub fn detach(&self, id: &str) -> bool {
        let node = self
            .inner
            .registry
            .borrow_mut()
            .remove(id)
            .and_then(|w| w.upgrade());
        self.inner.graph.borrow_mut().remove_dependent(id);
        match node {
            Some(node) => {
                node.core().release();
                tracing::debug!(message = "page.detach", component = id);
                true
            }
            None => false,
        }
    }

    /// Ids of all live components, sorted.
    #[must_use]
    pub fn components(&self) -> Vec<ComponentId> {
        let mut ids: Vec<ComponentId> = self
            .inner
            .registry
            .borrow()
            .iter()
            .filter(|(_, w)| w.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Record the edge `producer -> dependent`, rejecting cycles.
    pub fn link(&self, producer: &ComponentId, dependent: &ComponentId) -> Result<(), WiringError> {
        self.inner.graph.borrow_mut().link(producer, dependent)
    }

    #[must_use]
    pub fn graph(&self) -> Ref<'_, DependencyGraph> {
        self.inner.graph.borrow()
    }

    /// Send `request` to the endpoint and hand the outcome to `on_done` on a
    /// later turn. Nothing is cancelled or retried.
    pub fn run_query(
        &self,
        mut request: QueryRequest,
        on_done: impl FnOnce(Result<RowSet, QueryError>) + 'static,
    ) {
        if request.service.is_none() {
            request.service = Some(self.inner.config.service().to_string());
        }
        tracing::debug!(message = "page.query", statement = %request.statement);
        let pending = self.inner.endpoint.execute(request);
        self.spawn(async move { on_done(pending.await) });
    }

    /// Run `task` after `delay`.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + 'static) {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }

    fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        let tracker = Rc::clone(&self.inner.tasks);
        tracker.begin();
        let _detached = tokio::task::spawn_local(async move {
            task.await;
            tracker.end();
        });
    }

    /// Remote calls and timers not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.pending.get()
    }

    /// Wait until every outstanding query and timer, including the ones they
    /// start in turn, has finished.
    pub async fn settle(&self) {
        loop {
            // Registered before the count is read, so a wakeup between the
            // check and the await is not lost.
            let idle = self.inner.tasks.idle.notified();
            if self.inner.tasks.pending.get() == 0 {
                return;
            }
            idle.await;
        }
    }
}
