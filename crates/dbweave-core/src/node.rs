//! The shape every page component shares.
//!
//! A component embeds a [`NodeCore`] (identity, silence, wiring and the
//! subscriptions that keep its listeners alive) and implements [`Node`] so
//! peers can discover it by id and read its current value.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::bus::Subscription;
use crate::cascade::LoadState;
use crate::envelope::{Envelope, Mutation, Payload};
use crate::id::{ComponentId, Signature};
use crate::page::Page;
use crate::value::ComponentValue;
use crate::wiring::{Wiring, WiringError};

/// A discoverable page component.
pub trait Node {
    fn core(&self) -> &NodeCore;

    /// Markup tag of the component kind, e.g. `db-table`.
    fn kind(&self) -> &'static str;

    /// Current outward value. Never reflects an in-flight fetch.
    fn value(&self) -> ComponentValue;

    fn load_state(&self) -> LoadState;
}

/// State common to every component.
pub struct NodeCore {
    id: ComponentId,
    signature: Signature,
    silent: Cell<bool>,
    page: Page,
    pub(crate) wiring: Rc<RefCell<Wiring>>,
    subscriptions: RefCell<Vec<Subscription>>,
    diagnostics: RefCell<Vec<WiringError>>,
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCore")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("silent", &self.silent.get())
            .field("wiring", &*self.wiring.borrow())
            .field("subscriptions", &self.subscriptions.borrow().len())
            .finish()
    }
}

impl NodeCore {
    /// Core for a component `id` on `page`, with a freshly minted signature.
    #[must_use]
    pub fn new(page: &Page, id: ComponentId) -> Self {
        let signature = Signature::mint(&id);
        Self {
            id,
            signature,
            silent: Cell::new(false),
            page: page.clone(),
            wiring: Rc::new(RefCell::new(Wiring::default())),
            subscriptions: RefCell::new(Vec::new()),
            diagnostics: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.silent.get()
    }

    /// Silence outgoing publication. Incoming subscriptions are unaffected.
    pub fn set_silent(&self, silent: bool) {
        self.silent.set(silent);
    }

    #[must_use]
    pub fn wiring(&self) -> Ref<'_, Wiring> {
        self.wiring.borrow()
    }

    /// Announce "my value changed" on this component's scoped channel.
    pub fn publish_scoped(&self, payload: Payload) {
        if self.suppressed("scoped") {
            return;
        }
        let envelope = Envelope::notice(self.id.clone(), payload);
        self.page.bus().publish_scoped(&self.id, envelope);
    }

    /// Publish a non-mutation notice on the global channel.
    pub fn publish_global(&self, payload: Payload) {
        if self.suppressed("global") {
            return;
        }
        let envelope = Envelope::notice(self.id.clone(), payload);
        self.page.bus().publish_global(envelope);
    }

    /// Announce a successful mutation of `table` on the global channel.
    pub fn announce(&self, table: &str, kind: Mutation) {
        if self.suppressed("mutation") {
            return;
        }
        tracing::debug!(
            message = "node.mutation",
            component = %self.id,
            table,
            kind = kind.as_str()
        );
        let envelope = Envelope::mutation(&self.signature, table, kind);
        self.page.bus().publish_global(envelope);
    }

    fn suppressed(&self, channel: &'static str) -> bool {
        if self.silent.get() {
            tracing::trace!(message = "node.silent", component = %self.id, channel);
            return true;
        }
        false
    }

    pub(crate) fn hold(&self, subscription: Subscription) {
        self.subscriptions.borrow_mut().push(subscription);
    }

    /// Drop every subscription. Called when the component is detached.
    pub fn release(&self) {
        let dropped = std::mem::take(&mut *self.subscriptions.borrow_mut());
        tracing::debug!(
            message = "node.release",
            component = %self.id,
            subscriptions = dropped.len()
        );
        drop(dropped);
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Log and keep a rejected wiring declaration. Returns whether `result`
    /// was accepted.
    pub fn record(&self, result: Result<(), WiringError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(message = "wiring.rejected", component = %self.id, error = %err);
                self.diagnostics.borrow_mut().push(err);
                false
            }
        }
    }

    pub(crate) fn push_diagnostic(&self, err: WiringError) {
        self.diagnostics.borrow_mut().push(err);
    }

    /// Wiring problems seen so far, oldest first.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<WiringError> {
        self.diagnostics.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Channel;
    use crate::testing::ScriptedEndpoint;

    fn capture(page: &Page, channel: Channel) -> (Rc<RefCell<Vec<Envelope>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = page
            .bus()
            .subscribe(channel, move |env| sink.borrow_mut().push(env.clone()));
        (seen, sub)
    }

    #[test]
    fn scoped_publication_is_stamped_with_source() {
        let page = Page::new(ScriptedEndpoint::new());
        let core = NodeCore::new(&page, ComponentId::new("a1"));
        let (seen, _sub) = capture(&page, Channel::Scoped(ComponentId::new("a1")));

        core.publish_scoped(Payload::row(2));
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source(), "a1");
        assert_eq!(seen[0].row(), Some(2));
        assert!(seen[0].sig().is_none());
    }

    #[test]
    fn mutation_carries_signature() {
        let page = Page::new(ScriptedEndpoint::new());
        let core = NodeCore::new(&page, ComponentId::new("author-form"));
        let (seen, _sub) = capture(&page, Channel::Global);

        core.announce("author", Mutation::Insert);
        let seen = seen.borrow();
        assert_eq!(seen[0].sig(), Some(core.signature()));
        assert_eq!(seen[0].mutation_kind(), Some(Mutation::Insert));
    }

    #[test]
    fn silent_core_never_publishes() {
        let page = Page::new(ScriptedEndpoint::new());
        let core = NodeCore::new(&page, ComponentId::new("a1"));
        core.set_silent(true);
        let (scoped, _s1) = capture(&page, Channel::Scoped(ComponentId::new("a1")));
        let (global, _s2) = capture(&page, Channel::Global);

        core.publish_scoped(Payload::changed());
        core.publish_global(Payload::table("author"));
        core.announce("author", Mutation::Delete);
        assert!(scoped.borrow().is_empty());
        assert!(global.borrow().is_empty());
    }
}
