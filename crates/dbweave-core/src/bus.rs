#![forbid(unsafe_code)]

//! Page-wide publish/subscribe bus.
//!
//! # Channels
//!
//! - [`Channel::Global`] carries table-mutation notices (`dbUpdate`).
//! - [`Channel::Scoped`] carries one emitter's "my value changed" notices
//!   (`dbFrom-<id>`); only listeners registered for that emitter see them.
//!
//! # Architecture
//!
//! [`Bus`] is a cheap `Rc` handle; every component of a page holds a clone.
//! Listeners are reference-counted closures kept per channel in registration
//! order. [`Bus::subscribe`] returns a [`Subscription`] guard that removes the
//! listener when dropped, which is how detaching a component drops its
//! wiring.
//!
//! # Invariants
//!
//! 1. Delivery is synchronous: the outermost `publish_*` call returns only
//!    after every queued envelope reached every listener.
//! 2. Listeners of one channel run in registration order.
//! 3. An envelope published from inside a listener is queued and delivered
//!    after the current envelope finishes, so cascades run breadth-first.
//! 4. A listener only sees envelopes published after it was registered.
//! 5. No borrow of bus state is held while a listener runs, so listeners may
//!    publish, subscribe, or drop subscriptions freely.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::envelope::Envelope;
use crate::id::ComponentId;

/// Bus channel address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Global,
    Scoped(ComponentId),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("dbUpdate"),
            Self::Scoped(id) => write!(f, "dbFrom-{id}"),
        }
    }
}

type Listener = Rc<dyn Fn(&Envelope)>;

struct BusInner {
    next_listener: Cell<u64>,
    channels: RefCell<AHashMap<Channel, Vec<(u64, Listener)>>>,
    /// Queued envelopes with the first listener serial they must not reach.
    queue: RefCell<VecDeque<(Channel, Rc<Envelope>, u64)>>,
    dispatching: Cell<bool>,
    delivered: Cell<u64>,
}

/// Shared handle to a page's bus.
#[derive(Clone)]
pub struct Bus {
    inner: Rc<BusInner>,
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("channels", &self.inner.channels.borrow().len())
            .field("queued", &self.inner.queue.borrow().len())
            .field("delivered", &self.inner.delivered.get())
            .finish()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

/// Resets the dispatch flag even if a listener panics.
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Bus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(BusInner {
                next_listener: Cell::new(1),
                channels: RefCell::new(AHashMap::new()),
                queue: RefCell::new(VecDeque::new()),
                dispatching: Cell::new(false),
                delivered: Cell::new(0),
            }),
        }
    }

    /// Register `listener` on `channel`.
    ///
    /// The listener stays active until the returned guard is dropped.
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe(
        &self,
        channel: Channel,
        listener: impl Fn(&Envelope) + 'static,
    ) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner
            .channels
            .borrow_mut()
            .entry(channel.clone())
            .or_default()
            .push((id, Rc::new(listener)));
        tracing::trace!(message = "bus.subscribe", channel = %channel, listener = id);
        Subscription {
            bus: Rc::downgrade(&self.inner),
            channel,
            id,
        }
    }

    /// Deliver `envelope` to every global listener.
    pub fn publish_global(&self, envelope: Envelope) {
        self.publish(Channel::Global, envelope);
    }

    /// Deliver `envelope` to the listeners of `emitter`'s scoped channel.
    pub fn publish_scoped(&self, emitter: &ComponentId, envelope: Envelope) {
        self.publish(Channel::Scoped(emitter.clone()), envelope);
    }

    fn publish(&self, channel: Channel, envelope: Envelope) {
        let mark = self.inner.next_listener.get();
        self.inner
            .queue
            .borrow_mut()
            .push_back((channel, Rc::new(envelope), mark));
        if self.inner.dispatching.replace(true) {
            // An outer publish is draining the queue.
            return;
        }
        let _guard = DispatchGuard(&self.inner.dispatching);
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some((channel, envelope, mark)) = next else {
                break;
            };
            let listeners: Vec<Listener> = self
                .inner
                .channels
                .borrow()
                .get(&channel)
                .map(|list| {
                    list.iter()
                        .filter(|(id, _)| *id < mark)
                        .map(|(_, l)| Rc::clone(l))
                        .collect()
                })
                .unwrap_or_default();
            tracing::debug!(
                message = "bus.deliver",
                channel = %channel,
                source = %envelope.source(),
                table = envelope.table().unwrap_or(""),
                listeners = listeners.len()
            );
            for listener in listeners {
                listener(&envelope);
                self.inner.delivered.set(self.inner.delivered.get() + 1);
            }
        }
    }

    /// Number of listeners currently registered on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &Channel) -> usize {
        self.inner
            .channels
            .borrow()
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Total listener invocations since the bus was created.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.get()
    }
}

/// RAII guard for a bus listener. Dropping it unregisters the listener.
pub struct Subscription {
    bus: Weak<BusInner>,
    channel: Channel,
    id: u64,
}

impl Subscription {
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut channels = bus.channels.borrow_mut();
        if let Some(list) = channels.get_mut(&self.channel) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                channels.remove(&self.channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;

    fn notice(source: &str) -> Envelope {
        Envelope::notice(ComponentId::new(source), Payload::changed())
    }

    #[test]
    fn global_listeners_run_in_registration_order() {
        let bus = Bus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let l2 = Rc::clone(&log);
        let _a = bus.subscribe(Channel::Global, move |_| l1.borrow_mut().push("a"));
        let _b = bus.subscribe(Channel::Global, move |_| l2.borrow_mut().push("b"));

        bus.publish_global(notice("x"));
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(bus.delivered(), 2);
    }

    #[test]
    fn scoped_channel_only_reaches_its_listeners() {
        let bus = Bus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = bus.subscribe(Channel::Scoped(ComponentId::new("a1")), move |_| {
            h.set(h.get() + 1);
        });

        bus.publish_scoped(&ComponentId::new("b2"), notice("b2"));
        bus.publish_global(notice("a1"));
        assert_eq!(hits.get(), 0);

        bus.publish_scoped(&ComponentId::new("a1"), notice("a1"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let bus = Bus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = bus.subscribe(Channel::Global, move |_| h.set(h.get() + 1));
        assert_eq!(bus.listener_count(&Channel::Global), 1);

        drop(sub);
        assert_eq!(bus.listener_count(&Channel::Global), 0);
        bus.publish_global(notice("x"));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn nested_publish_is_delivered_breadth_first() {
        // a1 fans out to b and c; b republishes on its own channel to d.
        let bus = Bus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut subs = Vec::new();

        let (bus_b, log_b) = (bus.clone(), Rc::clone(&log));
        subs.push(bus.subscribe(Channel::Scoped("a1".into()), move |_| {
            log_b.borrow_mut().push("b");
            bus_b.publish_scoped(&"b".into(), notice("b"));
        }));
        let log_c = Rc::clone(&log);
        subs.push(bus.subscribe(Channel::Scoped("a1".into()), move |_| {
            log_c.borrow_mut().push("c");
        }));
        let log_d = Rc::clone(&log);
        subs.push(bus.subscribe(Channel::Scoped("b".into()), move |_| {
            log_d.borrow_mut().push("d");
        }));

        bus.publish_scoped(&"a1".into(), notice("a1"));
        assert_eq!(*log.borrow(), vec!["b", "c", "d"]);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = Bus::new();
        bus.publish_global(notice("x"));
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = bus.subscribe(Channel::Global, move |_| h.set(h.get() + 1));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn listener_may_subscribe_during_delivery() {
        let bus = Bus::new();
        let held = Rc::new(RefCell::new(Vec::new()));
        let (bus2, held2) = (bus.clone(), Rc::clone(&held));
        let _sub = bus.subscribe(Channel::Global, move |_| {
            held2
                .borrow_mut()
                .push(bus2.subscribe(Channel::Global, |_| {}));
        });
        bus.publish_global(notice("x"));
        assert_eq!(bus.listener_count(&Channel::Global), 2);
    }

    #[test]
    fn listener_registered_after_nested_publish_misses_it() {
        let bus = Bus::new();
        let late_hits = Rc::new(Cell::new(0));
        let held = Rc::new(RefCell::new(Vec::new()));
        let (bus2, held2, hits2) = (bus.clone(), Rc::clone(&held), Rc::clone(&late_hits));
        let _sub = bus.subscribe(Channel::Scoped("a1".into()), move |_| {
            // Queued behind the current delivery.
            bus2.publish_global(notice("a1"));
            let h = Rc::clone(&hits2);
            held2
                .borrow_mut()
                .push(bus2.subscribe(Channel::Global, move |_| h.set(h.get() + 1)));
        });

        bus.publish_scoped(&"a1".into(), notice("a1"));
        assert_eq!(late_hits.get(), 0);

        bus.publish_global(notice("x"));
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn channel_names_match_page_events() {
        assert_eq!(Channel::Global.to_string(), "dbUpdate");
        assert_eq!(Channel::Scoped("a1".into()).to_string(), "dbFrom-a1");
    }
}
