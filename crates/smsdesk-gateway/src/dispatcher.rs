use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, error};

use smsdesk_types::events::{BalanceChange, EventKind, PortalEvent};

type Handler = dyn Fn(&PortalEvent) -> anyhow::Result<()> + Send + Sync;

/// Process-wide synchronous publish/subscribe channel.
///
/// `publish` runs every handler registered for the event's kind, in
/// subscription order, on the caller's thread, and returns only after all of
/// them have run. There is no queue and no replay: a handler subscribed after
/// a publish never sees that event.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: RwLock<Vec<Registration>>,
}

struct Registration {
    id: u64,
    kind: EventKind,
    handler: Arc<Handler>,
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it leaves the
/// handler registered; call [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Removes the handler. Returns false if the bus is gone or the handler
    /// was already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut handlers = bus.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|r| r.id != self.id);
        handlers.len() != before
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&PortalEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                kind,
                handler: Arc::new(handler),
            });

        debug!("Subscribed handler {} to {}", id, kind);
        Subscription {
            id,
            kind,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Register a handler for history changes; it receives the user id.
    pub fn on_history_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(EventKind::HistoryChanged, move |event| match event {
            PortalEvent::HistoryChanged { user_id } => handler(user_id),
            _ => Ok(()),
        })
    }

    /// Register a handler for balance changes.
    pub fn on_balance_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BalanceChange) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(EventKind::BalanceChanged, move |event| match event {
            PortalEvent::BalanceChanged(change) => handler(change),
            _ => Ok(()),
        })
    }

    /// Deliver `event` to every handler currently subscribed to its kind.
    ///
    /// A handler that returns an error or panics is logged and skipped; the
    /// remaining handlers still run. Handlers may subscribe or unsubscribe
    /// while being called; such changes apply from the next publish.
    pub fn publish(&self, event: &PortalEvent) {
        let kind = event.kind();
        let targets: Vec<(u64, Arc<Handler>)> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| (r.id, r.handler.clone()))
            .collect();

        debug!("Publishing {} to {} handler(s)", kind, targets.len());

        for (id, handler) in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Handler {} for {} failed: {:#}", id, kind, e),
                Err(payload) => {
                    error!("Handler {} for {} panicked: {}", id, kind, panic_message(payload.as_ref()))
                }
            }
        }
    }

    /// Number of handlers currently subscribed to `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    fn history(user: &str) -> PortalEvent {
        PortalEvent::HistoryChanged {
            user_id: user.to_string(),
        }
    }

    fn balance(user: &str) -> PortalEvent {
        PortalEvent::BalanceChanged(BalanceChange {
            user_id: user.to_string(),
            balance: Decimal::new(10, 0),
            old_balance: Decimal::new(5, 0),
            change: Decimal::new(5, 0),
        })
    }

    #[test]
    fn delivers_in_subscription_order_before_returning() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = log.clone();
            let _sub = bus.subscribe(EventKind::HistoryChanged, move |_| {
                log.lock().unwrap().push(tag);
                Ok(())
            });
        }

        bus.publish(&history("a"));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_kind_is_delivered() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let _sub = bus.on_balance_changed(move |change| {
            s.lock().unwrap().push(change.user_id.clone());
            Ok(())
        });

        bus.publish(&history("a"));
        bus.publish(&balance("b"));
        assert_eq!(*seen.lock().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn failing_handlers_do_not_block_fanout() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0));

        let _err = bus.subscribe(EventKind::HistoryChanged, |_| anyhow::bail!("view gone"));
        let _panic = bus.subscribe(EventKind::HistoryChanged, |_| panic!("render failed"));
        let h = hits.clone();
        let _ok = bus.on_history_changed(move |_| {
            *h.lock().unwrap() += 1;
            Ok(())
        });

        bus.publish(&history("a"));
        bus.publish(&history("a"));
        assert_eq!(*hits.lock().unwrap(), 2);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        let keep = bus.on_history_changed(move |_| {
            l.lock().unwrap().push("keep");
            Ok(())
        });
        let l = log.clone();
        let drop_me = bus.on_history_changed(move |_| {
            l.lock().unwrap().push("drop");
            Ok(())
        });

        assert!(drop_me.unsubscribe());
        bus.publish(&history("a"));

        assert_eq!(*log.lock().unwrap(), vec!["keep"]);
        assert_eq!(bus.subscriber_count(EventKind::HistoryChanged), 1);
        assert!(keep.unsubscribe());
        assert_eq!(bus.subscriber_count(EventKind::HistoryChanged), 0);
    }

    #[test]
    fn no_replay_to_late_subscribers() {
        let bus = EventBus::new();
        bus.publish(&history("a"));

        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let _sub = bus.on_history_changed(move |_| {
            *h.lock().unwrap() += 1;
            Ok(())
        });

        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn handler_may_subscribe_during_publish() {
        let bus = EventBus::new();
        let late_hits = Arc::new(Mutex::new(0));

        let inner_bus = bus.clone();
        let h = late_hits.clone();
        let _sub = bus.subscribe(EventKind::HistoryChanged, move |_| {
            let h = h.clone();
            let _late = inner_bus.on_history_changed(move |_| {
                *h.lock().unwrap() += 1;
                Ok(())
            });
            Ok(())
        });

        bus.publish(&history("a"));
        assert_eq!(*late_hits.lock().unwrap(), 0);

        bus.publish(&history("a"));
        assert_eq!(*late_hits.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribe_after_bus_dropped_is_false() {
        let bus = EventBus::new();
        let sub = bus.on_history_changed(|_| Ok(()));
        drop(bus);
        assert!(!sub.unsubscribe());
    }
}
