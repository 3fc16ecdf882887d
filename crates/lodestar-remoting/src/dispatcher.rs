//! Path-keyed listener registry and event delivery.
//!
//! Listeners subscribe either to an exact path or to a subtree rooted at a
//! path prefix. [`Dispatcher::notify`] snapshots the matching listeners under
//! a read lock, releases the lock, then invokes each listener in turn:
//!
//! 1. exact-path subscriptions, in registration order
//! 2. subtree subscriptions, deepest prefix first, registration order within a prefix
//!
//! A listener reachable through several subscriptions runs once per event.
//! Panics raised by a listener are caught, logged, and recorded in the
//! [`DeliveryReport`]; the remaining listeners still run.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, trace};

use crate::event::Event;
use crate::listener::DataListener;
use crate::{ensure_path, RemotingError, Result, PATH_SEPARATOR};

/// How a subscription key matches event paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Only events whose path equals the key.
    Exact,
    /// Events on the key itself and on every path below it.
    Subtree,
}

/// Outcome of delivering one or more events.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Listener invocations that returned normally.
    pub delivered: usize,
    /// Invocations that returned `true`.
    pub interested: usize,
    /// Invocations that panicked.
    pub failures: Vec<RemotingError>,
}

impl DeliveryReport {
    /// Whether at least one listener reported interest.
    pub fn is_interested(&self) -> bool {
        self.interested > 0
    }

    /// Total listener invocations, failed ones included.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.interested += other.interested;
        self.failures.extend(other.failures);
    }
}

type ListenerList = Vec<Arc<dyn DataListener>>;

#[derive(Default)]
struct Registry {
    exact: HashMap<String, ListenerList>,
    subtree: HashMap<String, ListenerList>,
}

impl Registry {
    fn table(&self, kind: SubscriptionKind) -> &HashMap<String, ListenerList> {
        match kind {
            SubscriptionKind::Exact => &self.exact,
            SubscriptionKind::Subtree => &self.subtree,
        }
    }

    fn table_mut(&mut self, kind: SubscriptionKind) -> &mut HashMap<String, ListenerList> {
        match kind {
            SubscriptionKind::Exact => &mut self.exact,
            SubscriptionKind::Subtree => &mut self.subtree,
        }
    }

    /// Listeners matching `path` in delivery order, de-duplicated by identity.
    fn matching(&self, path: &str) -> ListenerList {
        let mut out: ListenerList = Vec::new();
        let mut push_all = |list: Option<&ListenerList>| {
            for listener in list.into_iter().flatten() {
                let addr = listener_addr(listener);
                if !out.iter().any(|seen| listener_addr(seen) == addr) {
                    out.push(Arc::clone(listener));
                }
            }
        };

        push_all(self.exact.get(path));
        for key in subtree_keys(path) {
            push_all(self.subtree.get(key));
        }
        out
    }
}

/// Routes change events to subscribed listeners.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<RwLock<Registry>>,
}

impl Dispatcher {
    /// Create a dispatcher with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to events on exactly `path`.
    ///
    /// Returns `false` when the listener was already subscribed there.
    pub fn subscribe(&self, path: &str, listener: Arc<dyn DataListener>) -> Result<bool> {
        self.subscribe_as(SubscriptionKind::Exact, path, listener)
    }

    /// Subscribe `listener` to events on `prefix` and everything below it.
    pub fn subscribe_subtree(&self, prefix: &str, listener: Arc<dyn DataListener>) -> Result<bool> {
        self.subscribe_as(SubscriptionKind::Subtree, prefix, listener)
    }

    /// Remove an exact-path subscription. Absent subscriptions are a no-op.
    ///
    /// Returns whether a subscription was removed.
    pub fn unsubscribe<L>(&self, path: &str, listener: &Arc<L>) -> Result<bool>
    where
        L: DataListener + ?Sized,
    {
        self.unsubscribe_as(SubscriptionKind::Exact, path, listener)
    }

    /// Remove a subtree subscription. Absent subscriptions are a no-op.
    pub fn unsubscribe_subtree<L>(&self, prefix: &str, listener: &Arc<L>) -> Result<bool>
    where
        L: DataListener + ?Sized,
    {
        self.unsubscribe_as(SubscriptionKind::Subtree, prefix, listener)
    }

    /// Register `listener` under `key` with the given matching rule.
    pub fn subscribe_as(
        &self,
        kind: SubscriptionKind,
        key: &str,
        listener: Arc<dyn DataListener>,
    ) -> Result<bool> {
        ensure_path(key)?;
        let key = normalize_key(kind, key);
        let addr = listener_addr(&listener);

        let mut registry = self.write();
        let list = registry.table_mut(kind).entry(key.to_string()).or_default();
        if list.iter().any(|existing| listener_addr(existing) == addr) {
            debug!(path = %key, ?kind, "listener already subscribed");
            return Ok(false);
        }
        list.push(listener);
        debug!(path = %key, ?kind, listeners = list.len(), "listener subscribed");
        Ok(true)
    }

    /// Remove `listener` from `key` for the given matching rule.
    pub fn unsubscribe_as<L>(&self, kind: SubscriptionKind, key: &str, listener: &Arc<L>) -> Result<bool>
    where
        L: DataListener + ?Sized,
    {
        ensure_path(key)?;
        let key = normalize_key(kind, key);
        let addr = listener_addr(listener);

        let mut registry = self.write();
        let table = registry.table_mut(kind);
        let Some(list) = table.get_mut(key) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|existing| listener_addr(existing) != addr);
        let removed = list.len() != before;
        if list.is_empty() {
            table.remove(key);
        }
        if removed {
            debug!(path = %key, ?kind, "listener unsubscribed");
        }
        Ok(removed)
    }

    /// Drop every subscription held by `listener`. Returns how many were removed.
    pub fn remove_listener<L>(&self, listener: &Arc<L>) -> usize
    where
        L: DataListener + ?Sized,
    {
        let addr = listener_addr(listener);
        let mut registry = self.write();
        let mut removed = 0;
        for kind in [SubscriptionKind::Exact, SubscriptionKind::Subtree] {
            let table = registry.table_mut(kind);
            for list in table.values_mut() {
                let before = list.len();
                list.retain(|existing| listener_addr(existing) != addr);
                removed += before - list.len();
            }
            table.retain(|_, list| !list.is_empty());
        }
        removed
    }

    /// Deliver `event` to every matching listener.
    ///
    /// Fails only when the event path is empty. Listener panics are reported
    /// in the returned [`DeliveryReport`], never as an error.
    pub fn notify(&self, event: &Event) -> Result<DeliveryReport> {
        ensure_path(event.path())?;

        let listeners = self.read().matching(event.path());
        let mut report = DeliveryReport::default();
        if listeners.is_empty() {
            trace!(path = %event.path(), action = %event.action(), "no listeners for event");
            return Ok(report);
        }

        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.data_change(event))) {
                Ok(interested) => {
                    report.delivered += 1;
                    if interested {
                        report.interested += 1;
                    }
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        path = %event.path(),
                        action = %event.action(),
                        %message,
                        "listener panicked while handling event"
                    );
                    report.failures.push(RemotingError::ListenerFailure {
                        path: event.path().to_string(),
                        message,
                    });
                }
            }
        }

        debug!(
            path = %event.path(),
            action = %event.action(),
            delivered = report.delivered,
            interested = report.interested,
            failed = report.failures.len(),
            "event delivered"
        );
        Ok(report)
    }

    /// Deliver a batch of events in order.
    ///
    /// Validation happens up front, so an invalid event means nothing is delivered.
    pub fn notify_all<'a, I>(&self, events: I) -> Result<DeliveryReport>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let events: Vec<&Event> = events.into_iter().collect();
        for event in &events {
            ensure_path(event.path())?;
        }
        let mut total = DeliveryReport::default();
        for event in events {
            total.merge(self.notify(event)?);
        }
        Ok(total)
    }

    /// Number of listeners registered under `key` for the given rule.
    pub fn listener_count(&self, kind: SubscriptionKind, key: &str) -> usize {
        let key = normalize_key(kind, key);
        self.read().table(kind).get(key).map_or(0, Vec::len)
    }

    /// Total number of subscriptions across all keys.
    pub fn total_listener_count(&self) -> usize {
        let registry = self.read();
        registry
            .exact
            .values()
            .chain(registry.subtree.values())
            .map(Vec::len)
            .sum()
    }

    // Listeners never run while the lock is held, so a poisoned lock still
    // guards a consistent registry.
    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn listener_addr<L: ?Sized>(listener: &Arc<L>) -> *const () {
    Arc::as_ptr(listener).cast::<()>()
}

/// Subtree keys drop a trailing separator so `/a/` and `/a` are the same prefix.
fn normalize_key(kind: SubscriptionKind, key: &str) -> &str {
    match kind {
        SubscriptionKind::Exact => key,
        SubscriptionKind::Subtree => {
            let trimmed = key.trim_end_matches(PATH_SEPARATOR);
            if trimmed.is_empty() && !key.is_empty() {
                &key[..1]
            } else {
                trimmed
            }
        }
    }
}

/// `path` followed by each of its ancestors, deepest first.
///
/// `/a/b` yields `/a/b`, `/a`, `/`.
fn subtree_keys(path: &str) -> Vec<&str> {
    let path = normalize_key(SubscriptionKind::Subtree, path);
    let mut keys = vec![path];
    if path.len() <= 1 {
        return keys;
    }
    let mut current = path;
    while let Some(idx) = current.rfind(PATH_SEPARATOR) {
        current = &current[..idx];
        if current.is_empty() {
            keys.push(&path[..1]);
            break;
        }
        keys.push(current);
    }
    keys
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
