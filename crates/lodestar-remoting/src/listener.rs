//! Listener contract for registry change events.

use std::fmt;

use crate::event::Event;

/// Receives change events for the paths it has subscribed to.
///
/// The returned flag reports whether the listener found the event relevant.
/// It is advisory: every registered listener receives the event regardless
/// of what earlier listeners returned.
///
/// Listeners registered on the same path may be invoked from several
/// threads, so any state they mutate needs its own synchronization.
pub trait DataListener: Send + Sync {
    /// Handle one event.
    fn data_change(&self, event: &Event) -> bool;
}

/// Adapter turning a closure into a [`DataListener`].
pub struct FnListener<F> {
    name: String,
    callback: F,
}

impl<F> FnListener<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    /// Wrap `callback` under a diagnostic name.
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }

    /// Diagnostic name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<F> DataListener for FnListener<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn data_change(&self, event: &Event) -> bool {
        (self.callback)(event)
    }
}

impl<F> fmt::Debug for FnListener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener").field("name", &self.name).finish()
    }
}
