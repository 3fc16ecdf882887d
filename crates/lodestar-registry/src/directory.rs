//! Live provider table fed by change events.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use lodestar_remoting::{DataListener, Event, EventType};
use tracing::debug;

/// A [`DataListener`] mirroring every instance node below a root path.
///
/// `Add` and `Update` store the event content under its path; `Delete`
/// drops the path and anything below it. Events outside the root are
/// reported as not interesting.
#[derive(Debug)]
pub struct ServiceDirectory {
    root: String,
    entries: RwLock<BTreeMap<String, String>>,
}

impl ServiceDirectory {
    /// Directory tracking nodes below `root`.
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let root = match root.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            root,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Root path this directory tracks.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Number of tracked instances.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no instance is tracked.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Content recorded for `path`.
    pub fn get(&self, path: &str) -> Option<String> {
        self.read().get(path).cloned()
    }

    /// Copy of the full table.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.read().clone()
    }

    /// Recorded contents in path order.
    pub fn contents(&self) -> Vec<String> {
        self.read().values().cloned().collect()
    }

    fn covers(&self, path: &str) -> bool {
        if self.root == "/" {
            return path.starts_with('/');
        }
        path == self.root
            || (path.starts_with(&self.root) && path[self.root.len()..].starts_with('/'))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataListener for ServiceDirectory {
    fn data_change(&self, event: &Event) -> bool {
        let path = event.path();
        if !self.covers(path) {
            return false;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match event.action() {
            EventType::Add | EventType::Update => {
                // The root node itself describes the service, not an instance.
                if path != self.root {
                    entries.insert(path.to_string(), event.content().to_string());
                }
            }
            EventType::Delete => {
                let prefix = format!("{}/", path.trim_end_matches('/'));
                entries.retain(|key, _| key != path && !key.starts_with(&prefix));
            }
        }
        debug!(root = %self.root, %path, action = %event.action(), instances = entries.len(), "directory updated");
        true
    }
}
