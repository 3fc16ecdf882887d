//! Translation of raw coordination-service notifications into typed events.
//!
//! Registry backends report node-level changes the way coordination services
//! do: a node was created, its data changed, it was deleted, or the child set
//! of a watched node changed. [`WatchState`] remembers the last observed
//! content of every path so that each raw notification maps onto a
//! deterministic list of [`Event`]s, and replaying an identical snapshot
//! yields nothing.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::event::Event;
use crate::{ensure_path, RemotingError, Result, PATH_SEPARATOR};

/// A raw notification from the registry watch source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawChange {
    /// A node was created with initial data.
    NodeCreated { path: String, data: String },
    /// A node's data was replaced.
    NodeDataChanged { path: String, data: String },
    /// A node and everything below it went away.
    NodeDeleted { path: String },
    /// Full child listing of `path` as `(name, data)` pairs.
    ChildrenChanged {
        path: String,
        children: Vec<(String, String)>,
    },
}

impl RawChange {
    /// Path the notification was raised for.
    pub fn path(&self) -> &str {
        match self {
            RawChange::NodeCreated { path, .. }
            | RawChange::NodeDataChanged { path, .. }
            | RawChange::NodeDeleted { path }
            | RawChange::ChildrenChanged { path, .. } => path,
        }
    }
}

/// Last observed registry view, used to type incoming changes.
#[derive(Debug, Default)]
pub struct WatchState {
    /// path -> last seen content
    nodes: BTreeMap<String, String>,
    /// parent path -> child names in first-seen order
    children: HashMap<String, Vec<String>>,
}

impl WatchState {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is tracked.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Last observed content of `path`.
    pub fn content(&self, path: &str) -> Option<&str> {
        self.nodes.get(path).map(String::as_str)
    }

    /// Child names of `path` as last listed.
    pub fn children_of(&self, path: &str) -> &[String] {
        self.children.get(path).map_or(&[], Vec::as_slice)
    }

    /// Fold `change` into the view and return the events it implies.
    pub fn translate(&mut self, change: RawChange) -> Result<Vec<Event>> {
        ensure_path(change.path())?;
        let events = match change {
            RawChange::NodeCreated { path, data } | RawChange::NodeDataChanged { path, data } => {
                self.upsert(path, data)?.into_iter().collect()
            }
            RawChange::NodeDeleted { path } => self.delete(&path)?,
            RawChange::ChildrenChanged { path, children } => self.relist(&path, children)?,
        };
        trace!(events = events.len(), "raw change translated");
        Ok(events)
    }

    /// Record `data` for `path`. Unknown paths become `Add`, changed data `Update`.
    fn upsert(&mut self, path: String, data: String) -> Result<Option<Event>> {
        let event = match self.nodes.get(&path) {
            Some(existing) if *existing == data => return Ok(None),
            Some(_) => Event::updated(path.as_str(), data.as_str())?,
            None => Event::added(path.as_str(), data.as_str())?,
        };
        self.link_to_parent(&path);
        self.nodes.insert(path, data);
        Ok(Some(event))
    }

    /// Delete `path` and every tracked descendant, deepest first.
    fn delete(&mut self, path: &str) -> Result<Vec<Event>> {
        let mut removed = self.remove_subtree(path);
        if removed.is_empty() {
            removed.push(path.to_string());
        }
        self.unlink_from_parent(path);
        removed.into_iter().map(Event::deleted).collect()
    }

    fn relist(&mut self, path: &str, listing: Vec<(String, String)>) -> Result<Vec<Event>> {
        if let Some((name, _)) = listing.iter().find(|(name, _)| name.is_empty()) {
            return Err(RemotingError::InvalidArgument(format!(
                "empty child name {name:?} under {path}"
            )));
        }

        // Taken out so the upserts below do not append to it.
        let previous = match self.children.remove(path) {
            Some(previous) => previous,
            None => self.tracked_children(path),
        };
        let mut current: Vec<String> = Vec::with_capacity(listing.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(listing.len());
        let mut events = Vec::new();

        for (name, data) in listing {
            if !seen.insert(name.clone()) {
                continue;
            }
            let child = join_path(path, &name);
            current.push(name);
            events.extend(self.upsert(child, data)?);
        }

        for name in previous.iter().filter(|name| !seen.contains(*name)) {
            let child = join_path(path, name);
            let mut removed = self.remove_subtree(&child);
            if removed.is_empty() {
                removed.push(child);
            }
            for gone in removed {
                events.push(Event::deleted(gone)?);
            }
        }

        self.children.insert(path.to_string(), current);
        Ok(events)
    }

    /// Direct children of `path` known from node notifications alone.
    fn tracked_children(&self, path: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter_map(|key| match split_parent(key) {
                Some((parent, name)) if parent == path => Some(name.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Drop `path` and its descendants from the view, returning them deepest first.
    fn remove_subtree(&mut self, path: &str) -> Vec<String> {
        let prefix = join_path(path, "");
        let mut removed: Vec<String> = self
            .nodes
            .keys()
            .filter(|key| key.as_str() == path || key.starts_with(&prefix))
            .cloned()
            .collect();
        removed.sort_by(|a, b| depth(b).cmp(&depth(a)).then_with(|| a.cmp(b)));

        for key in &removed {
            self.nodes.remove(key);
            self.children.remove(key);
        }
        self.children.remove(path);
        removed
    }

    fn link_to_parent(&mut self, path: &str) {
        if let Some((parent, name)) = split_parent(path) {
            if let Some(names) = self.children.get_mut(parent) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }

    fn unlink_from_parent(&mut self, path: &str) {
        if let Some((parent, name)) = split_parent(path) {
            if let Some(names) = self.children.get_mut(parent) {
                names.retain(|n| n != name);
            }
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with(PATH_SEPARATOR) {
        format!("{parent}{name}")
    } else {
        format!("{parent}{PATH_SEPARATOR}{name}")
    }
}

fn split_parent(path: &str) -> Option<(&str, &str)> {
    let idx = path.rfind(PATH_SEPARATOR)?;
    let parent = if idx == 0 { &path[..1] } else { &path[..idx] };
    let name = &path[idx + 1..];
    if name.is_empty() {
        return None;
    }
    Some((parent, name))
}

fn depth(path: &str) -> usize {
    path.matches(PATH_SEPARATOR).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    fn listing(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(n, d)| (n.to_string(), d.to_string()))
            .collect()
    }

    fn summary(events: &[Event]) -> Vec<(EventType, &str)> {
        events.iter().map(|e| (e.action(), e.path())).collect()
    }

    #[test]
    fn test_created_then_changed() {
        let mut state = WatchState::new();
        let events = state
            .translate(RawChange::NodeCreated {
                path: "/svc/a".into(),
                data: "1".into(),
            })
            .expect("translate");
        assert_eq!(events, vec![Event::added("/svc/a", "1").expect("valid")]);

        let events = state
            .translate(RawChange::NodeDataChanged {
                path: "/svc/a".into(),
                data: "2".into(),
            })
            .expect("translate");
        assert_eq!(events, vec![Event::updated("/svc/a", "2").expect("valid")]);
        assert_eq!(state.content("/svc/a"), Some("2"));
    }

    #[test]
    fn test_unchanged_data_is_suppressed() {
        let mut state = WatchState::new();
        let change = RawChange::NodeDataChanged {
            path: "/svc/a".into(),
            data: "1".into(),
        };
        assert_eq!(state.translate(change.clone()).expect("translate").len(), 1);
        assert!(state.translate(change).expect("translate").is_empty());
    }

    #[test]
    fn test_children_diff() {
        let mut state = WatchState::new();
        let events = state
            .translate(RawChange::ChildrenChanged {
                path: "/svc/providers".into(),
                children: listing(&[("a", "url-a"), ("b", "url-b")]),
            })
            .expect("translate");
        assert_eq!(
            summary(&events),
            vec![
                (EventType::Add, "/svc/providers/a"),
                (EventType::Add, "/svc/providers/b"),
            ]
        );

        let events = state
            .translate(RawChange::ChildrenChanged {
                path: "/svc/providers".into(),
                children: listing(&[("b", "url-b2"), ("c", "url-c")]),
            })
            .expect("translate");
        assert_eq!(
            summary(&events),
            vec![
                (EventType::Update, "/svc/providers/b"),
                (EventType::Add, "/svc/providers/c"),
                (EventType::Delete, "/svc/providers/a"),
            ]
        );
        assert_eq!(events[0].content(), "url-b2");
        assert!(events[2].content().is_empty());
        assert_eq!(state.children_of("/svc/providers"), ["b", "c"]);
    }

    #[test]
    fn test_identical_listing_yields_nothing() {
        let mut state = WatchState::new();
        let change = RawChange::ChildrenChanged {
            path: "/svc".into(),
            children: listing(&[("a", "1")]),
        };
        assert_eq!(state.translate(change.clone()).expect("translate").len(), 1);
        assert!(state.translate(change).expect("translate").is_empty());
    }

    #[test]
    fn test_duplicate_child_names_collapse() {
        let mut state = WatchState::new();
        let events = state
            .translate(RawChange::ChildrenChanged {
                path: "/svc".into(),
                children: listing(&[("a", "1"), ("a", "2")]),
            })
            .expect("translate");
        assert_eq!(events, vec![Event::added("/svc/a", "1").expect("valid")]);
    }

    #[test]
    fn test_delete_cascades_deepest_first() {
        let mut state = WatchState::new();
        for (path, data) in [("/svc", "root"), ("/svc/a", "a"), ("/svc/a/x", "x"), ("/svcs", "other")] {
            state
                .translate(RawChange::NodeCreated {
                    path: path.into(),
                    data: data.into(),
                })
                .expect("translate");
        }

        let events = state
            .translate(RawChange::NodeDeleted { path: "/svc".into() })
            .expect("translate");
        assert_eq!(
            summary(&events),
            vec![
                (EventType::Delete, "/svc/a/x"),
                (EventType::Delete, "/svc/a"),
                (EventType::Delete, "/svc"),
            ]
        );
        assert_eq!(state.content("/svcs"), Some("other"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_delete_untracked_path() {
        let mut state = WatchState::new();
        let events = state
            .translate(RawChange::NodeDeleted { path: "/gone".into() })
            .expect("translate");
        assert_eq!(events, vec![Event::deleted("/gone").expect("valid")]);
    }

    #[test]
    fn test_delete_unlinks_child() {
        let mut state = WatchState::new();
        state
            .translate(RawChange::ChildrenChanged {
                path: "/svc".into(),
                children: listing(&[("a", "1"), ("b", "2")]),
            })
            .expect("translate");
        state
            .translate(RawChange::NodeDeleted { path: "/svc/a".into() })
            .expect("translate");
        assert_eq!(state.children_of("/svc"), ["b"]);

        // A re-listing without `a` must not report it deleted twice.
        let events = state
            .translate(RawChange::ChildrenChanged {
                path: "/svc".into(),
                children: listing(&[("b", "2")]),
            })
            .expect("translate");
        assert!(events.is_empty());
    }

    #[test]
    fn test_created_child_joins_listing() {
        let mut state = WatchState::new();
        state
            .translate(RawChange::ChildrenChanged {
                path: "/svc".into(),
                children: listing(&[("a", "1")]),
            })
            .expect("translate");
        state
            .translate(RawChange::NodeCreated {
                path: "/svc/b".into(),
                data: "2".into(),
            })
            .expect("translate");
        assert_eq!(state.children_of("/svc"), ["a", "b"]);
    }

    #[test]
    fn test_first_listing_drops_nodes_seen_before_it() {
        let mut state = WatchState::new();
        for (path, data) in [("/svc/b", "2"), ("/svc/b/x", "x"), ("/svcs/c", "3")] {
            state
                .translate(RawChange::NodeCreated {
                    path: path.into(),
                    data: data.into(),
                })
                .expect("translate");
        }

        let events = state
            .translate(RawChange::ChildrenChanged {
                path: "/svc".into(),
                children: listing(&[("a", "1")]),
            })
            .expect("translate");
        assert_eq!(
            summary(&events),
            vec![
                (EventType::Add, "/svc/a"),
                (EventType::Delete, "/svc/b/x"),
                (EventType::Delete, "/svc/b"),
            ]
        );
        assert_eq!(state.content("/svc/b"), None);
        assert_eq!(state.content("/svcs/c"), Some("3"));
        assert_eq!(state.children_of("/svc"), ["a"]);
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut state = WatchState::new();
        assert!(matches!(
            state.translate(RawChange::NodeDeleted { path: String::new() }),
            Err(RemotingError::InvalidArgument(_))
        ));
        assert!(matches!(
            state.translate(RawChange::ChildrenChanged {
                path: "/svc".into(),
                children: listing(&[("", "x")]),
            }),
            Err(RemotingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_raw_change_json() {
        let change: RawChange = serde_json::from_str(
            r#"{"kind":"children_changed","path":"/svc","children":[["a","1"]]}"#,
        )
        .expect("parse");
        assert_eq!(change.path(), "/svc");
        assert!(matches!(change, RawChange::ChildrenChanged { ref children, .. } if children.len() == 1));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join_path("/a", "b"), "/a/b");
        assert_eq!(join_path("/", "b"), "/b");
        assert_eq!(split_parent("/a/b"), Some(("/a", "b")));
        assert_eq!(split_parent("/a"), Some(("/", "a")));
        assert_eq!(split_parent("/a/"), None);
        assert_eq!(split_parent("a"), None);
    }
}
