//! Change events observed on registry resources.
//!
//! An [`Event`] is built once, when the watch source observes a change, and
//! is never mutated afterwards. Equality is structural over
//! `(path, action, content)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ensure_path, RemotingError, Result};

/// Kind of change an [`Event`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EventType {
    /// A resource appeared.
    Add = 0,
    /// A resource disappeared.
    Delete = 1,
    /// A resource changed its state.
    Update = 2,
}

impl EventType {
    /// All variants in discriminant order.
    pub const ALL: [EventType; 3] = [EventType::Add, EventType::Delete, EventType::Update];

    /// Fixed textual rendering.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Add => "add",
            EventType::Delete => "delete",
            EventType::Update => "update",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for EventType {
    type Error = RemotingError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(EventType::Add),
            1 => Ok(EventType::Delete),
            2 => Ok(EventType::Update),
            other => Err(RemotingError::InvalidEventType(other)),
        }
    }
}

impl From<EventType> for i64 {
    fn from(value: EventType) -> Self {
        value as u8 as i64
    }
}

impl FromStr for EventType {
    type Err = RemotingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(EventType::Add),
            "delete" => Ok(EventType::Delete),
            "update" => Ok(EventType::Update),
            other => Err(RemotingError::InvalidArgument(format!(
                "unknown event type {other:?}"
            ))),
        }
    }
}

/// A single observed change to a registry resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct Event {
    path: String,
    action: EventType,
    content: String,
}

/// Unvalidated wire shape of an [`Event`].
#[derive(Deserialize)]
struct EventRecord {
    path: String,
    action: EventType,
    #[serde(default)]
    content: String,
}

impl TryFrom<EventRecord> for Event {
    type Error = RemotingError;

    fn try_from(record: EventRecord) -> Result<Self> {
        Event::new(record.path, record.action, record.content)
    }
}

impl Event {
    /// Create an event. Fails with `InvalidArgument` when `path` is empty.
    pub fn new(
        path: impl Into<String>,
        action: EventType,
        content: impl Into<String>,
    ) -> Result<Self> {
        let path = path.into();
        ensure_path(&path)?;
        Ok(Self {
            path,
            action,
            content: content.into(),
        })
    }

    /// Create an `Add` event carrying the new resource state.
    pub fn added(path: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        Self::new(path, EventType::Add, content)
    }

    /// Create an `Update` event carrying the changed resource state.
    pub fn updated(path: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        Self::new(path, EventType::Update, content)
    }

    /// Create a `Delete` event. Content is empty.
    pub fn deleted(path: impl Into<String>) -> Result<Self> {
        Self::new(path, EventType::Delete, String::new())
    }

    /// Path of the affected resource.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Kind of change.
    pub fn action(&self) -> EventType {
        self.action
    }

    /// Serialized resource state at the time of the change.
    pub fn content(&self) -> &str {
        &self.content
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event{{Action{{{}}}, Content{{{}}}}}",
            self.action, self.content
        )
    }
}
