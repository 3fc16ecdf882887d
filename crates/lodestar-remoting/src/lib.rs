//! # lodestar-remoting
//!
//! Registry change-notification core for the Lodestar RPC framework.
//!
//! - [`event`] - [`EventType`] taxonomy and the immutable [`Event`] record
//! - [`listener`] - the [`DataListener`] callback contract
//! - [`dispatcher`] - path-keyed listener registry and broadcast delivery
//! - [`watch`] - translation of raw coordination-service notifications into typed events
//!
//! ## Delivery rules
//!
//! | Rule | Behaviour |
//! |---|---|
//! | Fan-out | every matching listener receives every event |
//! | Order | exact-path tier first, then prefix tiers deepest-first, registration order within a tier |
//! | Duplicates | a listener runs at most once per event |
//! | Failures | a panicking listener is logged and counted as not interested |

pub mod dispatcher;
pub mod event;
pub mod listener;
pub mod watch;

pub use dispatcher::{DeliveryReport, Dispatcher, SubscriptionKind};
pub use event::{Event, EventType};
pub use listener::{DataListener, FnListener};
pub use watch::{RawChange, WatchState};

/// Path separator used by registry node paths.
pub const PATH_SEPARATOR: char = '/';

/// Error types for the notification core.
#[derive(Debug, thiserror::Error)]
pub enum RemotingError {
    /// A required argument was empty or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A raw integer did not map onto an [`EventType`].
    #[error("invalid event type: {0}")]
    InvalidEventType(i64),

    /// A listener panicked while handling an event.
    #[error("listener failed on {path}: {message}")]
    ListenerFailure {
        /// Path of the event being delivered.
        path: String,
        /// Panic payload rendered as text.
        message: String,
    },
}

/// Convenience result type for notification operations.
pub type Result<T> = std::result::Result<T, RemotingError>;

/// Reject an empty subscription key or event path.
pub(crate) fn ensure_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(RemotingError::InvalidArgument("path must not be empty".to_string()));
    }
    Ok(())
}
