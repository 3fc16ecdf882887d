//! Task connecting a registry watch source to a [`Dispatcher`].
//!
//! The watch source pushes [`RawChange`]s into a bounded channel. A single
//! bridge task drains it in arrival order, types each change through a
//! [`WatchState`], and hands the resulting events to the dispatcher, so
//! per-path ordering is exactly the order the source produced.
//!
//! Listeners are synchronous and may take arbitrarily long, so each change is
//! translated and delivered on the blocking pool. The bridge awaits that batch
//! before it takes the next change.

use std::sync::{Arc, Mutex, PoisonError};

use lodestar_remoting::{Dispatcher, RawChange, RemotingError, WatchState};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{RegistryError, Result};

/// Counters returned when the bridge stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Raw changes received.
    pub changes: usize,
    /// Raw changes rejected as malformed.
    pub rejected: usize,
    /// Typed events handed to the dispatcher.
    pub events: usize,
    /// Listener invocations that panicked.
    pub listener_failures: usize,
}

/// Sending half used by a watch source.
#[derive(Clone, Debug)]
pub struct ChangeSink {
    tx: mpsc::Sender<RawChange>,
}

impl ChangeSink {
    /// Queue a change, waiting for capacity.
    pub async fn send(&self, change: RawChange) -> Result<()> {
        self.tx
            .send(change)
            .await
            .map_err(|_| RegistryError::BridgeClosed)
    }

    /// Queue a change without waiting. Fails when the queue is full or closed.
    pub fn try_send(&self, change: RawChange) -> Result<()> {
        self.tx.try_send(change).map_err(|_| RegistryError::BridgeClosed)
    }
}

/// Drains raw changes into a dispatcher until closed or shut down.
pub struct WatchBridge {
    dispatcher: Dispatcher,
    state: Arc<Mutex<WatchState>>,
    changes: mpsc::Receiver<RawChange>,
    shutdown: broadcast::Receiver<()>,
}

impl WatchBridge {
    /// Create a bridge and the sink feeding it.
    pub fn channel(
        dispatcher: Dispatcher,
        capacity: usize,
        shutdown: broadcast::Receiver<()>,
    ) -> (ChangeSink, Self) {
        let (tx, changes) = mpsc::channel(capacity.max(1));
        let bridge = Self {
            dispatcher,
            state: Arc::new(Mutex::new(WatchState::new())),
            changes,
            shutdown,
        };
        (ChangeSink { tx }, bridge)
    }

    /// Run on a new tokio task.
    pub fn spawn(self) -> JoinHandle<BridgeStats> {
        tokio::spawn(self.run())
    }

    /// Process changes until every sink is dropped or shutdown is signalled.
    ///
    /// Changes already queued when shutdown arrives are not processed.
    pub async fn run(mut self) -> BridgeStats {
        let mut stats = BridgeStats::default();
        info!("watch bridge started");

        loop {
            let change = tokio::select! {
                biased;
                _ = self.shutdown.recv() => {
                    info!("watch bridge shutdown signal received");
                    break;
                }
                change = self.changes.recv() => change,
            };
            let Some(change) = change else {
                debug!("all change sinks dropped");
                break;
            };
            self.apply(change, &mut stats).await;
        }

        info!(
            changes = stats.changes,
            events = stats.events,
            rejected = stats.rejected,
            "watch bridge stopped"
        );
        stats
    }

    async fn apply(&self, change: RawChange, stats: &mut BridgeStats) {
        stats.changes += 1;
        let path = change.path().to_string();
        let state = Arc::clone(&self.state);
        let dispatcher = self.dispatcher.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let events = state.translate(change).map_err(Rejection::Malformed)?;
            let report = dispatcher
                .notify_all(&events)
                .map_err(Rejection::Dispatch)?;
            Ok::<_, Rejection>((events.len(), report.failures.len()))
        })
        .await;

        match outcome {
            Ok(Ok((events, failures))) => {
                stats.events += events;
                stats.listener_failures += failures;
            }
            Ok(Err(Rejection::Malformed(e))) => {
                stats.rejected += 1;
                warn!(%path, error = %e, "dropping malformed raw change");
            }
            Ok(Err(Rejection::Dispatch(e))) => {
                stats.rejected += 1;
                warn!(%path, error = %e, "dispatcher rejected translated events");
            }
            Err(e) => {
                stats.rejected += 1;
                error!(%path, error = %e, "delivery task failed");
            }
        }
    }
}

enum Rejection {
    Malformed(RemotingError),
    Dispatch(RemotingError),
}
