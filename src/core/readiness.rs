//! Readiness of the exporter.
//!
//! The exporter is not ready until the first refresh cycle has run, because
//! before that the metrics endpoint would serve an empty or partial set of
//! metrics. Once the orchestrator stops, readiness drops again.

use std::fmt;

use tokio::sync::watch;
use tracing::debug;

/// Current readiness of the exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    /// No refresh cycle has completed yet.
    Starting,
    /// At least one refresh cycle has completed.
    Ready,
    /// The refresh loop was cancelled.
    Stopping,
}

impl ReadinessState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessState::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessState::Starting => "starting",
            ReadinessState::Ready => "ready",
            ReadinessState::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared readiness tracker backed by a watch channel.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct Readiness {
    state_tx: watch::Sender<ReadinessState>,
}

impl Readiness {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ReadinessState::Starting);
        Self { state_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> ReadinessState {
        self.state_tx.borrow().clone()
    }

    /// Moves to `state`. Setting the current state again is a no-op.
    pub fn set_state(&self, state: ReadinessState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!("Readiness changed: {} -> {}", current, state);
            *current = state;
            true
        });
        if !changed {
            debug!("Readiness unchanged");
        }
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}
