//! Shutdown coordination for long-running loops

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Shutdown signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Finish the event in hand, then stop
    Graceful,
    /// Stop without draining
    Immediate,
}

/// Shutdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

/// Broadcasts a stop request to every subscribed loop
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self { state: Arc::new(RwLock::new(ShutdownState::Running)), shutdown_tx }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// Ask subscribers to stop after their current unit of work
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if *state != ShutdownState::Running {
            warn!("Shutdown already in progress");
            return;
        }
        *state = ShutdownState::ShuttingDown;
        drop(state);

        info!("Initiating graceful shutdown");
        self.broadcast(ShutdownSignal::Graceful);
    }

    pub async fn shutdown_immediately(&self) {
        warn!("Initiating immediate shutdown");
        *self.state.write().await = ShutdownState::Shutdown;
        self.broadcast(ShutdownSignal::Immediate);
    }

    /// Record that every subscriber has stopped
    pub async fn mark_stopped(&self) {
        *self.state.write().await = ShutdownState::Shutdown;
        info!("Shutdown complete");
    }

    fn broadcast(&self, signal: ShutdownSignal) {
        // No receivers means nothing is running; that is not a failure
        if self.shutdown_tx.receiver_count() == 0 {
            return;
        }
        if let Err(e) = self.shutdown_tx.send(signal) {
            error!("Failed to send shutdown signal: {}", e);
        }
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.state.read().await != ShutdownState::Running
    }

    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }
}
