//! Application state shared across handlers.

use gateway_orchestrator::Gateway;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// The gateway being administered
    pub gateway: Arc<Gateway>,
    started_at: Instant,
}

impl AppState {
    /// Create state around a gateway
    #[must_use]
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            started_at: Instant::now(),
        }
    }

    /// Time since the state was created
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
