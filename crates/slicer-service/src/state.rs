use slicer_core::SlicerCore;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<SlicerCore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(core: Arc<SlicerCore>) -> Self {
        Self {
            core,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
