use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

/// In-memory operational counters, the way the teacher's
/// `BundlerService::get_metrics` surfaces queue/worker state without a
/// Prometheus endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    queue_depth: u32,
    active_slice_workers: u32,
    rate_limit_rejections: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        uptime_seconds: state.uptime_seconds(),
        queue_depth: state.core.queue.pending_count(),
        active_slice_workers: state.core.queue.active_workers(),
        rate_limit_rejections: state.core.rate_limiter.rejection_count(),
    })
}
