use axum::{Json, extract::State, response::IntoResponse};

use crate::api::ApiState;
use crate::gateway::PaymentGateway;

/// GET /metrics - Snapshot of the metrics registry
pub async fn handler<G: PaymentGateway>(State(state): State<ApiState<G>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
