use axum::{Json, response::IntoResponse};

pub async fn handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "chargegate",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
