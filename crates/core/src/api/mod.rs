use std::sync::Arc;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, patch, post},
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::info;

pub mod db;
pub mod endpoints;

use crate::gateway::PaymentGateway;
use crate::metrics::PaymentMetrics;
use crate::service::PaymentService;

pub struct ApiConfig {
    /// API host interface (e.g. "127.0.0.1")
    pub host: String,
    /// API port (e.g. 8488)
    pub port: u16,
}

pub struct ApiState<G: PaymentGateway> {
    pub service: Arc<PaymentService<G>>,
    pub metrics: Arc<PaymentMetrics>,
}

// Manual impl: the state only holds handles, so `G: Clone` must not be
// required.
impl<G: PaymentGateway> Clone for ApiState<G> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn create_router<G: PaymentGateway>(state: ApiState<G>) -> Router<()> {
    let metrics = state.metrics.clone();

    Router::new()
        .route("/", get(endpoints::health::handler))
        .route("/metrics", get(endpoints::metrics::handler::<G>))
        .route(
            "/v1/payments/charge",
            post(endpoints::charges::create_charge::<G>),
        )
        .route(
            "/v1/payments/{payment_id}",
            get(endpoints::charges::get_payment::<G>),
        )
        .route(
            "/v1/payments/{payment_id}/capture",
            patch(endpoints::charges::capture_payment::<G>),
        )
        .route(
            "/v1/payments/{payment_id}/cancel",
            patch(endpoints::charges::cancel_payment::<G>),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            metrics,
            endpoints::middleware::record_metrics,
        ))
        .layer(axum_middleware::from_fn(endpoints::middleware::log_requests))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CorsLayer::permissive())
}

/// Start the charge API server on the configured address.
pub async fn start_api_server<G: PaymentGateway>(
    config: &ApiConfig,
    state: ApiState<G>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting chargegate API server on {}", addr);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
