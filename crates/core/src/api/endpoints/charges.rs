use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use chargegate_types::charges::{ChargeRequest, ChargeResponse};

use crate::api::ApiState;
use crate::gateway::PaymentGateway;
use crate::service::ChargeError;

/// Maps service failures onto the HTTP surface: validation and invalid-state
/// rejections are 400, unknown charges are 404, storage/gateway failures are
/// 500. Bodies are always `{"error": <reason>}`.
pub struct ApiError(ChargeError);

impl From<ChargeError> for ApiError {
    fn from(err: ChargeError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChargeError::MissingIdempotencyKey
            | ChargeError::InvalidAmount
            | ChargeError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ChargeError::NotFound(_) => StatusCode::NOT_FOUND,
            ChargeError::Storage(_) | ChargeError::Gateway(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// POST /v1/payments/charge - Create a payment charge
///
/// Requires an `Idempotency-Key` header; retries bearing the same key replay
/// the original response instead of creating a second charge.
pub async fn create_charge<G: PaymentGateway>(
    State(state): State<ApiState<G>>,
    headers: HeaderMap,
    Json(request): Json<ChargeRequest>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let response = state.service.create_charge(idempotency_key, request).await?;
    Ok(Json(response))
}

/// GET /v1/payments/{payment_id} - Get payment details by ID
pub async fn get_payment<G: PaymentGateway>(
    State(state): State<ApiState<G>>,
    Path(payment_id): Path<String>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let response = state.service.get_charge(&payment_id)?;
    Ok(Json(response))
}

/// PATCH /v1/payments/{payment_id}/capture - Capture a pending payment
pub async fn capture_payment<G: PaymentGateway>(
    State(state): State<ApiState<G>>,
    Path(payment_id): Path<String>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let response = state.service.capture_charge(&payment_id)?;
    Ok(Json(response))
}

/// PATCH /v1/payments/{payment_id}/cancel - Cancel a payment
pub async fn cancel_payment<G: PaymentGateway>(
    State(state): State<ApiState<G>>,
    Path(payment_id): Path<String>,
) -> Result<Json<ChargeResponse>, ApiError> {
    let response = state.service.cancel_charge(&payment_id)?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use chargegate_types::charges::TransitionError;

    use super::*;
    use crate::api::db::DbError;

    fn status_for(err: ChargeError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn validation_and_invalid_state_map_to_400() {
        assert_eq!(
            status_for(ChargeError::MissingIdempotencyKey),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(ChargeError::InvalidAmount), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ChargeError::InvalidState(TransitionError::AlreadyCaptured)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unknown_charge_maps_to_404() {
        assert_eq!(
            status_for(ChargeError::NotFound("ch_missing".to_string())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn storage_failures_map_to_500() {
        assert_eq!(
            status_for(ChargeError::Storage(DbError::ConnectionError(
                "pool exhausted".to_string()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
