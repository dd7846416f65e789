use std::sync::Arc;
use std::time::Instant;

use chargegate_types::charges::{
    Charge, ChargeRequest, ChargeResponse, ChargeStatus, TransitionError,
};
use tracing::{error, info};

use crate::api::db::{DbError, DbManager};
use crate::gateway::{GatewayError, PaymentGateway};
use crate::idempotency::IdempotencyCache;
use crate::metrics::PaymentMetrics;

pub type ChargeResult<T> = Result<T, ChargeError>;

#[derive(Debug, thiserror::Error)]
pub enum ChargeError {
    #[error("Idempotency-Key header is required")]
    MissingIdempotencyKey,
    #[error("Amount must be greater than 0")]
    InvalidAmount,
    #[error("Payment with ID '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    InvalidState(#[from] TransitionError),
    #[error("Storage failure: {0}")]
    Storage(#[from] DbError),
    #[error("Gateway failure: {0}")]
    Gateway(#[from] GatewayError),
}

impl ChargeError {
    /// Distinguishes 404-class outcomes from 400-class ones.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChargeError::NotFound(_))
    }
}

/// Orchestrates the idempotency cache, the charge store, the state machine
/// and the payment gateway behind the four charge operations.
pub struct PaymentService<G: PaymentGateway> {
    store: Arc<DbManager>,
    cache: Arc<IdempotencyCache>,
    gateway: G,
    metrics: Arc<PaymentMetrics>,
}

impl<G: PaymentGateway> PaymentService<G> {
    pub fn new(
        store: Arc<DbManager>,
        cache: Arc<IdempotencyCache>,
        gateway: G,
        metrics: Arc<PaymentMetrics>,
    ) -> Self {
        Self {
            store,
            cache,
            gateway,
            metrics,
        }
    }

    /// Create a charge, deduplicated by `idempotency_key`.
    ///
    /// Validation happens before any cache or store access. The key's cache
    /// slot is the per-key critical section: the first caller processes the
    /// charge while holding it, every racer waits and then replays the cached
    /// response with `is_idempotent` set.
    pub async fn create_charge(
        &self,
        idempotency_key: &str,
        request: ChargeRequest,
    ) -> ChargeResult<ChargeResponse> {
        if idempotency_key.trim().is_empty() {
            return Err(ChargeError::MissingIdempotencyKey);
        }
        if request.amount <= 0 {
            return Err(ChargeError::InvalidAmount);
        }

        let check_started = Instant::now();
        let slot = self.cache.slot(idempotency_key);
        let mut cached = slot.lock().await;

        if let Some(response) = cached.as_ref() {
            self.metrics
                .record_idempotency_check(check_started.elapsed(), true);
            info!(
                idempotency_key,
                payment_id = %response.id,
                "idempotency key found in cache"
            );
            let mut replay = response.clone();
            replay.is_idempotent = true;
            return Ok(replay);
        }
        self.metrics
            .record_idempotency_check(check_started.elapsed(), false);

        match self.process_new_charge(idempotency_key, &request).await {
            Ok(response) => {
                // First-writer-wins: the slot is filled exactly once.
                *cached = Some(response.clone());
                Ok(response)
            }
            Err(err) => {
                // The slot stays empty so a retry with the same key can
                // process again.
                self.metrics.record_payment_failed();
                error!(
                    amount = request.amount,
                    currency = %request.currency,
                    "failed to process payment: {err}"
                );
                Err(err)
            }
        }
    }

    async fn process_new_charge(
        &self,
        idempotency_key: &str,
        request: &ChargeRequest,
    ) -> ChargeResult<ChargeResponse> {
        self.gateway.charge(request).await?;

        let charge = Charge::from_request(request);
        self.store.insert_charge(&charge)?;

        let response = ChargeResponse::from_charge(&charge, false);
        self.store
            .insert_idempotency_record(idempotency_key, &response)?;

        self.metrics
            .record_payment_created(charge.amount, charge.status == ChargeStatus::Succeeded);
        info!(
            payment_id = %charge.id,
            amount = charge.amount,
            currency = %charge.currency,
            status = %charge.status,
            customer_id = charge.customer_id.as_deref().unwrap_or("-"),
            "payment created"
        );
        Ok(response)
    }

    pub fn get_charge(&self, payment_id: &str) -> ChargeResult<ChargeResponse> {
        let charge = self
            .store
            .find_charge(payment_id)?
            .ok_or_else(|| ChargeError::NotFound(payment_id.to_string()))?;
        Ok(ChargeResponse::from_charge(&charge, false))
    }

    pub fn capture_charge(&self, payment_id: &str) -> ChargeResult<ChargeResponse> {
        match self.apply_transition(payment_id, ChargeStatus::capture) {
            Ok(charge) => {
                self.metrics.record_payment_captured();
                info!(
                    payment_id = %charge.id,
                    amount = charge.amount,
                    currency = %charge.currency,
                    "payment captured"
                );
                Ok(ChargeResponse::from_charge(&charge, false))
            }
            Err(err) => {
                if matches!(err, ChargeError::InvalidState(_)) {
                    self.metrics.record_payment_failed();
                }
                Err(err)
            }
        }
    }

    pub fn cancel_charge(&self, payment_id: &str) -> ChargeResult<ChargeResponse> {
        match self.apply_transition(payment_id, ChargeStatus::cancel) {
            Ok(charge) => {
                self.metrics.record_payment_canceled();
                info!(
                    payment_id = %charge.id,
                    amount = charge.amount,
                    currency = %charge.currency,
                    "payment canceled"
                );
                Ok(ChargeResponse::from_charge(&charge, false))
            }
            Err(err) => {
                if matches!(err, ChargeError::InvalidState(_)) {
                    self.metrics.record_payment_failed();
                }
                Err(err)
            }
        }
    }

    /// Fetch, run the transition, persist conditionally. A lost race on the
    /// conditional update means another request moved the charge first;
    /// re-reading then yields the right rejection since concurrent
    /// transitions only move charges toward terminal states.
    fn apply_transition(
        &self,
        payment_id: &str,
        transition: fn(ChargeStatus) -> Result<ChargeStatus, TransitionError>,
    ) -> ChargeResult<Charge> {
        loop {
            let charge = self
                .store
                .find_charge(payment_id)?
                .ok_or_else(|| ChargeError::NotFound(payment_id.to_string()))?;
            let next = transition(charge.status)?;
            if let Some(updated) = self.store.transition_charge(payment_id, charge.status, next)? {
                return Ok(updated);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gateway::SimulatedGateway;

    fn test_service() -> (tempfile::TempDir, Arc<PaymentService<SimulatedGateway>>) {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let path = dir.path().join("chargegate.sqlite");
        let store =
            Arc::new(DbManager::local(path.to_str().unwrap()).expect("Failed to open database"));
        let service = Arc::new(PaymentService::new(
            store,
            Arc::new(IdempotencyCache::new()),
            SimulatedGateway::new(Duration::from_millis(1)),
            Arc::new(PaymentMetrics::new()),
        ));
        (dir, service)
    }

    fn request(amount: i64, capture: Option<bool>) -> ChargeRequest {
        ChargeRequest {
            amount,
            currency: "USD".to_string(),
            description: Some("coffee".to_string()),
            customer_id: Some("cus_42".to_string()),
            payment_method: None,
            capture,
        }
    }

    #[tokio::test]
    async fn create_with_immediate_capture_succeeds() {
        let (_dir, service) = test_service();
        let response = service.create_charge("key-1", request(2500, None)).await.unwrap();
        assert_eq!(response.status, ChargeStatus::Succeeded);
        assert_eq!(response.amount, 2500);
        assert!(!response.is_idempotent);
    }

    #[tokio::test]
    async fn create_with_deferred_capture_is_pending() {
        let (_dir, service) = test_service();
        let response = service
            .create_charge("key-1", request(2500, Some(false)))
            .await
            .unwrap();
        assert_eq!(response.status, ChargeStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_key_replays_first_response() {
        let (_dir, service) = test_service();
        let first = service.create_charge("key-1", request(2500, None)).await.unwrap();

        // A different body under the same key still replays the original.
        let second = service.create_charge("key-1", request(9999, Some(false))).await.unwrap();
        assert!(second.is_idempotent);
        assert_eq!(second.id, first.id);
        assert_eq!(second.amount, 2500);
        assert_eq!(second.status, ChargeStatus::Succeeded);

        assert_eq!(service.store.count_charges().unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_key_is_rejected_without_side_effects() {
        let (_dir, service) = test_service();
        let err = service.create_charge("  ", request(100, None)).await.unwrap_err();
        assert!(matches!(err, ChargeError::MissingIdempotencyKey));
        assert_eq!(service.store.count_charges().unwrap(), 0);
        assert!(service.cache.is_empty());
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected_without_side_effects() {
        let (_dir, service) = test_service();
        for amount in [0, -1] {
            let err = service
                .create_charge("key-1", request(amount, None))
                .await
                .unwrap_err();
            assert!(matches!(err, ChargeError::InvalidAmount));
        }
        assert_eq!(service.store.count_charges().unwrap(), 0);
        assert!(service.cache.is_empty());
    }

    #[tokio::test]
    async fn concurrent_creates_with_one_key_persist_one_charge() {
        let (_dir, service) = test_service();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.create_charge("key-race", request(2500, None)).await
            }));
        }

        let mut responses = Vec::new();
        for handle in handles {
            responses.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(service.store.count_charges().unwrap(), 1);
        let first = &responses[0];
        for response in &responses {
            assert_eq!(response.id, first.id);
            assert_eq!(response.amount, first.amount);
            assert_eq!(response.status, first.status);
        }
        // Exactly one response came from fresh processing.
        let fresh = responses.iter().filter(|r| !r.is_idempotent).count();
        assert_eq!(fresh, 1);
    }

    #[tokio::test]
    async fn get_returns_not_found_for_unknown_id() {
        let (_dir, service) = test_service();
        let err = service.get_charge("ch_unknown").unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn capture_moves_succeeded_to_captured_once() {
        let (_dir, service) = test_service();
        let created = service.create_charge("key-1", request(2500, None)).await.unwrap();

        let captured = service.capture_charge(&created.id).unwrap();
        assert_eq!(captured.status, ChargeStatus::Captured);

        let err = service.capture_charge(&created.id).unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(
            err,
            ChargeError::InvalidState(TransitionError::AlreadyCaptured)
        ));
        assert_eq!(
            service.get_charge(&created.id).unwrap().status,
            ChargeStatus::Captured
        );
    }

    #[tokio::test]
    async fn cancel_after_capture_is_rejected_with_refund_hint() {
        let (_dir, service) = test_service();
        let created = service.create_charge("key-1", request(2500, None)).await.unwrap();
        service.capture_charge(&created.id).unwrap();

        let err = service.cancel_charge(&created.id).unwrap_err();
        assert!(err.to_string().contains("refund"));
        assert_eq!(
            service.get_charge(&created.id).unwrap().status,
            ChargeStatus::Captured
        );
    }

    #[tokio::test]
    async fn capture_and_cancel_on_unknown_id_are_not_found() {
        let (_dir, service) = test_service();
        assert!(service.capture_charge("ch_unknown").unwrap_err().is_not_found());
        assert!(service.cancel_charge("ch_unknown").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn deferred_capture_round_trip() {
        let (_dir, service) = test_service();
        let created = service
            .create_charge("key-1", request(2500, Some(false)))
            .await
            .unwrap();
        assert_eq!(created.status, ChargeStatus::Pending);

        let captured = service.capture_charge(&created.id).unwrap();
        assert_eq!(captured.status, ChargeStatus::Captured);

        let err = service.cancel_charge(&created.id).unwrap_err();
        assert!(matches!(
            err,
            ChargeError::InvalidState(TransitionError::CancelCaptured)
        ));
    }

    #[tokio::test]
    async fn cancel_pending_charge_succeeds_once() {
        let (_dir, service) = test_service();
        let created = service
            .create_charge("key-1", request(2500, Some(false)))
            .await
            .unwrap();

        let canceled = service.cancel_charge(&created.id).unwrap();
        assert_eq!(canceled.status, ChargeStatus::Canceled);

        let err = service.cancel_charge(&created.id).unwrap_err();
        assert!(matches!(
            err,
            ChargeError::InvalidState(TransitionError::AlreadyCanceled)
        ));

        let err = service.capture_charge(&created.id).unwrap_err();
        assert!(matches!(
            err,
            ChargeError::InvalidState(TransitionError::CaptureCanceled)
        ));
    }

    #[tokio::test]
    async fn create_writes_durable_idempotency_record() {
        let (_dir, service) = test_service();
        let response = service.create_charge("key-1", request(2500, None)).await.unwrap();

        let record = service
            .store
            .find_idempotency_record("key-1")
            .unwrap()
            .unwrap();
        assert_eq!(record.charge_id, response.id);
    }
}
