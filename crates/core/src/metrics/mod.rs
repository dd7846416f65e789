use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Process-wide metrics registry. Constructed once at startup and passed by
/// handle; counters are plain atomics and a snapshot is served from the
/// `/metrics` endpoint.
#[derive(Debug, Default)]
pub struct PaymentMetrics {
    // RED metrics
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    request_duration_us_total: AtomicU64,

    // Business metrics
    payments_created_total: AtomicU64,
    payments_created_captured_total: AtomicU64,
    payments_captured_total: AtomicU64,
    payments_canceled_total: AtomicU64,
    payments_failed_total: AtomicU64,
    payment_amount_cents_total: AtomicU64,
    payment_amount_observations: AtomicU64,

    // Idempotency metrics
    idempotency_checks_total: AtomicU64,
    idempotency_hits_total: AtomicU64,
    idempotency_check_duration_us_total: AtomicU64,
}

impl PaymentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, status: u16, duration: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.request_duration_us_total
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if status >= 400 {
            self.errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_payment_created(&self, amount_cents: i64, captured: bool) {
        self.payments_created_total.fetch_add(1, Ordering::Relaxed);
        self.payment_amount_cents_total
            .fetch_add(amount_cents.max(0) as u64, Ordering::Relaxed);
        self.payment_amount_observations
            .fetch_add(1, Ordering::Relaxed);
        if captured {
            self.payments_created_captured_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_payment_captured(&self) {
        self.payments_captured_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payment_canceled(&self) {
        self.payments_canceled_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payment_failed(&self) {
        self.payments_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idempotency_check(&self, duration: Duration, hit: bool) {
        self.idempotency_checks_total.fetch_add(1, Ordering::Relaxed);
        self.idempotency_check_duration_us_total
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if hit {
            self.idempotency_hits_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            http: HttpSnapshot {
                requests_total: self.requests_total.load(Ordering::Relaxed),
                errors_total: self.errors_total.load(Ordering::Relaxed),
                request_duration_ms_total: self.request_duration_us_total.load(Ordering::Relaxed)
                    as f64
                    / 1_000.0,
            },
            payments: PaymentsSnapshot {
                created_total: self.payments_created_total.load(Ordering::Relaxed),
                created_captured_total: self
                    .payments_created_captured_total
                    .load(Ordering::Relaxed),
                captured_total: self.payments_captured_total.load(Ordering::Relaxed),
                canceled_total: self.payments_canceled_total.load(Ordering::Relaxed),
                failed_total: self.payments_failed_total.load(Ordering::Relaxed),
                amount_cents_total: self.payment_amount_cents_total.load(Ordering::Relaxed),
                amount_observations: self.payment_amount_observations.load(Ordering::Relaxed),
            },
            idempotency: IdempotencySnapshot {
                checks_total: self.idempotency_checks_total.load(Ordering::Relaxed),
                hits_total: self.idempotency_hits_total.load(Ordering::Relaxed),
                check_duration_ms_total: self
                    .idempotency_check_duration_us_total
                    .load(Ordering::Relaxed) as f64
                    / 1_000.0,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub http: HttpSnapshot,
    pub payments: PaymentsSnapshot,
    pub idempotency: IdempotencySnapshot,
}

#[derive(Debug, Serialize)]
pub struct HttpSnapshot {
    pub requests_total: u64,
    pub errors_total: u64,
    pub request_duration_ms_total: f64,
}

#[derive(Debug, Serialize)]
pub struct PaymentsSnapshot {
    pub created_total: u64,
    pub created_captured_total: u64,
    pub captured_total: u64,
    pub canceled_total: u64,
    pub failed_total: u64,
    pub amount_cents_total: u64,
    pub amount_observations: u64,
}

#[derive(Debug, Serialize)]
pub struct IdempotencySnapshot {
    pub checks_total: u64,
    pub hits_total: u64,
    pub check_duration_ms_total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_counters_track_errors() {
        let metrics = PaymentMetrics::new();
        metrics.record_request(200, Duration::from_millis(5));
        metrics.record_request(404, Duration::from_millis(3));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.http.requests_total, 2);
        assert_eq!(snapshot.http.errors_total, 1);
        assert!(snapshot.http.request_duration_ms_total >= 8.0);
    }

    #[test]
    fn created_counters_distinguish_immediate_capture() {
        let metrics = PaymentMetrics::new();
        metrics.record_payment_created(2500, true);
        metrics.record_payment_created(100, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.payments.created_total, 2);
        assert_eq!(snapshot.payments.created_captured_total, 1);
        assert_eq!(snapshot.payments.captured_total, 0);
        assert_eq!(snapshot.payments.amount_cents_total, 2600);
        assert_eq!(snapshot.payments.amount_observations, 2);
    }

    #[test]
    fn idempotency_hits_are_a_subset_of_checks() {
        let metrics = PaymentMetrics::new();
        metrics.record_idempotency_check(Duration::from_micros(50), false);
        metrics.record_idempotency_check(Duration::from_micros(20), true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.idempotency.checks_total, 2);
        assert_eq!(snapshot.idempotency.hits_total, 1);
    }
}
