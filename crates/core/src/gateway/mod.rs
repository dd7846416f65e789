use std::future::Future;
use std::time::Duration;

use chargegate_types::charges::ChargeRequest;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment processor declined the charge: {0}")]
    Declined(String),
    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),
}

/// External payment processor seam. The charge service only sees this trait,
/// so a real integration can replace the simulation without touching the
/// state machine.
pub trait PaymentGateway: Send + Sync + 'static {
    fn charge(
        &self,
        request: &ChargeRequest,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Stand-in for a real processor: a fixed delay, then approval. The delay is
/// the only intentional suspension point in a create and carries no
/// cancellation semantics.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    latency: Duration,
}

impl SimulatedGateway {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<(), GatewayError> {
        tokio::time::sleep(self.latency).await;
        debug!(
            amount = request.amount,
            currency = %request.currency,
            "simulated processor approved charge"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_gateway_approves() {
        let gateway = SimulatedGateway::new(Duration::from_millis(1));
        let request = ChargeRequest {
            amount: 100,
            currency: "USD".to_string(),
            description: None,
            customer_id: None,
            payment_method: None,
            capture: None,
        };
        assert!(gateway.charge(&request).await.is_ok());
    }
}
