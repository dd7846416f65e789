use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a charge.
///
/// `captured`, `canceled` and `refunded` are terminal. No transition produces
/// `refunded` yet; the status is reserved for a future refund flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Pending,
    Succeeded,
    Captured,
    Canceled,
    Refunded,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    // Capture errors
    #[error("Payment has already been captured")]
    AlreadyCaptured,
    #[error("Cannot capture a canceled payment")]
    CaptureCanceled,
    #[error("Cannot capture payment with status '{0}'")]
    CaptureInvalidStatus(ChargeStatus),

    // Cancel errors
    #[error("Payment has already been canceled")]
    AlreadyCanceled,
    #[error("Cannot cancel a captured payment. Please use refund instead.")]
    CancelCaptured,
    #[error("Cannot cancel a refunded payment")]
    CancelRefunded,
}

#[derive(thiserror::Error, Debug)]
#[error("Unknown charge status '{0}'")]
pub struct UnknownStatus(pub String);

impl ChargeStatus {
    /// Initial status of a freshly created charge: deferred capture starts
    /// `pending`, immediate capture starts `succeeded`.
    pub fn initial(capture: bool) -> Self {
        if capture {
            ChargeStatus::Succeeded
        } else {
            ChargeStatus::Pending
        }
    }

    pub fn capture(self) -> Result<Self, TransitionError> {
        match self {
            ChargeStatus::Pending | ChargeStatus::Succeeded => Ok(ChargeStatus::Captured),
            ChargeStatus::Captured => Err(TransitionError::AlreadyCaptured),
            ChargeStatus::Canceled => Err(TransitionError::CaptureCanceled),
            other => Err(TransitionError::CaptureInvalidStatus(other)),
        }
    }

    pub fn cancel(self) -> Result<Self, TransitionError> {
        match self {
            ChargeStatus::Pending | ChargeStatus::Succeeded => Ok(ChargeStatus::Canceled),
            ChargeStatus::Captured => Err(TransitionError::CancelCaptured),
            ChargeStatus::Canceled => Err(TransitionError::AlreadyCanceled),
            ChargeStatus::Refunded => Err(TransitionError::CancelRefunded),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChargeStatus::Captured | ChargeStatus::Canceled | ChargeStatus::Refunded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Succeeded => "succeeded",
            ChargeStatus::Captured => "captured",
            ChargeStatus::Canceled => "canceled",
            ChargeStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChargeStatus::Pending),
            "succeeded" => Ok(ChargeStatus::Succeeded),
            "captured" => Ok(ChargeStatus::Captured),
            "canceled" => Ok(ChargeStatus::Canceled),
            "refunded" => Ok(ChargeStatus::Refunded),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// The durable record of one payment attempt. After creation only `status`
/// ever mutates, and only through [`ChargeStatus`] transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub status: ChargeStatus,
    /// Amount in integer minor-units (e.g. cents).
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub customer_id: Option<String>,
    pub payment_method_type: Option<String>,
    pub card_last4: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Charge {
    /// Build a new charge from a request, assigning a fresh id and running
    /// the state machine's initial transition.
    pub fn from_request(request: &ChargeRequest) -> Self {
        Charge {
            id: format!("ch_{}", Uuid::new_v4().simple()),
            status: ChargeStatus::initial(request.capture_requested()),
            amount: request.amount,
            currency: request.currency.clone(),
            description: request.description.clone(),
            customer_id: request.customer_id.clone(),
            payment_method_type: request
                .payment_method
                .as_ref()
                .map(|pm| pm.method_type.clone()),
            card_last4: request.payment_method.as_ref().and_then(|pm| pm.card_last4()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Amount in integer minor-units, must be > 0.
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethodDetails>,
    /// When false, the charge is created `pending` and must be captured
    /// explicitly. Defaults to true.
    #[serde(default)]
    pub capture: Option<bool>,
}

impl ChargeRequest {
    pub fn capture_requested(&self) -> bool {
        self.capture.unwrap_or(true)
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    #[serde(rename = "type", default = "default_method_type")]
    pub method_type: String,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub cardholder_name: Option<String>,
    #[serde(default)]
    pub expiry_month: Option<u32>,
    #[serde(default)]
    pub expiry_year: Option<u32>,
    #[serde(default)]
    pub cvv: Option<String>,
}

impl PaymentMethodDetails {
    /// Last four digits of the card number. The full number is never stored.
    pub fn card_last4(&self) -> Option<String> {
        self.card_number
            .as_ref()
            .filter(|n| n.len() >= 4)
            .map(|n| n[n.len() - 4..].to_string())
    }
}

fn default_method_type() -> String {
    "card".to_string()
}

/// Externally visible projection of a [`Charge`]. `is_idempotent` marks
/// whether this particular response was replayed from the idempotency cache;
/// it is per-response and never persisted on the charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeResponse {
    pub id: String,
    pub status: ChargeStatus,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_idempotent: bool,
}

impl ChargeResponse {
    pub fn from_charge(charge: &Charge, is_idempotent: bool) -> Self {
        ChargeResponse {
            id: charge.id.clone(),
            status: charge.status,
            amount: charge.amount,
            currency: charge.currency.clone(),
            description: charge.description.clone(),
            customer_id: charge.customer_id.clone(),
            created_at: charge.created_at,
            is_idempotent,
        }
    }
}
