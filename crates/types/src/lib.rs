pub mod charges;

pub use charges::{
    Charge, ChargeRequest, ChargeResponse, ChargeStatus, PaymentMethodDetails, TransitionError,
};
