pub mod charge;
pub mod idempotency_record;
