pub mod client;
pub mod signature;

pub use client::{GatewayClient, GatewayError, PaymentOutcome, SubmitPaymentRequest};
pub use signature::integrity_signature;
