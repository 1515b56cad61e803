use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{Config, Error as FailsafeError, StateMachine, backoff, failure_policy};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::db::models::TransactionStatus;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gateway rejected the request ({http_status}): {reason}")]
    Rejected { http_status: u16, reason: String },
    #[error("invalid response from payment gateway: {0}")]
    InvalidResponse(String),
    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl GatewayError {
    /// Human-readable reason safe to surface to the caller. The raw gateway
    /// error never leaves the orchestrator boundary.
    pub fn reason(&self) -> String {
        match self {
            GatewayError::Rejected { reason, .. } => reason.clone(),
            GatewayError::CircuitBreakerOpen(_) => {
                "Payment gateway temporarily unavailable".to_string()
            }
            _ => "Payment gateway request failed".to_string(),
        }
    }
}

/// Everything the orchestrator has resolved for one payment submission.
#[derive(Debug, Clone)]
pub struct SubmitPaymentRequest {
    pub amount_in_cents: i64,
    pub currency: String,
    pub customer_email: String,
    pub card_token: String,
    pub reference: String,
    pub acceptance_token: String,
    pub signature: String,
}

/// The gateway's answer to a submit or status query.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub external_id: String,
    pub status: TransactionStatus,
}

// Wire format of POST {base}/transactions.
#[derive(Serialize)]
struct GatewayTransactionBody {
    amount_in_cents: i64,
    currency: String,
    customer_email: String,
    payment_method: GatewayPaymentMethod,
    reference: String,
    acceptance_token: String,
    signature: String,
}

#[derive(Serialize)]
struct GatewayPaymentMethod {
    #[serde(rename = "type")]
    kind: &'static str,
    token: String,
    installments: u32,
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope {
    data: GatewayTransactionData,
}

#[derive(Debug, Deserialize)]
struct GatewayTransactionData {
    id: String,
    status: TransactionStatus,
}

#[derive(Debug, Deserialize, Default)]
struct GatewayErrorBody {
    error: Option<GatewayErrorDetail>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetail {
    reason: Option<String>,
}

/// HTTP client for the external card-payment gateway.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    private_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl GatewayClient {
    pub fn new(base_url: String, private_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        GatewayClient {
            client,
            base_url,
            private_key,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker.
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Submits a signed payment request. The gateway authorizes synchronously
    /// when it can; a PENDING outcome means it will settle asynchronously.
    pub async fn submit_payment(
        &self,
        request: &SubmitPaymentRequest,
    ) -> Result<PaymentOutcome, GatewayError> {
        let url = format!("{}/transactions", self.base_url.trim_end_matches('/'));
        let body = GatewayTransactionBody {
            amount_in_cents: request.amount_in_cents,
            currency: request.currency.clone(),
            customer_email: request.customer_email.clone(),
            payment_method: GatewayPaymentMethod {
                kind: "CARD",
                token: request.card_token.clone(),
                installments: 1,
            },
            reference: request.reference.clone(),
            acceptance_token: request.acceptance_token.clone(),
            signature: request.signature.clone(),
        };
        let client = self.client.clone();
        let private_key = self.private_key.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(&private_key)
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let reason = extract_reason(response).await;
                    return Err(GatewayError::Rejected {
                        http_status: status.as_u16(),
                        reason,
                    });
                }

                let envelope = response
                    .json::<GatewayEnvelope>()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

                Ok(PaymentOutcome {
                    external_id: envelope.data.id,
                    status: envelope.data.status,
                })
            })
            .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Polls the gateway for the current status of a submitted transaction.
    pub async fn query_status(
        &self,
        external_id: &str,
    ) -> Result<TransactionStatus, GatewayError> {
        let url = format!(
            "{}/transactions/{}",
            self.base_url.trim_end_matches('/'),
            external_id
        );
        let client = self.client.clone();
        let private_key = self.private_key.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).bearer_auth(&private_key).send().await?;

                let status = response.status();
                if !status.is_success() {
                    let reason = extract_reason(response).await;
                    return Err(GatewayError::Rejected {
                        http_status: status.as_u16(),
                        reason,
                    });
                }

                let envelope = response
                    .json::<GatewayEnvelope>()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

                Ok(envelope.data.status)
            })
            .await;

        match result {
            Ok(status) => Ok(status),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

// The gateway reports failures as {error: {reason}} with a top-level
// {message} fallback on some endpoints.
async fn extract_reason(response: reqwest::Response) -> String {
    match response.json::<GatewayErrorBody>().await {
        Ok(body) => body
            .error
            .and_then(|e| e.reason)
            .or(body.message)
            .unwrap_or_else(|| "Payment gateway rejected the transaction".to_string()),
        Err(_) => "Payment gateway rejected the transaction".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_request() -> SubmitPaymentRequest {
        SubmitPaymentRequest {
            amount_in_cents: 451_250_000,
            currency: "COP".to_string(),
            customer_email: "jane@example.com".to_string(),
            card_token: "tok_test_1234".to_string(),
            reference: "TX-a1b2c3d4".to_string(),
            acceptance_token: "acc_test_5678".to_string(),
            signature: "deadbeef".to_string(),
        }
    }

    #[test]
    fn test_gateway_client_creation() {
        let client = GatewayClient::new(
            "https://sandbox.gateway.test/v1".to_string(),
            "prv_test_key".to_string(),
        );
        assert_eq!(client.base_url, "https://sandbox.gateway.test/v1");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_submit_payment_approved() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/transactions")
            .match_header("authorization", "Bearer prv_test_key")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": {"id": "gw-tx-001", "status": "APPROVED"}}"#)
            .create_async()
            .await;

        let client = GatewayClient::new(server.url(), "prv_test_key".to_string());
        let outcome = client.submit_payment(&test_request()).await.unwrap();

        assert_eq!(outcome.external_id, "gw-tx-001");
        assert_eq!(outcome.status, TransactionStatus::Approved);
    }

    #[tokio::test]
    async fn test_submit_payment_rejected_with_reason() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/transactions")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"type": "INPUT_VALIDATION_ERROR", "reason": "Invalid card"}}"#)
            .create_async()
            .await;

        let client = GatewayClient::new(server.url(), "prv_test_key".to_string());
        let err = client.submit_payment(&test_request()).await.unwrap_err();

        match &err {
            GatewayError::Rejected { http_status, reason } => {
                assert_eq!(*http_status, 422);
                assert_eq!(reason, "Invalid card");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.reason(), "Invalid card");
    }

    #[tokio::test]
    async fn test_submit_payment_rejected_message_fallback() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/transactions")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "Invalid card"}"#)
            .create_async()
            .await;

        let client = GatewayClient::new(server.url(), "prv_test_key".to_string());
        let err = client.submit_payment(&test_request()).await.unwrap_err();

        assert_eq!(err.reason(), "Invalid card");
    }

    #[tokio::test]
    async fn test_submit_payment_rejected_without_body() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/transactions")
            .with_status(500)
            .create_async()
            .await;

        let client = GatewayClient::new(server.url(), "prv_test_key".to_string());
        let err = client.submit_payment(&test_request()).await.unwrap_err();

        assert_eq!(err.reason(), "Payment gateway rejected the transaction");
    }

    #[tokio::test]
    async fn test_query_status() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", "/transactions/gw-tx-001")
            .match_header("authorization", "Bearer prv_test_key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": {"id": "gw-tx-001", "status": "DECLINED"}}"#)
            .create_async()
            .await;

        let client = GatewayClient::new(server.url(), "prv_test_key".to_string());
        let status = client.query_status("gw-tx-001").await.unwrap();

        assert_eq!(status, TransactionStatus::Declined);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/transactions")
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = GatewayClient::new(server.url(), "prv_test_key".to_string());

        for _ in 0..3 {
            let _ = client.submit_payment(&test_request()).await;
        }

        let result = client.submit_payment(&test_request()).await;
        assert!(matches!(result, Err(GatewayError::CircuitBreakerOpen(_))));
    }
}
