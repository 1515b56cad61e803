use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a checkout transaction. PENDING until the gateway reports a
/// terminal outcome; the remaining values are passed through from the gateway
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Declined,
    Error,
    Voided,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Approved => "APPROVED",
            TransactionStatus::Declined => "DECLINED",
            TransactionStatus::Error => "ERROR",
            TransactionStatus::Voided => "VOIDED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price_in_cents: i64,
    pub stock: i32,
    pub image_url: Option<String>,
}

/// Created fresh per transaction; owned by the transaction it is attached to.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: Uuid,
    pub address: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    pub reference: String,
    pub amount_in_cents: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub gateway_transaction_id: Option<String>,
    pub product_id: Uuid,
    pub customer_id: Uuid,
    pub delivery_id: Uuid,
    /// Set exactly once, when stock is taken for this transaction. Guards the
    /// decrement against duplicate APPROVED transitions.
    pub stock_decremented: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        reference: String,
        amount_in_cents: i64,
        currency: String,
        product_id: Uuid,
        customer_id: Uuid,
        delivery_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference,
            amount_in_cents,
            currency,
            status: TransactionStatus::Pending,
            gateway_transaction_id: None,
            product_id,
            customer_id,
            delivery_id,
            stock_decremented: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Transaction with its related entities attached, as served to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: TransactionRecord,
    pub product: Product,
    pub customer: Customer,
    pub delivery: Delivery,
}
