use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{
    Customer, Delivery, Product, TransactionDetail, TransactionRecord, TransactionStatus,
};
use crate::db::queries;
use crate::error::AppError;
use crate::gateway::{GatewayClient, SubmitPaymentRequest, integrity_signature};
use crate::services::products::ProductService;

// Flat fees added on top of the product price, in minor currency units.
const BASE_FEE_IN_CENTS: i64 = 250_000;
const DELIVERY_FEE_IN_CENTS: i64 = 1_000_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub product_id: Uuid,
    pub customer: CustomerInput,
    pub delivery: DeliveryInput,
    pub card_token: String,
    pub acceptance_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInput {
    pub address: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
}

/// Drives the checkout state machine: validate stock, open a PENDING record,
/// sign and submit to the gateway, reconcile the answer into the store and
/// the product's stock.
#[derive(Clone)]
pub struct TransactionService {
    pool: PgPool,
    gateway: GatewayClient,
    products: ProductService,
    integrity_key: String,
    currency: String,
}

impl TransactionService {
    pub fn new(
        pool: PgPool,
        gateway: GatewayClient,
        products: ProductService,
        integrity_key: String,
        currency: String,
    ) -> Self {
        Self {
            pool,
            gateway,
            products,
            integrity_key,
            currency,
        }
    }

    pub async fn create(
        &self,
        request: CreateTransactionRequest,
    ) -> Result<TransactionDetail, AppError> {
        // 1. Validate product and stock.
        let product = self.products.check_available(request.product_id).await?;

        // 2. Price and reference.
        let amount_in_cents = quote_amount_in_cents(product.price_in_cents);
        let reference = new_reference();

        // 3. Open the PENDING record atomically. A failure here rolls the
        // whole graph back; the caller never sees a half-created transaction.
        let (record, customer, delivery) = self
            .open_pending(&request, &product, &reference, amount_in_cents)
            .await?;

        // 4. Sign and submit. The record is already committed; the gateway
        // call stays outside any local database transaction because it is a
        // slow external dependency.
        let signature = integrity_signature(
            &reference,
            amount_in_cents,
            &self.currency,
            &self.integrity_key,
        );
        let submit = SubmitPaymentRequest {
            amount_in_cents,
            currency: self.currency.clone(),
            customer_email: customer.email.clone(),
            card_token: request.card_token.clone(),
            reference: reference.clone(),
            acceptance_token: request.acceptance_token.clone(),
            signature,
        };

        match self.gateway.submit_payment(&submit).await {
            // 5. Persist the gateway-reported status; settle stock on APPROVED.
            Ok(outcome) => {
                tracing::info!(
                    reference = %record.reference,
                    status = %outcome.status,
                    external_id = %outcome.external_id,
                    "payment submitted"
                );
                let record = queries::update_transaction_status(
                    &self.pool,
                    record.id,
                    outcome.status,
                    Some(&outcome.external_id),
                )
                .await?
                .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

                if record.status == TransactionStatus::Approved {
                    self.products
                        .decrement_once(record.id, record.product_id)
                        .await?;
                }

                let record = queries::get_transaction(&self.pool, record.id)
                    .await?
                    .unwrap_or(record);
                let product = self.products.get(record.product_id).await?;
                Ok(TransactionDetail {
                    transaction: record,
                    product,
                    customer,
                    delivery,
                })
            }
            // 6. Record the failed attempt, then surface the gateway's reason.
            Err(err) => {
                tracing::error!(
                    reference = %record.reference,
                    error = %err,
                    "payment gateway call failed"
                );
                queries::update_transaction_status(
                    &self.pool,
                    record.id,
                    TransactionStatus::Error,
                    None,
                )
                .await?;
                Err(AppError::InvalidState(format!(
                    "Payment failed: {}",
                    err.reason()
                )))
            }
        }
    }

    async fn open_pending(
        &self,
        request: &CreateTransactionRequest,
        product: &Product,
        reference: &str,
        amount_in_cents: i64,
    ) -> Result<(TransactionRecord, Customer, Delivery), AppError> {
        let result: Result<_, sqlx::Error> = async {
            let mut tx = self.pool.begin().await?;

            let customer = queries::insert_customer(
                &mut tx,
                &Customer {
                    id: Uuid::new_v4(),
                    full_name: request.customer.full_name.clone(),
                    email: request.customer.email.clone(),
                    phone_number: request.customer.phone_number.clone(),
                },
            )
            .await?;

            let delivery = queries::insert_delivery(
                &mut tx,
                &Delivery {
                    id: Uuid::new_v4(),
                    address: request.delivery.address.clone(),
                    city: request.delivery.city.clone(),
                    region: request.delivery.region.clone(),
                    postal_code: request.delivery.postal_code.clone(),
                },
            )
            .await?;

            let record = queries::insert_transaction(
                &mut tx,
                &TransactionRecord::new(
                    reference.to_string(),
                    amount_in_cents,
                    self.currency.clone(),
                    product.id,
                    customer.id,
                    delivery.id,
                ),
            )
            .await?;

            tx.commit().await?;
            Ok((record, customer, delivery))
        }
        .await;

        result.map_err(|e| {
            tracing::error!(reference, error = %e, "failed to open pending transaction");
            AppError::Internal("Failed to initialize transaction".to_string())
        })
    }

    /// Read path with reconciliation applied: a PENDING transaction triggers
    /// one gateway status query; settled statuses are served from the store
    /// with no gateway traffic.
    pub async fn get_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionDetail>, AppError> {
        let Some(record) = queries::get_transaction_by_reference(&self.pool, reference).await?
        else {
            return Ok(None);
        };

        let record = if record.status == TransactionStatus::Pending {
            self.reconcile_pending(record).await?
        } else {
            record
        };

        let product = self.products.get(record.product_id).await?;
        let customer = queries::get_customer(&self.pool, record.customer_id).await?;
        let delivery = queries::get_delivery(&self.pool, record.delivery_id).await?;

        Ok(Some(TransactionDetail {
            transaction: record,
            product,
            customer,
            delivery,
        }))
    }

    /// Out-of-band status change (manual correction, webhook-driven update).
    /// Idempotent when the status is unchanged; an APPROVED transition settles
    /// stock through the same at-most-once path as the creation flow.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<TransactionRecord, AppError> {
        let record = queries::get_transaction(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

        if record.status == status {
            return Ok(record);
        }

        let updated = queries::update_transaction_status(&self.pool, id, status, None)
            .await?
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;
        tracing::info!(
            reference = %updated.reference,
            from = %record.status,
            to = %status,
            "transaction status updated"
        );

        if status == TransactionStatus::Approved {
            self.products
                .decrement_once(updated.id, updated.product_id)
                .await?;
            return Ok(queries::get_transaction(&self.pool, id)
                .await?
                .unwrap_or(updated));
        }

        Ok(updated)
    }

    /// Queries the gateway for a PENDING transaction and applies a differing
    /// status exactly once, even when racing other reconcilers. Gateway
    /// failures leave the record PENDING; the next pass retries.
    pub async fn reconcile_pending(
        &self,
        record: TransactionRecord,
    ) -> Result<TransactionRecord, AppError> {
        let Some(external_id) = record.gateway_transaction_id.clone() else {
            // Never reached the gateway; nothing to reconcile against yet.
            return Ok(record);
        };

        let status = match self.gateway.query_status(&external_id).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(
                    reference = %record.reference,
                    error = %err,
                    "status query failed, transaction stays pending"
                );
                return Ok(record);
            }
        };

        if status == TransactionStatus::Pending {
            return Ok(record);
        }

        match queries::apply_gateway_status(&self.pool, record.id, status).await? {
            Some(updated) => {
                tracing::info!(
                    reference = %updated.reference,
                    status = %updated.status,
                    "reconciled pending transaction"
                );
                if updated.status == TransactionStatus::Approved {
                    self.products
                        .decrement_once(updated.id, updated.product_id)
                        .await?;
                }
                Ok(queries::get_transaction(&self.pool, updated.id)
                    .await?
                    .unwrap_or(updated))
            }
            // Another reconciler won the race; serve whatever it wrote.
            None => Ok(queries::get_transaction(&self.pool, record.id)
                .await?
                .unwrap_or(record)),
        }
    }

    /// One sweep over transactions stuck in PENDING longer than the cutoff.
    /// Returns how many transitions were applied.
    pub async fn reconcile_stale(
        &self,
        older_than_secs: i64,
        limit: i64,
    ) -> Result<usize, AppError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(older_than_secs);
        let stale = queries::stale_pending_transactions(&self.pool, cutoff, limit).await?;

        let mut applied = 0;
        for record in stale {
            let reference = record.reference.clone();
            match self.reconcile_pending(record).await {
                Ok(updated) if updated.status != TransactionStatus::Pending => applied += 1,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(reference = %reference, error = %err, "sweep reconcile failed");
                }
            }
        }

        Ok(applied)
    }
}

fn quote_amount_in_cents(price_in_cents: i64) -> i64 {
    price_in_cents + BASE_FEE_IN_CENTS + DELIVERY_FEE_IN_CENTS
}

// Merchant reference: TX- plus the first eight hex characters of a v4 uuid.
// Collision odds at this volume are negligible; the UNIQUE constraint turns
// the astronomically unlikely hit into a rolled-back open.
fn new_reference() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("TX-{}", &id[..8])
}
