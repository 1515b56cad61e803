use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{Customer, Delivery, Product, TransactionRecord, TransactionStatus};

// --- Product queries ---

pub async fn list_products(pool: &PgPool) -> Result<Vec<Product>> {
    sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY name")
        .fetch_all(pool)
        .await
}

pub async fn get_product(pool: &PgPool, id: Uuid) -> Result<Option<Product>> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

// --- Checkout graph inserts ---
// All three run inside the caller's transaction so a failed open leaves no
// orphan rows.

pub async fn insert_customer(
    executor: &mut SqlxTransaction<'_, Postgres>,
    customer: &Customer,
) -> Result<Customer> {
    sqlx::query_as::<_, Customer>(
        r#"
        INSERT INTO customers (id, full_name, email, phone_number)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(customer.id)
    .bind(&customer.full_name)
    .bind(&customer.email)
    .bind(&customer.phone_number)
    .fetch_one(&mut **executor)
    .await
}

pub async fn insert_delivery(
    executor: &mut SqlxTransaction<'_, Postgres>,
    delivery: &Delivery,
) -> Result<Delivery> {
    sqlx::query_as::<_, Delivery>(
        r#"
        INSERT INTO deliveries (id, address, city, region, postal_code)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(delivery.id)
    .bind(&delivery.address)
    .bind(&delivery.city)
    .bind(&delivery.region)
    .bind(&delivery.postal_code)
    .fetch_one(&mut **executor)
    .await
}

pub async fn insert_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    record: &TransactionRecord,
) -> Result<TransactionRecord> {
    sqlx::query_as::<_, TransactionRecord>(
        r#"
        INSERT INTO transactions (
            id, reference, amount_in_cents, currency, status, gateway_transaction_id,
            product_id, customer_id, delivery_id, stock_decremented, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(record.id)
    .bind(&record.reference)
    .bind(record.amount_in_cents)
    .bind(&record.currency)
    .bind(record.status)
    .bind(&record.gateway_transaction_id)
    .bind(record.product_id)
    .bind(record.customer_id)
    .bind(record.delivery_id)
    .bind(record.stock_decremented)
    .bind(record.created_at)
    .bind(record.updated_at)
    .fetch_one(&mut **executor)
    .await
}

// --- Transaction reads ---

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<TransactionRecord>> {
    sqlx::query_as::<_, TransactionRecord>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_transaction_by_reference(
    pool: &PgPool,
    reference: &str,
) -> Result<Option<TransactionRecord>> {
    sqlx::query_as::<_, TransactionRecord>("SELECT * FROM transactions WHERE reference = $1")
        .bind(reference)
        .fetch_optional(pool)
        .await
}

pub async fn get_customer(pool: &PgPool, id: Uuid) -> Result<Customer> {
    sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn get_delivery(pool: &PgPool, id: Uuid) -> Result<Delivery> {
    sqlx::query_as::<_, Delivery>("SELECT * FROM deliveries WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

// --- Transaction updates ---

pub async fn update_transaction_status(
    pool: &PgPool,
    id: Uuid,
    status: TransactionStatus,
    gateway_transaction_id: Option<&str>,
) -> Result<Option<TransactionRecord>> {
    sqlx::query_as::<_, TransactionRecord>(
        r#"
        UPDATE transactions
        SET status = $2,
            gateway_transaction_id = COALESCE($3, gateway_transaction_id),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(gateway_transaction_id)
    .fetch_optional(pool)
    .await
}

/// Applies a gateway-reported transition only while the row is still PENDING,
/// so concurrent reconcilers apply it exactly once. Returns `None` when
/// another writer got there first.
pub async fn apply_gateway_status(
    pool: &PgPool,
    id: Uuid,
    status: TransactionStatus,
) -> Result<Option<TransactionRecord>> {
    sqlx::query_as::<_, TransactionRecord>(
        r#"
        UPDATE transactions
        SET status = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status)
    .fetch_optional(pool)
    .await
}

/// At-most-once stock settlement for an approved transaction. Flips the
/// transaction's stock_decremented flag and takes one unit of stock in the
/// same database transaction; the `stock > 0` guard floors stock at zero
/// under concurrent decrements. Returns false when the transaction had
/// already settled.
pub async fn settle_approved_stock(
    pool: &PgPool,
    transaction_id: Uuid,
    product_id: Uuid,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let flagged = sqlx::query(
        r#"
        UPDATE transactions
        SET stock_decremented = TRUE, updated_at = NOW()
        WHERE id = $1 AND stock_decremented = FALSE
        "#,
    )
    .bind(transaction_id)
    .execute(&mut *tx)
    .await?;

    if flagged.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query("UPDATE products SET stock = stock - 1 WHERE id = $1 AND stock > 0")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// PENDING transactions that were submitted to the gateway but have not
/// settled within the cutoff. Fed to the background reconciler.
pub async fn stale_pending_transactions(
    pool: &PgPool,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<TransactionRecord>> {
    sqlx::query_as::<_, TransactionRecord>(
        r#"
        SELECT * FROM transactions
        WHERE status = 'PENDING'
        AND gateway_transaction_id IS NOT NULL
        AND created_at <= $1
        ORDER BY created_at ASC
        LIMIT $2
        "#,
    )
    .bind(older_than)
    .bind(limit)
    .fetch_all(pool)
    .await
}
