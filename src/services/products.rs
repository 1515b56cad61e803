use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::Product;
use crate::db::queries;
use crate::error::AppError;

/// Catalog reads plus the stock guard: every decrement in the system funnels
/// through [`ProductService::decrement_once`].
#[derive(Clone)]
pub struct ProductService {
    pool: PgPool,
}

impl ProductService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Product>, AppError> {
        Ok(queries::list_products(&self.pool).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Product, AppError> {
        queries::get_product(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
    }

    /// Read-only availability check used before opening a transaction.
    pub async fn check_available(&self, id: Uuid) -> Result<Product, AppError> {
        let product = self.get(id).await?;
        if product.stock < 1 {
            return Err(AppError::InvalidState("Out of stock".to_string()));
        }
        Ok(product)
    }

    /// Takes one unit of stock for an approved transaction, at most once per
    /// transaction and never below zero. Safe to call again for the same
    /// transaction (duplicate webhook, replayed reconcile); the repeat is a
    /// no-op.
    pub async fn decrement_once(
        &self,
        transaction_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, AppError> {
        let settled = queries::settle_approved_stock(&self.pool, transaction_id, product_id).await?;
        if settled {
            tracing::info!(%transaction_id, %product_id, "stock decremented for approved transaction");
        }
        Ok(settled)
    }
}
