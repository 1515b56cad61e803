pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod services;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::services::{ProductService, TransactionService};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub products: ProductService,
    pub transactions: TransactionService,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/products", get(handlers::products::list_products))
        .route("/products/:id", get(handlers::products::get_product))
        .route("/transactions", post(handlers::transactions::create_transaction))
        // GET resolves by merchant reference, PATCH by transaction id.
        .route(
            "/transactions/:reference",
            get(handlers::transactions::get_transaction)
                .patch(handlers::transactions::update_status),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
