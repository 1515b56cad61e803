use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::db::models::TransactionStatus;
use crate::error::AppError;
use crate::services::transactions::CreateTransactionRequest;

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.transactions.create(payload).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state
        .transactions
        .get_by_reference(&reference)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", reference)))?;

    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TransactionStatus,
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    // The PATCH route addresses transactions by id; anything that is not a
    // uuid cannot name an existing row.
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::NotFound("Transaction not found".to_string()))?;

    let record = state.transactions.update_status(id, payload.status).await?;
    Ok(Json(record))
}
