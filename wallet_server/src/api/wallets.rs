//! Wallet API handlers.

use axum::{
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wallet_ledger::wallet::{OperationType, Wallet, WalletError};

use super::AppState;
use crate::metrics;

/// Wallet representation returned by every wallet endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub id: Uuid,
    pub balance: Decimal,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            balance: wallet.balance,
        }
    }
}

/// Body of `POST /wallets/{id}/operation`
#[derive(Debug, Deserialize)]
pub struct WalletOperationRequest {
    pub operation_type: OperationType,
    pub amount: Decimal,
}

/// Error body, `{"detail": "..."}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Errors a wallet handler can answer with
#[derive(Debug)]
pub enum ApiError {
    /// Path or body could not be decoded
    Unprocessable(String),
    /// Failure reported by the wallet manager
    Wallet(WalletError),
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        ApiError::Wallet(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

/// HTTP status for a wallet failure
pub fn status_for(err: &WalletError) -> StatusCode {
    match err {
        WalletError::WalletNotFound(_) => StatusCode::NOT_FOUND,
        WalletError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
        WalletError::InvalidAmount(_) | WalletError::BalanceOverflow => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WalletError::LockTimeout(_) | WalletError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        WalletError::Database(_) | WalletError::TransactionFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unprocessable(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::Wallet(err) => (status_for(&err), err.client_message()),
        };
        (status, Json(ErrorResponse::new(detail))).into_response()
    }
}

/// Create a wallet with a zero balance
///
/// `POST /api/v1/wallets` → `201 Created`
pub async fn create_wallet(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<WalletResponse>), ApiError> {
    let wallet = state.wallet_manager.create_wallet().await?;
    metrics::wallets_created_total();
    Ok((StatusCode::CREATED, Json(wallet.into())))
}

/// Get a wallet's balance
///
/// `GET /api/v1/wallets/{wallet_id}`
pub async fn get_wallet(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<WalletResponse>, ApiError> {
    let Path(wallet_id) = path?;
    let wallet = state.wallet_manager.get_wallet(wallet_id).await?;
    Ok(Json(wallet.into()))
}

/// Deposit into or withdraw from a wallet
///
/// `POST /api/v1/wallets/{wallet_id}/operation`
///
/// # Errors
///
/// - `404` wallet does not exist
/// - `400` withdrawal larger than the balance
/// - `422` bad wallet id, undecodable body or invalid amount
pub async fn wallet_operation(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<WalletOperationRequest>, JsonRejection>,
) -> Result<Json<WalletResponse>, ApiError> {
    let Path(wallet_id) = path?;
    let Json(request) = body?;

    let result = state
        .wallet_manager
        .perform_operation(wallet_id, request.operation_type, request.amount)
        .await;

    metrics::wallet_operations_total(request.operation_type, outcome_label(&result));
    Ok(Json(result?.into()))
}

fn outcome_label(result: &Result<Wallet, WalletError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(WalletError::WalletNotFound(_)) => "not_found",
        Err(WalletError::InsufficientFunds { .. }) => "insufficient_funds",
        Err(WalletError::InvalidAmount(_) | WalletError::BalanceOverflow) => "rejected",
        Err(_) => "error",
    }
}
