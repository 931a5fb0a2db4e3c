use crate::{
    api::{ApiJson, ApiQuery, ApiResponse, AppState},
    db::models::{Transaction, UserType},
    error::{AppError, Result},
    wallet::{SagaRecord, WalletBalance},
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub user_id: String,
    pub user_type: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletQuery {
    pub user_id: String,
    pub user_type: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WalletUpdateResponse {
    pub balance: i64,
    pub transaction: Transaction,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deposit", post(deposit))
        .route("/withdraw", post(withdraw))
        .route("/balance", get(balance))
        .route("/transactions", get(transactions))
        .route("/reconciliation", get(reconciliation))
}

fn parse_user_type(value: &str) -> Result<UserType> {
    value.parse().map_err(|_| {
        AppError::Validation("userType must be 'player' or 'organizer'".to_string())
    })
}

async fn deposit(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<WalletRequest>,
) -> Result<Json<ApiResponse<WalletUpdateResponse>>> {
    let user_type = parse_user_type(&req.user_type)?;
    let (balance, transaction) = state
        .wallet
        .deposit(user_type, &req.user_id, req.amount)
        .await?;

    Ok(ApiResponse::with_message(
        "Deposit successful",
        WalletUpdateResponse {
            balance,
            transaction,
        },
    ))
}

async fn withdraw(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<WalletRequest>,
) -> Result<Json<ApiResponse<WalletUpdateResponse>>> {
    let user_type = parse_user_type(&req.user_type)?;
    let (balance, transaction) = state
        .wallet
        .withdraw(user_type, &req.user_id, req.amount)
        .await?;

    Ok(ApiResponse::with_message(
        "Withdrawal successful",
        WalletUpdateResponse {
            balance,
            transaction,
        },
    ))
}

async fn balance(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<WalletQuery>,
) -> Result<Json<ApiResponse<WalletBalance>>> {
    let user_type = parse_user_type(&query.user_type)?;
    let balance = state.wallet.balance(user_type, &query.user_id).await?;
    Ok(ApiResponse::ok(balance))
}

async fn transactions(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<WalletQuery>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>> {
    let user_type = parse_user_type(&query.user_type)?;
    let transactions = state
        .wallet
        .transactions(user_type, &query.user_id, query.limit)
        .await?;
    Ok(ApiResponse::ok(transactions))
}

async fn reconciliation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<SagaRecord>>>> {
    let sagas = state.wallet.unsettled_sagas().await?;
    Ok(ApiResponse::ok(sagas))
}
