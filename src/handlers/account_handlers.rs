// handlers/account_handlers.rs
//
// Passthrough handlers for the account-level operations: balance, status,
// reversal, B2B. Each is a straight call into the gateway client with the
// shared error shape.
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TransactionStatusForm {
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReversalForm {
    pub transaction_id: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct B2bForm {
    pub receiver_short_code: String,
    pub amount: String,
    pub command_id: Option<String>,
    pub account_reference: String,
    pub remarks: String,
}

fn gateway_failure(what: &str, e: crate::error::GatewayError) -> (StatusCode, Json<serde_json::Value>) {
    error!("{} failed: {}", what, e);
    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({
            "success": false,
            "error": e.to_string()
        })),
    )
}

pub async fn account_balance(State(state): State<AppState>) -> impl IntoResponse {
    match state.gateway.account_balance().await {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        Err(e) => gateway_failure("Account balance query", e),
    }
}

pub async fn transaction_status(
    State(state): State<AppState>,
    Json(request): Json<TransactionStatusForm>,
) -> impl IntoResponse {
    match state
        .gateway
        .transaction_status(&request.transaction_id)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        Err(e) => gateway_failure("Transaction status query", e),
    }
}

pub async fn reverse_transaction(
    State(state): State<AppState>,
    Json(request): Json<ReversalForm>,
) -> impl IntoResponse {
    match state
        .gateway
        .reversal(&request.transaction_id, &request.amount)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        Err(e) => gateway_failure("Reversal", e),
    }
}

pub async fn b2b_transfer(
    State(state): State<AppState>,
    Json(request): Json<B2bForm>,
) -> impl IntoResponse {
    match state
        .gateway
        .b2b(
            &request.receiver_short_code,
            &request.amount,
            request.command_id.as_deref(),
            &request.account_reference,
            &request.remarks,
        )
        .await
    {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        Err(e) => gateway_failure("B2B transfer", e),
    }
}
