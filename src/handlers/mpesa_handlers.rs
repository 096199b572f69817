// handlers/mpesa_handlers.rs
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::models::callback::CallbackEnvelope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StkPushForm {
    pub phone_number: String,
    pub amount: String,
    pub account_reference: Option<String>,
    pub transaction_desc: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub checkout_request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StkQueryForm {
    pub checkout_request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SimulateForm {
    pub phone_number: String,
    pub amount: String,
    pub bill_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUrlsForm {
    pub confirmation_url: String,
    pub validation_url: String,
    pub response_type: Option<String>,
}

/// Normalizes Kenyan phone numbers to the `254XXXXXXXXX` form the gateway
/// expects. Anything unrecognized passes through unchanged.
pub fn normalize_phone(phone: &str) -> String {
    let phone = phone.trim();
    if phone.starts_with("254") && phone.len() == 12 {
        return phone.to_string();
    }
    if phone.starts_with("07") && phone.len() == 10 {
        return format!("254{}", &phone[1..]);
    }
    if phone.starts_with('7') && phone.len() == 9 {
        return format!("254{}", phone);
    }
    phone.to_string()
}

fn positive_amount(amount: &str) -> bool {
    amount.parse::<f64>().map(|a| a > 0.0).unwrap_or(false)
}

pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Json(request): Json<StkPushForm>,
) -> impl IntoResponse {
    info!("Received STK push request: {:?}", request);

    if !positive_amount(&request.amount) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "Amount must be greater than 0"
            })),
        );
    }

    let phone = normalize_phone(&request.phone_number);
    let account_reference = request.account_reference.as_deref().unwrap_or("Payment");
    let transaction_desc = request
        .transaction_desc
        .as_deref()
        .unwrap_or("Payment of order");

    match state
        .gateway
        .stk_push(&phone, &request.amount, account_reference, transaction_desc)
        .await
    {
        Ok(response) => {
            // Track the push so the asynchronous callback can be matched
            // back to it later.
            state
                .transactions
                .register_pending(&response.checkout_request_id);
            info!("STK push initiated: {}", response.checkout_request_id);

            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "merchant_request_id": response.merchant_request_id,
                    "checkout_request_id": response.checkout_request_id,
                    "response_code": response.response_code,
                    "response_description": response.response_description,
                    "customer_message": response.customer_message,
                })),
            )
        }
        Err(e) => {
            error!("Failed to initiate STK push: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "success": false,
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Fixed STK callback endpoint. The gateway treats anything other than a
/// `ResultCode: 0` acknowledgment as a delivery failure and redelivers, so
/// this handler consumes the raw body, applies whatever it can, and
/// acknowledges unconditionally -- malformed payloads included.
pub async fn stk_callback(State(state): State<AppState>, body: String) -> impl IntoResponse {
    match serde_json::from_str::<CallbackEnvelope>(&body) {
        Ok(envelope) => {
            let callback = envelope.body.stk_callback;
            info!(
                "Received M-Pesa callback for {}: result {}",
                callback.checkout_request_id, callback.result_code
            );
            state.transactions.apply_callback(&callback);
        }
        Err(e) => {
            warn!("Discarding unparseable M-Pesa callback: {}", e);
        }
    }

    Json(serde_json::json!({
        "ResultCode": 0,
        "ResultDesc": "Success"
    }))
}

pub async fn check_transaction_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    match state.transactions.get_status(&query.checkout_request_id) {
        Some(record) => Json(serde_json::json!(record)),
        None => Json(serde_json::json!({
            "status": "unknown",
            "checkout_request_id": query.checkout_request_id,
        })),
    }
}

pub async fn get_transactions(State(state): State<AppState>) -> impl IntoResponse {
    let transactions = state.transactions.transactions();
    Json(serde_json::json!({
        "count": transactions.len(),
        "transactions": transactions,
    }))
}

pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let (total, successful, failed, pending) = state.transactions.stats();
    Json(serde_json::json!({
        "total": total,
        "successful": successful,
        "failed": failed,
        "pending": pending,
    }))
}

pub async fn query_stk_status(
    State(state): State<AppState>,
    Json(request): Json<StkQueryForm>,
) -> impl IntoResponse {
    match state.gateway.stk_query(&request.checkout_request_id).await {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        Err(e) => {
            error!("STK query failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "success": false,
                    "error": e.to_string()
                })),
            )
        }
    }
}

pub async fn simulate_payment(
    State(state): State<AppState>,
    Json(request): Json<SimulateForm>,
) -> impl IntoResponse {
    info!("Simulating C2B payment: {:?}", request);

    let phone = normalize_phone(&request.phone_number);
    let bill_ref = request.bill_ref.as_deref().unwrap_or("Test");

    match state
        .gateway
        .c2b_simulate(&phone, &request.amount, bill_ref)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        Err(e) => {
            error!("C2B simulate failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "success": false,
                    "error": e.to_string()
                })),
            )
        }
    }
}

pub async fn register_urls(
    State(state): State<AppState>,
    Json(request): Json<RegisterUrlsForm>,
) -> impl IntoResponse {
    match state
        .gateway
        .c2b_register(
            &request.confirmation_url,
            &request.validation_url,
            request.response_type.as_deref(),
        )
        .await
    {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        Err(e) => {
            error!("C2B url registration failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "success": false,
                    "error": e.to_string()
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_local_formats() {
        assert_eq!(normalize_phone("0712345678"), "254712345678");
        assert_eq!(normalize_phone("712345678"), "254712345678");
        assert_eq!(normalize_phone("254712345678"), "254712345678");
        assert_eq!(normalize_phone(" 0712345678 "), "254712345678");
    }

    #[test]
    fn unrecognized_numbers_pass_through() {
        assert_eq!(normalize_phone("+441234567890"), "+441234567890");
    }

    #[test]
    fn amount_validation() {
        assert!(positive_amount("100"));
        assert!(positive_amount("0.5"));
        assert!(!positive_amount("0"));
        assert!(!positive_amount("-5"));
        assert!(!positive_amount("abc"));
    }
}
