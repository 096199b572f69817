// handlers/b2c_handlers.rs
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::handlers::mpesa_handlers::normalize_phone;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct B2cForm {
    pub phone_number: String,
    pub amount: String,
    pub command_id: Option<String>,
    pub remarks: String,
    pub occasion: Option<String>,
}

const VALID_COMMANDS: [&str; 3] = ["BusinessPayment", "SalaryPayment", "PromotionPayment"];

pub async fn send_b2c_payment(
    State(state): State<AppState>,
    Json(request): Json<B2cForm>,
) -> impl IntoResponse {
    info!("Received B2C request: {:?}", request);

    if let Some(command) = request.command_id.as_deref() {
        if !VALID_COMMANDS.contains(&command) {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "error": "Invalid command_id. Must be: BusinessPayment, SalaryPayment, or PromotionPayment"
                })),
            );
        }
    }

    let phone = normalize_phone(&request.phone_number);

    match state
        .gateway
        .b2c(
            &phone,
            &request.amount,
            request.command_id.as_deref(),
            &request.remarks,
            request.occasion.as_deref(),
        )
        .await
    {
        Ok(response) => {
            info!("B2C payment initiated: {}", response.conversation_id);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "conversation_id": response.conversation_id,
                    "originator_conversation_id": response.originator_conversation_id,
                    "response_code": response.response_code,
                    "response_description": response.response_description,
                })),
            )
        }
        Err(e) => {
            error!("Failed to send B2C payment: {}", e);
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

/// B2C result callback. Logged for operators; the gateway only needs its
/// fixed acknowledgment.
pub async fn b2c_result_callback(body: String) -> impl IntoResponse {
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(payload) => info!("Received B2C result callback: {}", payload),
        Err(e) => tracing::warn!("Discarding unparseable B2C result callback: {}", e),
    }

    Json(serde_json::json!({
        "ResultCode": 0,
        "ResultDesc": "Success"
    }))
}

pub async fn b2c_timeout_callback(body: String) -> impl IntoResponse {
    tracing::warn!("Received B2C timeout callback: {}", body);

    Json(serde_json::json!({
        "ResultCode": 0,
        "ResultDesc": "Success"
    }))
}
