use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::account_handlers;
use crate::handlers::b2c_handlers;
use crate::handlers::mpesa_handlers;
use crate::state::AppState;

pub fn mpesa_routes() -> Router<AppState> {
    Router::new()
        // Health
        .route("/health", get(mpesa_health))
        // C2B Routes
        .route("/stk-push", post(mpesa_handlers::initiate_stk_push))
        .route("/stk-push/query", post(mpesa_handlers::query_stk_status))
        .route("/callback", post(mpesa_handlers::stk_callback))
        .route("/simulate", post(mpesa_handlers::simulate_payment))
        .route("/register-urls", post(mpesa_handlers::register_urls))
        // Correlation store
        .route("/status", get(mpesa_handlers::check_transaction_status))
        .route("/transactions", get(mpesa_handlers::get_transactions))
        .route("/stats", get(mpesa_handlers::get_stats))
        // B2C Routes
        .route("/b2c/send", post(b2c_handlers::send_b2c_payment))
        .route("/b2c/result", post(b2c_handlers::b2c_result_callback))
        .route("/b2c/timeout", post(b2c_handlers::b2c_timeout_callback))
        // Account Routes
        .route("/balance", post(account_handlers::account_balance))
        .route(
            "/transaction-status",
            post(account_handlers::transaction_status),
        )
        .route("/reversal", post(account_handlers::reverse_transaction))
        .route("/b2b", post(account_handlers::b2b_transfer))
}

async fn mpesa_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "mpesa",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["c2b", "b2c", "b2b", "stk-push", "callback-correlation", "account-ops"]
    }))
}
