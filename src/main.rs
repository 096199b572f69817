use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use mpesa_gateway::config::GatewayConfig;
use mpesa_gateway::routes;
use mpesa_gateway::services::mpesa_service::MpesaService;
use mpesa_gateway::state::AppState;
use mpesa_gateway::store::TransactionStore;

/// How long a transaction record is kept before the sweeper drops it.
const RECORD_RETENTION_SECS: i64 = 3600;
const SWEEP_PERIOD: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("✅ Gateway config loaded");
    tracing::info!("📱 Short code: {}", config.short_code);
    tracing::info!("🌐 Environment: {:?}", config.environment);

    let gateway = Arc::new(MpesaService::new(config));
    let transactions = TransactionStore::new();
    transactions.spawn_sweeper(SWEEP_PERIOD, chrono::Duration::seconds(RECORD_RETENTION_SECS));

    let app_state = AppState::new(gateway, transactions);
    let app = build_router(app_state);
    start_server(app).await
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .nest("/api/mpesa", routes::mpesa::mpesa_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn start_server(app: Router) -> anyhow::Result<()> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = SocketAddr::from(([0, 0, 0, 0], port.parse().unwrap_or(3000)));

    tracing::info!("🚀 Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root_handler() -> &'static str {
    "🚀 M-Pesa Gateway API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
