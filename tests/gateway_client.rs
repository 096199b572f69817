// Integration tests for the Daraja client against a local stub gateway.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use serde_json::{json, Value};

use mpesa_gateway::config::{Environment, GatewayOptions};
use mpesa_gateway::error::GatewayError;
use mpesa_gateway::services::mpesa_service::MpesaService;

struct StubGateway {
    auth_ok: bool,
    stk_ok: bool,
    token_hits: AtomicUsize,
    last_stk_body: Mutex<Option<Value>>,
    last_b2c_body: Mutex<Option<Value>>,
}

impl StubGateway {
    fn new(auth_ok: bool, stk_ok: bool) -> Self {
        StubGateway {
            auth_ok,
            stk_ok,
            token_hits: AtomicUsize::new(0),
            last_stk_body: Mutex::new(None),
            last_b2c_body: Mutex::new(None),
        }
    }
}

async fn token_handler(State(stub): State<Arc<StubGateway>>) -> (StatusCode, Json<Value>) {
    stub.token_hits.fetch_add(1, Ordering::SeqCst);
    if stub.auth_ok {
        (
            StatusCode::OK,
            Json(json!({"access_token": "stub-token", "expires_in": "3599"})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "requestId": "1234-5678",
                "errorCode": "401.002.01",
                "errorMessage": "Invalid credentials"
            })),
        )
    }
}

async fn stk_handler(
    State(stub): State<Arc<StubGateway>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    *stub.last_stk_body.lock().unwrap() = Some(body);
    if !stub.stk_ok {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "requestId": "1234-5678",
                "errorCode": "400.002.02",
                "errorMessage": "Bad Request - Invalid Timestamp"
            })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })),
    )
}

async fn b2c_handler(State(stub): State<Arc<StubGateway>>, Json(body): Json<Value>) -> Json<Value> {
    *stub.last_b2c_body.lock().unwrap() = Some(body);
    Json(json!({
        "OriginatorConversationID": "29112-34801843-1",
        "ConversationID": "AG_20240101_00004e48cf7e3533f581",
        "ResponseCode": "0",
        "ResponseDescription": "Accept the service request successfully."
    }))
}

async fn balance_handler() -> Json<Value> {
    Json(json!({
        "OriginatorConversationID": "29112-34801843-2",
        "ConversationID": "AG_20240101_00004e48cf7e3533f582",
        "ResponseCode": "0",
        "ResponseDescription": "Accept the service request successfully."
    }))
}

async fn spawn_stub(stub: StubGateway) -> (SocketAddr, Arc<StubGateway>) {
    let stub = Arc::new(stub);
    let app = Router::new()
        .route("/oauth/v1/generate", get(token_handler))
        .route("/mpesa/stkpush/v1/processrequest", post(stk_handler))
        .route("/mpesa/b2c/v1/paymentrequest", post(b2c_handler))
        .route("/mpesa/accountbalance/v1/query", post(balance_handler))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, stub)
}

fn service_for(addr: SocketAddr) -> MpesaService {
    let config = GatewayOptions {
        consumer_key: Some("key".into()),
        consumer_secret: Some("secret".into()),
        short_code: Some("174379".into()),
        passkey: Some("passkey".into()),
        callback_url: Some("https://example.com/api/mpesa/callback".into()),
        initiator_name: Some("testapi".into()),
        security_credential: Some("credential".into()),
        environment: Some(Environment::Custom(format!("http://{}", addr))),
        ..Default::default()
    }
    .resolve()
    .unwrap();
    MpesaService::new(config)
}

#[tokio::test]
async fn token_is_exchanged_once_across_operations() {
    let (addr, stub) = spawn_stub(StubGateway::new(true, true)).await;
    let service = service_for(addr);

    service
        .stk_push("254712345678", "100", "Order-1", "Payment")
        .await
        .unwrap();
    service.account_balance().await.unwrap();

    assert_eq!(stub.token_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stk_password_matches_the_timestamp_sent() {
    let (addr, stub) = spawn_stub(StubGateway::new(true, true)).await;
    let service = service_for(addr);

    let response = service
        .stk_push("254712345678", "500", "Order-2", "Payment")
        .await
        .unwrap();
    assert_eq!(response.checkout_request_id, "ws_CO_191220191020363925");

    let body = stub.last_stk_body.lock().unwrap().take().unwrap();
    let timestamp = body["Timestamp"].as_str().unwrap();
    assert_eq!(timestamp.len(), 14);
    assert!(timestamp.chars().all(|c| c.is_ascii_digit()));

    let expected_password = base64.encode(format!("174379passkey{}", timestamp));
    assert_eq!(body["Password"].as_str().unwrap(), expected_password);

    assert_eq!(body["TransactionType"], "CustomerPayBillOnline");
    assert_eq!(body["BusinessShortCode"], "174379");
    assert_eq!(body["PartyB"], "174379");
    assert_eq!(body["PhoneNumber"], "254712345678");
    assert_eq!(body["Amount"], "500");
    assert_eq!(body["CallBackURL"], "https://example.com/api/mpesa/callback");
}

#[tokio::test]
async fn b2c_carries_initiator_credentials_and_default_command() {
    let (addr, stub) = spawn_stub(StubGateway::new(true, true)).await;
    let service = service_for(addr);

    let ack = service
        .b2c("254712345678", "250", None, "Refund", None)
        .await
        .unwrap();
    assert_eq!(ack.response_code, "0");

    let body = stub.last_b2c_body.lock().unwrap().take().unwrap();
    assert_eq!(body["InitiatorName"], "testapi");
    assert_eq!(body["SecurityCredential"], "credential");
    assert_eq!(body["CommandID"], "BusinessPayment");
    assert_eq!(body["PartyA"], "174379");
    assert_eq!(body["PartyB"], "254712345678");
}

#[tokio::test]
async fn auth_failure_surfaces_and_is_not_retried() {
    let (addr, stub) = spawn_stub(StubGateway::new(false, true)).await;
    let service = service_for(addr);

    let err = service
        .stk_push("254712345678", "100", "Order-3", "Payment")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed"));
    // One push attempt means exactly one exchange attempt.
    assert_eq!(stub.token_hits.load(Ordering::SeqCst), 1);

    let err = service.access_token().await.unwrap_err();
    match err {
        GatewayError::Authentication(message) => {
            assert!(message.contains("Invalid credentials"));
        }
        other => panic!("expected authentication error, got {:?}", other),
    }
    assert_eq!(stub.token_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn push_failure_wraps_upstream_error_message() {
    let (addr, _stub) = spawn_stub(StubGateway::new(true, false)).await;
    let service = service_for(addr);

    let err = service
        .stk_push("254712345678", "100", "Order-4", "Payment")
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("stk push failed"));
    assert!(message.contains("Bad Request - Invalid Timestamp"));
}
