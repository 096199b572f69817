//! Client for the Safaricom M-Pesa (Daraja) REST API, plus the building
//! blocks of a small callback-correlation server.
//!
//! The [`MpesaService`](services::mpesa_service::MpesaService) wraps one
//! async method around each Daraja endpoint (STK push, B2C, B2B,
//! transaction status, account balance, reversal, C2B registration and
//! simulation), acquiring and caching the OAuth bearer token on first use.
//! The [`TransactionStore`](store::TransactionStore) matches asynchronous
//! payment-result callbacks back to their originating push by
//! `CheckoutRequestID` and tracks each attempt through
//! `pending -> success | failed`.
//!
//! ```rust,no_run
//! use mpesa_gateway::config::GatewayConfig;
//! use mpesa_gateway::services::mpesa_service::MpesaService;
//!
//! # async fn demo() -> Result<(), mpesa_gateway::error::GatewayError> {
//! let config = GatewayConfig::from_env()?;
//! let mpesa = MpesaService::new(config);
//!
//! let response = mpesa
//!     .stk_push("254712345678", "100", "Order-42", "Payment for order 42")
//!     .await?;
//! println!("awaiting callback for {}", response.checkout_request_id);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use config::{Environment, GatewayConfig, GatewayOptions};
pub use error::GatewayError;
pub use services::mpesa_service::MpesaService;
pub use store::TransactionStore;
