// models/transaction.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored lifecycle states. `unknown` is never stored -- it is the response
/// given for an absent correlation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

/// One tracked payment-push attempt, keyed by its `CheckoutRequestID`.
/// Created pending when the push is issued, driven to a terminal state by
/// the callback handler, swept after the retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub checkout_request_id: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<String>,
}

impl TransactionRecord {
    pub fn pending(checkout_request_id: impl Into<String>) -> Self {
        TransactionRecord {
            checkout_request_id: checkout_request_id.into(),
            status: TransactionStatus::Pending,
            message: None,
            timestamp: Utc::now(),
            amount: None,
            receipt: None,
            phone_number: None,
            transaction_date: None,
        }
    }
}
