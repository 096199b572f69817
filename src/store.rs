// src/store.rs
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::callback::StkCallback;
use crate::models::transaction::{TransactionRecord, TransactionStatus};

/// In-memory correlation map from `CheckoutRequestID` to its transaction
/// record. Written by the callback handler, read by status polls, pruned by
/// the periodic sweeper. Clones share the same map.
///
/// A record transitions `Pending -> {Success, Failed}` exactly once; a
/// redelivered callback for a terminal record is ignored, so processing is
/// idempotent with respect to gateway retries.
#[derive(Debug, Clone, Default)]
pub struct TransactionStore {
    inner: Arc<RwLock<HashMap<String, TransactionRecord>>>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pending record for a freshly issued push. No-op when the
    /// identifier is already tracked, so a late registration can never reset
    /// a terminal record.
    pub fn register_pending(&self, checkout_request_id: &str) {
        let mut map = self.inner.write().unwrap();
        if map.contains_key(checkout_request_id) {
            debug!("transaction {} already registered", checkout_request_id);
            return;
        }
        map.insert(
            checkout_request_id.to_string(),
            TransactionRecord::pending(checkout_request_id),
        );
    }

    /// Applies a gateway callback to the matching record. Infallible by
    /// design: anomalies are logged, never propagated, because the callback
    /// endpoint must acknowledge every delivery.
    pub fn apply_callback(&self, callback: &StkCallback) {
        let id = callback.checkout_request_id.as_str();
        let mut map = self.inner.write().unwrap();

        let record = map.entry(id.to_string()).or_insert_with(|| {
            warn!("callback for unregistered transaction {}", id);
            TransactionRecord::pending(id)
        });

        if record.status.is_terminal() {
            info!(
                "duplicate callback for {} ignored (already {:?})",
                id, record.status
            );
            return;
        }

        record.timestamp = Utc::now();
        if callback.result_code == 0 {
            record.status = TransactionStatus::Success;
            record.message = Some(callback.result_desc.clone());
            if let Some(metadata) = &callback.callback_metadata {
                // Fold the {Name, Value} pairs into a single lookup.
                let items: HashMap<&str, &Value> = metadata
                    .items
                    .iter()
                    .map(|item| (item.name.as_str(), &item.value))
                    .collect();
                record.amount = items.get("Amount").and_then(|v| v.as_f64());
                record.receipt = items
                    .get("MpesaReceiptNumber")
                    .and_then(|v| value_to_string(v));
                record.phone_number = items.get("PhoneNumber").and_then(|v| value_to_string(v));
                record.transaction_date = items
                    .get("TransactionDate")
                    .and_then(|v| value_to_string(v));
            }
            info!(
                "transaction {} succeeded: receipt {:?}, amount {:?}",
                id, record.receipt, record.amount
            );
        } else {
            record.status = TransactionStatus::Failed;
            record.message = Some(callback.result_desc.clone());
            warn!(
                "transaction {} failed: {} - {}",
                id, callback.result_code, callback.result_desc
            );
        }
    }

    /// Read-only lookup; `None` means the identifier is unknown.
    pub fn get_status(&self, checkout_request_id: &str) -> Option<TransactionRecord> {
        self.inner
            .read()
            .unwrap()
            .get(checkout_request_id)
            .cloned()
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.inner.read().unwrap().values().cloned().collect()
    }

    /// (total, successful, failed, pending)
    pub fn stats(&self) -> (usize, usize, usize, usize) {
        let map = self.inner.read().unwrap();
        let successful = map
            .values()
            .filter(|r| r.status == TransactionStatus::Success)
            .count();
        let failed = map
            .values()
            .filter(|r| r.status == TransactionStatus::Failed)
            .count();
        let pending = map
            .values()
            .filter(|r| r.status == TransactionStatus::Pending)
            .count();
        (map.len(), successful, failed, pending)
    }

    /// Removes records last updated before `now - max_age`. Returns how many
    /// were dropped.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut map = self.inner.write().unwrap();
        let before = map.len();
        map.retain(|_, record| record.timestamp >= cutoff);
        before - map.len()
    }

    /// Spawns the retention sweeper on its own fixed-interval timer,
    /// decoupled from request and callback traffic.
    pub fn spawn_sweeper(&self, period: std::time::Duration, max_age: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep(max_age);
                if removed > 0 {
                    info!("swept {} expired transaction records", removed);
                }
            }
        })
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
