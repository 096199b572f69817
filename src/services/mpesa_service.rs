// services/mpesa_service.rs
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::Utc;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::models::gateway::*;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Daraja API client. Holds the resolved configuration and a bearer token
/// that is acquired on first use and cached for the life of the process.
///
/// Two callers racing on an empty cache may both exchange credentials; the
/// token endpoint is idempotent and the last write wins.
#[derive(Debug, Clone)]
pub struct MpesaService {
    config: GatewayConfig,
    client: Client,
    cached_token: Arc<RwLock<Option<String>>>,
}

impl MpesaService {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        MpesaService {
            config,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn generate_password(&self, timestamp: &str) -> String {
        let password_string = format!(
            "{}{}{}",
            self.config.short_code, self.config.passkey, timestamp
        );
        base64.encode(password_string)
    }

    /// Current UTC time as the 14-digit `YYYYMMDDHHmmss` form Daraja expects.
    fn timestamp() -> String {
        Utc::now().format("%Y%m%d%H%M%S").to_string()
    }

    /// Exchanges consumer key and secret for a bearer token, caching it on
    /// success. Subsequent calls return the cached token without touching
    /// the network; there is no expiry tracking and no refresh on 401.
    pub async fn access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().unwrap();
            if let Some(token) = cached.as_ref() {
                return Ok(token.clone());
            }
        }

        info!("Requesting new access token");
        let auth_pair = format!(
            "{}:{}",
            self.config.consumer_key, self.config.consumer_secret
        );
        let encoded_auth = base64.encode(auth_pair);

        let response = self
            .client
            .get(self.config.auth_url())
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .send()
            .await
            .map_err(|e| GatewayError::Authentication(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Failed to get access token: {} - {}", status, body);
            return Err(GatewayError::Authentication(format!(
                "{}: {}",
                status,
                upstream_message(&body)
            )));
        }

        let auth_response: AuthResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Authentication(e.to_string()))?;

        {
            let mut cached = self.cached_token.write().unwrap();
            *cached = Some(auth_response.access_token.clone());
        }

        info!("Access token obtained and cached");
        Ok(auth_response.access_token)
    }

    /// C2B: STK push (Lipa na M-Pesa Online). The response carries the
    /// `CheckoutRequestID` used to correlate the asynchronous callback.
    pub async fn stk_push(
        &self,
        phone_number: &str,
        amount: &str,
        account_reference: &str,
        transaction_desc: &str,
    ) -> Result<StkPushResponse> {
        info!("C2B: STK push for {} - KSh {}", phone_number, amount);

        let timestamp = Self::timestamp();
        let request = StkPushRequest {
            business_short_code: self.config.short_code.clone(),
            password: self.generate_password(&timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: amount.to_string(),
            party_a: phone_number.to_string(),
            party_b: self.config.short_code.clone(),
            phone_number: phone_number.to_string(),
            callback_url: self.config.callback_url.clone(),
            account_reference: account_reference.to_string(),
            transaction_desc: transaction_desc.to_string(),
        };

        let response: StkPushResponse = self
            .authorized_post(self.config.stk_push_url(), &request, "stk push")
            .await?;
        info!("C2B initiated: {}", response.checkout_request_id);
        Ok(response)
    }

    /// Queries the state of an earlier STK push by its `CheckoutRequestID`.
    pub async fn stk_query(&self, checkout_request_id: &str) -> Result<StkQueryResponse> {
        let timestamp = Self::timestamp();
        let request = StkQueryRequest {
            business_short_code: self.config.short_code.clone(),
            password: self.generate_password(&timestamp),
            timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        };

        self.authorized_post(self.config.stk_query_url(), &request, "stk push query")
            .await
    }

    /// B2C: disburses funds to a customer. `command_id` defaults to
    /// `BusinessPayment`.
    pub async fn b2c(
        &self,
        phone_number: &str,
        amount: &str,
        command_id: Option<&str>,
        remarks: &str,
        occasion: Option<&str>,
    ) -> Result<GatewayAck> {
        info!("B2C: sending to {} - KSh {}", phone_number, amount);

        let request = B2cRequest {
            initiator_name: self.config.initiator_name.clone(),
            security_credential: self.config.security_credential.clone(),
            command_id: command_id.unwrap_or("BusinessPayment").to_string(),
            amount: amount.to_string(),
            party_a: self.config.short_code.clone(),
            party_b: phone_number.to_string(),
            remarks: remarks.to_string(),
            queue_timeout_url: self.config.timeout_url.clone(),
            result_url: self.config.result_url.clone(),
            occasion: occasion.map(|s| s.to_string()),
        };

        let response: GatewayAck = self
            .authorized_post(self.config.b2c_url(), &request, "b2c payment")
            .await?;
        info!("B2C initiated: {}", response.conversation_id);
        Ok(response)
    }

    /// B2B: transfers funds to another organization. `command_id` defaults
    /// to `BusinessToBusinessTransfer`.
    pub async fn b2b(
        &self,
        receiver_short_code: &str,
        amount: &str,
        command_id: Option<&str>,
        account_reference: &str,
        remarks: &str,
    ) -> Result<GatewayAck> {
        let request = B2bRequest {
            initiator: self.config.initiator_name.clone(),
            security_credential: self.config.security_credential.clone(),
            command_id: command_id.unwrap_or("BusinessToBusinessTransfer").to_string(),
            sender_identifier_type: "4".to_string(),
            reciever_identifier_type: "4".to_string(),
            amount: amount.to_string(),
            party_a: self.config.short_code.clone(),
            party_b: receiver_short_code.to_string(),
            account_reference: account_reference.to_string(),
            remarks: remarks.to_string(),
            queue_timeout_url: self.config.timeout_url.clone(),
            result_url: self.config.result_url.clone(),
        };

        self.authorized_post(self.config.b2b_url(), &request, "b2b transfer")
            .await
    }

    /// Looks up a settled transaction by its M-Pesa transaction id.
    pub async fn transaction_status(&self, transaction_id: &str) -> Result<GatewayAck> {
        let request = TransactionStatusRequest {
            initiator: self.config.initiator_name.clone(),
            security_credential: self.config.security_credential.clone(),
            command_id: "TransactionStatusQuery".to_string(),
            transaction_id: transaction_id.to_string(),
            party_a: self.config.short_code.clone(),
            identifier_type: "4".to_string(),
            result_url: self.config.result_url.clone(),
            queue_timeout_url: self.config.timeout_url.clone(),
            remarks: "Transaction status query".to_string(),
            occasion: None,
        };

        self.authorized_post(
            self.config.transaction_status_url(),
            &request,
            "transaction status query",
        )
        .await
    }

    /// Queries the working account balance of the short code.
    pub async fn account_balance(&self) -> Result<GatewayAck> {
        let request = AccountBalanceRequest {
            initiator: self.config.initiator_name.clone(),
            security_credential: self.config.security_credential.clone(),
            command_id: "AccountBalance".to_string(),
            party_a: self.config.short_code.clone(),
            identifier_type: "4".to_string(),
            remarks: "Account balance query".to_string(),
            queue_timeout_url: self.config.timeout_url.clone(),
            result_url: self.config.result_url.clone(),
        };

        self.authorized_post(
            self.config.account_balance_url(),
            &request,
            "account balance query",
        )
        .await
    }

    /// Reverses a settled transaction back to the payer.
    pub async fn reversal(&self, transaction_id: &str, amount: &str) -> Result<GatewayAck> {
        let request = ReversalRequest {
            initiator: self.config.initiator_name.clone(),
            security_credential: self.config.security_credential.clone(),
            command_id: "TransactionReversal".to_string(),
            transaction_id: transaction_id.to_string(),
            amount: amount.to_string(),
            receiver_party: self.config.short_code.clone(),
            reciever_identifier_type: "11".to_string(),
            result_url: self.config.result_url.clone(),
            queue_timeout_url: self.config.timeout_url.clone(),
            remarks: "Transaction reversal".to_string(),
            occasion: None,
        };

        self.authorized_post(self.config.reversal_url(), &request, "reversal")
            .await
    }

    /// Registers the C2B confirmation and validation URLs for the short
    /// code. `response_type` defaults to `Completed`.
    pub async fn c2b_register(
        &self,
        confirmation_url: &str,
        validation_url: &str,
        response_type: Option<&str>,
    ) -> Result<C2bResponse> {
        let request = C2bRegisterRequest {
            short_code: self.config.short_code.clone(),
            response_type: response_type.unwrap_or("Completed").to_string(),
            confirmation_url: confirmation_url.to_string(),
            validation_url: validation_url.to_string(),
        };

        self.authorized_post(
            self.config.c2b_register_url(),
            &request,
            "c2b url registration",
        )
        .await
    }

    /// Simulates a customer-initiated paybill payment (sandbox facility).
    pub async fn c2b_simulate(
        &self,
        phone_number: &str,
        amount: &str,
        bill_ref: &str,
    ) -> Result<C2bResponse> {
        let request = C2bSimulateRequest {
            short_code: self.config.short_code.clone(),
            command_id: "CustomerPayBillOnline".to_string(),
            amount: amount.to_string(),
            msisdn: phone_number.to_string(),
            bill_ref_number: bill_ref.to_string(),
        };

        self.authorized_post(self.config.c2b_simulate_url(), &request, "c2b simulate")
            .await
    }

    /// Shared credential-then-call path: acquire (or reuse) the bearer
    /// token, POST the JSON body, decode the typed response. Non-2xx
    /// responses become an operation error wrapping the gateway's
    /// `errorMessage` when one is present.
    async fn authorized_post<B, R>(&self, url: String, body: &B, operation: &'static str) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let access_token = self.access_token().await?;

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("{} failed: {} - {}", operation, status, body);
            return Err(GatewayError::operation(operation, upstream_message(&body)));
        }

        Ok(response.json().await?)
    }
}

/// Pulls `errorMessage` out of a Daraja error body, falling back to the raw
/// text.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error_message)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, GatewayOptions};

    fn service() -> MpesaService {
        let config = GatewayOptions {
            consumer_key: Some("key".into()),
            consumer_secret: Some("secret".into()),
            short_code: Some("174379".into()),
            passkey: Some("passkey".into()),
            callback_url: Some("https://example.com/callback".into()),
            initiator_name: Some("testapi".into()),
            security_credential: Some("credential".into()),
            environment: Some(Environment::Sandbox),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        MpesaService::new(config)
    }

    #[test]
    fn timestamp_is_fourteen_digits() {
        let ts = MpesaService::timestamp();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn password_is_base64_of_shortcode_passkey_timestamp() {
        let service = service();
        let password = service.generate_password("20240101093000");
        let decoded = base64.decode(password).unwrap();
        assert_eq!(decoded, b"174379passkey20240101093000");
    }

    #[test]
    fn upstream_message_prefers_error_field() {
        let body = r#"{"requestId":"1","errorCode":"400.002.02","errorMessage":"Bad Request - Invalid Timestamp"}"#;
        assert_eq!(upstream_message(body), "Bad Request - Invalid Timestamp");
        assert_eq!(upstream_message("plain text"), "plain text");
    }
}
