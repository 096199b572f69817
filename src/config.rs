// src/config.rs
use std::env;
use std::str::FromStr;

use crate::error::{GatewayError, Result};

/// Selects which Daraja host requests are sent to. `Custom` points the
/// client at an arbitrary base URL, e.g. a local stub gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Sandbox,
    Production,
    Custom(String),
}

impl Environment {
    pub fn base_url(&self) -> &str {
        match self {
            Environment::Sandbox => "https://sandbox.safaricom.co.ke",
            Environment::Production => "https://api.safaricom.co.ke",
            Environment::Custom(url) => url,
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sandbox" => Ok(Environment::Sandbox),
            "production" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Sandbox
    }
}

/// Explicitly supplied configuration. Any field left `None` falls back to
/// the corresponding `MPESA_*` environment variable during [`resolve`].
///
/// [`resolve`]: GatewayOptions::resolve
#[derive(Debug, Clone, Default)]
pub struct GatewayOptions {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub short_code: Option<String>,
    pub passkey: Option<String>,
    pub callback_url: Option<String>,
    pub initiator_name: Option<String>,
    pub security_credential: Option<String>,
    pub environment: Option<Environment>,
    pub result_url: Option<String>,
    pub timeout_url: Option<String>,
}

/// Fully resolved, validated configuration for [`MpesaService`].
///
/// [`MpesaService`]: crate::services::mpesa_service::MpesaService
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub passkey: String,
    pub callback_url: String,
    pub initiator_name: String,
    pub security_credential: String,
    pub environment: Environment,
    /// Result URL for B2C/B2B/status/balance/reversal. Falls back to `callback_url`.
    pub result_url: String,
    /// Queue-timeout URL for the same operations. Falls back to `callback_url`.
    pub timeout_url: String,
}

impl GatewayOptions {
    /// Resolves against the process environment, validating eagerly.
    ///
    /// Explicit values win over `MPESA_*` variables. Fails with
    /// [`GatewayError::Configuration`] listing every missing required field.
    pub fn resolve(self) -> Result<GatewayConfig> {
        self.resolve_with(|name| env::var(name).ok())
    }

    fn resolve_with(self, fallback: impl Fn(&str) -> Option<String>) -> Result<GatewayConfig> {
        let mut missing = Vec::new();

        let mut require = |explicit: Option<String>, field: &str, var: &str| {
            explicit.or_else(|| fallback(var)).unwrap_or_else(|| {
                missing.push(field.to_string());
                String::new()
            })
        };

        let consumer_key = require(self.consumer_key, "consumer_key", "MPESA_CONSUMER_KEY");
        let consumer_secret = require(
            self.consumer_secret,
            "consumer_secret",
            "MPESA_CONSUMER_SECRET",
        );
        let short_code = require(self.short_code, "short_code", "MPESA_SHORT_CODE");
        let passkey = require(self.passkey, "passkey", "MPESA_PASSKEY");
        let callback_url = require(self.callback_url, "callback_url", "MPESA_CALLBACK_URL");
        let initiator_name = require(self.initiator_name, "initiator_name", "MPESA_INITIATOR_NAME");
        let security_credential = require(
            self.security_credential,
            "security_credential",
            "MPESA_SECURITY_CREDENTIAL",
        );

        if !missing.is_empty() {
            return Err(GatewayError::Configuration(missing));
        }

        let environment = match self.environment {
            Some(env) => env,
            None => fallback("MPESA_ENVIRONMENT")
                .as_deref()
                .map(Environment::from_str)
                .transpose()
                .map_err(|e| GatewayError::Configuration(vec![e]))?
                .unwrap_or_default(),
        };

        let result_url = self
            .result_url
            .or_else(|| fallback("MPESA_B2C_RESULT_URL"))
            .unwrap_or_else(|| callback_url.clone());
        let timeout_url = self
            .timeout_url
            .or_else(|| fallback("MPESA_B2C_QUEUE_TIMEOUT_URL"))
            .unwrap_or_else(|| callback_url.clone());

        Ok(GatewayConfig {
            consumer_key,
            consumer_secret,
            short_code,
            passkey,
            callback_url,
            initiator_name,
            security_credential,
            environment,
            result_url,
            timeout_url,
        })
    }
}

impl GatewayConfig {
    /// Resolves entirely from `MPESA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        GatewayOptions::default().resolve()
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn auth_url(&self) -> String {
        format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.environment.base_url()
        )
    }

    pub fn stk_push_url(&self) -> String {
        format!("{}/mpesa/stkpush/v1/processrequest", self.environment.base_url())
    }

    pub fn stk_query_url(&self) -> String {
        format!("{}/mpesa/stkpushquery/v1/query", self.environment.base_url())
    }

    pub fn b2c_url(&self) -> String {
        format!("{}/mpesa/b2c/v1/paymentrequest", self.environment.base_url())
    }

    pub fn b2b_url(&self) -> String {
        format!("{}/mpesa/b2b/v1/paymentrequest", self.environment.base_url())
    }

    pub fn transaction_status_url(&self) -> String {
        format!(
            "{}/mpesa/transactionstatus/v1/query",
            self.environment.base_url()
        )
    }

    pub fn account_balance_url(&self) -> String {
        format!(
            "{}/mpesa/accountbalance/v1/query",
            self.environment.base_url()
        )
    }

    pub fn reversal_url(&self) -> String {
        format!("{}/mpesa/reversal/v1/request", self.environment.base_url())
    }

    pub fn c2b_register_url(&self) -> String {
        format!("{}/mpesa/c2b/v1/registerurl", self.environment.base_url())
    }

    pub fn c2b_simulate_url(&self) -> String {
        format!("{}/mpesa/c2b/v1/simulate", self.environment.base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_options() -> GatewayOptions {
        GatewayOptions {
            consumer_key: Some("key".into()),
            consumer_secret: Some("secret".into()),
            short_code: Some("174379".into()),
            passkey: Some("passkey".into()),
            callback_url: Some("https://example.com/callback".into()),
            initiator_name: Some("testapi".into()),
            security_credential: Some("credential".into()),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_with_all_fields_explicit() {
        let config = full_options().resolve_with(|_| None).unwrap();
        assert_eq!(config.short_code, "174379");
        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.result_url, "https://example.com/callback");
    }

    #[test]
    fn missing_fields_are_all_enumerated() {
        let err = GatewayOptions::default().resolve_with(|_| None).unwrap_err();
        match err {
            GatewayError::Configuration(missing) => {
                assert_eq!(
                    missing,
                    vec![
                        "consumer_key",
                        "consumer_secret",
                        "short_code",
                        "passkey",
                        "callback_url",
                        "initiator_name",
                        "security_credential",
                    ]
                );
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn partially_missing_fields_are_listed_exactly() {
        let mut options = full_options();
        options.passkey = None;
        options.initiator_name = None;
        let err = options.resolve_with(|_| None).unwrap_err();
        match err {
            GatewayError::Configuration(missing) => {
                assert_eq!(missing, vec!["passkey", "initiator_name"]);
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn explicit_values_take_precedence_over_fallback() {
        let fallback: HashMap<&str, &str> = [
            ("MPESA_CONSUMER_KEY", "env-key"),
            ("MPESA_SHORT_CODE", "600000"),
        ]
        .into_iter()
        .collect();

        let config = full_options()
            .resolve_with(|name| fallback.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.consumer_key, "key");
        assert_eq!(config.short_code, "174379");
    }

    #[test]
    fn fallback_fills_missing_fields() {
        let mut options = full_options();
        options.consumer_secret = None;
        let config = options
            .resolve_with(|name| {
                (name == "MPESA_CONSUMER_SECRET").then(|| "env-secret".to_string())
            })
            .unwrap();
        assert_eq!(config.consumer_secret, "env-secret");
    }

    #[test]
    fn environment_parses_from_fallback() {
        let config = full_options()
            .resolve_with(|name| {
                (name == "MPESA_ENVIRONMENT").then(|| "production".to_string())
            })
            .unwrap();
        assert!(config.is_production());
        assert_eq!(
            config.auth_url(),
            "https://api.safaricom.co.ke/oauth/v1/generate?grant_type=client_credentials"
        );
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let err = full_options()
            .resolve_with(|name| (name == "MPESA_ENVIRONMENT").then(|| "staging".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn sandbox_urls() {
        let config = full_options().resolve_with(|_| None).unwrap();
        assert_eq!(
            config.stk_push_url(),
            "https://sandbox.safaricom.co.ke/mpesa/stkpush/v1/processrequest"
        );
        assert_eq!(
            config.reversal_url(),
            "https://sandbox.safaricom.co.ke/mpesa/reversal/v1/request"
        );
    }
}
