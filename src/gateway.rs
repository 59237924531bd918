//! Payment gateway client for card funding and driver payouts.
//!
//! Wraps a Paystack-style REST API: every response is an envelope of
//! `{ status, message, data }`. Amounts are passed in minor currency units.
//! Without a secret key the client runs in simulation mode, succeeding every
//! call locally, which keeps the funding and payout flows testable offline.

use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub secret_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            secret_key: std::env::var("GATEWAY_SECRET_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            base_url: std::env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            timeout_secs: std::env::var("GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializedCharge {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeVerification {
    pub status: String,
    pub reference: String,
    pub amount: i64,
}

impl ChargeVerification {
    pub fn is_successful(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatedTransfer {
    pub transfer_code: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    source: &'static str,
    recipient: &'a str,
    amount: i64,
    reference: &'a str,
    reason: &'a str,
}

pub struct PaymentGateway {
    client: Client,
    config: GatewayConfig,
}

impl PaymentGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn from_env() -> Self {
        Self::new(GatewayConfig::from_env())
    }

    pub fn is_simulated(&self) -> bool {
        self.config.secret_key.is_none()
    }

    fn auth_header(&self) -> String {
        format!(
            "Bearer {}",
            self.config.secret_key.as_deref().unwrap_or_default()
        )
    }

    /// Start a card charge for wallet funding. The returned authorization
    /// URL is where the payer completes the charge.
    pub async fn initialize_transaction(
        &self,
        email: &str,
        amount: i64,
        reference: &str,
    ) -> AppResult<InitializedCharge> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "Funding amount must be positive".to_string(),
            ));
        }

        if self.is_simulated() {
            info!("Simulated charge init: {} for {}", reference, amount);
            return Ok(InitializedCharge {
                authorization_url: format!("https://simulated.gateway/pay/{}", reference),
                access_code: format!("sim_{}", reference),
                reference: reference.to_string(),
            });
        }

        let url = format!("{}/transaction/initialize", self.config.base_url);
        let body = InitializeRequest {
            email,
            amount,
            reference,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("Gateway request failed: {}", e)))?;

        let envelope: GatewayEnvelope<InitializedCharge> = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("Invalid gateway response: {}", e)))?;

        match envelope.data {
            Some(data) if envelope.status => Ok(data),
            _ => Err(AppError::UpstreamFailure(envelope.message)),
        }
    }

    /// Verify a charge by reference. Callers only credit a wallet after this
    /// reports success for the expected amount.
    pub async fn verify_transaction(&self, reference: &str) -> AppResult<ChargeVerification> {
        if self.is_simulated() {
            info!("Simulated charge verify: {}", reference);
            return Ok(ChargeVerification {
                status: "success".to_string(),
                reference: reference.to_string(),
                amount: 0,
            });
        }

        let url = format!("{}/transaction/verify/{}", self.config.base_url, reference);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("Gateway request failed: {}", e)))?;

        let envelope: GatewayEnvelope<ChargeVerification> = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("Invalid gateway response: {}", e)))?;

        match envelope.data {
            Some(data) if envelope.status => Ok(data),
            _ => {
                warn!("Charge verification failed for {}: {}", reference, envelope.message);
                Err(AppError::UpstreamFailure(envelope.message))
            }
        }
    }

    /// Move funds out to a driver's settlement account
    pub async fn initiate_transfer(
        &self,
        recipient: &str,
        amount: i64,
        reference: &str,
    ) -> AppResult<InitiatedTransfer> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "Payout amount must be positive".to_string(),
            ));
        }

        if self.is_simulated() {
            info!("Simulated transfer: {} for {}", reference, amount);
            return Ok(InitiatedTransfer {
                transfer_code: format!("sim_trf_{}", reference),
                status: "success".to_string(),
            });
        }

        let url = format!("{}/transfer", self.config.base_url);
        let body = TransferRequest {
            source: "balance",
            recipient,
            amount,
            reference,
            reason: "Driver earnings payout",
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("Gateway request failed: {}", e)))?;

        let envelope: GatewayEnvelope<InitiatedTransfer> = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("Invalid gateway response: {}", e)))?;

        match envelope.data {
            Some(data) if envelope.status => Ok(data),
            _ => Err(AppError::UpstreamFailure(envelope.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated() -> PaymentGateway {
        PaymentGateway::new(GatewayConfig {
            secret_key: None,
            base_url: "http://localhost:0".into(),
            timeout_secs: 1,
        })
    }

    #[tokio::test]
    async fn test_simulated_charge_round_trip() {
        let gateway = simulated();
        let charge = gateway
            .initialize_transaction("rider@example.com", 5000, "fund_abc")
            .await
            .unwrap();
        assert_eq!(charge.reference, "fund_abc");

        let verification = gateway.verify_transaction("fund_abc").await.unwrap();
        assert!(verification.is_successful());
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amounts() {
        let gateway = simulated();
        assert!(gateway
            .initialize_transaction("a@b.c", 0, "r1")
            .await
            .is_err());
        assert!(gateway.initiate_transfer("rcp", -5, "r2").await.is_err());
    }
}
