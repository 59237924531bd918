//! Push notification client.
//!
//! Thin reqwest wrapper around an FCM-style HTTP endpoint. When no server
//! key is configured the client runs in simulation mode and only logs, so
//! local development and tests need no external service. Sends are
//! best-effort; callers treat failures as non-fatal and prune any tokens
//! the endpoint reports as invalid.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub server_key: Option<String>,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl PushConfig {
    pub fn from_env() -> Self {
        Self {
            server_key: std::env::var("PUSH_SERVER_KEY").ok().filter(|k| !k.is_empty()),
            endpoint: std::env::var("PUSH_ENDPOINT")
                .unwrap_or_else(|_| "https://fcm.googleapis.com/fcm/send".to_string()),
            timeout_secs: std::env::var("PUSH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    failure: u32,
    #[serde(default)]
    results: Vec<PushResult>,
}

#[derive(Debug, Deserialize)]
struct PushResult {
    #[serde(default)]
    error: Option<String>,
}

pub struct PushClient {
    client: Client,
    config: PushConfig,
}

impl PushClient {
    pub fn new(config: PushConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn from_env() -> Self {
        Self::new(PushConfig::from_env())
    }

    fn is_simulated(&self) -> bool {
        self.config.server_key.is_none()
    }

    /// Send a notification to a set of device tokens. Returns the tokens the
    /// endpoint rejected so callers can prune them from the owning record.
    pub async fn send(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Vec<String> {
        if tokens.is_empty() {
            return Vec::new();
        }

        if self.is_simulated() {
            info!(
                "Simulated push to {} device(s): {} - {}",
                tokens.len(),
                title,
                body
            );
            return Vec::new();
        }

        let key = self.config.server_key.as_deref().unwrap_or_default();
        let payload = json!({
            "registration_ids": tokens,
            "notification": { "title": title, "body": body },
            "data": data,
        });

        let response = match self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("key={}", key))
            .json(&payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Push send failed: {}", e);
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("Push endpoint returned {}", response.status());
            return Vec::new();
        }

        let parsed: PushResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to parse push response: {}", e);
                return Vec::new();
            }
        };

        if parsed.failure == 0 {
            return Vec::new();
        }

        // Results come back positionally aligned with the token list
        tokens
            .iter()
            .zip(parsed.results.iter())
            .filter(|(_, r)| {
                matches!(
                    r.error.as_deref(),
                    Some("NotRegistered") | Some("InvalidRegistration")
                )
            })
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_send_returns_no_invalid_tokens() {
        let client = PushClient::new(PushConfig {
            server_key: None,
            endpoint: "http://localhost:0".into(),
            timeout_secs: 1,
        });
        let invalid = client
            .send(&["tok1".into()], "Trip accepted", "A driver is on the way", json!({}))
            .await;
        assert!(invalid.is_empty());
    }

    #[tokio::test]
    async fn test_empty_token_list_is_noop() {
        let client = PushClient::new(PushConfig {
            server_key: Some("key".into()),
            endpoint: "http://localhost:0".into(),
            timeout_secs: 1,
        });
        let invalid = client.send(&[], "t", "b", json!({})).await;
        assert!(invalid.is_empty());
    }
}
