//! Messaging gateway client — a single multicast push call.
//!
//! The gateway accepts `{tokens, notification, data}` where `data` values
//! must already be strings, and answers with per-token results. Partial
//! failure is reported back to the caller, never retried here.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rally_core::config::PushConfig;
use rally_core::{RallyError, Result};
use serde::{Deserialize, Serialize};

/// One multicast push request.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

/// Result for a single token within a multicast call, in token order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate multicast response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MulticastOutcome {
    pub success_count: u32,
    pub failure_count: u32,
    #[serde(default)]
    pub responses: Vec<TokenResult>,
}

/// Seam for push delivery — lets tests swap the HTTP client for a fake.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_multicast(&self, message: &PushMessage) -> Result<MulticastOutcome>;
}

/// reqwest-backed gateway client.
pub struct HttpPushGateway {
    endpoint: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpPushGateway {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.resolve_api_key(),
            timeout: Duration::from_secs(config.timeout_secs),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send_multicast(&self, message: &PushMessage) -> Result<MulticastOutcome> {
        let body = serde_json::json!({
            "tokens": message.tokens,
            "notification": { "title": message.title, "body": message.body },
            "data": message.data,
        });

        let mut req = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .timeout(self.timeout);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RallyError::Delivery(format!("gateway send failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RallyError::Delivery(format!("gateway error {status}: {text}")));
        }

        resp.json::<MulticastOutcome>()
            .await
            .map_err(|e| RallyError::Delivery(format!("gateway response parse: {e}")))
    }
}
