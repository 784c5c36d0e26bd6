//! Kakao AlimTalk messaging API client
//!
//! One JSON POST per message, bearer-token authenticated. The API answers
//! HTTP 200 with `{"status": "success"}` on delivery and any other status
//! plus a `reason` when it refuses the message.

use super::{Notifier, NotifyError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use staysync_common::config::NotifierConfig;
use staysync_common::{Error, Result};
use std::time::Duration;

const USER_AGENT: &str = concat!("staysync-recon/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    sender_key: &'a str,
    template_code: &'a str,
    phone_number: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    status: Option<String>,
    reason: Option<String>,
}

pub struct AlimTalkNotifier {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sender_key: String,
}

impl AlimTalkNotifier {
    pub fn new(endpoint: &str, api_key: &str, sender_key: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            sender_key: sender_key.to_string(),
        })
    }

    /// Both keys are required once an endpoint is configured
    pub fn from_config(endpoint: &str, config: &NotifierConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("notifier.api_key is required with an endpoint".into()))?;
        let sender_key = config
            .sender_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("notifier.sender_key is required with an endpoint".into())
            })?;

        Self::new(endpoint, api_key, sender_key)
    }
}

#[async_trait]
impl Notifier for AlimTalkNotifier {
    async fn send(
        &self,
        phone_number: &str,
        template_id: &str,
        text: &str,
    ) -> std::result::Result<(), NotifyError> {
        let body = SendRequest {
            sender_key: &self.sender_key,
            template_code: template_id,
            phone_number,
            message: text,
        };

        tracing::debug!(template_id, "Sending AlimTalk message");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(NotifyError::ApiError(status.as_u16(), detail));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Rejected(format!("unreadable response: {}", e)))?;

        match parsed.status.as_deref() {
            Some("success") => Ok(()),
            _ => Err(NotifyError::Rejected(
                parsed.reason.unwrap_or_else(|| "no reason given".to_string()),
            )),
        }
    }
}
