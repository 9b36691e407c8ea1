//! Webhook notifier.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use ember_core::NotifyConfig;

use crate::notifier::{Notifier, NotifyResult};

const DEFAULT_USERNAME: &str = "ember alerts";

/// Posts alerts as JSON `{text, username, icon_url}` to a webhook URL.
/// Username and icon are plain configuration fields; callers that want
/// different branding set them per instance.
pub struct WebhookNotifier {
    url: String,
    username: String,
    icon_url: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> NotifyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(WebhookNotifier {
            url: url.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            icon_url: None,
            client,
        })
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    pub fn with_icon_url(mut self, icon_url: &str) -> Self {
        self.icon_url = Some(icon_url.to_string());
        self
    }

    pub fn from_config(config: &NotifyConfig) -> NotifyResult<Self> {
        let mut notifier = WebhookNotifier::new(&config.webhook_url)?;
        if let Some(username) = &config.username {
            notifier = notifier.with_username(username);
        }
        if let Some(icon_url) = &config.icon_url {
            notifier = notifier.with_icon_url(icon_url);
        }
        Ok(notifier)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> NotifyResult<u16> {
        let payload = WebhookPayload {
            text: message,
            username: &self.username,
            icon_url: self.icon_url.as_deref(),
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status().as_u16();
        debug!(status, "webhook delivered");
        Ok(status)
    }
}
