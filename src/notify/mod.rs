//! Outbound notification seam.
//!
//! Delivery is best-effort by contract: callers log a failed send and
//! move on, it never aborts the work that triggered it.

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Telegram delivery coordinates, read from display configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramChannel {
    pub api_key: String,
    pub chat_id: String,
}

/// Fire-and-forget message sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: &TelegramChannel, text: &str) -> Result<()>;
}

/// Telegram Bot API sender.
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new() -> Self {
        Self::with_base_url("https://api.telegram.org")
    }

    /// Point at a different API host, for tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for TelegramNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, channel: &TelegramChannel, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url.trim_end_matches('/'),
            channel.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": channel.chat_id,
                "text": text,
            }))
            .send()
            .await
            .context("Telegram API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API returned status {}: {}", status, body);
        }
        Ok(())
    }
}
