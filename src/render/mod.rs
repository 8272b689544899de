//! Page-to-image rendering seam.
//!
//! The portal never rasterizes pages itself; a headless-browser sidecar
//! exposes `GET /screenshot?w=..&h=..&url=..` and returns PNG bytes.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("render service returned status {status}: {body}")]
    Service { status: u16, body: String },
}

/// Renders a page at the given viewport size into image bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, width: u32, height: u32) -> Result<Vec<u8>, RenderError>;
}

/// Client for the headless-browser screenshot sidecar.
pub struct Web2PngRenderer {
    client: reqwest::Client,
    service_url: String,
}

impl Web2PngRenderer {
    pub fn new(service_url: impl Into<String>, timeout: Duration) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            service_url: service_url.into(),
        })
    }
}

#[async_trait]
impl Renderer for Web2PngRenderer {
    async fn render(&self, url: &str, width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
        let endpoint = format!("{}/screenshot", self.service_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&endpoint)
            .query(&[
                ("w", width.to_string()),
                ("h", height.to_string()),
                ("url", url.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Service {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
