//! Image regeneration job.
//!
//! Renders a display's calendar page through the headless-browser
//! sidecar and stores the resulting PNG so the display can fetch it on
//! its next wakeup. One request per display is in flight at a time.

use crate::display::DisplayStore;
use crate::jobs::{WorkProcessor, WorkRequest};
use crate::render::Renderer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The deduplication key for a display's regeneration requests.
pub fn regeneration_key(display_id: i64) -> String {
    format!("regenerate_{}", display_id)
}

/// A request to regenerate the image for one display.
#[derive(Debug, Clone)]
pub struct ImageRegenerationRequest {
    pub display_id: i64,
    pub requested_at: DateTime<Utc>,
}

impl ImageRegenerationRequest {
    pub fn new(display_id: i64) -> Self {
        Self {
            display_id,
            requested_at: Utc::now(),
        }
    }
}

impl WorkRequest for ImageRegenerationRequest {
    fn dedup_key(&self) -> String {
        regeneration_key(self.display_id)
    }

    fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

/// Processes regeneration requests: render the preview page at the
/// display's virtual size and persist the PNG.
pub struct ImageRegenerationProcessor {
    displays: Arc<dyn DisplayStore>,
    renderer: Arc<dyn Renderer>,
    /// Base URL of the portal's own web UI, whose preview pages get
    /// rendered.
    preview_base_url: String,
}

impl ImageRegenerationProcessor {
    pub fn new(
        displays: Arc<dyn DisplayStore>,
        renderer: Arc<dyn Renderer>,
        preview_base_url: impl Into<String>,
    ) -> Self {
        Self {
            displays,
            renderer,
            preview_base_url: preview_base_url.into(),
        }
    }

    fn preview_url(&self, display_id: i64) -> String {
        format!(
            "{}/displays/{}/preview",
            self.preview_base_url.trim_end_matches('/'),
            display_id
        )
    }
}

#[async_trait]
impl WorkProcessor<ImageRegenerationRequest> for ImageRegenerationProcessor {
    fn service_name(&self) -> &'static str {
        "Image Regeneration Service"
    }

    async fn process(
        &self,
        request: ImageRegenerationRequest,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        let display = match self.displays.get_display(request.display_id)? {
            Some(d) => d,
            None => {
                // Deleted between enqueue and processing, nothing to do.
                warn!(
                    "Display {} not found, cannot regenerate image",
                    request.display_id
                );
                return Ok(());
            }
        };

        let url = self.preview_url(display.id);
        let png = self
            .renderer
            .render(&url, display.virtual_width(), display.virtual_height())
            .await
            .with_context(|| format!("Failed to render page for display {}", display.id))?;

        self.displays
            .store_rendered_image(display.id, &png)
            .with_context(|| format!("Failed to store image for display {}", display.id))?;

        info!(
            "Regenerated image for display {} ({} bytes at {}x{})",
            display.id,
            png.len(),
            display.virtual_width(),
            display.virtual_height()
        );
        Ok(())
    }
}
