//! Detection of displays that stopped phoning home.
//!
//! Each cycle compares every display's expected next contact (derived
//! from its last visit and wakeup schedule) against the clock, minus a
//! configurable safety lag. A display overdue for the configured number
//! of consecutive cycles is flagged frozen and its owner notified once.

use crate::display::wakeup::next_wakeup_time;
use crate::display::{config_keys, Display, DisplayStore};
use crate::jobs::PeriodicJob;
use crate::notify::{Notifier, TelegramChannel};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub struct MissedConnectionsJob {
    displays: Arc<dyn DisplayStore>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    startup_delay: Duration,
}

impl MissedConnectionsJob {
    pub fn new(
        displays: Arc<dyn DisplayStore>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
        startup_delay: Duration,
    ) -> Self {
        Self {
            displays,
            notifier,
            interval,
            startup_delay,
        }
    }

    async fn check_display(&self, display: &Display) -> Result<()> {
        let last_visit = match self.displays.last_visit(display.id)? {
            Some(v) => v,
            None => {
                debug!(
                    "Display {} has never connected, skipping alive check",
                    display.id
                );
                return Ok(());
            }
        };

        let schedule = self
            .displays
            .get_string(display.id, config_keys::WAKEUP_SCHEDULE)?
            .unwrap_or_default();
        let expected = next_wakeup_time(&schedule, last_visit).next_wakeup;

        let lag_minutes = self
            .displays
            .get_int(display.id, config_keys::ALIVE_CHECK_SAFETY_LAG_MINUTES)?
            .unwrap_or(0);
        let deadline = Utc::now() - ChronoDuration::minutes(lag_minutes);

        if expected >= deadline {
            return Ok(());
        }

        let count = self.displays.increase_missed_connects(display.id, expected)?;
        let threshold = self
            .displays
            .get_int(display.id, config_keys::ALIVE_CHECK_MINIMAL_FAILURE_COUNT)?
            .unwrap_or(1);

        if count == threshold {
            self.report_frozen(display, last_visit, expected, threshold)
                .await?;
        } else if count > threshold {
            debug!(
                "Display {} is still frozen ({} missed cycles)",
                display.id, count
            );
        }
        Ok(())
    }

    async fn report_frozen(
        &self,
        display: &Display,
        last_visit: chrono::DateTime<Utc>,
        expected: chrono::DateTime<Utc>,
        threshold: i64,
    ) -> Result<()> {
        self.displays
            .set_string(display.id, config_keys::FROZEN_NOTIFICATION_SENT, "1")?;

        let hours_ago = (Utc::now() - last_visit).num_minutes() as f64 / 60.0;
        let message = format!(
            "Display '{}' (id {}) appears frozen: last contact {} ({:.1} hours ago), \
             expected contact at {}, missed {} consecutive checks",
            display.name,
            display.id,
            last_visit.to_rfc3339(),
            hours_ago,
            expected.to_rfc3339(),
            threshold
        );
        warn!("{}", message);

        if let Some(channel) = self.telegram_channel(display.id)? {
            // Notification failure must not abort the detection cycle.
            if let Err(e) = self.notifier.send(&channel, &message).await {
                error!(
                    "Failed to send frozen notification for display {}: {:#}",
                    display.id, e
                );
            }
        }
        Ok(())
    }

    fn telegram_channel(&self, display_id: i64) -> Result<Option<TelegramChannel>> {
        if !self.displays.get_bool(display_id, config_keys::TELEGRAM)? {
            return Ok(None);
        }
        let api_key = self
            .displays
            .get_string(display_id, config_keys::TELEGRAM_API_KEY)?
            .unwrap_or_default();
        let chat_id = self
            .displays
            .get_string(display_id, config_keys::TELEGRAM_CHAT_ID)?
            .unwrap_or_default();
        if api_key.is_empty() || chat_id.is_empty() {
            debug!(
                "Telegram enabled for display {} but api key or chat id is missing",
                display_id
            );
            return Ok(None);
        }
        Ok(Some(TelegramChannel { api_key, chat_id }))
    }
}

#[async_trait]
impl PeriodicJob for MissedConnectionsJob {
    fn name(&self) -> &'static str {
        "Missed Connections Check Service"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn startup_delay(&self) -> Duration {
        self.startup_delay
    }

    async fn execute(&self, _cancel: &CancellationToken) -> Result<()> {
        for display in self.displays.list_displays()? {
            if display.is_default() {
                continue;
            }
            // One misbehaving display must not shadow the rest.
            if let Err(e) = self.check_display(&display).await {
                warn!("Alive check failed for display {}: {:#}", display.id, e);
            }
        }
        Ok(())
    }
}
