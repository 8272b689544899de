use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// TOML configuration file contents. Every field is optional; values
/// present here override CLI arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub preview_base_url: Option<String>,
    pub render_service_url: Option<String>,
    pub render_timeout_sec: Option<u64>,
    pub background_jobs: Option<BackgroundJobsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackgroundJobsConfig {
    pub bitmap_generation: Option<IntervalJobConfig>,
    pub cache_cleanup: Option<IntervalJobConfig>,
    pub missed_connections: Option<MissedConnectionsJobConfig>,
}

/// File-level settings for jobs that only need interval configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntervalJobConfig {
    pub interval_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissedConnectionsJobConfig {
    pub interval_minutes: Option<u64>,
    pub startup_delay_seconds: Option<u64>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path.as_ref()))
    }
}
