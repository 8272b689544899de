mod file_config;

pub use file_config::{
    BackgroundJobsConfig, FileConfig, IntervalJobConfig, MissedConnectionsJobConfig,
};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub preview_base_url: Option<String>,
    pub render_service_url: String,
    pub render_timeout_sec: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            port: 3500,
            preview_base_url: None,
            render_service_url: "http://localhost:3600".to_string(),
            render_timeout_sec: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    /// Base URL of the portal's own web UI, used to build preview page
    /// URLs for the renderer. Defaults to the local listen address.
    pub preview_base_url: String,
    pub render_service_url: String,
    pub render_timeout: Duration,
    pub background_jobs: BackgroundJobsSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);

        let preview_base_url = file
            .preview_base_url
            .or_else(|| cli.preview_base_url.clone())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        let render_service_url = file
            .render_service_url
            .unwrap_or_else(|| cli.render_service_url.clone());
        let render_timeout =
            Duration::from_secs(file.render_timeout_sec.unwrap_or(cli.render_timeout_sec));

        let jobs_file = file.background_jobs.unwrap_or_default();
        let jobs_defaults = BackgroundJobsSettings::default();

        let bg_file = jobs_file.bitmap_generation.unwrap_or_default();
        let bitmap_generation = IntervalJobSettings {
            interval: bg_file
                .interval_minutes
                .map(minutes)
                .unwrap_or(jobs_defaults.bitmap_generation.interval),
        };

        let cc_file = jobs_file.cache_cleanup.unwrap_or_default();
        let cache_cleanup = IntervalJobSettings {
            interval: cc_file
                .interval_minutes
                .map(minutes)
                .unwrap_or(jobs_defaults.cache_cleanup.interval),
        };

        let mc_file = jobs_file.missed_connections.unwrap_or_default();
        let missed_connections = MissedConnectionsJobSettings {
            interval: mc_file
                .interval_minutes
                .map(minutes)
                .unwrap_or(jobs_defaults.missed_connections.interval),
            startup_delay: mc_file
                .startup_delay_seconds
                .map(Duration::from_secs)
                .unwrap_or(jobs_defaults.missed_connections.startup_delay),
        };

        Ok(Self {
            db_dir,
            port,
            preview_base_url,
            render_service_url,
            render_timeout,
            background_jobs: BackgroundJobsSettings {
                bitmap_generation,
                cache_cleanup,
                missed_connections,
            },
        })
    }

    pub fn portal_db_path(&self) -> PathBuf {
        self.db_dir.join("portal.db")
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.db_dir.join("cache.db")
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundJobsSettings {
    pub bitmap_generation: IntervalJobSettings,
    pub cache_cleanup: CacheCleanupJobSettings,
    pub missed_connections: MissedConnectionsJobSettings,
}

/// Settings for jobs that only need interval configuration.
#[derive(Debug, Clone)]
pub struct IntervalJobSettings {
    pub interval: Duration,
}

impl Default for IntervalJobSettings {
    fn default() -> Self {
        Self {
            interval: minutes(15),
        }
    }
}

pub type CacheCleanupJobSettings = IntervalJobSettings;

#[derive(Debug, Clone)]
pub struct MissedConnectionsJobSettings {
    pub interval: Duration,
    pub startup_delay: Duration,
}

impl Default for MissedConnectionsJobSettings {
    fn default() -> Self {
        Self {
            interval: minutes(10),
            startup_delay: Duration::from_secs(30),
        }
    }
}
