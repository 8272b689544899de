use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use inkportal_server::cache::{CacheAdmin, SqliteCacheStore};
use inkportal_server::config;
use inkportal_server::display::SqliteDisplayStore;
use inkportal_server::jobs::{
    spawn_periodic, BitmapGenerationJob, CacheCleanupJob, ImageRegenerationProcessor,
    MissedConnectionsJob, WorkQueue,
};
use inkportal_server::notify::TelegramNotifier;
use inkportal_server::render::Web2PngRenderer;
use inkportal_server::server::{run_server, AppState};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (portal.db, cache.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3500)]
    pub port: u16,

    /// Base URL of the portal web UI, used for preview page rendering.
    /// Defaults to the local listen address.
    #[clap(long)]
    pub preview_base_url: Option<String>,

    /// URL of the headless-browser screenshot service.
    #[clap(long, default_value = "http://localhost:3600")]
    pub render_service_url: String,

    /// Timeout in seconds for screenshot requests.
    #[clap(long, default_value_t = 60)]
    pub render_timeout_sec: u64,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            preview_base_url: args.preview_base_url.clone(),
            render_service_url: args.render_service_url.clone(),
            render_timeout_sec: args.render_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  port: {}", app_config.port);
    info!("  render service: {}", app_config.render_service_url);

    let displays = Arc::new(SqliteDisplayStore::new(app_config.portal_db_path())?);
    let cache_store = Arc::new(SqliteCacheStore::new(app_config.cache_db_path())?);
    let cache_admin = CacheAdmin::new(cache_store);

    let renderer = Arc::new(Web2PngRenderer::new(
        app_config.render_service_url.clone(),
        app_config.render_timeout,
    )?);
    let notifier = Arc::new(TelegramNotifier::new());

    let shutdown_token = CancellationToken::new();

    let processor = Arc::new(ImageRegenerationProcessor::new(
        displays.clone(),
        renderer,
        app_config.preview_base_url.clone(),
    ));
    let (regeneration_queue, queue_handle) =
        WorkQueue::spawn(processor, shutdown_token.child_token());

    let jobs = &app_config.background_jobs;
    let bitmap_handle = spawn_periodic(
        Arc::new(BitmapGenerationJob::new(
            displays.clone(),
            regeneration_queue.clone(),
            jobs.bitmap_generation.interval,
        )),
        shutdown_token.child_token(),
    );
    let cleanup_handle = spawn_periodic(
        Arc::new(CacheCleanupJob::new(
            cache_admin.clone(),
            jobs.cache_cleanup.interval,
        )),
        shutdown_token.child_token(),
    );
    let missed_handle = spawn_periodic(
        Arc::new(MissedConnectionsJob::new(
            displays.clone(),
            notifier,
            jobs.missed_connections.interval,
            jobs.missed_connections.startup_delay,
        )),
        shutdown_token.child_token(),
    );

    let state = AppState {
        displays,
        cache: cache_admin,
        regeneration_queue,
    };

    info!("Ready to serve at port {}!", app_config.port);

    let server_result = tokio::select! {
        result = run_server(state, app_config.port, shutdown_token.child_token()) => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            Ok(())
        }
    };

    shutdown_token.cancel();
    for handle in [queue_handle, bitmap_handle, cleanup_handle, missed_handle] {
        // Give every background task a moment to wind down.
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    server_result
}
