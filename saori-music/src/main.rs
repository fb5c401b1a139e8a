//! Saori music player (saori-music) - Main entry point
//!
//! Runs the per-guild playback engine behind its HTTP control API. Without
//! a bot voice session attached, voice output goes through the dry-run
//! transport.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use saori_common::config::{default_config_file, resolve_data_folder};
use saori_common::events::EventBus;
use saori_music::api::{self, AppContext};
use saori_music::config::Config;
use saori_music::playback::{
    DryRunTransport, EngineSettings, PlaybackEngine, PlaylistStore, VoiceConnectionManager,
    YtDlpResolver,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for saori-music
#[derive(Parser, Debug)]
#[command(name = "saori-music")]
#[command(about = "Per-guild music playback service for the Saori bot")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "SAORI_MUSIC_PORT")]
    port: Option<u16>,

    /// Folder holding the playlist snapshot
    #[arg(short, long)]
    data_folder: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, env = "SAORI_MUSIC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_file("saori-music"));
    let config =
        Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("saori_music={},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = args.port.unwrap_or(config.port);
    let data_folder = resolve_data_folder(
        args.data_folder.as_deref(),
        "SAORI_DATA_FOLDER",
        config.data_folder.as_deref(),
    );

    info!("Starting Saori music player on port {}", port);
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => warn!("No configuration file, using defaults"),
    }
    info!("Data folder: {}", data_folder.display());

    let store = Arc::new(PlaylistStore::load(data_folder.join(&config.playlist_file)).await);
    let resolver = Arc::new(YtDlpResolver::new(&config.resolver));
    let transport = Arc::new(DryRunTransport::new(config.voice.default_track_length()));
    let voice = Arc::new(VoiceConnectionManager::new(
        transport,
        config.voice.connect_timeout(),
    ));
    let events = EventBus::new(config.engine.event_capacity);

    let engine = Arc::new(PlaybackEngine::new(
        store,
        resolver,
        voice,
        events,
        EngineSettings::from(&config.engine),
    ));
    info!("Playback engine initialized");

    let ctx = AppContext {
        engine: engine.clone(),
        port,
    };
    let served = api::run(ctx, shutdown_signal()).await;

    engine.shutdown().await;
    served.context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
