//! Narrator Engine - Main entry point
//!
//! Runs the narration engine as an HTTP/SSE service with the headless
//! playback backends.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use narrator_engine::audio::{HeadlessDecodeBackend, HeadlessElementBackend};
use narrator_engine::config::{Config, ConfigOverrides};
use narrator_engine::playback::NarrationEngine;
use narrator_engine::tts::{HttpSynthesizer, NoopSynthesizer, SpeechSynthesizer};

/// Command-line arguments for narrator-engine
#[derive(Parser, Debug)]
#[command(name = "narrator-engine")]
#[command(about = "Narration playback and caption synchronization service")]
#[command(version)]
struct Args {
    /// Path to TOML config file (falls back to NARRATOR_CONFIG, then the
    /// platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "NARRATOR_PORT")]
    port: Option<u16>,

    /// TTS synthesis endpoint
    #[arg(long, env = "NARRATOR_TTS_ENDPOINT")]
    tts_endpoint: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "NARRATOR_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = narrator_common::config::resolve_config_path(
        args.config.as_deref(),
        "NARRATOR_CONFIG",
        "narrator-engine",
    )
    .context("Failed to resolve config file")?;

    let config = Config::load(
        config_path.as_deref(),
        ConfigOverrides {
            port: args.port,
            tts_endpoint: args.tts_endpoint,
            log_level: args.log_level,
        },
    )
    .context("Failed to load configuration")?;

    // Initialize tracing
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "narrator_engine={level},narrator_common={level},tower_http=info",
                    level = level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting narrator-engine v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let synthesizer: Arc<dyn SpeechSynthesizer> = match &config.tts.endpoint {
        Some(endpoint) => {
            info!("TTS endpoint: {}", endpoint);
            Arc::new(
                HttpSynthesizer::new(endpoint.clone(), config.tts.timeout())
                    .context("Failed to create TTS client")?,
            )
        }
        None => {
            warn!("No TTS endpoint configured; narrations without audio play caption-only");
            Arc::new(NoopSynthesizer)
        }
    };

    let engine = NarrationEngine::builder(config.engine.clone())
        .backend(Arc::new(HeadlessDecodeBackend::new(
            config.headless.decode_context_running,
        )))
        .backend(Arc::new(HeadlessElementBackend::new(
            config.headless.autoplay_requires_gesture,
        )))
        .synthesizer(synthesizer)
        .synthesize_on_miss(config.tts.synthesize_on_miss)
        .build()
        .context("Failed to initialize narration engine")?;
    info!("Narration engine initialized");

    narrator_engine::api::run(&config, engine.clone(), shutdown_signal())
        .await
        .context("HTTP server failed")?;

    engine.stop().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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
