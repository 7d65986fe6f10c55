use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use lightning_core::{Engine, Sequencer, SequencerConfig};
use tokio::sync::broadcast;

pub mod engine;
mod http_server;
pub mod persistence;
pub mod protocol;
pub mod samples;

pub use engine::TraceEngine;
pub use http_server::{AppState, create_router, handle_message};
pub use protocol::{InputMessage, OutputMessage};
pub use samples::{SampleError, SamplePool};

use crate::http_server::{forward_playback_errors, forward_positions};

const BROADCAST_CAPACITY: usize = 256;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, host:port
    pub bind: String,
    /// Directory served for paths no route claims
    pub web_root: PathBuf,
    /// Directory scanned for samples at startup
    pub audio_root: PathBuf,
    /// Optional pattern snapshot loaded at startup
    pub pattern_file: Option<PathBuf>,
    pub sequencer: SequencerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_default();
        Self {
            bind: "localhost:3428".to_string(),
            web_root: home.join("www"),
            audio_root: home.join("audio"),
            pattern_file: None,
            sequencer: SequencerConfig::default(),
        }
    }
}

/// Create shared state for the server: scan samples, build the sequencer
/// and start relaying its channels to controllers.
pub fn create_server_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let samples = SamplePool::scan(&config.audio_root)
        .with_context(|| format!("Failed to load samples from {}", config.audio_root.display()))?;
    let samples = Arc::new(samples);
    let engine: Arc<dyn Engine> = Arc::new(TraceEngine::new(
        config.audio_root.clone(),
        samples.clone(),
    ));

    let sequencer = match &config.pattern_file {
        Some(path) => {
            let pattern = persistence::load_pattern(path)?;
            tracing::info!(
                "Loaded pattern of length {} from {}",
                pattern.length(),
                path.display()
            );
            Sequencer::with_pattern(engine.clone(), pattern, config.sequencer.clone())
        }
        None => Sequencer::new(engine.clone(), config.sequencer.clone()),
    }
    .context("Failed to create sequencer")?;
    let sequencer = Arc::new(sequencer);

    let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
    forward_positions(sequencer.positions(), broadcast_tx.clone());
    forward_playback_errors(
        sequencer.errors(),
        Arc::downgrade(&sequencer),
        broadcast_tx.clone(),
    );

    Ok(AppState {
        sequencer,
        samples,
        engine,
        broadcast_tx,
        web_root: config.web_root.clone(),
    })
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let state = create_server_state(&config)?;
    let sequencer = state.sequencer.clone();
    tracing::info!(
        "Sequencer ready: {} positions at {} bpm in {}",
        sequencer.length(),
        sequencer.tempo(),
        sequencer.bardiv()
    );

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(
        "HTTP server listening on http://{} (web root {})",
        listener.local_addr()?,
        config.web_root.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tokio::task::spawn_blocking(move || sequencer.stop()).await?;
    tracing::info!("Sequencer stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
