//! HTTP boundary
//!
//! `POST /get-audio-features` downloads a track's stems into a per-request
//! scratch directory and runs the pipeline on it. `GET /health` answers `ok`.

mod download;
mod routes;
mod state;

pub use routes::{AudioFeaturesRequest, AudioFeaturesResponse};
pub use state::{GuardedModel, ServerState};

use crate::analysis::traits::RhythmModel;
use crate::config::Settings;
use crate::error::{Result, StemrhythmError};
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Parent of the per-request scratch directories
    pub scratch_dir: PathBuf,
    /// Pipeline settings shared by every request
    pub settings: Settings,
}

impl ServerConfig {
    /// `/dev/shm` when available, the system temp dir otherwise
    pub fn default_scratch_dir() -> PathBuf {
        let shm = PathBuf::from("/dev/shm");
        if shm.is_dir() {
            shm
        } else {
            std::env::temp_dir()
        }
    }
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/get-audio-features", post(routes::get_audio_features))
        .with_state(state)
}

pub async fn run_server(config: ServerConfig, model: Box<dyn RhythmModel>) -> Result<()> {
    std::fs::create_dir_all(&config.scratch_dir)
        .map_err(|e| StemrhythmError::output_error(&config.scratch_dir, e))?;

    let address = format!("{}:{}", config.host, config.port);
    let app = make_app(ServerState::new(config, model));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| StemrhythmError::ConfigError(format!("Cannot bind {}: {}", address, e)))?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app).await?;
    Ok(())
}
