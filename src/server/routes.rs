use super::download::fetch_stems;
use super::state::ServerState;
use crate::error::StemrhythmError;
use crate::pipeline::analyze;
use crate::types::{AnalysisResult, Segment, StemSet};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

/// Remote locations of one track's audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFeaturesRequest {
    pub mix_path: String,
    pub bass_path: String,
    pub drums_path: String,
    /// The `other` stem
    pub music_path: String,
    pub vocals_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeaturesResponse {
    pub bpm: f64,
    pub beats: Vec<f64>,
    pub beat_positions: Vec<u32>,
    pub downbeats: Vec<f64>,
    pub segments: Vec<Segment>,
}

impl From<AnalysisResult> for AudioFeaturesResponse {
    fn from(result: AnalysisResult) -> Self {
        Self {
            bpm: result.bpm,
            beats: result.beats,
            beat_positions: result.beat_positions,
            downbeats: result.downbeats,
            segments: result.segments,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Pipeline(StemrhythmError),
    Internal(String),
}

impl From<StemrhythmError> for ApiError {
    fn from(err: StemrhythmError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Pipeline(err @ StemrhythmError::DownloadError { .. }) => {
                (StatusCode::BAD_GATEWAY, err.to_string())
            }
            ApiError::Pipeline(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, message).into_response()
    }
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn get_audio_features(
    State(state): State<ServerState>,
    Json(request): Json<AudioFeaturesRequest>,
) -> Result<Json<AudioFeaturesResponse>, ApiError> {
    let start = Instant::now();
    let outcome = process(&state, request).await;
    let elapsed_ms = start.elapsed().as_millis();

    match &outcome {
        Ok(_) => info!("Processed audio features in {} ms", elapsed_ms),
        Err(e) => error!("Audio features request failed after {} ms: {:?}", elapsed_ms, e),
    }
    outcome.map(Json)
}

async fn process(
    state: &ServerState,
    request: AudioFeaturesRequest,
) -> Result<AudioFeaturesResponse, ApiError> {
    // Removed on drop, whichever way this returns
    let scratch = tempfile::Builder::new()
        .prefix("stems_demucs_")
        .tempdir_in(state.scratch_dir())
        .map_err(|e| StemrhythmError::output_error(state.scratch_dir(), e))?;

    fetch_stems(&state.http, &request, scratch.path()).await?;

    let stems = StemSet::from_dir(scratch.path());
    let settings = state.request_settings(scratch.path());
    let model = state.model.clone();

    let mut results = tokio::task::spawn_blocking(move || {
        let mut model = model.lock().map_err(|_| StemrhythmError::ModelUnavailable {
            reason: "model lock poisoned by an earlier request".to_string(),
        })?;
        analyze(&[stems], &mut **model, &settings)?.into_results()
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Analysis task failed: {}", e)))??;

    let result = results
        .pop()
        .ok_or_else(|| ApiError::Internal("Analysis produced no result".to_string()))?;
    Ok(result.into())
}
