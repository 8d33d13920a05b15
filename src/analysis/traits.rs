//! Analysis trait abstractions
//!
//! The pipeline only talks to the rhythm model through `RhythmModel`, so the
//! ONNX backend can be swapped for a stub in tests or another runtime later.

use crate::error::Result;
use crate::types::{Activations, AnalysisResult, Segment, SpectrogramTensor};
use ndarray::Array3;
use std::path::PathBuf;

/// Optional outputs requested from one inference pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferenceOptions {
    pub include_activations: bool,
    pub include_embeddings: bool,
}

/// Everything a model predicts for one track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutput {
    pub bpm: f64,
    pub beats: Vec<f64>,
    pub downbeats: Vec<f64>,
    pub beat_positions: Vec<u32>,
    pub segments: Vec<Segment>,
    pub activations: Option<Activations>,
    pub embeddings: Option<Array3<f32>>,
}

impl ModelOutput {
    /// Attach the track identity, dropping optional fields that were not requested
    pub fn into_result(self, path: PathBuf, options: &InferenceOptions) -> AnalysisResult {
        AnalysisResult {
            path,
            bpm: self.bpm,
            beats: self.beats,
            downbeats: self.downbeats,
            beat_positions: self.beat_positions,
            segments: self.segments,
            activations: self.activations.filter(|_| options.include_activations),
            embeddings: self.embeddings.filter(|_| options.include_embeddings),
        }
    }
}

/// Beat, downbeat, tempo and structure predictor
///
/// Inference takes `&mut self`: a model owns a single compute device and the
/// pipeline calls it from one thread at a time.
pub trait RhythmModel: Send {
    /// Predict rhythm and structure from a (4, frames, 12) spectrogram tensor
    fn infer(
        &mut self,
        spectrogram: &SpectrogramTensor,
        options: &InferenceOptions,
    ) -> Result<ModelOutput>;

    /// Enter or leave inference-only mode (no training state is touched)
    fn set_inference_mode(&mut self, _enabled: bool) {}

    /// Name of this model (for logging)
    fn name(&self) -> &str;
}
