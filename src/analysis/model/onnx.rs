//! ONNX Runtime based rhythm model
//!
//! Each fold is a separate ORT session taking a (1, 4, frames, 12) spectrogram
//! and returning per-frame logits:
//! `logits_beat`, `logits_downbeat`, `logits_section` of shape (1, frames),
//! `logits_function` of shape (1, 10, frames) and, when exported,
//! `embeddings` of shape (1, 4, frames, dim).
//! Ensembles run every fold and average the logits before post-processing.

use super::postprocess::{postprocess, RawActivations, LABELS};
use super::registry::{find_model_path, model_file_name};
use crate::analysis::traits::{InferenceOptions, ModelOutput, RhythmModel};
use crate::config::Device;
use crate::error::{Result, StemrhythmError};
use crate::types::SpectrogramTensor;
use ndarray::{Array2, Array3, Axis};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::{debug, info};

const OUTPUT_BEAT: &str = "logits_beat";
const OUTPUT_DOWNBEAT: &str = "logits_downbeat";
const OUTPUT_SECTION: &str = "logits_section";
const OUTPUT_FUNCTION: &str = "logits_function";
const OUTPUT_EMBEDDINGS: &str = "embeddings";

/// One or more ORT sessions behind the `RhythmModel` interface
pub struct OrtRhythmModel {
    name: String,
    sessions: Vec<Session>,
    inference_mode: bool,
}

impl OrtRhythmModel {
    /// Load every fold of a pretrained model onto the given device
    pub fn load(name: &str, folds: &[String], device: Device) -> Result<Self> {
        let mut sessions = Vec::with_capacity(folds.len());
        for fold in folds {
            let path = find_model_path(&model_file_name(fold))?;
            debug!("Loading {} from {}", fold, path.display());
            sessions.push(Self::create_session(&path, device)?);
        }

        info!(
            "Model {} initialized with {} fold(s) on {:?}",
            name,
            sessions.len(),
            device
        );

        Ok(Self {
            name: name.to_string(),
            sessions,
            inference_mode: false,
        })
    }

    fn create_session(model_path: &Path, device: Device) -> Result<Session> {
        let builder = Session::builder().map_err(|e| StemrhythmError::ModelUnavailable {
            reason: format!("Failed to create ORT session builder: {}", e),
        })?;

        let builder = match device {
            Device::Cuda => builder.with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ]),
            Device::Cpu => {
                builder.with_execution_providers([CPUExecutionProvider::default().build()])
            }
        }
        .map_err(|e| StemrhythmError::ModelUnavailable {
            reason: format!("Failed to configure {:?} provider: {}", device, e),
        })?;

        builder
            .commit_from_file(model_path)
            .map_err(|e| StemrhythmError::ModelUnavailable {
                reason: format!("Failed to load model {}: {}", model_path.display(), e),
            })
    }

    fn run_fold(
        &self,
        session: &mut Session,
        spectrogram: &SpectrogramTensor,
        with_embeddings: bool,
    ) -> std::result::Result<RawActivations, String> {
        let num_frames = spectrogram.dim().1;
        let input = spectrogram.clone().insert_axis(Axis(0));
        let input_tensor =
            Tensor::from_array(input).map_err(|e| format!("Failed to create input tensor: {}", e))?;

        let input_name = session
            .inputs
            .first()
            .ok_or("Model has no input tensors defined")?
            .name
            .clone();

        let outputs = session
            .run(ort::inputs![input_name.as_str() => input_tensor])
            .map_err(|e| format!("Inference failed: {}", e))?;

        let extract = |name: &str| -> std::result::Result<(Vec<usize>, Vec<f32>), String> {
            let value = outputs
                .get(name)
                .ok_or_else(|| format!("Model output '{}' missing", name))?;
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| format!("Failed to extract '{}': {}", name, e))?;
            Ok((shape.iter().map(|&d| d as usize).collect(), data.to_vec()))
        };

        let frame_logits = |name: &str| -> std::result::Result<Vec<f32>, String> {
            let (shape, data) = extract(name)?;
            if data.len() != num_frames {
                return Err(format!(
                    "Expected {} frames in '{}', got shape {:?}",
                    num_frames, name, shape
                ));
            }
            Ok(data)
        };

        let beat = frame_logits(OUTPUT_BEAT)?;
        let downbeat = frame_logits(OUTPUT_DOWNBEAT)?;
        let section = frame_logits(OUTPUT_SECTION)?;

        let (shape, data) = extract(OUTPUT_FUNCTION)?;
        let function = Array2::from_shape_vec((LABELS.len(), num_frames), data).map_err(|_| {
            format!(
                "Expected ({}, {}) function logits, got shape {:?}",
                LABELS.len(),
                num_frames,
                shape
            )
        })?;

        let embeddings = if with_embeddings {
            let (shape, data) = extract(OUTPUT_EMBEDDINGS)?;
            let dims = match shape.as_slice() {
                [1, instruments, frames, dim] => (*instruments, *frames, *dim),
                _ => return Err(format!("Unexpected embedding shape {:?}", shape)),
            };
            Some(
                Array3::from_shape_vec(dims, data)
                    .map_err(|e| format!("Invalid embedding tensor: {}", e))?,
            )
        } else {
            None
        };

        Ok(RawActivations {
            beat,
            downbeat,
            section,
            function,
            embeddings,
        })
    }
}

impl RhythmModel for OrtRhythmModel {
    fn infer(
        &mut self,
        spectrogram: &SpectrogramTensor,
        options: &InferenceOptions,
    ) -> Result<ModelOutput> {
        if !self.inference_mode {
            debug!("{} called outside inference mode", self.name);
        }

        let mut sessions = std::mem::take(&mut self.sessions);
        let folds: std::result::Result<Vec<RawActivations>, String> = sessions
            .iter_mut()
            .map(|session| self.run_fold(session, spectrogram, options.include_embeddings))
            .collect();
        self.sessions = sessions;

        let folds = folds.map_err(|reason| StemrhythmError::inference_error(&self.name, reason))?;
        let raw = RawActivations::mean(&folds).ok_or_else(|| {
            StemrhythmError::inference_error(&self.name, "Model has no loaded folds")
        })?;

        Ok(postprocess(raw, options))
    }

    fn set_inference_mode(&mut self, enabled: bool) {
        self.inference_mode = enabled;
    }

    fn name(&self) -> &str {
        &self.name
    }
}
