//! Pretrained rhythm models
//!
//! - `registry`: model names and weight file lookup
//! - `postprocess`: logits to beats, downbeats, tempo and segments
//! - `onnx`: ONNX Runtime backend (requires the `onnx` feature)

#[cfg(feature = "onnx")]
pub mod onnx;
pub mod postprocess;
pub mod registry;

use crate::analysis::traits::RhythmModel;
use crate::config::Device;
use crate::error::Result;
#[cfg(not(feature = "onnx"))]
use crate::error::StemrhythmError;

pub use registry::{available_models, find_model_path, resolve_folds};

/// Load a pretrained model by registry name
///
/// Unknown names fail before any weight file is touched.
pub fn load_pretrained_model(name: &str, device: Device) -> Result<Box<dyn RhythmModel>> {
    let folds = resolve_folds(name)?;

    #[cfg(feature = "onnx")]
    {
        let model = onnx::OrtRhythmModel::load(name, &folds, device)?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = (folds, device);
        Err(StemrhythmError::model_feature_disabled())
    }
}
