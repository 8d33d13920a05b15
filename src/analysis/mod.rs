//! Audio analysis modules
//!
//! `spectrogram` turns decoded stems into model input; `model` holds the
//! pretrained rhythm models behind the `RhythmModel` trait.

pub mod model;
pub mod spectrogram;
pub mod traits;

pub use spectrogram::SpectrogramProcessor;
pub use traits::{InferenceOptions, ModelOutput, RhythmModel};
