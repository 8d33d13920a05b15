//! stemrhythm - Tempo, beat and structure analysis from separated stems
//!
//! Takes the bass, drums, other and vocals stems of a track, turns each into a
//! 12-band log spectrogram, stacks them into one (4, frames, 12) tensor and
//! runs a pretrained model over it to get BPM, beats, downbeats, beat
//! positions and labelled segments.
//!
//! # Architecture
//!
//! - `config`: CLI argument parsing and runtime settings
//! - `discovery`: Stem-set scanning and cache keys
//! - `audio`: Audio decoding using symphonia
//! - `analysis`: Spectrogram chain and the rhythm model interface
//! - `pipeline`: Cache resolution, parallel extraction and inference orchestration
//! - `export`: Per-track JSON results
//! - `server`: HTTP endpoint over the pipeline
//!
//! # Example
//!
//! ```no_run
//! use stemrhythm::analysis::model::load_pretrained_model;
//! use stemrhythm::{config::Settings, pipeline, types::StemSet};
//!
//! let settings = Settings::default();
//! let mut model = load_pretrained_model(&settings.model, settings.device).expect("No model");
//! let stems = vec![StemSet::from_dir("./demix/htdemucs/song")];
//! let result = pipeline::analyze(&stems, model.as_mut(), &settings).expect("Analysis failed");
//! println!("Analyzed {} tracks", result.successful);
//! ```

pub mod analysis;
pub mod audio;
pub mod config;
pub mod discovery;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod server;
pub mod types;

// Re-export key types at crate root
pub use error::{Result, StemrhythmError};
pub use types::{AnalysisResult, AudioBuffer, Instrument, Segment, SpectrogramTensor, StemSet};
