//! Spectrogram extraction and inference pipeline
//!
//! Stem sets flow through: cache resolution -> stem loading -> spectrogram
//! extraction -> stacking -> inference -> cleanup.

pub mod cache;
pub mod extract;
pub mod loader;
pub mod orchestrator;
pub mod stacker;

pub use cache::{resolve, spectrogram_path, CachePlan, ExtractionJob};
pub use extract::{extract_spectrograms, ExtractionFailure, ExtractionReport};
pub use loader::load_stems;
pub use orchestrator::{analyze, InferenceMode, PipelineResult, TrackOutcome, TrackStage, TrackState};
pub use stacker::{load_spectrogram, save_spectrogram, stack_spectrograms};

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar in the house style, or `None` when progress is disabled
pub(crate) fn progress_bar(len: usize, show: bool) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    Some(pb)
}
