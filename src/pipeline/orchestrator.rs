//! Pipeline orchestration
//!
//! Coordinates result reuse, spectrogram extraction, sequential inference,
//! result export and byproduct cleanup for one batch of stem sets.

use super::extract::extract_spectrograms;
use super::progress_bar;
use super::stacker::load_spectrogram;
use crate::analysis::traits::{InferenceOptions, RhythmModel};
use crate::config::Settings;
use crate::discovery::cache_key;
use crate::error::{Result, StemrhythmError};
use crate::export;
use crate::types::{AnalysisResult, StemSet};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-track lifecycle; tracks only ever move one stage forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrackStage {
    Pending,
    SpectrogramCached,
    InferenceComplete,
    SpectrogramDeleted,
}

impl TrackStage {
    pub fn name(self) -> &'static str {
        match self {
            TrackStage::Pending => "pending",
            TrackStage::SpectrogramCached => "spectrogram-cached",
            TrackStage::InferenceComplete => "inference-complete",
            TrackStage::SpectrogramDeleted => "spectrogram-deleted",
        }
    }

    fn next(self) -> Option<TrackStage> {
        match self {
            TrackStage::Pending => Some(TrackStage::SpectrogramCached),
            TrackStage::SpectrogramCached => Some(TrackStage::InferenceComplete),
            TrackStage::InferenceComplete => Some(TrackStage::SpectrogramDeleted),
            TrackStage::SpectrogramDeleted => None,
        }
    }
}

/// Where one track is in the pipeline
#[derive(Debug, Clone)]
pub struct TrackState {
    pub source: PathBuf,
    pub spectrogram: PathBuf,
    stage: TrackStage,
}

impl TrackState {
    pub fn new(source: PathBuf, spectrogram: PathBuf) -> Self {
        Self {
            source,
            spectrogram,
            stage: TrackStage::Pending,
        }
    }

    pub fn stage(&self) -> TrackStage {
        self.stage
    }

    /// Move to the next stage; skipping or going back is an error
    pub fn advance(&mut self, to: TrackStage) -> Result<()> {
        if self.stage.next() != Some(to) {
            return Err(StemrhythmError::InvalidTransition {
                path: self.source.clone(),
                from: self.stage.name(),
                to: to.name(),
            });
        }
        self.stage = to;
        Ok(())
    }
}

/// Holds a model in inference mode; leaves it when dropped
pub struct InferenceMode<'a> {
    model: &'a mut dyn RhythmModel,
}

impl<'a> InferenceMode<'a> {
    pub fn enter(model: &'a mut dyn RhythmModel) -> Self {
        debug!("Entering inference mode for {}", model.name());
        model.set_inference_mode(true);
        Self { model }
    }
}

impl<'a> Deref for InferenceMode<'a> {
    type Target = dyn RhythmModel + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.model
    }
}

impl<'a> DerefMut for InferenceMode<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.model
    }
}

impl Drop for InferenceMode<'_> {
    fn drop(&mut self) {
        self.model.set_inference_mode(false);
        debug!("Left inference mode for {}", self.model.name());
    }
}

/// Result of one input stem set
#[derive(Debug)]
pub struct TrackOutcome {
    /// Stem-set directory
    pub source: PathBuf,
    pub result: Result<AnalysisResult>,
}

/// Pipeline result summary
#[derive(Debug)]
pub struct PipelineResult {
    pub total_tracks: usize,
    /// Tracks analyzed by this call
    pub successful: usize,
    pub failed: usize,
    /// Tracks whose saved result was reused
    pub skipped: usize,
    /// One outcome per input, in input order
    pub tracks: Vec<TrackOutcome>,
}

impl PipelineResult {
    /// All results, or the first error in input order
    pub fn into_results(self) -> Result<Vec<AnalysisResult>> {
        self.tracks.into_iter().map(|t| t.result).collect()
    }
}

/// Analyze a batch of stem sets with the given model
///
/// Spectrograms are extracted first (possibly in parallel), then inference
/// runs on one track at a time. A failing track does not stop the others.
/// Unless `keep_byproducts` is set, every spectrogram of the batch is deleted
/// afterwards and `spec_dir` is removed if that leaves it empty.
pub fn analyze(
    stem_sets: &[StemSet],
    model: &mut dyn RhythmModel,
    settings: &Settings,
) -> Result<PipelineResult> {
    let pipeline_start = Instant::now();
    let options = InferenceOptions {
        include_activations: settings.include_activations,
        include_embeddings: settings.include_embeddings,
    };

    if let Some(out_dir) = &settings.out_dir {
        fs::create_dir_all(out_dir).map_err(|e| StemrhythmError::output_error(out_dir, e))?;
    }

    let mut outcomes: Vec<Option<Result<AnalysisResult>>> =
        stem_sets.iter().map(|_| None).collect();

    // Phase 1: reuse saved results
    let mut pending: Vec<usize> = Vec::new();
    for (index, stems) in stem_sets.iter().enumerate() {
        match existing_result(stems, settings) {
            Some(result) => outcomes[index] = Some(Ok(result)),
            None => pending.push(index),
        }
    }
    let skipped = stem_sets.len() - pending.len();
    if skipped > 0 {
        info!(
            "Skipping {} already-analyzed tracks (use --overwrite to re-analyze)",
            skipped
        );
    }

    if !pending.is_empty() {
        let pending_sets: Vec<StemSet> = pending.iter().map(|&i| stem_sets[i].clone()).collect();
        let results = run_pending(&pending_sets, model, settings, &options)?;
        for (index, result) in pending.into_iter().zip(results) {
            outcomes[index] = Some(result);
        }
    }

    let tracks: Vec<TrackOutcome> = stem_sets
        .iter()
        .zip(outcomes)
        .map(|(stems, outcome)| TrackOutcome {
            source: stems.dir.clone(),
            result: outcome.unwrap_or_else(|| {
                Err(StemrhythmError::inference_error(&stems.dir, "Track was never scheduled"))
            }),
        })
        .collect();

    let failed = tracks.iter().filter(|t| t.result.is_err()).count();
    let result = PipelineResult {
        total_tracks: stem_sets.len(),
        successful: stem_sets.len() - failed - skipped,
        failed,
        skipped,
        tracks,
    };

    info!(
        "Total pipeline time: {:.2}s ({} analyzed, {} failed, {} skipped)",
        pipeline_start.elapsed().as_secs_f64(),
        result.successful,
        result.failed,
        result.skipped
    );

    Ok(result)
}

/// Saved result for a stem set, when reuse is allowed and the file is readable
fn existing_result(stems: &StemSet, settings: &Settings) -> Option<AnalysisResult> {
    if settings.overwrite {
        return None;
    }
    let out_dir = settings.out_dir.as_ref()?;
    let path = export::result_path(out_dir, &cache_key(stems, settings.cache_key));
    if !path.exists() {
        return None;
    }

    match export::read_result(&path) {
        Ok(result) => {
            debug!("Skipping {} (already analyzed)", stems.dir.display());
            Some(result)
        }
        Err(e) => {
            warn!("Ignoring unreadable result {}: {}", path.display(), e);
            None
        }
    }
}

/// Extract, infer and clean up the tracks that need analysis
fn run_pending(
    stem_sets: &[StemSet],
    model: &mut dyn RhythmModel,
    settings: &Settings,
    options: &InferenceOptions,
) -> Result<Vec<Result<AnalysisResult>>> {
    fs::create_dir_all(&settings.spec_dir)
        .map_err(|e| StemrhythmError::output_error(&settings.spec_dir, e))?;

    // Phase 2: spectrograms
    let extract_start = Instant::now();
    let report = extract_spectrograms(stem_sets, &settings.spec_dir, settings)?;
    info!(
        "Spectrogram stage completed in {:.2}s ({} cached, {} extracted)",
        extract_start.elapsed().as_secs_f64(),
        report.cached,
        report.extracted
    );

    let mut failures: HashMap<PathBuf, StemrhythmError> = report
        .failures
        .into_iter()
        .map(|f| (f.source, f.error))
        .collect();

    let mut states: Vec<TrackState> = stem_sets
        .iter()
        .zip(report.destinations)
        .map(|(stems, destination)| TrackState::new(stems.dir.clone(), destination))
        .collect();

    let mut results: Vec<Option<Result<AnalysisResult>>> = Vec::with_capacity(states.len());
    for state in &mut states {
        let outcome = match failures.remove(&state.source) {
            Some(error) => Err(error),
            None if !state.spectrogram.exists() => Err(StemrhythmError::SpectrogramError {
                path: state.spectrogram.clone(),
                reason: "spectrogram was not extracted".to_string(),
            }),
            None => state.advance(TrackStage::SpectrogramCached),
        };
        results.push(outcome.err().map(Err));
    }

    // Phase 3: inference, one track at a time
    let inference_start = Instant::now();
    let mut aborted: Option<StemrhythmError> = None;
    {
        let mut model = InferenceMode::enter(model);
        let pb = progress_bar(states.len(), settings.show_progress);

        for (state, slot) in states.iter_mut().zip(results.iter_mut()) {
            if slot.is_none() {
                let outcome = infer_track(&mut *model, state, options);
                if let Err(ref e) = outcome {
                    error!("Failed {}: {}", state.source.display(), e);
                }
                let saved = match (&outcome, &settings.out_dir) {
                    (Ok(result), Some(out_dir)) => {
                        save_result(result, out_dir, stem_sets, state, settings, model.name())
                    }
                    _ => Ok(()),
                };
                *slot = Some(outcome);

                // Result writes are fatal; stop inferring but still clean up below
                if let Err(e) = saved {
                    error!("Aborting batch: {}", e);
                    aborted = Some(e);
                    break;
                }
            }
            if let Some(ref pb) = pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = pb {
            pb.finish_with_message("Inference complete");
        }
    }
    info!(
        "Inference completed in {:.2}s",
        inference_start.elapsed().as_secs_f64()
    );

    // Phase 4: cleanup
    if settings.keep_byproducts {
        debug!("Keeping spectrograms in {}", settings.spec_dir.display());
    } else {
        remove_spectrograms(&mut states);
        rmdir_if_empty(&settings.spec_dir);
    }

    if let Some(e) = aborted {
        return Err(e);
    }

    Ok(results
        .into_iter()
        .zip(&states)
        .map(|(r, state)| {
            r.unwrap_or_else(|| {
                Err(StemrhythmError::inference_error(&state.source, "Inference did not run"))
            })
        })
        .collect())
}

fn infer_track(
    model: &mut dyn RhythmModel,
    state: &mut TrackState,
    options: &InferenceOptions,
) -> Result<AnalysisResult> {
    let tensor = load_spectrogram(&state.spectrogram)?;
    debug!(
        "Running {} on {} ({} frames)",
        model.name(),
        state.source.display(),
        tensor.dim().1
    );

    let output = model.infer(&tensor, options).map_err(|e| match e {
        StemrhythmError::InferenceError { reason, .. } => {
            StemrhythmError::inference_error(&state.source, reason)
        }
        other => StemrhythmError::inference_error(&state.source, other.to_string()),
    })?;

    state.advance(TrackStage::InferenceComplete)?;
    Ok(output.into_result(state.source.clone(), options))
}

fn save_result(
    result: &AnalysisResult,
    out_dir: &Path,
    stem_sets: &[StemSet],
    state: &TrackState,
    settings: &Settings,
    model_name: &str,
) -> Result<()> {
    let key = stem_sets
        .iter()
        .find(|s| s.dir == state.source)
        .map(|s| cache_key(s, settings.cache_key))
        .unwrap_or_else(|| StemSet::from_dir(&state.source).identity());
    export::write_result(result, model_name, &export::result_path(out_dir, &key))
}

/// Delete every spectrogram of the batch; files already gone are fine
fn remove_spectrograms(states: &mut [TrackState]) {
    let mut removed: HashSet<PathBuf> = HashSet::new();

    for state in states.iter_mut() {
        if removed.insert(state.spectrogram.clone()) {
            match fs::remove_file(&state.spectrogram) {
                Ok(()) => debug!("Removed {}", state.spectrogram.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", state.spectrogram.display(), e),
            }
        }

        if state.stage() == TrackStage::InferenceComplete {
            if let Err(e) = state.advance(TrackStage::SpectrogramDeleted) {
                warn!("{}", e);
            }
        }
    }
}

/// Remove a directory only when nothing is left in it; failures are ignored
fn rmdir_if_empty(dir: &Path) {
    let is_empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);

    if is_empty {
        match fs::remove_dir(dir) {
            Ok(()) => debug!("Removed empty spectrogram directory {}", dir.display()),
            Err(e) => debug!("Could not remove {}: {}", dir.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::traits::ModelOutput;
    use crate::types::SpectrogramTensor;
    use tempfile::TempDir;

    struct ModeProbe {
        active: bool,
        seen_active: bool,
    }

    impl RhythmModel for ModeProbe {
        fn infer(&mut self, _: &SpectrogramTensor, _: &InferenceOptions) -> Result<ModelOutput> {
            self.seen_active = self.active;
            Ok(ModelOutput::default())
        }

        fn set_inference_mode(&mut self, enabled: bool) {
            self.active = enabled;
        }

        fn name(&self) -> &str {
            "probe"
        }
    }

    #[test]
    fn test_track_stage_moves_forward_only() {
        let mut state = TrackState::new(PathBuf::from("song"), PathBuf::from("song.npy"));
        assert!(state.advance(TrackStage::InferenceComplete).is_err());
        state.advance(TrackStage::SpectrogramCached).unwrap();
        state.advance(TrackStage::InferenceComplete).unwrap();
        assert!(state.advance(TrackStage::SpectrogramCached).is_err());
        state.advance(TrackStage::SpectrogramDeleted).unwrap();
        assert!(matches!(
            state.advance(TrackStage::SpectrogramDeleted),
            Err(StemrhythmError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_inference_mode_guard_resets() {
        let mut probe = ModeProbe {
            active: false,
            seen_active: false,
        };
        {
            let mut guard = InferenceMode::enter(&mut probe);
            guard
                .infer(&SpectrogramTensor::zeros((4, 1, 12)), &InferenceOptions::default())
                .unwrap();
        }
        assert!(probe.seen_active);
        assert!(!probe.active);
    }

    #[test]
    fn test_rmdir_if_empty() {
        let root = TempDir::new().unwrap();
        let empty = root.path().join("empty");
        let full = root.path().join("full");
        fs::create_dir(&empty).unwrap();
        fs::create_dir(&full).unwrap();
        fs::write(full.join("keep.npy"), b"x").unwrap();

        rmdir_if_empty(&empty);
        rmdir_if_empty(&full);
        rmdir_if_empty(&root.path().join("missing"));

        assert!(!empty.exists());
        assert!(full.exists());
    }

    #[test]
    fn test_empty_batch() {
        let spec = TempDir::new().unwrap();
        let settings = Settings {
            spec_dir: spec.path().join("spec"),
            show_progress: false,
            ..Default::default()
        };
        let mut probe = ModeProbe {
            active: false,
            seen_active: false,
        };
        let result = analyze(&[], &mut probe, &settings).unwrap();
        assert_eq!(result.total_tracks, 0);
        assert!(result.into_results().unwrap().is_empty());
    }
}
