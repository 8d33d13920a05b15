//! Spectrogram extraction scheduling
//!
//! Cache misses are decoded, transformed and stacked either on a rayon worker
//! pool built for this batch or one after another on the calling thread. Both
//! modes share one `SpectrogramProcessor` and write identical files.

use super::cache::{resolve, ExtractionJob};
use super::loader::load_stems;
use super::progress_bar;
use super::stacker::{save_spectrogram, stack_spectrograms};
use crate::analysis::spectrogram::SpectrogramProcessor;
use crate::config::Settings;
use crate::error::{Result, StemrhythmError};
use crate::types::{Spectrogram, StemSet};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A stem set whose spectrogram could not be produced
#[derive(Debug)]
pub struct ExtractionFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: StemrhythmError,
}

/// Summary of one extraction batch
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// One tensor path per input, in input order
    pub destinations: Vec<PathBuf>,
    /// Inputs that were already cached
    pub cached: usize,
    /// Tensors written by this batch
    pub extracted: usize,
    pub failures: Vec<ExtractionFailure>,
}

/// Make sure every stem set has a spectrogram tensor in `spec_dir`
pub fn extract_spectrograms(
    stem_sets: &[StemSet],
    spec_dir: &Path,
    settings: &Settings,
) -> Result<ExtractionReport> {
    let start = Instant::now();
    let plan = resolve(stem_sets, spec_dir, settings.cache_key);
    let cached = plan.cached();

    let outcomes = run_jobs(&plan.todo, settings)?;

    let mut report = ExtractionReport {
        destinations: plan.destinations,
        cached,
        ..Default::default()
    };

    for (job, outcome) in plan.todo.into_iter().zip(outcomes) {
        match outcome {
            Ok(()) => report.extracted += 1,
            Err(error) => {
                warn!("Failed to extract {}: {}", job.stems.dir.display(), error);
                report.failures.push(ExtractionFailure {
                    source: job.stems.dir,
                    destination: job.destination,
                    error,
                });
            }
        }
    }

    if report.extracted + report.failures.len() > 0 {
        info!(
            "Extracted {} spectrograms ({} failed) in {:.2}s",
            report.extracted,
            report.failures.len(),
            start.elapsed().as_secs_f64()
        );
    }

    Ok(report)
}

/// Run extraction jobs, returning one outcome per job in job order
///
/// Parallel runs use a pool sized by `settings.threads`; the pool is dropped
/// before this returns, whatever the outcomes.
pub fn run_jobs(jobs: &[ExtractionJob], settings: &Settings) -> Result<Vec<Result<()>>> {
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    let processor = SpectrogramProcessor::new();
    let pb = progress_bar(jobs.len(), settings.show_progress);

    let run = |job: &ExtractionJob| {
        let outcome = extract_one(&processor, job);
        if let Some(ref pb) = pb {
            pb.inc(1);
            pb.set_message(job.stems.identity());
        }
        outcome
    };

    let outcomes = if settings.multiprocess && jobs.len() > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.threads.max(1))
            .build()
            .map_err(|e| {
                StemrhythmError::ConfigError(format!("Failed to build extraction pool: {}", e))
            })?;
        debug!(
            "Extracting {} spectrograms on {} threads",
            jobs.len(),
            pool.current_num_threads()
        );
        pool.install(|| jobs.par_iter().map(run).collect::<Vec<_>>())
    } else {
        debug!("Extracting {} spectrograms sequentially", jobs.len());
        jobs.iter().map(run).collect()
    };

    if let Some(pb) = pb {
        pb.finish_with_message("Extraction complete");
    }

    Ok(outcomes)
}

/// Load, transform, stack and save one stem set
fn extract_one(processor: &SpectrogramProcessor, job: &ExtractionJob) -> Result<()> {
    let signals = load_stems(&job.stems)?;
    let spectrograms: Vec<Spectrogram> = signals.iter().map(|s| processor.process(s)).collect();
    let tensor = stack_spectrograms(&job.stems.dir, &spectrograms)?;
    save_spectrogram(&job.destination, &tensor)
}
