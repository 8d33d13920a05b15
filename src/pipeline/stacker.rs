//! Stem stacking and spectrogram tensor persistence
//!
//! Tensors are stored as NumPy `.npy` files of shape (4, frames, 12).
//! Writes go to a temporary sibling first and are renamed into place, so a
//! cache file that exists is always complete.

use crate::analysis::spectrogram::NUM_BANDS;
use crate::error::{ErrorContext, Result, StemrhythmError};
use crate::types::{Instrument, Spectrogram, SpectrogramTensor};
use ndarray::{ArrayView2, Axis};
use ndarray_npy::{read_npy, WriteNpyExt};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Stack four per-stem spectrograms along a new leading instrument axis
///
/// Stems of different lengths are rejected rather than padded or truncated.
pub fn stack_spectrograms(source: &Path, spectrograms: &[Spectrogram]) -> Result<SpectrogramTensor> {
    if spectrograms.len() != Instrument::ALL.len() {
        return Err(StemrhythmError::ShapeMismatch {
            path: source.to_path_buf(),
            reason: format!(
                "expected {} stems, got {}",
                Instrument::ALL.len(),
                spectrograms.len()
            ),
        });
    }

    let reference = spectrograms[0].dim();
    if spectrograms.iter().any(|s| s.dim() != reference) {
        let shapes = Instrument::ALL
            .iter()
            .zip(spectrograms)
            .map(|(i, s)| format!("{} {:?}", i.name(), s.dim()))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(StemrhythmError::ShapeMismatch {
            path: source.to_path_buf(),
            reason: format!("stem spectrograms differ in shape: {}", shapes),
        });
    }

    let views: Vec<ArrayView2<f32>> = spectrograms.iter().map(|s| s.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|e| StemrhythmError::ShapeMismatch {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write a tensor to `path`, creating parent directories as needed
pub fn save_spectrogram(path: &Path, tensor: &SpectrogramTensor) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_spectrogram_context(path)?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", super::cache::SPECTROGRAM_EXTENSION));

    let written = File::create(&temp_path)
        .with_spectrogram_context(path)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            tensor.write_npy(&mut writer).with_spectrogram_context(path)?;
            writer.flush().with_spectrogram_context(path)
        })
        .and_then(|()| fs::rename(&temp_path, path).with_spectrogram_context(path));

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    } else {
        debug!("Saved spectrogram {:?} to {}", tensor.dim(), path.display());
    }
    written
}

/// Read a tensor back and check its layout
pub fn load_spectrogram(path: &Path) -> Result<SpectrogramTensor> {
    let tensor: SpectrogramTensor = read_npy(path).with_spectrogram_context(path)?;

    let (instruments, _, bands) = tensor.dim();
    if instruments != Instrument::ALL.len() || bands != NUM_BANDS {
        return Err(StemrhythmError::SpectrogramError {
            path: path.to_path_buf(),
            reason: format!(
                "expected shape (4, frames, {}), found {:?}",
                NUM_BANDS,
                tensor.dim()
            ),
        });
    }

    Ok(tensor)
}
