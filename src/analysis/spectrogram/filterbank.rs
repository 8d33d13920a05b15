//! Logarithmically spaced triangular filterbank
//!
//! Corner frequencies are geometrically spaced between `fmin` and `fmax`
//! (clamped to Nyquist) and snapped to the nearest FFT bin. Band `b` rises from
//! corner `b` to corner `b + 1` and falls to corner `b + 2`.

use super::stft::ShortTimeFourierTransform;
use ndarray::Array2;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Number of frequency bands
pub const NUM_BANDS: usize = 12;

/// Lowest corner frequency in Hz
pub const FMIN: f32 = 30.0;

/// Highest corner frequency in Hz
pub const FMAX: f32 = 17000.0;

/// Filterbank matrix mapping FFT bins to bands: [bins][bands]
#[derive(Debug, Clone)]
pub struct LogarithmicFilterbank {
    pub matrix: Array2<f32>,
    pub sample_rate: u32,
}

impl LogarithmicFilterbank {
    pub fn new(
        num_fft_bins: usize,
        sample_rate: u32,
        num_bands: usize,
        fmin: f32,
        fmax: f32,
        norm_filters: bool,
    ) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let fmax = fmax.min(nyquist);
        let fmin = fmin.min(fmax);
        let resolution = nyquist / num_fft_bins.max(1) as f32;

        let corners = geometric_space(fmin, fmax, num_bands + 2);
        let last_bin = num_fft_bins.saturating_sub(1);
        let bins: Vec<usize> = corners
            .iter()
            .map(|&f| ((f / resolution).round() as usize).min(last_bin))
            .collect();

        let mut matrix = Array2::<f32>::zeros((num_fft_bins, num_bands));
        for band in 0..num_bands {
            let (start, center, stop) = (bins[band], bins[band + 1], bins[band + 2]);
            let mut column = matrix.column_mut(band);

            for bin in start..=stop {
                column[bin] = if bin < center {
                    (bin - start) as f32 / (center - start) as f32
                } else if bin == center {
                    1.0
                } else {
                    (stop - bin) as f32 / (stop - center) as f32
                };
            }

            if norm_filters {
                let sum: f32 = column.sum();
                if sum > 0.0 {
                    column.mapv_inplace(|w| w / sum);
                }
            }
        }

        Self {
            matrix,
            sample_rate,
        }
    }

    pub fn num_bins(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn num_bands(&self) -> usize {
        self.matrix.ncols()
    }
}

fn geometric_space(start: f32, stop: f32, num: usize) -> Vec<f32> {
    if num < 2 {
        return vec![start; num];
    }
    let (log_start, log_stop) = ((start as f64).ln(), (stop as f64).ln());
    let step = (log_stop - log_start) / (num - 1) as f64;
    (0..num)
        .map(|i| (log_start + step * i as f64).exp() as f32)
        .collect()
}

/// Projects magnitude spectra onto the filterbank
///
/// The filterbank depends on the sample rate and bin count, so the last one
/// built is cached and reused while those stay the same.
pub struct FilteredSpectrogramProcessor {
    pub num_bands: usize,
    pub fmin: f32,
    pub fmax: f32,
    pub norm_filters: bool,
    cache: RwLock<Option<Arc<LogarithmicFilterbank>>>,
}

impl FilteredSpectrogramProcessor {
    pub fn new(num_bands: usize, fmin: f32, fmax: f32, norm_filters: bool) -> Self {
        Self {
            num_bands,
            fmin,
            fmax,
            norm_filters,
            cache: RwLock::new(None),
        }
    }

    /// Filterbank for the given spectrum layout
    pub fn filterbank(&self, num_fft_bins: usize, sample_rate: u32) -> Arc<LogarithmicFilterbank> {
        if let Some(fb) = self.cache.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            if fb.sample_rate == sample_rate && fb.num_bins() == num_fft_bins {
                return Arc::clone(fb);
            }
        }

        debug!(
            "Building {}-band filterbank for {} bins at {}Hz",
            self.num_bands, num_fft_bins, sample_rate
        );
        let fb = Arc::new(LogarithmicFilterbank::new(
            num_fft_bins,
            sample_rate,
            self.num_bands,
            self.fmin,
            self.fmax,
            self.norm_filters,
        ));
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&fb));
        fb
    }

    /// Filtered magnitude spectrogram: [frames][bands]
    pub fn process(&self, stft: &ShortTimeFourierTransform) -> Array2<f32> {
        let filterbank = self.filterbank(stft.num_bins(), stft.sample_rate);
        stft.magnitude().dot(&filterbank.matrix)
    }
}

impl Default for FilteredSpectrogramProcessor {
    fn default() -> Self {
        Self::new(NUM_BANDS, FMIN, FMAX, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filterbank_shape() {
        let fb = LogarithmicFilterbank::new(1024, 44100, NUM_BANDS, FMIN, FMAX, true);
        assert_eq!(fb.matrix.dim(), (1024, 12));
    }

    #[test]
    fn test_normalized_filters_sum_to_one() {
        let fb = LogarithmicFilterbank::new(1024, 44100, NUM_BANDS, FMIN, FMAX, true);
        for column in fb.matrix.columns() {
            assert!((column.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_bands_ascend_in_frequency() {
        let fb = LogarithmicFilterbank::new(1024, 44100, NUM_BANDS, FMIN, FMAX, false);
        let peaks: Vec<usize> = fb
            .matrix
            .columns()
            .into_iter()
            .map(|c| {
                c.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i)
                    .unwrap()
            })
            .collect();
        assert!(peaks.windows(2).all(|w| w[0] < w[1]), "peaks {:?}", peaks);
        // Nothing below 30Hz or above 17kHz contributes
        let resolution = 44100.0 / 2048.0;
        let top_bin = (FMAX / resolution).round() as usize;
        assert!(fb.matrix.row(0).iter().all(|&w| w == 0.0));
        assert!(fb.matrix.row(top_bin + 1).iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_low_sample_rate_clamps_to_nyquist() {
        let fb = LogarithmicFilterbank::new(1024, 16000, NUM_BANDS, FMIN, FMAX, true);
        assert_eq!(fb.num_bands(), NUM_BANDS);
        for column in fb.matrix.columns() {
            assert!(column.sum() > 0.0);
        }
    }

    #[test]
    fn test_filterbank_cached_per_sample_rate() {
        let processor = FilteredSpectrogramProcessor::default();
        let a = processor.filterbank(1024, 44100);
        let b = processor.filterbank(1024, 44100);
        assert!(Arc::ptr_eq(&a, &b));
        let c = processor.filterbank(1024, 48000);
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
