//! Spectrogram extraction chain
//!
//! Every stem goes through the same four stages:
//! framing (2048 samples at 100 fps) -> STFT -> 12-band log filterbank
//! (30Hz-17kHz, normalized filters) -> `log10(1 * x + 1)`.
//!
//! The chain is built once per extraction batch and shared read-only by all
//! workers. Output for a given signal is deterministic, which the on-disk
//! cache relies on.

pub mod filterbank;
pub mod framing;
pub mod stft;

use crate::types::{AudioBuffer, Spectrogram};
use filterbank::FilteredSpectrogramProcessor;
use framing::FramedSignalProcessor;
use stft::ShortTimeFourierTransformProcessor;

pub use filterbank::NUM_BANDS;
pub use framing::{FPS, FRAME_SIZE};

/// Logarithmic magnitude compression: `log10(mul * x + add)`
#[derive(Debug, Clone, Copy)]
pub struct LogarithmicSpectrogramProcessor {
    pub mul: f32,
    pub add: f32,
}

impl LogarithmicSpectrogramProcessor {
    pub fn new(mul: f32, add: f32) -> Self {
        Self { mul, add }
    }

    pub fn process(&self, mut spec: Spectrogram) -> Spectrogram {
        let (mul, add) = (self.mul, self.add);
        spec.mapv_inplace(|x| (mul * x + add).log10());
        spec
    }
}

impl Default for LogarithmicSpectrogramProcessor {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// The full framing -> STFT -> filterbank -> log chain
#[derive(Default)]
pub struct SpectrogramProcessor {
    pub frames: FramedSignalProcessor,
    pub stft: ShortTimeFourierTransformProcessor,
    pub filt: FilteredSpectrogramProcessor,
    pub spec: LogarithmicSpectrogramProcessor,
}

impl SpectrogramProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform one decoded stem into a (frames x bands) log spectrogram
    pub fn process(&self, buffer: &AudioBuffer) -> Spectrogram {
        let framed = self.frames.process(buffer);
        let stft = self.stft.process(&framed);
        let filtered = self.filt.process(&stft);
        self.spec.process(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, amplitude: f32, seconds: f32, sample_rate: u32) -> AudioBuffer {
        let n = (seconds * sample_rate as f32) as usize;
        let samples = (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        AudioBuffer::new(samples, sample_rate)
    }

    #[test]
    fn test_log_compression() {
        let spec = Spectrogram::from_shape_vec((1, 3), vec![0.0, 9.0, 99.0]).unwrap();
        let out = LogarithmicSpectrogramProcessor::default().process(spec);
        assert!((out[[0, 0]] - 0.0).abs() < 1e-6);
        assert!((out[[0, 1]] - 1.0).abs() < 1e-6);
        assert!((out[[0, 2]] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_output_shape() {
        let buffer = sine(440.0, 0.5, 2.0, 44100);
        let spec = SpectrogramProcessor::new().process(&buffer);
        assert_eq!(spec.dim(), (200, NUM_BANDS));
        assert!(spec.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_silence_is_zero() {
        let buffer = AudioBuffer::new(vec![0.0; 4410], 44100);
        let spec = SpectrogramProcessor::new().process(&buffer);
        assert_eq!(spec.dim(), (10, NUM_BANDS));
        assert!(spec.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_deterministic() {
        let buffer = sine(220.0, 0.3, 1.0, 44100);
        let processor = SpectrogramProcessor::new();
        assert_eq!(processor.process(&buffer), processor.process(&buffer));
    }

    #[test]
    fn test_energy_lands_in_matching_band() {
        let processor = SpectrogramProcessor::new();
        let low = processor.process(&sine(60.0, 0.5, 1.0, 44100));
        let high = processor.process(&sine(5000.0, 0.5, 1.0, 44100));

        let loudest_band = |spec: &Spectrogram| {
            spec.row(50)
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap()
        };
        assert!(loudest_band(&low) < 3);
        assert!(loudest_band(&high) > 8);
    }
}
