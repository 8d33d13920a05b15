//! STFT (Short-Time Fourier Transform) over framed signals
//!
//! Each frame is multiplied by a symmetric Hann window and transformed with an
//! FFT of the frame size. Only the first `frame_size / 2` bins are kept.
//!
//! The window and FFT plan are cached inside the processor and rebuilt only
//! when a signal with a different frame size comes through. The cache is
//! behind a lock so one processor can be shared by every extraction worker.

use super::framing::FramedSignal;
use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Complex spectrogram of one signal: [frames][bins]
#[derive(Debug, Clone)]
pub struct ShortTimeFourierTransform {
    pub data: Array2<Complex<f32>>,
    pub sample_rate: u32,
    pub frame_size: usize,
}

impl ShortTimeFourierTransform {
    /// Number of frequency bins per frame
    pub fn num_bins(&self) -> usize {
        self.data.ncols()
    }

    /// Magnitude spectrogram
    pub fn magnitude(&self) -> Array2<f32> {
        self.data.mapv(|c| c.norm())
    }
}

struct WindowPlan {
    frame_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl WindowPlan {
    fn new(frame_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            frame_size,
            window: hann_window(frame_size),
            fft: planner.plan_fft_forward(frame_size),
        }
    }
}

/// Windowed FFT over every frame, with a cached window
pub struct ShortTimeFourierTransformProcessor {
    cache: RwLock<Option<Arc<WindowPlan>>>,
}

impl ShortTimeFourierTransformProcessor {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(None),
        }
    }

    fn plan(&self, frame_size: usize) -> Arc<WindowPlan> {
        if let Some(plan) = self.cache.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            if plan.frame_size == frame_size {
                return Arc::clone(plan);
            }
        }

        debug!("Building STFT window for frame size {}", frame_size);
        let plan = Arc::new(WindowPlan::new(frame_size));
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&plan));
        plan
    }

    /// Compute the complex spectrogram of a framed signal
    pub fn process(&self, frames: &FramedSignal<'_>) -> ShortTimeFourierTransform {
        let frame_size = frames.frame_size;
        let num_bins = frame_size / 2;
        let plan = self.plan(frame_size);

        let mut data = Array2::<Complex<f32>>::zeros((frames.num_frames, num_bins));
        let mut samples = vec![0.0f32; frame_size];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); frame_size];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); plan.fft.get_inplace_scratch_len()];

        for (index, mut row) in data.outer_iter_mut().enumerate() {
            frames.copy_frame(index, &mut samples);

            for ((slot, &sample), &w) in buffer.iter_mut().zip(&samples).zip(&plan.window) {
                *slot = Complex::new(sample * w, 0.0);
            }

            plan.fft.process_with_scratch(&mut buffer, &mut scratch);

            for (dst, src) in row.iter_mut().zip(&buffer[..num_bins]) {
                *dst = *src;
            }
        }

        ShortTimeFourierTransform {
            data,
            sample_rate: frames.sample_rate,
            frame_size,
        }
    }
}

impl Default for ShortTimeFourierTransformProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Symmetric Hann window of given size
fn hann_window(size: usize) -> Vec<f32> {
    use std::f64::consts::PI;
    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / denom).cos()) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::framing::FramedSignalProcessor;
    use super::*;
    use crate::types::AudioBuffer;

    #[test]
    fn test_hann_window_symmetric() {
        let window = hann_window(5);
        assert_eq!(window.len(), 5);
        assert!(window[0].abs() < 1e-6);
        assert!(window[4].abs() < 1e-6);
        assert!((window[2] - 1.0).abs() < 1e-6);
        assert!((window[1] - window[3]).abs() < 1e-6);
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        use std::f32::consts::PI;
        let sample_rate = 44100;
        // Centre of bin 100
        let freq = 100.0 * sample_rate as f32 / 2048.0;
        let samples: Vec<f32> = (0..sample_rate)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        let buffer = AudioBuffer::new(samples, sample_rate as u32);
        let frames = FramedSignalProcessor::default().process(&buffer);

        let stft = ShortTimeFourierTransformProcessor::new().process(&frames);
        assert_eq!(stft.data.dim(), (100, 1024));

        let magnitude = stft.magnitude();
        let row = magnitude.row(50);
        let peak = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 100);
    }

    #[test]
    fn test_window_cached_per_frame_size() {
        let processor = ShortTimeFourierTransformProcessor::new();
        let first = processor.plan(2048);
        let second = processor.plan(2048);
        assert!(Arc::ptr_eq(&first, &second));

        let other = processor.plan(1024);
        assert_eq!(other.window.len(), 1024);
        assert!(!Arc::ptr_eq(&first, &other));
    }
}
