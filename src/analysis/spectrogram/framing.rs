//! Overlapping frame extraction
//!
//! Frames are centred on their reference sample: frame `i` covers
//! `[floor(i * hop) - frame_size / 2, floor(i * hop) + frame_size / 2)`,
//! with zeros wherever that window reaches past either end of the signal.

use crate::types::AudioBuffer;

/// Samples per analysis frame
pub const FRAME_SIZE: usize = 2048;

/// Frames per second (hop of 441 samples at 44.1kHz)
pub const FPS: f64 = 44100.0 / 441.0;

/// Splits a signal into overlapping fixed-size frames
#[derive(Debug, Clone)]
pub struct FramedSignalProcessor {
    pub frame_size: usize,
    pub fps: f64,
}

impl FramedSignalProcessor {
    pub fn new(frame_size: usize, fps: f64) -> Self {
        Self { frame_size, fps }
    }

    /// Frame a decoded signal; the hop follows from its sample rate
    pub fn process<'a>(&self, buffer: &'a AudioBuffer) -> FramedSignal<'a> {
        let hop_size = buffer.sample_rate as f64 / self.fps;
        let num_frames = if buffer.is_empty() || hop_size <= 0.0 {
            0
        } else {
            (buffer.len() as f64 / hop_size).ceil() as usize
        };

        FramedSignal {
            signal: &buffer.samples,
            sample_rate: buffer.sample_rate,
            frame_size: self.frame_size,
            hop_size,
            num_frames,
        }
    }
}

impl Default for FramedSignalProcessor {
    fn default() -> Self {
        Self::new(FRAME_SIZE, FPS)
    }
}

/// Borrowed view of a signal as a sequence of frames
#[derive(Debug, Clone, Copy)]
pub struct FramedSignal<'a> {
    signal: &'a [f32],
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: f64,
    pub num_frames: usize,
}

impl FramedSignal<'_> {
    /// Copy frame `index` into `out` (length `frame_size`), zero-padding outside the signal
    pub fn copy_frame(&self, index: usize, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.frame_size);
        out.fill(0.0);

        let reference = (index as f64 * self.hop_size).floor() as isize;
        let start = reference - (self.frame_size / 2) as isize;
        let end = start + self.frame_size as isize;

        let lo = start.max(0);
        let hi = end.min(self.signal.len() as isize);
        if lo < hi {
            let dst_lo = (lo - start) as usize;
            let dst_hi = (hi - start) as usize;
            out[dst_lo..dst_hi].copy_from_slice(&self.signal[lo as usize..hi as usize]);
        }
    }
}
