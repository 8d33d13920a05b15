//! Turns raw model logits into beats, downbeats, tempo and segments
//!
//! All activations run at 100 frames per second, one frame per spectrogram
//! frame.

use crate::analysis::spectrogram::FPS;
use crate::analysis::traits::{InferenceOptions, ModelOutput};
use crate::types::{Activations, Segment};
use ndarray::{Array2, Array3, Axis};

/// Structural function labels, in model output order
pub const LABELS: [&str; 10] = [
    "start", "end", "intro", "outro", "break", "bridge", "inst", "solo", "verse", "chorus",
];

/// Peak threshold for every activation
pub const PEAK_THRESHOLD: f32 = 0.5;

/// Minimum distance between two beats, in seconds
pub const MIN_BEAT_DISTANCE: f64 = 0.2;

/// Minimum distance between two section boundaries, in seconds
pub const MIN_SECTION_DISTANCE: f64 = 1.0;

/// Maximum offset between a beat and a downbeat peak for the beat to count as a downbeat
pub const DOWNBEAT_TOLERANCE: f64 = 0.07;

/// Bar length assumed when it cannot be measured
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// Raw per-frame model outputs (logits)
#[derive(Debug, Clone, PartialEq)]
pub struct RawActivations {
    pub beat: Vec<f32>,
    pub downbeat: Vec<f32>,
    pub section: Vec<f32>,
    /// (label, frame)
    pub function: Array2<f32>,
    /// (instrument, frame, dim)
    pub embeddings: Option<Array3<f32>>,
}

impl RawActivations {
    pub fn num_frames(&self) -> usize {
        self.beat.len()
    }

    /// Element-wise mean over several folds of the same track
    pub fn mean(folds: &[RawActivations]) -> Option<RawActivations> {
        let (first, rest) = folds.split_first()?;
        let mut acc = first.clone();
        for fold in rest {
            add_into(&mut acc.beat, &fold.beat);
            add_into(&mut acc.downbeat, &fold.downbeat);
            add_into(&mut acc.section, &fold.section);
            acc.function += &fold.function;
            acc.embeddings = match (acc.embeddings, &fold.embeddings) {
                (Some(a), Some(b)) if a.dim() == b.dim() => Some(a + b),
                _ => None,
            };
        }

        let n = folds.len() as f32;
        for v in [&mut acc.beat, &mut acc.downbeat, &mut acc.section] {
            v.iter_mut().for_each(|x| *x /= n);
        }
        acc.function.mapv_inplace(|x| x / n);
        if let Some(e) = acc.embeddings.as_mut() {
            e.mapv_inplace(|x| x / n);
        }
        Some(acc)
    }
}

fn add_into(acc: &mut [f32], other: &[f32]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a += b;
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax over the label axis of a (label, frame) matrix
fn softmax_labels(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();
    for mut column in probs.axis_iter_mut(Axis(1)) {
        let max = column.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        column.mapv_inplace(|x| (x - max).exp());
        let sum = column.sum();
        if sum > 0.0 {
            column.mapv_inplace(|x| x / sum);
        }
    }
    probs
}

/// Local maxima above `threshold`, at least `min_distance` frames apart
///
/// Stronger peaks win; the result is in frame order.
pub fn pick_peaks(activation: &[f32], threshold: f32, min_distance: usize) -> Vec<usize> {
    let n = activation.len();
    let mut candidates: Vec<usize> = (0..n)
        .filter(|&i| {
            let v = activation[i];
            v >= threshold
                && (i == 0 || v > activation[i - 1])
                && (i + 1 == n || v >= activation[i + 1])
        })
        .collect();

    candidates.sort_by(|&a, &b| activation[b].total_cmp(&activation[a]).then(a.cmp(&b)));

    let mut peaks: Vec<usize> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if peaks.iter().all(|&p| p.abs_diff(c) >= min_distance) {
            peaks.push(c);
        }
    }
    peaks.sort_unstable();
    peaks
}

fn frames_to_seconds(frames: &[usize]) -> Vec<f64> {
    frames.iter().map(|&f| f as f64 / FPS).collect()
}

/// Tempo from the median inter-beat interval, rounded to whole BPM
pub fn estimate_bpm(beats: &[f64]) -> f64 {
    if beats.len() < 2 {
        return 0.0;
    }
    let mut intervals: Vec<f64> = beats.windows(2).map(|w| w[1] - w[0]).collect();
    intervals.sort_by(|a, b| a.total_cmp(b));

    let mid = intervals.len() / 2;
    let median = if intervals.len() % 2 == 0 {
        (intervals[mid - 1] + intervals[mid]) / 2.0
    } else {
        intervals[mid]
    };

    if median > 0.0 {
        (60.0 / median).round()
    } else {
        0.0
    }
}

/// Position of every beat inside its bar, counting from 1 at each downbeat
pub fn beat_positions(beats: &[f64], downbeats: &[f64]) -> Vec<u32> {
    let is_downbeat: Vec<bool> = beats
        .iter()
        .map(|b| downbeats.iter().any(|d| (b - d).abs() < 1e-9))
        .collect();

    let downbeat_indices: Vec<usize> = is_downbeat
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| d.then_some(i))
        .collect();

    let Some(&first) = downbeat_indices.first() else {
        return (0..beats.len())
            .map(|i| (i as u32 % DEFAULT_BEATS_PER_BAR) + 1)
            .collect();
    };

    let bar_length = dominant_bar_length(&downbeat_indices);
    let mut positions = Vec::with_capacity(beats.len());

    for i in 0..first {
        let before = ((first - i) as u32) % bar_length;
        positions.push((bar_length - before) % bar_length + 1);
    }

    let mut count = 0;
    for &down in &is_downbeat[first..] {
        count = if down { 1 } else { count + 1 };
        positions.push(count);
    }
    positions
}

/// Most common number of beats between consecutive downbeats
fn dominant_bar_length(downbeat_indices: &[usize]) -> u32 {
    let mut counts: Vec<(u32, usize)> = Vec::new();
    for w in downbeat_indices.windows(2) {
        let len = (w[1] - w[0]) as u32;
        match counts.iter_mut().find(|(l, _)| *l == len) {
            Some((_, c)) => *c += 1,
            None => counts.push((len, 1)),
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(len, _)| len)
        .unwrap_or(DEFAULT_BEATS_PER_BAR)
}

fn argmax<'a>(values: impl Iterator<Item = &'a f32>) -> Option<usize> {
    values
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Split the track at section boundaries and label each part
pub fn segments(section_probs: &[f32], label_probs: &Array2<f32>) -> Vec<Segment> {
    let num_frames = section_probs.len();
    if num_frames == 0 {
        return Vec::new();
    }

    let min_distance = (MIN_SECTION_DISTANCE * FPS).round() as usize;
    let mut boundaries = vec![0];
    boundaries.extend(
        pick_peaks(section_probs, PEAK_THRESHOLD, min_distance)
            .into_iter()
            .filter(|&f| f > 0 && f < num_frames),
    );
    boundaries.push(num_frames);

    boundaries
        .windows(2)
        .map(|w| {
            let (start, end) = (w[0], w[1]);
            let mean = label_probs
                .slice(ndarray::s![.., start..end])
                .mean_axis(Axis(1));
            let label = mean
                .as_ref()
                .and_then(|m| argmax(m.iter()))
                .and_then(|i| LABELS.get(i))
                .copied()
                .unwrap_or("inst");
            Segment::new(start as f64 / FPS, end as f64 / FPS, label)
        })
        .collect()
}

/// Full post-processing from logits to model output
pub fn postprocess(raw: RawActivations, options: &InferenceOptions) -> ModelOutput {
    let beat: Vec<f32> = raw.beat.iter().map(|&x| sigmoid(x)).collect();
    let downbeat: Vec<f32> = raw.downbeat.iter().map(|&x| sigmoid(x)).collect();
    let section: Vec<f32> = raw.section.iter().map(|&x| sigmoid(x)).collect();
    let label = softmax_labels(&raw.function);

    let beat_distance = (MIN_BEAT_DISTANCE * FPS).round() as usize;
    let beats = frames_to_seconds(&pick_peaks(&beat, PEAK_THRESHOLD, beat_distance));
    let downbeat_peaks = frames_to_seconds(&pick_peaks(&downbeat, PEAK_THRESHOLD, beat_distance));

    let downbeats: Vec<f64> = beats
        .iter()
        .copied()
        .filter(|b| {
            downbeat_peaks
                .iter()
                .any(|d| (b - d).abs() <= DOWNBEAT_TOLERANCE)
        })
        .collect();

    let bpm = estimate_bpm(&beats);
    let positions = beat_positions(&beats, &downbeats);
    let segments = segments(&section, &label);

    ModelOutput {
        bpm,
        beats,
        downbeats,
        beat_positions: positions,
        segments,
        activations: options.include_activations.then(|| Activations {
            beat,
            downbeat,
            segment: section,
            label,
        }),
        embeddings: raw.embeddings.filter(|_| options.include_embeddings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Logits with a sharp peak every `period` frames starting at `offset`
    fn pulse_logits(num_frames: usize, period: usize, offset: usize) -> Vec<f32> {
        (0..num_frames)
            .map(|i| if i >= offset && (i - offset) % period == 0 { 6.0 } else { -6.0 })
            .collect()
    }

    fn raw(num_frames: usize) -> RawActivations {
        RawActivations {
            beat: pulse_logits(num_frames, 50, 50),
            downbeat: pulse_logits(num_frames, 200, 50),
            section: vec![-6.0; num_frames],
            function: Array2::from_elem((10, num_frames), 0.0),
            embeddings: None,
        }
    }

    #[test]
    fn test_pick_peaks_respects_distance() {
        let act = [0.0, 0.9, 0.0, 0.8, 0.0, 0.0, 0.7, 0.0];
        assert_eq!(pick_peaks(&act, 0.5, 3), vec![1, 6]);
        assert_eq!(pick_peaks(&act, 0.5, 1), vec![1, 3, 6]);
        assert_eq!(pick_peaks(&act, 0.95, 1), Vec::<usize>::new());
    }

    #[test]
    fn test_pick_peaks_plateau_counts_once() {
        let act = [0.0, 0.8, 0.8, 0.0];
        assert_eq!(pick_peaks(&act, 0.5, 1), vec![1]);
    }

    #[test]
    fn test_bpm_from_median_interval() {
        let beats: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        assert_eq!(estimate_bpm(&beats), 120.0);
        assert_eq!(estimate_bpm(&[1.0]), 0.0);
        assert_eq!(estimate_bpm(&[]), 0.0);
    }

    #[test]
    fn test_beat_positions_with_downbeats() {
        let beats = [0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5];
        let downbeats = [1.0, 3.0];
        assert_eq!(
            beat_positions(&beats, &downbeats),
            vec![4, 1, 2, 3, 4, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_beat_positions_without_downbeats_cycle() {
        let beats = [0.0, 0.5, 1.0, 1.5, 2.0];
        assert_eq!(beat_positions(&beats, &[]), vec![1, 2, 3, 4, 1]);
    }

    #[test]
    fn test_dominant_bar_length_prefers_most_common() {
        assert_eq!(dominant_bar_length(&[0, 3, 6, 10]), 3);
        assert_eq!(dominant_bar_length(&[5]), DEFAULT_BEATS_PER_BAR);
    }

    #[test]
    fn test_segments_split_at_section_peaks() {
        let num_frames = 1000;
        let mut section = vec![0.0; num_frames];
        section[500] = 0.9;
        let mut labels = Array2::<f32>::zeros((10, num_frames));
        labels.slice_mut(ndarray::s![2, ..500]).fill(1.0);
        labels.slice_mut(ndarray::s![8, 500..]).fill(1.0);

        let segs = segments(&section, &labels);
        assert_eq!(
            segs,
            vec![Segment::new(0.0, 5.0, "intro"), Segment::new(5.0, 10.0, "verse")]
        );
    }

    #[test]
    fn test_postprocess_end_to_end() {
        let output = postprocess(raw(1000), &InferenceOptions::default());
        assert_eq!(output.beats.len(), 19);
        assert_eq!(output.beats[0], 0.5);
        assert_eq!(output.bpm, 120.0);
        assert_eq!(output.downbeats, vec![0.5, 2.5, 4.5, 6.5, 8.5]);
        assert_eq!(&output.beat_positions[..5], &[1, 2, 3, 4, 1]);
        assert_eq!(output.segments.len(), 1);
        assert_eq!(output.segments[0].end, 10.0);
        assert!(output.activations.is_none());
        assert!(output.embeddings.is_none());
    }

    #[test]
    fn test_postprocess_includes_requested_activations() {
        let options = InferenceOptions {
            include_activations: true,
            include_embeddings: false,
        };
        let output = postprocess(raw(300), &options);
        let activations = output.activations.unwrap();
        assert_eq!(activations.beat.len(), 300);
        assert_eq!(activations.label.dim(), (10, 300));
        let column_sum: f32 = activations.label.column(0).sum();
        assert!((column_sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_mean_over_folds() {
        let mut a = raw(10);
        a.beat = vec![2.0; 10];
        let mut b = raw(10);
        b.beat = vec![4.0; 10];
        let mean = RawActivations::mean(&[a, b]).unwrap();
        assert!(mean.beat.iter().all(|&x| (x - 3.0).abs() < 1e-6));
        assert!(RawActivations::mean(&[]).is_none());
    }
}
