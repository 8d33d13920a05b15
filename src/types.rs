//! Core data types for stemrhythm
//!
//! These types represent the domain model and flow through the pipeline.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Stems
// =============================================================================

/// One of the four separated instrument stems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Bass,
    Drums,
    Other,
    Vocals,
}

impl Instrument {
    /// Channel order of every spectrogram tensor
    pub const ALL: [Instrument; 4] = [
        Instrument::Bass,
        Instrument::Drums,
        Instrument::Other,
        Instrument::Vocals,
    ];

    /// File stem used by the source-separation layout
    pub fn name(self) -> &'static str {
        match self {
            Instrument::Bass => "bass",
            Instrument::Drums => "drums",
            Instrument::Other => "other",
            Instrument::Vocals => "vocals",
        }
    }

    /// File name inside a stem-set directory (e.g. `drums.wav`)
    pub fn file_name(self) -> String {
        format!("{}.{}", self.name(), STEM_EXTENSION)
    }
}

/// Extension of the stem files produced by source separation
pub const STEM_EXTENSION: &str = "wav";

/// One track's four separated stems, identified by its directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StemSet {
    /// Directory holding the stems; its name is the track identity
    pub dir: PathBuf,
    pub bass: PathBuf,
    pub drums: PathBuf,
    pub other: PathBuf,
    pub vocals: PathBuf,
}

impl StemSet {
    /// Build the stem set for a per-track directory using the standard layout
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            bass: dir.join(Instrument::Bass.file_name()),
            drums: dir.join(Instrument::Drums.file_name()),
            other: dir.join(Instrument::Other.file_name()),
            vocals: dir.join(Instrument::Vocals.file_name()),
            dir,
        }
    }

    /// Path of one stem
    pub fn path(&self, instrument: Instrument) -> &Path {
        match instrument {
            Instrument::Bass => &self.bass,
            Instrument::Drums => &self.drums,
            Instrument::Other => &self.other,
            Instrument::Vocals => &self.vocals,
        }
    }

    /// Track identity: the directory's file name
    ///
    /// Paths without a final name (`.`, `..`, `song/..`) are resolved on disk
    /// first. The identity is always a single path component; a filesystem root
    /// falls back to `UNNAMED_STEM_SET`.
    pub fn identity(&self) -> String {
        fn name(path: &Path) -> Option<String> {
            path.file_name().map(|n| n.to_string_lossy().to_string())
        }

        name(&self.dir)
            .or_else(|| std::fs::canonicalize(&self.dir).ok().as_deref().and_then(name))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNNAMED_STEM_SET.to_string())
    }
}

/// Identity of a stem set whose directory has no name (a filesystem root)
pub const UNNAMED_STEM_SET: &str = "stems";

// =============================================================================
// Audio and spectrogram buffers
// =============================================================================

/// Decoded mono signal at the file's native sample rate
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Duration in seconds
    pub duration: f64,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        // Guard against division by zero - use 0 duration for invalid sample rate
        let duration = if sample_rate > 0 {
            samples.len() as f64 / sample_rate as f64
        } else {
            0.0
        };
        Self {
            samples,
            sample_rate,
            duration,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Stacked per-stem spectrograms indexed as (instrument, frame, band)
pub type SpectrogramTensor = Array3<f32>;

/// Single-stem spectrogram indexed as (frame, band)
pub type Spectrogram = Array2<f32>;

// =============================================================================
// Analysis results
// =============================================================================

/// Labelled structural region of a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Structural label (intro, verse, chorus, ...)
    pub label: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }
}

/// Frame-level model activations (probabilities, 100 frames per second)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activations {
    pub beat: Vec<f32>,
    pub downbeat: Vec<f32>,
    pub segment: Vec<f32>,
    /// Function label probabilities, (label, frame)
    pub label: Array2<f32>,
}

/// Structured output of one inference pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Stem-set directory the result was computed from
    pub path: PathBuf,
    /// Tempo estimate in beats per minute (0 when undetermined)
    pub bpm: f64,
    /// Beat times in seconds
    pub beats: Vec<f64>,
    /// Downbeat times in seconds, a subsequence of `beats`
    pub downbeats: Vec<f64>,
    /// Position of each beat within its bar (1 = downbeat)
    pub beat_positions: Vec<u32>,
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activations: Option<Activations>,
    /// Raw model embeddings, (instrument, frame, dim)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Array3<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_set_layout() {
        let set = StemSet::from_dir("/demix/htdemucs/song");
        assert_eq!(set.bass, PathBuf::from("/demix/htdemucs/song/bass.wav"));
        assert_eq!(set.other, PathBuf::from("/demix/htdemucs/song/other.wav"));
        assert_eq!(set.path(Instrument::Vocals), Path::new("/demix/htdemucs/song/vocals.wav"));
        assert_eq!(set.identity(), "song");
    }

    #[test]
    fn test_identity_of_relative_and_root_dirs() {
        let root = tempfile::TempDir::new().unwrap();
        let song = root.path().join("song");
        std::fs::create_dir(&song).unwrap();
        let root_name = root.path().file_name().unwrap().to_string_lossy().to_string();

        assert_eq!(StemSet::from_dir(song.join("..")).identity(), root_name);
        assert_eq!(StemSet::from_dir(song.join(".").join("..").join("song")).identity(), "song");
        assert_eq!(StemSet::from_dir("/").identity(), UNNAMED_STEM_SET);

        let cwd = StemSet::from_dir(".").identity();
        assert!(!cwd.is_empty() && cwd != "." && cwd != "..");
        assert!(!cwd.contains(std::path::MAIN_SEPARATOR));
    }

    #[test]
    fn test_audio_buffer_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 44100], 44100);
        assert!((buffer.duration - 1.0).abs() < 1e-9);
        assert_eq!(AudioBuffer::new(vec![0.0; 10], 0).duration, 0.0);
    }

    #[test]
    fn test_optional_fields_skipped_in_json() {
        let result = AnalysisResult {
            path: PathBuf::from("song"),
            bpm: 120.0,
            beats: vec![0.5, 1.0],
            downbeats: vec![0.5],
            beat_positions: vec![1, 2],
            segments: vec![Segment::new(0.0, 1.0, "intro")],
            activations: None,
            embeddings: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("activations").is_none());
        assert!(json.get("embeddings").is_none());
        assert_eq!(json["segments"][0]["label"], "intro");
    }
}
