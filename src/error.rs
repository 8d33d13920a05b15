//! Unified error types for stemrhythm
//!
//! Error strategy:
//! - Per-track errors (decode, shape, spectrogram, inference): isolated to the
//!   track that raised them, sibling tracks keep going
//! - System errors (output directory, configuration, model loading): fatal,
//!   abort the batch
//!
//! All errors include actionable suggestions where possible.

use std::path::PathBuf;
use thiserror::Error;

/// Stem file names every stem-set directory must provide
pub const STEM_LAYOUT: &str = "bass.wav, drums.wav, other.wav, vocals.wav";

/// Top-level error type for stemrhythm operations
#[derive(Debug, Error)]
pub enum StemrhythmError {
    // =========================================================================
    // Per-track errors - isolated to one stem set
    // =========================================================================
    #[error("Failed to load audio file '{path}': {reason}\n  Tip: Each stem directory must contain {STEM_LAYOUT}")]
    DecodeError { path: PathBuf, reason: String },

    #[error("File not found: '{0}'\n  Tip: Check the path exists and is accessible")]
    FileNotFound(PathBuf),

    #[error("Cannot stack stems of '{path}': {reason}\n  Tip: All four stems must have the same duration")]
    ShapeMismatch { path: PathBuf, reason: String },

    #[error("Spectrogram error for '{path}': {reason}\n  Tip: Delete the file to force re-extraction")]
    SpectrogramError { path: PathBuf, reason: String },

    #[error("Model inference failed for '{path}': {reason}\n  Tip: This may indicate insufficient memory or an incompatible model file")]
    InferenceError { path: PathBuf, reason: String },

    #[error("Invalid track state transition for '{path}': {from} -> {to}")]
    InvalidTransition {
        path: PathBuf,
        from: &'static str,
        to: &'static str,
    },

    // =========================================================================
    // Fatal errors - abort entire batch
    // =========================================================================
    #[error("Unknown model '{name}'\n  Available models: {available}")]
    UnknownModel { name: String, available: String },

    #[error("Model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    #[error("Cannot write output to '{path}': {reason}\n  Tip: Check write permissions for the output directory")]
    OutputError { path: PathBuf, reason: String },

    #[error("Download of '{url}' failed: {reason}")]
    DownloadError { url: String, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for stemrhythm operations
pub type Result<T> = std::result::Result<T, StemrhythmError>;

impl StemrhythmError {
    /// Returns true if this error only affects the track that raised it
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StemrhythmError::DecodeError { .. }
                | StemrhythmError::FileNotFound(_)
                | StemrhythmError::ShapeMismatch { .. }
                | StemrhythmError::SpectrogramError { .. }
                | StemrhythmError::InferenceError { .. }
        )
    }

    /// Create a decode error with context about the issue
    pub fn decode_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StemrhythmError::DecodeError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an inference error for the given spectrogram
    pub fn inference_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StemrhythmError::InferenceError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an output error, checking for common issues
    pub fn output_error(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                format!("Permission denied. Check that you have write access to {}", path.display())
            }
            std::io::ErrorKind::NotFound => {
                format!("Directory does not exist: {}", path.parent().map(|p| p.display().to_string()).unwrap_or_default())
            }
            _ => err.to_string(),
        };
        StemrhythmError::OutputError { path, reason }
    }

    /// Create a model error when the inference backend is not compiled in
    pub fn model_feature_disabled() -> Self {
        StemrhythmError::ModelUnavailable {
            reason: "ONNX inference backend not compiled in\n  Tip: Build with --features onnx".to_string(),
        }
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Attribute a spectrogram read/write failure to the tensor file involved
    fn with_spectrogram_context(self, path: &std::path::Path) -> Result<T>;

    /// Attribute a result write failure to the output file involved
    fn with_output_context(self, path: &std::path::Path) -> Result<T>;
}

impl<T, E: std::fmt::Display> ErrorContext<T> for std::result::Result<T, E> {
    fn with_spectrogram_context(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| StemrhythmError::SpectrogramError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn with_output_context(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| StemrhythmError::OutputError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_track_errors_are_recoverable() {
        assert!(StemrhythmError::decode_error("/x/bass.wav", "eof").is_recoverable());
        assert!(StemrhythmError::inference_error("/x.npy", "oom").is_recoverable());
        assert!(StemrhythmError::ShapeMismatch {
            path: PathBuf::from("/x"),
            reason: "1000 vs 999 frames".to_string(),
        }
        .is_recoverable());
    }

    #[test]
    fn test_system_errors_are_fatal() {
        assert!(!StemrhythmError::ConfigError("bad".to_string()).is_recoverable());
        assert!(!StemrhythmError::model_feature_disabled().is_recoverable());
    }

    #[test]
    fn test_output_error_permission_message() {
        let err = StemrhythmError::output_error(
            "/readonly/out.json",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("Permission denied"));
    }

    #[test]
    fn test_spectrogram_context_keeps_path() {
        let failed: std::result::Result<(), String> = Err("bad header".to_string());
        let err = failed
            .with_spectrogram_context(std::path::Path::new("/spec/a.npy"))
            .unwrap_err();
        match err {
            StemrhythmError::SpectrogramError { path, reason } => {
                assert_eq!(path, PathBuf::from("/spec/a.npy"));
                assert_eq!(reason, "bad header");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
