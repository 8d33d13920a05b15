//! Per-track JSON result files

use crate::error::{ErrorContext, Result, StemrhythmError};
use crate::types::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

/// JSON output schema version
const SCHEMA_VERSION: &str = "1.0";

/// On-disk envelope around one analysis result
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultJson {
    /// Schema version for forward compatibility
    pub version: String,
    pub metadata: ExportMetadata,
    pub result: AnalysisResult,
}

/// Export metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// stemrhythm version that generated this file
    pub generator_version: String,
    /// Timestamp of export
    pub exported_at: String,
    /// Model that produced the result
    pub model: String,
}

/// Result file of a track inside the output directory
pub fn result_path(out_dir: &Path, key: &str) -> PathBuf {
    out_dir.join(format!("{}.json", key))
}

/// Write one result to a JSON file
///
/// Uses atomic write pattern: writes to a temp file first, then renames.
pub fn write_result(result: &AnalysisResult, model: &str, output_path: &Path) -> Result<()> {
    let temp_path = output_path.with_extension("json.tmp");

    let file = File::create(&temp_path)
        .map_err(|e| StemrhythmError::output_error(output_path, e))?;
    let writer = BufWriter::new(file);

    let output = ResultJson {
        version: SCHEMA_VERSION.to_string(),
        metadata: ExportMetadata {
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            model: model.to_string(),
        },
        result: result.clone(),
    };

    serde_json::to_writer_pretty(writer, &output)
        .with_output_context(output_path)
        .and_then(|()| {
            std::fs::rename(&temp_path, output_path).map_err(|e| StemrhythmError::OutputError {
                path: output_path.to_path_buf(),
                reason: format!("Failed to finalize file: {}", e),
            })
        })
        .inspect_err(|_| {
            let _ = std::fs::remove_file(&temp_path);
        })?;

    debug!("Wrote result to {}", output_path.display());
    Ok(())
}

/// Read a result written by `write_result`
pub fn read_result(path: &Path) -> Result<AnalysisResult> {
    let file = File::open(path).with_output_context(path)?;
    let parsed: ResultJson =
        serde_json::from_reader(BufReader::new(file)).with_output_context(path)?;
    Ok(parsed.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Segment;
    use tempfile::TempDir;

    fn sample() -> AnalysisResult {
        AnalysisResult {
            path: PathBuf::from("/stems/song"),
            bpm: 120.0,
            beats: vec![0.5, 1.0, 1.5],
            downbeats: vec![0.5],
            beat_positions: vec![1, 2, 3],
            segments: vec![Segment::new(0.0, 2.0, "intro")],
            activations: None,
            embeddings: None,
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = result_path(dir.path(), "song");
        write_result(&sample(), "harmonix-all", &path).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("song.json.tmp").exists());
        assert_eq!(read_result(&path).unwrap(), sample());
    }

    #[test]
    fn test_envelope_fields() {
        let dir = TempDir::new().unwrap();
        let path = result_path(dir.path(), "song");
        write_result(&sample(), "harmonix-fold0", &path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], SCHEMA_VERSION);
        assert_eq!(raw["metadata"]["model"], "harmonix-fold0");
        assert_eq!(raw["result"]["bpm"], 120.0);
    }

    #[test]
    fn test_write_to_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("song.json");
        assert!(matches!(
            write_result(&sample(), "m", &path),
            Err(StemrhythmError::OutputError { .. })
        ));
    }
}
