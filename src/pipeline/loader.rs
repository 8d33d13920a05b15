//! Stem signal loading

use crate::audio::decode_mono;
use crate::error::Result;
use crate::types::{AudioBuffer, Instrument, StemSet};
use tracing::warn;

/// Decode the four stems of a track, in `[bass, drums, other, vocals]` order
///
/// A missing file is reported with a warning first; the decode is attempted
/// regardless and fails with a load error.
pub fn load_stems(stems: &StemSet) -> Result<[AudioBuffer; 4]> {
    for instrument in Instrument::ALL {
        let path = stems.path(instrument);
        if !path.exists() {
            warn!("File {} is missing.", path.display());
        }
    }

    let load = |instrument: Instrument| decode_mono(stems.path(instrument));

    Ok([
        load(Instrument::Bass)?,
        load(Instrument::Drums)?,
        load(Instrument::Other)?,
        load(Instrument::Vocals)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StemrhythmError;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_stems_fail_with_load_error() {
        let dir = TempDir::new().unwrap();
        let err = load_stems(&StemSet::from_dir(dir.path())).unwrap_err();
        match err {
            StemrhythmError::DecodeError { path, .. } => {
                assert_eq!(path, dir.path().join("bass.wav"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_stem_warns_before_failing() {
        let dir = TempDir::new().unwrap();
        let stems = StemSet::from_dir(dir.path());
        std::fs::write(&stems.bass, b"not audio").unwrap();

        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, || load_stems(&stems));

        assert!(matches!(result, Err(StemrhythmError::DecodeError { .. })));
        let logs = String::from_utf8_lossy(&captured.0.lock().unwrap()).to_string();
        for missing in [&stems.drums, &stems.other, &stems.vocals] {
            assert!(logs.contains(&format!("File {} is missing.", missing.display())));
        }
        assert!(!logs.contains(&format!("File {} is missing.", stems.bass.display())));
        assert!(logs.contains("WARN"));
    }
}
