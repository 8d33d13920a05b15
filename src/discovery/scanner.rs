//! Stem-set discovery and cache-key derivation

use crate::config::CacheKeyPolicy;
use crate::error::{Result, StemrhythmError};
use crate::types::{Instrument, StemSet};
use hash32::FnvHasher;
use std::hash::Hasher;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Scan a path for stem-set directories
///
/// A directory qualifies when it holds at least one of the four stem files, so a
/// partially populated track still reaches the loader and reports what is missing.
pub fn scan(input: &Path, recursive: bool) -> Result<Vec<StemSet>> {
    if !input.exists() {
        return Err(StemrhythmError::FileNotFound(input.to_path_buf()));
    }

    if !input.is_dir() {
        return Err(StemrhythmError::ConfigError(format!(
            "'{}' is not a directory. Pass a stem directory containing {}",
            input.display(),
            crate::error::STEM_LAYOUT
        )));
    }

    let walker = if recursive {
        WalkDir::new(input)
    } else {
        WalkDir::new(input).max_depth(1)
    };

    let mut sets: Vec<StemSet> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_dir() && has_any_stem(entry.path()))
        .map(|entry| {
            debug!("Discovered stem set: {}", entry.path().display());
            StemSet::from_dir(entry.path())
        })
        .collect();

    sets.sort_by(|a, b| a.dir.cmp(&b.dir));

    info!("Discovered {} stem sets", sets.len());

    if sets.is_empty() {
        warn!("No stem directories found in {}", input.display());
    }

    Ok(sets)
}

fn has_any_stem(dir: &Path) -> bool {
    Instrument::ALL
        .iter()
        .any(|instrument| dir.join(instrument.file_name()).is_file())
}

/// Cache key for a stem set under the given policy
pub fn cache_key(stems: &StemSet, policy: CacheKeyPolicy) -> String {
    let identity = stems.identity();
    match policy {
        CacheKeyPolicy::DirName => identity,
        CacheKeyPolicy::PathHash => format!("{}-{:08x}", identity, path_fingerprint(&stems.dir)),
    }
}

/// Deterministic 32-bit FNV-1a fingerprint of a path
pub fn path_fingerprint(path: &Path) -> u32 {
    use hash32::Hasher as Hash32Hasher;

    // Normalize path for cross-platform consistency
    let normalized = normalize_path_for_hash(path);

    let mut hasher = FnvHasher::default();
    hasher.write(normalized.as_bytes());
    hasher.finish32()
}

/// Normalize a path string for consistent hashing across platforms
fn normalize_path_for_hash(path: &Path) -> String {
    let path_str = path.to_string_lossy();

    // Convert backslashes to forward slashes
    let normalized = path_str.replace('\\', "/");

    normalized.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_deterministic() {
        let path = Path::new("/demix/htdemucs/track");
        assert_eq!(path_fingerprint(path), path_fingerprint(path));
    }

    #[test]
    fn test_path_normalization() {
        let win = normalize_path_for_hash(Path::new("C:\\demix\\track\\"));
        let unix = normalize_path_for_hash(Path::new("C:/demix/track"));
        assert_eq!(win, unix);
    }

    #[test]
    fn test_dir_name_keys_alias() {
        let a = StemSet::from_dir("/batch1/song");
        let b = StemSet::from_dir("/batch2/song");
        assert_eq!(cache_key(&a, CacheKeyPolicy::DirName), "song");
        assert_eq!(
            cache_key(&a, CacheKeyPolicy::DirName),
            cache_key(&b, CacheKeyPolicy::DirName)
        );
    }

    #[test]
    fn test_path_hash_keys_are_distinct() {
        let a = StemSet::from_dir("/batch1/song");
        let b = StemSet::from_dir("/batch2/song");
        let key_a = cache_key(&a, CacheKeyPolicy::PathHash);
        assert!(key_a.starts_with("song-"));
        assert_ne!(key_a, cache_key(&b, CacheKeyPolicy::PathHash));
    }

    #[test]
    fn test_scan_finds_stem_dirs() {
        let root = TempDir::new().unwrap();
        let complete = root.path().join("b_track");
        let partial = root.path().join("a_track");
        let unrelated = root.path().join("notes");
        fs::create_dir_all(&complete).unwrap();
        fs::create_dir_all(&partial).unwrap();
        fs::create_dir_all(&unrelated).unwrap();
        for instrument in Instrument::ALL {
            fs::write(complete.join(instrument.file_name()), b"").unwrap();
        }
        fs::write(partial.join("drums.wav"), b"").unwrap();
        fs::write(unrelated.join("readme.txt"), b"").unwrap();

        let sets = scan(root.path(), true).unwrap();
        let dirs: Vec<_> = sets.iter().map(|s| s.dir.clone()).collect();
        assert_eq!(dirs, vec![partial, complete]);
    }

    #[test]
    fn test_scan_accepts_stem_dir_itself() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("bass.wav"), b"").unwrap();
        let sets = scan(root.path(), false).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].dir, root.path());
    }

    #[test]
    fn test_scan_missing_input() {
        let err = scan(Path::new("/definitely/not/here"), true).unwrap_err();
        assert!(matches!(err, StemrhythmError::FileNotFound(_)));
    }
}
