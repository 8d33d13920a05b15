//! Spectrogram cache resolution
//!
//! A stem set is considered extracted when its tensor file exists. Contents
//! are never inspected and modification times are ignored.

use crate::config::CacheKeyPolicy;
use crate::discovery::cache_key;
use crate::types::StemSet;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extension of cached spectrogram tensors
pub const SPECTROGRAM_EXTENSION: &str = "npy";

/// One stem set that still needs its spectrogram extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    pub stems: StemSet,
    pub destination: PathBuf,
}

/// Outcome of resolving a batch against the cache directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePlan {
    /// One tensor path per input, in input order
    pub destinations: Vec<PathBuf>,
    /// Inputs whose tensor is not on disk yet
    pub todo: Vec<ExtractionJob>,
}

impl CachePlan {
    /// Number of inputs already satisfied by the cache
    pub fn cached(&self) -> usize {
        self.destinations.len() - self.todo.len()
    }
}

/// Tensor path of a stem set inside the cache directory
pub fn spectrogram_path(spec_dir: &Path, stems: &StemSet, policy: CacheKeyPolicy) -> PathBuf {
    spec_dir.join(format!("{}.{}", cache_key(stems, policy), SPECTROGRAM_EXTENSION))
}

/// Work out which stem sets need extraction
///
/// Two inputs mapping to the same key within one call share a single entry:
/// only the first is scheduled.
pub fn resolve(stem_sets: &[StemSet], spec_dir: &Path, policy: CacheKeyPolicy) -> CachePlan {
    let mut plan = CachePlan::default();
    let mut scheduled: HashSet<PathBuf> = HashSet::new();

    for stems in stem_sets {
        let destination = spectrogram_path(spec_dir, stems, policy);

        if destination.exists() {
            debug!("Cached spectrogram: {}", destination.display());
        } else if scheduled.insert(destination.clone()) {
            plan.todo.push(ExtractionJob {
                stems: stems.clone(),
                destination: destination.clone(),
            });
        } else {
            debug!(
                "{} shares cache entry {} with an earlier input",
                stems.dir.display(),
                destination.display()
            );
        }

        plan.destinations.push(destination);
    }

    info!(
        "Found {} spectrograms already extracted, {} to extract.",
        plan.cached(),
        plan.todo.len()
    );

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unnamed_dirs_stay_inside_spec_dir() {
        let spec = Path::new("/tmp/spec");
        let root = spectrogram_path(spec, &StemSet::from_dir("/"), CacheKeyPolicy::DirName);
        assert_eq!(root, spec.join("stems.npy"));

        let cwd = spectrogram_path(spec, &StemSet::from_dir("."), CacheKeyPolicy::DirName);
        assert_eq!(cwd.parent(), Some(spec));
        assert_ne!(cwd, spec.join("..npy"));
    }

    #[test]
    fn test_empty_input() {
        let plan = resolve(&[], Path::new("/nonexistent/spec"), CacheKeyPolicy::DirName);
        assert!(plan.destinations.is_empty());
        assert!(plan.todo.is_empty());
    }

    #[test]
    fn test_destinations_follow_input_order() {
        let spec = TempDir::new().unwrap();
        let sets = vec![
            StemSet::from_dir("/stems/zeta"),
            StemSet::from_dir("/stems/alpha"),
            StemSet::from_dir("/stems/mid"),
        ];

        let plan = resolve(&sets, spec.path(), CacheKeyPolicy::DirName);
        assert_eq!(
            plan.destinations,
            vec![
                spec.path().join("zeta.npy"),
                spec.path().join("alpha.npy"),
                spec.path().join("mid.npy"),
            ]
        );
        assert_eq!(plan.todo.len(), 3);
        assert_eq!(plan.cached(), 0);
    }

    #[test]
    fn test_existing_file_is_cached() {
        let spec = TempDir::new().unwrap();
        // Any file counts, content is not validated
        std::fs::write(spec.path().join("alpha.npy"), b"garbage").unwrap();

        let sets = vec![StemSet::from_dir("/stems/alpha"), StemSet::from_dir("/stems/beta")];
        let plan = resolve(&sets, spec.path(), CacheKeyPolicy::DirName);

        assert_eq!(plan.cached(), 1);
        assert_eq!(plan.todo.len(), 1);
        assert_eq!(plan.todo[0].stems.dir, PathBuf::from("/stems/beta"));
        assert_eq!(plan.todo[0].destination, spec.path().join("beta.npy"));
    }

    #[test]
    fn test_same_basename_aliases_under_dir_name() {
        let spec = TempDir::new().unwrap();
        let sets = vec![StemSet::from_dir("/a/song"), StemSet::from_dir("/b/song")];

        let plan = resolve(&sets, spec.path(), CacheKeyPolicy::DirName);
        assert_eq!(plan.destinations[0], plan.destinations[1]);
        assert_eq!(plan.todo.len(), 1);

        let plan = resolve(&sets, spec.path(), CacheKeyPolicy::PathHash);
        assert_ne!(plan.destinations[0], plan.destinations[1]);
        assert_eq!(plan.todo.len(), 2);
    }
}
